//! Bucket store: owners group files into buckets, with metadata in SQLite
//! and bytes on the local filesystem.
//!
//! The core is [`services::storage_service::StorageService`], which keeps the
//! metadata store and the blob store consistent. The HTTP layer in
//! [`handlers`] and [`routes`] is a thin wrapper around it.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
