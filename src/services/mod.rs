//! Storage layer: path resolution, the two stores, and the coordinator that
//! keeps them consistent.

pub mod blob_store;
pub mod error;
pub mod memory_store;
pub mod metadata_store;
pub mod path_resolver;
pub mod sqlite_store;
pub mod storage_service;
