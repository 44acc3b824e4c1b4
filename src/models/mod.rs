//! Core data models for the bucket store.
//!
//! These entities describe buckets and the objects filed under them. They map
//! to SQLite rows via `sqlx::FromRow` and serialize as JSON via `serde`.
//! None of them carries file bytes; those live in the blob store.

pub mod bucket;
pub mod lifecycle;
pub mod object;
