//! Defines routes for all bucket and object operations.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `POST   /api/v1/buckets` create bucket
//!   - `GET    /api/v1/buckets` list the caller's buckets
//!   - `GET    /api/v1/buckets/{bucket_id}` fetch bucket
//!   - `PATCH  /api/v1/buckets/{bucket_id}` rename bucket
//!   - `DELETE /api/v1/buckets/{bucket_id}` delete (empty) bucket
//!   - `GET    /api/v1/buckets/{bucket_id}/objects` list objects
//!   - `PUT    /api/v1/buckets/{bucket_id}/objects/{name}` add object
//!
//! - **Object-level endpoints**
//!   - `GET    /api/v1/objects/{object_id}` download object
//!   - `PATCH  /api/v1/objects/{object_id}` rename / edit metadata
//!   - `DELETE /api/v1/objects/{object_id}` soft-delete object
//!   - `PUT    /api/v1/objects/{object_id}/content` replace bytes
//!
//! Endpoints that act on behalf of an owner read it from `x-owner-id`.

use crate::{
    handlers::{
        bucket_handlers::{
            create_bucket, delete_bucket, get_bucket, list_buckets, list_objects, rename_bucket,
        },
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, get_object, replace_object_content, update_object, upload_object,
        },
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build and return the router for all routes.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/api/v1/buckets", get(list_buckets).post(create_bucket))
        .route(
            "/api/v1/buckets/{bucket_id}",
            get(get_bucket).patch(rename_bucket).delete(delete_bucket),
        )
        .route("/api/v1/buckets/{bucket_id}/objects", get(list_objects))
        .route(
            "/api/v1/buckets/{bucket_id}/objects/{name}",
            put(upload_object),
        )
        // Object-level routes
        .route(
            "/api/v1/objects/{object_id}",
            get(get_object).patch(update_object).delete(delete_object),
        )
        .route(
            "/api/v1/objects/{object_id}/content",
            put(replace_object_content),
        )
}
