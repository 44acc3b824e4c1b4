//! HTTP handlers for bucket operations. Everything except request parsing
//! is delegated to `StorageService`.

use crate::{
    errors::AppError,
    handlers::owner::OwnerId,
    models::{bucket::Bucket, object::BucketObject},
    services::storage_service::StorageService,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of `POST /api/v1/buckets` and `PATCH /api/v1/buckets/{id}`.
#[derive(Debug, Deserialize)]
pub struct BucketNameReq {
    pub name: String,
}

/// `POST /api/v1/buckets`
pub async fn create_bucket(
    State(service): State<StorageService>,
    OwnerId(owner_id): OwnerId,
    Json(payload): Json<BucketNameReq>,
) -> Result<impl IntoResponse, AppError> {
    let bucket = service.create_bucket(&payload.name, owner_id).await?;
    Ok((StatusCode::CREATED, Json(bucket)))
}

/// `GET /api/v1/buckets`: the caller's buckets, oldest first.
pub async fn list_buckets(
    State(service): State<StorageService>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<Vec<Bucket>>, AppError> {
    Ok(Json(service.buckets_for_owner(owner_id).await?))
}

/// `GET /api/v1/buckets/{bucket_id}`
pub async fn get_bucket(
    State(service): State<StorageService>,
    Path(bucket_id): Path<Uuid>,
) -> Result<Json<Bucket>, AppError> {
    let bucket = service
        .get_bucket(bucket_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("bucket `{}` not found", bucket_id)))?;
    Ok(Json(bucket))
}

/// `PATCH /api/v1/buckets/{bucket_id}`: rename.
pub async fn rename_bucket(
    State(service): State<StorageService>,
    Path(bucket_id): Path<Uuid>,
    Json(payload): Json<BucketNameReq>,
) -> Result<Json<Bucket>, AppError> {
    let mut bucket = service
        .get_bucket(bucket_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("bucket `{}` not found", bucket_id)))?;
    bucket.name = payload.name;
    Ok(Json(service.update_bucket(&bucket).await?))
}

/// `DELETE /api/v1/buckets/{bucket_id}`: only empty buckets.
pub async fn delete_bucket(
    State(service): State<StorageService>,
    Path(bucket_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_bucket(bucket_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/buckets/{bucket_id}/objects`
pub async fn list_objects(
    State(service): State<StorageService>,
    Path(bucket_id): Path<Uuid>,
) -> Result<Json<Vec<BucketObject>>, AppError> {
    if service.get_bucket(bucket_id).await?.is_none() {
        return Err(AppError::not_found(format!(
            "bucket `{}` not found",
            bucket_id
        )));
    }
    Ok(Json(service.bucket_objects(bucket_id).await?))
}
