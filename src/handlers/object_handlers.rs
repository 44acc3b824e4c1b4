//! HTTP handlers for object operations.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `StorageService`.

use crate::{
    errors::AppError,
    handlers::owner::OwnerId,
    models::object::BucketObject,
    services::{
        blob_store::{ByteStream, WriteReceipt},
        storage_service::StorageService,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use uuid::Uuid;

/// Partial update accepted by `PATCH /api/v1/objects/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateObjectReq {
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
}

fn body_stream(body: Body) -> ByteStream {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed()
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// `PUT /api/v1/buckets/{bucket_id}/objects/{name}`: add a new file.
/// Never overwrites: an existing name is a 409.
pub async fn upload_object(
    State(service): State<StorageService>,
    OwnerId(owner_id): OwnerId,
    Path((bucket_id, name)): Path<(Uuid, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let object = service
        .add_file_to_bucket(
            bucket_id,
            owner_id,
            &name,
            content_type(&headers),
            body_stream(body),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// `GET /api/v1/objects/{object_id}`: stream the object's bytes.
pub async fn get_object(
    State(service): State<StorageService>,
    Path(object_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (meta, stream) = service.read_object(object_id).await?;

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `PATCH /api/v1/objects/{object_id}`: rename and/or edit metadata.
pub async fn update_object(
    State(service): State<StorageService>,
    Path(object_id): Path<Uuid>,
    Json(payload): Json<UpdateObjectReq>,
) -> Result<Json<BucketObject>, AppError> {
    let mut object = service
        .get_object(object_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("object `{}` not found", object_id)))?;

    if let Some(name) = payload.name {
        object.name = name;
    }
    if let Some(content_type) = payload.content_type {
        object.content_type = content_type;
    }
    if let Some(size_bytes) = payload.size_bytes {
        object.size_bytes = size_bytes;
    }

    Ok(Json(service.update_object_metadata(&object).await?))
}

/// `PUT /api/v1/objects/{object_id}/content`: replace the bytes in place.
/// Metadata is left as-is; the receipt reports the new size and etag.
pub async fn replace_object_content(
    State(service): State<StorageService>,
    Path(object_id): Path<Uuid>,
    body: Body,
) -> Result<Json<WriteReceipt>, AppError> {
    let receipt = service
        .update_object_contents(object_id, body_stream(body))
        .await?;
    Ok(Json(receipt))
}

/// `DELETE /api/v1/objects/{object_id}`: soft-delete.
pub async fn delete_object(
    State(service): State<StorageService>,
    Path(object_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_object(object_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &BucketObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    if let Ok(value) = HeaderValue::from_str(&meta.modified_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.id.to_string()) {
        headers.insert(HeaderName::from_static("x-object-id"), value);
    }
}
