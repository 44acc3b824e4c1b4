//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::lifecycle::LifecycleState;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for a single file within a bucket.
///
/// The struct stores metadata only. While the object is active, its bytes
/// live at `resolve(bucket_id, name)` in the blob store.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct BucketObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Owner who uploaded the object.
    pub owner_id: Uuid,

    /// Leaf file name. Never contains path separators.
    pub name: String,

    /// Size in bytes as recorded in metadata.
    pub size_bytes: i64,

    /// Content type (MIME type).
    pub content_type: String,

    /// Hex MD5 of the bytes written when the object was created.
    pub etag: Option<String>,

    /// When the object was created.
    pub created_at: DateTime<Utc>,

    /// When the object's metadata last changed.
    pub modified_at: DateTime<Utc>,

    /// Active or soft-deleted.
    pub state: LifecycleState,
}

impl BucketObject {
    /// Build a fresh, active object record. Size and etag are filled in once
    /// the bytes have been written.
    pub fn new(
        bucket_id: Uuid,
        owner_id: Uuid,
        name: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bucket_id,
            owner_id,
            name: name.into(),
            size_bytes: 0,
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
            etag: None,
            created_at: now,
            modified_at: now,
            state: LifecycleState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
