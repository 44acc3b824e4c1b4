//! Represents a bucket, a named container for objects owned by one owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::lifecycle::LifecycleState;

/// A named collection of objects.
///
/// The on-disk directory of a bucket is keyed by `id`, never by `name`, so a
/// rename is a metadata-only change.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Bucket {
    /// Unique identifier, also the name of the bucket's storage directory.
    pub id: Uuid,

    /// The owner this bucket belongs to. Opaque to this crate.
    pub owner_id: Uuid,

    /// Display name, unique among the owner's active buckets.
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,

    /// When this bucket's metadata last changed.
    pub modified_at: DateTime<Utc>,

    /// Active or soft-deleted.
    pub state: LifecycleState,
}

impl Bucket {
    /// Build a fresh, active bucket with a new identifier.
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            created_at: now,
            modified_at: now,
            state: LifecycleState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
