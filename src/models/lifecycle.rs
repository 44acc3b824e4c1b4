//! Lifecycle state shared by buckets and objects.

use serde::{Deserialize, Serialize};

/// Whether a record is live or has been soft-deleted.
///
/// Stored as lowercase text (`active`, `deleted`) so the partial unique
/// indexes in the schema can filter on it.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Active,
    Deleted,
}

impl LifecycleState {
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}
