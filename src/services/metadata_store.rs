//! Metadata store gateway: lookups by id/owner/bucket plus an atomic save of
//! queued mutations.
//!
//! Mutations are staged in a [`ChangeSet`] and applied by
//! [`MetadataStore::save`] in one transaction. Dropping a `ChangeSet` without
//! saving it discards every staged mutation, which is how the coordinator
//! abandons a half-finished operation.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::MetadataResult;
use crate::models::{bucket::Bucket, object::BucketObject};

/// One queued mutation over a single entity kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation<T> {
    Add(T),
    Update(T),
    SoftDelete(Uuid),
    HardDelete(Uuid),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Bucket(Mutation<Bucket>),
    Object(Mutation<BucketObject>),
}

/// Ordered batch of pending mutations, applied all-or-nothing by `save`.
#[derive(Clone, Debug, Default)]
#[must_use = "staged changes are discarded unless saved"]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bucket(&mut self, bucket: Bucket) -> &mut Self {
        self.push(Change::Bucket(Mutation::Add(bucket)))
    }

    pub fn update_bucket(&mut self, bucket: Bucket) -> &mut Self {
        self.push(Change::Bucket(Mutation::Update(bucket)))
    }

    pub fn soft_delete_bucket(&mut self, id: Uuid) -> &mut Self {
        self.push(Change::Bucket(Mutation::SoftDelete(id)))
    }

    pub fn hard_delete_bucket(&mut self, id: Uuid) -> &mut Self {
        self.push(Change::Bucket(Mutation::HardDelete(id)))
    }

    pub fn add_object(&mut self, object: BucketObject) -> &mut Self {
        self.push(Change::Object(Mutation::Add(object)))
    }

    pub fn update_object(&mut self, object: BucketObject) -> &mut Self {
        self.push(Change::Object(Mutation::Update(object)))
    }

    pub fn soft_delete_object(&mut self, id: Uuid) -> &mut Self {
        self.push(Change::Object(Mutation::SoftDelete(id)))
    }

    pub fn hard_delete_object(&mut self, id: Uuid) -> &mut Self {
        self.push(Change::Object(Mutation::HardDelete(id)))
    }

    /// Mutable access to an object staged by `add_object` or `update_object`,
    /// for filling in fields only known after the bytes are written.
    pub fn staged_object_mut(&mut self, id: Uuid) -> Option<&mut BucketObject> {
        self.changes.iter_mut().rev().find_map(|change| match change {
            Change::Object(Mutation::Add(obj) | Mutation::Update(obj)) if obj.id == id => {
                Some(obj)
            }
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// CRUD over buckets and bucket objects keyed by identifier.
///
/// Lookups return every lifecycle state; filtering out soft-deleted rows is
/// the caller's business. Absent rows come back as `None` or an empty list,
/// never as an error. Listings are ordered by `created_at`, then `id`.
///
/// Implementations must reject a save that would leave two active buckets
/// with the same name under one owner, or two active objects with the same
/// name in one bucket, with [`MetadataError::UniqueViolation`].
///
/// [`MetadataError::UniqueViolation`]: super::error::MetadataError::UniqueViolation
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn get_bucket(&self, id: Uuid) -> MetadataResult<Option<Bucket>>;

    async fn buckets_for_owner(&self, owner_id: Uuid) -> MetadataResult<Vec<Bucket>>;

    async fn get_object(&self, id: Uuid) -> MetadataResult<Option<BucketObject>>;

    async fn objects_for_bucket(&self, bucket_id: Uuid) -> MetadataResult<Vec<BucketObject>>;

    /// Apply every staged mutation atomically, in order.
    async fn save(&self, changes: ChangeSet) -> MetadataResult<()>;

    /// Cheap connectivity check used by readiness probes.
    async fn ping(&self) -> MetadataResult<()>;
}
