//! In-memory metadata store.
//!
//! Data lives in two `BTreeMap`s behind a single `RwLock`. A save applies
//! its changes to a copy of the tables and swaps the copy in only when every
//! mutation succeeded, so a failed save leaves nothing behind.

use async_trait::async_trait;
use chrono::Utc;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    error::{MetadataError, MetadataResult},
    metadata_store::{Change, ChangeSet, MetadataStore, Mutation},
};
use crate::models::{bucket::Bucket, lifecycle::LifecycleState, object::BucketObject};

#[derive(Clone, Debug, Default)]
struct Tables {
    buckets: BTreeMap<Uuid, Bucket>,
    objects: BTreeMap<Uuid, BucketObject>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadataStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn apply(&mut self, change: Change) -> MetadataResult<()> {
        match change {
            Change::Bucket(Mutation::Add(bucket)) => {
                if self.buckets.contains_key(&bucket.id) {
                    return Err(MetadataError::UniqueViolation(format!("buckets.id {}", bucket.id)));
                }
                self.check_bucket_name(&bucket)?;
                self.buckets.insert(bucket.id, bucket);
            }
            Change::Bucket(Mutation::Update(bucket)) => {
                if !self.buckets.contains_key(&bucket.id) {
                    return Err(missing("bucket", bucket.id));
                }
                self.check_bucket_name(&bucket)?;
                self.buckets.insert(bucket.id, bucket);
            }
            Change::Bucket(Mutation::SoftDelete(id)) => {
                let bucket = self.buckets.get_mut(&id).ok_or_else(|| missing("bucket", id))?;
                bucket.state = LifecycleState::Deleted;
                bucket.modified_at = Utc::now();
            }
            Change::Bucket(Mutation::HardDelete(id)) => {
                if self.objects.values().any(|obj| obj.bucket_id == id) {
                    return Err(MetadataError::ForeignKey(format!(
                        "bucket {id} is still referenced by objects"
                    )));
                }
                self.buckets.remove(&id).ok_or_else(|| missing("bucket", id))?;
            }
            Change::Object(Mutation::Add(object)) => {
                if self.objects.contains_key(&object.id) {
                    return Err(MetadataError::UniqueViolation(format!(
                        "bucket_objects.id {}",
                        object.id
                    )));
                }
                self.check_object(&object)?;
                self.objects.insert(object.id, object);
            }
            Change::Object(Mutation::Update(object)) => {
                if !self.objects.contains_key(&object.id) {
                    return Err(missing("object", object.id));
                }
                self.check_object(&object)?;
                self.objects.insert(object.id, object);
            }
            Change::Object(Mutation::SoftDelete(id)) => {
                let object = self.objects.get_mut(&id).ok_or_else(|| missing("object", id))?;
                object.state = LifecycleState::Deleted;
                object.modified_at = Utc::now();
            }
            Change::Object(Mutation::HardDelete(id)) => {
                self.objects.remove(&id).ok_or_else(|| missing("object", id))?;
            }
        }
        Ok(())
    }

    fn check_bucket_name(&self, bucket: &Bucket) -> MetadataResult<()> {
        let clash = bucket.is_active()
            && self.buckets.values().any(|other| {
                other.id != bucket.id
                    && other.is_active()
                    && other.owner_id == bucket.owner_id
                    && other.name == bucket.name
            });
        if clash {
            return Err(MetadataError::UniqueViolation(format!(
                "buckets.owner_id, buckets.name `{}`",
                bucket.name
            )));
        }
        Ok(())
    }

    fn check_object(&self, object: &BucketObject) -> MetadataResult<()> {
        if !self.buckets.contains_key(&object.bucket_id) {
            return Err(MetadataError::ForeignKey(format!(
                "bucket {} does not exist",
                object.bucket_id
            )));
        }
        let clash = object.is_active()
            && self.objects.values().any(|other| {
                other.id != object.id
                    && other.is_active()
                    && other.bucket_id == object.bucket_id
                    && other.name == object.name
            });
        if clash {
            return Err(MetadataError::UniqueViolation(format!(
                "bucket_objects.bucket_id, bucket_objects.name `{}`",
                object.name
            )));
        }
        Ok(())
    }
}

fn missing(kind: &'static str, id: Uuid) -> MetadataError {
    MetadataError::Missing { kind, id }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_bucket(&self, id: Uuid) -> MetadataResult<Option<Bucket>> {
        Ok(self.tables.read().await.buckets.get(&id).cloned())
    }

    async fn buckets_for_owner(&self, owner_id: Uuid) -> MetadataResult<Vec<Bucket>> {
        let tables = self.tables.read().await;
        let mut buckets: Vec<Bucket> = tables
            .buckets
            .values()
            .filter(|b| b.owner_id == owner_id)
            .cloned()
            .collect();
        buckets.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(buckets)
    }

    async fn get_object(&self, id: Uuid) -> MetadataResult<Option<BucketObject>> {
        Ok(self.tables.read().await.objects.get(&id).cloned())
    }

    async fn objects_for_bucket(&self, bucket_id: Uuid) -> MetadataResult<Vec<BucketObject>> {
        let tables = self.tables.read().await;
        let mut objects: Vec<BucketObject> = tables
            .objects
            .values()
            .filter(|o| o.bucket_id == bucket_id)
            .cloned()
            .collect();
        objects.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(objects)
    }

    async fn save(&self, changes: ChangeSet) -> MetadataResult<()> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        for change in changes {
            next.apply(change)?;
        }
        *tables = next;
        Ok(())
    }

    async fn ping(&self) -> MetadataResult<()> {
        Ok(())
    }
}
