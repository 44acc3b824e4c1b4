//! src/services/storage_service.rs
//!
//! StorageService coordinates the metadata store and the blob store so the
//! two never disagree in a way callers can see. Object bytes live beneath
//! `storage_root/{bucket_id}/{name}`. Metadata mutations are staged in a
//! `ChangeSet` and saved as the last step of every operation, so a failure
//! or cancellation before that point leaves metadata untouched.
//!
//! Two windows remain where the stores can diverge: a file written (or moved)
//! whose metadata save then fails. Both surface as
//! `StorageError::CommitFailure` and are never rolled back automatically.

use crate::models::{bucket::Bucket, object::BucketObject};
use chrono::Utc;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    blob_store::{BlobStore, ByteStream, WriteReceipt},
    error::{MetadataError, StorageError, StorageResult},
    metadata_store::{ChangeSet, MetadataStore},
    path_resolver::PathResolver,
};

/// StorageService provides the bucket and object lifecycle:
/// - Buckets: create, look up, rename, soft-delete (empty buckets only)
/// - Objects: add, list, read, rename, update metadata or contents, soft-delete
///
/// It holds no state between calls beyond shared handles, and takes no
/// locks. Name uniqueness for objects is decided by the filesystem, for
/// buckets by the metadata store's unique constraint.
#[derive(Clone)]
pub struct StorageService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    paths: PathResolver,
}

impl StorageService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        paths: PathResolver,
    ) -> Self {
        Self {
            metadata,
            blobs,
            paths,
        }
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn metadata(&self) -> &dyn MetadataStore {
        &*self.metadata
    }

    /// Fetch a bucket that exists and is not soft-deleted.
    async fn active_bucket(&self, id: Uuid) -> StorageResult<Bucket> {
        match self.metadata.get_bucket(id).await? {
            Some(bucket) if bucket.is_active() => Ok(bucket),
            _ => Err(StorageError::BucketNotFound(id)),
        }
    }

    /// Fetch an object that exists and is not soft-deleted.
    async fn active_object(&self, id: Uuid) -> StorageResult<BucketObject> {
        match self.metadata.get_object(id).await? {
            Some(object) if object.is_active() => Ok(object),
            _ => Err(StorageError::ObjectNotFound(id)),
        }
    }

    async fn file_exists(&self, path: &Path) -> StorageResult<bool> {
        self.blobs
            .exists(path)
            .await
            .map_err(|err| StorageError::io(path, err))
    }

    /// Save changes made after a filesystem side effect already landed.
    /// Any failure here is a divergence between the stores.
    async fn commit_after(&self, changes: ChangeSet, side_effect: String) -> StorageResult<()> {
        self.metadata.save(changes).await.map_err(|source| {
            error!(
                side_effect = %side_effect,
                error = %source,
                "metadata commit failed after filesystem change; stores need reconciliation"
            );
            StorageError::CommitFailure {
                side_effect,
                source,
            }
        })
    }

    // --- Buckets ---

    /// Create a bucket for `owner_id`.
    ///
    /// The name must not be blank and must not match another active bucket
    /// of the same owner. Nothing is written to disk: the bucket directory
    /// appears with the first object.
    pub async fn create_bucket(&self, name: &str, owner_id: Uuid) -> StorageResult<Bucket> {
        ensure_not_blank(name, "bucket name")?;

        let existing = self.metadata.buckets_for_owner(owner_id).await?;
        if existing.iter().any(|b| b.is_active() && b.name == name) {
            return Err(StorageError::BucketAlreadyExists(name.to_string()));
        }

        let bucket = Bucket::new(owner_id, name);
        let mut changes = ChangeSet::new();
        changes.add_bucket(bucket.clone());
        self.metadata
            .save(changes)
            .await
            .map_err(|err| bucket_save_error(err, name))?;

        info!(bucket_id = %bucket.id, owner_id = %owner_id, "created bucket `{}`", name);
        Ok(bucket)
    }

    /// Active bucket by id, `None` when absent or deleted.
    pub async fn get_bucket(&self, id: Uuid) -> StorageResult<Option<Bucket>> {
        Ok(self
            .metadata
            .get_bucket(id)
            .await?
            .filter(Bucket::is_active))
    }

    /// Active buckets of an owner, oldest first.
    pub async fn buckets_for_owner(&self, owner_id: Uuid) -> StorageResult<Vec<Bucket>> {
        let mut buckets = self.metadata.buckets_for_owner(owner_id).await?;
        buckets.retain(Bucket::is_active);
        Ok(buckets)
    }

    /// Persist a new display name. Only `name` is taken from `bucket`;
    /// owner and lifecycle state cannot be changed here.
    pub async fn update_bucket(&self, bucket: &Bucket) -> StorageResult<Bucket> {
        let current = self.active_bucket(bucket.id).await?;
        ensure_not_blank(&bucket.name, "bucket name")?;
        if current.name == bucket.name {
            return Ok(current);
        }

        let siblings = self.metadata.buckets_for_owner(current.owner_id).await?;
        if siblings
            .iter()
            .any(|b| b.id != current.id && b.is_active() && b.name == bucket.name)
        {
            return Err(StorageError::BucketAlreadyExists(bucket.name.clone()));
        }

        let updated = Bucket {
            name: bucket.name.clone(),
            modified_at: Utc::now(),
            ..current
        };
        let mut changes = ChangeSet::new();
        changes.update_bucket(updated.clone());
        self.metadata
            .save(changes)
            .await
            .map_err(|err| bucket_save_error(err, &updated.name))?;

        debug!(bucket_id = %updated.id, "renamed bucket to `{}`", updated.name);
        Ok(updated)
    }

    /// Soft-delete an empty bucket.
    ///
    /// Fails with `BucketNotEmpty` while any active object remains. The
    /// bucket directory is left on disk.
    pub async fn delete_bucket(&self, id: Uuid) -> StorageResult<()> {
        let bucket = self.active_bucket(id).await?;

        let objects = self.metadata.objects_for_bucket(bucket.id).await?;
        if objects.iter().any(BucketObject::is_active) {
            warn!(bucket_id = %id, "refusing to delete non-empty bucket");
            return Err(StorageError::BucketNotEmpty(id));
        }

        let mut changes = ChangeSet::new();
        changes.soft_delete_bucket(bucket.id);
        self.metadata.save(changes).await?;

        info!(bucket_id = %id, "deleted bucket `{}`", bucket.name);
        Ok(())
    }

    // --- Objects ---

    /// Store a new file in a bucket and record its metadata.
    ///
    /// Order matters: the bucket is checked before anything touches disk,
    /// the metadata row is staged before the bytes are written, and the save
    /// comes last. A failed write drops the staged row. A failed save after
    /// a successful write leaves an orphan file and returns `CommitFailure`.
    pub async fn add_file_to_bucket(
        &self,
        bucket_id: Uuid,
        owner_id: Uuid,
        name: &str,
        content_type: Option<String>,
        data: ByteStream,
    ) -> StorageResult<BucketObject> {
        ensure_not_blank(name, "object name")?;
        let bucket = self.active_bucket(bucket_id).await?;

        let path = self.paths.resolve(bucket.id, name)?;
        if self.file_exists(&path).await? {
            return Err(object_exists(bucket.id, name));
        }

        let dir = self.paths.bucket_dir(bucket.id);
        self.blobs
            .ensure_dir(&dir)
            .await
            .map_err(|err| StorageError::io(&dir, err))?;

        let mut object = BucketObject::new(bucket.id, owner_id, name, content_type);
        let mut changes = ChangeSet::new();
        changes.add_object(object.clone());

        let receipt = self
            .blobs
            .create(&path, data)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => object_exists(bucket.id, name),
                _ => StorageError::io(&path, err),
            })?;

        object.size_bytes = receipt.size_bytes;
        object.etag = Some(receipt.etag);
        if let Some(staged) = changes.staged_object_mut(object.id) {
            *staged = object.clone();
        }

        self.commit_after(changes, format!("writing {}", path.display()))
            .await?;

        info!(
            bucket_id = %bucket.id,
            object_id = %object.id,
            size_bytes = object.size_bytes,
            "added `{}`",
            object.name
        );
        Ok(object)
    }

    /// Active objects of a bucket, oldest first. Empty for unknown buckets.
    pub async fn bucket_objects(&self, bucket_id: Uuid) -> StorageResult<Vec<BucketObject>> {
        let mut objects = self.metadata.objects_for_bucket(bucket_id).await?;
        objects.retain(BucketObject::is_active);
        Ok(objects)
    }

    /// Active object by id, `None` when absent or deleted.
    pub async fn get_object(&self, id: Uuid) -> StorageResult<Option<BucketObject>> {
        Ok(self
            .metadata
            .get_object(id)
            .await?
            .filter(BucketObject::is_active))
    }

    /// Metadata plus a byte stream of the object's contents.
    pub async fn read_object(&self, id: Uuid) -> StorageResult<(BucketObject, ByteStream)> {
        let object = self.active_object(id).await?;
        let path = self.paths.resolve(object.bucket_id, &object.name)?;
        let stream = self.blobs.read(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => StorageError::FileMissing(path.clone()),
            _ => StorageError::io(&path, err),
        })?;
        Ok((object, stream))
    }

    /// Rename an object: move the file, then save the new name.
    ///
    /// Renaming to the current name is a no-op.
    pub async fn rename_object(&self, id: Uuid, new_name: &str) -> StorageResult<BucketObject> {
        let current = self.active_object(id).await?;
        ensure_not_blank(new_name, "object name")?;
        if current.name == new_name {
            return Ok(current);
        }

        let updated = BucketObject {
            name: new_name.to_string(),
            ..current.clone()
        };
        self.move_and_save(&current, updated).await
    }

    /// Persist caller-edited object metadata.
    ///
    /// `name`, `content_type` and `size_bytes` are taken from `object`; the
    /// rest is kept from the stored record. A name change moves the file in
    /// the same call, exactly like [`rename_object`](Self::rename_object).
    pub async fn update_object_metadata(
        &self,
        object: &BucketObject,
    ) -> StorageResult<BucketObject> {
        let current = self.active_object(object.id).await?;
        ensure_not_blank(&object.name, "object name")?;
        ensure_not_blank(&object.content_type, "content type")?;
        if object.size_bytes < 0 {
            return Err(StorageError::InvalidArgument(
                "size_bytes must not be negative".into(),
            ));
        }

        let updated = BucketObject {
            name: object.name.clone(),
            content_type: object.content_type.clone(),
            size_bytes: object.size_bytes,
            ..current.clone()
        };
        if updated == current {
            return Ok(current);
        }
        if updated.name != current.name {
            return self.move_and_save(&current, updated).await;
        }

        let updated = BucketObject {
            modified_at: Utc::now(),
            ..updated
        };
        let mut changes = ChangeSet::new();
        changes.update_object(updated.clone());
        self.metadata.save(changes).await?;
        Ok(updated)
    }

    /// Replace the bytes of an existing object in place.
    ///
    /// Metadata is not touched: `size_bytes` and `etag` keep their old
    /// values. The returned receipt carries the new size and checksum for
    /// callers that want to record them via `update_object_metadata`.
    pub async fn update_object_contents(
        &self,
        id: Uuid,
        data: ByteStream,
    ) -> StorageResult<WriteReceipt> {
        let object = self.active_object(id).await?;
        let path = self.paths.resolve(object.bucket_id, &object.name)?;
        if !self.file_exists(&path).await? {
            return Err(StorageError::FileMissing(path));
        }

        self.blobs
            .overwrite(&path, data)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StorageError::FileMissing(path.clone()),
                _ => StorageError::io(&path, err),
            })
    }

    /// Soft-delete an object. The file stays on disk for later reclamation.
    pub async fn delete_object(&self, id: Uuid) -> StorageResult<()> {
        let object = self.active_object(id).await?;

        let mut changes = ChangeSet::new();
        changes.soft_delete_object(object.id);
        self.metadata.save(changes).await?;

        debug!(object_id = %id, "soft-deleted `{}`", object.name);
        Ok(())
    }

    /// Move `current`'s file to `updated.name`, then save `updated`.
    ///
    /// A failed save after the move is reported as `CommitFailure`; the file
    /// is not moved back, since that move could fail too.
    async fn move_and_save(
        &self,
        current: &BucketObject,
        updated: BucketObject,
    ) -> StorageResult<BucketObject> {
        let from = self.paths.resolve(current.bucket_id, &current.name)?;
        let to = self.paths.resolve(current.bucket_id, &updated.name)?;

        if !self.file_exists(&from).await? {
            return Err(StorageError::FileMissing(from));
        }
        if self.file_exists(&to).await? {
            return Err(object_exists(current.bucket_id, &updated.name));
        }

        self.blobs
            .rename(&from, &to)
            .await
            .map_err(|err| move_error(err, &from))?;

        let updated = BucketObject {
            modified_at: Utc::now(),
            ..updated
        };
        let mut changes = ChangeSet::new();
        changes.update_object(updated.clone());
        self.commit_after(
            changes,
            format!("moving {} to {}", from.display(), to.display()),
        )
        .await?;

        debug!(object_id = %updated.id, "renamed `{}` to `{}`", current.name, updated.name);
        Ok(updated)
    }
}

fn ensure_not_blank(value: &str, what: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::InvalidArgument(format!("{what} must not be blank")));
    }
    Ok(())
}

fn object_exists(bucket_id: Uuid, name: &str) -> StorageError {
    StorageError::ObjectAlreadyExists {
        bucket_id,
        name: name.to_string(),
    }
}

/// A unique violation on a bucket save is the authoritative "name taken"
/// signal when two creators race past the scan.
fn bucket_save_error(err: MetadataError, name: &str) -> StorageError {
    match err {
        MetadataError::UniqueViolation(_) => StorageError::BucketAlreadyExists(name.to_string()),
        other => StorageError::Metadata(other),
    }
}

fn move_error(err: std::io::Error, from: &Path) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::FileMissing(PathBuf::from(from)),
        _ => StorageError::io(from, err),
    }
}
