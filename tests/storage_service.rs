use async_trait::async_trait;
use bucket_store::{
    models::{bucket::Bucket, object::BucketObject},
    services::{
        blob_store::{BlobStore, ByteStream, FsBlobStore, WriteReceipt},
        error::{MetadataError, MetadataResult, StorageError},
        memory_store::InMemoryMetadataStore,
        metadata_store::{ChangeSet, MetadataStore},
        path_resolver::PathResolver,
        sqlite_store::SqliteMetadataStore,
        storage_service::StorageService,
    },
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::{
    io,
    path::Path,
    time::Duration,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tempfile::tempdir;
use uuid::Uuid;

fn body(data: &'static str) -> ByteStream {
    stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(data.as_bytes()))]).boxed()
}

fn service_with(root: &Path, metadata: Arc<dyn MetadataStore>) -> StorageService {
    StorageService::new(metadata, Arc::new(FsBlobStore::new()), PathResolver::new(root))
}

fn memory_service(root: &Path) -> StorageService {
    service_with(root, Arc::new(InMemoryMetadataStore::new()))
}

async fn sqlite_service(root: &Path) -> StorageService {
    let store = SqliteMetadataStore::in_memory().await.unwrap();
    service_with(root, Arc::new(store))
}

async fn read_to_string(service: &StorageService, object_id: Uuid) -> String {
    let (_, stream) = service.read_object(object_id).await.unwrap();
    let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
    String::from_utf8(chunks.concat()).unwrap()
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Wraps a real store and fails every `save` while `failing` is set.
struct FlakyStore {
    inner: InMemoryMetadataStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryMetadataStore::new(),
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn get_bucket(&self, id: Uuid) -> MetadataResult<Option<Bucket>> {
        self.inner.get_bucket(id).await
    }

    async fn buckets_for_owner(&self, owner_id: Uuid) -> MetadataResult<Vec<Bucket>> {
        self.inner.buckets_for_owner(owner_id).await
    }

    async fn get_object(&self, id: Uuid) -> MetadataResult<Option<BucketObject>> {
        self.inner.get_object(id).await
    }

    async fn objects_for_bucket(&self, bucket_id: Uuid) -> MetadataResult<Vec<BucketObject>> {
        self.inner.objects_for_bucket(bucket_id).await
    }

    async fn save(&self, changes: ChangeSet) -> MetadataResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetadataError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.inner.save(changes).await
    }

    async fn ping(&self) -> MetadataResult<()> {
        self.inner.ping().await
    }
}

/// Hides existing buckets from `buckets_for_owner`, so name checks fall
/// through to the store's own unique constraint.
struct ScanlessStore<S> {
    inner: S,
}

#[async_trait]
impl<S: MetadataStore> MetadataStore for ScanlessStore<S> {
    async fn get_bucket(&self, id: Uuid) -> MetadataResult<Option<Bucket>> {
        self.inner.get_bucket(id).await
    }

    async fn buckets_for_owner(&self, _owner_id: Uuid) -> MetadataResult<Vec<Bucket>> {
        Ok(Vec::new())
    }

    async fn get_object(&self, id: Uuid) -> MetadataResult<Option<BucketObject>> {
        self.inner.get_object(id).await
    }

    async fn objects_for_bucket(&self, bucket_id: Uuid) -> MetadataResult<Vec<BucketObject>> {
        self.inner.objects_for_bucket(bucket_id).await
    }

    async fn save(&self, changes: ChangeSet) -> MetadataResult<()> {
        self.inner.save(changes).await
    }

    async fn ping(&self) -> MetadataResult<()> {
        self.inner.ping().await
    }
}

/// Reports every path as free, as if another writer created the file right
/// after the existence check.
struct LateWriterBlobs {
    inner: FsBlobStore,
}

#[async_trait]
impl BlobStore for LateWriterBlobs {
    async fn exists(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    async fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        self.inner.ensure_dir(dir).await
    }

    async fn create(&self, path: &Path, data: ByteStream) -> io::Result<WriteReceipt> {
        self.inner.create(path, data).await
    }

    async fn overwrite(&self, path: &Path, data: ByteStream) -> io::Result<WriteReceipt> {
        self.inner.overwrite(path, data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        self.inner.delete(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<ByteStream> {
        self.inner.read(path).await
    }
}

#[tokio::test]
async fn bucket_names_are_unique_per_owner() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    service.create_bucket("Docs", alice).await.unwrap();
    let err = service.create_bucket("Docs", alice).await.unwrap_err();
    assert!(matches!(err, StorageError::BucketAlreadyExists(ref n) if n == "Docs"));

    service.create_bucket("Docs", bob).await.unwrap();
    assert_eq!(service.buckets_for_owner(alice).await.unwrap().len(), 1);
    assert_eq!(service.buckets_for_owner(bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_names_are_invalid_arguments() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();

    assert!(matches!(
        service.create_bucket("  ", owner).await,
        Err(StorageError::InvalidArgument(_))
    ));

    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    assert!(matches!(
        service
            .add_file_to_bucket(bucket.id, owner, "", None, body("x"))
            .await,
        Err(StorageError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn empty_bucket_has_no_directory() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let bucket = service.create_bucket("Docs", Uuid::new_v4()).await.unwrap();

    assert!(!service.paths().bucket_dir(bucket.id).exists());
    assert_eq!(count_entries(dir.path()), 0);
}

#[tokio::test]
async fn added_file_reads_back_and_is_listed_once() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    let object = service
        .add_file_to_bucket(
            bucket.id,
            owner,
            "notes.md",
            Some("text/markdown".into()),
            body("# hello"),
        )
        .await
        .unwrap();
    assert_eq!(object.size_bytes, 7);
    assert_eq!(object.content_type, "text/markdown");
    assert!(object.etag.is_some());

    let listed = service.bucket_objects(bucket.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "notes.md");
    assert_eq!(listed[0].id, object.id);

    assert_eq!(read_to_string(&service, object.id).await, "# hello");
    let on_disk = service.paths().resolve(bucket.id, "notes.md").unwrap();
    assert_eq!(std::fs::read_to_string(on_disk).unwrap(), "# hello");
}

#[tokio::test]
async fn duplicate_add_fails_and_keeps_original_bytes() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    let original = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("first"))
        .await
        .unwrap();
    let err = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ObjectAlreadyExists { ref name, .. } if name == "a.txt"));

    assert_eq!(read_to_string(&service, original.id).await, "first");
    assert_eq!(service.bucket_objects(bucket.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn add_to_missing_bucket_touches_nothing() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());

    let err = service
        .add_file_to_bucket(Uuid::new_v4(), Uuid::new_v4(), "a.txt", None, body("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BucketNotFound(_)));
    assert_eq!(count_entries(dir.path()), 0);
}

#[tokio::test]
async fn traversal_names_are_rejected_before_any_write() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    std::fs::create_dir(&root).unwrap();
    let service = memory_service(&root);
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    for name in ["../escape.txt", "nested/a.txt", "/etc/passwd"] {
        let err = service
            .add_file_to_bucket(bucket.id, owner, name, None, body("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)), "{name}: {err:?}");
    }
    assert_eq!(count_entries(&root), 0);
    assert!(!dir.path().join("escape.txt").exists());
    assert!(service.bucket_objects(bucket.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_upload_stream_leaves_neither_file_nor_metadata() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    let broken = stream::iter(vec![
        Ok(Bytes::from_static(b"part")),
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated upload")),
    ])
    .boxed();
    let err = service
        .add_file_to_bucket(bucket.id, owner, "big.bin", None, broken)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StorageIo { .. }));

    assert!(service.bucket_objects(bucket.id).await.unwrap().is_empty());
    assert!(!service.paths().resolve(bucket.id, "big.bin").unwrap().exists());

    // The name is free again.
    service
        .add_file_to_bucket(bucket.id, owner, "big.bin", None, body("ok"))
        .await
        .unwrap();
}

#[tokio::test]
async fn rename_round_trip_keeps_identity_and_bytes() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("payload"))
        .await
        .unwrap();

    let renamed = service.rename_object(object.id, "b.txt").await.unwrap();
    assert_eq!(renamed.id, object.id);
    assert_eq!(renamed.name, "b.txt");

    let back = service.rename_object(object.id, "a.txt").await.unwrap();
    assert_eq!(back.id, object.id);
    assert_eq!(back.name, "a.txt");
    assert_eq!(read_to_string(&service, object.id).await, "payload");
    assert!(!service.paths().resolve(bucket.id, "b.txt").unwrap().exists());
}

#[tokio::test]
async fn rename_onto_taken_name_changes_nothing() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let a = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("aaa"))
        .await
        .unwrap();
    let b = service
        .add_file_to_bucket(bucket.id, owner, "b.txt", None, body("bbb"))
        .await
        .unwrap();

    let err = service.rename_object(a.id, "b.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::ObjectAlreadyExists { .. }));

    let a_now = service.get_object(a.id).await.unwrap().unwrap();
    assert_eq!(a_now.name, "a.txt");
    assert_eq!(read_to_string(&service, a.id).await, "aaa");
    assert_eq!(read_to_string(&service, b.id).await, "bbb");
}

#[tokio::test]
async fn rename_of_unknown_or_invalid_target_fails() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("x"))
        .await
        .unwrap();

    assert!(matches!(
        service.rename_object(Uuid::new_v4(), "b.txt").await,
        Err(StorageError::ObjectNotFound(_))
    ));
    assert!(matches!(
        service.rename_object(object.id, "../b.txt").await,
        Err(StorageError::InvalidName(_))
    ));
    // Same name is a no-op.
    let same = service.rename_object(object.id, "a.txt").await.unwrap();
    assert_eq!(same, object);
}

#[tokio::test]
async fn docs_report_scenario() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let user = Uuid::new_v4();

    let docs = service.create_bucket("Docs", user).await.unwrap();
    service
        .add_file_to_bucket(docs.id, user, "report.txt", None, body("hello"))
        .await
        .unwrap();

    let objects = service.bucket_objects(docs.id).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].name, "report.txt");

    service
        .rename_object(objects[0].id, "final.txt")
        .await
        .unwrap();
    assert_eq!(read_to_string(&service, objects[0].id).await, "hello");

    let old_path = service.paths().resolve(docs.id, "report.txt").unwrap();
    let err = std::fs::read(&old_path).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    let new_path = service.paths().resolve(docs.id, "final.txt").unwrap();
    assert_eq!(std::fs::read_to_string(new_path).unwrap(), "hello");
}

#[tokio::test]
async fn soft_deleted_object_keeps_its_file() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("keep me"))
        .await
        .unwrap();

    service.delete_object(object.id).await.unwrap();

    assert!(service.bucket_objects(bucket.id).await.unwrap().is_empty());
    assert!(service.get_object(object.id).await.unwrap().is_none());
    let path = service.paths().resolve(bucket.id, "a.txt").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");

    assert!(matches!(
        service.delete_object(object.id).await,
        Err(StorageError::ObjectNotFound(_))
    ));
    // The retained file still occupies the name.
    assert!(matches!(
        service
            .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("new"))
            .await,
        Err(StorageError::ObjectAlreadyExists { .. })
    ));
}

#[tokio::test]
async fn bucket_deletion_requires_empty_bucket() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("x"))
        .await
        .unwrap();

    assert!(matches!(
        service.delete_bucket(bucket.id).await,
        Err(StorageError::BucketNotEmpty(_))
    ));

    service.delete_object(object.id).await.unwrap();
    service.delete_bucket(bucket.id).await.unwrap();

    assert!(service.get_bucket(bucket.id).await.unwrap().is_none());
    assert!(service.buckets_for_owner(owner).await.unwrap().is_empty());
    assert!(matches!(
        service.delete_bucket(bucket.id).await,
        Err(StorageError::BucketNotFound(_))
    ));
    assert!(matches!(
        service
            .add_file_to_bucket(bucket.id, owner, "b.txt", None, body("x"))
            .await,
        Err(StorageError::BucketNotFound(_))
    ));

    // The name is free for a new bucket.
    service.create_bucket("Docs", owner).await.unwrap();
}

#[tokio::test]
async fn bucket_rename_is_metadata_only_and_checks_collisions() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let docs = service.create_bucket("Docs", owner).await.unwrap();
    service.create_bucket("Photos", owner).await.unwrap();
    service
        .add_file_to_bucket(docs.id, owner, "a.txt", None, body("x"))
        .await
        .unwrap();

    let mut edit = docs.clone();
    edit.name = "Photos".into();
    assert!(matches!(
        service.update_bucket(&edit).await,
        Err(StorageError::BucketAlreadyExists(_))
    ));

    edit.name = "Papers".into();
    let renamed = service.update_bucket(&edit).await.unwrap();
    assert_eq!(renamed.name, "Papers");
    assert_eq!(renamed.id, docs.id);
    assert!(renamed.modified_at >= docs.modified_at);

    // Files are keyed by bucket id, so nothing moved.
    assert!(service.paths().resolve(docs.id, "a.txt").unwrap().exists());
    assert_eq!(
        service.get_bucket(docs.id).await.unwrap().unwrap().name,
        "Papers"
    );
}

#[tokio::test]
async fn metadata_rename_moves_the_file() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "draft.txt", None, body("text"))
        .await
        .unwrap();

    let mut edit = object.clone();
    edit.name = "final.txt".into();
    edit.content_type = "text/plain".into();
    let updated = service.update_object_metadata(&edit).await.unwrap();

    assert_eq!(updated.name, "final.txt");
    assert_eq!(updated.content_type, "text/plain");
    assert!(!service.paths().resolve(bucket.id, "draft.txt").unwrap().exists());
    assert_eq!(read_to_string(&service, object.id).await, "text");
}

#[tokio::test]
async fn metadata_only_update_leaves_disk_alone() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.bin", None, body("x"))
        .await
        .unwrap();

    let mut edit = object.clone();
    edit.content_type = "image/png".into();
    edit.owner_id = Uuid::new_v4();
    let updated = service.update_object_metadata(&edit).await.unwrap();
    assert_eq!(updated.content_type, "image/png");
    assert_eq!(updated.owner_id, owner);

    let stored = service.get_object(object.id).await.unwrap().unwrap();
    assert_eq!(stored.content_type, "image/png");
    assert!(service.paths().resolve(bucket.id, "a.bin").unwrap().exists());

    edit.size_bytes = -1;
    assert!(matches!(
        service.update_object_metadata(&edit).await,
        Err(StorageError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn content_update_rewrites_bytes_but_not_metadata() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("a longer original"))
        .await
        .unwrap();

    let receipt = service
        .update_object_contents(object.id, body("short"))
        .await
        .unwrap();
    assert_eq!(receipt.size_bytes, 5);

    assert_eq!(read_to_string(&service, object.id).await, "short");
    let stored = service.get_object(object.id).await.unwrap().unwrap();
    assert_eq!(stored.size_bytes, object.size_bytes);
    assert_eq!(stored.etag, object.etag);

    let mut edit = stored.clone();
    edit.size_bytes = receipt.size_bytes;
    let updated = service.update_object_metadata(&edit).await.unwrap();
    assert_eq!(updated.size_bytes, 5);
}

#[tokio::test]
async fn missing_file_is_reported_as_divergence() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("x"))
        .await
        .unwrap();

    let path = service.paths().resolve(bucket.id, "a.txt").unwrap();
    std::fs::remove_file(&path).unwrap();

    let err = service
        .update_object_contents(object.id, body("y"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::FileMissing(ref p) if *p == path));
    assert!(err.is_divergence());
    assert!(!path.exists());

    let err = service.rename_object(object.id, "b.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::FileMissing(_)));
    assert_eq!(
        service.get_object(object.id).await.unwrap().unwrap().name,
        "a.txt"
    );

    assert!(matches!(
        service.read_object(object.id).await,
        Err(StorageError::FileMissing(_))
    ));
}

#[tokio::test]
async fn commit_failure_after_write_leaves_orphan_and_is_fatal() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new());
    let service = service_with(dir.path(), store.clone());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::CommitFailure { .. }), "{err:?}");
    assert!(err.is_divergence());

    // The file landed, the metadata did not.
    let path = service.paths().resolve(bucket.id, "a.txt").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "orphan");
    store.failing.store(false, Ordering::SeqCst);
    assert!(service.bucket_objects(bucket.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_failure_after_move_keeps_the_move() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new());
    let service = service_with(dir.path(), store.clone());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();
    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("x"))
        .await
        .unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = service.rename_object(object.id, "b.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::CommitFailure { .. }));

    assert!(!service.paths().resolve(bucket.id, "a.txt").unwrap().exists());
    assert!(service.paths().resolve(bucket.id, "b.txt").unwrap().exists());
    let stored = service.get_object(object.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "a.txt");
}

#[tokio::test]
async fn metadata_failure_without_side_effect_is_not_divergence() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new());
    let service = service_with(dir.path(), store.clone());

    store.failing.store(true, Ordering::SeqCst);
    let err = service
        .create_bucket("Docs", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Metadata(_)));
    assert!(!err.is_divergence());
}

#[tokio::test]
async fn cancelled_upload_leaves_neither_file_nor_metadata() {
    let dir = tempdir().unwrap();
    let service = memory_service(dir.path());
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    let stalled: ByteStream = stream::iter(vec![Ok(Bytes::from_static(b"part"))])
        .chain(stream::pending())
        .boxed();
    let upload = service.add_file_to_bucket(bucket.id, owner, "a.txt", None, stalled);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), upload)
            .await
            .is_err()
    );

    assert!(!service.paths().resolve(bucket.id, "a.txt").unwrap().exists());
    assert!(service.bucket_objects(bucket.id).await.unwrap().is_empty());

    let object = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("whole"))
        .await
        .unwrap();
    assert_eq!(read_to_string(&service, object.id).await, "whole");
}

#[tokio::test]
async fn store_constraint_catches_bucket_name_race() {
    let dir = tempdir().unwrap();
    let store = ScanlessStore {
        inner: SqliteMetadataStore::in_memory().await.unwrap(),
    };
    let service = service_with(dir.path(), Arc::new(store));
    let owner = Uuid::new_v4();

    let first = service.create_bucket("Docs", owner).await.unwrap();
    let err = service.create_bucket("Docs", owner).await.unwrap_err();
    assert!(matches!(err, StorageError::BucketAlreadyExists(ref n) if n == "Docs"), "{err:?}");
    assert!(!err.is_divergence());

    let other = service.create_bucket("Papers", owner).await.unwrap();
    let err = service
        .update_bucket(&Bucket {
            name: "Docs".into(),
            ..other
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BucketAlreadyExists(_)), "{err:?}");
    assert_eq!(service.get_bucket(first.id).await.unwrap().unwrap().name, "Docs");
}

#[tokio::test]
async fn file_created_after_existence_check_is_a_name_conflict() {
    let dir = tempdir().unwrap();
    let service = StorageService::new(
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(LateWriterBlobs {
            inner: FsBlobStore::new(),
        }),
        PathResolver::new(dir.path()),
    );
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    let original = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("first"))
        .await
        .unwrap();
    let err = service
        .add_file_to_bucket(bucket.id, owner, "a.txt", None, body("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ObjectAlreadyExists { ref name, .. } if name == "a.txt"));

    assert_eq!(read_to_string(&service, original.id).await, "first");
    assert_eq!(service.bucket_objects(bucket.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_adds_of_one_name_admit_exactly_one() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    let owner = Uuid::new_v4();
    let bucket = service.create_bucket("Docs", owner).await.unwrap();

    let (a, b) = tokio::join!(
        service.add_file_to_bucket(bucket.id, owner, "a.txt", None, body("one")),
        service.add_file_to_bucket(bucket.id, owner, "a.txt", None, body("two")),
    );
    let (winner, loser) = match (a, b) {
        (Ok(object), Err(err)) | (Err(err), Ok(object)) => (object, err),
        other => panic!("expected one success and one conflict, got {other:?}"),
    };
    assert!(matches!(loser, StorageError::ObjectAlreadyExists { .. }), "{loser:?}");

    let listed = service.bucket_objects(bucket.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, winner.id);
}
