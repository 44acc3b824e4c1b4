//! Byte storage addressed by resolved absolute paths.
//!
//! The blob store knows nothing about buckets or metadata. Paths come from
//! the [`PathResolver`](super::path_resolver::PathResolver); errors are plain
//! `io::Error`s and the coordinator decides what each kind means.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::Path,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// A stream of byte chunks, as produced by request bodies and file readers.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// What a completed write produced.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct WriteReceipt {
    pub size_bytes: i64,
    /// Hex MD5 of the bytes written.
    pub etag: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Create a directory and any missing parents.
    async fn ensure_dir(&self, dir: &Path) -> io::Result<()>;

    /// Write a new file. Fails with `AlreadyExists` rather than overwrite.
    /// A failed write leaves no file behind.
    async fn create(&self, path: &Path, data: ByteStream) -> io::Result<WriteReceipt>;

    /// Truncate and rewrite an existing file. Fails with `NotFound` if the
    /// file is absent.
    async fn overwrite(&self, path: &Path, data: ByteStream) -> io::Result<WriteReceipt>;

    /// Move a file. Callers check that `to` is free beforehand.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn delete(&self, path: &Path) -> io::Result<()>;

    async fn read(&self, path: &Path) -> io::Result<ByteStream>;
}

/// Blob store over the local filesystem.
#[derive(Clone, Debug, Default)]
pub struct FsBlobStore;

impl FsBlobStore {
    pub fn new() -> Self {
        Self
    }
}

/// Removes a freshly created file when dropped unless disarmed, so a write
/// that errors or whose future is dropped mid-stream leaves nothing behind.
struct PartialFile<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!("removed partial file {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "could not remove partial file; it has no metadata and needs reclaiming"
            ),
        }
    }
}

/// Copy `data` into `file`, computing size and MD5 as it streams, then fsync.
async fn copy_into(file: &mut File, mut data: ByteStream) -> io::Result<WriteReceipt> {
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();
    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(WriteReceipt {
        size_bytes,
        etag: format!("{:x}", digest.compute()),
    })
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        fs::try_exists(path).await
    }

    async fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir).await
    }

    async fn create(&self, path: &Path, data: ByteStream) -> io::Result<WriteReceipt> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let partial = PartialFile::new(path);

        let receipt = copy_into(&mut file, data).await?;
        partial.keep();
        debug!("wrote {} bytes to {}", receipt.size_bytes, path.display());
        Ok(receipt)
    }

    async fn overwrite(&self, path: &Path, data: ByteStream) -> io::Result<WriteReceipt> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        let receipt = copy_into(&mut file, data).await?;
        debug!("rewrote {} with {} bytes", path.display(), receipt.size_bytes);
        Ok(receipt)
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(from, to).await?;
        debug!("moved {} -> {}", from.display(), to.display());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
                Ok(())
            }
            other => other,
        }
    }

    async fn read(&self, path: &Path) -> io::Result<ByteStream> {
        let file = File::open(path).await?;
        Ok(ReaderStream::new(file).boxed())
    }
}
