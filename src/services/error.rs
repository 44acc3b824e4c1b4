//! Error types shared by the metadata store, blob store and coordinator.

use std::{io, path::PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a [`MetadataStore`](super::metadata_store::MetadataStore).
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("foreign key constraint violated: {0}")]
    ForeignKey(String),
    #[error("{kind} `{id}` does not exist")]
    Missing { kind: &'static str, id: Uuid },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid object name `{0}`")]
    InvalidName(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(Uuid),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` still contains objects")]
    BucketNotEmpty(Uuid),
    #[error("object `{0}` not found")]
    ObjectNotFound(Uuid),
    #[error("object `{name}` already exists in bucket `{bucket_id}`")]
    ObjectAlreadyExists { bucket_id: Uuid, name: String },
    /// Metadata says the object exists, the filesystem disagrees.
    #[error("file missing at {0:?}")]
    FileMissing(PathBuf),
    #[error("storage I/O failed at {path:?}: {source}")]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The metadata save failed after a filesystem side effect had landed.
    /// Never retried automatically.
    #[error("metadata commit failed after {side_effect}: {source}")]
    CommitFailure {
        side_effect: String,
        #[source]
        source: MetadataError,
    },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::StorageIo {
            path: path.into(),
            source,
        }
    }

    /// True when the metadata store and the blob store disagree and need
    /// reconciliation, as opposed to bad input or a plain outage.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            StorageError::FileMissing(_) | StorageError::CommitFailure { .. }
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
pub type MetadataResult<T> = Result<T, MetadataError>;
