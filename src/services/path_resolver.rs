//! Maps `(bucket id, object name)` pairs onto paths under the storage root.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};

/// Longest leaf name most filesystems accept.
const MAX_OBJECT_NAME_LEN: usize = 255;

/// Pure path arithmetic over a configured storage root. Never touches disk.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every object of a bucket: `root/{bucket_id}`.
    pub fn bucket_dir(&self, bucket_id: Uuid) -> PathBuf {
        self.root.join(bucket_id.hyphenated().to_string())
    }

    /// Resolve an object name to `root/{bucket_id}/{name}`.
    ///
    /// Only bare leaf names are accepted. Anything carrying a directory
    /// component (`../x`, `a/b`, `/etc/passwd`, `a\b`) is rejected rather
    /// than silently flattened, so two different inputs never land on the
    /// same file.
    pub fn resolve(&self, bucket_id: Uuid, name: &str) -> StorageResult<PathBuf> {
        let leaf = sanitize(name).ok_or_else(|| {
            warn!(name, "rejected object name");
            StorageError::InvalidName(name.to_string())
        })?;
        let path = self.bucket_dir(bucket_id).join(leaf);
        debug!("resolved {}/{} => {}", bucket_id, name, path.display());
        Ok(path)
    }
}

/// Return the leaf name if `name` is already a safe leaf, `None` otherwise.
fn sanitize(name: &str) -> Option<&str> {
    if name.trim().is_empty() || name.len() > MAX_OBJECT_NAME_LEN {
        return None;
    }
    if name.contains('\\') || name.chars().any(|c| c.is_control()) {
        return None;
    }

    let mut components = Path::new(name).components();
    let leaf = match (components.next(), components.next()) {
        (Some(Component::Normal(leaf)), None) => leaf.to_str()?,
        _ => return None,
    };

    // `Path::components` drops a trailing slash and `.` segments, so compare
    // against the input to catch `name/` and `./name`.
    (leaf == name).then_some(leaf)
}
