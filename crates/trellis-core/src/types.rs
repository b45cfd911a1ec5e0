use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one execution of a graph.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to the runtime's storage location.
///
/// The engine never inspects the contents behind this handle. It joins
/// subpaths for its own run logs and passes clones through to handlers
/// that ask for storage access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHandle(PathBuf);

impl StorageHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// A location under the storage root.
    pub fn join(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.0.join(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert!(!a.to_string().is_empty());
    }

    #[test]
    fn test_storage_handle_join() {
        let storage = StorageHandle::new("/tmp/trellis");
        assert_eq!(storage.path(), Path::new("/tmp/trellis"));
        assert_eq!(storage.join("logs"), PathBuf::from("/tmp/trellis/logs"));
    }
}
