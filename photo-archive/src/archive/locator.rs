//! Maps archive identifiers to directories.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// A resolved download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// Identifier taken verbatim from the request path.
    pub identifier: String,
    /// Directory that will be archived.
    pub directory: PathBuf,
}

impl ArchiveRequest {
    /// File name suggested to the client.
    pub fn file_name(&self) -> String {
        format!("{}.zip", self.identifier)
    }
}

/// Resolves identifiers below a fixed base directory.
#[derive(Debug, Clone)]
pub struct ArchiveLocator {
    base_dir: PathBuf,
}

impl ArchiveLocator {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve `identifier` to `base_dir/identifier`.
    ///
    /// The identifier is joined as-is. Values such as `..` or absolute paths
    /// can point outside the base directory; they are logged but not
    /// rejected.
    pub fn resolve(&self, identifier: &str) -> Result<ArchiveRequest> {
        if escapes_base(identifier) {
            warn!(identifier, "Archive identifier is not a plain path segment");
        }

        let directory = self.base_dir.join(identifier);
        if !directory.exists() {
            return Err(Error::not_found(identifier));
        }

        Ok(ArchiveRequest {
            identifier: identifier.to_string(),
            directory,
        })
    }
}

fn escapes_base(identifier: &str) -> bool {
    identifier.contains(['/', '\\'])
        || identifier == ".."
        || Path::new(identifier).is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_existing_directory() {
        let base = tempfile::tempdir().unwrap();
        std::fs::create_dir(base.path().join("abc123")).unwrap();

        let locator = ArchiveLocator::new(base.path());
        let request = locator.resolve("abc123").unwrap();

        assert_eq!(request.identifier, "abc123");
        assert_eq!(request.directory, base.path().join("abc123"));
        assert_eq!(request.file_name(), "abc123.zip");
    }

    #[test]
    fn test_resolve_missing_directory() {
        let base = tempfile::tempdir().unwrap();
        let locator = ArchiveLocator::new(base.path());

        let err = locator.resolve("missing").unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound { identifier } if identifier == "missing"));
    }

    #[test]
    fn test_parent_segment_is_not_rejected() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("photos");
        std::fs::create_dir(&base).unwrap();

        let locator = ArchiveLocator::new(&base);
        let request = locator.resolve("..").unwrap();
        assert_eq!(request.directory, base.join(".."));
    }

    #[test]
    fn test_escapes_base() {
        assert!(escapes_base(".."));
        assert!(escapes_base("a/b"));
        assert!(escapes_base("/etc"));
        assert!(!escapes_base("abc123"));
        assert!(!escapes_base("..abc"));
    }
}
