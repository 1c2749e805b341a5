use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;

use crate::errors::{SearchError, SearchResult};

/// On-disk state of a file at the time it was scanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSignature {
    pub modified: Option<SystemTime>,
    pub size: u64,
    pub content_hash: u64,
}

pub(crate) fn hash_content(content: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

impl FileSignature {
    /// Signature of `path` whose current text is `content`
    pub fn compute(path: &Path, content: &str) -> SearchResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| SearchError::from_io(path, e))?;
        Ok(Self {
            modified: metadata.modified().ok(),
            size: metadata.len(),
            content_hash: hash_content(content.as_bytes()),
        })
    }

    /// Whether the file on disk still holds the scanned content.
    ///
    /// Timestamps cannot be trusted either way: a rewrite within the timestamp
    /// resolution keeps the old one, and touching a file changes it without changing
    /// the content. So unless the size differs, the content is compared.
    pub fn matches_disk(&self, path: &Path) -> bool {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return false,
        };
        if metadata.len() != self.size {
            return false;
        }
        if metadata.modified().ok() != self.modified {
            trace!("Timestamp of {} changed", path.display());
        }
        std::fs::read(path)
            .map(|bytes| hash_content(&bytes) == self.content_hash)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_signature_detects_changes() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "alpha")?;
        let signature = FileSignature::compute(&path, "alpha")?;
        assert!(signature.matches_disk(&path));

        fs::write(&path, "alpha")?;
        assert!(signature.matches_disk(&path));

        fs::write(&path, "gamma")?;
        assert!(!signature.matches_disk(&path));

        fs::remove_file(&path)?;
        assert!(!signature.matches_disk(&path));
        Ok(())
    }

    #[test]
    fn test_same_size_rewrite_with_old_timestamp() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "alpha")?;
        let signature = FileSignature::compute(&path, "alpha")?;
        let modified = fs::metadata(&path)?.modified()?;

        fs::write(&path, "omega")?;
        fs::OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_modified(modified)?;
        assert!(!signature.matches_disk(&path));
        Ok(())
    }
}
