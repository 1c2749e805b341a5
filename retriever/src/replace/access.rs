use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decides which files may be written
pub trait WriteAccess: Send + Sync {
    fn is_read_only(&self, path: &Path) -> bool;

    /// Tries to make all `paths` writable in one batch. Returns the ones still read-only.
    fn make_writable(&self, paths: &[PathBuf]) -> Vec<PathBuf>;
}

/// Uses the read-only permission of the file system.
/// Clearing it is opt-in; by default read-only files stay read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemAccess {
    clear_readonly: bool,
}

impl FileSystemAccess {
    pub fn new(clear_readonly: bool) -> Self {
        Self { clear_readonly }
    }
}

#[cfg(unix)]
fn clear_readonly(permissions: &mut fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    permissions.set_mode(permissions.mode() | 0o200);
}

#[cfg(not(unix))]
fn clear_readonly(permissions: &mut fs::Permissions) {
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
}

impl WriteAccess for FileSystemAccess {
    fn is_read_only(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false)
    }

    fn make_writable(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        if !self.clear_readonly {
            return paths.to_vec();
        }
        paths
            .iter()
            .filter(|path| {
                let mut permissions = match fs::metadata(path) {
                    Ok(metadata) => metadata.permissions(),
                    Err(_) => return true,
                };
                clear_readonly(&mut permissions);
                match fs::set_permissions(path, permissions) {
                    Ok(()) => {
                        debug!("Made {} writable", path.display());
                        self.is_read_only(path)
                    }
                    Err(e) => {
                        warn!("Cannot make {} writable: {}", path.display(), e);
                        true
                    }
                }
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set_readonly(path: &Path) -> std::io::Result<()> {
        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_readonly(true);
        fs::set_permissions(path, permissions)
    }

    #[test]
    fn test_read_only_detection() -> std::io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("locked.txt");
        fs::write(&path, "x")?;
        set_readonly(&path)?;

        let keep = FileSystemAccess::default();
        assert!(keep.is_read_only(&path));
        assert_eq!(keep.make_writable(&[path.clone()]), vec![path.clone()]);

        let clear = FileSystemAccess::new(true);
        assert!(clear.make_writable(&[path.clone()]).is_empty());
        assert!(!clear.is_read_only(&path));
        Ok(())
    }
}
