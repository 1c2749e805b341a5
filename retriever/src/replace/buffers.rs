use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::errors::{SearchError, SearchResult};

/// Live text of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    dirty: bool,
    read_only: bool,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>, read_only: bool) -> Self {
        Self {
            text: text.into(),
            dirty: false,
            read_only,
        }
    }

    /// Text in `offset..offset + length`, if that range is valid
    pub fn get(&self, offset: usize, length: usize) -> Option<&str> {
        self.text.get(offset..offset.checked_add(length)?)
    }

    pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> SearchResult<()> {
        if self.read_only {
            return Err(SearchError::config_error("Buffer is read-only"));
        }
        if self.get(offset, length).is_none() {
            return Err(SearchError::config_error(format!(
                "Range {}..{} is outside the buffer",
                offset,
                offset + length
            )));
        }
        self.text.replace_range(offset..offset + length, text);
        self.dirty = true;
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the buffer holds changes not yet written to disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn mark_saved(&mut self) {
        self.dirty = false;
    }
}

/// Hands out live text buffers for files.
///
/// Connections are counted: a buffer lives from the first `connect` to the matching
/// last `disconnect`, so a caller holding a file open keeps its unsaved edits alive
/// across replace operations.
pub trait DocumentProvider: Send {
    fn connect(&mut self, path: &Path) -> SearchResult<()>;

    fn document(&mut self, path: &Path) -> Option<&mut TextBuffer>;

    /// The buffer of `path` if it is connected, for reading
    fn open_document(&self, path: &Path) -> Option<&TextBuffer>;

    /// Writes the buffer to disk
    fn commit(&mut self, path: &Path) -> SearchResult<()>;

    fn disconnect(&mut self, path: &Path);
}

#[derive(Debug)]
struct Connection {
    buffer: TextBuffer,
    count: usize,
}

/// Buffers read from and written back to the file system
#[derive(Debug, Default)]
pub struct FileBuffers {
    open: HashMap<PathBuf, Connection>,
}

impl FileBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self, path: &Path) -> bool {
        self.open.contains_key(path)
    }
}

impl DocumentProvider for FileBuffers {
    fn connect(&mut self, path: &Path) -> SearchResult<()> {
        if let Some(connection) = self.open.get_mut(path) {
            connection.count += 1;
            return Ok(());
        }
        let text = fs::read_to_string(path).map_err(|e| SearchError::from_io(path, e))?;
        let read_only = fs::metadata(path)
            .map_err(|e| SearchError::from_io(path, e))?
            .permissions()
            .readonly();
        trace!("Connected {} (read-only: {})", path.display(), read_only);
        self.open.insert(
            path.to_path_buf(),
            Connection {
                buffer: TextBuffer::new(text, read_only),
                count: 1,
            },
        );
        Ok(())
    }

    fn document(&mut self, path: &Path) -> Option<&mut TextBuffer> {
        self.open.get_mut(path).map(|c| &mut c.buffer)
    }

    fn open_document(&self, path: &Path) -> Option<&TextBuffer> {
        self.open.get(path).map(|c| &c.buffer)
    }

    fn commit(&mut self, path: &Path) -> SearchResult<()> {
        let connection = self
            .open
            .get_mut(path)
            .ok_or_else(|| SearchError::file_not_found(path))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let permissions = fs::metadata(path)
            .map_err(|e| SearchError::from_io(path, e))?
            .permissions();

        // Write next to the target, then rename over it
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| SearchError::from_io(dir, e))?;
        temp.write_all(connection.buffer.text().as_bytes())
            .map_err(|e| SearchError::from_io(path, e))?;
        fs::set_permissions(temp.path(), permissions)
            .map_err(|e| SearchError::from_io(path, e))?;
        temp.persist(path)
            .map_err(|e| SearchError::from_io(path, e.error))?;

        connection.buffer.mark_saved();
        debug!("Committed {}", path.display());
        Ok(())
    }

    fn disconnect(&mut self, path: &Path) {
        let Some(connection) = self.open.get_mut(path) else {
            return;
        };
        connection.count -= 1;
        if connection.count == 0 {
            if connection.buffer.is_dirty() {
                debug!("Dropping unsaved changes of {}", path.display());
            }
            self.open.remove(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_buffer_edits() -> SearchResult<()> {
        let mut buffer = TextBuffer::new("hello world", false);
        assert_eq!(buffer.get(6, 5), Some("world"));
        assert_eq!(buffer.get(8, 10), None);
        buffer.replace(6, 5, "there")?;
        assert_eq!(buffer.text(), "hello there");
        assert!(buffer.is_dirty());
        assert!(buffer.replace(20, 1, "x").is_err());

        let mut locked = TextBuffer::new("abc", true);
        assert!(locked.replace(0, 1, "x").is_err());
        Ok(())
    }

    #[test]
    fn test_commit_and_reference_counting() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "one two")?;

        let mut buffers = FileBuffers::new();
        buffers.connect(&path)?;
        buffers.connect(&path)?;
        if let Some(doc) = buffers.document(&path) {
            doc.replace(0, 3, "1")?;
        }
        buffers.commit(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "1 two");
        assert!(!buffers.document(&path).unwrap().is_dirty());

        buffers.disconnect(&path);
        assert!(buffers.is_connected(&path));
        buffers.disconnect(&path);
        assert!(!buffers.is_connected(&path));
        Ok(())
    }
}
