use std::path::PathBuf;

use crate::results::{FileId, LineId, LineKey};

/// A node of the result view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// A line with matches; carries its file and number so it can be placed after removal
    Line {
        id: LineId,
        file: FileId,
        number: usize,
    },
    File(FileId),
    /// A directory between a project root and a file, hierarchical layout only
    Folder(PathBuf),
    /// The "N of M matches filtered" node
    FilteredSummary,
}

impl From<LineKey> for Element {
    fn from(key: LineKey) -> Self {
        Element::Line {
            id: key.id,
            file: key.file,
            number: key.number,
        }
    }
}

impl Element {
    pub fn is_line(&self) -> bool {
        matches!(self, Element::Line { .. })
    }
}
