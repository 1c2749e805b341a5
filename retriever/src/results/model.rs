use std::fmt;

use crate::scanner::LocationKind;

/// Interned handle of a file path. Handles stay valid for the lifetime of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u32);

/// Identity of one line produced by one scan pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(pub(crate) u64);

/// Identity of one match produced by one scan pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub(crate) u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line#{}", self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match#{}", self.0)
    }
}

/// Enough of a line to place it in a view after it is gone from the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineKey {
    pub id: LineId,
    pub file: FileId,
    pub number: usize,
}

/// A match as reported by a scan, before it enters the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    pub offset: usize,
    pub length: usize,
    pub column: usize,
    pub original: String,
    pub kind: LocationKind,
}

/// A line as reported by a scan, before it enters the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpec {
    /// One-based line number
    pub number: usize,
    /// Offset of the line start in the file
    pub offset: usize,
    pub text: String,
    pub matches: Vec<MatchSpec>,
}

/// One occurrence of the pattern.
///
/// The original text and the offsets never change once the match is indexed. Only the
/// filter flag and the replacement move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub(crate) id: MatchId,
    pub(crate) file: FileId,
    pub(crate) line: LineId,
    pub(crate) original: String,
    pub(crate) offset: usize,
    pub(crate) length: usize,
    pub(crate) column: usize,
    pub(crate) kind: LocationKind,
    pub(crate) replacement: Option<String>,
    pub(crate) filtered: bool,
}

impl Match {
    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn line(&self) -> LineId {
        self.line
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Byte offset of the match within its line
    pub fn column(&self) -> usize {
        self.column
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    pub fn is_replaced(&self) -> bool {
        self.replacement.is_some()
    }

    /// The text the file holds for this match right now
    pub fn current_text(&self) -> &str {
        self.replacement.as_deref().unwrap_or(&self.original)
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }
}

/// The matches on one physical line, with the line text as it was at scan time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub(crate) id: LineId,
    pub(crate) file: FileId,
    pub(crate) number: usize,
    pub(crate) offset: usize,
    pub(crate) text: String,
    pub(crate) matches: Vec<MatchId>,
    pub(crate) filtered: bool,
}

impl Line {
    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    /// One-based line number
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Match ids in ascending offset order
    pub fn matches(&self) -> &[MatchId] {
        &self.matches
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn key(&self) -> LineKey {
        LineKey {
            id: self.id,
            file: self.file,
            number: self.number,
        }
    }
}
