//! Lexical location classification of matches.
//!
//! A [`Scanner`] reads a whole file once and produces a [`FileAnalysis`]: the line
//! start offsets plus the regions of the text that are comments, string literals,
//! import or preprocessor lines, and function names. Matches reported by the search
//! engine are then classified by looking their offset up in the analysis. Scanners
//! classify; they never drop matches.
//!
//! The [`ScannerRegistry`] picks the scanner for a file by content type and extension.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::ops::Range;

mod content_type;
mod lexical;
mod registry;

pub use content_type::{ContentType, ContentTypeRegistry};
pub use lexical::{LexicalScanner, MarkupScanner, Syntax};
pub use registry::{priority, ScannerDescriptor, ScannerFactory, ScannerRegistry};

bitflags! {
    /// Where in the source text a match was found
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LocationKind: u32 {
        const COMMENT = 1;
        const STRING = 1 << 1;
        const IMPORT = 1 << 2;
        const PREPROCESSOR = 1 << 3;
        const FUNCTION = 1 << 4;
        const OTHER = 1 << 5;
    }
}

impl LocationKind {
    /// Parses a location name as used in configuration files and on the command line
    pub fn from_location_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "comment" | "comments" => Some(Self::COMMENT),
            "string" | "strings" => Some(Self::STRING),
            "import" | "imports" | "include" => Some(Self::IMPORT),
            "preprocessor" => Some(Self::PREPROCESSOR),
            "function" | "functions" => Some(Self::FUNCTION),
            "other" => Some(Self::OTHER),
            "all" => Some(Self::all()),
            _ => None,
        }
    }

    /// Parses a comma-separated list of location names
    pub fn parse_list(list: &str) -> Option<Self> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .try_fold(Self::empty(), |acc, name| {
                Self::from_location_name(name).map(|k| acc | k)
            })
    }
}

/// A classified span of the file text, in byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub kind: LocationKind,
}

/// Line structure and location regions of one file
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    line_starts: Vec<usize>,
    regions: Vec<Region>,
    len: usize,
}

impl FileAnalysis {
    /// Regions must be sorted by start and must not overlap
    pub fn new(text: &str, regions: Vec<Region>) -> Self {
        debug_assert!(regions.windows(2).all(|w| w[0].end <= w[1].start));
        Self {
            line_starts: line_starts(text),
            regions,
            len: text.len(),
        }
    }

    /// Analysis carrying only line boundaries
    pub fn lines_only(text: &str) -> Self {
        Self::new(text, Vec::new())
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Zero-based index of the line containing `offset`
    pub fn line_index(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        }
    }

    /// Byte range of line `index`, without its terminator
    pub fn line_range(&self, text: &str, index: usize) -> Range<usize> {
        let start = self.line_starts.get(index).copied().unwrap_or(self.len);
        let mut end = self
            .line_starts
            .get(index + 1)
            .copied()
            .unwrap_or(self.len);
        let bytes = text.as_bytes();
        while end > start && matches!(bytes.get(end - 1), Some(b'\n') | Some(b'\r')) {
            end -= 1;
        }
        start..end
    }

    /// Location of the span starting at `offset`
    pub fn classify(&self, offset: usize) -> LocationKind {
        let idx = self.regions.partition_point(|r| r.start <= offset);
        if idx == 0 {
            return LocationKind::OTHER;
        }
        let region = &self.regions[idx - 1];
        if offset < region.end {
            region.kind
        } else {
            LocationKind::OTHER
        }
    }
}

/// Offsets at which lines start. `\n`, `\r\n` and lone `\r` all end a line.
fn line_starts(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut starts = vec![0];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => starts.push(i + 1),
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => starts.push(i + 1),
            _ => {}
        }
        i += 1;
    }
    starts
}

/// Classifies the text of one file
pub trait Scanner: Send + Sync {
    fn analyze(&self, text: &str) -> FileAnalysis;
}

/// Reports line boundaries only; every match is `OTHER`
#[derive(Debug, Default, Clone, Copy)]
pub struct LineScanner;

impl Scanner for LineScanner {
    fn analyze(&self, text: &str) -> FileAnalysis {
        FileAnalysis::lines_only(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_and_range() {
        let text = "first\r\nsecond\nthird";
        let analysis = LineScanner.analyze(text);
        assert_eq!(analysis.line_starts(), &[0, 7, 14]);
        assert_eq!(analysis.line_index(0), 0);
        assert_eq!(analysis.line_index(6), 0);
        assert_eq!(analysis.line_index(7), 1);
        assert_eq!(analysis.line_index(18), 2);
        assert_eq!(&text[analysis.line_range(text, 0)], "first");
        assert_eq!(&text[analysis.line_range(text, 1)], "second");
        assert_eq!(&text[analysis.line_range(text, 2)], "third");
    }

    #[test]
    fn test_classify_regions() {
        let text = "abc // note\n";
        let analysis = FileAnalysis::new(
            text,
            vec![Region {
                start: 4,
                end: 11,
                kind: LocationKind::COMMENT,
            }],
        );
        assert_eq!(analysis.classify(0), LocationKind::OTHER);
        assert_eq!(analysis.classify(7), LocationKind::COMMENT);
        assert_eq!(analysis.classify(11), LocationKind::OTHER);
    }

    #[test]
    fn test_parse_location_list() {
        assert_eq!(
            LocationKind::parse_list("comment, string"),
            Some(LocationKind::COMMENT | LocationKind::STRING)
        );
        assert_eq!(LocationKind::parse_list("all"), Some(LocationKind::all()));
        assert_eq!(LocationKind::parse_list("comment,bogus"), None);
    }

    #[test]
    fn test_location_names_serialize() -> Result<(), serde_json::Error> {
        assert_eq!(
            LocationKind::from_location_name(" Comments "),
            Some(LocationKind::COMMENT)
        );
        assert_eq!(LocationKind::from_location_name("nowhere"), None);

        let kind = LocationKind::COMMENT | LocationKind::STRING;
        let json = serde_json::to_string(&kind)?;
        assert_eq!(serde_json::from_str::<LocationKind>(&json)?, kind);
        Ok(())
    }
}
