use std::path::{Path, PathBuf};
use tracing::{trace, warn};

use super::engine::{MatchCollector, RawMatch};
use crate::results::{FileSignature, LineSpec, MatchSpec, SearchResults};
use crate::scanner::{FileAnalysis, ScannerRegistry};

/// Lines gathered for the file currently being reported
struct PendingFile {
    path: PathBuf,
    analysis: Option<FileAnalysis>,
    signature: Option<FileSignature>,
    lines: Vec<LineSpec>,
}

/// Turns raw engine matches into indexed lines.
///
/// A file is analyzed by its scanner once, on its first match. Its lines are handed to
/// the index as a whole when the next file starts or the search ends, so every scanned
/// file replaces whatever the index held for it, including with nothing.
pub struct ResultCollector<'a> {
    results: &'a SearchResults,
    scanners: &'a ScannerRegistry,
    pending: Option<PendingFile>,
}

impl<'a> ResultCollector<'a> {
    pub fn new(results: &'a SearchResults, scanners: &'a ScannerRegistry) -> Self {
        Self {
            results,
            scanners,
            pending: None,
        }
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.lines.is_empty() && self.results.file_id(&pending.path).is_none() {
            return;
        }
        trace!(
            "Indexing {} lines of {}",
            pending.lines.len(),
            pending.path.display()
        );
        self.results
            .set_lines_for_file(&pending.path, pending.lines, pending.signature);
    }
}

impl MatchCollector for ResultCollector<'_> {
    fn accept_file(&mut self, path: &Path) -> bool {
        self.flush();
        self.pending = Some(PendingFile {
            path: path.to_path_buf(),
            analysis: None,
            signature: None,
            lines: Vec::new(),
        });
        true
    }

    fn accept_match(&mut self, m: RawMatch<'_>) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };

        if pending.analysis.is_none() {
            let scanner = self.scanners.find_scanner(&pending.path);
            pending.analysis = Some(scanner.analyze(m.content));
            pending.signature = match FileSignature::compute(&pending.path, m.content) {
                Ok(signature) => Some(signature),
                Err(e) => {
                    warn!("No signature for {}: {}", pending.path.display(), e);
                    None
                }
            };
        }
        let Some(analysis) = pending.analysis.as_ref() else {
            return false;
        };

        let index = analysis.line_index(m.offset);
        let line_start = analysis.line_starts()[index];
        let found = MatchSpec {
            offset: m.offset,
            length: m.length,
            column: m.offset - line_start,
            original: m.content[m.offset..m.offset + m.length].to_string(),
            kind: analysis.classify(m.offset),
        };

        match pending.lines.last_mut() {
            Some(line) if line.number == index + 1 => line.matches.push(found),
            _ => {
                let range = analysis.line_range(m.content, index);
                pending.lines.push(LineSpec {
                    number: index + 1,
                    offset: line_start,
                    text: m.content[range].to_string(),
                    matches: vec![found],
                });
            }
        }
        true
    }

    fn end(&mut self) {
        self.flush();
    }
}
