use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::results::{Match, MatchId};

/// Keeps match positions valid while the text around them is edited
pub trait PositionTracker: Send {
    /// Where the text of `m` is now, or `None` when unknown
    fn current_position(&self, path: &Path, m: &Match) -> Option<(usize, usize)>;

    /// Records that the current text of `id` at `offset` was replaced, changing its
    /// length from `old_len` to `new_len`
    fn record_splice(
        &mut self,
        path: &Path,
        id: MatchId,
        offset: usize,
        old_len: usize,
        new_len: usize,
    );

    /// Drops everything known about a file, e.g. after it was scanned again
    fn forget_file(&mut self, path: &Path);
}

#[derive(Debug, Clone, Copy)]
struct Splice {
    offset: usize,
    old_len: usize,
    new_len: usize,
}

#[derive(Debug, Default)]
struct FileEdits {
    splices: Vec<Splice>,
    positions: HashMap<MatchId, (usize, usize)>,
}

/// Tracks positions through the splices made by replace operations.
///
/// Spliced matches are tracked directly. Any other match is mapped from its scan
/// offset through every splice in order; it becomes unknown if a splice overlaps it.
#[derive(Debug, Default)]
pub struct SpliceTracker {
    files: HashMap<PathBuf, FileEdits>,
}

impl SpliceTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionTracker for SpliceTracker {
    fn current_position(&self, path: &Path, m: &Match) -> Option<(usize, usize)> {
        let Some(edits) = self.files.get(path) else {
            return Some((m.offset(), m.length()));
        };
        if let Some(position) = edits.positions.get(&m.id()) {
            return Some(*position);
        }
        let mut start = m.offset();
        for splice in &edits.splices {
            if splice.offset + splice.old_len <= start {
                start = start + splice.new_len - splice.old_len;
            } else if splice.offset < start + m.length() {
                return None;
            }
        }
        Some((start, m.length()))
    }

    fn record_splice(
        &mut self,
        path: &Path,
        id: MatchId,
        offset: usize,
        old_len: usize,
        new_len: usize,
    ) {
        let edits = self.files.entry(path.to_path_buf()).or_default();
        for position in edits.positions.values_mut() {
            if position.0 >= offset + old_len {
                position.0 = position.0 + new_len - old_len;
            }
        }
        edits.positions.insert(id, (offset, new_len));
        edits.splices.push(Splice {
            offset,
            old_len,
            new_len,
        });
    }

    fn forget_file(&mut self, path: &Path) {
        self.files.remove(path);
    }
}
