//! The result index of a query.
//!
//! Every line and match found by a query lives here, keyed by stable ids. Files are
//! replaced wholesale whenever they are scanned again; a file left without matches is
//! dropped. A secondary [`Filter`] decides visibility without destroying anything.
//!
//! All mutation goes through one write lock. Aggregate counts are updated and change
//! events are sent while that lock is held, so a subscriber never sees an event out of
//! order with the state it describes, and a reader never sees a half updated file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

mod filter;
mod model;
mod sync;

pub use filter::Filter;
pub use model::{FileId, Line, LineId, LineKey, LineSpec, Match, MatchId, MatchSpec};
pub use sync::FileSignature;

use crate::view::Element;

/// Aggregate match counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub total: usize,
    pub visible: usize,
}

impl MatchCounts {
    pub fn filtered(&self) -> usize {
        self.total - self.visible
    }
}

/// A change to the index
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEvent {
    SearchStarted,
    /// All lines of a file were replaced by a scan
    LinesChanged {
        file: FileId,
        removed: Vec<LineKey>,
        added: Vec<LineKey>,
    },
    /// The filter changed; `changed` holds exactly the matches whose flag flipped
    FilterChanged {
        changed: Vec<MatchId>,
        lines: Vec<LineKey>,
        origin: Option<String>,
    },
    MatchesRemoved {
        lines: Vec<LineKey>,
    },
    ReplacementsChanged {
        matches: Vec<MatchId>,
        lines: Vec<LineKey>,
    },
    SearchFinished,
}

impl ResultEvent {
    /// Elements whose visible count may have changed
    pub fn updated_elements(&self) -> Vec<Element> {
        match self {
            ResultEvent::SearchStarted | ResultEvent::SearchFinished => Vec::new(),
            ResultEvent::LinesChanged {
                file,
                removed,
                added,
            } => removed
                .iter()
                .chain(added)
                .map(|key| Element::from(*key))
                .chain(std::iter::once(Element::File(*file)))
                .collect(),
            ResultEvent::FilterChanged { lines, .. }
            | ResultEvent::MatchesRemoved { lines }
            | ResultEvent::ReplacementsChanged { lines, .. } => {
                lines.iter().map(|key| Element::from(*key)).collect()
            }
        }
    }
}

#[derive(Debug, Default)]
struct FileEntry {
    lines: Vec<LineId>,
    signature: Option<FileSignature>,
    generation: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    paths: Vec<PathBuf>,
    path_ids: HashMap<PathBuf, FileId>,
    files: BTreeMap<FileId, FileEntry>,
    lines: HashMap<LineId, Line>,
    matches: HashMap<MatchId, Match>,
    filter: Filter,
    complete: bool,
    counts: MatchCounts,
    next_line: u64,
    next_match: u64,
    next_generation: u64,
}

impl IndexState {
    fn intern(&mut self, path: &Path) -> FileId {
        if let Some(id) = self.path_ids.get(path) {
            return *id;
        }
        let id = FileId(self.paths.len() as u32);
        self.paths.push(path.to_path_buf());
        self.path_ids.insert(path.to_path_buf(), id);
        id
    }

    fn line_visible(&self, line: &Line) -> usize {
        if line.filtered {
            return 0;
        }
        line.matches
            .iter()
            .filter_map(|id| self.matches.get(id))
            .filter(|m| !m.filtered)
            .count()
    }

    fn file_visible(&self, file: FileId) -> usize {
        self.files.get(&file).map_or(0, |entry| {
            entry
                .lines
                .iter()
                .filter_map(|id| self.lines.get(id))
                .map(|line| self.line_visible(line))
                .sum()
        })
    }

    /// Drops every line of `file`, returning their keys
    fn remove_file(&mut self, file: FileId) -> Vec<LineKey> {
        let Some(entry) = self.files.remove(&file) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(entry.lines.len());
        for line_id in entry.lines {
            let Some(line) = self.lines.get(&line_id) else {
                continue;
            };
            let visible = self.line_visible(line);
            self.counts.total -= line.matches.len();
            self.counts.visible -= visible;
            removed.push(line.key());
            if let Some(line) = self.lines.remove(&line_id) {
                for match_id in &line.matches {
                    self.matches.remove(match_id);
                }
            }
        }
        removed
    }

    /// Indexes freshly scanned lines, applying the current filter
    fn add_lines(&mut self, file: FileId, mut specs: Vec<LineSpec>) -> Vec<LineId> {
        specs.retain(|spec| !spec.matches.is_empty());
        specs.sort_by_key(|spec| spec.number);

        let mut added = Vec::with_capacity(specs.len());
        for mut spec in specs {
            spec.matches.sort_by_key(|m| m.offset);
            let line_id = LineId(self.next_line);
            self.next_line += 1;

            let line_filtered = self.filter.is_line_filtered(&spec.text);
            let mut match_ids = Vec::with_capacity(spec.matches.len());
            for m in spec.matches {
                let match_id = MatchId(self.next_match);
                self.next_match += 1;
                let filtered = self.filter.is_match_filtered(line_filtered, m.kind);
                self.counts.total += 1;
                if !filtered {
                    self.counts.visible += 1;
                }
                self.matches.insert(
                    match_id,
                    Match {
                        id: match_id,
                        file,
                        line: line_id,
                        original: m.original,
                        offset: m.offset,
                        length: m.length,
                        column: m.column,
                        kind: m.kind,
                        replacement: None,
                        filtered,
                    },
                );
                match_ids.push(match_id);
            }

            self.lines.insert(
                line_id,
                Line {
                    id: line_id,
                    file,
                    number: spec.number,
                    offset: spec.offset,
                    text: spec.text,
                    matches: match_ids,
                    filtered: line_filtered,
                },
            );
            added.push(line_id);
        }
        added
    }

    fn recount(&mut self) {
        let total = self.matches.len();
        let visible = self.lines.values().map(|line| self.line_visible(line)).sum();
        self.counts = MatchCounts { total, visible };
    }
}

/// The per-query store of all lines and matches
#[derive(Debug)]
pub struct SearchResults {
    state: RwLock<IndexState>,
    subscribers: Mutex<Vec<Sender<ResultEvent>>>,
}

impl Default for SearchResults {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchResults {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers must hold the write lock
    fn emit(&self, event: ResultEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Receives every change from now on
    pub fn subscribe(&self) -> Receiver<ResultEvent> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Clears all matches before a new run. The filter is kept.
    pub fn begin_search(&self) {
        let mut state = self.write();
        state.files.clear();
        state.lines.clear();
        state.matches.clear();
        state.counts = MatchCounts::default();
        state.complete = false;
        self.emit(ResultEvent::SearchStarted);
    }

    pub fn finish_search(&self) {
        let mut state = self.write();
        state.complete = true;
        self.emit(ResultEvent::SearchFinished);
    }

    /// Replaces all lines of the file at `path`.
    ///
    /// Lines without matches are ignored. A file ending up without lines is dropped from
    /// the index.
    pub fn set_lines_for_file(
        &self,
        path: &Path,
        lines: Vec<LineSpec>,
        signature: Option<FileSignature>,
    ) -> FileId {
        let mut state = self.write();
        let file = state.intern(path);
        let removed = state.remove_file(file);
        let added_ids = state.add_lines(file, lines);
        if removed.is_empty() && added_ids.is_empty() {
            return file;
        }

        let added: Vec<LineKey> = added_ids
            .iter()
            .filter_map(|id| state.lines.get(id).map(Line::key))
            .collect();
        if !added_ids.is_empty() {
            state.next_generation += 1;
            let generation = state.next_generation;
            state.files.insert(
                file,
                FileEntry {
                    lines: added_ids,
                    signature,
                    generation,
                },
            );
        }
        trace!(
            "{}: {} lines removed, {} lines added",
            path.display(),
            removed.len(),
            added.len()
        );
        self.emit(ResultEvent::LinesChanged {
            file,
            removed,
            added,
        });
        file
    }

    /// Installs a new filter. Returns `false`, and notifies nobody, when its parameters
    /// equal the current ones.
    pub fn apply_filter(&self, filter: Filter) -> bool {
        let mut state = self.write();
        if state.filter.same_parameters(&filter) {
            return false;
        }

        let mut changed = Vec::new();
        let mut changed_lines = BTreeSet::new();
        let line_ids: Vec<LineId> = state.lines.keys().copied().collect();
        for line_id in line_ids {
            let Some(line) = state.lines.get(&line_id) else {
                continue;
            };
            let line_filtered = filter.is_line_filtered(&line.text);
            let key = line.key();
            let match_ids = line.matches.clone();
            for match_id in match_ids {
                if let Some(m) = state.matches.get_mut(&match_id) {
                    let filtered = filter.is_match_filtered(line_filtered, m.kind);
                    if filtered != m.filtered {
                        m.filtered = filtered;
                        changed.push(match_id);
                        changed_lines.insert((key.file, key.number, key.id));
                    }
                }
            }
            if let Some(line) = state.lines.get_mut(&line_id) {
                line.filtered = line_filtered;
            }
        }

        changed.sort();
        let origin = filter.origin().map(str::to_string);
        state.filter = filter;
        state.recount();
        debug!(
            "Filter changed {} matches, {} of {} visible",
            changed.len(),
            state.counts.visible,
            state.counts.total
        );

        let lines = changed_lines
            .into_iter()
            .map(|(file, number, id)| LineKey { id, file, number })
            .collect();
        self.emit(ResultEvent::FilterChanged {
            changed,
            lines,
            origin,
        });
        true
    }

    /// Removes matches from their lines. Empty lines and files are dropped.
    pub fn remove_matches(&self, ids: &[MatchId]) {
        let mut state = self.write();
        let mut touched: BTreeMap<LineId, LineKey> = BTreeMap::new();

        for id in ids {
            let Some(m) = state.matches.remove(id) else {
                continue;
            };
            let Some(line) = state.lines.get_mut(&m.line) else {
                continue;
            };
            line.matches.retain(|other| other != id);
            touched.insert(line.id, line.key());
        }
        if touched.is_empty() {
            return;
        }

        for (line_id, key) in &touched {
            let empty = state
                .lines
                .get(line_id)
                .is_some_and(|line| line.matches.is_empty());
            if !empty {
                continue;
            }
            state.lines.remove(line_id);
            let drop_file = match state.files.get_mut(&key.file) {
                Some(entry) => {
                    entry.lines.retain(|l| l != line_id);
                    entry.lines.is_empty()
                }
                None => false,
            };
            if drop_file {
                state.files.remove(&key.file);
            }
        }

        state.recount();
        self.emit(ResultEvent::MatchesRemoved {
            lines: touched.into_values().collect(),
        });
    }

    /// Sets or clears the replacement text of matches
    pub fn update_replacements(&self, updates: &[(MatchId, Option<String>)]) {
        if updates.is_empty() {
            return;
        }
        let mut state = self.write();
        let mut matches = Vec::with_capacity(updates.len());
        let mut touched = BTreeMap::new();
        for (id, replacement) in updates {
            let Some(m) = state.matches.get_mut(id) else {
                continue;
            };
            m.replacement = replacement.clone();
            let line = m.line;
            matches.push(*id);
            if let Some(line) = state.lines.get(&line) {
                touched.insert(line.id, line.key());
            }
        }
        self.emit(ResultEvent::ReplacementsChanged {
            matches,
            lines: touched.into_values().collect(),
        });
    }

    /// Records the on-disk state after the file was written by us
    pub fn update_signature(&self, file: FileId, signature: FileSignature) {
        if let Some(entry) = self.write().files.get_mut(&file) {
            entry.signature = Some(signature);
        }
    }

    pub fn counts(&self) -> MatchCounts {
        self.read().counts
    }

    /// Number of unfiltered matches below an element
    pub fn visible_count(&self, element: &Element) -> usize {
        let state = self.read();
        match element {
            Element::Line { id, .. } => state.lines.get(id).map_or(0, |l| state.line_visible(l)),
            Element::File(file) => state.file_visible(*file),
            Element::Folder(dir) => state
                .files
                .keys()
                .filter(|file| state.paths[file.0 as usize].starts_with(dir))
                .map(|file| state.file_visible(*file))
                .sum(),
            Element::FilteredSummary => 0,
        }
    }

    /// Files holding at least one match, in id order
    pub fn files(&self) -> Vec<FileId> {
        self.read().files.keys().copied().collect()
    }

    pub fn path(&self, file: FileId) -> Option<PathBuf> {
        self.read().paths.get(file.0 as usize).cloned()
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.read().path_ids.get(path).copied()
    }

    /// Lines of a file in ascending line number order
    pub fn lines(&self, file: FileId) -> Vec<Line> {
        let state = self.read();
        state.files.get(&file).map_or_else(Vec::new, |entry| {
            entry
                .lines
                .iter()
                .filter_map(|id| state.lines.get(id).cloned())
                .collect()
        })
    }

    pub fn line(&self, id: LineId) -> Option<Line> {
        self.read().lines.get(&id).cloned()
    }

    pub fn get_match(&self, id: MatchId) -> Option<Match> {
        self.read().matches.get(&id).cloned()
    }

    /// Matches of a line in ascending offset order
    pub fn matches_of_line(&self, id: LineId) -> Vec<Match> {
        let state = self.read();
        state.lines.get(&id).map_or_else(Vec::new, |line| {
            line.matches
                .iter()
                .filter_map(|m| state.matches.get(m).cloned())
                .collect()
        })
    }

    /// Matches of a file in ascending offset order
    pub fn matches_of_file(&self, file: FileId) -> Vec<Match> {
        let state = self.read();
        state.files.get(&file).map_or_else(Vec::new, |entry| {
            entry
                .lines
                .iter()
                .filter_map(|id| state.lines.get(id))
                .flat_map(|line| line.matches.iter())
                .filter_map(|m| state.matches.get(m).cloned())
                .collect()
        })
    }

    pub fn filter(&self) -> Filter {
        self.read().filter.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.read().complete
    }

    /// Identifies the scan that produced the current lines of `file`. Every scan of a
    /// file, including one in a later search run, gets a new value.
    pub fn scan_generation(&self, file: FileId) -> Option<u64> {
        self.read().files.get(&file).map(|entry| entry.generation)
    }

    /// Whether the file still holds what was scanned. Files without a recorded signature
    /// are never considered synchronized.
    pub fn is_synchronized(&self, file: FileId) -> bool {
        let (path, signature) = {
            let state = self.read();
            let Some(entry) = state.files.get(&file) else {
                return true;
            };
            (state.paths[file.0 as usize].clone(), entry.signature.clone())
        };
        signature.is_some_and(|s| s.matches_disk(&path))
    }

    /// Paths of files with visible matches, e.g. to build a working set from
    pub fn matching_files(&self) -> Vec<PathBuf> {
        let state = self.read();
        let mut paths: Vec<PathBuf> = state
            .files
            .keys()
            .filter(|file| state.file_visible(**file) > 0)
            .map(|file| state.paths[file.0 as usize].clone())
            .collect();
        paths.sort();
        paths
    }
}
