//! Replacing matches in place.
//!
//! A [`ReplaceOperation`] targets all matches of a query, some files, some lines or a
//! single match, and either replaces them or restores their original text. It runs in
//! phases:
//!
//! 1. files that changed on disk since the scan are scanned again; failing that aborts
//! 2. read-only files are made writable where possible
//! 3. if only some files stay read-only, the caller confirms going on without them;
//!    if all do, the operation fails
//! 4. targets in rescanned files are remapped onto the fresh lines and matches
//! 5. every file is edited through its live buffer, in sort order, and committed if
//!    it had no unsaved changes before
//!
//! Nothing is modified before phase 5. From there on problems with single matches are
//! collected into [`ReplaceOutcome::failures`] and the batch goes on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

mod access;
mod buffers;
mod preview;
mod reconcile;
mod tracker;

pub use access::{FileSystemAccess, WriteAccess};
pub use buffers::{DocumentProvider, FileBuffers, TextBuffer};
pub use preview::{diffs_to_json, generate_file_diff, DiffHunk, FileDiff};
pub use reconcile::{remap_line, remap_match};
pub use tracker::{PositionTracker, SpliceTracker};

use crate::errors::{SearchError, SearchResult};
use crate::progress::ProgressMonitor;
use crate::results::{FileId, FileSignature, Line, LineId, Match, MatchId, SearchResults};
use crate::search::SearchQuery;

/// What to replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceTarget {
    /// Every visible match of the query
    All,
    /// Every visible match in these files
    Files(Vec<FileId>),
    /// Every visible match on these lines
    Lines(Vec<LineId>),
    /// One match, visible or not
    Match(MatchId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    Replace,
    /// Puts the original text back
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The target could not be found again after its file was rescanned
    MatchNotFound,
    /// The live text at the match position is not what the match expects
    CannotLocate,
    Io,
}

/// A problem with one match or file that did not stop the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceFailure {
    pub path: PathBuf,
    /// One-based line number, when the failure concerns a line
    pub line: Option<usize>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    pub failures: Vec<ReplaceFailure>,
    /// Files scanned again because they had changed on disk
    pub refreshed: Vec<PathBuf>,
    /// Files written to disk
    pub committed: Vec<PathBuf>,
    /// Number of matches whose state changed
    pub replaced: usize,
    pub cancelled: bool,
    /// Read-only files left out after confirmation
    pub excluded: Vec<PathBuf>,
}

impl ReplaceOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Asked whether to go on when some target files stay read-only
pub trait ReplaceConfirmation {
    fn confirm_partial(&self, read_only: &[PathBuf], writable: &[PathBuf]) -> bool;
}

impl<F> ReplaceConfirmation for F
where
    F: Fn(&[PathBuf], &[PathBuf]) -> bool,
{
    fn confirm_partial(&self, read_only: &[PathBuf], writable: &[PathBuf]) -> bool {
        self(read_only, writable)
    }
}

/// The collaborators a replace works through. Keep one session per result index:
/// the tracker has to see every splice made to its files. Splices recorded against
/// an older scan of a file are dropped once the file has been scanned again.
pub struct ReplaceSession {
    documents: Box<dyn DocumentProvider>,
    tracker: Box<dyn PositionTracker>,
    access: Box<dyn WriteAccess>,
    /// Scan generation the tracked splices of each file refer to
    scans: HashMap<PathBuf, u64>,
}

impl Default for ReplaceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaceSession {
    pub fn new() -> Self {
        Self {
            documents: Box::new(FileBuffers::new()),
            tracker: Box::new(SpliceTracker::new()),
            access: Box::new(FileSystemAccess::default()),
            scans: HashMap::new(),
        }
    }

    pub fn with_documents(mut self, documents: Box<dyn DocumentProvider>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_tracker(mut self, tracker: Box<dyn PositionTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_access(mut self, access: Box<dyn WriteAccess>) -> Self {
        self.access = access;
        self
    }

    pub fn documents(&mut self) -> &mut dyn DocumentProvider {
        self.documents.as_mut()
    }

    /// Makes the tracker describe the scan `generation` of `path`
    fn adopt_scan(&mut self, path: &Path, generation: Option<u64>) {
        let known = self.scans.get(path).copied();
        if known == generation {
            return;
        }
        if known.is_some() {
            debug!("{} was scanned again, dropping tracked splices", path.display());
            self.tracker.forget_file(path);
        }
        match generation {
            Some(generation) => self.scans.insert(path.to_path_buf(), generation),
            None => self.scans.remove(path),
        };
    }

    /// Where the text of `m` is in the live buffer of `path`
    fn position(&self, path: &Path, generation: Option<u64>, m: &Match) -> (usize, usize) {
        let stale = self
            .scans
            .get(path)
            .is_some_and(|known| Some(*known) != generation);
        let tracked = if stale {
            Some((m.offset(), m.length()))
        } else {
            self.tracker.current_position(path, m)
        };
        tracked.unwrap_or((m.offset(), m.current_text().len()))
    }
}

/// Targets of one file, captured before any rescan
enum FileTargets {
    All,
    Lines(Vec<Line>),
    Match { line: Line, target: Match },
}

struct FilePlan {
    file: FileId,
    path: PathBuf,
    targets: FileTargets,
}

/// One replace or restore over a query's results
pub struct ReplaceOperation<'q> {
    query: &'q SearchQuery,
    target: ReplaceTarget,
    mode: ReplaceMode,
    template: String,
}

impl<'q> ReplaceOperation<'q> {
    /// Replaces targets with `template`, which may refer to capture groups in regex mode
    pub fn replace(
        query: &'q SearchQuery,
        target: ReplaceTarget,
        template: impl Into<String>,
    ) -> SearchResult<Self> {
        let template = template.into();
        query.matcher().validate_replacement(&template)?;
        Ok(Self {
            query,
            target,
            mode: ReplaceMode::Replace,
            template,
        })
    }

    /// Restores the original text of replaced targets
    pub fn restore(query: &'q SearchQuery, target: ReplaceTarget) -> Self {
        Self {
            query,
            target,
            mode: ReplaceMode::Restore,
            template: String::new(),
        }
    }

    pub fn mode(&self) -> ReplaceMode {
        self.mode
    }

    fn results(&self) -> &SearchResults {
        self.query.results()
    }

    fn unknown(what: impl std::fmt::Display) -> SearchError {
        SearchError::UnknownElement(what.to_string())
    }

    fn path_of(&self, file: FileId) -> SearchResult<PathBuf> {
        self.results().path(file).ok_or_else(|| Self::unknown(file))
    }

    /// Captures the targets per file, in sort order
    fn plan(&self) -> SearchResult<Vec<FilePlan>> {
        let results = self.results();
        let mut plans: BTreeMap<FileId, FilePlan> = BTreeMap::new();
        match &self.target {
            ReplaceTarget::All => {
                for file in results.files() {
                    let path = self.path_of(file)?;
                    plans.insert(file, FilePlan { file, path, targets: FileTargets::All });
                }
            }
            ReplaceTarget::Files(files) => {
                for &file in files {
                    if !results.files().contains(&file) {
                        return Err(Self::unknown(file));
                    }
                    let path = self.path_of(file)?;
                    plans.insert(file, FilePlan { file, path, targets: FileTargets::All });
                }
            }
            ReplaceTarget::Lines(lines) => {
                for &id in lines {
                    let line = results.line(id).ok_or_else(|| Self::unknown(id))?;
                    let file = line.file();
                    let path = self.path_of(file)?;
                    let plan = plans.entry(file).or_insert_with(|| FilePlan {
                        file,
                        path,
                        targets: FileTargets::Lines(Vec::new()),
                    });
                    if let FileTargets::Lines(lines) = &mut plan.targets {
                        if !lines.iter().any(|l| l.id() == id) {
                            lines.push(line);
                        }
                    }
                }
            }
            ReplaceTarget::Match(id) => {
                let target = results.get_match(*id).ok_or_else(|| Self::unknown(id))?;
                let line = results
                    .line(target.line())
                    .ok_or_else(|| Self::unknown(target.line()))?;
                let file = target.file();
                let path = self.path_of(file)?;
                plans.insert(
                    file,
                    FilePlan {
                        file,
                        path,
                        targets: FileTargets::Match { line, target },
                    },
                );
            }
        }

        let order = self.query.sort_order();
        let mut plans: Vec<FilePlan> = plans.into_values().collect();
        plans.sort_by(|a, b| order.compare_paths(&a.path, &b.path));
        Ok(plans)
    }

    /// Rescans every planned file that no longer matches its scan. Fails on the first
    /// file that cannot be rescanned.
    fn synchronize(&self, plans: &[FilePlan]) -> SearchResult<Vec<PathBuf>> {
        let mut refreshed = Vec::new();
        for plan in plans {
            if self.results().is_synchronized(plan.file) {
                continue;
            }
            debug!("{} changed on disk, scanning again", plan.path.display());
            self.query.search_file(&plan.path)?;
            refreshed.push(plan.path.clone());
        }
        Ok(refreshed)
    }

    /// The matches to process in one file, remapped if the file was rescanned
    fn resolve_matches(
        &self,
        plan: &FilePlan,
        refreshed: bool,
        failures: &mut Vec<ReplaceFailure>,
    ) -> Vec<Match> {
        let results = self.results();
        let visible = |matches: Vec<Match>| -> Vec<Match> {
            matches.into_iter().filter(|m| !m.is_filtered()).collect()
        };
        let not_found = |line: &Line, what: &str| ReplaceFailure {
            path: plan.path.clone(),
            line: Some(line.number()),
            kind: FailureKind::MatchNotFound,
            message: format!("{} no longer found after the file changed", what),
        };

        match &plan.targets {
            FileTargets::All => visible(results.matches_of_file(plan.file)),
            FileTargets::Lines(lines) if !refreshed => lines
                .iter()
                .flat_map(|line| visible(results.matches_of_line(line.id())))
                .collect(),
            FileTargets::Lines(lines) => {
                let fresh = results.lines(plan.file);
                let mut matches = Vec::new();
                let mut seen = HashSet::new();
                for stale in lines {
                    match remap_line(stale, &fresh) {
                        Some(line) if seen.insert(line.id()) => {
                            matches.extend(visible(results.matches_of_line(line.id())))
                        }
                        Some(_) => {}
                        None => failures.push(not_found(stale, "Line")),
                    }
                }
                matches
            }
            FileTargets::Match { target, .. } if !refreshed => {
                results.get_match(target.id()).into_iter().collect()
            }
            FileTargets::Match { line, target } => {
                let fresh = results.lines(plan.file);
                let remapped = remap_line(line, &fresh).and_then(|fresh_line| {
                    let candidates = results.matches_of_line(fresh_line.id());
                    remap_match(target, &candidates).cloned()
                });
                match remapped {
                    Some(m) => vec![m],
                    None => {
                        failures.push(not_found(line, "Match"));
                        Vec::new()
                    }
                }
            }
        }
    }

    /// The text a match should get
    fn new_text(&self, m: &Match) -> String {
        if self.mode == ReplaceMode::Restore {
            return m.original().to_string();
        }
        let matcher = self.query.matcher();
        let Some(line) = self.results().line(m.line()) else {
            return matcher.expand(m.original(), &self.template);
        };

        // Search again from the end of the previous match on the line, so anchors and
        // word boundaries see the same context as the scan did
        let siblings = self.results().matches_of_line(line.id());
        let start = siblings
            .iter()
            .take_while(|other| other.id() != m.id())
            .last()
            .map_or(0, |prev| prev.column() + prev.length());
        match matcher.replacement_at(line.text(), start, &self.template) {
            Some((s, e, text)) if s == m.column() && e == m.column() + m.length() => text,
            _ => matcher.expand(m.original(), &self.template),
        }
    }

    /// Edits one file. Returns the ids whose state changed.
    fn replace_in_file(
        &self,
        session: &mut ReplaceSession,
        plan: &FilePlan,
        targets: &[Match],
        outcome: &mut ReplaceOutcome,
    ) -> Vec<(MatchId, Option<String>)> {
        let path = plan.path.as_path();
        let io_failure = |e: SearchError| ReplaceFailure {
            path: path.to_path_buf(),
            line: None,
            kind: FailureKind::Io,
            message: e.to_string(),
        };
        let desired = self.mode == ReplaceMode::Replace;
        let mut updates = Vec::new();
        let generation = self.results().scan_generation(plan.file);
        session.adopt_scan(path, generation);

        if let Err(e) = session.documents.connect(path) {
            outcome.failures.push(io_failure(e));
            return updates;
        }
        let Some((read_only, was_dirty)) = session
            .documents
            .document(path)
            .map(|b| (b.is_read_only(), b.is_dirty()))
        else {
            session.documents.disconnect(path);
            return updates;
        };
        if read_only {
            debug!("Skipping read-only buffer {}", path.display());
            session.documents.disconnect(path);
            return updates;
        }

        let mut targets: Vec<&Match> = targets
            .iter()
            .filter(|m| m.is_replaced() != desired)
            .collect();
        targets.sort_by_key(|m| m.offset());

        for m in targets {
            let line = self.results().line(m.line()).map(|l| l.number());
            let expected = m.current_text();
            let (offset, length) = session.position(path, generation, m);

            let Some(buffer) = session.documents.document(path) else {
                break;
            };
            if buffer.get(offset, length) != Some(expected) {
                outcome.failures.push(ReplaceFailure {
                    path: path.to_path_buf(),
                    line,
                    kind: FailureKind::CannotLocate,
                    message: format!("Text '{}' is no longer at offset {}", expected, offset),
                });
                continue;
            }

            let text = self.new_text(m);
            if let Err(e) = buffer.replace(offset, length, &text) {
                outcome.failures.push(io_failure(e));
                continue;
            }
            session
                .tracker
                .record_splice(path, m.id(), offset, length, text.len());
            updates.push((m.id(), desired.then_some(text)));
        }

        if !updates.is_empty() && !was_dirty {
            match session.documents.commit(path) {
                Ok(()) => {
                    outcome.committed.push(path.to_path_buf());
                    let text = session
                        .documents
                        .document(path)
                        .map(|b| b.text().to_string())
                        .unwrap_or_default();
                    match FileSignature::compute(path, &text) {
                        Ok(signature) => self.results().update_signature(plan.file, signature),
                        Err(e) => warn!("No signature for {}: {}", path.display(), e),
                    }
                }
                Err(e) => outcome.failures.push(io_failure(e)),
            }
        }
        session.documents.disconnect(path);
        updates
    }

    /// Runs the operation. Errors mean nothing was modified; per-match problems are in
    /// the outcome.
    pub fn run(
        &self,
        session: &mut ReplaceSession,
        confirmation: &dyn ReplaceConfirmation,
        monitor: &dyn ProgressMonitor,
    ) -> SearchResult<ReplaceOutcome> {
        let plans = self.plan()?;
        info!("{:?} in {} files", self.mode, plans.len());
        let mut outcome = ReplaceOutcome {
            refreshed: self.synchronize(&plans)?,
            ..ReplaceOutcome::default()
        };

        let read_only: Vec<PathBuf> = plans
            .iter()
            .filter(|p| session.access.is_read_only(&p.path))
            .map(|p| p.path.clone())
            .collect();
        let still_read_only = if read_only.is_empty() {
            Vec::new()
        } else {
            session.access.make_writable(&read_only)
        };
        let writable: Vec<PathBuf> = plans
            .iter()
            .map(|p| p.path.clone())
            .filter(|p| !still_read_only.contains(p))
            .collect();
        if !still_read_only.is_empty() {
            if writable.is_empty() {
                return Err(SearchError::AllFilesReadOnly(still_read_only));
            }
            if !confirmation.confirm_partial(&still_read_only, &writable) {
                debug!("Replace declined with {} read-only files", still_read_only.len());
                outcome.cancelled = true;
                outcome.excluded = still_read_only;
                return Ok(outcome);
            }
            outcome.excluded = still_read_only;
        }

        monitor.begin("Replacing", plans.len());
        for plan in &plans {
            if monitor.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if outcome.excluded.contains(&plan.path) {
                continue;
            }
            let refreshed = outcome.refreshed.contains(&plan.path);
            let mut failures = Vec::new();
            let targets = self.resolve_matches(plan, refreshed, &mut failures);
            outcome.failures.extend(failures);

            let updates = self.replace_in_file(session, plan, &targets, &mut outcome);
            outcome.replaced += updates.len();
            self.results().update_replacements(&updates);
            monitor.worked(1);
        }
        monitor.done();

        info!(
            "{} matches changed in {} files, {} failures",
            outcome.replaced,
            outcome.committed.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    /// Diffs of what `run` would write. Files with a connected buffer are diffed
    /// against the buffer, all others against the file on disk.
    pub fn preview(&self, session: &ReplaceSession) -> SearchResult<Vec<FileDiff>> {
        let mut diffs = Vec::new();
        for plan in self.plan()? {
            let old = match session.documents.open_document(&plan.path) {
                Some(buffer) => buffer.text().to_string(),
                None => fs::read_to_string(&plan.path)
                    .map_err(|e| SearchError::from_io(&plan.path, e))?,
            };
            let generation = self.results().scan_generation(plan.file);
            let desired = self.mode == ReplaceMode::Replace;
            let mut ignored = Vec::new();
            let mut targets: Vec<(usize, usize, String)> = self
                .resolve_matches(&plan, false, &mut ignored)
                .iter()
                .filter(|m| m.is_replaced() != desired)
                .filter_map(|m| {
                    let expected = m.current_text();
                    let (offset, length) = session.position(&plan.path, generation, m);
                    (old.get(offset..offset + length) == Some(expected))
                        .then(|| (offset, length, self.new_text(m)))
                })
                .collect();
            if targets.is_empty() {
                continue;
            }

            targets.sort_by_key(|t| std::cmp::Reverse(t.0));
            let mut new = old.clone();
            for (offset, length, text) in &targets {
                new.replace_range(*offset..offset + length, text);
            }
            let mut diff = generate_file_diff(&old, &new, &plan.path);
            diff.replacements = targets.len();
            diffs.push(diff);
        }
        Ok(diffs)
    }
}

/// Convenience for callers holding the path of a replaced file
pub fn is_committed(outcome: &ReplaceOutcome, path: &Path) -> bool {
    outcome.committed.iter().any(|p| p == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use crate::scope::Scope;
    use crate::search::PatternDefinition;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn always(_: &[PathBuf], _: &[PathBuf]) -> bool {
        true
    }

    /// Cancels once the first file is done
    #[derive(Default)]
    struct StopAfterFirstFile {
        files: AtomicUsize,
    }

    impl ProgressMonitor for StopAfterFirstFile {
        fn worked(&self, units: usize) {
            self.files.fetch_add(units, Ordering::SeqCst);
        }

        fn is_cancelled(&self) -> bool {
            self.files.load(Ordering::SeqCst) >= 1
        }
    }

    fn query(dir: &Path, definition: PatternDefinition) -> SearchResult<SearchQuery> {
        let scope = Scope::new(vec![dir.to_path_buf()], &["*.txt"], false, false)?;
        let query = SearchQuery::new(definition, scope)?;
        query.run(&NullProgress)?;
        Ok(query)
    }

    #[test]
    fn test_replace_all_then_restore() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo bar foo\nFoo\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;
        let mut session = ReplaceSession::new();

        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::All, "quux")?
            .run(&mut session, &always, &NullProgress)?;
        assert!(outcome.is_clean());
        assert_eq!(outcome.replaced, 3);
        assert!(is_committed(&outcome, &path));
        assert_eq!(fs::read_to_string(&path)?, "quux bar quux\nquux\n");

        let outcome = ReplaceOperation::restore(&query, ReplaceTarget::All)
            .run(&mut session, &always, &NullProgress)?;
        assert_eq!(outcome.replaced, 3);
        assert_eq!(fs::read_to_string(&path)?, "foo bar foo\nFoo\n");
        let file = query.results().file_id(&path).unwrap();
        assert!(query
            .results()
            .matches_of_file(file)
            .iter()
            .all(|m| !m.is_replaced() && m.current_text() == m.original()));
        Ok(())
    }

    #[test]
    fn test_regex_groups_and_anchors() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "ab ab\n")?;
        let query = query(dir.path(), PatternDefinition::regex(r"\b(a)(b)"))?;
        assert!(ReplaceOperation::replace(&query, ReplaceTarget::All, "$3").is_err());

        ReplaceOperation::replace(&query, ReplaceTarget::All, "$2$1")?
            .run(&mut ReplaceSession::new(), &always, &NullProgress)?;
        assert_eq!(fs::read_to_string(&path)?, "ba ba\n");
        Ok(())
    }

    #[test]
    fn test_single_match_and_lines() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo foo\nfoo\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;
        let file = query.results().file_id(&path).unwrap();
        let lines = query.results().lines(file);
        let mut session = ReplaceSession::new();

        let second = lines[0].matches()[1];
        ReplaceOperation::replace(&query, ReplaceTarget::Match(second), "x")?
            .run(&mut session, &always, &NullProgress)?;
        assert_eq!(fs::read_to_string(&path)?, "foo x\nfoo\n");

        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::Lines(vec![lines[0].id()]), "y")?
            .run(&mut session, &always, &NullProgress)?;
        assert_eq!(outcome.replaced, 1);
        assert_eq!(fs::read_to_string(&path)?, "y x\nfoo\n");
        Ok(())
    }

    #[test]
    fn test_dirty_buffer_is_not_committed() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;
        let mut session = ReplaceSession::new();

        session.documents().connect(&path)?;
        if let Some(buffer) = session.documents().document(&path) {
            buffer.replace(3, 1, "!\n")?;
        }
        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::All, "bar")?
            .run(&mut session, &always, &NullProgress)?;
        assert_eq!(outcome.replaced, 1);
        assert!(outcome.committed.is_empty());
        assert_eq!(fs::read_to_string(&path)?, "foo\n");
        assert_eq!(
            session.documents().document(&path).map(|b| b.text().to_string()),
            Some("bar!\n".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_preview_leaves_files_alone() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\nkeep\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;

        let diffs = ReplaceOperation::replace(&query, ReplaceTarget::All, "bar")?
            .preview(&ReplaceSession::new())?;
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].replacements, 1);
        assert_eq!(diffs[0].hunks[0].new_lines, vec!["bar"]);
        assert_eq!(fs::read_to_string(&path)?, "foo\nkeep\n");
        Ok(())
    }

    #[test]
    fn test_live_text_changed_under_batch() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo foo\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;
        let mut session = ReplaceSession::new();

        session.documents().connect(&path)?;
        if let Some(buffer) = session.documents().document(&path) {
            buffer.replace(0, 3, "baz")?;
        }
        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::All, "bar")?
            .run(&mut session, &always, &NullProgress)?;

        assert_eq!(outcome.replaced, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::CannotLocate);
        assert_eq!(outcome.failures[0].line, Some(1));
        assert_eq!(
            session.documents().document(&path).map(|b| b.text().to_string()),
            Some("baz bar\n".to_string())
        );
        assert_eq!(fs::read_to_string(&path)?, "foo foo\n");

        let file = query.results().file_id(&path).unwrap();
        let replaced: Vec<bool> = query
            .results()
            .matches_of_file(file)
            .iter()
            .map(|m| m.is_replaced())
            .collect();
        assert_eq!(replaced, vec![false, true]);
        Ok(())
    }

    #[test]
    fn test_files_processed_in_sort_order() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("c.txt"), "foo\n")?;
        fs::write(dir.path().join("b.txt"), "foo\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;

        // scanned last, so its file id is the highest
        fs::write(dir.path().join("a.txt"), "foo\n")?;
        query.run(&NullProgress)?;

        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::All, "bar")?
            .run(&mut ReplaceSession::new(), &always, &NullProgress)?;
        let names: Vec<String> = outcome
            .committed
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(outcome.replaced, 3);
        Ok(())
    }

    #[test]
    fn test_cancel_between_files_keeps_committed() -> SearchResult<()> {
        let dir = tempdir()?;
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(dir.path().join(name), "foo\n")?;
        }
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;

        let monitor = StopAfterFirstFile::default();
        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::All, "bar")?
            .run(&mut ReplaceSession::new(), &always, &monitor)?;

        assert!(outcome.cancelled);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.committed, vec![dir.path().join("a.txt")]);
        assert_eq!(outcome.replaced, 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt"))?, "bar\n");
        assert_eq!(fs::read_to_string(dir.path().join("b.txt"))?, "foo\n");
        assert_eq!(fs::read_to_string(dir.path().join("c.txt"))?, "foo\n");

        let untouched = query.results().file_id(&dir.path().join("b.txt")).unwrap();
        assert!(query
            .results()
            .matches_of_file(untouched)
            .iter()
            .all(|m| !m.is_replaced()));
        Ok(())
    }

    #[test]
    fn test_session_reused_after_search_runs_again() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "x a a\n")?;
        let query = query(dir.path(), PatternDefinition::literal("x"))?;
        let mut session = ReplaceSession::new();

        ReplaceOperation::replace(&query, ReplaceTarget::All, "xyyyy")?
            .run(&mut session, &always, &NullProgress)?;
        assert_eq!(fs::read_to_string(&path)?, "xyyyy a a\n");

        fs::write(&path, "b x\n")?;
        query.run(&NullProgress)?;
        let outcome = ReplaceOperation::replace(&query, ReplaceTarget::All, "z")?
            .run(&mut session, &always, &NullProgress)?;

        assert!(outcome.is_clean(), "failures: {:?}", outcome.failures);
        assert_eq!(outcome.replaced, 1);
        assert_eq!(fs::read_to_string(&path)?, "b z\n");
        Ok(())
    }

    #[test]
    fn test_preview_reads_connected_buffer() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo foo\n")?;
        let query = query(dir.path(), PatternDefinition::literal("foo"))?;
        let file = query.results().file_id(&path).unwrap();
        let first = query.results().matches_of_file(file)[0].id();
        let mut session = ReplaceSession::new();

        // a dirty buffer keeps the first replacement out of the file
        session.documents().connect(&path)?;
        if let Some(buffer) = session.documents().document(&path) {
            buffer.replace(7, 1, "!\n")?;
        }
        ReplaceOperation::replace(&query, ReplaceTarget::Match(first), "quux1")?
            .run(&mut session, &always, &NullProgress)?;
        assert_eq!(fs::read_to_string(&path)?, "foo foo\n");

        let diffs = ReplaceOperation::replace(&query, ReplaceTarget::All, "bar")?
            .preview(&session)?;
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].replacements, 1);
        assert_eq!(diffs[0].hunks[0].original_lines, vec!["quux1 foo!"]);
        assert_eq!(diffs[0].hunks[0].new_lines, vec!["quux1 bar!"]);
        Ok(())
    }
}
