use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use super::collector::ResultCollector;
use super::engine::{FileSystemSearchEngine, RawSearchEngine, SearchStatus};
use super::matcher::{PatternDefinition, PatternMatcher};
use crate::errors::{SearchError, SearchResult};
use crate::progress::{CancelFlag, ProgressMonitor};
use crate::results::SearchResults;
use crate::scanner::ScannerRegistry;
use crate::scope::Scope;
use crate::view::SortOrder;

/// A pattern over a scope, owning the results it produced
#[derive(Clone)]
pub struct SearchQuery {
    matcher: Arc<PatternMatcher>,
    scope: Scope,
    order: SortOrder,
    engine: Arc<dyn RawSearchEngine>,
    scanners: Arc<ScannerRegistry>,
    results: Arc<SearchResults>,
}

impl SearchQuery {
    pub fn new(pattern: PatternDefinition, scope: Scope) -> SearchResult<Self> {
        Ok(Self {
            matcher: Arc::new(PatternMatcher::new(pattern)?),
            scope,
            order: SortOrder::default(),
            engine: Arc::new(FileSystemSearchEngine::default()),
            scanners: Arc::new(ScannerRegistry::with_builtin()),
            results: Arc::new(SearchResults::new()),
        })
    }

    pub fn with_engine(mut self, engine: Arc<dyn RawSearchEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_scanners(mut self, scanners: Arc<ScannerRegistry>) -> Self {
        self.scanners = scanners;
        self
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn results(&self) -> &Arc<SearchResults> {
        &self.results
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn pattern(&self) -> &PatternDefinition {
        self.matcher.definition()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    pub fn scanners(&self) -> &ScannerRegistry {
        &self.scanners
    }

    /// Runs the query from scratch. Files that could not be read are listed in the
    /// returned status; a cancelled run keeps what was found so far.
    pub fn run(&self, monitor: &dyn ProgressMonitor) -> SearchResult<SearchStatus> {
        info!(
            "Searching for '{}' in {} roots",
            self.pattern().text,
            self.scope.roots().len()
        );
        self.results.begin_search();
        let mut collector = ResultCollector::new(&self.results, &self.scanners);
        let status = self.engine.search(
            &self.scope,
            &self.matcher,
            self.order,
            &mut collector,
            monitor,
        );
        self.results.finish_search();
        if status.cancelled {
            debug!("Search cancelled");
        }
        Ok(status)
    }

    /// Rescans one file, replacing its lines in the index
    pub fn search_file(&self, path: &Path) -> SearchResult<()> {
        if !path.is_file() {
            return Err(SearchError::out_of_sync(path, "file no longer exists"));
        }
        debug!("Rescanning {}", path.display());
        let scope = Scope::single_file(path);
        let mut collector = ResultCollector::new(&self.results, &self.scanners);
        let status = self.engine.search(
            &scope,
            &self.matcher,
            self.order,
            &mut collector,
            &crate::progress::NullProgress,
        );
        match status.errors.into_iter().next() {
            Some((path, message)) => Err(SearchError::out_of_sync(path, message)),
            None => Ok(()),
        }
    }

    /// Runs the query on a background thread
    pub fn spawn(self) -> SearchJob {
        let cancel = CancelFlag::new();
        let results = Arc::clone(&self.results);
        let monitor = cancel.clone();
        let handle = thread::spawn(move || self.run(&monitor));
        SearchJob {
            results,
            cancel,
            handle,
        }
    }
}

/// A query running in the background
pub struct SearchJob {
    results: Arc<SearchResults>,
    cancel: CancelFlag,
    handle: JoinHandle<SearchResult<SearchStatus>>,
}

impl SearchJob {
    /// The index being filled; it can be read while the search runs
    pub fn results(&self) -> &Arc<SearchResults> {
        &self.results
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> SearchResult<SearchStatus> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(SearchError::Cancelled))
    }
}

/// Paths of the files a query left matches in
pub fn matching_paths(query: &SearchQuery) -> Vec<PathBuf> {
    query.results().matching_files()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use std::fs;
    use tempfile::tempdir;

    fn query(dir: &Path, text: &str) -> SearchResult<SearchQuery> {
        let scope = Scope::new(vec![dir.to_path_buf()], &["*"], false, false)?;
        SearchQuery::new(PatternDefinition::literal(text), scope)
    }

    #[test]
    fn test_run_fills_results() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "foo\nbar foo\n")?;
        fs::write(dir.path().join("b.txt"), "baz\n")?;

        let query = query(dir.path(), "foo")?;
        let status = query.run(&NullProgress)?;
        assert!(status.is_ok());
        assert!(query.results().is_complete());
        assert_eq!(query.results().counts().total, 2);
        assert_eq!(matching_paths(&query).len(), 1);
        Ok(())
    }

    #[test]
    fn test_search_file_refreshes_one_file() -> SearchResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("a.txt");
        fs::write(&path, "foo\n")?;
        let query = query(dir.path(), "foo")?;
        query.run(&NullProgress)?;

        fs::write(&path, "foo foo foo\n")?;
        query.search_file(&path)?;
        assert_eq!(query.results().counts().total, 3);

        fs::remove_file(&path)?;
        assert!(matches!(
            query.search_file(&path),
            Err(SearchError::OutOfSync { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_background_job() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "foo\n")?;
        let job = query(dir.path(), "foo")?.spawn();
        let results = Arc::clone(job.results());
        let status = job.join()?;
        assert!(status.is_ok());
        assert_eq!(results.counts().total, 1);
        Ok(())
    }
}
