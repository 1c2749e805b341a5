use ignore::WalkBuilder;
use memmap2::Mmap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use super::matcher::PatternMatcher;
use crate::config::EncodingMode;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::{ScanMetrics, LARGE_FILE_THRESHOLD};
use crate::progress::ProgressMonitor;
use crate::scope::Scope;
use crate::view::SortOrder;

/// A raw match as reported by an engine. `content` is the whole file text.
#[derive(Debug, Clone, Copy)]
pub struct RawMatch<'a> {
    pub offset: usize,
    pub length: usize,
    pub content: &'a str,
}

/// Receives the files and raw matches of a search, sequentially and in report order
pub trait MatchCollector {
    fn begin(&mut self) {}

    /// Announces the next file. Returning `false` skips its matches.
    fn accept_file(&mut self, path: &Path) -> bool;

    /// Reports a match in the last accepted file. Returning `false` skips the rest of the file.
    fn accept_match(&mut self, m: RawMatch<'_>) -> bool;

    fn end(&mut self) {}
}

/// Outcome of one engine run
#[derive(Debug, Clone, Default)]
pub struct SearchStatus {
    pub files_scanned: usize,
    pub files_with_matches: usize,
    /// Files that could not be searched, with the reason
    pub errors: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

impl SearchStatus {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Walks a scope and reports raw pattern matches
pub trait RawSearchEngine: Send + Sync {
    fn search(
        &self,
        scope: &Scope,
        matcher: &PatternMatcher,
        order: SortOrder,
        collector: &mut dyn MatchCollector,
        monitor: &dyn ProgressMonitor,
    ) -> SearchStatus;
}

/// Decodes file bytes according to the encoding mode
fn decode_bytes(bytes: &[u8], path: &Path, encoding_mode: EncodingMode) -> SearchResult<String> {
    match encoding_mode {
        EncodingMode::FailFast => String::from_utf8(bytes.to_vec())
            .map_err(|e| SearchError::encoding_error(path, e)),
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            // Owned means at least one invalid sequence was replaced
            if let std::borrow::Cow::Owned(_) = cow {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
            }
            Ok(cow.into_owned())
        }
    }
}

struct ScannedFile {
    content: String,
    matches: Vec<(usize, usize)>,
}

/// Engine searching files on disk
#[derive(Debug, Clone)]
pub struct FileSystemSearchEngine {
    encoding_mode: EncodingMode,
    thread_count: NonZeroUsize,
    metrics: ScanMetrics,
}

impl Default for FileSystemSearchEngine {
    fn default() -> Self {
        Self::new(
            EncodingMode::FailFast,
            NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
        )
    }
}

impl FileSystemSearchEngine {
    pub fn new(encoding_mode: EncodingMode, thread_count: NonZeroUsize) -> Self {
        Self {
            encoding_mode,
            thread_count,
            metrics: ScanMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Files in scope, ordered for reporting
    pub fn collect_files(&self, scope: &Scope, order: SortOrder) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for root in scope.roots() {
            if root.is_file() {
                if scope.contains(root) && seen.insert(root.clone()) {
                    files.push(root.clone());
                }
                continue;
            }

            // Derived resources are decided by the scope filter, not by ignore files
            let walker = WalkBuilder::new(root)
                .hidden(true)
                .ignore(false)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .parents(false)
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                let path = entry.into_path();
                if scope.contains(&path) && seen.insert(path.clone()) {
                    files.push(path);
                } else {
                    trace!("Skipping {}", path.display());
                }
            }
        }

        order.sort_paths(&mut files);
        files
    }

    fn scan_file(&self, path: &Path, matcher: &PatternMatcher) -> SearchResult<ScannedFile> {
        let file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| SearchError::from_io(path, e))?
            .len();
        self.metrics.record_file_processing(size);

        let content = if size >= LARGE_FILE_THRESHOLD {
            trace!("Memory mapping {}", path.display());
            // Safety: the map is read-only and dropped before this function returns
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SearchError::from_io(path, e))?;
            self.metrics.record_mmap(size);
            decode_bytes(&mmap, path, self.encoding_mode)?
        } else {
            let bytes = std::fs::read(path).map_err(|e| SearchError::from_io(path, e))?;
            decode_bytes(&bytes, path, self.encoding_mode)?
        };

        let matches = matcher.find_matches(&content);
        self.metrics.record_matches(matches.len() as u64);
        Ok(ScannedFile { content, matches })
    }
}

impl RawSearchEngine for FileSystemSearchEngine {
    fn search(
        &self,
        scope: &Scope,
        matcher: &PatternMatcher,
        order: SortOrder,
        collector: &mut dyn MatchCollector,
        monitor: &dyn ProgressMonitor,
    ) -> SearchStatus {
        let files = self.collect_files(scope, order);
        debug!("Found {} files to search", files.len());

        let mut status = SearchStatus::default();
        monitor.begin("Searching", files.len());
        collector.begin();

        // Files are read in parallel chunks but reported sequentially, in order
        let chunk_size = (files.len() / self.thread_count.get()).clamp(16, 256);
        'chunks: for chunk in files.chunks(chunk_size) {
            if monitor.is_cancelled() {
                status.cancelled = true;
                break;
            }
            let scanned: Vec<SearchResult<ScannedFile>> = chunk
                .par_iter()
                .map(|path| self.scan_file(path, matcher))
                .collect();

            for (path, scan) in chunk.iter().zip(scanned) {
                if monitor.is_cancelled() {
                    status.cancelled = true;
                    break 'chunks;
                }
                monitor.worked(1);
                let scan = match scan {
                    Ok(scan) => scan,
                    Err(e) => {
                        warn!("Failed to search {}: {}", path.display(), e);
                        status.errors.push((path.clone(), e.to_string()));
                        continue;
                    }
                };
                status.files_scanned += 1;
                if !scan.matches.is_empty() {
                    status.files_with_matches += 1;
                }
                if !collector.accept_file(path) {
                    continue;
                }
                for &(start, end) in &scan.matches {
                    let raw = RawMatch {
                        offset: start,
                        length: end - start,
                        content: &scan.content,
                    };
                    if !collector.accept_match(raw) {
                        break;
                    }
                }
            }
        }

        collector.end();
        monitor.done();
        self.metrics.log_stats();
        info!(
            "Search complete. {} files scanned, {} with matches, {} errors",
            status.files_scanned,
            status.files_with_matches,
            status.errors.len()
        );
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelFlag, NullProgress};
    use crate::search::PatternDefinition;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        files: Vec<PathBuf>,
        matches: Vec<(PathBuf, String)>,
        ended: bool,
    }

    impl MatchCollector for Recorder {
        fn accept_file(&mut self, path: &Path) -> bool {
            self.files.push(path.to_path_buf());
            true
        }

        fn accept_match(&mut self, m: RawMatch<'_>) -> bool {
            let path = self.files.last().cloned().unwrap_or_default();
            self.matches
                .push((path, m.content[m.offset..m.offset + m.length].to_string()));
            true
        }

        fn end(&mut self) {
            self.ended = true;
        }
    }

    fn matcher(text: &str) -> PatternMatcher {
        PatternMatcher::new(PatternDefinition::literal(text)).unwrap()
    }

    #[test]
    fn test_reports_in_sort_order() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("b"))?;
        fs::write(dir.path().join("b").join("one.txt"), "foo\n")?;
        fs::write(dir.path().join("Alpha.txt"), "Foo foo\n")?;
        fs::write(dir.path().join("zeta.txt"), "nothing\n")?;

        let scope = Scope::new(vec![dir.path().to_path_buf()], &["*.txt"], false, false)?;
        let engine = FileSystemSearchEngine::default();
        let mut recorder = Recorder::default();
        let status = engine.search(
            &scope,
            &matcher("foo"),
            SortOrder::Flat,
            &mut recorder,
            &NullProgress,
        );

        assert!(status.is_ok());
        assert_eq!(status.files_scanned, 3);
        assert_eq!(status.files_with_matches, 2);
        assert!(recorder.ended);
        let names: Vec<_> = recorder
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Alpha.txt", "one.txt", "zeta.txt"]);
        let found: Vec<_> = recorder.matches.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(found, vec!["Foo", "foo", "foo"]);
        Ok(())
    }

    #[test]
    fn test_derived_and_hidden_files_skipped() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("target"))?;
        fs::create_dir_all(dir.path().join(".git"))?;
        fs::write(dir.path().join("target").join("gen.rs"), "foo")?;
        fs::write(dir.path().join(".git").join("config"), "foo")?;
        fs::write(dir.path().join("lib.rs"), "foo")?;

        let engine = FileSystemSearchEngine::default();
        let scope = Scope::new(vec![dir.path().to_path_buf()], &["*"], false, false)?;
        let files = engine.collect_files(&scope, SortOrder::Flat);
        assert_eq!(files, vec![dir.path().join("lib.rs")]);

        let with_derived = Scope::new(vec![dir.path().to_path_buf()], &["*"], false, true)?;
        assert_eq!(engine.collect_files(&with_derived, SortOrder::Flat).len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_is_a_file_error() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("bad.txt"), b"foo \xFF\xFE")?;
        fs::write(dir.path().join("good.txt"), "foo")?;
        let scope = Scope::new(vec![dir.path().to_path_buf()], &["*.txt"], false, false)?;

        let strict = FileSystemSearchEngine::default();
        let mut recorder = Recorder::default();
        let status = strict.search(&scope, &matcher("foo"), SortOrder::Flat, &mut recorder, &NullProgress);
        assert_eq!(status.errors.len(), 1);
        assert_eq!(recorder.matches.len(), 1);

        let lossy = FileSystemSearchEngine::new(EncodingMode::Lossy, NonZeroUsize::MIN);
        let mut recorder = Recorder::default();
        let status = lossy.search(&scope, &matcher("foo"), SortOrder::Flat, &mut recorder, &NullProgress);
        assert!(status.errors.is_empty());
        assert_eq!(recorder.matches.len(), 2);
        Ok(())
    }

    #[test]
    fn test_cancelled_before_start() -> SearchResult<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "foo")?;
        let scope = Scope::new(vec![dir.path().to_path_buf()], &["*.txt"], false, false)?;
        let flag = CancelFlag::new();
        flag.cancel();

        let mut recorder = Recorder::default();
        let status = FileSystemSearchEngine::default().search(
            &scope,
            &matcher("foo"),
            SortOrder::Flat,
            &mut recorder,
            &flag,
        );
        assert!(status.cancelled);
        assert!(recorder.files.is_empty());
        assert!(recorder.ended);
        Ok(())
    }
}
