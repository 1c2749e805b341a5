use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Files below this size are read in a single call
pub(crate) const SMALL_FILE_THRESHOLD: u64 = 32 * 1024; // 32KB
/// Files at or above this size are memory mapped
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Tracks scan volume and scanner lookup efficiency
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    bytes_scanned: Arc<AtomicU64>,
    mmap_bytes: Arc<AtomicU64>,
    matches_reported: Arc<AtomicU64>,

    // Scanner lookup metrics
    scanner_cache_hits: Arc<AtomicU64>,
    scanner_cache_misses: Arc<AtomicU64>,

    // File processing metrics
    small_files_processed: Arc<AtomicU64>,
    buffered_files_processed: Arc<AtomicU64>,
    mmap_files_processed: Arc<AtomicU64>,
}

impl ScanMetrics {
    /// Creates a new ScanMetrics instance
    pub fn new() -> Self {
        Self {
            bytes_scanned: Arc::new(AtomicU64::new(0)),
            mmap_bytes: Arc::new(AtomicU64::new(0)),
            matches_reported: Arc::new(AtomicU64::new(0)),
            scanner_cache_hits: Arc::new(AtomicU64::new(0)),
            scanner_cache_misses: Arc::new(AtomicU64::new(0)),
            small_files_processed: Arc::new(AtomicU64::new(0)),
            buffered_files_processed: Arc::new(AtomicU64::new(0)),
            mmap_files_processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a memory mapped file
    pub fn record_mmap(&self, bytes: u64) {
        let total = self.mmap_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!(
            "Memory mapped: {} bytes, total mapped: {} bytes",
            bytes, total
        );
    }

    /// Records matches handed to a collector
    pub fn record_matches(&self, count: u64) {
        self.matches_reported.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a scanner lookup against the per-type cache
    pub fn record_scanner_lookup(&self, hit: bool) {
        if hit {
            self.scanner_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scanner_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records file processing type
    pub fn record_file_processing(&self, size: u64) {
        self.bytes_scanned.fetch_add(size, Ordering::Relaxed);
        if size < SMALL_FILE_THRESHOLD {
            self.small_files_processed.fetch_add(1, Ordering::Relaxed);
        } else if size >= LARGE_FILE_THRESHOLD {
            self.mmap_files_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.buffered_files_processed
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Gets current statistics
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            mmap_bytes: self.mmap_bytes.load(Ordering::Relaxed),
            matches_reported: self.matches_reported.load(Ordering::Relaxed),
            scanner_cache_hits: self.scanner_cache_hits.load(Ordering::Relaxed),
            scanner_cache_misses: self.scanner_cache_misses.load(Ordering::Relaxed),
            small_files: self.small_files_processed.load(Ordering::Relaxed),
            buffered_files: self.buffered_files_processed.load(Ordering::Relaxed),
            mmap_files: self.mmap_files_processed.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        let lookups = stats.scanner_cache_hits + stats.scanner_cache_misses;
        info!(
            bytes = stats.bytes_scanned,
            mapped = stats.mmap_bytes,
            matches = stats.matches_reported,
            "Scanned {} small, {} buffered and {} mapped files; {} of {} scanner lookups cached",
            stats.small_files,
            stats.buffered_files,
            stats.mmap_files,
            stats.scanner_cache_hits,
            lookups
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of scan statistics
#[derive(Debug, Clone, Copy)]
pub struct ScanStats {
    pub bytes_scanned: u64,
    pub mmap_bytes: u64,
    pub matches_reported: u64,
    pub scanner_cache_hits: u64,
    pub scanner_cache_misses: u64,
    pub small_files: u64,
    pub buffered_files: u64,
    pub mmap_files: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmap_tracking() {
        let metrics = ScanMetrics::new();

        metrics.record_mmap(5000);
        metrics.record_mmap(3000);
        let stats = metrics.get_stats();
        assert_eq!(stats.mmap_bytes, 8000);
    }

    #[test]
    fn test_scanner_lookup_metrics() {
        let metrics = ScanMetrics::new();

        metrics.record_scanner_lookup(false);
        metrics.record_scanner_lookup(true);
        metrics.record_scanner_lookup(true);
        let stats = metrics.get_stats();
        assert_eq!(stats.scanner_cache_hits, 2);
        assert_eq!(stats.scanner_cache_misses, 1);
    }

    #[test]
    fn test_file_processing_tracking() {
        let metrics = ScanMetrics::new();

        metrics.record_file_processing(1000); // Small file
        metrics.record_file_processing(100000); // Buffered file
        metrics.record_file_processing(20_000_000); // Memory mapped file

        let stats = metrics.get_stats();
        assert_eq!(stats.small_files, 1);
        assert_eq!(stats.buffered_files, 1);
        assert_eq!(stats.mmap_files, 1);
        assert_eq!(stats.bytes_scanned, 20_101_000);
    }
}
