use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress from long running operations and tells them when to stop.
///
/// Searches check `is_cancelled` between files; replaces check it between files as well,
/// never in the middle of splicing a single file.
pub trait ProgressMonitor: Send + Sync {
    fn begin(&self, _task: &str, _total: usize) {}

    fn worked(&self, _units: usize) {}

    fn is_cancelled(&self) -> bool {
        false
    }

    fn done(&self) {}
}

/// Monitor that ignores progress and never cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressMonitor for NullProgress {}

/// Shared cancellation flag usable as a monitor
#[derive(Debug, Default, Clone)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl ProgressMonitor for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
        assert!(!NullProgress.is_cancelled());
    }
}
