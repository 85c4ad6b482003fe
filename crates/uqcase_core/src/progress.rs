use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::study::SampleStatus;

/// Progress tracking for a running study.
///
/// Clones share the same counters, so a front end can poll while the
/// orchestrator records outcomes.
#[derive(Debug, Clone)]
pub struct StudyProgress {
    /// Samples that finished, successfully or not
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl StudyProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Count one finished sample; cancelled samples are not counted
    pub fn record(&self, status: SampleStatus) {
        match status {
            SampleStatus::Succeeded => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            SampleStatus::Failed => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            SampleStatus::Cancelled => {}
        }
    }

    /// Reset counters for a new run. A pending cancellation stays in force.
    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Request cancellation; samples already running finish normally
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for StudyProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let progress = StudyProgress::new(3);
        let view = progress.clone();

        progress.record(SampleStatus::Succeeded);
        progress.record(SampleStatus::Failed);
        progress.record(SampleStatus::Cancelled);
        assert_eq!(view.completed(), 2);
        assert_eq!(view.failed(), 1);

        view.cancel();
        assert!(progress.is_cancelled());

        progress.reset(5);
        assert_eq!(view.total(), 5);
        assert_eq!(view.completed(), 0);
        assert!(view.is_cancelled());
    }
}
