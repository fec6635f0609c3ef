use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared with whatever renders progress; workers only
/// ever increment.
///
/// `total`, `completed`, `failed` and `drained` describe the scheduler pass
/// currently running and restart at zero with each pass. `completed_total`
/// counts every successful item since the handle was created and never goes
/// down.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    drained: AtomicU64,
    completed_total: AtomicU64,
}

/// Point-in-time copy of [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    /// Dequeued after cancellation and never started.
    pub drained: u64,
    /// Successful items across every pass.
    pub completed_total: u64,
}

impl ProgressSnapshot {
    /// Items of the current pass that are settled one way or another.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.drained
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass of `total` items. Resets the per-pass counters only.
    pub fn begin_pass(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.drained.store(0, Ordering::Relaxed);
        self.total.store(total as u64, Ordering::Relaxed);
    }

    pub fn complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.completed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fail(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn drain(&self) {
        self.drained.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful items in the current pass.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Successful items since creation. Monotonic.
    pub fn completed_total(&self) -> u64 {
        self.completed_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            completed_total: self.completed_total.load(Ordering::Relaxed),
        }
    }
}
