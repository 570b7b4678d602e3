use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation handle shared between a run and its controller.
///
/// The loader checks it only between batches, so a cancelled run never leaves a
/// half-written batch behind.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot emitted after every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    /// Batches committed so far.
    pub batches_committed: u64,
    /// Source rows consumed so far.
    pub rows_processed: u64,
    /// Total rows, when the source knows its length up front.
    pub total_rows: Option<u64>,
    /// Rows inserted so far.
    pub inserted: u64,
    /// Rows skipped as existing so far.
    pub skipped: u64,
}
