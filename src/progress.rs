//! Progress reporting for the indexing pipeline.
//!
//! A narrow callback interface so the core stays decoupled from any
//! particular job-tracking system. The CLI adapts it to a progress bar;
//! an HTTP host would adapt it to its job table.

/// Receives indexing progress updates.
pub trait ProgressSink: Send + Sync {
    /// Called as chunks move through the pipeline. `processed` never
    /// exceeds `total`, and `total` is stable for one indexing run.
    fn on_progress(&self, processed: usize, total: usize);
}

/// Sink that ignores all updates.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _processed: usize, _total: usize) {}
}
