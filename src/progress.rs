//! Batch progress reporting.
//!
//! The pipeline is network-bound; a large batch can run for minutes. The
//! orchestrator drives an optional [`BatchProgressCallback`] so a CLI can
//! render a live progress bar (and a server could publish job status)
//! without the library depending on any terminal crate.
//!
//! Callbacks are invoked from whichever task finished the document, so in
//! concurrent mode calls arrive out of input order; implementations must be
//! `Send + Sync` and do their own locking.

use std::sync::Arc;

/// Observer of batch-level progress events.
///
/// All methods have empty defaults so implementors override only what they
/// render.
pub trait BatchProgressCallback: Send + Sync {
    /// The batch is about to start processing `_total` documents.
    fn on_batch_start(&self, _total: usize) {}

    /// A document's pipeline run has begun.
    fn on_document_start(&self, _index: usize, _total: usize, _name: &str) {}

    /// A document's pipeline run has finished (successfully or not).
    fn on_document_complete(&self, _index: usize, _total: usize, _name: &str, _success: bool) {}

    /// Every document has settled (completed or cancelled).
    fn on_batch_complete(&self, _total: usize, _succeeded: usize) {}
}

/// Shared handle to a progress callback.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// Callback that ignores every event.
pub struct NoopProgress;

impl BatchProgressCallback for NoopProgress {}
