//! Observer trait for per-item pipeline events.
//!
//! Inject an `Arc<dyn BatchObserver>` via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! items move through the pipeline — results arrive incrementally, in
//! completion order, not submission order.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a terminal progress bar, a UI event loop, or a broadcast
//! channel without the library knowing how the host application communicates.
//! All methods have default no-op implementations so callers only override
//! what they care about.

use crate::item::ItemId;
use crate::stats::BatchStats;
use std::sync::Arc;

/// Called by the pipeline as items are queued, admitted, and resolved.
///
/// Implementations must be `Send + Sync`: item events fire from concurrently
/// running extraction tasks. Protect shared mutable state accordingly.
pub trait BatchObserver: Send + Sync {
    /// A submission was accepted; `count` new items are now queued.
    fn on_batch_submitted(&self, count: usize, total: usize) {
        let _ = (count, total);
    }

    /// The scheduler admitted an item; its extraction call is starting.
    fn on_item_started(&self, id: ItemId, name: &str) {
        let _ = (id, name);
    }

    /// An extraction attempt failed and will be retried after `backoff_ms`.
    fn on_item_retry(&self, id: ItemId, attempt: u32, max_attempts: u32, backoff_ms: u64) {
        let _ = (id, attempt, max_attempts, backoff_ms);
    }

    /// An item reached `Completed`. `text_len` is the extracted text's byte
    /// length (useful for progress output).
    fn on_item_completed(&self, id: ItemId, name: &str, text_len: usize) {
        let _ = (id, name, text_len);
    }

    /// An item reached terminal `Error` after all retries.
    fn on_item_failed(&self, id: ItemId, name: &str, error: &str) {
        let _ = (id, name, error);
    }

    /// No work is queued or in flight any more.
    ///
    /// May fire more than once over a pipeline's lifetime: each time the
    /// queue drains, and again after later submissions drain.
    fn on_batch_settled(&self, stats: BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Convenience alias matching the type stored in the pipeline config.
pub type Observer = Arc<dyn BatchObserver>;
