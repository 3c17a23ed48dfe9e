//! Eager (whole-batch) entry points.
//!
//! ## Why eager vs. incremental?
//!
//! This module provides the simpler API: submit everything, wait for the
//! queue to drain, return the final snapshot. Use a [`Pipeline`] directly
//! with a [`crate::progress::BatchObserver`] when results should surface
//! incrementally as items complete.

use crate::config::PipelineConfig;
use crate::error::BatchOcrError;
use crate::item::ImageSource;
use crate::pipeline::extract::Extractor;
use crate::pipeline::Pipeline;
use crate::stats::BatchStats;
use crate::store::ItemSnapshot;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Final state of an eager batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    /// Every item in submission order, each Completed or Error.
    pub items: Vec<ItemSnapshot>,
    pub stats: BatchStats,
    pub duration_ms: u64,
}

/// Run a whole batch against the Workers AI extractor and wait for it.
///
/// This is the primary entry point for one-shot callers (the CLI uses it
/// when no incremental display is wanted).
///
/// # Errors
/// Returns `Err` only for fatal conditions — missing credentials or an
/// over-capacity submission. Per-item failures are *not* errors here: they
/// come back as items with `Error` status (check `output.stats.failed`).
pub async fn run_batch(
    sources: Vec<ImageSource>,
    config: &PipelineConfig,
) -> Result<BatchOutput, BatchOcrError> {
    let pipeline = Pipeline::with_workers_ai(config.clone())?;
    run_on(pipeline, sources).await
}

/// Eager run over a caller-supplied extractor.
pub async fn run_batch_with(
    sources: Vec<ImageSource>,
    config: &PipelineConfig,
    extractor: Arc<dyn Extractor>,
) -> Result<BatchOutput, BatchOcrError> {
    let pipeline = Pipeline::new(config.clone(), extractor);
    run_on(pipeline, sources).await
}

async fn run_on(
    pipeline: Pipeline,
    sources: Vec<ImageSource>,
) -> Result<BatchOutput, BatchOcrError> {
    let start = Instant::now();
    let count = sources.len();
    info!("Starting batch of {count} images");

    pipeline.submit(sources)?;
    pipeline.wait_settled().await;

    let items = pipeline.snapshot();
    let stats = BatchStats::compute(&items);
    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Batch complete: {}/{} extracted, {} failed, {}ms",
        stats.completed, stats.total, stats.failed, duration_ms
    );

    Ok(BatchOutput {
        items,
        stats,
        duration_ms,
    })
}
