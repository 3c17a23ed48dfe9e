//! The bounded-concurrency pipeline: store, scheduler, and per-item tasks.
//!
//! ## Data Flow
//!
//! ```text
//! submit ──▶ store (Pending) ──▶ scheduler ──▶ encode ──▶ extract ──▶ store
//!                                  ▲ (admit ≤ C)  (blocking) (retries)   │
//!                                  └────────────── re-evaluate ──────────┘
//! ```
//!
//! ## Scheduling model
//!
//! The scheduler is **level-triggered**: [`Pipeline::pump`] re-examines the
//! whole store after every mutation — submission, removal, clear, and each
//! extraction completion — rather than tracking discrete "slot freed" events,
//! so a missed wakeup cannot strand pending items. Each pump cycle admits at
//! most one item: it marks the first `Pending` item `Processing` *before*
//! spawning its task, which is the exclusion mechanism — once marked, the
//! item no longer matches the Pending predicate and cannot be double-admitted
//! by a concurrent re-evaluation. The loop then re-enters to fill any
//! remaining capacity, one admission at a time.
//!
//! The store mutex is never held across an await: admission takes the lock,
//! flips one status, and releases before the extraction task starts.

pub mod encode;
pub mod extract;

use crate::config::PipelineConfig;
use crate::error::{BatchOcrError, ItemError};
use crate::item::{ImageSource, ItemId, PreviewHandle, WorkItem};
use crate::pipeline::extract::{extract_with_retry, Extractor, WorkersAiExtractor};
use crate::stats::BatchStats;
use crate::store::{ItemSnapshot, ItemStore, Transition};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{info, warn};

/// Handle to one batch OCR pipeline instance.
///
/// Cheap to clone; all clones share the same store and scheduler. The store
/// is owned exclusively by the pipeline and mutated only through the
/// operations here — there is no ambient global state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    extractor: Arc<dyn Extractor>,
    store: Mutex<ItemStore>,
    next_id: AtomicU64,
    /// Signalled after every terminal transition and clear, so
    /// [`Pipeline::wait_settled`] can re-check without polling.
    settled: Notify,
}

impl Pipeline {
    /// Build a pipeline around an arbitrary extractor.
    ///
    /// Tests and embedders inject scripted extractors here; production code
    /// usually goes through [`Pipeline::with_workers_ai`].
    pub fn new(config: PipelineConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(ItemStore::new(config.max_batch_size)),
                config,
                extractor,
                next_id: AtomicU64::new(1),
                settled: Notify::new(),
            }),
        }
    }

    /// Build a pipeline backed by the Workers AI endpoint.
    ///
    /// Fails with [`BatchOcrError::MissingCredentials`] when `CF_ACCOUNT_ID`
    /// / `CF_API_TOKEN` are absent — before any item is accepted.
    pub fn with_workers_ai(config: PipelineConfig) -> Result<Self, BatchOcrError> {
        let extractor: Arc<dyn Extractor> = Arc::new(WorkersAiExtractor::new(&config)?);
        Ok(Self::new(config, extractor))
    }

    /// Queue new images, each with a no-op preview handle.
    pub fn submit(&self, sources: Vec<ImageSource>) -> Result<Vec<ItemId>, BatchOcrError> {
        self.submit_with_previews(
            sources
                .into_iter()
                .map(|s| (s, PreviewHandle::noop()))
                .collect(),
        )
    }

    /// Queue new images with caller-supplied preview handles.
    ///
    /// The whole group is rejected — store untouched — when it would exceed
    /// `max_batch_size`; the supplied previews are released as the rejected
    /// group is dropped. On acceptance each preview is owned by its item and
    /// released exactly once, at the earlier of removal and clear.
    pub fn submit_with_previews(
        &self,
        sources: Vec<(ImageSource, PreviewHandle)>,
    ) -> Result<Vec<ItemId>, BatchOcrError> {
        let count = sources.len();
        let items: Vec<WorkItem> = sources
            .into_iter()
            .map(|(source, preview)| {
                let id = ItemId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
                WorkItem::new(id, source, preview)
            })
            .collect();
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();

        let total = {
            let mut store = self.inner.store.lock().unwrap();
            store.submit(items)?;
            store.len()
        };
        info!("Submitted {count} items ({total} queued)");

        if let Some(obs) = &self.inner.config.observer {
            obs.on_batch_submitted(count, total);
        }
        self.pump();
        Ok(ids)
    }

    /// Delete one item, releasing its preview. Idempotent.
    ///
    /// Removing a `Processing` item does not abort its in-flight extraction;
    /// the eventual result finds no item and is dropped. It does free a
    /// concurrency slot immediately, so the scheduler re-evaluates.
    pub fn remove(&self, id: ItemId) -> bool {
        let removed = self.inner.store.lock().unwrap().remove(id);
        if removed {
            self.inner.settled.notify_waiters();
            self.pump();
        }
        removed
    }

    /// Delete all items, releasing every preview exactly once.
    pub fn clear(&self) -> usize {
        let n = self.inner.store.lock().unwrap().clear();
        if n > 0 {
            info!("Cleared {n} items");
        }
        self.inner.settled.notify_waiters();
        n
    }

    /// Ordered snapshot of the whole batch.
    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.inner.store.lock().unwrap().all()
    }

    /// Summary counts, recomputed from the store on every call.
    pub fn stats(&self) -> BatchStats {
        BatchStats::compute(&self.snapshot())
    }

    /// Case-insensitive substring search over completed items' text.
    ///
    /// An empty query returns the full snapshot; a non-empty query matches
    /// only `Completed` items whose extracted text contains it.
    pub fn search(&self, query: &str) -> Vec<ItemSnapshot> {
        let snapshot = self.snapshot();
        if query.is_empty() {
            return snapshot;
        }
        let needle = query.to_lowercase();
        snapshot
            .into_iter()
            .filter(|item| {
                item.extracted_text
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Wait until no item is pending or processing.
    ///
    /// Returns immediately for an empty store. Registers for notification
    /// *before* checking, so a transition landing between the check and the
    /// await cannot be missed.
    pub async fn wait_settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if self.stats().is_settled() {
                return;
            }
            notified.await;
        }
    }

    /// One scheduler reaction: admit pending items up to the ceiling.
    ///
    /// Runs synchronously inside every mutation path. Each loop iteration is
    /// one admission cycle — count `Processing`, pick the first `Pending`,
    /// mark it, spawn its task — and the loop re-enters until capacity is
    /// full or the queue is empty.
    fn pump(&self) {
        loop {
            let admitted = {
                let mut store = self.inner.store.lock().unwrap();
                if store.processing_count() >= self.inner.config.concurrency {
                    None
                } else {
                    match store.next_pending() {
                        Some((id, source)) => {
                            store.transition(id, Transition::Processing);
                            Some((id, source))
                        }
                        None => None,
                    }
                }
            };

            let Some((id, source)) = admitted else {
                return;
            };

            let name = source.name();
            if let Some(obs) = &self.inner.config.observer {
                obs.on_item_started(id, &name);
            }

            let pipeline = self.clone();
            tokio::spawn(async move {
                let outcome = pipeline.run_item(id, source).await;
                pipeline.finish_item(id, &name, outcome);
            });
        }
    }

    /// Encode and extract one admitted item. Never panics the scheduler:
    /// every failure becomes a terminal `Failed` transition.
    async fn run_item(&self, id: ItemId, source: ImageSource) -> Transition {
        let name = source.name();

        let bytes = match read_source(&source).await {
            Ok(b) => b,
            Err(e) => {
                warn!("{id}: {e}");
                return Transition::Failed {
                    message: e.to_string(),
                };
            }
        };

        // Decoding and re-encoding a large photo is CPU work; keep it off
        // the async workers like the teacher keeps rasterisation off them.
        let max_dim = self.inner.config.max_dimension;
        let quality = self.inner.config.jpeg_quality;
        let encode_name = name.clone();
        let payload = match tokio::task::spawn_blocking(move || {
            encode::encode_image(&bytes, max_dim, quality)
        })
        .await
        {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                let err = ItemError::EncodeFailed {
                    name: encode_name,
                    detail: e.to_string(),
                };
                warn!("{id}: {err}");
                return Transition::Failed {
                    message: err.to_string(),
                };
            }
            Err(join_err) => {
                return Transition::Failed {
                    message: format!("encoder task panicked: {join_err}"),
                };
            }
        };

        match extract_with_retry(
            &self.inner.extractor,
            &payload,
            id,
            self.inner.config.max_attempts,
            self.inner.config.retry_backoff_ms,
            self.inner.config.observer.as_ref(),
        )
        .await
        {
            Ok(text) => Transition::Completed { text },
            Err(e) => Transition::Failed {
                message: e.to_string(),
            },
        }
    }

    /// Write an extraction outcome back and re-evaluate.
    ///
    /// If the item was deleted while in flight, the transition is a no-op
    /// and no completion event fires — the result vanishes without a trace,
    /// as it must.
    fn finish_item(&self, id: ItemId, name: &str, outcome: Transition) {
        let event = match &outcome {
            Transition::Completed { text } => Some(Ok(text.len())),
            Transition::Failed { message } => Some(Err(message.clone())),
            Transition::Processing => None,
        };

        let applied = self.inner.store.lock().unwrap().transition(id, outcome);

        if applied {
            if let Some(obs) = &self.inner.config.observer {
                match event {
                    Some(Ok(len)) => obs.on_item_completed(id, name, len),
                    Some(Err(msg)) => obs.on_item_failed(id, name, &msg),
                    None => {}
                }
            }
        }

        let stats = self.stats();
        if stats.is_settled() {
            if let Some(obs) = &self.inner.config.observer {
                obs.on_batch_settled(stats);
            }
        }
        self.inner.settled.notify_waiters();
        self.pump();
    }
}

/// Read the raw bytes behind a source.
async fn read_source(source: &ImageSource) -> Result<Vec<u8>, ItemError> {
    match source {
        ImageSource::Path(path) => {
            tokio::fs::read(path).await.map_err(|e| ItemError::ReadFailed {
                name: source.name(),
                detail: e.to_string(),
            })
        }
        ImageSource::Memory { data, .. } => Ok(data.to_vec()),
    }
}
