//! The work item store: single source of truth for batch state.
//!
//! The store is the only shared mutable structure in the pipeline. It is
//! mutated through exactly four operations — [`ItemStore::submit`],
//! [`ItemStore::transition`], [`ItemStore::remove`], [`ItemStore::clear`] —
//! each of which is one atomic step from the scheduler's point of view (the
//! pipeline wraps the store in a mutex that is never held across an await).
//!
//! Insertion order is preserved: it is both the display order and the FIFO
//! admission order. Items are keyed by [`ItemId`] but a plain `Vec` backs the
//! collection — batches are capped at `max_batch_size` (default 100), so a
//! linear id scan is cheaper than maintaining an index.

use crate::error::BatchOcrError;
use crate::item::{ImageSource, ItemId, ItemStatus, WorkItem};
use serde::Serialize;
use tracing::debug;

/// A status replacement applied to one item, keyed by id.
///
/// Carries the payload that belongs with the new status, so status and
/// payload can never drift apart.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Pending → Processing: the scheduler admitted the item.
    Processing,
    /// Processing → Completed, with the extracted text.
    Completed { text: String },
    /// Processing → Error, with the failure's message. Terminal.
    Failed { message: String },
}

/// Read-only copy of one item, safe to hand to rendering and stats code.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub name: String,
    pub status: ItemStatus,
    pub extracted_text: Option<String>,
    pub error_message: Option<String>,
}

/// Ordered, capacity-bounded collection of [`WorkItem`]s.
pub struct ItemStore {
    items: Vec<WorkItem>,
    max_batch_size: usize,
}

impl ItemStore {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            items: Vec::new(),
            max_batch_size,
        }
    }

    /// Append new items, all starting as `Pending`.
    ///
    /// Rejects the entire submission — no partial insert — when it would push
    /// the total count past `max_batch_size`. The store is left untouched on
    /// rejection so the caller can surface a capacity message and retry with
    /// a smaller batch.
    pub fn submit(&mut self, items: Vec<WorkItem>) -> Result<(), BatchOcrError> {
        if self.items.len() + items.len() > self.max_batch_size {
            return Err(BatchOcrError::CapacityExceeded {
                submitted: items.len(),
                current: self.items.len(),
                max: self.max_batch_size,
            });
        }
        debug!("Queued {} new items ({} total)", items.len(), self.items.len() + items.len());
        self.items.extend(items);
        Ok(())
    }

    /// Replace the status (and payload) of the item with `id`.
    ///
    /// Returns `false` — a harmless no-op — when the id no longer exists:
    /// the item was deleted while its extraction was in flight, and the
    /// stale result must be dropped, never resurrected. Also refuses
    /// backward transitions so the state machine only moves forward.
    pub fn transition(&mut self, id: ItemId, change: Transition) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            debug!("Dropping result for deleted item {id}");
            return false;
        };

        match change {
            Transition::Processing => {
                if item.status != ItemStatus::Pending {
                    return false;
                }
                item.status = ItemStatus::Processing;
            }
            Transition::Completed { text } => {
                if item.status != ItemStatus::Processing {
                    return false;
                }
                item.status = ItemStatus::Completed;
                item.extracted_text = Some(text);
                item.error_message = None;
            }
            Transition::Failed { message } => {
                if item.status != ItemStatus::Processing {
                    return false;
                }
                item.status = ItemStatus::Error;
                item.error_message = Some(message);
                item.extracted_text = None;
            }
        }
        true
    }

    /// Delete one item, releasing its preview resource.
    ///
    /// Idempotent: removing an id that is already absent is a no-op. An
    /// in-flight extraction for the removed item is not aborted — its
    /// eventual [`Self::transition`] call finds no item and drops the result.
    pub fn remove(&mut self, id: ItemId) -> bool {
        match self.items.iter().position(|i| i.id == id) {
            Some(pos) => {
                let mut item = self.items.remove(pos);
                item.preview.release();
                debug!("Removed {id} ({} remaining)", self.items.len());
                true
            }
            None => false,
        }
    }

    /// Delete all items, releasing every preview resource exactly once.
    ///
    /// Returns how many items were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.items.len();
        for item in &mut self.items {
            item.preview.release();
        }
        self.items.clear();
        debug!("Cleared {n} items");
        n
    }

    /// Ordered read-only snapshot of the whole batch.
    pub fn all(&self) -> Vec<ItemSnapshot> {
        self.items
            .iter()
            .map(|i| ItemSnapshot {
                id: i.id,
                name: i.name(),
                status: i.status,
                extracted_text: i.extracted_text.clone(),
                error_message: i.error_message.clone(),
            })
            .collect()
    }

    /// Number of items currently `Processing`.
    pub fn processing_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Processing)
            .count()
    }

    /// First `Pending` item in insertion order, if any.
    ///
    /// Returns the id plus a cheap clone of the source so the caller can
    /// start an extraction task without holding the store.
    pub fn next_pending(&self) -> Option<(ItemId, ImageSource)> {
        self.items
            .iter()
            .find(|i| i.status == ItemStatus::Pending)
            .map(|i| (i.id, i.source.clone()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::PreviewHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn mem_item(id: u64) -> WorkItem {
        WorkItem::new(
            ItemId(id),
            ImageSource::Memory {
                name: format!("img-{id}.png"),
                data: Arc::from(vec![0u8; 4].into_boxed_slice()),
            },
            PreviewHandle::noop(),
        )
    }

    #[test]
    fn submit_preserves_insertion_order() {
        let mut store = ItemStore::new(100);
        store.submit(vec![mem_item(1), mem_item(2), mem_item(3)]).unwrap();
        let ids: Vec<_> = store.all().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![ItemId(1), ItemId(2), ItemId(3)]);
    }

    #[test]
    fn over_capacity_submission_is_rejected_wholesale() {
        let mut store = ItemStore::new(3);
        store.submit(vec![mem_item(1), mem_item(2)]).unwrap();

        let err = store
            .submit(vec![mem_item(3), mem_item(4)])
            .expect_err("should reject");
        assert!(matches!(err, BatchOcrError::CapacityExceeded { .. }));
        // No partial insert: the store is exactly as before.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn over_capacity_submission_into_empty_store() {
        let mut store = ItemStore::new(100);
        let items: Vec<_> = (0..101).map(mem_item).collect();
        assert!(store.submit(items).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn transition_on_missing_id_is_dropped() {
        let mut store = ItemStore::new(10);
        let applied = store.transition(
            ItemId(7),
            Transition::Completed {
                text: "stale".into(),
            },
        );
        assert!(!applied);
        assert!(store.is_empty(), "stale result must not resurrect an item");
    }

    #[test]
    fn transitions_only_move_forward() {
        let mut store = ItemStore::new(10);
        store.submit(vec![mem_item(1)]).unwrap();

        // Completed straight from Pending is refused.
        assert!(!store.transition(ItemId(1), Transition::Completed { text: "x".into() }));

        assert!(store.transition(ItemId(1), Transition::Processing));
        // Re-admitting a Processing item is refused.
        assert!(!store.transition(ItemId(1), Transition::Processing));

        assert!(store.transition(ItemId(1), Transition::Completed { text: "hello".into() }));
        let snap = &store.all()[0];
        assert_eq!(snap.status, ItemStatus::Completed);
        assert_eq!(snap.extracted_text.as_deref(), Some("hello"));
        assert!(snap.error_message.is_none());

        // Terminal: nothing applies after Completed.
        assert!(!store.transition(ItemId(1), Transition::Failed { message: "late".into() }));
    }

    #[test]
    fn failed_transition_sets_message_only() {
        let mut store = ItemStore::new(10);
        store.submit(vec![mem_item(1)]).unwrap();
        store.transition(ItemId(1), Transition::Processing);
        store.transition(ItemId(1), Transition::Failed { message: "rate limited".into() });

        let snap = &store.all()[0];
        assert_eq!(snap.status, ItemStatus::Error);
        assert_eq!(snap.error_message.as_deref(), Some("rate limited"));
        assert!(snap.extracted_text.is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = ItemStore::new(10);
        store.submit(vec![mem_item(1)]).unwrap();
        assert!(store.remove(ItemId(1)));
        assert!(!store.remove(ItemId(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn clear_releases_every_preview_exactly_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut store = ItemStore::new(10);

        let items: Vec<_> = (0..5)
            .map(|id| {
                let r = Arc::clone(&releases);
                WorkItem::new(
                    ItemId(id),
                    ImageSource::Memory {
                        name: format!("img-{id}"),
                        data: Arc::from(vec![0u8].into_boxed_slice()),
                    },
                    PreviewHandle::with_release(move || {
                        r.fetch_add(1, Ordering::SeqCst);
                    }),
                )
            })
            .collect();

        store.submit(items).unwrap();
        assert_eq!(store.clear(), 5);
        assert_eq!(releases.load(Ordering::SeqCst), 5);

        // Clearing again must not double-release.
        assert_eq!(store.clear(), 0);
        assert_eq!(releases.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn next_pending_is_fifo() {
        let mut store = ItemStore::new(10);
        store.submit(vec![mem_item(1), mem_item(2)]).unwrap();
        let (first, _) = store.next_pending().unwrap();
        assert_eq!(first, ItemId(1));

        store.transition(ItemId(1), Transition::Processing);
        let (second, _) = store.next_pending().unwrap();
        assert_eq!(second, ItemId(2));
    }
}
