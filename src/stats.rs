//! Batch statistics: a pure projection of the store snapshot.
//!
//! Stats are recomputed from the snapshot on every read and never stored
//! independently, so they cannot drift from the store. The counts always
//! satisfy `completed + pending + processing + failed == total`.

use crate::item::ItemStatus;
use crate::store::ItemSnapshot;
use serde::Serialize;

/// Summary counts over one batch snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
}

impl BatchStats {
    /// Derive the counts from a store snapshot.
    pub fn compute(items: &[ItemSnapshot]) -> Self {
        let mut stats = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Error => stats.failed += 1,
            }
        }
        stats
    }

    /// Every item has reached a terminal state (vacuously true when empty).
    pub fn is_complete(&self) -> bool {
        self.completed + self.failed == self.total
    }

    /// The batch has items and at least one is still pending or processing.
    pub fn is_active(&self) -> bool {
        self.total > 0 && !self.is_complete()
    }

    /// No work is queued or in flight. Unlike [`Self::is_complete`] this is
    /// what the scheduler's idle wait checks: an empty store is settled too.
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}
