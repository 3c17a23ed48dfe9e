//! Work items: one per submitted image, from submission to terminal state.
//!
//! A [`WorkItem`] moves through a strictly forward state machine:
//!
//! ```text
//! Pending ──▶ Processing ──▶ Completed
//!                       └──▶ Error      (terminal; no automatic re-queue)
//! ```
//!
//! Exactly one of {`extracted_text`, `error_message`, neither} is present at
//! any time, always consistent with `status`. The invariant is enforced by
//! construction: status, text, and message are only ever replaced together
//! via [`crate::store::Transition`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

/// Opaque per-session identifier for a work item.
///
/// Generated from a monotonic counter owned by the pipeline, so ids are
/// unique and collision-free for the lifetime of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub(crate) u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Processing status of a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    /// Queued, waiting for a free extraction slot.
    Pending,
    /// An extraction task is in flight for this item.
    Processing,
    /// Extraction succeeded; `extracted_text` is present.
    Completed,
    /// Terminal failure; `error_message` is present.
    Error,
}

/// Where the raw image bytes come from.
///
/// In-memory sources hold their bytes behind an `Arc` so that handing a copy
/// to the extraction task never clones megabytes of pixel data.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// An image file on disk, read lazily when the item is admitted.
    Path(PathBuf),
    /// Image bytes already in memory (e.g. received over the wire).
    Memory { name: String, data: Arc<[u8]> },
}

impl ImageSource {
    /// Display name for logs, progress output, and error messages.
    pub fn name(&self) -> String {
        match self {
            ImageSource::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            ImageSource::Memory { name, .. } => name.clone(),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(p: PathBuf) -> Self {
        ImageSource::Path(p)
    }
}

/// Release-exactly-once guard for an item's preview resource.
///
/// The original of every work item owns one display preview (a thumbnail, an
/// object URL, a mapped buffer — whatever the embedding application derives
/// from the source image). The handle guarantees the paired release runs
/// exactly once: explicitly when the item is removed or the store is cleared,
/// and on drop as a backstop for pipeline teardown. Releasing twice is
/// structurally impossible because the closure is `take()`n out.
pub struct PreviewHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PreviewHandle {
    /// A handle with no backing resource. The default for sources that need
    /// no preview (CLI batches, tests).
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// A handle whose `release` closure runs exactly once, at the earlier of
    /// explicit release and drop.
    pub fn with_release(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(f)),
        }
    }

    /// Release the backing resource now. Idempotent.
    pub fn release(&mut self) {
        if let Some(f) = self.release.take() {
            f();
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// One unit of work: a single submitted image and its processing outcome.
#[derive(Debug)]
pub struct WorkItem {
    pub id: ItemId,
    pub source: ImageSource,
    pub preview: PreviewHandle,
    pub status: ItemStatus,
    /// Present only when `status == Completed`.
    pub extracted_text: Option<String>,
    /// Present only when `status == Error`.
    pub error_message: Option<String>,
}

impl WorkItem {
    /// A freshly submitted item, waiting for admission.
    pub fn new(id: ItemId, source: ImageSource, preview: PreviewHandle) -> Self {
        Self {
            id,
            source,
            preview,
            status: ItemStatus::Pending,
            extracted_text: None,
            error_message: None,
        }
    }

    pub fn name(&self) -> String {
        self.source.name()
    }
}
