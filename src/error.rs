//! Error types for the batchocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchOcrError`] — **Fatal**: the operation cannot proceed at all
//!   (submission over capacity, missing credentials, invalid config).
//!   Returned as `Err(BatchOcrError)` from the top-level API.
//!
//! * [`ItemError`] — **Non-fatal**: a single work item failed (unreadable
//!   image, remote call still failing after retries) but every other item is
//!   fine. Recorded as the item's terminal `Error` status so callers can
//!   inspect partial success rather than losing the whole batch to one bad
//!   image.
//!
//! There is deliberately no global error state: a failed item is visible only
//! through its own `error_message` and the aggregate `failed` count.

use thiserror::Error;

/// All fatal errors returned by the batchocr library.
///
/// Per-item failures use [`ItemError`] and are stored on the
/// [`crate::item::WorkItem`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BatchOcrError {
    /// Submission would push the store past its maximum batch size.
    ///
    /// The whole submission is rejected; the store is left unchanged.
    /// No partial subset is ever admitted.
    #[error(
        "Batch limit exceeded: {current} queued + {submitted} new > {max} maximum.\n\
         Remove some items or raise --max-batch-size."
    )]
    CapacityExceeded {
        submitted: usize,
        current: usize,
        max: usize,
    },

    /// Workers AI credentials are missing.
    ///
    /// Detected once when the extractor is constructed, never per item.
    #[error("Missing Workers AI credentials.\n{hint}")]
    MissingCredentials { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not construct the HTTP client.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error scoped to a single work item.
///
/// Becomes the item's `error_message` when it reaches the terminal `Error`
/// status. The pipeline keeps processing all other items.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The source image could not be read at all.
    #[error("'{name}': failed to read image: {detail}")]
    ReadFailed { name: String, detail: String },

    /// The image was read but could not be decoded or re-encoded.
    /// Happens before any remote call; never retried.
    #[error("'{name}': failed to encode image: {detail}")]
    EncodeFailed { name: String, detail: String },

    /// The remote extraction call failed on every attempt.
    /// Carries the last attempt's error.
    #[error("Extraction failed after {attempts} attempts: {detail}")]
    ExtractFailed { attempts: u32, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_display_names_all_counts() {
        let e = BatchOcrError::CapacityExceeded {
            submitted: 5,
            current: 98,
            max: 100,
        };
        let msg = e.to_string();
        assert!(msg.contains("98"), "got: {msg}");
        assert!(msg.contains("5"), "got: {msg}");
        assert!(msg.contains("100"), "got: {msg}");
    }

    #[test]
    fn missing_credentials_display_carries_hint() {
        let e = BatchOcrError::MissingCredentials {
            hint: "Set CF_ACCOUNT_ID and CF_API_TOKEN.".into(),
        };
        assert!(e.to_string().contains("CF_ACCOUNT_ID"));
    }

    #[test]
    fn extract_failed_display() {
        let e = ItemError::ExtractFailed {
            attempts: 3,
            detail: "Workers AI error 429: rate limited".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn encode_failed_display_names_item() {
        let e = ItemError::EncodeFailed {
            name: "scan_07.png".into(),
            detail: "unsupported image format".into(),
        };
        assert!(e.to_string().contains("scan_07.png"));
    }
}
