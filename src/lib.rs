//! # batchocr
//!
//! Batch OCR of images using Workers AI vision models.
//!
//! ## Why this crate?
//!
//! Classical OCR engines stumble on photos — skewed receipts, handwriting,
//! low-contrast scans. A vision language model reads them the way a human
//! would. This crate wraps the remote inference call in a bounded-concurrency
//! pipeline so a folder of a hundred images can be processed a few at a time,
//! with per-item retry, incremental results, and no item's failure ever
//! taking down the batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images
//!  │
//!  ├─ 1. Submit    queue items (Pending), capacity-checked wholesale
//!  ├─ 2. Schedule  admit first Pending while Processing < C (default 3)
//!  ├─ 3. Encode    resize to ≤1920px, JPEG, base64 (spawn_blocking)
//!  ├─ 4. Extract   POST to Workers AI; 3 attempts, linear 1s/2s backoff
//!  └─ 5. Settle    write back Completed/Error, re-run admission
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchocr::{run_batch, ImageSource, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials read from CF_ACCOUNT_ID / CF_API_TOKEN
//!     let config = PipelineConfig::default();
//!     let sources = vec![
//!         ImageSource::Path("receipt.jpg".into()),
//!         ImageSource::Path("invoice.png".into()),
//!     ];
//!     let output = run_batch(sources, &config).await?;
//!     for item in &output.items {
//!         match &item.extracted_text {
//!             Some(text) => println!("{}: {text}", item.name),
//!             None => eprintln!("{}: {}", item.name, item.error_message.as_deref().unwrap_or("?")),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For incremental results, build a [`Pipeline`] directly and register a
//! [`BatchObserver`]; items fire completion events as they finish, in
//! completion order.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `batchocr` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod item;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stats;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, run_batch_with, BatchOutput};
pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_MODEL};
pub use error::{BatchOcrError, ItemError};
pub use item::{ImageSource, ItemId, ItemStatus, PreviewHandle, WorkItem};
pub use pipeline::encode::EncodedImage;
pub use pipeline::extract::{ExtractError, Extractor, WorkersAiExtractor};
pub use pipeline::Pipeline;
pub use progress::{BatchObserver, NoopObserver, Observer};
pub use stats::BatchStats;
pub use store::{ItemSnapshot, Transition};
