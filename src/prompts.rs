//! The OCR instruction sent with every extraction request.
//!
//! Centralising the prompt here keeps it a single source of truth and lets
//! unit tests inspect it without a live API call. Callers can override it via
//! [`crate::config::PipelineConfigBuilder::prompt`]; the constant is used
//! only when no override is provided.

/// Default instruction for the vision model.
///
/// Asks for raw text only — no markdown, no commentary — so the output can be
/// searched, copied, and diffed without post-processing.
pub const DEFAULT_OCR_PROMPT: &str = "Perform OCR on this image. Return ONLY the raw text found \
in the document. Do not add markdown formatting, do not add introductory phrases. If there is \
no text, return 'No text detected'.";
