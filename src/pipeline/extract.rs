//! The extractor: one remote text-extraction call per item, with retries.
//!
//! [`Extractor`] is the trait seam between the scheduler and the network, so
//! tests drive the pipeline with scripted extractors and never touch HTTP.
//! [`WorkersAiExtractor`] is the production implementation: one POST per
//! attempt to the Workers AI inference endpoint.
//!
//! ## Retry Strategy
//!
//! Every failure — transport error or non-2xx response — is retried
//! identically, up to [`crate::config::PipelineConfig::max_attempts`] total
//! attempts with linear backoff (`retry_backoff_ms * n` before retry n, no
//! jitter). The service does not distinguish rate limiting from other
//! failures in practice, so neither do we; the last error surfaces to the
//! scheduler once the ceiling is reached.

use crate::config::PipelineConfig;
use crate::error::{BatchOcrError, ItemError};
use crate::item::ItemId;
use crate::pipeline::encode::EncodedImage;
use crate::progress::Observer;
use crate::prompts::DEFAULT_OCR_PROMPT;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Failure of a single extraction attempt.
///
/// All variants are retryable; the distinction exists for logging and for
/// the final error message, not for retry policy.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The API answered with a non-2xx status; the body is read as text and
    /// carried verbatim so rate-limit details reach the user.
    #[error("Workers AI error {status}: {body}")]
    Api { status: u16, body: String },

    /// 2xx response whose body did not contain `result.response`.
    #[error("Unexpected Workers AI response: {0}")]
    MalformedResponse(String),
}

/// Performs one remote text-extraction call for a single payload.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, image: &EncodedImage) -> Result<String, ExtractError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    prompt: &'a str,
    image: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<OcrResult>,
}

#[derive(Deserialize)]
struct OcrResult {
    #[serde(default)]
    response: Option<String>,
}

/// Accept a 2xx body if `result.response` exists, regardless of the
/// `success` flag — the service has been observed returning usable results
/// with `success` absent or false.
pub(crate) fn parse_success_body(body: &str) -> Result<String, ExtractError> {
    let parsed: OcrResponse = serde_json::from_str(body)
        .map_err(|e| ExtractError::MalformedResponse(e.to_string()))?;

    match parsed.result.and_then(|r| r.response) {
        Some(text) => Ok(text),
        None => Err(ExtractError::MalformedResponse(format!(
            "missing result.response (success={:?})",
            parsed.success
        ))),
    }
}

// ── Production extractor ─────────────────────────────────────────────────

/// Extractor backed by the Cloudflare Workers AI REST endpoint.
///
/// Construction fails fast on missing credentials: a misconfigured
/// deployment is a startup error, not a hundred per-item errors.
pub struct WorkersAiExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    prompt: String,
    max_tokens: u32,
}

impl WorkersAiExtractor {
    pub fn new(config: &PipelineConfig) -> Result<Self, BatchOcrError> {
        let (account_id, api_token) = config.resolved_credentials()?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BatchOcrError::HttpClient(e.to_string()))?;

        let endpoint = format!(
            "{}/client/v4/accounts/{}/ai/run/{}",
            config.api_base.trim_end_matches('/'),
            account_id,
            config.model
        );
        debug!("Workers AI endpoint: {endpoint}");

        Ok(Self {
            client,
            endpoint,
            api_token,
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_OCR_PROMPT.to_string()),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Extractor for WorkersAiExtractor {
    async fn extract(&self, image: &EncodedImage) -> Result<String, ExtractError> {
        let body = OcrRequest {
            prompt: &self.prompt,
            image: &image.base64,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ExtractError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_success_body(&text)
    }
}

// ── Retry wrapper ────────────────────────────────────────────────────────

/// Run one item's extraction with the full retry protocol.
///
/// Up to `max_attempts` total attempts; before retry n the task sleeps
/// `retry_backoff_ms * n` milliseconds (1 s, then 2 s at the defaults).
/// Returns the extracted text, or the last attempt's error wrapped as a
/// terminal [`ItemError`].
pub async fn extract_with_retry(
    extractor: &Arc<dyn Extractor>,
    payload: &EncodedImage,
    id: ItemId,
    max_attempts: u32,
    retry_backoff_ms: u64,
    observer: Option<&Observer>,
) -> Result<String, ItemError> {
    let mut last_err: Option<ExtractError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let backoff = retry_backoff_ms * u64::from(attempt - 1);
            warn!("{id}: retry {}/{} after {}ms", attempt, max_attempts, backoff);
            if let Some(obs) = observer {
                obs.on_item_retry(id, attempt, max_attempts, backoff);
            }
            sleep(Duration::from_millis(backoff)).await;
        }

        match extractor.extract(payload).await {
            Ok(text) => {
                debug!("{id}: extracted {} bytes on attempt {attempt}", text.len());
                return Ok(text);
            }
            Err(e) => {
                warn!("{id}: attempt {attempt} failed — {e}");
                last_err = Some(e);
            }
        }
    }

    let detail = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown error".to_string());
    Err(ItemError::ExtractFailed {
        attempts: max_attempts,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_success_true() {
        let body = r#"{"success": true, "result": {"response": "INVOICE #42"}}"#;
        assert_eq!(parse_success_body(body).unwrap(), "INVOICE #42");
    }

    #[test]
    fn parse_is_permissive_about_success_flag() {
        // success=false but a usable result — still accepted.
        let body = r#"{"success": false, "result": {"response": "partial text"}}"#;
        assert_eq!(parse_success_body(body).unwrap(), "partial text");

        // success missing entirely.
        let body = r#"{"result": {"response": "no flag"}}"#;
        assert_eq!(parse_success_body(body).unwrap(), "no flag");
    }

    #[test]
    fn parse_rejects_missing_result() {
        let body = r#"{"success": true}"#;
        let err = parse_success_body(body).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedResponse(_)));
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse_success_body("<html>502 Bad Gateway</html>").is_err());
    }

    #[test]
    fn request_body_shape() {
        let req = OcrRequest {
            prompt: "read this",
            image: "aGVsbG8=",
            max_tokens: 1024,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["prompt"], "read this");
        assert_eq!(json["image"], "aGVsbG8=");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn api_error_display_carries_body() {
        let e = ExtractError::Api {
            status: 429,
            body: "rate limited".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("rate limited"));
    }
}
