//! Configuration for the batch OCR pipeline.
//!
//! Every knob lives in one [`PipelineConfig`] struct, built via its
//! [`PipelineConfigBuilder`]. Keeping the config in one place makes it
//! trivial to share across tasks, serialise for logging, and diff two runs
//! to understand why their outcomes differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::BatchOcrError;
use crate::progress::Observer;
use std::fmt;

/// Environment variable holding the Workers AI account identifier.
pub const ENV_ACCOUNT_ID: &str = "CF_ACCOUNT_ID";
/// Environment variable holding the Workers AI API token.
pub const ENV_API_TOKEN: &str = "CF_API_TOKEN";

/// Default vision model used for extraction.
pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.2-11b-vision-instruct";

/// Configuration for a [`crate::pipeline::Pipeline`].
///
/// # Example
/// ```rust
/// use batchocr::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(5)
///     .max_batch_size(50)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Concurrency ceiling: maximum simultaneous extraction calls. Default: 3.
    ///
    /// The remote call is network-bound, so a few overlapping requests cut
    /// wall-clock time without hammering the API. Raise it if your account's
    /// rate limits allow; lower it if you see 429 responses.
    pub concurrency: usize,

    /// Maximum number of items the store may hold. Default: 100.
    ///
    /// A submission that would exceed this is rejected wholesale with
    /// [`BatchOcrError::CapacityExceeded`] — never partially admitted.
    pub max_batch_size: usize,

    /// Total attempts per item, including the first. Default: 3.
    ///
    /// Every remote failure is retried identically — transport errors and
    /// non-2xx responses alike, matching the service's observed behaviour of
    /// transient 429/5xx dominating real failures.
    pub max_attempts: u32,

    /// Linear backoff step in milliseconds. Default: 1000.
    ///
    /// The wait before retry n is `retry_backoff_ms * n`: 1 s before the 2nd
    /// attempt, 2 s before the 3rd. No jitter.
    pub retry_backoff_ms: u64,

    /// Maximum tokens the model may generate per image. Default: 1024.
    ///
    /// Plenty for a page of raw text; setting it higher only raises the cost
    /// ceiling for pathological inputs.
    pub max_tokens: u32,

    /// Maximum image dimension (width or height) after resizing. Default: 1920.
    ///
    /// The encoder downscales anything larger, preserving aspect ratio, so
    /// the base64 payload stays well within request-size limits. 1920 px
    /// keeps typical document photos readable to the model.
    pub max_dimension: u32,

    /// JPEG quality for the encoded payload (1–100). Default: 60.
    ///
    /// OCR accuracy degrades little down to ~50 while the payload shrinks by
    /// several multiples compared to lossless encoding.
    pub jpeg_quality: u8,

    /// Workers AI model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// API base URL. Default: `https://api.cloudflare.com`.
    /// Override to point at a proxy or a test server.
    pub api_base: String,

    /// Custom OCR instruction. If None, uses
    /// [`crate::prompts::DEFAULT_OCR_PROMPT`].
    pub prompt: Option<String>,

    /// Workers AI account id. If None, read from `CF_ACCOUNT_ID`.
    pub account_id: Option<String>,

    /// Workers AI API token. If None, read from `CF_API_TOKEN`.
    pub api_token: Option<String>,

    /// Progress observer. If None, events are dropped.
    pub observer: Option<Observer>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_batch_size: 100,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            max_tokens: 1024,
            max_dimension: 1920,
            jpeg_quality: 60,
            model: DEFAULT_MODEL.to_string(),
            api_base: "https://api.cloudflare.com".to_string(),
            prompt: None,
            account_id: None,
            api_token: None,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_tokens", &self.max_tokens)
            .field("max_dimension", &self.max_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id.as_ref().map(|_| "<set>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<set>"))
            .field("observer", &self.observer.as_ref().map(|_| "<dyn BatchObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the account id and API token, falling back to the
    /// environment.
    ///
    /// Missing credentials are a startup-time fatal for the extractor —
    /// never a per-item error — so a misconfigured deployment fails loudly
    /// before any image is queued.
    pub fn resolved_credentials(&self) -> Result<(String, String), BatchOcrError> {
        let account = self
            .account_id
            .clone()
            .or_else(|| std::env::var(ENV_ACCOUNT_ID).ok())
            .filter(|s| !s.is_empty());
        let token = self
            .api_token
            .clone()
            .or_else(|| std::env::var(ENV_API_TOKEN).ok())
            .filter(|s| !s.is_empty());

        match (account, token) {
            (Some(a), Some(t)) => Ok((a, t)),
            _ => Err(BatchOcrError::MissingCredentials {
                hint: format!("Set {ENV_ACCOUNT_ID} and {ENV_API_TOKEN}, or pass them via the config builder."),
            }),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(16);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn account_id(mut self, id: impl Into<String>) -> Self {
        self.config.account_id = Some(id.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(token.into());
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, BatchOcrError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BatchOcrError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.max_attempts == 0 {
            return Err(BatchOcrError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if c.model.is_empty() {
            return Err(BatchOcrError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.concurrency, 3);
        assert_eq!(c.max_batch_size, 100);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_backoff_ms, 1000);
        assert_eq!(c.max_tokens, 1024);
        assert_eq!(c.max_dimension, 1920);
        assert_eq!(c.model, DEFAULT_MODEL);
    }

    #[test]
    fn builder_clamps_degenerate_values() {
        let c = PipelineConfig::builder()
            .concurrency(0)
            .max_attempts(0)
            .jpeg_quality(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_attempts, 1);
        assert_eq!(c.jpeg_quality, 1);
    }

    #[test]
    fn explicit_credentials_win_over_env() {
        let c = PipelineConfig::builder()
            .account_id("acct-123")
            .api_token("tok-456")
            .build()
            .unwrap();
        let (a, t) = c.resolved_credentials().unwrap();
        assert_eq!(a, "acct-123");
        assert_eq!(t, "tok-456");
    }

    #[test]
    fn partial_credentials_are_rejected() {
        let c = PipelineConfig::builder()
            .account_id("acct-only")
            .api_token("")
            .build()
            .unwrap();
        // Empty token does not count as configured (env may still supply it,
        // but an empty override never does).
        if std::env::var(ENV_API_TOKEN).is_err() {
            assert!(c.resolved_credentials().is_err());
        }
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = PipelineConfig::builder()
            .api_token("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
    }
}
