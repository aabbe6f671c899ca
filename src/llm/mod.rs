//! Generation backends: one async contract, three variants (Gemini-like,
//! OpenAI-like, deterministic mock), plus the retry/fallback gateway.
//!
//! Backends return raw text from their wire formats; structural validation
//! into `GenerationResult` happens here so every variant fails the same way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::insight::{clamp01, GenerationResult, Prompt, SeverityLevel};

pub mod gateway;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use gateway::{GenerationExhausted, ProviderFailure, RetryPolicy, RetryingGateway};
pub use gemini::GeminiClient;
pub use mock::MockClient;
pub use openai::OpenAiClient;

/// Tuning passed to every generation call.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-attempt timeout; exceeding it is a retryable `Timeout`.
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Failure kinds a single generation attempt can produce. The gateway's
/// policy table decides which of these retry locally and which fall through
/// to the next client.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation attempt timed out")]
    Timeout,
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Timeout => "timeout",
            GenerationError::RateLimited => "rate_limited",
            GenerationError::InvalidResponse(_) => "invalid_response",
            GenerationError::Unavailable(_) => "unavailable",
        }
    }
}

/// Polymorphic capability implemented by every backend variant.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Send the rendered prompt and parse the structured response.
    async fn generate(
        &self,
        prompt: &Prompt,
        config: &GenerationConfig,
    ) -> Result<GenerationResult, GenerationError>;

    /// Provider name for diagnostics, metrics labels, and `provider_used`.
    fn provider_name(&self) -> &'static str;

    /// Concrete model identifier reported as `model_version`.
    fn model_name(&self) -> &str;
}

/// Trait object used by the gateway, orchestrator, and tests.
pub type DynGenerationClient = Arc<dyn GenerationClient>;

/// Wire shape every backend must produce (directly or after unwrapping its
/// own envelope).
#[derive(Debug, Deserialize)]
struct LlmPayload {
    summary: String,
    #[serde(default)]
    severity: Option<SeverityLevel>,
    confidence: f32,
    recommended_actions: Vec<String>,
    key_findings: Vec<String>,
}

/// Parse and structurally validate a backend's raw JSON text. Any missing
/// field, empty summary, or out-of-range confidence is `InvalidResponse`;
/// a malformed result never propagates.
pub(crate) fn parse_generation_payload(
    raw: &str,
    provider: &'static str,
    model: &str,
    latency_ms: u64,
) -> Result<GenerationResult, GenerationError> {
    let payload: LlmPayload = serde_json::from_str(raw.trim())
        .map_err(|e| GenerationError::InvalidResponse(format!("malformed JSON: {e}")))?;

    if payload.summary.trim().is_empty() {
        return Err(GenerationError::InvalidResponse("empty summary".into()));
    }
    if !(0.0..=1.0).contains(&payload.confidence) {
        return Err(GenerationError::InvalidResponse(format!(
            "confidence {} outside [0, 1]",
            payload.confidence
        )));
    }

    Ok(GenerationResult {
        summary: payload.summary,
        severity: payload.severity,
        confidence: clamp01(payload.confidence),
        recommended_actions: payload.recommended_actions,
        key_findings: payload.key_findings,
        provider_used: provider.to_string(),
        model_version: model.to_string(),
        fallback_used: false,
        latency_ms,
    })
}

/// Map transport-level reqwest failures onto the error taxonomy.
pub(crate) fn map_transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Unavailable(err.to_string())
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub(crate) fn map_status(status: reqwest::StatusCode) -> GenerationError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited
    } else if status == reqwest::StatusCode::REQUEST_TIMEOUT {
        GenerationError::Timeout
    } else {
        GenerationError::Unavailable(format!("http status {status}"))
    }
}

/// Shared reqwest client setup for the real backends.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("pythia-insights/0.1 (+github.com/lumlich/pythia-insights)")
        .connect_timeout(Duration::from_secs(4))
        .build()
        .expect("reqwest client")
}
