//! config.rs — Typed settings and component factories.
//!
//! Recognized options mirror the deployment surface: provider selection,
//! retry/timeout tuning, severity thresholds, and rate-limit windows.
//! Settings load from a TOML file and/or environment variables, environment
//! winning. `.env` loading is the binary's job (dotenvy), not the library's.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::SeverityThresholds;
use crate::llm::{
    DynGenerationClient, GeminiClient, GenerationConfig, MockClient, OpenAiClient, RetryPolicy,
    RetryingGateway,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // LLM configuration
    /// "gemini" | "openai" | "mock"
    pub llm_provider: String,
    /// Ordered fallback chain tried after the primary, any length.
    pub llm_fallback_providers: Vec<String>,
    pub llm_max_retries: u32,
    pub llm_timeout_seconds: u64,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,

    // Gemini
    pub gemini_api_key: String,
    pub gemini_model: String,

    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,

    // Feature extraction / classification
    pub severity_threshold_critical: f64,
    pub severity_threshold_high: f64,
    pub severity_threshold_medium: f64,

    // Rate limiting
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,

    // Async workers
    pub worker_count: usize,
    pub task_queue_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_provider: "gemini".to_string(),
            llm_fallback_providers: Vec::new(),
            llm_max_retries: 3,
            llm_timeout_seconds: 30,
            llm_max_tokens: 1000,
            llm_temperature: 0.7,
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-flash-lite".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4-turbo-preview".to_string(),
            severity_threshold_critical: 50.0,
            severity_threshold_high: 25.0,
            severity_threshold_medium: 10.0,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 3600,
            worker_count: 4,
            task_queue_depth: 256,
        }
    }
}

impl Settings {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read settings file {}", path.as_ref().display()))?;
        let mut cfg: Settings = toml::from_str(&data).context("parse settings TOML")?;
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Build purely from defaults + environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Settings::default();
        cfg.apply_env();
        cfg.sanitize();
        cfg
    }

    fn apply_env(&mut self) {
        env_override("LLM_PROVIDER", &mut self.llm_provider);
        if let Ok(raw) = std::env::var("LLM_FALLBACK_PROVIDERS") {
            self.llm_fallback_providers = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        env_parse("LLM_MAX_RETRIES", &mut self.llm_max_retries);
        env_parse("LLM_TIMEOUT_SECONDS", &mut self.llm_timeout_seconds);
        env_parse("LLM_MAX_TOKENS", &mut self.llm_max_tokens);
        env_parse("LLM_TEMPERATURE", &mut self.llm_temperature);
        env_override("GEMINI_API_KEY", &mut self.gemini_api_key);
        env_override("GEMINI_MODEL", &mut self.gemini_model);
        env_override("OPENAI_API_KEY", &mut self.openai_api_key);
        env_override("OPENAI_MODEL", &mut self.openai_model);
        env_parse(
            "SEVERITY_THRESHOLD_CRITICAL",
            &mut self.severity_threshold_critical,
        );
        env_parse("SEVERITY_THRESHOLD_HIGH", &mut self.severity_threshold_high);
        env_parse(
            "SEVERITY_THRESHOLD_MEDIUM",
            &mut self.severity_threshold_medium,
        );
        env_parse("RATE_LIMIT_REQUESTS", &mut self.rate_limit_requests);
        env_parse(
            "RATE_LIMIT_WINDOW_SECONDS",
            &mut self.rate_limit_window_seconds,
        );
        env_parse("WORKER_COUNT", &mut self.worker_count);
        env_parse("TASK_QUEUE_DEPTH", &mut self.task_queue_depth);
    }

    /// Keep the values in a usable shape rather than failing startup.
    fn sanitize(&mut self) {
        self.llm_provider = self.llm_provider.trim().to_lowercase();
        for p in &mut self.llm_fallback_providers {
            *p = p.trim().to_lowercase();
        }
        if self.llm_max_retries == 0 {
            self.llm_max_retries = 1;
        }
        if self.worker_count == 0 {
            self.worker_count = 1;
        }
        // Cutoffs must descend: critical >= high >= medium.
        let mut cuts = [
            self.severity_threshold_critical,
            self.severity_threshold_high,
            self.severity_threshold_medium,
        ];
        cuts.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        self.severity_threshold_critical = cuts[0];
        self.severity_threshold_high = cuts[1];
        self.severity_threshold_medium = cuts[2];
    }

    pub fn thresholds(&self) -> SeverityThresholds {
        SeverityThresholds {
            critical_pct: self.severity_threshold_critical,
            high_pct: self.severity_threshold_high,
            medium_pct: self.severity_threshold_medium,
        }
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_tokens: self.llm_max_tokens,
            temperature: self.llm_temperature,
            timeout: Duration::from_secs(self.llm_timeout_seconds),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.llm_max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }
}

fn env_override(key: &str, target: &mut String) {
    if let Ok(v) = std::env::var(key) {
        if !v.trim().is_empty() {
            *target = v;
        }
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Some(v) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *target = v;
    }
}

/// Build one backend client by provider name. The provider set is closed
/// and chosen at startup; an unknown name is a configuration error.
pub fn build_generation_client(settings: &Settings, provider: &str) -> Result<DynGenerationClient> {
    match provider {
        "mock" => Ok(Arc::new(MockClient::new())),
        "gemini" => Ok(Arc::new(GeminiClient::new(
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
        ))),
        "openai" => Ok(Arc::new(OpenAiClient::new(
            settings.openai_api_key.clone(),
            settings.openai_model.clone(),
        ))),
        other => bail!("unknown LLM provider: {other}"),
    }
}

/// Assemble the gateway from the configured primary + fallback chain.
pub fn build_gateway(settings: &Settings) -> Result<RetryingGateway> {
    let primary = build_generation_client(settings, &settings.llm_provider)?;
    let fallbacks = settings
        .llm_fallback_providers
        .iter()
        .map(|p| build_generation_client(settings, p))
        .collect::<Result<Vec<_>>>()?;
    Ok(RetryingGateway::new(
        primary,
        fallbacks,
        settings.retry_policy(),
        settings.generation_config(),
    ))
}
