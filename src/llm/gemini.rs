//! Gemini-like backend. Uses the `generateContent` endpoint with the JSON
//! response mime type so the model is steered toward the schema contract.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::insight::{GenerationResult, Prompt};

use super::{
    map_status, map_transport_error, parse_generation_payload, GenerationClient,
    GenerationConfig, GenerationError,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: super::http_client(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        config: &GenerationConfig,
    ) -> Result<GenerationResult, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::Unavailable("missing API key".into()));
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenCfg {
            temperature: f32,
            max_output_tokens: u32,
            response_mime_type: &'static str,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenCfg,
        }
        #[derive(Deserialize)]
        struct Resp {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: CandidateContent,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: String,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part {
                    text: &prompt.rendered_text,
                }],
            }],
            generation_config: GenCfg {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
                response_mime_type: "application/json",
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let started = Instant::now();
        let send = self.http.post(&url).json(&req).send();
        let resp = tokio::time::timeout(config.timeout, send)
            .await
            .map_err(|_| GenerationError::Timeout)?
            .map_err(map_transport_error)?;

        if !resp.status().is_success() {
            return Err(map_status(resp.status()));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("envelope parse: {e}")))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| GenerationError::InvalidResponse("no candidates in response".into()))?;

        parse_generation_payload(text, self.provider_name(), &self.model, latency_ms)
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
