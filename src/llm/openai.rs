//! OpenAI-like backend. Chat completions with `response_format: json_object`
//! and the schema contract restated in the system message.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::insight::{GenerationResult, Prompt};
use crate::prompt::response_schema;

use super::{
    map_status, map_transport_error, parse_generation_payload, GenerationClient,
    GenerationConfig, GenerationError,
};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: super::http_client(),
            api_key: api_key.into(),
            model: model.into(),
            url: OPENAI_CHAT_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        config: &GenerationConfig,
    ) -> Result<GenerationResult, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::Unavailable("missing API key".into()));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct RespFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: RespFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let system = format!(
            "You are a data insights analyst. You must respond with valid JSON matching this schema:\n{}\n\nReturn ONLY valid JSON, no markdown formatting.",
            response_schema()
        );
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &system,
                },
                Msg {
                    role: "user",
                    content: &prompt.rendered_text,
                },
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format: RespFormat { kind: "json_object" },
        };

        let started = Instant::now();
        let send = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send();
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

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".into()))?;

        parse_generation_payload(content, self.provider_name(), &self.model, latency_ms)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
