use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::llm_config::LlmConfig;
use super::provider::GenerationProvider;
use crate::ai::history::Turn;
use crate::error::{ConfigError, GenerationError};
use crate::utils::http::{request_with_backoff, BackoffTimer, TokioTimer};

// ── Wire format ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    pub fn new(history: &[Turn], system_instruction: &str, config: &LlmConfig) -> Self {
        Self {
            system_instruction: Content::text(system_instruction),
            contents: history
                .iter()
                .map(|turn| Content {
                    role: Some(turn.role.as_str().to_string()),
                    parts: vec![Part {
                        text: turn.text.clone(),
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text of the first candidate whose parts are not all empty.
    fn first_text(self) -> Option<String> {
        self.candidates.into_iter().find_map(|candidate| {
            let text: String = candidate
                .content?
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect();
            (!text.is_empty()).then_some(text)
        })
    }
}

// ── Client ─────────────────────────────────────────────

pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: LlmConfig,
    timer: Arc<dyn BackoffTimer>,
}

impl GeminiClient {
    /// Resolve the credential and build the HTTP client. Fails before any
    /// network traffic if no usable key is configured.
    pub fn new(config: LlmConfig) -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Self::with_client(config, client)
    }

    /// Use a caller-built HTTP client (tests pass one without a proxy).
    pub fn with_client(config: LlmConfig, client: Client) -> Result<Self, ConfigError> {
        let api_key = config.resolve_api_key().ok_or(ConfigError::MissingApiKey)?;
        Ok(Self {
            client,
            api_key,
            config,
            timer: Arc::new(TokioTimer),
        })
    }

    pub fn with_timer(mut self, timer: Arc<dyn BackoffTimer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    pub async fn generate(
        &self,
        history: &[Turn],
        system_instruction: &str,
    ) -> Result<String, GenerationError> {
        let url = self.endpoint();
        let body = GenerateContentRequest::new(history, system_instruction, &self.config);
        tracing::debug!(
            "[Gemini] Sending {} turns to {}",
            body.contents.len(),
            self.config.model
        );

        let response = request_with_backoff(
            || {
                self.client
                    .post(&url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&body)
                    .send()
            },
            self.config.max_attempts,
            self.timer.as_ref(),
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("[Gemini] API error {}: {}", status, error_text);
            return Err(GenerationError::TerminalServer {
                status: status.as_u16(),
            });
        }

        let parsed: GenerateContentResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("[Gemini] Failed to parse response: {}", e);
                return Err(GenerationError::EmptyResponse);
            }
        };

        match parsed.first_text() {
            Some(text) => {
                tracing::info!("[Gemini] Received {} chars", text.chars().count());
                Ok(text)
            }
            None => {
                tracing::warn!("[Gemini] Response had no text candidate");
                Err(GenerationError::EmptyResponse)
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn send(
        &self,
        history: &[Turn],
        system_instruction: &str,
    ) -> Result<String, GenerationError> {
        self.generate(history, system_instruction).await
    }

    fn id(&self) -> &str {
        "gemini"
    }
}
