//! LLM Adapter (C5) — messages + model + token budget in, text + usage
//! out. No conversation state is kept between calls: every request is
//! independent, matching how the worker pool calls it (one call per
//! file, no follow-up turns).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LimitsConfig, LlmConfig};
use crate::error::OrchestratorError;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Stateless completion endpoint. Implementations classify failures into
/// [`OrchestratorError`]'s taxonomy themselves so callers never have to
/// inspect a provider-specific error.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OrchestratorError>;
}

/// Anthropic-style HTTP client. Classifies 429 as rate-limited, 5xx as
/// transient, 4xx as invalid input, anything else (connection refused,
/// decode failure) as transient too since a retry might succeed.
pub struct AnthropicLlmAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    hard_timeout: Duration,
}

impl AnthropicLlmAdapter {
    pub fn from_config(config: &LlmConfig, limits: &LimitsConfig) -> Result<Self, OrchestratorError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| OrchestratorError::Input(format!("environment variable {} not set", config.api_key_env)))?;
        let request_timeout = Duration::from_millis(limits.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OrchestratorError::Fatal(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            request_timeout,
            hard_timeout: Duration::from_millis(limits.hard_timeout_ms),
        })
    }
}

#[async_trait]
impl LlmAdapter for AnthropicLlmAdapter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OrchestratorError> {
        debug!(model = %request.model, "AnthropicLlmAdapter::complete");
        tokio::time::timeout(self.hard_timeout, self.complete_inner(request))
            .await
            .map_err(|_| OrchestratorError::Transient("request exceeded hard timeout".to_string()))?
    }
}

impl AnthropicLlmAdapter {
    async fn complete_inner(&self, request: CompletionRequest) -> Result<CompletionResponse, OrchestratorError> {
        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": request.messages,
        });

        let response = tokio::time::timeout(
            self.request_timeout,
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| OrchestratorError::Transient("request timed out".to_string()))?
        .map_err(|e| OrchestratorError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("AnthropicLlmAdapter::complete: rate limited");
            return Err(OrchestratorError::RateLimited {
                message: "provider rate limit".to_string(),
                retry_after: Duration::from_secs(30),
            });
        }
        if status.is_server_error() {
            return Err(OrchestratorError::Transient(format!("provider returned {status}")));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Input(format!("provider rejected request: {text}")));
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicBlock>,
            usage: AnthropicUsage,
        }
        #[derive(Deserialize)]
        struct AnthropicBlock {
            text: String,
        }
        #[derive(Deserialize)]
        struct AnthropicUsage {
            input_tokens: u32,
            output_tokens: u32,
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Transient(format!("failed to decode response: {e}")))?;

        let text = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");

        Ok(CompletionResponse {
            text,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

/// Deterministic stand-in used by the test suite and local runs: no
/// network, no randomness, a fixed-shape summary derived from the
/// request content so the same input always yields the same output.
pub struct MockLlmAdapter;

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OrchestratorError> {
        let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let word_count = last.split_whitespace().count();
        let text = format!("Summary: this content contains {word_count} words.");
        Ok(CompletionResponse {
            text,
            usage: TokenUsage {
                input_tokens: last.split_whitespace().count() as u32,
                output_tokens: 8,
            },
        })
    }
}
