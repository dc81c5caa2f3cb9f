//! OpenAI-compatible chat provider.
//!
//! Works against any endpoint speaking the chat completions protocol
//! (OpenAI, GLM, DeepSeek, local Ollama) by pointing `base_url` at it.
//! Requests and responses use the async-openai wire types, but are sent
//! through reqwest directly so the HTTP status reaches [`RetryPolicy`].
//!
//! [`RetryPolicy`]: super::RetryPolicy

use super::{estimate_tokens, price_for, ChatMessage, ChatResponse, LlmProvider, Role};
use crate::config::ServiceSettings;
use crate::error::{Result, TolkError};
use async_openai::error::ApiError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Fallback per-1K price for models missing from the price table.
const UNKNOWN_MODEL_PRICE_PER_1K: f64 = 0.002;

/// Error type OpenAI returns with a 429 once the account is out of credit.
const INSUFFICIENT_QUOTA: &str = "insufficient_quota";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiError,
}

/// Chat provider for OpenAI-compatible endpoints.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    /// Create a provider from service settings and a resolved API key.
    pub fn new(settings: &ServiceSettings, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| TolkError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    fn convert_messages(messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|m| {
                let converted: ChatCompletionRequestMessage = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| TolkError::InvalidInput(e.to_string()))?
                        .into(),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| TolkError::InvalidInput(e.to_string()))?
                        .into(),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| TolkError::InvalidInput(e.to_string()))?
                        .into(),
                };
                Ok(converted)
            })
            .collect()
    }

    /// Classify a non-success response.
    ///
    /// The body is usually an OpenAI error object; compatible servers and
    /// proxies may send plain text instead.
    fn status_error(&self, status: u16, body: &str) -> TolkError {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error })
                if status == 429 && error.r#type.as_deref() == Some(INSUFFICIENT_QUOTA) =>
            {
                TolkError::Rejected {
                    provider: self.name().to_string(),
                    message: error.message,
                }
            }
            Ok(ErrorBody { error }) => TolkError::Provider {
                provider: self.name().to_string(),
                status: Some(status),
                message: error.message,
            },
            Err(_) => TolkError::Provider {
                provider: self.name().to_string(),
                status: Some(status),
                message: body.to_string(),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        #[allow(deprecated)]
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::convert_messages(messages)?)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| TolkError::InvalidInput(e.to_string()))?;

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TolkError::Provider {
                provider: self.name().to_string(),
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(status.as_u16(), &body));
        }

        let response: CreateChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TolkError::MalformedResponse(format!("Unreadable chat completion: {}", e)))?;
        let latency = start.elapsed();

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| TolkError::MalformedResponse("Empty response from LLM".to_string()))?;

        let (input_tokens, output_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens as u64, u.completion_tokens as u64))
            .unwrap_or((0, 0));

        let cost = price_for(&self.model)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or((input_tokens + output_tokens) as f64 / 1000.0 * UNKNOWN_MODEL_PRICE_PER_1K);

        debug!(
            input_tokens,
            output_tokens,
            latency_ms = latency.as_millis() as u64,
            "Chat completion received"
        );

        Ok(ChatResponse {
            content,
            model: response.model,
            input_tokens,
            output_tokens,
            tokens_used: input_tokens + output_tokens,
            cost,
            latency,
        })
    }

    fn count_tokens(&self, text: &str) -> u64 {
        estimate_tokens(text, 2.0, 1.3)
    }

    fn estimate_cost(&self, tokens: u64) -> f64 {
        price_for(&self.model)
            .map(|p| p.estimate(tokens, 0.5))
            .unwrap_or(tokens as f64 / 1000.0 * UNKNOWN_MODEL_PRICE_PER_1K)
    }
}
