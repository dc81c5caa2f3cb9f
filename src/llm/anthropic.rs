//! Anthropic messages API provider.

use super::{estimate_tokens, price_for, ChatMessage, ChatResponse, LlmProvider, Role};
use crate::config::ServiceSettings;
use crate::error::{Result, TolkError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Share of estimated tokens assumed to be input.
const INPUT_RATIO: f64 = 0.75;

const UNKNOWN_MODEL_PRICE_PER_1K: f64 = 0.003;

/// Chat provider for the Anthropic messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicProvider {
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

    /// Fold messages into the messages API shape.
    ///
    /// System messages become the top-level `system` field, joined by blank
    /// lines. User messages are joined into a single user turn. Assistant
    /// messages are dropped.
    fn fold_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<WireMessage>) {
        let join = |role: Role| {
            messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let system = join(Role::System);
        let user = join(Role::User);

        (
            (!system.is_empty()).then_some(system),
            vec![WireMessage {
                role: "user",
                content: user,
            }],
        )
    }

    fn provider_error(&self, status: Option<u16>, message: String) -> TolkError {
        TolkError::Provider {
            provider: self.name().to_string(),
            status,
            message,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let (system, wire_messages) = Self::fold_messages(messages);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: wire_messages,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.provider_error(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.provider_error(Some(status.as_u16()), body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| TolkError::MalformedResponse(format!("Unreadable messages response: {}", e)))?;
        let latency = start.elapsed();

        let content = parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| TolkError::MalformedResponse("Empty response from LLM".to_string()))?;

        let input_tokens = parsed.usage.input_tokens;
        let output_tokens = parsed.usage.output_tokens;
        let cost = price_for(&self.model)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or((input_tokens + output_tokens) as f64 / 1000.0 * UNKNOWN_MODEL_PRICE_PER_1K);

        debug!(
            input_tokens,
            output_tokens,
            latency_ms = latency.as_millis() as u64,
            "Message received"
        );

        Ok(ChatResponse {
            content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            input_tokens,
            output_tokens,
            tokens_used: input_tokens + output_tokens,
            cost,
            latency,
        })
    }

    fn count_tokens(&self, text: &str) -> u64 {
        estimate_tokens(text, 1.5, 1.2)
    }

    fn estimate_cost(&self, tokens: u64) -> f64 {
        price_for(&self.model)
            .map(|p| p.estimate(tokens, INPUT_RATIO))
            .unwrap_or(tokens as f64 / 1000.0 * UNKNOWN_MODEL_PRICE_PER_1K)
    }
}
