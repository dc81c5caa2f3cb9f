//! LLM gateway.
//!
//! A uniform chat interface over several model providers. Each provider
//! performs exactly one request per [`LlmProvider::chat`] call; retries are
//! layered on by [`LlmManager`].

mod anthropic;
mod manager;
mod openai;
mod pricing;
mod retry;

pub use anthropic::AnthropicProvider;
pub use manager::LlmManager;
pub use openai::OpenAiProvider;
pub use pricing::{price_for, ModelPrice, MODELS_BY_PRICE};
pub use retry::RetryPolicy;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire protocol family of a configured service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// OpenAI chat completions, also spoken by GLM, DeepSeek, Ollama and others.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages API.
    #[serde(rename = "anthropic")]
    Anthropic,
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Outcome of a successful chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text.
    pub content: String,
    /// Model that produced the response, as reported by the provider.
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`.
    pub tokens_used: u64,
    /// Cost in USD from the provider-reported token split.
    pub cost: f64,
    /// Wall-clock time of the request, measured locally.
    pub latency: Duration,
}

/// A chat-capable model backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider family name for logs and errors.
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Send one chat request. No retries.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse>;

    /// Estimate the token count of `text` for this provider's model.
    fn count_tokens(&self, text: &str) -> u64;

    /// Estimate the cost of a call using `tokens` in total.
    fn estimate_cost(&self, tokens: u64) -> f64;
}

/// Shared token estimate used by providers without a local tokenizer.
pub(crate) fn estimate_tokens(text: &str, cjk_weight: f64, word_weight: f64) -> u64 {
    let (cjk, words) = crate::chunking::HeuristicCounter::census(text);
    (cjk as f64 * cjk_weight + words as f64 * word_weight).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: ProviderKind,
        }
        let w: Wrapper = toml::from_str("kind = \"anthropic\"").unwrap();
        assert_eq!(w.kind, ProviderKind::Anthropic);
        let w: Wrapper = toml::from_str("kind = \"openai\"").unwrap();
        assert_eq!(w.kind, ProviderKind::OpenAi);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("你好 world", 1.5, 1.2), 5);
    }
}
