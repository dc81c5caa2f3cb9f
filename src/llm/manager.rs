//! Named provider registry with retrying dispatch.

use super::{
    AnthropicProvider, ChatMessage, ChatResponse, LlmProvider, OpenAiProvider, ProviderKind,
    RetryPolicy,
};
use crate::config::LlmSettings;
use crate::error::{Result, TolkError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of chat providers keyed by service name.
pub struct LlmManager {
    services: BTreeMap<String, Arc<dyn LlmProvider>>,
    default: Option<String>,
    retry: RetryPolicy,
}

impl LlmManager {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            services: BTreeMap::new(),
            default: None,
            retry,
        }
    }

    /// Build providers for every configured service that has an API key.
    ///
    /// Services without a key are skipped with a warning. The configured
    /// default service becomes the default if it was built.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let mut manager = Self::new(RetryPolicy::from(&settings.retry));

        for (name, service) in &settings.services {
            let Some(api_key) = service.resolve_api_key() else {
                warn!(
                    "Skipping LLM service '{}': no API key (set {} or api_key in config)",
                    name, service.api_key_env
                );
                continue;
            };

            let provider: Arc<dyn LlmProvider> = match service.kind {
                ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(service, &api_key)?),
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(service, &api_key)?),
            };
            manager.register(name, provider, name == &settings.default_service);
        }

        info!(
            "Registered {} LLM services, default: {}",
            manager.services.len(),
            manager.default.as_deref().unwrap_or("none")
        );
        Ok(manager)
    }

    /// Register a provider under `name`.
    ///
    /// The first registered provider becomes the default unless a later
    /// registration asks to be the default.
    pub fn register(&mut self, name: &str, provider: Arc<dyn LlmProvider>, make_default: bool) {
        if make_default || self.default.is_none() {
            self.default = Some(name.to_string());
        }
        self.services.insert(name.to_string(), provider);
    }

    /// Resolve a service by name, or the default when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> Result<(String, Arc<dyn LlmProvider>)> {
        let resolved = match name {
            Some(n) => n.to_string(),
            None => self
                .default
                .clone()
                .ok_or_else(|| TolkError::UnknownService("no services registered".to_string()))?,
        };

        self.services
            .get(&resolved)
            .cloned()
            .map(|p| (resolved.clone(), p))
            .ok_or(TolkError::UnknownService(resolved))
    }

    /// Names of registered services.
    pub fn services(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn default_service(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Chat through the named service with retries.
    pub async fn chat(&self, messages: &[ChatMessage], service: Option<&str>) -> Result<ChatResponse> {
        let (_, provider) = self.get(service)?;
        self.chat_with(provider.as_ref(), messages).await
    }

    /// Chat through an already resolved provider with retries.
    pub async fn chat_with(
        &self,
        provider: &dyn LlmProvider,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse> {
        self.retry
            .run(provider.name(), move || provider.chat(messages))
            .await
    }

    pub fn count_tokens(&self, text: &str, service: Option<&str>) -> Result<u64> {
        let (_, provider) = self.get(service)?;
        Ok(provider.count_tokens(text))
    }

    pub fn estimate_cost(&self, tokens: u64, service: Option<&str>) -> Result<f64> {
        let (_, provider) = self.get(service)?;
        Ok(provider.estimate_cost(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedProvider {
        model: String,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            &self.model
        }

        async fn chat(&self, _messages: &[ChatMessage]) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: format!("from {}", self.model),
                model: self.model.clone(),
                input_tokens: 3,
                output_tokens: 2,
                tokens_used: 5,
                cost: 0.0,
                latency: Duration::ZERO,
            })
        }

        fn count_tokens(&self, text: &str) -> u64 {
            text.len() as u64
        }

        fn estimate_cost(&self, tokens: u64) -> f64 {
            tokens as f64
        }
    }

    fn fixed(model: &str) -> Arc<dyn LlmProvider> {
        Arc::new(FixedProvider {
            model: model.to_string(),
        })
    }

    #[test]
    fn test_first_registered_is_default() {
        let mut manager = LlmManager::new(RetryPolicy::none());
        manager.register("a", fixed("model-a"), false);
        manager.register("b", fixed("model-b"), false);

        let (name, provider) = manager.get(None).unwrap();
        assert_eq!(name, "a");
        assert_eq!(provider.model(), "model-a");
        assert_eq!(manager.services(), vec!["a", "b"]);
    }

    #[test]
    fn test_explicit_default_wins() {
        let mut manager = LlmManager::new(RetryPolicy::none());
        manager.register("a", fixed("model-a"), false);
        manager.register("b", fixed("model-b"), true);
        assert_eq!(manager.default_service(), Some("b"));
    }

    #[test]
    fn test_unknown_service() {
        let mut manager = LlmManager::new(RetryPolicy::none());
        assert!(matches!(manager.get(None), Err(TolkError::UnknownService(_))));

        manager.register("a", fixed("model-a"), false);
        assert!(matches!(
            manager.get(Some("missing")),
            Err(TolkError::UnknownService(name)) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn test_chat_routes_to_named_service() {
        let mut manager = LlmManager::new(RetryPolicy::none());
        manager.register("a", fixed("model-a"), false);
        manager.register("b", fixed("model-b"), false);

        let response = manager.chat(&[ChatMessage::user("hi")], Some("b")).await.unwrap();
        assert_eq!(response.content, "from model-b");
        assert_eq!(manager.count_tokens("abcd", None).unwrap(), 4);
        assert_eq!(manager.estimate_cost(10, Some("b")).unwrap(), 10.0);
    }

    #[test]
    fn test_from_settings_skips_services_without_keys() {
        let mut settings = LlmSettings::default();
        for service in settings.services.values_mut() {
            service.api_key = None;
            service.api_key_env = "TOLK_TEST_NO_SUCH_KEY".to_string();
        }
        if let Some(glm) = settings.services.get_mut("glm") {
            glm.api_key = Some("glm-key".to_string());
        }

        let manager = LlmManager::from_settings(&settings).unwrap();
        assert_eq!(manager.services(), vec!["glm"]);
        assert_eq!(manager.default_service(), Some("glm"));
    }
}
