//! HTTP provider tests against mock servers.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use tolk::config::ServiceSettings;
use tolk::llm::{
    AnthropicProvider, ChatMessage, LlmManager, LlmProvider, OpenAiProvider, ProviderKind,
    RetryPolicy,
};
use tolk::TolkError;

fn service(kind: ProviderKind, base_url: &str, model: &str) -> ServiceSettings {
    ServiceSettings {
        kind,
        api_key: Some("test-api-key".to_string()),
        base_url: base_url.to_string(),
        model: model.to_string(),
        max_tokens: 512,
        temperature: 0.2,
        timeout_secs: 5,
        ..ServiceSettings::default()
    }
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a content analyst."),
        ChatMessage::user("Analyze this."),
        ChatMessage::assistant("Earlier reply."),
    ]
}

#[cfg(test)]
mod anthropic_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-3-haiku-20240307",
                "system": "You are a content analyst.",
                "messages": [{"role": "user", "content": "Analyze this."}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-haiku-20240307",
                "content": [{"type": "text", "text": "{\"summary\": \"ok\"}"}],
                "usage": {"input_tokens": 1000, "output_tokens": 1000}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let settings = service(ProviderKind::Anthropic, &mock_server.uri(), "claude-3-haiku-20240307");
        let provider = AnthropicProvider::new(&settings, "test-api-key").unwrap();
        let response = provider.chat(&messages()).await.unwrap();

        assert_eq!(response.content, "{\"summary\": \"ok\"}");
        assert_eq!(response.input_tokens, 1000);
        assert_eq!(response.output_tokens, 1000);
        assert_eq!(response.tokens_used, 2000);
        // 1K input at 0.00025 plus 1K output at 0.00125.
        assert!((response.cost - 0.0015).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let settings = service(ProviderKind::Anthropic, &mock_server.uri(), "claude-3-haiku-20240307");
        let mut manager = LlmManager::new(fast_retries());
        manager.register(
            "anthropic",
            Arc::new(AnthropicProvider::new(&settings, "test-api-key").unwrap()),
            true,
        );

        let result = manager.chat(&messages(), None).await;
        match result {
            Err(TolkError::Provider { status, message, .. }) => {
                assert_eq!(status, Some(401));
                assert!(message.contains("invalid x-api-key"));
            }
            other => panic!("expected a provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let settings = service(ProviderKind::Anthropic, &mock_server.uri(), "claude-3-haiku-20240307");
        let mut manager = LlmManager::new(fast_retries());
        manager.register(
            "anthropic",
            Arc::new(AnthropicProvider::new(&settings, "test-api-key").unwrap()),
            true,
        );

        let result = manager.chat(&messages(), Some("anthropic")).await;
        assert!(matches!(
            result,
            Err(TolkError::ProviderUnavailable { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let settings = service(ProviderKind::Anthropic, &mock_server.uri(), "claude-3-haiku-20240307");
        let provider = AnthropicProvider::new(&settings, "test-api-key").unwrap();
        let result = provider.chat(&messages()).await;

        assert!(matches!(result, Err(TolkError::MalformedResponse(_))));
    }
}

#[cfg(test)]
mod openai_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_chat_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Tags: rust, async"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 2000, "completion_tokens": 1000, "total_tokens": 3000}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let settings = service(ProviderKind::OpenAi, &mock_server.uri(), "gpt-4o-mini");
        let provider = OpenAiProvider::new(&settings, "test-api-key").unwrap();
        let response = provider.chat(&messages()).await.unwrap();

        assert_eq!(response.content, "Tags: rust, async");
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.tokens_used, 3000);
        // 2K input at 0.00015 plus 1K output at 0.0006.
        assert!((response.cost - 0.0009).abs() < 1e-9);
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-3",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    fn manager_for(server: &MockServer) -> LlmManager {
        let mut manager = LlmManager::new(fast_retries());
        manager.register(
            "openai",
            Arc::new(
                OpenAiProvider::new(
                    &service(ProviderKind::OpenAi, &server.uri(), "gpt-4o-mini"),
                    "test-api-key",
                )
                .unwrap(),
            ),
            true,
        );
        manager
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "message": "Rate limit reached",
                    "type": "requests",
                    "param": null,
                    "code": "rate_limit_exceeded"
                }
            })))
            .expect(3)
            .mount(&mock_server)
            .await;

        let manager = manager_for(&mock_server);
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            manager.chat(&messages(), None),
        )
        .await
        .expect("retries must stay bounded");

        assert!(matches!(
            result,
            Err(TolkError::ProviderUnavailable { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("recovered")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = manager_for(&mock_server)
            .chat(&messages(), None)
            .await
            .unwrap();
        assert_eq!(response.content, "recovered");
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Unknown model",
                    "type": "invalid_request_error",
                    "param": "model",
                    "code": null
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match manager_for(&mock_server).chat(&messages(), None).await {
            Err(TolkError::Provider { status, message, .. }) => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "Unknown model");
            }
            other => panic!("expected a provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manager_routes_to_named_service() {
        let openai_server = MockServer::start().await;
        let glm_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-2",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "glm-4-flash",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "from glm"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&glm_server)
            .await;

        let mut manager = LlmManager::new(fast_retries());
        manager.register(
            "openai",
            Arc::new(
                OpenAiProvider::new(
                    &service(ProviderKind::OpenAi, &openai_server.uri(), "gpt-4o-mini"),
                    "test-api-key",
                )
                .unwrap(),
            ),
            true,
        );
        manager.register(
            "glm",
            Arc::new(
                OpenAiProvider::new(
                    &service(ProviderKind::OpenAi, &glm_server.uri(), "glm-4-flash"),
                    "test-api-key",
                )
                .unwrap(),
            ),
            false,
        );

        assert_eq!(manager.default_service(), Some("openai"));
        let response = manager.chat(&messages(), Some("glm")).await.unwrap();
        assert_eq!(response.content, "from glm");
    }
}
