//! Chat-completions rewrite client.

use async_trait::async_trait;
use tracing::{debug, warn};

use polisher_protocols::{
    KnownProvider, ProviderSettings, RewriteClient, RewriteError, RewriteRequest,
};

use crate::api::{ApiErrorBody, ApiMessage, ApiRequest, ApiResponse};
use crate::cleanup::strip_boilerplate;

/// Prefix of the user message carrying the text to rewrite.
pub const USER_PREFIX: &str = "Rewrite this: ";

/// Sampling temperature sent with every request.
pub const TEMPERATURE: f32 = 0.7;

const MISSING_CREDENTIAL: &str = "API key not set. Please set it in the extension settings.";

/// Rewrite client for OpenAI-compatible chat-completions endpoints.
///
/// Stateless apart from the pooled HTTP client; provider, endpoint and
/// credential come with every call.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
}

impl ChatCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(request: &RewriteRequest, model: &str) -> ApiRequest {
        ApiRequest {
            model: model.to_string(),
            messages: vec![
                ApiMessage::system(request.instruction.clone()),
                ApiMessage::user(format!("{}{}", USER_PREFIX, request.text)),
            ],
            temperature: TEMPERATURE,
        }
    }

    async fn send_request(
        &self,
        endpoint: &str,
        credential: &str,
        api_request: &ApiRequest,
    ) -> Result<String, RewriteError> {
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", credential))
            .header("Content-Type", "application/json")
            .json(api_request)
            .send()
            .await
            .map_err(|e| RewriteError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RewriteError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = ApiErrorBody::message_from(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| status.as_str().to_string())
            });
            warn!(status = status.as_u16(), "Rewrite endpoint returned an error");
            return Err(RewriteError::Transport(message));
        }

        Ok(body)
    }

    fn parse_content(body: &str) -> Result<String, RewriteError> {
        let response: ApiResponse = serde_json::from_str(body)
            .map_err(|e| RewriteError::Transport(format!("malformed response: {}", e)))?;
        let content = response.into_content().ok_or_else(|| {
            RewriteError::Transport(
                "malformed response: missing choices[0].message.content".to_string(),
            )
        })?;

        let cleaned = strip_boilerplate(&content);
        if cleaned.is_empty() {
            return Err(RewriteError::Transport("empty response".to_string()));
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl RewriteClient for ChatCompletionClient {
    fn id(&self) -> &str {
        "chat-completions"
    }

    async fn rewrite(
        &self,
        request: &RewriteRequest,
        settings: &ProviderSettings,
    ) -> Result<String, RewriteError> {
        let credential = settings
            .credential()
            .ok_or_else(|| RewriteError::Configuration(MISSING_CREDENTIAL.to_string()))?;
        let provider = KnownProvider::parse(&settings.provider)
            .ok_or_else(|| RewriteError::UnsupportedProvider(settings.provider.clone()))?;

        let endpoint = settings
            .endpoint
            .as_deref()
            .unwrap_or(provider.default_endpoint());
        let model = settings.model.as_deref().unwrap_or(provider.default_model());

        debug!(
            provider = provider.as_str(),
            model,
            context = %request.context,
            chars = request.text.chars().count(),
            "Sending rewrite request"
        );

        let api_request = Self::build_request(request, model);
        let body = self.send_request(endpoint, credential, &api_request).await?;
        Self::parse_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polisher_protocols::UsageContext;

    fn request(text: &str) -> RewriteRequest {
        RewriteRequest::new(text, UsageContext::NewEntry, "Be courteous.")
    }

    #[test]
    fn test_client_id() {
        assert_eq!(ChatCompletionClient::new().id(), "chat-completions");
    }

    #[test]
    fn test_build_request() {
        let api_request = ChatCompletionClient::build_request(&request("fix it"), "gpt-4o");
        assert_eq!(api_request.model, "gpt-4o");
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.messages[0].role, "system");
        assert_eq!(api_request.messages[0].content, "Be courteous.");
        assert_eq!(api_request.messages[1].content, "Rewrite this: fix it");
        assert_eq!(api_request.temperature, TEMPERATURE);
    }

    #[test]
    fn test_parse_content_strips_boilerplate() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "Here's a polished version:\nGreat point!"}}]
        })
        .to_string();
        assert_eq!(ChatCompletionClient::parse_content(&body).unwrap(), "Great point!");
    }

    #[test]
    fn test_parse_content_malformed() {
        let err = ChatCompletionClient::parse_content("<html>").unwrap_err();
        assert!(matches!(err, RewriteError::Transport(ref m) if m.starts_with("malformed response")));
    }

    #[test]
    fn test_parse_content_blank_after_cleanup() {
        let body = serde_json::json!({"choices": [{"message": {"content": "   "}}]}).to_string();
        assert_eq!(
            ChatCompletionClient::parse_content(&body).unwrap_err(),
            RewriteError::Transport("empty response".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let client = ChatCompletionClient::new();
        let settings = ProviderSettings::new("deepseek");
        let err = client.rewrite(&request("hi"), &settings).await.unwrap_err();
        assert!(err.needs_configuration());
        assert!(matches!(err, RewriteError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let client = ChatCompletionClient::new();
        let settings = ProviderSettings::new("mystery-llm").with_credential("key");
        let err = client.rewrite(&request("hi"), &settings).await.unwrap_err();
        assert_eq!(err, RewriteError::UnsupportedProvider("mystery-llm".to_string()));
    }

    // Wiremock-based tests for actual HTTP calls
    mod http_tests {
        use super::*;
        use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

        fn settings_for(server: &MockServer) -> ProviderSettings {
            ProviderSettings::new("openai")
                .with_credential("test-key")
                .with_endpoint(server.uri())
        }

        #[tokio::test]
        async fn test_rewrite_success() {
            let mock_server = MockServer::start().await;

            let response_body = serde_json::json!({
                "id": "chatcmpl-123",
                "model": "gpt-3.5-turbo",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "Could we reconsider this approach? 💡"
                    },
                    "finish_reason": "stop"
                }]
            })
            .to_string();

            Mock::given(matchers::method("POST"))
                .and(matchers::path("/"))
                .and(matchers::header("Authorization", "Bearer test-key"))
                .and(matchers::header("Content-Type", "application/json"))
                .and(matchers::body_partial_json(serde_json::json!({
                    "model": "gpt-3.5-turbo",
                    "messages": [
                        {"role": "system", "content": "Be courteous."},
                        {"role": "user", "content": "Rewrite this: this is wrong fix it"}
                    ]
                })))
                .respond_with(ResponseTemplate::new(200).set_body_string(&response_body))
                .expect(1)
                .mount(&mock_server)
                .await;

            let client = ChatCompletionClient::new();
            let result = client
                .rewrite(&request("this is wrong fix it"), &settings_for(&mock_server))
                .await;
            assert_eq!(result.unwrap(), "Could we reconsider this approach? 💡");
        }

        #[tokio::test]
        async fn test_rewrite_uses_model_override() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::method("POST"))
                .and(matchers::body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "choices": [{"message": {"content": "ok"}}]
                })))
                .expect(1)
                .mount(&mock_server)
                .await;

            let settings = settings_for(&mock_server).with_model("gpt-4o-mini");
            let result = ChatCompletionClient::new()
                .rewrite(&request("hi"), &settings)
                .await;
            assert_eq!(result.unwrap(), "ok");
        }

        #[tokio::test]
        async fn test_rewrite_api_error_message() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::method("POST"))
                .respond_with(
                    ResponseTemplate::new(401)
                        .set_body_string(r#"{"error": {"message": "invalid key"}}"#),
                )
                .expect(1)
                .mount(&mock_server)
                .await;

            let err = ChatCompletionClient::new()
                .rewrite(&request("hi"), &settings_for(&mock_server))
                .await
                .unwrap_err();
            assert_eq!(err, RewriteError::Transport("invalid key".to_string()));
            assert!(!err.to_string().contains("test-key"));
        }

        #[tokio::test]
        async fn test_rewrite_server_error_uses_status_text() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
                .expect(1)
                .mount(&mock_server)
                .await;

            let err = ChatCompletionClient::new()
                .rewrite(&request("hi"), &settings_for(&mock_server))
                .await
                .unwrap_err();
            assert_eq!(err, RewriteError::Transport("Internal Server Error".to_string()));
        }

        #[tokio::test]
        async fn test_rewrite_malformed_success_body() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"choices": []}"#))
                .expect(1)
                .mount(&mock_server)
                .await;

            let err = ChatCompletionClient::new()
                .rewrite(&request("hi"), &settings_for(&mock_server))
                .await
                .unwrap_err();
            assert!(err.is_retryable());
            assert!(err.detail().contains("choices[0].message.content"));
        }

        #[tokio::test]
        async fn test_missing_credential_sends_nothing() {
            let mock_server = MockServer::start().await;

            Mock::given(matchers::any())
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&mock_server)
                .await;

            let settings = ProviderSettings::new("openai").with_endpoint(mock_server.uri());
            let err = ChatCompletionClient::new()
                .rewrite(&request("hi"), &settings)
                .await
                .unwrap_err();
            assert!(matches!(err, RewriteError::Configuration(_)));
        }

        #[tokio::test]
        async fn test_connection_refused_is_transport_error() {
            let mock_server = MockServer::start().await;
            let uri = mock_server.uri();
            drop(mock_server);

            let settings = ProviderSettings::new("deepseek")
                .with_credential("test-key")
                .with_endpoint(uri);
            let err = ChatCompletionClient::new()
                .rewrite(&request("hi"), &settings)
                .await
                .unwrap_err();
            assert!(err.is_retryable());
            assert!(!err.to_string().contains("test-key"));
        }
    }
}
