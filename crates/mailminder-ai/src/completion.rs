use crate::AiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One chat-completion round trip.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the first choice's content, or `None` when the model gave nothing.
    async fn complete(&self, prompt: &str) -> Result<Option<String>, AiError>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    settings: CompletionSettings,
    http: reqwest::Client,
}

impl ChatCompletionClient {
    pub fn new(settings: CompletionSettings) -> Result<Self, AiError> {
        if settings.endpoint.trim().is_empty() {
            return Err(AiError::Config("completion endpoint is missing".to_string()));
        }
        Ok(Self {
            settings,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<Option<String>, AiError> {
        let mut request = self.http.post(&self.settings.endpoint);
        if let Some(api_key) = &self.settings.api_key {
            request = request.bearer_auth(api_key);
        }

        // The endpoint expects `max_token`, not the OpenAI spelling.
        let response = request
            .json(&serde_json::json!({
                "messages": [{"role": "user", "content": prompt}],
                "model": self.settings.model,
                "max_token": self.settings.max_tokens,
            }))
            .send()
            .await?
            .error_for_status()?;

        let json: serde_json::Value = response.json().await?;
        Ok(json
            .pointer("/choices/0/message/content")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .filter(|content| !content.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> CompletionSettings {
        CompletionSettings {
            endpoint: format!("{}/chat/completions", server.uri()),
            model: "gryphe/mythomist-7b:free".to_string(),
            max_tokens: 30,
            api_key: Some("sk-test".to_string()),
        }
    }

    #[tokio::test]
    async fn posts_prompt_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "messages": [{"role": "user", "content": "hello"}],
                "max_token": 30
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi there!"}}]
            })))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(&server)).expect("client");
        let content = client.complete("hello").await.expect("completion");
        assert_eq!(content.as_deref(), Some("Hi there!"));
    }

    #[tokio::test]
    async fn empty_choices_are_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(&server)).expect("client");
        assert_eq!(client.complete("hello").await.expect("completion"), None);
    }

    #[tokio::test]
    async fn server_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(&server)).expect("client");
        assert!(matches!(client.complete("hello").await, Err(AiError::Http(_))));
    }
}
