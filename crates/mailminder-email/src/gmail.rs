use crate::EmailError;
use async_trait::async_trait;
use mailminder_core::AccessToken;
use serde::Deserialize;

/// Reads message content for the reply flow.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Returns the plain-text snippet of `message_id`, if the API has one.
    async fn message_snippet(
        &self,
        message_id: &str,
        token: &AccessToken,
    ) -> Result<Option<String>, EmailError>;
}

#[derive(Debug, Deserialize)]
struct GmailMessageResponse {
    snippet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
}

impl GmailClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MessageSource for GmailClient {
    async fn message_snippet(
        &self,
        message_id: &str,
        token: &AccessToken,
    ) -> Result<Option<String>, EmailError> {
        if message_id.trim().is_empty() {
            return Err(EmailError::Data("missing Gmail message id".to_string()));
        }

        let response = self
            .http
            .get(format!("{}/users/me/messages/{message_id}", self.api_base))
            .bearer_auth(token.secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmailError::Status {
                context: "Gmail message fetch",
                status: response.status(),
            });
        }

        let payload: GmailMessageResponse = response.json().await?;
        Ok(payload.snippet.filter(|snippet| !snippet.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_snippet_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/messages/18c2f"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "18c2f",
                "threadId": "18c2e",
                "snippet": "Can we move the meeting to 3pm?"
            })))
            .mount(&server)
            .await;

        let client = GmailClient::new(server.uri());
        let snippet = client
            .message_snippet("18c2f", &AccessToken::new("ya29.token"))
            .await
            .expect("snippet fetched");
        assert_eq!(snippet.as_deref(), Some("Can we move the meeting to 3pm?"));
    }

    #[tokio::test]
    async fn maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GmailClient::new(server.uri());
        let err = client
            .message_snippet("18c2f", &AccessToken::new("expired"))
            .await
            .expect_err("unauthorized");
        assert!(matches!(err, EmailError::Status { status, .. } if status.as_u16() == 401));
    }
}
