use crate::BackendError;
use serde::Serialize;

/// Mail-delivery account the feedback form is sent through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackAccount {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
struct FeedbackEmail<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: FeedbackParams<'a>,
}

#[derive(Debug, Serialize)]
struct FeedbackParams<'a> {
    name: &'a str,
    feedback: &'a str,
}

/// Sends popup feedback as a templated email.
#[derive(Debug, Clone)]
pub struct FeedbackClient {
    http: reqwest::Client,
    endpoint: String,
    account: FeedbackAccount,
}

impl FeedbackClient {
    pub fn new(endpoint: impl Into<String>, account: FeedbackAccount) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            account,
        }
    }

    pub async fn send(&self, name: &str, feedback: &str) -> Result<(), BackendError> {
        let email = FeedbackEmail {
            service_id: &self.account.service_id,
            template_id: &self.account.template_id,
            user_id: &self.account.public_key,
            template_params: FeedbackParams { name, feedback },
        };
        let response = self.http.post(&self.endpoint).json(&email).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        tracing::warn!(%status, %detail, "feedback delivery rejected");
        Err(BackendError::Status {
            context: "feedback delivery",
            status,
        })
    }
}
