use crate::EmailError;
use async_trait::async_trait;
use mailminder_core::{AccessToken, ProfileInfo};

const PERSON_FIELDS: &str = "names,emailAddresses,photos";

/// Looks up the signed-in user's identity profile.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn me(&self, token: &AccessToken) -> Result<ProfileInfo, EmailError>;
}

#[derive(Debug, Clone)]
pub struct PeopleClient {
    http: reqwest::Client,
    api_base: String,
}

impl PeopleClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProfileSource for PeopleClient {
    async fn me(&self, token: &AccessToken) -> Result<ProfileInfo, EmailError> {
        let response = self
            .http
            .get(format!("{}/people/me", self.api_base))
            .query(&[("personFields", PERSON_FIELDS)])
            .bearer_auth(token.secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmailError::Status {
                context: "People profile fetch",
                status: response.status(),
            });
        }

        Ok(response.json().await?)
    }
}
