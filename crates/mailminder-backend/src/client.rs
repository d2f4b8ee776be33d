use crate::BackendError;
use mailminder_core::{AccessToken, PlanTitle, ProfileInfo, ProfileRecord, UsageDelta};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRegistration<'a> {
    token: &'a str,
    status: bool,
    api_calls: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageUpdate<'a> {
    user_id: &'a str,
    increment: UsageDelta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanSelection<'a> {
    user_id: &'a str,
    plan_title: PlanTitle,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDeletion<'a> {
    email_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct PlanEnvelope {
    plan: Option<PlanTitle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionLookup {
    subscription_plan: Option<PlanEnvelope>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionChange {
    subscription: PlanEnvelope,
}

/// Answer to a plan usage update. `ok == false` means the plan limit is reached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsageResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client for the MailMinder profile and subscription backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Appends each segment percent-encoded, so ids cannot reshape the path.
    fn segment_url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::BaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Upserts the profile bound to `token` and returns the stored record.
    pub async fn register_session(
        &self,
        token: &AccessToken,
        status: bool,
        api_calls: i64,
    ) -> Result<ProfileRecord, BackendError> {
        let response = self
            .http
            .post(self.url("/api/profile"))
            .json(&SessionRegistration {
                token: token.secret(),
                status,
                api_calls,
            })
            .send()
            .await?;
        let response = ensure_success(response, "profile registration")?;
        Ok(response.json().await?)
    }

    /// Mirrors the identity profile into the backend.
    pub async fn sync_identity(&self, profile: &ProfileInfo) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.url("/api/profile"))
            .json(profile)
            .send()
            .await?;
        ensure_success(response, "profile sync")?;
        Ok(())
    }

    pub async fn profile_by_email(
        &self,
        email: &str,
        token: &AccessToken,
    ) -> Result<ProfileRecord, BackendError> {
        let response = self
            .http
            .get(self.url("/api/profile"))
            .query(&[("email", email)])
            .bearer_auth(token.secret())
            .send()
            .await?;
        let response = ensure_success(response, "profile lookup")?;
        Ok(response.json().await?)
    }

    pub async fn delete_profile(&self, email: &str) -> Result<(), BackendError> {
        let response = self
            .http
            .delete(self.url("/api/profile"))
            .json(&ProfileDeletion {
                email_address: email,
            })
            .send()
            .await?;
        ensure_success(response, "profile deletion")?;
        Ok(())
    }

    pub async fn update_profile_api_count(
        &self,
        user_id: &str,
        increment: UsageDelta,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.url("/api/profile/updateApiCount"))
            .json(&UsageUpdate { user_id, increment })
            .send()
            .await?;
        ensure_success(response, "profile usage update")?;
        Ok(())
    }

    pub async fn subscription(
        &self,
        user_id: &str,
        token: &AccessToken,
    ) -> Result<Option<PlanTitle>, BackendError> {
        let response = self
            .http
            .get(self.segment_url(&["api", "subscription", user_id])?)
            .bearer_auth(token.secret())
            .send()
            .await?;
        let response = ensure_success(response, "subscription lookup")?;
        let lookup: SubscriptionLookup = response.json().await?;
        Ok(lookup.subscription_plan.and_then(|envelope| envelope.plan))
    }

    pub async fn select_plan(
        &self,
        user_id: &str,
        plan_title: PlanTitle,
    ) -> Result<PlanTitle, BackendError> {
        let response = self
            .http
            .post(self.url("/api/subscription"))
            .json(&PlanSelection {
                user_id,
                plan_title,
            })
            .send()
            .await?;
        let response = ensure_success(response, "subscription update")?;
        let change: SubscriptionChange = response.json().await?;
        change
            .subscription
            .plan
            .ok_or_else(|| BackendError::Contract("subscription response has no plan".to_string()))
    }

    /// Applies `increment` to the plan counter.
    ///
    /// A refusal from the backend comes back as `ok: false`, whatever the HTTP
    /// status, as long as the body follows the usage response shape.
    pub async fn update_plan_api_count(
        &self,
        user_id: &str,
        increment: UsageDelta,
    ) -> Result<UsageResponse, BackendError> {
        let response = self
            .http
            .post(self.url("/api/subscription/updateApiCount"))
            .json(&UsageUpdate { user_id, increment })
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        match serde_json::from_slice::<UsageResponse>(&body) {
            Ok(usage) => Ok(usage),
            Err(_) if !status.is_success() => Err(BackendError::Status {
                context: "plan usage update",
                status,
            }),
            Err(err) => Err(BackendError::Contract(format!(
                "plan usage response is malformed: {err}"
            ))),
        }
    }
}

fn ensure_success(
    response: reqwest::Response,
    context: &'static str,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        tracing::warn!(%status, "{context} rejected by backend");
        Err(BackendError::Status { context, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn registers_session_and_reads_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/profile"))
            .and(body_json(json!({"token": "ya29.t", "status": true, "apiCalls": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "66a1",
                "emailAddress": "ada@example.com",
                "apiCalls": 9
            })))
            .mount(&server)
            .await;

        let record = BackendClient::new(server.uri())
            .register_session(&AccessToken::new("ya29.t"), true, 0)
            .await
            .expect("record");
        assert_eq!(record.id, "66a1");
        assert_eq!(record.api_calls, 9);
    }

    #[tokio::test]
    async fn usage_updates_send_signed_increment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/profile/updateApiCount"))
            .and(body_json(json!({"userId": "66a1", "increment": -3})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        BackendClient::new(server.uri())
            .update_profile_api_count("66a1", UsageDelta(-3))
            .await
            .expect("decrement accepted");
    }

    #[tokio::test]
    async fn plan_limit_is_reported_as_not_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/subscription/updateApiCount"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "message": "Free plan limit reached"
            })))
            .mount(&server)
            .await;

        let usage = BackendClient::new(server.uri())
            .update_plan_api_count("66a1", UsageDelta(3))
            .await
            .expect("usage response");
        assert!(!usage.ok);
        assert_eq!(usage.message.as_deref(), Some("Free plan limit reached"));
    }

    #[tokio::test]
    async fn non_json_failure_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = BackendClient::new(server.uri())
            .update_plan_api_count("66a1", UsageDelta(3))
            .await
            .expect_err("gateway failure");
        assert!(matches!(err, BackendError::Status { status, .. } if status.as_u16() == 502));
    }

    #[tokio::test]
    async fn subscription_lookup_and_change() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/subscription/66a1"))
            .and(header("authorization", "Bearer ya29.t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscriptionPlan": {"plan": "free"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/subscription"))
            .and(body_json(json!({"userId": "66a1", "planTitle": "yearly"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscription": {"plan": "yearly"}
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let current = client
            .subscription("66a1", &AccessToken::new("ya29.t"))
            .await
            .expect("lookup");
        assert_eq!(current, Some(PlanTitle::Free));

        let changed = client
            .select_plan("66a1", PlanTitle::Yearly)
            .await
            .expect("change");
        assert_eq!(changed, PlanTitle::Yearly);
    }

    #[tokio::test]
    async fn subscription_lookup_encodes_the_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/subscription/a%2Fb%20c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscriptionPlan": {"plan": "monthly"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let current = BackendClient::new(format!("{}/", server.uri()))
            .subscription("a/b c", &AccessToken::new("ya29.t"))
            .await
            .expect("lookup");
        assert_eq!(current, Some(PlanTitle::Monthly));
    }

    #[tokio::test]
    async fn profile_lookup_and_deletion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/profile"))
            .and(query_param("email", "ada@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "66a1",
                "emailAddress": "ada@example.com",
                "subscriptionPlan": "monthly"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/profile"))
            .and(body_json(json!({"emailAddress": "ada@example.com"})))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let record = client
            .profile_by_email("ada@example.com", &AccessToken::new("ya29.t"))
            .await
            .expect("lookup");
        assert_eq!(record.subscription_plan, Some(PlanTitle::Monthly));

        let err = client
            .delete_profile("ada@example.com")
            .await
            .expect_err("missing profile");
        assert!(matches!(err, BackendError::Status { context: "profile deletion", .. }));
    }
}
