//! Google sign-in through the authorization-code flow with PKCE.
//!
//! [`PkceConsent`] owns the whole exchange: it builds the consent URL, hands it
//! to an [`AuthorizationCodeSource`] that waits for the redirect, checks the
//! returned state and trades the code for tokens. It also renews tokens with a
//! stored refresh token so silent lookups survive access-token expiry.

use crate::SecurityError;
use async_trait::async_trait;
use mailminder_core::{AccessToken, OAuthProfile};
use oauth2::{
    basic::{BasicClient, BasicTokenResponse},
    AuthUrl, AuthorizationCode, ClientId, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::sync::Arc;
use url::{Host, Url};

type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const MAX_CLIENT_ID_LEN: usize = 512;

/// Scopes outside Google's API namespace are refused.
const GOOGLE_SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";
const OPENID_SCOPES: &[&str] = &["openid", "email", "profile"];

/// Tokens returned by the token endpoint.
#[derive(Clone)]
pub struct OAuthTokenResult {
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
    pub expires_in_secs: Option<u64>,
}

impl std::fmt::Debug for OAuthTokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenResult")
            .field("access_token", &self.access_token)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

impl From<BasicTokenResponse> for OAuthTokenResult {
    fn from(response: BasicTokenResponse) -> Self {
        Self {
            access_token: AccessToken::new(response.access_token().secret().as_str()),
            refresh_token: response
                .refresh_token()
                .map(|token| token.secret().to_string()),
            expires_in_secs: response.expires_in().map(|lifetime| lifetime.as_secs()),
        }
    }
}

/// One pending consent: the URL to show and the secrets needed to finish it.
#[derive(Debug)]
pub struct ConsentSession {
    pub authorization_url: Url,
    csrf_state: CsrfToken,
    pkce_verifier: PkceCodeVerifier,
}

/// Code and state delivered to the redirect URL after the user consents.
#[derive(Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    pub state: String,
}

impl std::fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGrant")
            .field("code", &"[REDACTED]")
            .field("state", &"[REDACTED]")
            .finish()
    }
}

/// Shows the consent page and waits for the redirect that follows it.
#[async_trait]
pub trait AuthorizationCodeSource: Send + Sync {
    async fn authorization_code(
        &self,
        session: &ConsentSession,
    ) -> Result<AuthorizationGrant, SecurityError>;
}

/// How the token provider obtains new tokens.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Asks the user. May take minutes.
    async fn authorize(&self) -> Result<OAuthTokenResult, SecurityError>;

    /// Renews without user interaction.
    async fn refresh(&self, _refresh_token: &str) -> Result<OAuthTokenResult, SecurityError> {
        Err(SecurityError::ConsentUnavailable)
    }
}

pub struct PkceConsent {
    client: GoogleClient,
    scopes: Vec<Scope>,
    http: reqwest::Client,
    codes: Arc<dyn AuthorizationCodeSource>,
}

impl PkceConsent {
    pub fn new(
        profile: &OAuthProfile,
        codes: Arc<dyn AuthorizationCodeSource>,
    ) -> Result<Self, SecurityError> {
        check_profile(profile)?;

        let client = BasicClient::new(ClientId::new(profile.client_id.trim().to_string()))
            .set_auth_uri(AuthUrl::from_url(profile.auth_url.clone()))
            .set_token_uri(TokenUrl::from_url(profile.token_url.clone()))
            .set_redirect_uri(RedirectUrl::from_url(profile.redirect_url.clone()));

        // Token endpoint redirects are never followed.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            scopes: profile.scopes.iter().cloned().map(Scope::new).collect(),
            http,
            codes,
        })
    }

    pub fn begin_session(&self) -> ConsentSession {
        let (challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (authorization_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned())
            .set_pkce_challenge(challenge)
            .url();

        ConsentSession {
            authorization_url,
            csrf_state,
            pkce_verifier,
        }
    }

    async fn finish(
        &self,
        session: ConsentSession,
        grant: AuthorizationGrant,
    ) -> Result<OAuthTokenResult, SecurityError> {
        if grant.state != *session.csrf_state.secret() {
            return Err(SecurityError::OAuth(
                "authorization state does not match the pending session".to_string(),
            ));
        }

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(grant.code))
            .set_pkce_verifier(session.pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|err| SecurityError::OAuth(format!("code exchange failed: {err}")))?;
        Ok(response.into())
    }
}

#[async_trait]
impl ConsentFlow for PkceConsent {
    async fn authorize(&self) -> Result<OAuthTokenResult, SecurityError> {
        let session = self.begin_session();
        let grant = self.codes.authorization_code(&session).await?;
        self.finish(session, grant).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokenResult, SecurityError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|err| SecurityError::OAuth(format!("token refresh failed: {err}")))?;
        Ok(response.into())
    }
}

fn check_profile(profile: &OAuthProfile) -> Result<(), SecurityError> {
    let refuse = |reason: String| Err(SecurityError::OAuth(reason));

    for (name, url) in [("authorization", &profile.auth_url), ("token", &profile.token_url)] {
        if url.scheme() != "https" {
            return refuse(format!("{name} endpoint must use https"));
        }
    }

    // The consent redirect lands on the native host's own listener.
    let loopback = match profile.redirect_url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    };
    if !loopback || profile.redirect_url.scheme() != "http" {
        return refuse(format!(
            "redirect url {} must be an http loopback address",
            profile.redirect_url
        ));
    }

    let client_id = profile.client_id.trim();
    if client_id.is_empty() || client_id.len() > MAX_CLIENT_ID_LEN {
        return refuse("client id is missing or malformed".to_string());
    }

    if let Some(scope) = profile
        .scopes
        .iter()
        .find(|scope| !scope.starts_with(GOOGLE_SCOPE_PREFIX) && !OPENID_SCOPES.contains(&scope.as_str()))
    {
        return refuse(format!("scope '{scope}' is not a Google API scope"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> OAuthProfile {
        OAuthProfile {
            client_id: "client-123.apps.googleusercontent.com".to_string(),
            auth_url: Url::parse("https://accounts.google.com/o/oauth2/v2/auth").expect("url"),
            token_url: Url::parse("https://oauth2.googleapis.com/token").expect("url"),
            redirect_url: Url::parse("http://127.0.0.1:8749/callback").expect("url"),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        }
    }

    struct ForgedState;

    #[async_trait]
    impl AuthorizationCodeSource for ForgedState {
        async fn authorization_code(
            &self,
            _session: &ConsentSession,
        ) -> Result<AuthorizationGrant, SecurityError> {
            Ok(AuthorizationGrant {
                code: "code".to_string(),
                state: "not-the-session-state".to_string(),
            })
        }
    }

    fn consent(profile: OAuthProfile) -> Result<PkceConsent, SecurityError> {
        PkceConsent::new(&profile, Arc::new(ForgedState))
    }

    #[test]
    fn refuses_unsafe_profiles() {
        let mut remote = profile();
        remote.redirect_url = Url::parse("https://evil.example/callback").expect("url");
        assert!(consent(remote).is_err());

        let mut plain = profile();
        plain.token_url = Url::parse("http://oauth2.googleapis.com/token").expect("url");
        assert!(consent(plain).is_err());

        let mut foreign = profile();
        foreign.scopes.push("admin".to_string());
        assert!(consent(foreign).is_err());

        let mut blank = profile();
        blank.client_id = "  ".to_string();
        assert!(consent(blank).is_err());

        let mut localhost = profile();
        localhost.redirect_url = Url::parse("http://localhost:8749/callback").expect("url");
        localhost.scopes.push("openid".to_string());
        assert!(consent(localhost).is_ok());
    }

    #[test]
    fn session_url_carries_scopes_state_and_challenge() {
        let flow = consent(profile()).expect("consent");
        let session = flow.begin_session();
        let pairs: Vec<(String, String)> = session
            .authorization_url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let value = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(value("scope").as_deref(), Some("https://www.googleapis.com/auth/gmail.readonly"));
        assert_eq!(value("state").as_deref(), Some(session.csrf_state.secret().as_str()));
        assert_eq!(value("code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(value("redirect_uri").as_deref(), Some("http://127.0.0.1:8749/callback"));
    }

    #[tokio::test]
    async fn consent_rejects_mismatched_state() {
        let flow = consent(profile()).expect("consent");
        let err = flow.authorize().await.expect_err("state mismatch");
        assert!(matches!(err, SecurityError::OAuth(reason) if reason.contains("state")));
    }
}
