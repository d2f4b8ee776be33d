use crate::{CachedToken, ConsentFlow, SecurityError, TokenCache};
use async_trait::async_trait;
use chrono::Utc;
use mailminder_core::AccessToken;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Source of the OAuth bearer token used for every Google and backend call.
///
/// An absent token is the normal "not signed in" outcome, so `acquire` never
/// fails; problems are logged and reported as `None`. Expired tokens count as
/// absent unless they can be refreshed without the user.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token. Only prompts the user when `interactive` is set.
    async fn acquire(&self, interactive: bool) -> Option<AccessToken>;

    /// Invalidates `token` remotely and drops it from the local cache.
    async fn revoke(&self, token: &AccessToken) -> Result<(), SecurityError>;
}

pub struct IdentityTokenProvider {
    cache: Arc<dyn TokenCache>,
    consent: Option<Arc<dyn ConsentFlow>>,
    revoke_url: Url,
    http: reqwest::Client,
    consent_guard: Mutex<()>,
}

impl IdentityTokenProvider {
    pub fn new(cache: Arc<dyn TokenCache>, revoke_url: Url) -> Self {
        Self {
            cache,
            consent: None,
            revoke_url,
            http: reqwest::Client::new(),
            consent_guard: Mutex::new(()),
        }
    }

    pub fn with_consent(mut self, consent: Arc<dyn ConsentFlow>) -> Self {
        self.consent = Some(consent);
        self
    }

    fn cached(&self) -> Option<CachedToken> {
        match self.cache.load() {
            Ok(entry) => entry.filter(|entry| !entry.access_token.is_blank()),
            Err(err) => {
                tracing::warn!("token cache lookup failed: {err}");
                None
            }
        }
    }

    fn fresh(&self) -> Option<AccessToken> {
        self.cached()
            .filter(|entry| entry.is_fresh(Utc::now()))
            .map(|entry| entry.access_token)
    }

    /// Drops an expired entry and tries its refresh token.
    async fn renew(&self, expired: CachedToken) -> Option<AccessToken> {
        if let Err(err) = self.cache.clear(&expired.access_token) {
            tracing::warn!("could not drop expired token: {err}");
        }
        let refresh_token = expired.refresh_token?;
        let consent = self.consent.as_ref()?;

        match consent.refresh(&refresh_token).await {
            Ok(mut result) => {
                // Google omits the refresh token on renewal.
                if result.refresh_token.is_none() {
                    result.refresh_token = Some(refresh_token);
                }
                match self.remember(CachedToken::issued(result, Utc::now())) {
                    Ok(token) => {
                        tracing::info!("refreshed expired access token");
                        Some(token)
                    }
                    Err(err) => {
                        tracing::warn!("could not cache refreshed token: {err}");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!("token refresh failed: {err}");
                None
            }
        }
    }

    fn remember(&self, entry: CachedToken) -> Result<AccessToken, SecurityError> {
        self.cache.store(&entry)?;
        Ok(entry.access_token)
    }

    async fn prompt(&self) -> Result<AccessToken, SecurityError> {
        let consent = self
            .consent
            .as_ref()
            .ok_or(SecurityError::ConsentUnavailable)?;
        let result = consent.authorize().await?;
        self.remember(CachedToken::issued(result, Utc::now()))
    }
}

#[async_trait]
impl TokenProvider for IdentityTokenProvider {
    async fn acquire(&self, interactive: bool) -> Option<AccessToken> {
        match self.cached() {
            Some(entry) if entry.is_fresh(Utc::now()) => return Some(entry.access_token),
            Some(expired) => {
                if let Some(token) = self.renew(expired).await {
                    return Some(token);
                }
            }
            None => {}
        }
        if !interactive {
            return None;
        }

        // One consent prompt at a time; whoever waited reuses its result.
        let _guard = self.consent_guard.lock().await;
        if let Some(token) = self.fresh() {
            return Some(token);
        }

        match self.prompt().await {
            Ok(token) => {
                tracing::info!("obtained access token through consent");
                Some(token)
            }
            Err(err) => {
                tracing::warn!("interactive token acquisition failed: {err}");
                None
            }
        }
    }

    async fn revoke(&self, token: &AccessToken) -> Result<(), SecurityError> {
        let remote = self
            .http
            .post(self.revoke_url.clone())
            .query(&[("token", token.secret())])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .and_then(|response| response.error_for_status());

        self.cache.clear(token)?;

        match remote {
            Ok(_) => {
                tracing::info!("token revoked and removed from cache");
                Ok(())
            }
            Err(err) => {
                tracing::warn!("remote revoke failed, cached token removed anyway: {err}");
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl<T> TokenProvider for Arc<T>
where
    T: TokenProvider + ?Sized,
{
    async fn acquire(&self, interactive: bool) -> Option<AccessToken> {
        (**self).acquire(interactive).await
    }

    async fn revoke(&self, token: &AccessToken) -> Result<(), SecurityError> {
        (**self).revoke(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryTokenCache, OAuthTokenResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingConsent {
        prompts: AtomicUsize,
        refreshes: AtomicUsize,
        lifetime_secs: u64,
    }

    impl CountingConsent {
        fn lasting(lifetime_secs: u64) -> Arc<Self> {
            Arc::new(Self {
                prompts: AtomicUsize::new(0),
                refreshes: AtomicUsize::new(0),
                lifetime_secs,
            })
        }
    }

    #[async_trait]
    impl ConsentFlow for CountingConsent {
        async fn authorize(&self) -> Result<OAuthTokenResult, SecurityError> {
            let n = self.prompts.fetch_add(1, Ordering::SeqCst);
            Ok(OAuthTokenResult {
                access_token: AccessToken::new(format!("ya29.token-{n}")),
                refresh_token: None,
                expires_in_secs: Some(self.lifetime_secs),
            })
        }

        async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokenResult, SecurityError> {
            if refresh_token != "1//refresh" {
                return Err(SecurityError::OAuth("invalid_grant".to_string()));
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(OAuthTokenResult {
                access_token: AccessToken::new(format!("ya29.refreshed-{n}")),
                refresh_token: None,
                expires_in_secs: Some(3599),
            })
        }
    }

    fn expired(refresh_token: Option<&str>) -> CachedToken {
        CachedToken {
            access_token: AccessToken::new("ya29.stale"),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
        }
    }

    fn revoke_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/revoke", server.uri())).expect("url")
    }

    #[tokio::test]
    async fn silent_acquire_never_prompts() {
        let server = MockServer::start().await;
        let consent = CountingConsent::lasting(3599);
        let provider = IdentityTokenProvider::new(Arc::new(MemoryTokenCache::default()), revoke_url(&server))
            .with_consent(consent.clone());

        assert_eq!(provider.acquire(false).await, None);
        assert_eq!(consent.prompts.load(Ordering::SeqCst), 0);

        let token = provider.acquire(true).await.expect("interactive token");
        assert_eq!(provider.acquire(false).await, Some(token));
        assert_eq!(consent.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn revoke_makes_silent_check_unauthenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(query_param("token", "ya29.cached"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryTokenCache::with_token(AccessToken::new("ya29.cached")));
        let provider = IdentityTokenProvider::new(cache, revoke_url(&server));

        let token = provider.acquire(false).await.expect("cached token");
        provider.revoke(&token).await.expect("revoked");
        assert_eq!(provider.acquire(false).await, None);
    }

    #[tokio::test]
    async fn failed_remote_revoke_still_clears_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryTokenCache::with_token(AccessToken::new("ya29.cached")));
        let provider = IdentityTokenProvider::new(cache, revoke_url(&server));

        let token = provider.acquire(false).await.expect("cached token");
        assert!(provider.revoke(&token).await.is_err());
        assert_eq!(provider.acquire(false).await, None);
    }

    #[tokio::test]
    async fn token_issued_already_expired_is_not_served_silently() {
        let server = MockServer::start().await;
        let consent = CountingConsent::lasting(0);
        let cache = Arc::new(MemoryTokenCache::default());
        let provider = IdentityTokenProvider::new(cache.clone(), revoke_url(&server))
            .with_consent(consent.clone());

        assert!(provider.acquire(true).await.is_some());
        assert_eq!(provider.acquire(false).await, None);
        assert_eq!(cache.load().expect("load"), None);
        assert_eq!(consent.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_silently() {
        let server = MockServer::start().await;
        let consent = CountingConsent::lasting(3599);
        let cache = Arc::new(MemoryTokenCache::with_entry(expired(Some("1//refresh"))));
        let provider = IdentityTokenProvider::new(cache.clone(), revoke_url(&server))
            .with_consent(consent.clone());

        let token = provider.acquire(false).await.expect("refreshed token");
        assert_eq!(token, AccessToken::new("ya29.refreshed-0"));
        assert_eq!(provider.acquire(false).await, Some(token));
        assert_eq!(consent.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(consent.prompts.load(Ordering::SeqCst), 0);

        let entry = cache.load().expect("load").expect("entry");
        assert_eq!(entry.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_consent_when_interactive() {
        let server = MockServer::start().await;
        let consent = CountingConsent::lasting(3599);
        let cache = Arc::new(MemoryTokenCache::with_entry(expired(Some("1//revoked"))));
        let provider = IdentityTokenProvider::new(cache, revoke_url(&server))
            .with_consent(consent.clone());

        assert_eq!(provider.acquire(false).await, None);
        assert_eq!(
            provider.acquire(true).await,
            Some(AccessToken::new("ya29.token-0"))
        );
    }

    #[tokio::test]
    async fn interactive_without_consent_is_not_signed_in() {
        let server = MockServer::start().await;
        let provider =
            IdentityTokenProvider::new(Arc::new(MemoryTokenCache::default()), revoke_url(&server));
        assert_eq!(provider.acquire(true).await, None);
    }
}
