use crate::{AuthorizationCodeSource, AuthorizationGrant, ConsentSession, SecurityError};
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

const DONE_PAGE: &str =
    "<html><body><p>MailMinder is signed in. You can close this tab.</p></body></html>";
const FAILED_PAGE: &str =
    "<html><body><p>MailMinder could not sign you in. Close this tab and try again.</p></body></html>";

/// Shows the consent page to the user.
pub trait UrlLauncher: Send + Sync {
    fn launch(&self, url: &str);
}

type GrantSlot = Arc<Mutex<Option<oneshot::Sender<Result<AuthorizationGrant, SecurityError>>>>>;

/// Receives the OAuth redirect on the loopback address named by the redirect URL.
pub struct LoopbackCodeReceiver {
    redirect_url: Url,
    launcher: Arc<dyn UrlLauncher>,
    timeout: Duration,
}

impl LoopbackCodeReceiver {
    pub fn new(redirect_url: Url, launcher: Arc<dyn UrlLauncher>) -> Self {
        Self {
            redirect_url,
            launcher,
            timeout: CONSENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn router(&self, slot: GrantSlot) -> Router {
        Router::new()
            .route(self.redirect_url.path(), get(receive_redirect))
            .with_state(slot)
    }
}

#[async_trait]
impl AuthorizationCodeSource for LoopbackCodeReceiver {
    async fn authorization_code(
        &self,
        session: &ConsentSession,
    ) -> Result<AuthorizationGrant, SecurityError> {
        let host = self.redirect_url.host_str().unwrap_or("127.0.0.1");
        let port = self.redirect_url.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind((host, port)).await?;

        let (grant_tx, grant_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = self.router(Arc::new(Mutex::new(Some(grant_tx))));
        tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!("loopback listener failed: {err}");
            }
        });

        self.launcher.launch(session.authorization_url.as_str());
        tracing::info!(port, "waiting for OAuth consent redirect");

        let outcome = tokio::time::timeout(self.timeout, grant_rx).await;
        let _ = stop_tx.send(());
        match outcome {
            Ok(Ok(grant)) => grant,
            Ok(Err(_)) => Err(SecurityError::OAuth(
                "loopback listener stopped before the redirect".to_string(),
            )),
            Err(_) => Err(SecurityError::OAuth("timed out waiting for consent".to_string())),
        }
    }
}

async fn receive_redirect(
    State(slot): State<GrantSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let grant = grant_from_params(&params);
    let response = match grant {
        Ok(_) => (StatusCode::OK, Html(DONE_PAGE)),
        Err(_) => (StatusCode::BAD_REQUEST, Html(FAILED_PAGE)),
    };

    let waiting = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    match waiting {
        Some(sender) => {
            let _ = sender.send(grant);
        }
        None => tracing::debug!("ignoring repeated consent redirect"),
    }
    response
}

fn grant_from_params(params: &HashMap<String, String>) -> Result<AuthorizationGrant, SecurityError> {
    if let Some(error) = params.get("error") {
        return Err(SecurityError::OAuth(format!("consent denied: {error}")));
    }
    match (params.get("code"), params.get("state")) {
        (Some(code), Some(state)) => Ok(AuthorizationGrant {
            code: code.clone(),
            state: state.clone(),
        }),
        _ => Err(SecurityError::OAuth(
            "redirect is missing code or state".to_string(),
        )),
    }
}
