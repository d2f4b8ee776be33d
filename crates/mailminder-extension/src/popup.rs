use crate::{HostPlatform, PanelError};
use mailminder_backend::{BackendClient, FeedbackClient};
use mailminder_core::{ExtensionMessage, DEFAULT_PHOTO_URL};
use mailminder_email::ProfileSource;
use mailminder_security::TokenProvider;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const GMAIL_ORIGIN: &str = "https://mail.google.com/";
const PROFILE_TAB_PAGE: &str = "tabInfoModel.html";

/// Usage guide shown on the Help view, as (title, body) pairs.
pub const HELP_STEPS: [(&str, &str); 5] = [
    (
        "Sign In",
        "First, sign in with your Google account. This authentication step is necessary to access our features.",
    ),
    (
        "Button Appearance",
        "After signing in, you'll see a new mailminder button in your inbox. This button gives you access to our suggested replies.",
    ),
    (
        "Suggested Replies",
        "Click the mailminder button to see three suggested replies that perfectly align with your email. Choose any one of them by clicking on it, and the text will automatically paste into your reply box.",
    ),
    (
        "Select Your Tone",
        "You can select the tone in which you prefer to reply to the email. Available tones include friendly, professional, casual, and more.",
    ),
    (
        "Reload Suggestions",
        "If none of the initial three replies suit your needs, simply click the reload button. This will generate another set of three replies with improved suggestions.",
    ),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupView {
    #[default]
    Main,
    Help,
    Feedback,
    Community,
}

/// Outcome of the last feedback submission. `Sent` tells the form to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopupState {
    pub view: PopupView,
    pub authenticated: bool,
    pub photo_url: Option<String>,
    pub loading: bool,
    pub feedback: Option<FeedbackStatus>,
}

/// The toolbar popup.
pub struct Popup {
    tokens: Arc<dyn TokenProvider>,
    people: Arc<dyn ProfileSource>,
    backend: BackendClient,
    host: Arc<dyn HostPlatform>,
    feedback: Option<FeedbackClient>,
    state: Mutex<PopupState>,
}

impl Popup {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        people: Arc<dyn ProfileSource>,
        backend: BackendClient,
        host: Arc<dyn HostPlatform>,
    ) -> Self {
        Self {
            tokens,
            people,
            backend,
            host,
            feedback: None,
            state: Mutex::new(PopupState::default()),
        }
    }

    pub fn with_feedback(mut self, feedback: FeedbackClient) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn state(&self) -> PopupState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PopupState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn navigate(&self, view: PopupView) {
        self.lock().view = view;
    }

    /// Signs in if needed and shows the profile photo.
    pub async fn open(&self) {
        self.lock().loading = true;
        let photo = self.fetch_photo().await;

        let mut state = self.lock();
        state.loading = false;
        match photo {
            Ok(photo_url) => {
                state.authenticated = true;
                state.photo_url = Some(photo_url);
            }
            Err(err) => {
                tracing::error!("error fetching profile info: {err}");
                state.authenticated = false;
            }
        }
    }

    async fn fetch_photo(&self) -> Result<String, PanelError> {
        let token = self
            .tokens
            .acquire(true)
            .await
            .ok_or(PanelError::NotSignedIn)?;
        let profile = self.people.me(&token).await?;
        if let Err(err) = self.backend.sync_identity(&profile).await {
            tracing::warn!("failed to send the profile to the backend: {err}");
        }
        Ok(profile
            .photo_url()
            .unwrap_or(DEFAULT_PHOTO_URL)
            .to_string())
    }

    /// Opens the user profile, in the Gmail tab when there is one.
    pub async fn profile_clicked(&self) -> Result<(), PanelError> {
        let token = self.tokens.acquire(true).await;
        let Some(tab) = self.host.active_tab() else {
            tracing::error!("no active tab found");
            return Ok(());
        };

        let on_gmail = tab
            .url
            .as_deref()
            .is_some_and(|url| url.starts_with(GMAIL_ORIGIN));
        if on_gmail {
            self.host
                .send_to_tab(tab.id, ExtensionMessage::OpenUserProfile { token })?;
        } else {
            let url = self.host.resource_url(PROFILE_TAB_PAGE);
            self.host
                .open_tab(&url, Some(ExtensionMessage::ShowUserProfile { token }))?;
        }
        Ok(())
    }

    /// Sends the feedback form. Blank fields are refused without a request.
    pub async fn send_feedback(&self, name: &str, feedback: &str) -> Result<(), PanelError> {
        let (name, feedback) = (name.trim(), feedback.trim());
        if name.is_empty() || feedback.is_empty() {
            return Err(PanelError::Invalid("name and feedback are required"));
        }
        let Some(client) = &self.feedback else {
            tracing::warn!("feedback delivery is not configured");
            self.lock().feedback = Some(FeedbackStatus::Failed);
            return Err(PanelError::Invalid("feedback delivery is not configured"));
        };

        self.lock().feedback = Some(FeedbackStatus::Sending);
        let sent = client.send(name, feedback).await;
        let mut state = self.lock();
        match sent {
            Ok(()) => {
                tracing::info!("feedback sent");
                state.feedback = Some(FeedbackStatus::Sent);
                Ok(())
            }
            Err(err) => {
                tracing::error!("failed to send feedback: {err}");
                state.feedback = Some(FeedbackStatus::Failed);
                Err(err.into())
            }
        }
    }

    pub async fn logout(&self) -> Result<(), PanelError> {
        let revoked = match self.tokens.acquire(false).await {
            Some(token) => self.tokens.revoke(&token).await.map_err(PanelError::from),
            None => {
                tracing::info!("no token found");
                Ok(())
            }
        };

        let mut state = self.lock();
        state.authenticated = false;
        state.photo_url = None;
        revoked
    }
}
