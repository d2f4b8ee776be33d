use crate::PanelError;
use mailminder_backend::BackendClient;
use mailminder_core::ProfileInfo;
use mailminder_email::ProfileSource;
use mailminder_security::TokenProvider;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "profile", rename_all = "snake_case")]
pub enum ProfileView {
    Loading,
    Loaded(ProfileInfo),
    NoData,
}

/// Account view shown in the user-profile overlay and the standalone tab.
pub struct ProfilePanel {
    tokens: Arc<dyn TokenProvider>,
    people: Arc<dyn ProfileSource>,
    backend: BackendClient,
    view: Mutex<ProfileView>,
}

impl ProfilePanel {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        people: Arc<dyn ProfileSource>,
        backend: BackendClient,
    ) -> Self {
        Self {
            tokens,
            people,
            backend,
            view: Mutex::new(ProfileView::Loading),
        }
    }

    pub fn view(&self) -> ProfileView {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProfileView> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_view(&self, view: ProfileView) {
        *self.lock() = view;
    }

    pub async fn load(&self) {
        self.set_view(ProfileView::Loading);
        let view = match self.fetch().await {
            Ok(profile) => ProfileView::Loaded(profile),
            Err(err) => {
                tracing::warn!("failed to load the user profile: {err}");
                ProfileView::NoData
            }
        };
        self.set_view(view);
    }

    async fn fetch(&self) -> Result<ProfileInfo, PanelError> {
        let token = self
            .tokens
            .acquire(true)
            .await
            .ok_or(PanelError::NotSignedIn)?;
        let profile = self.people.me(&token).await?;
        if let Err(err) = self.backend.sync_identity(&profile).await {
            tracing::warn!("failed to send the profile to the backend: {err}");
        }
        Ok(profile)
    }

    /// Deletes the backend profile, then signs out.
    pub async fn delete_account(&self) -> Result<(), PanelError> {
        let email = match &*self.lock() {
            ProfileView::Loaded(profile) => profile.primary_email().map(str::to_string),
            _ => None,
        };
        let email = email.ok_or(PanelError::NotLoaded)?;

        self.backend.delete_profile(&email).await?;
        tracing::info!("deleted backend profile");
        self.sign_out().await
    }

    pub async fn sign_out(&self) -> Result<(), PanelError> {
        self.set_view(ProfileView::NoData);
        match self.tokens.acquire(false).await {
            Some(token) => {
                self.tokens.revoke(&token).await?;
                tracing::info!("token revoked and deleted");
            }
            None => tracing::info!("no token to revoke"),
        }
        Ok(())
    }
}
