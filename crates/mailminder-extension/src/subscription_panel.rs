use crate::PanelError;
use mailminder_backend::BackendClient;
use mailminder_core::PlanTitle;
use mailminder_email::ProfileSource;
use mailminder_security::TokenProvider;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionView {
    Loading,
    NoData,
    Loaded {
        user_id: String,
        plan: Option<PlanTitle>,
    },
}

/// One entry of the plan catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanOffer {
    pub title: PlanTitle,
    pub price: &'static str,
    pub features: &'static [&'static str],
    pub current: bool,
}

pub struct SubscriptionPanel {
    tokens: Arc<dyn TokenProvider>,
    people: Arc<dyn ProfileSource>,
    backend: BackendClient,
    view: Mutex<SubscriptionView>,
}

impl SubscriptionPanel {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        people: Arc<dyn ProfileSource>,
        backend: BackendClient,
    ) -> Self {
        Self {
            tokens,
            people,
            backend,
            view: Mutex::new(SubscriptionView::Loading),
        }
    }

    pub fn view(&self) -> SubscriptionView {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SubscriptionView> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_plan(&self) -> Option<PlanTitle> {
        match &*self.lock() {
            SubscriptionView::Loaded { plan, .. } => *plan,
            _ => None,
        }
    }

    pub fn catalogue(&self) -> Vec<PlanOffer> {
        let current = self.current_plan();
        PlanTitle::ALL
            .into_iter()
            .map(|title| PlanOffer {
                title,
                price: title.price_label(),
                features: title.features(),
                current: current == Some(title),
            })
            .collect()
    }

    pub async fn load(&self) {
        *self.lock() = SubscriptionView::Loading;
        let view = match self.fetch().await {
            Ok(view) => view,
            Err(err) => {
                tracing::warn!("failed to load the subscription: {err}");
                SubscriptionView::NoData
            }
        };
        *self.lock() = view;
    }

    async fn fetch(&self) -> Result<SubscriptionView, PanelError> {
        let token = self
            .tokens
            .acquire(true)
            .await
            .ok_or(PanelError::NotSignedIn)?;
        let identity = self.people.me(&token).await?;
        let email = identity.primary_email().ok_or(PanelError::NotLoaded)?;
        let record = self.backend.profile_by_email(email, &token).await?;
        let plan = self.backend.subscription(&record.id, &token).await?;
        Ok(SubscriptionView::Loaded {
            user_id: record.id,
            plan,
        })
    }

    /// Switches to `plan`. Returns `false` when it already is the current plan.
    pub async fn select_plan(&self, plan: PlanTitle) -> Result<bool, PanelError> {
        let user_id = match &*self.lock() {
            SubscriptionView::Loaded { plan: Some(current), .. } if *current == plan => {
                return Ok(false);
            }
            SubscriptionView::Loaded { user_id, .. } => user_id.clone(),
            _ => return Err(PanelError::NotLoaded),
        };

        let selected = self.backend.select_plan(&user_id, plan).await?;
        tracing::info!(plan = %selected, "subscription changed");
        *self.lock() = SubscriptionView::Loaded {
            user_id,
            plan: Some(selected),
        };
        Ok(true)
    }
}
