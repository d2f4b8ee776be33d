//! Panel state machines the extension pages drive over native messaging.
//!
//! Overlay pages post a `panel` command with their tab id and render the
//! snapshot that comes back. The reply panel also receives the coordinator's
//! `receiveEmailText` for its tab and pushes the resulting state unprompted.

use mailminder_ai::ReplyGenerator;
use mailminder_backend::BackendClient;
use mailminder_core::{ExtensionMessage, PlanTitle, TabId, Tone};
use mailminder_email::ProfileSource;
use mailminder_extension::{
    BackgroundCoordinator, CoordinatorChannel, PanelError, PlanOffer, Popup, PopupState,
    PopupView, ProfilePanel, ProfileView, ReplyPanel, ReplyPanelState, SignInPanel,
    SubscriptionPanel, SubscriptionView,
};
use mailminder_security::TokenProvider;
use mailminder_storage::LocalStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelCommand {
    SelectTone { tone: Tone },
    Reload,
    ChooseSuggestion { index: usize },
    CloseReply,
    LoadProfile,
    DeleteAccount,
    SignOut,
    LoadSubscription,
    SelectPlan { plan: PlanTitle },
    CloseSignIn,
    OpenPopup,
    ProfileClicked,
    Logout,
    Navigate { view: PopupView },
    SendFeedback { name: String, feedback: String },
}

impl PanelCommand {
    fn needs_tab(&self) -> bool {
        !matches!(
            self,
            PanelCommand::OpenPopup
                | PanelCommand::ProfileClicked
                | PanelCommand::Logout
                | PanelCommand::Navigate { .. }
                | PanelCommand::SendFeedback { .. }
        )
    }
}

/// What a page renders after a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", content = "state", rename_all = "camelCase")]
pub enum PanelSnapshot {
    Reply(ReplyPanelState),
    Profile(ProfileView),
    Subscription {
        view: SubscriptionView,
        plans: Vec<PlanOffer>,
    },
    Popup(PopupState),
}

/// Clients every panel instance shares.
#[derive(Clone)]
pub struct PanelServices {
    pub coordinator: Arc<BackgroundCoordinator>,
    pub tokens: Arc<dyn TokenProvider>,
    pub people: Arc<dyn ProfileSource>,
    pub backend: BackendClient,
    pub store: LocalStore,
    pub generator: ReplyGenerator,
    pub generation_cost: i64,
}

/// The overlays that live in one Gmail tab.
pub struct TabPanels {
    reply: ReplyPanel,
    profile: ProfilePanel,
    subscription: SubscriptionPanel,
    sign_in: SignInPanel,
}

impl TabPanels {
    fn new(services: &PanelServices, tab: TabId) -> Self {
        let channel = Arc::new(CoordinatorChannel::new(
            services.coordinator.clone(),
            Some(tab),
        ));
        Self {
            reply: ReplyPanel::new(
                channel.clone(),
                services.tokens.clone(),
                services.backend.clone(),
                services.store.clone(),
                services.generator.clone(),
            )
            .with_generation_cost(services.generation_cost),
            profile: ProfilePanel::new(
                services.tokens.clone(),
                services.people.clone(),
                services.backend.clone(),
            ),
            subscription: SubscriptionPanel::new(
                services.tokens.clone(),
                services.people.clone(),
                services.backend.clone(),
            ),
            sign_in: SignInPanel::new(channel),
        }
    }

    fn subscription_snapshot(&self) -> PanelSnapshot {
        PanelSnapshot::Subscription {
            view: self.subscription.view(),
            plans: self.subscription.catalogue(),
        }
    }
}

pub struct PanelRegistry {
    services: PanelServices,
    popup: Popup,
    tabs: Mutex<HashMap<TabId, Arc<TabPanels>>>,
}

impl PanelRegistry {
    pub fn new(services: PanelServices, popup: Popup) -> Self {
        Self {
            services,
            popup,
            tabs: Mutex::new(HashMap::new()),
        }
    }

    fn tab(&self, tab: TabId) -> Arc<TabPanels> {
        self.tabs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tab)
            .or_insert_with(|| {
                tracing::debug!(%tab, "creating panels for tab");
                Arc::new(TabPanels::new(&self.services, tab))
            })
            .clone()
    }

    /// Runs one page command. `None` means the page has nothing left to render.
    pub async fn run(
        &self,
        tab: Option<TabId>,
        command: PanelCommand,
    ) -> Result<Option<PanelSnapshot>, PanelError> {
        let panels = match tab {
            Some(tab) => Some(self.tab(tab)),
            None if command.needs_tab() => {
                return Err(PanelError::Invalid("panel command needs a sender tab"));
            }
            None => None,
        };

        let snapshot = match (command, panels) {
            (PanelCommand::OpenPopup, _) => {
                self.popup.open().await;
                PanelSnapshot::Popup(self.popup.state())
            }
            (PanelCommand::ProfileClicked, _) => {
                self.popup.profile_clicked().await?;
                PanelSnapshot::Popup(self.popup.state())
            }
            (PanelCommand::Logout, _) => {
                self.popup.logout().await?;
                PanelSnapshot::Popup(self.popup.state())
            }
            (PanelCommand::Navigate { view }, _) => {
                self.popup.navigate(view);
                PanelSnapshot::Popup(self.popup.state())
            }
            (PanelCommand::SendFeedback { name, feedback }, _) => {
                self.popup.send_feedback(&name, &feedback).await?;
                PanelSnapshot::Popup(self.popup.state())
            }
            (_, None) => return Err(PanelError::Invalid("panel command needs a sender tab")),
            (command, Some(panels)) => return self.run_in_tab(&panels, command).await,
        };
        Ok(Some(snapshot))
    }

    async fn run_in_tab(
        &self,
        panels: &TabPanels,
        command: PanelCommand,
    ) -> Result<Option<PanelSnapshot>, PanelError> {
        let reply = |panels: &TabPanels| Some(PanelSnapshot::Reply(panels.reply.state()));
        match command {
            PanelCommand::SelectTone { tone } => {
                panels.reply.select_tone(tone).await;
                Ok(reply(panels))
            }
            PanelCommand::Reload => {
                panels.reply.reload().await;
                Ok(reply(panels))
            }
            PanelCommand::ChooseSuggestion { index } => {
                panels.reply.choose(index).await;
                Ok(reply(panels))
            }
            PanelCommand::CloseReply => {
                panels.reply.close().await;
                Ok(None)
            }
            PanelCommand::LoadProfile => {
                panels.profile.load().await;
                Ok(Some(PanelSnapshot::Profile(panels.profile.view())))
            }
            PanelCommand::DeleteAccount => {
                panels.profile.delete_account().await?;
                Ok(Some(PanelSnapshot::Profile(panels.profile.view())))
            }
            PanelCommand::SignOut => {
                panels.profile.sign_out().await?;
                Ok(Some(PanelSnapshot::Profile(panels.profile.view())))
            }
            PanelCommand::LoadSubscription => {
                panels.subscription.load().await;
                Ok(Some(panels.subscription_snapshot()))
            }
            PanelCommand::SelectPlan { plan } => {
                let changed = panels.subscription.select_plan(plan).await?;
                tracing::info!(plan = plan.as_str(), changed, "plan selection handled");
                Ok(Some(panels.subscription_snapshot()))
            }
            PanelCommand::CloseSignIn => {
                panels.sign_in.close().await;
                Ok(None)
            }
            popup => {
                tracing::debug!(?popup, "popup command reached a tab");
                Ok(None)
            }
        }
    }

    /// Hands a coordinator message meant for the tab's reply panel to it.
    pub async fn deliver(&self, tab: TabId, message: ExtensionMessage) -> PanelSnapshot {
        let panels = self.tab(tab);
        panels.reply.handle_message(message).await;
        PanelSnapshot::Reply(panels.reply.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_page_json() {
        let parse = |value: serde_json::Value| serde_json::from_value::<PanelCommand>(value);

        assert_eq!(
            parse(serde_json::json!({"command": "selectTone", "tone": "professional"})).expect("tone"),
            PanelCommand::SelectTone {
                tone: Tone::Professional
            }
        );
        assert_eq!(
            parse(serde_json::json!({"command": "selectPlan", "plan": "yearly"})).expect("plan"),
            PanelCommand::SelectPlan {
                plan: PlanTitle::Yearly
            }
        );
        assert_eq!(
            parse(serde_json::json!({"command": "navigate", "view": "feedback"})).expect("view"),
            PanelCommand::Navigate {
                view: PopupView::Feedback
            }
        );
        assert!(parse(serde_json::json!({"command": "launchRockets"})).is_err());
        assert!(!PanelCommand::SendFeedback {
            name: "Ada".into(),
            feedback: "hi".into()
        }
        .needs_tab());
        assert!(PanelCommand::Reload.needs_tab());
    }
}
