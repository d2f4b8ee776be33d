use crate::{PanelError, RuntimeChannel};
use mailminder_ai::{build_reply_prompt, ReplyGenerator};
use mailminder_backend::BackendClient;
use mailminder_core::{AccessToken, ExtensionMessage, StoredUser, SuggestionBatch, Tone, UsageDelta};
use mailminder_security::TokenProvider;
use mailminder_storage::LocalStore;
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub const PLAN_LIMIT_MESSAGE: &str = "Please update your plan to continue using the service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPhase {
    Idle,
    Loading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "suggestions", rename_all = "snake_case")]
pub enum ReplyView {
    Empty,
    Suggestions(SuggestionBatch),
    Unavailable,
    PlanLimit,
}

impl ReplyView {
    /// Text shown in place of suggestions, if the view has any.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            ReplyView::PlanLimit => Some(PLAN_LIMIT_MESSAGE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPanelState {
    pub tone: Tone,
    pub phase: ReplyPhase,
    pub view: ReplyView,
    pub generation: u64,
    /// Generation of the panel's own cycle request still waiting for its snippet.
    #[serde(skip)]
    awaiting: Option<u64>,
}

/// Which usage counters one generation cycle has charged so far.
#[derive(Debug, Clone, Copy, Default)]
struct Charges {
    plan: bool,
    profile: bool,
}

/// The reply suggestion panel shown over the compose box.
pub struct ReplyPanel {
    channel: Arc<dyn RuntimeChannel>,
    tokens: Arc<dyn TokenProvider>,
    backend: BackendClient,
    store: LocalStore,
    generator: ReplyGenerator,
    cost: UsageDelta,
    state: Mutex<ReplyPanelState>,
}

impl ReplyPanel {
    pub fn new(
        channel: Arc<dyn RuntimeChannel>,
        tokens: Arc<dyn TokenProvider>,
        backend: BackendClient,
        store: LocalStore,
        generator: ReplyGenerator,
    ) -> Self {
        Self {
            channel,
            tokens,
            backend,
            store,
            generator,
            cost: UsageDelta(3),
            state: Mutex::new(ReplyPanelState {
                tone: Tone::default(),
                phase: ReplyPhase::Loading,
                view: ReplyView::Empty,
                generation: 0,
                awaiting: None,
            }),
        }
    }

    pub fn with_generation_cost(mut self, cost: i64) -> Self {
        self.cost = UsageDelta(cost);
        self
    }

    pub fn state(&self) -> ReplyPanelState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplyPanelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn select_tone(&self, tone: Tone) {
        self.lock().tone = tone;
        self.reload().await;
    }

    /// Asks the coordinator for a fresh cycle in the current tone.
    pub async fn reload(&self) {
        let (tone, generation) = {
            let mut state = self.lock();
            state.phase = ReplyPhase::Loading;
            state.generation += 1;
            state.awaiting = Some(state.generation);
            (state.tone, state.generation)
        };

        let request = ExtensionMessage::ExecuteOnClicker {
            selected_tone: Some(tone),
            generation: Some(generation),
        };
        if let Err(err) = self.channel.send(request).await {
            tracing::warn!("failed to request a new reply cycle: {err}");
            let mut state = self.lock();
            state.phase = ReplyPhase::Idle;
            state.awaiting = None;
        }
    }

    pub async fn handle_message(&self, message: ExtensionMessage) {
        if let ExtensionMessage::ReceiveEmailText {
            response,
            generation,
        } = message
        {
            self.receive_email_text(response, generation).await;
        }
    }

    /// Runs one generation cycle for the delivered snippet.
    ///
    /// `cycle` is the generation the panel tagged its request with. Untagged
    /// snippets answer the page's own trigger and start a new generation,
    /// unless a tagged request is outstanding and has superseded them.
    pub async fn receive_email_text(&self, snippet: Option<String>, cycle: Option<u64>) {
        let (generation, tone) = {
            let mut state = self.lock();
            let current = match cycle {
                Some(cycle) => cycle == state.generation,
                None => state.awaiting.is_none(),
            };
            if !current {
                tracing::debug!(?cycle, generation = state.generation, "ignoring snippet for a superseded cycle");
                return;
            }
            match cycle {
                Some(_) => state.awaiting = None,
                None => state.generation += 1,
            }
            state.phase = ReplyPhase::Loading;
            (state.generation, state.tone)
        };

        let view = match snippet.filter(|text| !text.trim().is_empty()) {
            Some(snippet) => self.generate(&build_reply_prompt(&snippet, tone)).await,
            None => {
                tracing::info!("no message text to reply to");
                ReplyView::Unavailable
            }
        };

        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(generation, current = state.generation, "dropping superseded suggestions");
            return;
        }
        state.view = view;
        state.phase = ReplyPhase::Idle;
    }

    pub async fn choose(&self, index: usize) {
        let suggestion = match &self.lock().view {
            ReplyView::Suggestions(batch) => batch.get(index).map(str::to_string),
            _ => None,
        };
        let Some(suggestion) = suggestion else {
            tracing::debug!(index, "no suggestion to choose");
            return;
        };
        if let Err(err) = self
            .channel
            .send(ExtensionMessage::SuggestedText { suggestion })
            .await
        {
            tracing::warn!("failed to send the chosen suggestion: {err}");
        }
    }

    pub async fn close(&self) {
        if let Err(err) = self.channel.send(ExtensionMessage::CloseIframe).await {
            tracing::warn!("failed to close the panel: {err}");
        }
    }

    async fn generate(&self, prompt: &str) -> ReplyView {
        let Some(token) = self.tokens.acquire(true).await else {
            return ReplyView::Unavailable;
        };
        let user_id = match self.resolve_user(&token).await {
            Ok(user_id) => user_id,
            Err(err) => {
                tracing::warn!("could not resolve the signed-in user: {err}");
                return ReplyView::Unavailable;
            }
        };

        let mut charges = Charges::default();
        match self.backend.update_plan_api_count(&user_id, self.cost).await {
            Ok(usage) if usage.ok => charges.plan = true,
            Ok(usage) => {
                tracing::info!(message = ?usage.message, "plan usage limit reached");
                return ReplyView::PlanLimit;
            }
            Err(err) => {
                tracing::warn!("plan usage update failed: {err}");
                return ReplyView::Unavailable;
            }
        }

        match self.backend.update_profile_api_count(&user_id, self.cost).await {
            Ok(()) => charges.profile = true,
            Err(err) => tracing::warn!("profile usage update failed: {err}"),
        }

        match self.suggestions(&token, prompt).await {
            Ok(batch) => ReplyView::Suggestions(batch),
            Err(err) => {
                tracing::warn!("reply generation failed: {err}");
                self.refund(&user_id, charges).await;
                ReplyView::Unavailable
            }
        }
    }

    async fn suggestions(
        &self,
        token: &AccessToken,
        prompt: &str,
    ) -> Result<SuggestionBatch, PanelError> {
        let record = self.backend.register_session(token, true, 0).await?;
        self.store.save_user(&StoredUser::from_record(&record))?;
        Ok(self.generator.generate(prompt).await?)
    }

    async fn resolve_user(&self, token: &AccessToken) -> Result<String, PanelError> {
        if let Some(user) = self.store.user()? {
            return Ok(user.id);
        }
        let record = self.backend.register_session(token, true, 0).await?;
        self.store.save_user(&StoredUser::from_record(&record))?;
        Ok(record.id)
    }

    async fn refund(&self, user_id: &str, charges: Charges) {
        let refund = self.cost.compensation();
        if charges.plan {
            if let Err(err) = self.backend.update_plan_api_count(user_id, refund).await {
                tracing::error!("failed to refund plan usage: {err}");
            }
        }
        if charges.profile {
            if let Err(err) = self.backend.update_profile_api_count(user_id, refund).await {
                tracing::error!("failed to refund profile usage: {err}");
            }
        }
    }
}
