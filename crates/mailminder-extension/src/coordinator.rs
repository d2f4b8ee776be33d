use crate::{ActiveTab, CoordinatorError, HostPlatform};
use mailminder_core::{AccessToken, Envelope, ExtensionMessage, TabId};
use mailminder_email::MessageSource;
use mailminder_security::TokenProvider;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingFetch {
    ticket: u64,
    sender: oneshot::Sender<Option<String>>,
}

/// Process-wide router between the page, the panels and the Google APIs.
///
/// Each reply cycle waits for its message snippet on a signal registered for
/// the requesting tab. A second cycle on the same tab replaces the first
/// signal, which then resolves as "no snippet".
pub struct BackgroundCoordinator {
    tokens: Arc<dyn TokenProvider>,
    messages: Arc<dyn MessageSource>,
    host: Arc<dyn HostPlatform>,
    snippet_wait: Duration,
    pending: Mutex<HashMap<TabId, PendingFetch>>,
    next_ticket: AtomicU64,
}

impl BackgroundCoordinator {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        messages: Arc<dyn MessageSource>,
        host: Arc<dyn HostPlatform>,
        snippet_wait: Duration,
    ) -> Self {
        Self {
            tokens,
            messages,
            host,
            snippet_wait,
            pending: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Dispatches one inbound message.
    ///
    /// Only `checkAuthentication` produces a response; everything else
    /// resolves to `None` once its side effects are done.
    pub async fn handle(
        &self,
        envelope: Envelope,
    ) -> Result<Option<ExtensionMessage>, CoordinatorError> {
        let Envelope {
            sender_tab,
            message,
        } = envelope;
        tracing::debug!(action = message.kind().action(), ?sender_tab, "coordinator message");

        match message {
            ExtensionMessage::GetMessageDetails {
                message_id,
                access_token,
            } => {
                self.fetch_message(sender_tab, &message_id, &access_token)
                    .await;
                Ok(None)
            }
            ExtensionMessage::CheckAuthentication => {
                let status = self.authentication_status().await;
                if let Some(tab) = sender_tab {
                    self.host.send_to_tab(tab, status.clone())?;
                }
                Ok(Some(status))
            }
            ExtensionMessage::ExecuteOnClicker {
                selected_tone,
                generation,
            } => {
                tracing::debug!(?selected_tone, ?generation, "starting reply cycle");
                self.execute_on_clicker(generation).await?;
                Ok(None)
            }
            message @ (ExtensionMessage::ClickReplyButton
            | ExtensionMessage::SuggestedText { .. }
            | ExtensionMessage::CloseIframe
            | ExtensionMessage::OpenUserProfile { .. }
            | ExtensionMessage::ShowUserProfile { .. }) => {
                self.relay(message)?;
                Ok(None)
            }
            other => {
                tracing::debug!(action = other.kind().action(), "ignoring message");
                Ok(None)
            }
        }
    }

    async fn authentication_status(&self) -> ExtensionMessage {
        match self.tokens.acquire(false).await {
            Some(token) => ExtensionMessage::AuthenticationStatus {
                authenticated: true,
                token: Some(token),
            },
            None => ExtensionMessage::AuthenticationStatus {
                authenticated: false,
                token: None,
            },
        }
    }

    async fn fetch_message(&self, sender_tab: Option<TabId>, message_id: &str, token: &AccessToken) {
        let snippet = match self.messages.message_snippet(message_id, token).await {
            Ok(snippet) => snippet,
            Err(err) => {
                tracing::warn!("failed to fetch message details: {err}");
                None
            }
        };

        let tab = sender_tab.or_else(|| self.host.active_tab().map(|tab| tab.id));
        let Some(tab) = tab else {
            tracing::debug!("message details arrived without a tab");
            return;
        };

        let pending = self.lock_pending().remove(&tab);
        match pending {
            Some(pending) => {
                if pending.sender.send(snippet).is_err() {
                    tracing::debug!(%tab, "reply cycle stopped waiting for its snippet");
                }
            }
            None => tracing::debug!(%tab, "no reply cycle is waiting for a snippet"),
        }
    }

    async fn execute_on_clicker(&self, generation: Option<u64>) -> Result<(), CoordinatorError> {
        let token = self.tokens.acquire(true).await;
        let Some(ActiveTab { id: tab, .. }) = self.host.active_tab() else {
            tracing::warn!("no active tab for the reply cycle");
            return Ok(());
        };

        let Some(token) = token else {
            // Lets a waiting panel settle instead of loading forever.
            self.host.send_to_tab(
                tab,
                ExtensionMessage::ReceiveEmailText {
                    response: None,
                    generation,
                },
            )?;
            return Ok(());
        };

        let (ticket, receiver) = self.register_fetch(tab);
        self.host
            .send_to_tab(tab, ExtensionMessage::GetMessageText { token })?;
        self.host.send_to_tab(tab, ExtensionMessage::ClickReplyButton)?;

        let snippet = match tokio::time::timeout(self.snippet_wait, receiver).await {
            Ok(Ok(snippet)) => snippet,
            Ok(Err(_)) => {
                tracing::debug!(%tab, "reply cycle superseded");
                None
            }
            Err(_) => {
                tracing::warn!(%tab, "timed out waiting for message details");
                self.forget_fetch(tab, ticket);
                None
            }
        };

        self.host.send_to_tab(
            tab,
            ExtensionMessage::ReceiveEmailText {
                response: snippet,
                generation,
            },
        )
    }

    fn relay(&self, message: ExtensionMessage) -> Result<(), CoordinatorError> {
        match self.host.active_tab() {
            Some(tab) => self.host.send_to_tab(tab.id, message),
            None => {
                tracing::debug!(action = message.kind().action(), "no active tab to relay to");
                Ok(())
            }
        }
    }

    fn register_fetch(&self, tab: TabId) -> (u64, oneshot::Receiver<Option<String>>) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let stale = self
            .lock_pending()
            .insert(tab, PendingFetch { ticket, sender });
        if let Some(stale) = stale {
            let _ = stale.sender.send(None);
        }
        (ticket, receiver)
    }

    fn forget_fetch(&self, tab: TabId, ticket: u64) {
        let mut pending = self.lock_pending();
        if pending.get(&tab).is_some_and(|entry| entry.ticket == ticket) {
            pending.remove(&tab);
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<TabId, PendingFetch>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
