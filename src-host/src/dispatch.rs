use crate::native::{InboundFrame, NativeMessagingHost};
use crate::panels::{PanelCommand, PanelRegistry};
use mailminder_core::{Envelope, ExtensionMessage, TabId};
use mailminder_extension::BackgroundCoordinator;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Routes inbound frames to the coordinator or the panels.
///
/// Every handled frame gets its own task, so a reply cycle can wait for
/// frames that arrive after it.
pub struct Dispatcher {
    coordinator: Arc<BackgroundCoordinator>,
    panels: Arc<PanelRegistry>,
    host: Arc<NativeMessagingHost>,
}

impl Dispatcher {
    pub fn new(
        coordinator: Arc<BackgroundCoordinator>,
        panels: Arc<PanelRegistry>,
        host: Arc<NativeMessagingHost>,
    ) -> Self {
        Self {
            coordinator,
            panels,
            host,
        }
    }

    pub fn dispatch(&self, body: &str) -> Option<JoinHandle<()>> {
        let frame: InboundFrame = match serde_json::from_str(body) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("skipping malformed frame: {err}");
                return None;
            }
        };
        self.host.observe(&frame);

        match (frame.message, frame.panel) {
            (Some(message), None) => self.runtime_message(frame.sender_tab, frame.request_id, message),
            (None, Some(command)) => self.panel_command(frame.sender_tab, frame.request_id, command),
            _ => {
                tracing::warn!("frame must carry exactly one of message or panel");
                if let Some(id) = frame.request_id {
                    self.host.reply(id, None);
                }
                None
            }
        }
    }

    fn runtime_message(
        &self,
        sender_tab: Option<TabId>,
        request_id: Option<u64>,
        message: serde_json::Value,
    ) -> Option<JoinHandle<()>> {
        let message = match ExtensionMessage::from_value(message) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("rejecting message: {err}");
                if let Some(id) = request_id {
                    self.host.reply(id, None);
                }
                return None;
            }
        };

        let coordinator = self.coordinator.clone();
        let host = self.host.clone();
        let envelope = Envelope::new(sender_tab, message);
        Some(tokio::spawn(async move {
            let action = envelope.message.kind().action();
            let reply = match coordinator.handle(envelope).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(action, "coordinator failed to handle message: {err}");
                    None
                }
            };
            if let Some(id) = request_id {
                host.reply(id, reply);
            }
        }))
    }

    fn panel_command(
        &self,
        tab: Option<TabId>,
        request_id: Option<u64>,
        command: serde_json::Value,
    ) -> Option<JoinHandle<()>> {
        let command: PanelCommand = match serde_json::from_value(command) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!("rejecting panel command: {err}");
                self.host
                    .panel_update(request_id, tab, Err(format!("unknown panel command: {err}")));
                return None;
            }
        };

        let panels = self.panels.clone();
        let host = self.host.clone();
        Some(tokio::spawn(async move {
            let outcome = panels.run(tab, command).await.map_err(|err| {
                tracing::warn!("panel command failed: {err}");
                err.to_string()
            });
            if request_id.is_some() || !matches!(outcome, Ok(None)) {
                host.panel_update(request_id, tab, outcome);
            }
        }))
    }

    /// Feeds a coordinator message to the tab's reply panel and pushes its new state.
    pub fn deliver_to_panel(&self, tab: TabId, message: ExtensionMessage) -> JoinHandle<()> {
        let panels = self.panels.clone();
        let host = self.host.clone();
        tokio::spawn(async move {
            let snapshot = panels.deliver(tab, message).await;
            host.panel_update(None, Some(tab), Ok(Some(snapshot)));
        })
    }
}
