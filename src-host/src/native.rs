use crate::panels::PanelSnapshot;
use mailminder_core::{ExtensionMessage, TabId};
use mailminder_extension::{ActiveTab, CoordinatorError, HostPlatform};
use mailminder_security::UrlLauncher;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A frame posted by the extension's service worker.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(default)]
    pub sender_tab: Option<TabId>,
    #[serde(default)]
    pub active_tab: Option<TabId>,
    #[serde(default)]
    pub active_url: Option<String>,
    #[serde(default)]
    pub request_id: Option<u64>,
    /// Runtime message for the coordinator.
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    /// Command for one of the panels.
    #[serde(default)]
    pub panel: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    Tab(TabId),
    OpenTab(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    Deliver {
        target: Target,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<ExtensionMessage>,
    },
    Reply {
        #[serde(rename = "requestId")]
        request_id: u64,
        reply: Option<ExtensionMessage>,
    },
    PanelUpdate {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
        panel: Option<PanelSnapshot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// A coordinator message addressed to a panel the host runs for `tab`.
pub type PanelDelivery = (TabId, ExtensionMessage);

/// Browser side of the coordinator, reached over stdout.
///
/// `receiveEmailText` is consumed by the host's own reply panel and never
/// written to the browser when a panel inbox is attached.
pub struct NativeMessagingHost {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    panel_inbox: Option<mpsc::UnboundedSender<PanelDelivery>>,
    active: Mutex<Option<ActiveTab>>,
    resource_root: String,
}

impl NativeMessagingHost {
    /// `resource_root` is the extension origin, e.g. `chrome-extension://<id>/`.
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>, resource_root: impl Into<String>) -> Self {
        Self {
            outbound,
            panel_inbox: None,
            active: Mutex::new(None),
            resource_root: resource_root.into(),
        }
    }

    pub fn with_panel_inbox(mut self, inbox: mpsc::UnboundedSender<PanelDelivery>) -> Self {
        self.panel_inbox = Some(inbox);
        self
    }

    /// Tracks the focused tab the browser reports alongside each frame.
    pub fn observe(&self, frame: &InboundFrame) {
        if let Some(id) = frame.active_tab {
            *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(ActiveTab {
                id,
                url: frame.active_url.clone(),
            });
        }
    }

    pub fn reply(&self, request_id: u64, reply: Option<ExtensionMessage>) {
        if self
            .post(OutboundFrame::Reply { request_id, reply })
            .is_err()
        {
            tracing::warn!(request_id, "dropping reply, output closed");
        }
    }

    pub fn panel_update(
        &self,
        request_id: Option<u64>,
        tab: Option<TabId>,
        outcome: Result<Option<PanelSnapshot>, String>,
    ) {
        let (panel, error) = match outcome {
            Ok(panel) => (panel, None),
            Err(error) => (None, Some(error)),
        };
        let frame = OutboundFrame::PanelUpdate {
            request_id,
            tab,
            panel,
            error,
        };
        if self.post(frame).is_err() {
            tracing::warn!(?request_id, "dropping panel update, output closed");
        }
    }

    fn post(&self, frame: OutboundFrame) -> Result<(), CoordinatorError> {
        self.outbound
            .send(frame)
            .map_err(|_| CoordinatorError::HostClosed)
    }
}

impl HostPlatform for NativeMessagingHost {
    fn active_tab(&self) -> Option<ActiveTab> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn send_to_tab(&self, tab: TabId, message: ExtensionMessage) -> Result<(), CoordinatorError> {
        if matches!(message, ExtensionMessage::ReceiveEmailText { .. }) {
            if let Some(inbox) = &self.panel_inbox {
                return inbox
                    .send((tab, message))
                    .map_err(|_| CoordinatorError::HostClosed);
            }
        }
        self.post(OutboundFrame::Deliver {
            target: Target::Tab(tab),
            message: Some(message),
        })
    }

    fn open_tab(&self, url: &str, message: Option<ExtensionMessage>) -> Result<(), CoordinatorError> {
        self.post(OutboundFrame::Deliver {
            target: Target::OpenTab(url.to_string()),
            message,
        })
    }

    fn resource_url(&self, page: &str) -> String {
        format!("{}/{}", self.resource_root.trim_end_matches('/'), page)
    }
}

impl UrlLauncher for NativeMessagingHost {
    fn launch(&self, url: &str) {
        if let Err(err) = self.open_tab(url, None) {
            tracing::error!("cannot open the consent page: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailminder_core::AccessToken;
    use serde_json::json;

    fn frame(value: serde_json::Value) -> InboundFrame {
        serde_json::from_value(value).expect("frame")
    }

    #[test]
    fn outbound_frames_match_the_wire_shape() {
        let deliver = OutboundFrame::Deliver {
            target: Target::Tab(TabId(3)),
            message: Some(ExtensionMessage::GetMessageText {
                token: AccessToken::new("ya29.t"),
            }),
        };
        assert_eq!(
            serde_json::to_value(&deliver).expect("json"),
            json!({"target": {"tab": 3}, "message": {"action": "getMessageText", "token": "ya29.t"}})
        );

        let consent = OutboundFrame::Deliver {
            target: Target::OpenTab("https://accounts.google.com/o/oauth2/auth".into()),
            message: None,
        };
        assert_eq!(
            serde_json::to_value(&consent).expect("json"),
            json!({"target": {"openTab": "https://accounts.google.com/o/oauth2/auth"}})
        );

        let reply = OutboundFrame::Reply {
            request_id: 9,
            reply: None,
        };
        assert_eq!(
            serde_json::to_value(&reply).expect("json"),
            json!({"requestId": 9, "reply": null})
        );
    }

    #[test]
    fn active_tab_follows_inbound_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = NativeMessagingHost::new(tx, "chrome-extension://abc/");
        assert_eq!(host.active_tab(), None);

        host.observe(&frame(json!({
            "activeTab": 12,
            "activeUrl": "https://mail.google.com/mail/u/0/#inbox",
            "message": {"action": "clickReplyButton"}
        })));
        host.observe(&frame(json!({"panel": {"command": "reload"}})));
        assert_eq!(
            host.active_tab(),
            Some(ActiveTab {
                id: TabId(12),
                url: Some("https://mail.google.com/mail/u/0/#inbox".into()),
            })
        );

        assert_eq!(
            host.resource_url("tabInfoModel.html"),
            "chrome-extension://abc/tabInfoModel.html"
        );

        host.launch("https://accounts.google.com/consent");
        assert_eq!(
            rx.try_recv().expect("frame"),
            OutboundFrame::Deliver {
                target: Target::OpenTab("https://accounts.google.com/consent".into()),
                message: None,
            }
        );
    }

    #[test]
    fn email_text_goes_to_the_panel_inbox() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel();
        let host = NativeMessagingHost::new(tx, "").with_panel_inbox(inbox_tx);

        let text = ExtensionMessage::ReceiveEmailText {
            response: Some("Lunch?".into()),
            generation: Some(3),
        };
        host.send_to_tab(TabId(4), text.clone()).expect("routed");
        host.send_to_tab(TabId(4), ExtensionMessage::ClickReplyButton)
            .expect("posted");

        assert_eq!(inbox_rx.try_recv().expect("delivery"), (TabId(4), text));
        assert_eq!(
            rx.try_recv().expect("frame"),
            OutboundFrame::Deliver {
                target: Target::Tab(TabId(4)),
                message: Some(ExtensionMessage::ClickReplyButton),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn panel_updates_carry_state_or_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = NativeMessagingHost::new(tx, "");
        host.panel_update(Some(2), None, Err("not signed in".into()));

        let frame = rx.try_recv().expect("frame");
        assert_eq!(
            serde_json::to_value(&frame).expect("json"),
            json!({"requestId": 2, "panel": null, "error": "not signed in"})
        );
    }

    #[test]
    fn closed_output_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let host = NativeMessagingHost::new(tx, "");
        assert!(matches!(
            host.send_to_tab(TabId(1), ExtensionMessage::CloseIframe),
            Err(CoordinatorError::HostClosed)
        ));
    }
}
