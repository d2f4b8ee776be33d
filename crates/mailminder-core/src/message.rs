//! Closed message taxonomy exchanged between the page, the panels and the
//! background coordinator.
//!
//! On the wire every message is a JSON object tagged by its `action` field,
//! matching what the browser side of the extension posts.

use crate::{AccessToken, TabId, Tone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no `action` field")]
    MissingAction,
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("malformed `{action}` payload: {source}")]
    Payload {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid `{action}` payload: {reason}")]
    Invalid { action: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    CheckAuthentication,
    AuthenticationStatus {
        authenticated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<AccessToken>,
    },
    ExecuteOnClicker {
        #[serde(rename = "selectedTone", default, skip_serializing_if = "Option::is_none")]
        selected_tone: Option<Tone>,
        /// Reply panel cycle number, echoed on the matching `receiveEmailText`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<u64>,
    },
    GetMessageDetails {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "accessToken")]
        access_token: AccessToken,
    },
    GetMessageText {
        token: AccessToken,
    },
    ReceiveEmailText {
        #[serde(default)]
        response: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<u64>,
    },
    ClickReplyButton,
    SuggestedText {
        suggestion: String,
    },
    CloseIframe,
    OpenUserProfile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<AccessToken>,
    },
    ShowUserProfile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<AccessToken>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    CheckAuthentication,
    AuthenticationStatus,
    ExecuteOnClicker,
    GetMessageDetails,
    GetMessageText,
    ReceiveEmailText,
    ClickReplyButton,
    SuggestedText,
    CloseIframe,
    OpenUserProfile,
    ShowUserProfile,
}

impl MessageKind {
    pub const ALL: [MessageKind; 11] = [
        MessageKind::CheckAuthentication,
        MessageKind::AuthenticationStatus,
        MessageKind::ExecuteOnClicker,
        MessageKind::GetMessageDetails,
        MessageKind::GetMessageText,
        MessageKind::ReceiveEmailText,
        MessageKind::ClickReplyButton,
        MessageKind::SuggestedText,
        MessageKind::CloseIframe,
        MessageKind::OpenUserProfile,
        MessageKind::ShowUserProfile,
    ];

    pub fn action(self) -> &'static str {
        match self {
            MessageKind::CheckAuthentication => "checkAuthentication",
            MessageKind::AuthenticationStatus => "authenticationStatus",
            MessageKind::ExecuteOnClicker => "executeOnClicker",
            MessageKind::GetMessageDetails => "getMessageDetails",
            MessageKind::GetMessageText => "getMessageText",
            MessageKind::ReceiveEmailText => "receiveEmailText",
            MessageKind::ClickReplyButton => "clickReplyButton",
            MessageKind::SuggestedText => "suggestedText",
            MessageKind::CloseIframe => "closeIframe",
            MessageKind::OpenUserProfile => "openUserProfile",
            MessageKind::ShowUserProfile => "showUserProfile",
        }
    }

    pub fn from_action(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.action() == action)
    }
}

impl ExtensionMessage {
    /// Parses and validates a message received from the browser side.
    pub fn from_value(value: serde_json::Value) -> Result<Self, MessageError> {
        let object = value.as_object().ok_or(MessageError::NotAnObject)?;
        let action = object
            .get("action")
            .and_then(serde_json::Value::as_str)
            .ok_or(MessageError::MissingAction)?
            .to_string();
        if MessageKind::from_action(&action).is_none() {
            return Err(MessageError::UnknownAction(action));
        }

        let message: ExtensionMessage = serde_json::from_value(value)
            .map_err(|source| MessageError::Payload { action, source })?;
        message.validate()?;
        Ok(message)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ExtensionMessage::CheckAuthentication => MessageKind::CheckAuthentication,
            ExtensionMessage::AuthenticationStatus { .. } => MessageKind::AuthenticationStatus,
            ExtensionMessage::ExecuteOnClicker { .. } => MessageKind::ExecuteOnClicker,
            ExtensionMessage::GetMessageDetails { .. } => MessageKind::GetMessageDetails,
            ExtensionMessage::GetMessageText { .. } => MessageKind::GetMessageText,
            ExtensionMessage::ReceiveEmailText { .. } => MessageKind::ReceiveEmailText,
            ExtensionMessage::ClickReplyButton => MessageKind::ClickReplyButton,
            ExtensionMessage::SuggestedText { .. } => MessageKind::SuggestedText,
            ExtensionMessage::CloseIframe => MessageKind::CloseIframe,
            ExtensionMessage::OpenUserProfile { .. } => MessageKind::OpenUserProfile,
            ExtensionMessage::ShowUserProfile { .. } => MessageKind::ShowUserProfile,
        }
    }

    fn validate(&self) -> Result<(), MessageError> {
        match self {
            ExtensionMessage::GetMessageDetails {
                message_id,
                access_token,
            } => {
                if message_id.trim().is_empty() {
                    return Err(invalid(self.kind(), "messageId is empty"));
                }
                if access_token.is_blank() {
                    return Err(invalid(self.kind(), "accessToken is empty"));
                }
            }
            ExtensionMessage::GetMessageText { token } if token.is_blank() => {
                return Err(invalid(self.kind(), "token is empty"));
            }
            ExtensionMessage::AuthenticationStatus {
                authenticated: true,
                token: None,
            } => {
                return Err(invalid(self.kind(), "authenticated status without token"));
            }
            _ => {}
        }
        Ok(())
    }
}

fn invalid(kind: MessageKind, reason: &str) -> MessageError {
    MessageError::Invalid {
        action: kind.action(),
        reason: reason.to_string(),
    }
}

/// A message together with the tab it came from, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender_tab: Option<TabId>,
    pub message: ExtensionMessage,
}

impl Envelope {
    pub fn new(sender_tab: Option<TabId>, message: ExtensionMessage) -> Self {
        Self {
            sender_tab,
            message,
        }
    }

    pub fn from_runtime(message: ExtensionMessage) -> Self {
        Self::new(None, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_message_details_payload() {
        let message = ExtensionMessage::from_value(json!({
            "action": "getMessageDetails",
            "messageId": "18c2f",
            "accessToken": "ya29.token"
        }))
        .expect("valid message");

        assert_eq!(
            message,
            ExtensionMessage::GetMessageDetails {
                message_id: "18c2f".to_string(),
                access_token: AccessToken::new("ya29.token"),
            }
        );
    }

    #[test]
    fn action_tags_round_trip_through_kind() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_action(kind.action()), Some(kind));
        }
        let json = serde_json::to_value(ExtensionMessage::CloseIframe).expect("serialize");
        assert_eq!(json, json!({"action": "closeIframe"}));
    }

    #[test]
    fn rejects_unknown_and_untagged_messages() {
        assert!(matches!(
            ExtensionMessage::from_value(json!("")),
            Err(MessageError::NotAnObject)
        ));
        assert!(matches!(
            ExtensionMessage::from_value(json!({"token": "x"})),
            Err(MessageError::MissingAction)
        ));
        assert!(matches!(
            ExtensionMessage::from_value(json!({"action": "selfDestruct"})),
            Err(MessageError::UnknownAction(action)) if action == "selfDestruct"
        ));
    }

    #[test]
    fn rejects_blank_identifiers() {
        let err = ExtensionMessage::from_value(json!({
            "action": "getMessageDetails",
            "messageId": " ",
            "accessToken": "ya29.token"
        }))
        .expect_err("blank id rejected");
        assert!(matches!(err, MessageError::Invalid { action: "getMessageDetails", .. }));

        let err = ExtensionMessage::from_value(json!({"action": "suggestedText"}))
            .expect_err("missing suggestion rejected");
        assert!(matches!(err, MessageError::Payload { .. }));
    }

    #[test]
    fn execute_on_clicker_carries_optional_tone() {
        let message = ExtensionMessage::from_value(json!({
            "action": "executeOnClicker",
            "selectedTone": "impower"
        }))
        .expect("valid message");
        assert_eq!(
            message,
            ExtensionMessage::ExecuteOnClicker {
                selected_tone: Some(Tone::Empower),
                generation: None,
            }
        );
    }
}
