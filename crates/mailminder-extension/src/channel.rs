use crate::{BackgroundCoordinator, CoordinatorError};
use async_trait::async_trait;
use mailminder_core::{Envelope, ExtensionMessage, TabId};
use std::sync::Arc;

/// How the page and the panels talk to the background coordinator.
#[async_trait]
pub trait RuntimeChannel: Send + Sync {
    /// Fire-and-forget delivery.
    async fn send(&self, message: ExtensionMessage) -> Result<(), CoordinatorError>;

    /// Delivery that waits for the coordinator's answer, if it has one.
    async fn request(
        &self,
        message: ExtensionMessage,
    ) -> Result<Option<ExtensionMessage>, CoordinatorError>;
}

/// In-process channel bound to the coordinator, sending on behalf of one tab.
#[derive(Clone)]
pub struct CoordinatorChannel {
    coordinator: Arc<BackgroundCoordinator>,
    sender_tab: Option<TabId>,
}

impl CoordinatorChannel {
    pub fn new(coordinator: Arc<BackgroundCoordinator>, sender_tab: Option<TabId>) -> Self {
        Self {
            coordinator,
            sender_tab,
        }
    }
}

#[async_trait]
impl RuntimeChannel for CoordinatorChannel {
    async fn send(&self, message: ExtensionMessage) -> Result<(), CoordinatorError> {
        // A reply cycle waits on messages the sender posts later, so the
        // sender must not wait for it.
        let coordinator = self.coordinator.clone();
        let envelope = Envelope::new(self.sender_tab, message);
        tokio::spawn(async move {
            let action = envelope.message.kind().action();
            if let Err(err) = coordinator.handle(envelope).await {
                tracing::warn!(action, "coordinator failed to handle message: {err}");
            }
        });
        Ok(())
    }

    async fn request(
        &self,
        message: ExtensionMessage,
    ) -> Result<Option<ExtensionMessage>, CoordinatorError> {
        self.coordinator
            .handle(Envelope::new(self.sender_tab, message))
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records what was sent and answers auth checks with a fixed status.
    #[derive(Default)]
    pub(crate) struct RecordingChannel {
        pub authenticated: bool,
        pub sent: Mutex<Vec<ExtensionMessage>>,
    }

    impl RecordingChannel {
        pub fn signed_in(authenticated: bool) -> Self {
            Self {
                authenticated,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn sent(&self) -> Vec<ExtensionMessage> {
            self.sent.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl RuntimeChannel for RecordingChannel {
        async fn send(&self, message: ExtensionMessage) -> Result<(), CoordinatorError> {
            self.sent.lock().expect("lock").push(message);
            Ok(())
        }

        async fn request(
            &self,
            message: ExtensionMessage,
        ) -> Result<Option<ExtensionMessage>, CoordinatorError> {
            match message {
                ExtensionMessage::CheckAuthentication => {
                    Ok(Some(ExtensionMessage::AuthenticationStatus {
                        authenticated: self.authenticated,
                        token: None,
                    }))
                }
                other => {
                    self.sent.lock().expect("lock").push(other);
                    Ok(None)
                }
            }
        }
    }
}
