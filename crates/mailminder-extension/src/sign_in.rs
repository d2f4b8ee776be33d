use crate::RuntimeChannel;
use mailminder_core::ExtensionMessage;
use std::sync::Arc;

/// Overlay shown to signed-out users in place of the suggestions.
pub struct SignInPanel {
    channel: Arc<dyn RuntimeChannel>,
}

impl SignInPanel {
    pub fn new(channel: Arc<dyn RuntimeChannel>) -> Self {
        Self { channel }
    }

    pub async fn close(&self) {
        if let Err(err) = self.channel.send(ExtensionMessage::CloseIframe).await {
            tracing::warn!("failed to close the sign-in panel: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingChannel;

    #[tokio::test]
    async fn close_asks_the_page_to_hide_overlays() {
        let channel = Arc::new(RecordingChannel::signed_in(false));
        SignInPanel::new(channel.clone()).close().await;
        assert_eq!(channel.sent(), vec![ExtensionMessage::CloseIframe]);
    }
}
