use crate::{AiError, CompletionClient};
use mailminder_core::SuggestionBatch;
use std::sync::Arc;

/// Produces a batch of three independent reply candidates for one prompt.
#[derive(Clone)]
pub struct ReplyGenerator {
    client: Arc<dyn CompletionClient>,
}

impl ReplyGenerator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Issues the three completions concurrently.
    ///
    /// The batch is all-or-nothing: one absent, blank or failed candidate
    /// fails the whole cycle even if the other two succeeded.
    pub async fn generate(&self, prompt: &str) -> Result<SuggestionBatch, AiError> {
        let (first, second, third) = tokio::join!(
            self.client.complete(prompt),
            self.client.complete(prompt),
            self.client.complete(prompt),
        );

        let candidates = [first?, second?, third?];
        SuggestionBatch::from_candidates(candidates).map_err(|received| {
            tracing::warn!(received, "discarding incomplete suggestion batch");
            AiError::IncompleteBatch { received }
        })
    }
}
