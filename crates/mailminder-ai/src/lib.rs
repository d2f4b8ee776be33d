mod completion;
mod error;
mod generator;
mod prompt;

pub use completion::{ChatCompletionClient, CompletionClient, CompletionSettings};
pub use error::AiError;
pub use generator::ReplyGenerator;
pub use prompt::{build_reply_prompt, TONE_PLACEHOLDER};
