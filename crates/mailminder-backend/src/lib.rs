mod client;
mod error;
mod feedback;

pub use client::{BackendClient, UsageResponse};
pub use error::BackendError;
pub use feedback::{FeedbackAccount, FeedbackClient};
