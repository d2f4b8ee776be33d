use mailminder_core::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("host connection closed")]
    HostClosed,
    #[error("host error: {0}")]
    Host(String),
    #[error("message error: {0}")]
    Message(#[from] MessageError),
}

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("panel has no loaded data")]
    NotLoaded,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("security error: {0}")]
    Security(#[from] mailminder_security::SecurityError),
    #[error("google api error: {0}")]
    Email(#[from] mailminder_email::EmailError),
    #[error("backend error: {0}")]
    Backend(#[from] mailminder_backend::BackendError),
    #[error("storage error: {0}")]
    Storage(#[from] mailminder_storage::StorageError),
    #[error("ai error: {0}")]
    Ai(#[from] mailminder_ai::AiError),
    #[error("runtime channel error: {0}")]
    Channel(#[from] CoordinatorError),
}
