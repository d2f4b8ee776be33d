use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{context} failed with status {status}")]
    Status {
        context: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("invalid data: {0}")]
    Data(String),
}
