use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{context} failed with status {status}")]
    Status {
        context: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("unexpected response: {0}")]
    Contract(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url {0} cannot take path segments")]
    BaseUrl(String),
}
