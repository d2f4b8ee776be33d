use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("keychain error: {0}")]
    Keychain(#[from] keyring::Error),
    #[error("oauth error: {0}")]
    OAuth(String),
    #[error("consent flow is not configured")]
    ConsentUnavailable,
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token cache entry is corrupt: {0}")]
    Json(#[from] serde_json::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
