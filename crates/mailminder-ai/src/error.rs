use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("completion batch incomplete: {received} of 3 suggestions usable")]
    IncompleteBatch { received: usize },
}
