use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserdError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Resource purge failed: {0}")]
    ResourcePurge(String),

    #[error("Usage fetch failed: {0}")]
    UsageFetch(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BrowserdError>;
