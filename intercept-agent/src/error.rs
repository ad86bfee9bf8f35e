//! Error types for the agent

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for AgentError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AgentError::Browser(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
