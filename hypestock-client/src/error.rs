use std::time::Duration;
use thiserror::Error;

/// All errors surfaced by the dashboard client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("socket disconnected, cannot issue request")]
    NotConnected,

    #[error("no response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("frame codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("pending request resolved with an unexpected frame")]
    UnexpectedFrame,
}

impl ClientError {
    /// True for the local-timeout outcome of a pending request.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::ResponseTimeout(_))
    }

    /// True when the failure means the live connection is unusable.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, ClientError::NotConnected | ClientError::Transport(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
