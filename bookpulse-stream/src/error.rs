use thiserror::Error;

/// All errors generated in `bookpulse-stream`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("failed to decode stream message: {0}")]
    Decode(String),

    #[error("websocket transport error: {0}")]
    Socket(String),

    #[error("control request failed: {0}")]
    Control(String),

    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("invalid endpoint url: {0}")]
    Url(String),
}

impl StreamError {
    /// Determine if an error ends the session (no further automatic recovery).
    ///
    /// Transport failures recover via the reconnect cycle and malformed
    /// messages are dropped in place, so neither is terminal on its own.
    pub fn is_terminal(&self) -> bool {
        match self {
            StreamError::ReconnectExhausted { .. } => true,
            StreamError::Url(_) => true,
            StreamError::Decode(_) | StreamError::Socket(_) | StreamError::Control(_) => false,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        match value {
            // A rejected endpoint URL cannot be fixed by retrying
            tokio_tungstenite::tungstenite::Error::Url(err) => Self::Url(err.to_string()),
            other => Self::Socket(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(value: reqwest::Error) -> Self {
        Self::Control(value.to_string())
    }
}
