//! Error types for wr-session

use thiserror::Error;

/// Session layer error type
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("session logged out")]
    LoggedOut,

    #[error("credential persistence failed: {0}")]
    Credentials(#[from] std::io::Error),

    #[error("session event channel closed")]
    ChannelClosed,
}

/// Result type alias for wr-session
pub type Result<T> = std::result::Result<T, SessionError>;
