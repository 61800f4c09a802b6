//! Bot error types.

use gatebot_core::DecodeError;
use gatebot_session::{RequestError, SessionError};

/// Error from the bot lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Connection closed by gateway")]
    ConnectionClosed,
    #[error("Bot already started")]
    AlreadyStarted,
    #[error("Bot not started")]
    NotStarted,
    #[error("Bot stopped")]
    Stopped,
}

/// Error ending the connection reader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Error from a request helper.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),
    #[error("Gateway rejected request: code={code} {message}")]
    Rejected { code: i64, message: String },
    #[error("Malformed reply: {0}")]
    Malformed(String),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("No admin configured")]
    NoAdmin,
    #[error("Unable to know reply target for {0}")]
    NoReplyTarget(String),
}
