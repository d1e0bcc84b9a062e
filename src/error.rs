//! Error types for the Connect Four client.

use thiserror::Error;

use crate::board::MalformedBoard;
use crate::session::MoveDenied;

/// Errors that can occur when using the Connect Four client.
#[derive(Debug, Error)]
pub enum ConnectFourError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// An inbound payload could not be decoded into a protocol event.
    /// Undecodable payloads are dropped; the session continues.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    /// A board payload failed shape validation.
    #[error("malformed board: {0}")]
    Board(#[from] MalformedBoard),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A move was submitted while the session guard denies moves.
    /// The intent is logged and never transmitted.
    #[error("move not allowed: {0}")]
    MoveNotAllowed(#[from] MoveDenied),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A leaderboard request failed.
    #[cfg(feature = "leaderboard")]
    #[error("leaderboard request error: {0}")]
    Leaderboard(#[from] reqwest::Error),
}

/// A specialized [`Result`] type for Connect Four client operations.
pub type Result<T> = std::result::Result<T, ConnectFourError>;
