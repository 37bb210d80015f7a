//! Error types for the session layer.

use quizforge_transport::ConnectionId;

/// Errors raised by the connection registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection was never registered, or has already gone through
    /// the disconnect path.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}
