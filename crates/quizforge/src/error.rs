//! Unified error type for the Quizforge server.

use quizforge_protocol::ProtocolError;
use quizforge_room::{QuestionError, RoomError};
use quizforge_session::SessionError;
use quizforge_store::StoreError;
use quizforge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The durable store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A room-level error (not found, name taken, not the host, ...).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A connection-registry error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The question source failed.
    #[error(transparent)]
    Questions(#[from] QuestionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
