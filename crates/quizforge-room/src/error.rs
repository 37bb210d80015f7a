//! Error types for the room layer.
//!
//! The `Display` text of a `RoomError` is sent verbatim to clients in an
//! `error` message, so keep it short and player-facing.

use quizforge_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist, in memory or on disk.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room exists but no longer accepts players.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// Another player (with a different name) already holds this ID.
    #[error("player id {0} is already in use")]
    PlayerIdInUse(PlayerId),

    /// Another player already uses this display name.
    #[error("name {0} is already taken")]
    NameInUse(String),

    /// The player is not in this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// A host-only action was attempted by someone else.
    #[error("only the quiz master can do that")]
    NotQuizMaster,

    /// `startGame` with an empty (or exhausted) question list.
    #[error("no questions available, load questions first")]
    NoQuestions,

    /// `revealAnswer` while no question is showing.
    #[error("no question in progress")]
    NoActiveQuestion,

    /// The room's command channel is closed (the room is shutting down).
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
