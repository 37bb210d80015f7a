//! Room lifecycle management for Quizforge.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! roster, score ledger, and question cursor. Everything outside a room
//! talks to it through [`RoomManager`].
//!
//! # Key types
//!
//! - [`RoomManager`]: creates/closes rooms, routes players, recovers
//!   rooms from the store
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Player`] / [`PlayerLink`]: a room member and its live connection
//! - [`ScoreLedger`]: scores and leaderboard ranking
//! - [`QuestionSource`]: where `loadQuestions` gets its questions

mod error;
mod ledger;
mod manager;
mod player;
mod questions;
mod room;

pub use error::RoomError;
pub use ledger::ScoreLedger;
pub use manager::{FIRST_ROOM_ID, RoomManager};
pub use player::{Player, PlayerLink, PlayerSender, START_POSITION};
pub use questions::{JsonFileQuestions, QuestionError, QuestionSource, StaticQuestions};
pub use room::{
    HostAction, JoinOutcome, JoinRequest, ROOM_CLOSED_NOTICE, RoomHandle, RoomInfo, ScoreOutcome,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
