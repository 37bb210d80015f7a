//! Wire protocol and shared quiz model for Quizforge.
//!
//! This crate defines the "language" that hosts, guests, and the server
//! speak, plus the data model every other layer shares:
//!
//! - **Identity** ([`PlayerId`], [`RoomId`]) and routing ([`Recipient`]).
//! - **Model** ([`Question`], [`GameState`], [`RoomSettings`],
//!   [`LeaderboardEntry`]): what a room knows about its quiz.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the typed
//!   records that travel on the wire, each tagged with a `type` field.
//! - **Validation** ([`sanitize_input`], [`is_valid_player_name`],
//!   [`clamp_coordinate`]): input cleanup applied before dispatch.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]).
//!
//! The protocol layer sits between transport (raw bytes) and rooms. It
//! doesn't know about connections or actors.

mod codec;
mod error;
mod game;
mod messages;
mod question;
mod types;
mod validate;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use game::{
    GamePhase, GameState, LeaderboardEntry, MAX_DEFAULT_TIMER, MIN_DEFAULT_TIMER, RoomSettings,
};
pub use messages::{ClientMessage, GameSnapshot, PlayerSummary, ServerMessage};
pub use question::{Question, QuestionKind};
pub use types::{PlayerId, Recipient, RoomId};
pub use validate::{clamp_coordinate, is_valid_player_name, sanitize_input};
