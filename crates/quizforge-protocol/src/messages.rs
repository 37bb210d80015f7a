//! Messages exchanged between browsers and the server.
//!
//! Both directions are JSON objects tagged with a `type` field and
//! camelCase keys, e.g. `{"type":"joinRoom","roomId":1000,...}`.
//!
//! Inbound numeric fields are read leniently: browsers send room codes
//! and scores as strings about as often as numbers, so anything that
//! doesn't parse becomes `0` (or `None`) and is left to the handler's
//! validation instead of failing the whole message.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{GamePhase, LeaderboardEntry, PlayerId, Question, RoomId};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A message sent by a host or guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Host opens a new room.
    CreateRoom {
        #[serde(default)]
        quiz_master: String,
        #[serde(default, deserialize_with = "lenient_opt_int")]
        default_timer: Option<i64>,
    },

    /// Guest (or returning player) enters a room.
    JoinRoom {
        #[serde(default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
        #[serde(default)]
        player_name: String,
        #[serde(default)]
        player_id: String,
        #[serde(default)]
        avatar: Option<String>,
    },

    /// Guest moved their marker; coordinates are percentages of the board.
    Move {
        #[serde(default, deserialize_with = "lenient_float")]
        x: f64,
        #[serde(default, deserialize_with = "lenient_float")]
        y: f64,
    },

    /// Guest reports points earned. `id` and `playerId` are informational;
    /// points always go to the sending connection's player.
    ScoreUpdate {
        #[serde(default)]
        id: String,
        #[serde(default)]
        player_id: String,
        #[serde(default, deserialize_with = "lenient_int")]
        score: i64,
    },

    /// Host announces the correct answer directly.
    Answer {
        #[serde(default)]
        correct_answer: String,
        #[serde(default, deserialize_with = "lenient_int")]
        score: i64,
    },

    RequestExistingPlayers,
    RequestLeaderboard,
    LoadQuestions,
    StartGame,
    NextQuestion,
    RevealAnswer,
    ShowLeaderboard,
    EndGame,
    RequestGameState,

    /// Any `type` this server doesn't know. Logged and ignored.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Public view of a player, as sent to other room members.
///
/// Browsers key their player sprites by `id`, which carries the display
/// name; `playerId` is the stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: String,
    pub player_id: PlayerId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub is_quiz_master: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Everything a (re)connecting client needs to redraw a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub room_id: RoomId,
    pub phase: GamePhase,
    pub current_question: Option<Question>,
    /// `-1` before the first question.
    pub question_index: i64,
    pub total_questions: usize,
    pub player_score: i64,
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Other members of the room, excluding the requester.
    pub players: Vec<PlayerSummary>,
    pub is_active: bool,
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated {
        room_id: RoomId,
        quiz_master: String,
        player_id: PlayerId,
        player_name: String,
        is_quiz_master: bool,
    },
    JoinedRoom {
        room_id: RoomId,
        player_id: PlayerId,
        player_name: String,
        is_quiz_master: bool,
        x: f64,
        y: f64,
    },
    NewPlayer(PlayerSummary),
    PositionUpdate {
        /// Display name of the player who moved.
        id: String,
        player_id: PlayerId,
        x: f64,
        y: f64,
    },
    ScoreUpdate {
        /// Display name of the scoring player.
        id: String,
        player_id: PlayerId,
        /// Points added by this update.
        score: i64,
        total_score: i64,
    },
    /// Pushed to the whole room.
    LeaderboardUpdate {
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// Reply to `requestLeaderboard`.
    Leaderboard {
        room_id: RoomId,
        leaderboard: Vec<LeaderboardEntry>,
    },
    Answer {
        correct_answer: String,
        score: i64,
    },
    PlayerLeft {
        id: PlayerId,
    },
    RoomStats {
        room_id: RoomId,
        player_count: usize,
        players: Vec<PlayerId>,
    },
    Error {
        message: String,
    },
    Question {
        question: Question,
        question_index: usize,
        total_questions: usize,
    },
    QuestionsLoaded {
        count: usize,
    },
    GameEnded,
    RoomClosed {
        message: String,
    },
    GameState(Box<GameSnapshot>),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn room_closed(message: impl Into<String>) -> Self {
        Self::RoomClosed {
            message: message.into(),
        }
    }

    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "roomCreated",
            Self::JoinedRoom { .. } => "joinedRoom",
            Self::NewPlayer(_) => "newPlayer",
            Self::PositionUpdate { .. } => "positionUpdate",
            Self::ScoreUpdate { .. } => "scoreUpdate",
            Self::LeaderboardUpdate { .. } => "leaderboardUpdate",
            Self::Leaderboard { .. } => "leaderboard",
            Self::Answer { .. } => "answer",
            Self::PlayerLeft { .. } => "playerLeft",
            Self::RoomStats { .. } => "roomStats",
            Self::Error { .. } => "error",
            Self::Question { .. } => "question",
            Self::QuestionsLoaded { .. } => "questionsLoaded",
            Self::GameEnded => "gameEnded",
            Self::RoomClosed { .. } => "roomClosed",
            Self::GameState(_) => "gameState",
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient number parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

impl Loose {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Loose::Int(n) => Some(*n),
            Loose::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Loose::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
            }
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Int(n) => Some(*n as f64),
            Loose::Float(f) => Some(*f),
            Loose::Text(s) => s.trim().parse::<f64>().ok(),
            Loose::Other(_) => None,
        }
    }
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Loose::deserialize(d)?.as_i64().unwrap_or(0))
}

fn lenient_opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.and_then(|v| v.as_i64()))
}

fn lenient_float<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Loose::deserialize(d)?.as_f64().unwrap_or(0.0))
}

fn lenient_room_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RoomId>, D::Error> {
    Ok(lenient_opt_int(d)?
        .and_then(|n| u64::try_from(n).ok())
        .filter(|n| *n > 0)
        .map(RoomId))
}
