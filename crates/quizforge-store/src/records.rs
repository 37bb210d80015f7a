//! On-disk shapes of a room.
//!
//! Live connections are never part of a record; a player loaded from disk
//! starts out disconnected.

use serde::{Deserialize, Serialize};

use quizforge_protocol::{GameState, PlayerId, RoomId, RoomSettings};

/// Room metadata and game progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub id: RoomId,
    /// Host display name.
    pub quiz_master: String,
    pub quiz_master_player_id: PlayerId,
    #[serde(default)]
    pub settings: RoomSettings,
    #[serde(default)]
    pub game_state: GameState,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub last_activity: u64,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub is_quiz_master: bool,
    pub join_time: u64,
    pub last_active: u64,
    #[serde(default)]
    pub disconnected_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// One ledger entry. The name is kept so departed players still show up
/// on the leaderboard under the name they played with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub player_id: PlayerId,
    pub name: String,
    pub score: i64,
}
