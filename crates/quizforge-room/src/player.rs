//! Room members and their live connection links.

use tokio::sync::mpsc;

use quizforge_protocol::{PlayerId, PlayerSummary, ServerMessage};
use quizforge_store::PlayerRecord;
use quizforge_transport::ConnectionId;

/// Where a new player's marker starts on the board.
pub const START_POSITION: (f64, f64) = (50.0, 50.0);

/// Channel sender for delivering outbound messages to a connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerMessage>;

/// A player's live connection: the ID it was accepted under plus the
/// channel its writer task drains.
#[derive(Debug, Clone)]
pub struct PlayerLink {
    pub conn_id: ConnectionId,
    pub sender: PlayerSender,
}

impl PlayerLink {
    pub fn new(conn_id: ConnectionId, sender: PlayerSender) -> Self {
        Self { conn_id, sender }
    }

    /// False once the connection's writer has gone away.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// A member of a room.
///
/// `link` is `None` while the player is disconnected (inside the grace
/// window, or freshly recovered from disk).
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub is_quiz_master: bool,
    pub join_time: u64,
    pub last_active: u64,
    pub disconnected_at: Option<u64>,
    pub avatar: Option<String>,
    pub link: Option<PlayerLink>,
    /// Join order within the room; rosters are listed in this order.
    pub(crate) seq: u64,
}

impl Player {
    pub(crate) fn new(
        id: PlayerId,
        name: String,
        avatar: Option<String>,
        is_quiz_master: bool,
        link: PlayerLink,
        now: u64,
        seq: u64,
    ) -> Self {
        let (x, y) = START_POSITION;
        Self {
            id,
            name,
            x,
            y,
            is_quiz_master,
            join_time: now,
            last_active: now,
            disconnected_at: None,
            avatar,
            link: Some(link),
            seq,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.name.clone(),
            player_id: self.id.clone(),
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            is_quiz_master: self.is_quiz_master,
            avatar: self.avatar.clone(),
        }
    }

    pub(crate) fn record(&self) -> PlayerRecord {
        PlayerRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            is_quiz_master: self.is_quiz_master,
            join_time: self.join_time,
            last_active: self.last_active,
            disconnected_at: self.disconnected_at,
            avatar: self.avatar.clone(),
        }
    }

    /// Rebuilds a player from disk. There is no connection yet, so the
    /// player counts as disconnected from `now` unless the record says
    /// otherwise.
    pub(crate) fn from_record(record: PlayerRecord, seq: u64, now: u64) -> Self {
        Self {
            id: record.id,
            name: record.name,
            x: record.x,
            y: record.y,
            is_quiz_master: record.is_quiz_master,
            join_time: record.join_time,
            last_active: record.last_active,
            disconnected_at: Some(record.disconnected_at.unwrap_or(now)),
            avatar: record.avatar,
            link: None,
            seq,
        }
    }
}
