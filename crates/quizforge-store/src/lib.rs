//! Durable side-store for Quizforge.
//!
//! Rooms live in memory; this crate keeps a copy on disk so a restarted
//! server can pick them back up. Three tables are kept per room:
//!
//! - the room record (host, settings, game state, timestamps),
//! - the score ledger,
//! - the player roster.
//!
//! [`Store`] is the synchronous storage interface. [`JsonFileStore`] writes
//! one JSON file per table; [`MemoryStore`] is for tests. Rooms never call a
//! store directly from their actor loop: they go through a [`Persister`],
//! which queues writes and applies them in order on a background task.

mod error;
mod file;
mod memory;
mod persister;
mod records;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use persister::Persister;
pub use records::{PlayerRecord, RoomRecord, ScoreRecord};

use quizforge_protocol::RoomId;

/// Per-room key-value persistence.
///
/// Implementations must be safe to call from several threads; the last
/// write for a given room and table wins.
pub trait Store: Send + Sync + 'static {
    fn save_room(&self, record: &RoomRecord) -> Result<(), StoreError>;
    fn load_room(&self, id: RoomId) -> Result<Option<RoomRecord>, StoreError>;
    fn delete_room(&self, id: RoomId) -> Result<(), StoreError>;

    /// Replaces the room's ledger. Entries are kept in join order.
    fn save_scores(&self, id: RoomId, scores: &[ScoreRecord]) -> Result<(), StoreError>;
    fn load_scores(&self, id: RoomId) -> Result<Vec<ScoreRecord>, StoreError>;
    fn delete_scores(&self, id: RoomId) -> Result<(), StoreError>;

    /// Replaces the room's roster. Entries are kept in join order.
    fn save_roster(&self, id: RoomId, roster: &[PlayerRecord]) -> Result<(), StoreError>;
    fn load_roster(&self, id: RoomId) -> Result<Vec<PlayerRecord>, StoreError>;
    fn delete_roster(&self, id: RoomId) -> Result<(), StoreError>;

    /// Every persisted room, ordered by ID.
    fn all_rooms(&self) -> Result<Vec<RoomRecord>, StoreError>;

    /// Removes all three tables for a room.
    fn purge(&self, id: RoomId) -> Result<(), StoreError> {
        self.delete_room(id)?;
        self.delete_scores(id)?;
        self.delete_roster(id)
    }
}
