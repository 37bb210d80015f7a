//! In-memory store, used by tests and when no data directory is set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use quizforge_protocol::RoomId;

use crate::{PlayerRecord, RoomRecord, ScoreRecord, Store, StoreError};

#[derive(Debug, Default)]
struct Tables {
    rooms: BTreeMap<RoomId, RoomRecord>,
    scores: HashMap<RoomId, Vec<ScoreRecord>>,
    rosters: HashMap<RoomId, Vec<PlayerRecord>>,
}

/// A [`Store`] that never touches disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no table holds anything for `id`.
    pub fn is_empty_for(&self, id: RoomId) -> bool {
        let t = self.tables();
        !t.rooms.contains_key(&id) && !t.scores.contains_key(&id) && !t.rosters.contains_key(&id)
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn save_room(&self, record: &RoomRecord) -> Result<(), StoreError> {
        self.tables().rooms.insert(record.id, record.clone());
        Ok(())
    }

    fn load_room(&self, id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.tables().rooms.get(&id).cloned())
    }

    fn delete_room(&self, id: RoomId) -> Result<(), StoreError> {
        self.tables().rooms.remove(&id);
        Ok(())
    }

    fn save_scores(&self, id: RoomId, scores: &[ScoreRecord]) -> Result<(), StoreError> {
        self.tables().scores.insert(id, scores.to_vec());
        Ok(())
    }

    fn load_scores(&self, id: RoomId) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self.tables().scores.get(&id).cloned().unwrap_or_default())
    }

    fn delete_scores(&self, id: RoomId) -> Result<(), StoreError> {
        self.tables().scores.remove(&id);
        Ok(())
    }

    fn save_roster(&self, id: RoomId, roster: &[PlayerRecord]) -> Result<(), StoreError> {
        self.tables().rosters.insert(id, roster.to_vec());
        Ok(())
    }

    fn load_roster(&self, id: RoomId) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.tables().rosters.get(&id).cloned().unwrap_or_default())
    }

    fn delete_roster(&self, id: RoomId) -> Result<(), StoreError> {
        self.tables().rosters.remove(&id);
        Ok(())
    }

    fn all_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        Ok(self.tables().rooms.values().cloned().collect())
    }
}
