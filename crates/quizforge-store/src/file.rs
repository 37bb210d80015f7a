//! JSON-file backed store.
//!
//! Layout under the data directory:
//!
//! ```text
//! rooms.json    { "<roomId>": RoomRecord, ... }
//! scores.json   { "<roomId>": [ScoreRecord, ...], ... }
//! players.json  { "<roomId>": [PlayerRecord, ...], ... }
//! ```
//!
//! Every write rewrites the whole table through a temp file and a rename,
//! so a crash mid-write leaves the previous version in place.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use quizforge_protocol::RoomId;

use crate::{PlayerRecord, RoomRecord, ScoreRecord, Store, StoreError};

const ROOMS_FILE: &str = "rooms.json";
const SCORES_FILE: &str = "scores.json";
const PLAYERS_FILE: &str = "players.json";

type Table<T> = BTreeMap<RoomId, T>;

/// A [`Store`] that keeps each table in a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles across tables.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directory can't be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        info!(dir = %dir.display(), "json store opened");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Table<T>, StoreError> {
        let path = self.path(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Table::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Table::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }

    fn write<T: Serialize>(&self, file: &str, table: &Table<T>) -> Result<(), StoreError> {
        let path = self.path(file);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(table)?;
        fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })?;
        debug!(file, entries = table.len(), "table written");
        Ok(())
    }

    /// Runs `f` on the table inside the lock and writes the result back.
    fn update<T, F>(&self, file: &str, f: F) -> Result<(), StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Table<T>),
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read(file)?;
        f(&mut table);
        self.write(file, &table)
    }

    fn load<T: DeserializeOwned>(&self, file: &str, id: RoomId) -> Result<Option<T>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read::<T>(file)?.remove(&id))
    }

    fn delete<T: Serialize + DeserializeOwned>(
        &self,
        file: &str,
        id: RoomId,
    ) -> Result<(), StoreError> {
        self.update::<T, _>(file, |table| {
            table.remove(&id);
        })
    }
}

impl Store for JsonFileStore {
    fn save_room(&self, record: &RoomRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.update(ROOMS_FILE, move |table| {
            table.insert(record.id, record);
        })
    }

    fn load_room(&self, id: RoomId) -> Result<Option<RoomRecord>, StoreError> {
        self.load(ROOMS_FILE, id)
    }

    fn delete_room(&self, id: RoomId) -> Result<(), StoreError> {
        self.delete::<RoomRecord>(ROOMS_FILE, id)
    }

    fn save_scores(&self, id: RoomId, scores: &[ScoreRecord]) -> Result<(), StoreError> {
        self.update(SCORES_FILE, |table| {
            table.insert(id, scores.to_vec());
        })
    }

    fn load_scores(&self, id: RoomId) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self.load(SCORES_FILE, id)?.unwrap_or_default())
    }

    fn delete_scores(&self, id: RoomId) -> Result<(), StoreError> {
        self.delete::<Vec<ScoreRecord>>(SCORES_FILE, id)
    }

    fn save_roster(&self, id: RoomId, roster: &[PlayerRecord]) -> Result<(), StoreError> {
        self.update(PLAYERS_FILE, |table| {
            table.insert(id, roster.to_vec());
        })
    }

    fn load_roster(&self, id: RoomId) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.load(PLAYERS_FILE, id)?.unwrap_or_default())
    }

    fn delete_roster(&self, id: RoomId) -> Result<(), StoreError> {
        self.delete::<Vec<PlayerRecord>>(PLAYERS_FILE, id)
    }

    fn all_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read::<RoomRecord>(ROOMS_FILE)?.into_values().collect())
    }
}
