//! Integration tests for the JSON file store and the background persister.

use std::path::PathBuf;
use std::sync::Arc;

use quizforge_protocol::{GameState, PlayerId, Question, RoomId, RoomSettings};
use quizforge_store::{
    JsonFileStore, MemoryStore, Persister, PlayerRecord, RoomRecord, ScoreRecord, Store,
    StoreError,
};

// =========================================================================
// Helpers
// =========================================================================

/// A fresh directory under the system temp dir, removed on drop.
struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let name = format!("quizforge-store-{:016x}", rand::random::<u64>());
        let path = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn room(id: u64) -> RoomRecord {
    let mut game_state = GameState::default();
    game_state.set_questions(vec![Question::ox("Sky is blue?", 'O', 10, 50)]);
    RoomRecord {
        id: RoomId(id),
        quiz_master: "Host".into(),
        quiz_master_player_id: PlayerId::from("quiz_master_1"),
        settings: RoomSettings::with_default_timer(Some(30)),
        game_state,
        created_at: 1,
        last_activity: 2,
    }
}

fn player(id: &str, name: &str) -> PlayerRecord {
    PlayerRecord {
        id: PlayerId::from(id),
        name: name.into(),
        x: 50.0,
        y: 50.0,
        is_quiz_master: false,
        join_time: 1,
        last_active: 1,
        disconnected_at: None,
        avatar: None,
    }
}

fn score(id: &str, name: &str, score: i64) -> ScoreRecord {
    ScoreRecord {
        player_id: PlayerId::from(id),
        name: name.into(),
        score,
    }
}

// =========================================================================
// JsonFileStore
// =========================================================================

#[test]
fn test_json_store_round_trips_all_tables() {
    let dir = TempDir::new();
    let store = JsonFileStore::open(&dir.0).unwrap();

    store.save_room(&room(1000)).unwrap();
    store
        .save_scores(RoomId(1000), &[score("p1", "Ann", 30), score("p2", "Bob", 0)])
        .unwrap();
    store
        .save_roster(RoomId(1000), &[player("p1", "Ann"), player("p2", "Bob")])
        .unwrap();

    assert_eq!(store.load_room(RoomId(1000)).unwrap(), Some(room(1000)));
    let scores = store.load_scores(RoomId(1000)).unwrap();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0], score("p1", "Ann", 30));
    let roster = store.load_roster(RoomId(1000)).unwrap();
    assert_eq!(roster[1].name, "Bob");
}

#[test]
fn test_json_store_survives_reopen() {
    let dir = TempDir::new();
    {
        let store = JsonFileStore::open(&dir.0).unwrap();
        store.save_room(&room(1001)).unwrap();
        store.save_room(&room(1000)).unwrap();
    }
    let store = JsonFileStore::open(&dir.0).unwrap();
    let ids: Vec<RoomId> = store.all_rooms().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![RoomId(1000), RoomId(1001)]);
}

#[test]
fn test_json_store_missing_room_loads_empty() {
    let dir = TempDir::new();
    let store = JsonFileStore::open(&dir.0).unwrap();
    assert_eq!(store.load_room(RoomId(42)).unwrap(), None);
    assert!(store.load_scores(RoomId(42)).unwrap().is_empty());
    assert!(store.load_roster(RoomId(42)).unwrap().is_empty());
    assert!(store.all_rooms().unwrap().is_empty());
}

#[test]
fn test_json_store_purge_leaves_other_rooms() {
    let dir = TempDir::new();
    let store = JsonFileStore::open(&dir.0).unwrap();
    for id in [1000, 1001] {
        store.save_room(&room(id)).unwrap();
        store.save_scores(RoomId(id), &[score("p1", "Ann", 5)]).unwrap();
        store.save_roster(RoomId(id), &[player("p1", "Ann")]).unwrap();
    }

    store.purge(RoomId(1000)).unwrap();

    assert_eq!(store.load_room(RoomId(1000)).unwrap(), None);
    assert!(store.load_scores(RoomId(1000)).unwrap().is_empty());
    assert!(store.load_roster(RoomId(1000)).unwrap().is_empty());
    assert!(store.load_room(RoomId(1001)).unwrap().is_some());
    assert_eq!(store.load_scores(RoomId(1001)).unwrap().len(), 1);
}

#[test]
fn test_json_store_corrupt_table_is_reported() {
    let dir = TempDir::new();
    std::fs::write(dir.0.join("rooms.json"), b"{ not json").unwrap();
    let store = JsonFileStore::open(&dir.0).unwrap();
    assert!(matches!(
        store.all_rooms(),
        Err(StoreError::Corrupt { .. })
    ));
}

// =========================================================================
// Persister
// =========================================================================

#[tokio::test]
async fn test_persister_flush_waits_for_queued_writes() {
    let store = Arc::new(MemoryStore::new());
    let persister = Persister::spawn(store.clone());

    persister.save_room(room(1000));
    persister.save_scores(RoomId(1000), vec![score("p1", "Ann", 10)]);
    persister.save_scores(RoomId(1000), vec![score("p1", "Ann", 40)]);
    persister.flush().await.unwrap();

    assert!(store.load_room(RoomId(1000)).unwrap().is_some());
    // Last write wins.
    assert_eq!(store.load_scores(RoomId(1000)).unwrap()[0].score, 40);
}

#[tokio::test]
async fn test_persister_purge_after_saves() {
    let store = Arc::new(MemoryStore::new());
    let persister = Persister::spawn(store.clone());

    persister.save_room(room(1000));
    persister.save_roster(RoomId(1000), vec![player("p1", "Ann")]);
    persister.purge(RoomId(1000));
    persister.flush().await.unwrap();

    assert!(store.is_empty_for(RoomId(1000)));
}

#[tokio::test]
async fn test_persister_writes_through_json_store() {
    let dir = TempDir::new();
    let store = Arc::new(JsonFileStore::open(&dir.0).unwrap());
    let persister = Persister::spawn(store.clone());

    persister.save_room(room(1000));
    persister.flush().await.unwrap();

    let reopened = JsonFileStore::open(&dir.0).unwrap();
    assert_eq!(reopened.load_room(RoomId(1000)).unwrap(), Some(room(1000)));
}
