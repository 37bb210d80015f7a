//! Room manager: creates, tracks, and routes players to rooms.
//!
//! The manager is the only way into the room registry and the global
//! player index. It is cheap to clone and safe to share between
//! connection tasks; locks are held only for map lookups, never across
//! an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use quizforge_protocol::{
    GameSnapshot, LeaderboardEntry, PlayerId, Question, RoomId, RoomSettings, ServerMessage,
};
use quizforge_store::{Persister, PlayerRecord, RoomRecord, ScoreRecord, Store, StoreError};
use quizforge_transport::ConnectionId;
use tracing::{debug, info, warn};

use crate::room::{RoomSeed, spawn_room};
use crate::{
    HostAction, JoinOutcome, JoinRequest, Player, RoomError, RoomHandle, RoomInfo, ScoreOutcome,
    now_ms,
};

/// First room ID handed out.
pub const FIRST_ROOM_ID: u64 = 1000;

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Shared registries
// ---------------------------------------------------------------------------

/// Registries shared between the manager and every room actor.
///
/// Actors write to both: a room that closes itself removes its own entry
/// and unindexes its players.
#[derive(Default)]
pub(crate) struct Shared {
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    /// Maps each player ID to the rooms holding a member with that ID.
    /// IDs are only unique within a room, so one ID may map to several.
    index: Mutex<HashMap<PlayerId, BTreeSet<RoomId>>>,
}

impl Shared {
    pub(crate) fn rooms(&self) -> RwLockReadGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn rooms_mut(&self) -> RwLockWriteGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self) -> MutexGuard<'_, HashMap<PlayerId, BTreeSet<RoomId>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn index_player(&self, player_id: &PlayerId, room_id: RoomId) {
        self.index()
            .entry(player_id.clone())
            .or_default()
            .insert(room_id);
    }

    /// Forgets that `room_id` holds `player_id`. Other rooms using the
    /// same ID keep their entries.
    pub(crate) fn unindex(&self, player_id: &PlayerId, room_id: RoomId) {
        let mut index = self.index();
        if let Some(rooms) = index.get_mut(player_id) {
            rooms.remove(&room_id);
            if rooms.is_empty() {
                index.remove(player_id);
            }
        }
    }

    pub(crate) fn remove_room(&self, room_id: RoomId) {
        self.rooms_mut().remove(&room_id);
    }
}

type RoomBundle = (RoomRecord, Vec<ScoreRecord>, Vec<PlayerRecord>);

fn load_bundle(store: &dyn Store, record: RoomRecord) -> Result<RoomBundle, StoreError> {
    let scores = store.load_scores(record.id)?;
    let roster = store.load_roster(record.id)?;
    Ok((record, scores, roster))
}

// ---------------------------------------------------------------------------
// RoomManager
// ---------------------------------------------------------------------------

struct Inner {
    shared: Arc<Shared>,
    store: Arc<dyn Store>,
    persister: Persister,
    next_room_id: AtomicU64,
}

/// Manages all active rooms and tracks which player is in which room.
///
/// This is the entry point for room operations from higher layers
/// (connection registry, message handler).
#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<Inner>,
}

impl RoomManager {
    /// Creates an empty manager writing through `store`.
    ///
    /// Must be called inside a Tokio runtime (the persister's writer task
    /// is spawned here).
    pub fn new(store: Arc<dyn Store>) -> Self {
        let persister = Persister::spawn(Arc::clone(&store));
        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared::default()),
                store,
                persister,
                next_room_id: AtomicU64::new(FIRST_ROOM_ID),
            }),
        }
    }

    fn handle(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.inner.shared.rooms().get(&room_id).cloned()
    }

    /// Rooms that currently hold a member with this ID, ascending.
    pub fn rooms_of(&self, player_id: &PlayerId) -> Vec<RoomId> {
        self.inner
            .shared
            .index()
            .get(player_id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.inner.shared.rooms().len()
    }

    /// Lists all active room IDs, ascending.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.inner.shared.rooms().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Next unused ID. Concurrent callers never get the same value and
    /// IDs already in use (e.g. recovered rooms) are skipped.
    fn allocate_room_id(&self) -> RoomId {
        let rooms = self.inner.shared.rooms();
        loop {
            let id = RoomId(self.inner.next_room_id.fetch_add(1, Ordering::SeqCst));
            if !rooms.contains_key(&id) {
                return id;
            }
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Creates a new, empty room owned by `quiz_master_id` and persists it.
    ///
    /// The host is not a member yet; follow up with [`join_room`].
    ///
    /// [`join_room`]: Self::join_room
    pub fn create_room(
        &self,
        quiz_master: &str,
        quiz_master_id: PlayerId,
        settings: RoomSettings,
    ) -> RoomId {
        let room_id = self.allocate_room_id();
        let seed = RoomSeed::fresh(room_id, quiz_master, quiz_master_id, settings, now_ms());
        let handle = spawn_room(
            seed,
            true,
            Arc::clone(&self.inner.shared),
            self.inner.persister.clone(),
            DEFAULT_CHANNEL_SIZE,
        );
        self.inner.shared.rooms_mut().insert(room_id, handle);
        info!(%room_id, quiz_master, "room created");
        room_id
    }

    /// Installs a room loaded from the store unless one with that ID is
    /// already running.
    fn install(&self, (record, scores, roster): RoomBundle) -> RoomHandle {
        let room_id = record.id;
        let mut rooms = self.inner.shared.rooms_mut();
        if let Some(existing) = rooms.get(&room_id) {
            return existing.clone();
        }
        let players = roster.len();
        let seed = RoomSeed::recovered(record, scores, roster, now_ms());
        let handle = spawn_room(
            seed,
            false,
            Arc::clone(&self.inner.shared),
            self.inner.persister.clone(),
            DEFAULT_CHANNEL_SIZE,
        );
        rooms.insert(room_id, handle.clone());
        self.inner
            .next_room_id
            .fetch_max(room_id.0 + 1, Ordering::SeqCst);
        info!(%room_id, players, "room restored from store");
        handle
    }

    /// Loads every persisted room that isn't already in memory.
    ///
    /// Recovered players have no connection; they can reconnect with
    /// their old ID and name. Returns the number of rooms restored.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let store = Arc::clone(&self.inner.store);
        let bundles = tokio::task::spawn_blocking(move || {
            store
                .all_rooms()?
                .into_iter()
                .map(|record| load_bundle(store.as_ref(), record))
                .collect::<Result<Vec<_>, StoreError>>()
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        let mut restored = 0;
        for bundle in bundles {
            if self.handle(bundle.0.id).is_none() {
                self.install(bundle);
                restored += 1;
            }
        }
        info!(rooms = restored, "recovered rooms from store");
        Ok(restored)
    }

    /// Tries to bring one room back from the store.
    async fn rehydrate(&self, room_id: RoomId) -> Option<RoomHandle> {
        debug!(%room_id, "room not in memory, checking store");
        let store = Arc::clone(&self.inner.store);
        let loaded = tokio::task::spawn_blocking(move || {
            store
                .load_room(room_id)?
                .map(|record| load_bundle(store.as_ref(), record))
                .transpose()
        })
        .await;

        match loaded {
            Ok(Ok(Some(bundle))) => Some(self.install(bundle)),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(%room_id, error = %e, "failed to rehydrate room");
                None
            }
            Err(e) => {
                warn!(%room_id, error = %e, "rehydrate task failed");
                None
            }
        }
    }

    /// Adds a player to a room, or re-attaches a returning one.
    ///
    /// An unknown room is looked up in the store before giving up.
    ///
    /// # Errors
    /// `NotFound`, `Closed`, `PlayerIdInUse`, or `NameInUse`.
    pub async fn join_room(
        &self,
        room_id: RoomId,
        request: JoinRequest,
    ) -> Result<JoinOutcome, RoomError> {
        let handle = match self.handle(room_id) {
            Some(handle) => handle,
            None => self
                .rehydrate(room_id)
                .await
                .ok_or(RoomError::NotFound(room_id))?,
        };
        handle.join(request).await.map_err(|e| match e {
            RoomError::Unavailable(id) => RoomError::NotFound(id),
            other => other,
        })
    }

    /// Removes a player from a room. Removing the quiz master closes the
    /// room.
    pub async fn leave_room(&self, room_id: RoomId, player_id: &PlayerId) -> Option<Player> {
        self.leave(room_id, player_id, false).await
    }

    /// Removes the player only if they are still without a connection.
    /// Used when a grace window runs out.
    pub async fn expire_if_disconnected(
        &self,
        room_id: RoomId,
        player_id: &PlayerId,
    ) -> Option<Player> {
        self.leave(room_id, player_id, true).await
    }

    async fn leave(
        &self,
        room_id: RoomId,
        player_id: &PlayerId,
        only_if_disconnected: bool,
    ) -> Option<Player> {
        let Some(handle) = self.handle(room_id) else {
            self.inner.shared.unindex(player_id, room_id);
            return None;
        };
        handle
            .leave(player_id.clone(), only_if_disconnected)
            .await
            .ok()
            .flatten()
    }

    /// Closes a room: every connected member gets `roomClosed`, the room
    /// and its players leave the registries, and its persisted tables are
    /// deleted. Closing an unknown room is a no-op.
    pub async fn close_room(&self, room_id: RoomId) {
        let Some(handle) = self.handle(room_id) else {
            return;
        };
        if handle.close().await.is_err() {
            // Actor already gone; make sure the registry agrees.
            self.inner.shared.remove_room(room_id);
        }
    }

    /// Closes every room. Returns how many were open.
    pub async fn close_all(&self) -> usize {
        let ids = self.room_ids();
        for room_id in &ids {
            self.close_room(*room_id).await;
        }
        ids.len()
    }

    /// Closes rooms with no activity for at least `max_idle`.
    pub async fn close_idle_rooms(&self, max_idle: Duration) -> Vec<RoomId> {
        let now = now_ms();
        let max_idle_ms = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let mut closed = Vec::new();
        for info in self.all_room_info().await {
            if now.saturating_sub(info.last_activity) >= max_idle_ms {
                info!(room_id = %info.room_id, "closing idle room");
                self.close_room(info.room_id).await;
                closed.push(info.room_id);
            }
        }
        closed
    }

    /// Re-persists every active room.
    pub async fn snapshot_all(&self) {
        let handles: Vec<RoomHandle> = self.inner.shared.rooms().values().cloned().collect();
        for handle in &handles {
            let _ = handle.persist().await;
        }
        debug!(rooms = handles.len(), "periodic snapshot queued");
    }

    /// Waits until every queued store write has been applied.
    ///
    /// # Errors
    /// [`StoreError::Closed`] if the writer has stopped.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.inner.persister.flush().await
    }

    // -- connection state ---------------------------------------------------

    /// Clears a player's link if it still belongs to `conn_id`. Returns
    /// false if the player has already reconnected on another connection
    /// or isn't in the room.
    pub async fn mark_disconnected(
        &self,
        room_id: RoomId,
        player_id: &PlayerId,
        conn_id: ConnectionId,
    ) -> bool {
        match self.handle(room_id) {
            Some(handle) => handle
                .mark_disconnected(player_id.clone(), conn_id)
                .await
                .unwrap_or(false),
            None => false,
        }
    }

    /// Members of a room that currently have a connection.
    pub async fn linked_players(&self, room_id: RoomId) -> Vec<(PlayerId, ConnectionId)> {
        match self.handle(room_id) {
            Some(handle) => handle.linked_players().await.unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Drops a stale member from a room's roster without closing anything.
    pub async fn prune_player(&self, room_id: RoomId, player_id: &PlayerId) -> bool {
        match self.handle(room_id) {
            Some(handle) => handle.prune(player_id.clone()).await.unwrap_or(false),
            None => false,
        }
    }

    // -- gameplay -----------------------------------------------------------

    /// Moves a player's marker and tells the rest of the room.
    ///
    /// # Errors
    /// `NotFound` for an unknown room, `NotInRoom` for a non-member.
    pub async fn move_player(
        &self,
        room_id: RoomId,
        player_id: &PlayerId,
        x: f64,
        y: f64,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id).ok_or(RoomError::NotFound(room_id))?;
        handle.move_player(player_id.clone(), x, y).await
    }

    /// Adds `delta` to a guest's score in `room_id`. Returns `None`
    /// without touching the ledger for the quiz master, a non-member, or
    /// an unknown room.
    pub async fn update_score(
        &self,
        room_id: RoomId,
        player_id: &PlayerId,
        delta: i64,
    ) -> Option<ScoreOutcome> {
        let handle = self.handle(room_id)?;
        handle
            .update_score(player_id.clone(), delta)
            .await
            .ok()
            .flatten()
    }

    /// Current ranking; empty for an unknown room.
    pub async fn leaderboard(&self, room_id: RoomId) -> Vec<LeaderboardEntry> {
        match self.handle(room_id) {
            Some(handle) => handle.leaderboard().await.unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Replaces a room's question list. Returns false for an unknown room.
    pub async fn set_questions(&self, room_id: RoomId, questions: Vec<Question>) -> bool {
        match self.handle(room_id) {
            Some(handle) => handle.set_questions(questions).await.is_ok(),
            None => false,
        }
    }

    /// Advances the cursor and returns the new question, or `None` past
    /// the end.
    pub async fn next_question(&self, room_id: RoomId) -> Option<Question> {
        self.handle(room_id)?.next_question().await.ok().flatten()
    }

    pub async fn current_question(&self, room_id: RoomId) -> Option<Question> {
        self.handle(room_id)?.current_question().await.ok().flatten()
    }

    /// Sends `msg` to every connected member (optionally skipping one) and
    /// returns the number of successful deliveries. Members whose send
    /// fails are removed once the pass is done.
    pub async fn broadcast(
        &self,
        room_id: RoomId,
        msg: ServerMessage,
        exclude: Option<&PlayerId>,
    ) -> usize {
        match self.handle(room_id) {
            Some(handle) => handle
                .broadcast(msg, exclude.cloned())
                .await
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Checks that `caller` is the room's quiz master.
    ///
    /// # Errors
    /// `NotFound` or `NotQuizMaster`.
    pub async fn verify_host(&self, room_id: RoomId, caller: &PlayerId) -> Result<(), RoomError> {
        let handle = self.handle(room_id).ok_or(RoomError::NotFound(room_id))?;
        handle.verify_host(caller.clone()).await
    }

    /// Runs a host-only action. The caller is checked inside the room, so
    /// verification and the state change can't interleave with anything
    /// else.
    ///
    /// # Errors
    /// `NotFound`, `NotQuizMaster`, `NoQuestions`, or `NoActiveQuestion`.
    pub async fn host(
        &self,
        room_id: RoomId,
        caller: &PlayerId,
        action: HostAction,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id).ok_or(RoomError::NotFound(room_id))?;
        handle.host(caller.clone(), action).await
    }

    // -- views --------------------------------------------------------------

    /// Everything `requester` needs to redraw the room, or `None` if the
    /// room is gone.
    pub async fn game_snapshot(
        &self,
        room_id: RoomId,
        requester: &PlayerId,
    ) -> Option<GameSnapshot> {
        let snapshot = self.handle(room_id)?.snapshot(requester.clone()).await.ok()?;
        snapshot.is_active.then_some(snapshot)
    }

    /// Sends `requester` a `newPlayer` for every guest followed by
    /// `roomStats`.
    ///
    /// # Errors
    /// `NotFound` for an unknown room.
    pub async fn send_existing_players(
        &self,
        room_id: RoomId,
        requester: &PlayerId,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id).ok_or(RoomError::NotFound(room_id))?;
        handle
            .send_existing_players(requester.clone())
            .await
            .map_err(|_| RoomError::NotFound(room_id))
    }

    pub async fn room_info(&self, room_id: RoomId) -> Option<RoomInfo> {
        self.handle(room_id)?.info().await.ok()
    }

    /// Info for every room, ordered by ID. Rooms that close mid-query are
    /// skipped.
    pub async fn all_room_info(&self) -> Vec<RoomInfo> {
        let mut handles: Vec<RoomHandle> = self.inner.shared.rooms().values().cloned().collect();
        handles.sort_by_key(RoomHandle::room_id);
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }
}
