//! The connection registry: maps live connections to player identities.
//!
//! Every accepted connection is registered here and, once its player has
//! created or joined a room, tagged with `(player_id, room_id)`. All
//! disconnects, whether the transport closed or the idle sweep gave up on
//! it, go through [`ConnectionRegistry::disconnect`].
//!
//! ## Lifecycle
//!
//! ```text
//! register() ──→ tag() ──→ disconnect() ──→ [grace timer]
//!  (untagged)    (active)       │                 │
//!                               │       rejoin    │ fires, still unlinked
//!                               ▼   ◄─────────    ▼
//!                          [disconnected]     removed + playerLeft
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quizforge_protocol::{PlayerId, RoomId};
use quizforge_room::RoomManager;
use quizforge_transport::{Connection, ConnectionId};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::grace::GraceTimers;
use crate::{RegistryConfig, SessionError};

/// Who a tagged connection speaks for. Player IDs are only unique
/// within a room, so the pair is the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub player_id: PlayerId,
    pub room_id: RoomId,
}

struct Entry<C> {
    conn: Arc<C>,
    identity: Option<Identity>,
    /// Notified when the sweep decides the connection is dead. The
    /// connection's handler is expected to stop reading and exit.
    kill: Arc<Notify>,
}

struct Inner<C> {
    rooms: RoomManager,
    config: RegistryConfig,
    connections: Mutex<HashMap<ConnectionId, Entry<C>>>,
    grace: Arc<GraceTimers>,
}

/// Tracks every live connection and drives reconnection and idle
/// handling on top of a [`RoomManager`].
///
/// Cheap to clone; clones share the same state.
pub struct ConnectionRegistry<C: Connection> {
    inner: Arc<Inner<C>>,
}

impl<C: Connection> Clone for ConnectionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> ConnectionRegistry<C> {
    pub fn new(rooms: RoomManager, config: RegistryConfig) -> Self {
        let grace = Arc::new(GraceTimers::new(config.reconnect_grace));
        Self {
            inner: Arc::new(Inner {
                rooms,
                config,
                connections: Mutex::new(HashMap::new()),
                grace,
            }),
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry<C>>> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.inner.rooms
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Registers a freshly accepted connection, untagged. Returns the
    /// signal the sweep uses to terminate it.
    pub fn register(&self, conn: Arc<C>) -> Arc<Notify> {
        let conn_id = conn.id();
        let kill = Arc::new(Notify::new());
        self.connections().insert(
            conn_id,
            Entry {
                conn,
                identity: None,
                kill: Arc::clone(&kill),
            },
        );
        debug!(%conn_id, "connection registered");
        kill
    }

    /// Tags a connection after a successful create or join, and cancels
    /// any grace timer pending for the player.
    ///
    /// # Errors
    /// [`SessionError::UnknownConnection`] if the connection isn't
    /// registered.
    pub fn tag(&self, conn_id: ConnectionId, identity: Identity) -> Result<(), SessionError> {
        {
            let mut connections = self.connections();
            let entry = connections
                .get_mut(&conn_id)
                .ok_or(SessionError::UnknownConnection(conn_id))?;
            entry.identity = Some(identity.clone());
        }
        if self.inner.grace.cancel(&identity) {
            info!(
                %conn_id,
                room_id = %identity.room_id,
                player_id = %identity.player_id,
                "player reconnected within grace window"
            );
        }
        Ok(())
    }

    /// Clears a connection's tag and returns what it was.
    pub fn untag(&self, conn_id: ConnectionId) -> Option<Identity> {
        self.connections()
            .get_mut(&conn_id)
            .and_then(|entry| entry.identity.take())
    }

    pub fn identity(&self, conn_id: ConnectionId) -> Option<Identity> {
        self.connections()
            .get(&conn_id)
            .and_then(|entry| entry.identity.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Number of players currently inside a grace window.
    pub fn pending_grace(&self) -> usize {
        self.inner.grace.pending()
    }

    /// The single disconnect path.
    ///
    /// Forgets the connection. If it was tagged and still the player's
    /// current link, the player's link is cleared and the grace timer
    /// (re)started. Untagged and superseded connections are ignored.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let removed = self.connections().remove(&conn_id);
        let Some(entry) = removed else {
            return;
        };
        let Some(identity) = entry.identity else {
            debug!(%conn_id, "untagged connection closed");
            return;
        };

        let rooms = &self.inner.rooms;
        if rooms
            .mark_disconnected(identity.room_id, &identity.player_id, conn_id)
            .await
        {
            info!(
                %conn_id,
                room_id = %identity.room_id,
                player_id = %identity.player_id,
                grace_ms = self.inner.config.reconnect_grace.as_millis() as u64,
                "connection lost, grace window started"
            );
            self.inner.grace.start(rooms.clone(), identity);
        } else {
            debug!(%conn_id, player_id = %identity.player_id, "stale connection closed");
        }
    }

    /// One idle-detection pass.
    ///
    /// A connection that hasn't answered since the previous pass is
    /// terminated (its handler exits and runs [`disconnect`]); the others
    /// are pinged. Afterwards, members whose connection is now tagged for
    /// a different room are pruned from the stale room. Returns the
    /// number of connections terminated.
    ///
    /// [`disconnect`]: Self::disconnect
    pub async fn sweep(&self) -> usize {
        let live: Vec<(ConnectionId, Arc<C>, Arc<Notify>)> = self
            .connections()
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.conn), Arc::clone(&entry.kill)))
            .collect();

        let mut terminated = 0;
        for (conn_id, conn, kill) in live {
            if conn.take_pong() {
                if let Err(e) = conn.ping().await {
                    debug!(%conn_id, error = %e, "ping failed");
                }
            } else {
                info!(%conn_id, "no answer since last ping, terminating");
                kill.notify_one();
                terminated += 1;
            }
        }

        let pruned = self.prune_stale_members().await;
        if terminated > 0 || pruned > 0 {
            info!(terminated, pruned, "idle sweep finished");
        }
        terminated
    }

    async fn prune_stale_members(&self) -> usize {
        let rooms = &self.inner.rooms;
        let mut pruned = 0;
        for room_id in rooms.room_ids() {
            for (player_id, conn_id) in rooms.linked_players(room_id).await {
                let tagged_room = self
                    .connections()
                    .get(&conn_id)
                    .and_then(|entry| entry.identity.as_ref().map(|i| i.room_id));
                let moved_on = matches!(tagged_room, Some(other) if other != room_id);
                if moved_on && rooms.prune_player(room_id, &player_id).await {
                    pruned += 1;
                }
            }
        }
        pruned
    }

    /// Background upkeep, for the lifetime of the process: the idle sweep
    /// and idle-room cleanup every `ping_interval`, and a full snapshot of
    /// every active room every `snapshot_interval`.
    pub async fn run_maintenance(self) {
        let config = &self.inner.config;
        let mut sweep = tokio::time::interval(at_least_1ms(config.ping_interval));
        let mut snapshot = tokio::time::interval(at_least_1ms(config.snapshot_interval));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        snapshot.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Intervals tick immediately; skip that first tick.
        sweep.tick().await;
        snapshot.tick().await;

        info!("maintenance loop started");
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.sweep().await;
                    let closed = self.inner.rooms.close_idle_rooms(config.room_idle_timeout).await;
                    if !closed.is_empty() {
                        info!(rooms = closed.len(), "closed idle rooms");
                    }
                }
                _ = snapshot.tick() => {
                    self.inner.rooms.snapshot_all().await;
                }
            }
        }
    }
}

fn at_least_1ms(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}
