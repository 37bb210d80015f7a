//! Per-player reconnection grace timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quizforge_protocol::ServerMessage;
use quizforge_room::RoomManager;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::Identity;

struct Timer {
    generation: u64,
    abort: AbortHandle,
}

/// At most one pending timer per room member. Starting a new one
/// replaces (and aborts) the old one.
pub(crate) struct GraceTimers {
    period: Duration,
    timers: Mutex<HashMap<Identity, Timer>>,
    next_generation: AtomicU64,
}

impl GraceTimers {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Identity, Timer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (Re)starts the player's timer. When it fires and the player still
    /// has no connection, they are removed from the room and the rest of
    /// the room gets `playerLeft`.
    pub(crate) fn start(self: &Arc<Self>, rooms: RoomManager, identity: Identity) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(self);
        let period = self.period;
        let key = identity.clone();

        // Held until the slot is filled so a zero-length timer can't fire
        // before it is registered.
        let mut slots = self.timers();
        let task = tokio::spawn(async move {
            tokio::time::sleep(period).await;
            if !timers.finish(&identity, generation) {
                return;
            }
            let Identity { player_id, room_id } = identity;
            match rooms.expire_if_disconnected(room_id, &player_id).await {
                Some(_) => {
                    info!(%room_id, %player_id, "grace window elapsed, player removed");
                    rooms
                        .broadcast(room_id, ServerMessage::PlayerLeft { id: player_id }, None)
                        .await;
                }
                None => debug!(%room_id, %player_id, "grace window elapsed, nothing to do"),
            }
        });

        let previous = slots.insert(
            key,
            Timer {
                generation,
                abort: task.abort_handle(),
            },
        );
        drop(slots);
        if let Some(previous) = previous {
            previous.abort.abort();
        }
    }

    /// Cancels the member's pending timer. Returns false if none was set.
    pub(crate) fn cancel(&self, identity: &Identity) -> bool {
        match self.timers().remove(identity) {
            Some(timer) => {
                timer.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Called by a timer that fired: clears its slot if it is still the
    /// current one for the member.
    fn finish(&self, identity: &Identity, generation: u64) -> bool {
        let mut timers = self.timers();
        match timers.get(identity) {
            Some(timer) if timer.generation == generation => {
                timers.remove(identity);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.timers().len()
    }
}
