//! Background write queue in front of a [`Store`].
//!
//! Room actors must never block on disk I/O, so every save is turned into
//! a [`PersistOp`] and pushed onto an unbounded channel. A single writer
//! task drains the channel in order and runs each op on the blocking
//! pool. Failures are logged and dropped: the in-memory room stays
//! authoritative and the next snapshot overwrites whatever was missed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

use quizforge_protocol::RoomId;

use crate::{PlayerRecord, RoomRecord, ScoreRecord, Store, StoreError};

#[derive(Debug)]
enum PersistOp {
    Room(RoomRecord),
    Scores(RoomId, Vec<ScoreRecord>),
    Roster(RoomId, Vec<PlayerRecord>),
    Purge(RoomId),
    Flush(oneshot::Sender<()>),
}

impl PersistOp {
    fn room_id(&self) -> Option<RoomId> {
        match self {
            PersistOp::Room(r) => Some(r.id),
            PersistOp::Scores(id, _) | PersistOp::Roster(id, _) | PersistOp::Purge(id) => {
                Some(*id)
            }
            PersistOp::Flush(_) => None,
        }
    }

    fn apply(self, store: &dyn Store) -> Result<(), StoreError> {
        match self {
            PersistOp::Room(record) => store.save_room(&record),
            PersistOp::Scores(id, scores) => store.save_scores(id, &scores),
            PersistOp::Roster(id, roster) => store.save_roster(id, &roster),
            PersistOp::Purge(id) => store.purge(id),
            PersistOp::Flush(_) => Ok(()),
        }
    }
}

/// A cheap, clonable handle that queues writes for the background writer.
#[derive(Debug, Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl Persister {
    /// Spawns the writer task on the current Tokio runtime.
    pub fn spawn(store: Arc<dyn Store>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, rx));
        Self { tx }
    }

    pub fn save_room(&self, record: RoomRecord) {
        self.enqueue(PersistOp::Room(record));
    }

    pub fn save_scores(&self, id: RoomId, scores: Vec<ScoreRecord>) {
        self.enqueue(PersistOp::Scores(id, scores));
    }

    pub fn save_roster(&self, id: RoomId, roster: Vec<PlayerRecord>) {
        self.enqueue(PersistOp::Roster(id, roster));
    }

    /// Deletes every table for the room.
    pub fn purge(&self, id: RoomId) {
        self.enqueue(PersistOp::Purge(id));
    }

    /// Waits until every write queued before this call has been applied.
    ///
    /// # Errors
    /// [`StoreError::Closed`] if the writer task has stopped.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PersistOp::Flush(tx))
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    fn enqueue(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            warn!("persister closed, write dropped");
        }
    }
}

async fn run_writer(store: Arc<dyn Store>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        if let PersistOp::Flush(done) = op {
            let _ = done.send(());
            continue;
        }

        let room_id = op.room_id();
        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || op.apply(store.as_ref())).await {
            Ok(Ok(())) => trace!(?room_id, "persisted"),
            Ok(Err(e)) => warn!(?room_id, error = %e, "store write failed"),
            Err(e) => warn!(?room_id, error = %e, "store writer panicked"),
        }
    }
    trace!("persister writer stopped");
}
