//! Per-connection handler: message loop and routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register with the connection registry (untagged)
//!   2. Spawn a writer task that drains the connection's outbound queue
//!   3. Loop: receive frames → decode → dispatch to a room operation
//!   4. On close (or when the idle sweep gives up): disconnect path

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use quizforge_protocol::{
    ClientMessage, Codec, PlayerId, RoomId, RoomSettings, ServerMessage, is_valid_player_name,
    sanitize_input,
};
use quizforge_room::{HostAction, JoinRequest, PlayerLink, PlayerSender, RoomError};
use quizforge_session::{ConnectionRegistry, Identity, SessionError};
use quizforge_transport::{Connection, ConnectionId, WebSocketConnection};
use rand::Rng;
use tokio::sync::mpsc;

use crate::QuizError;
use crate::server::ServerState;

/// Reply sent when a frame isn't a valid message.
const INVALID_FORMAT: &str = "Invalid message format";

/// Reply to `requestGameState` for a room that is gone.
const ROOM_GONE: &str = "Room no longer exists";

/// Why a request was refused. The display text goes back to the client
/// as an `error` message.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("invalid quiz master name")]
    InvalidQuizMasterName,

    #[error("invalid player name")]
    InvalidPlayerName,

    #[error("invalid player id")]
    InvalidPlayerId,

    #[error("invalid room id")]
    InvalidRoomId,

    #[error("you must be in a room to do that")]
    NotInRoom,

    #[error("failed to load questions")]
    QuestionsUnavailable,

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Drop guard that runs the disconnect path when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task. On a normal exit the
/// handler has already disconnected and this is a no-op.
struct ConnectionGuard {
    conn_id: ConnectionId,
    registry: ConnectionRegistry<WebSocketConnection>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let registry = self.registry.clone();
        tokio::spawn(async move {
            registry.disconnect(conn_id).await;
        });
    }
}

/// The sending side of one connection.
struct Client {
    conn_id: ConnectionId,
    tx: PlayerSender,
}

impl Client {
    fn send(&self, msg: ServerMessage) {
        // Fails only once the writer is gone, i.e. the connection is
        // already closing.
        let _ = self.tx.send(msg);
    }

    fn link(&self) -> PlayerLink {
        PlayerLink::new(self.conn_id, self.tx.clone())
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), QuizError>
where
    C: Codec + Clone,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let kill = state.registry.register(Arc::clone(&conn));
    let _guard = ConnectionGuard {
        conn_id,
        registry: state.registry.clone(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), rx, state.codec.clone()));
    let client = Client { conn_id, tx };

    loop {
        let data = tokio::select! {
            () = kill.notified() => {
                tracing::info!(%conn_id, "terminated by idle sweep");
                let _ = conn.close().await;
                break;
            }
            received = conn.recv() => match received {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::debug!(%conn_id, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    break;
                }
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode message");
                client.send(ServerMessage::error(INVALID_FORMAT));
                continue;
            }
        };

        dispatch(&state, &client, msg).await;
    }

    // Clear the player's link before the writer goes away, so nothing
    // mistakes the closing queue for a dead player.
    state.registry.disconnect(conn_id).await;
    writer.abort();
    Ok(())
}

/// Drains the outbound queue onto the socket, in order.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    codec: C,
) {
    while let Some(msg) = rx.recv().await {
        let bytes = match codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(kind = msg.kind(), error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping writer");
            break;
        }
    }
}

/// Routes one decoded message. Refusals become an `error` reply.
async fn dispatch<C: Codec>(state: &ServerState<C>, client: &Client, msg: ClientMessage) {
    let identity = state.registry.identity(client.conn_id);
    tracing::debug!(conn_id = %client.conn_id, ?msg, "message received");

    let result = match msg {
        ClientMessage::CreateRoom {
            quiz_master,
            default_timer,
        } => create_room(state, client, &quiz_master, default_timer).await,
        ClientMessage::JoinRoom {
            room_id,
            player_name,
            player_id,
            avatar,
        } => join_room(state, client, room_id, &player_name, &player_id, avatar).await,
        ClientMessage::Move { x, y } => move_player(state, identity, x, y).await,
        ClientMessage::ScoreUpdate { score, .. } => {
            score_update(state, identity, score).await;
            Ok(())
        }
        ClientMessage::Answer {
            correct_answer,
            score,
        } => {
            let action = HostAction::AnnounceAnswer {
                correct_answer,
                score,
            };
            host_action(state, identity, action).await
        }
        ClientMessage::RequestExistingPlayers => existing_players(state, identity).await,
        ClientMessage::RequestLeaderboard => leaderboard(state, client, identity).await,
        ClientMessage::LoadQuestions => load_questions(state, client, identity).await,
        ClientMessage::StartGame => host_action(state, identity, HostAction::StartGame).await,
        ClientMessage::NextQuestion => {
            host_action(state, identity, HostAction::NextQuestion).await
        }
        ClientMessage::RevealAnswer => {
            host_action(state, identity, HostAction::RevealAnswer).await
        }
        ClientMessage::ShowLeaderboard => {
            host_action(state, identity, HostAction::ShowLeaderboard).await
        }
        ClientMessage::EndGame => host_action(state, identity, HostAction::EndGame).await,
        ClientMessage::RequestGameState => game_state(state, client, identity).await,
        ClientMessage::Unknown => {
            tracing::warn!(conn_id = %client.conn_id, "ignoring unknown message type");
            Ok(())
        }
    };

    if let Err(rejection) = result {
        tracing::debug!(conn_id = %client.conn_id, reason = %rejection, "request refused");
        client.send(ServerMessage::error(rejection.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Room entry
// ---------------------------------------------------------------------------

async fn create_room<C: Codec>(
    state: &ServerState<C>,
    client: &Client,
    quiz_master: &str,
    default_timer: Option<i64>,
) -> Result<(), Rejection> {
    let name = sanitize_input(quiz_master);
    if !is_valid_player_name(&name) {
        return Err(Rejection::InvalidQuizMasterName);
    }

    let rooms = state.rooms();
    // A connection that already speaks for someone leaves that room first.
    if let Some(old) = state.registry.untag(client.conn_id) {
        if rooms.leave_room(old.room_id, &old.player_id).await.is_some() {
            rooms
                .broadcast(
                    old.room_id,
                    ServerMessage::PlayerLeft {
                        id: old.player_id.clone(),
                    },
                    None,
                )
                .await;
            tracing::info!(room_id = %old.room_id, player_id = %old.player_id, "left previous room");
        }
    }

    let player_id = quiz_master_id();
    let room_id = rooms.create_room(
        &name,
        player_id.clone(),
        RoomSettings::with_default_timer(default_timer),
    );
    rooms
        .join_room(
            room_id,
            JoinRequest {
                player_id: player_id.clone(),
                name: name.clone(),
                avatar: None,
                link: client.link(),
                greet: false,
            },
        )
        .await?;
    state.registry.tag(
        client.conn_id,
        Identity {
            player_id: player_id.clone(),
            room_id,
        },
    )?;

    client.send(ServerMessage::RoomCreated {
        room_id,
        quiz_master: name.clone(),
        player_id,
        player_name: name,
        is_quiz_master: true,
    });
    Ok(())
}

async fn join_room<C: Codec>(
    state: &ServerState<C>,
    client: &Client,
    room_id: Option<RoomId>,
    player_name: &str,
    player_id: &str,
    avatar: Option<String>,
) -> Result<(), Rejection> {
    let name = sanitize_input(player_name);
    if !is_valid_player_name(&name) {
        return Err(Rejection::InvalidPlayerName);
    }
    let player_id = sanitize_input(player_id);
    if player_id.is_empty() {
        return Err(Rejection::InvalidPlayerId);
    }
    let room_id = room_id.ok_or(Rejection::InvalidRoomId)?;
    let player_id = PlayerId::new(player_id);

    let outcome = state
        .rooms()
        .join_room(
            room_id,
            JoinRequest {
                player_id: player_id.clone(),
                name,
                avatar,
                link: client.link(),
                greet: true,
            },
        )
        .await?;
    state
        .registry
        .tag(client.conn_id, Identity { player_id, room_id })?;

    tracing::info!(
        %room_id,
        player_id = %outcome.player_id,
        reconnected = outcome.reconnected,
        "joined room"
    );
    Ok(())
}

/// `quiz_master_<millis>_<9 base-36 chars>`.
fn quiz_master_id() -> PlayerId {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    PlayerId::new(format!("quiz_master_{millis}_{suffix}"))
}

// ---------------------------------------------------------------------------
// Guest actions
// ---------------------------------------------------------------------------

async fn move_player<C: Codec>(
    state: &ServerState<C>,
    identity: Option<Identity>,
    x: f64,
    y: f64,
) -> Result<(), Rejection> {
    let Identity { player_id, room_id } = identity.ok_or(Rejection::NotInRoom)?;
    state.rooms().move_player(room_id, &player_id, x, y).await?;
    Ok(())
}

/// Points always go to the connection's own player. Negative deltas and
/// untagged connections are dropped without a reply.
async fn score_update<C: Codec>(state: &ServerState<C>, identity: Option<Identity>, delta: i64) {
    let Some(Identity { player_id, room_id }) = identity else {
        tracing::warn!("score update from a connection outside any room");
        return;
    };
    if delta < 0 {
        tracing::warn!(%room_id, %player_id, delta, "rejecting negative score update");
        return;
    }

    let rooms = state.rooms();
    let Some(outcome) = rooms.update_score(room_id, &player_id, delta).await else {
        return;
    };
    rooms
        .broadcast(
            room_id,
            ServerMessage::ScoreUpdate {
                id: outcome.name,
                player_id: outcome.player_id,
                score: outcome.delta,
                total_score: outcome.total_score,
            },
            None,
        )
        .await;
    let leaderboard = rooms.leaderboard(room_id).await;
    rooms
        .broadcast(room_id, ServerMessage::LeaderboardUpdate { leaderboard }, None)
        .await;
}

async fn existing_players<C: Codec>(
    state: &ServerState<C>,
    identity: Option<Identity>,
) -> Result<(), Rejection> {
    let Identity { player_id, room_id } = identity.ok_or(Rejection::NotInRoom)?;
    state
        .rooms()
        .send_existing_players(room_id, &player_id)
        .await?;
    Ok(())
}

async fn leaderboard<C: Codec>(
    state: &ServerState<C>,
    client: &Client,
    identity: Option<Identity>,
) -> Result<(), Rejection> {
    let Identity { room_id, .. } = identity.ok_or(Rejection::NotInRoom)?;
    let leaderboard = state.rooms().leaderboard(room_id).await;
    client.send(ServerMessage::Leaderboard {
        room_id,
        leaderboard,
    });
    Ok(())
}

async fn game_state<C: Codec>(
    state: &ServerState<C>,
    client: &Client,
    identity: Option<Identity>,
) -> Result<(), Rejection> {
    let Identity { player_id, room_id } = identity.ok_or(Rejection::NotInRoom)?;
    match state.rooms().game_snapshot(room_id, &player_id).await {
        Some(snapshot) => client.send(ServerMessage::GameState(Box::new(snapshot))),
        None => client.send(ServerMessage::room_closed(ROOM_GONE)),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Host actions
// ---------------------------------------------------------------------------

/// Runs a host-only action. An untagged connection is simply not the
/// quiz master.
async fn host_action<C: Codec>(
    state: &ServerState<C>,
    identity: Option<Identity>,
    action: HostAction,
) -> Result<(), Rejection> {
    let Identity { player_id, room_id } = identity.ok_or(RoomError::NotQuizMaster)?;
    state.rooms().host(room_id, &player_id, action).await?;
    Ok(())
}

async fn load_questions<C: Codec>(
    state: &ServerState<C>,
    client: &Client,
    identity: Option<Identity>,
) -> Result<(), Rejection> {
    let Identity { player_id, room_id } = identity.ok_or(Rejection::NotInRoom)?;
    let rooms = state.rooms();
    rooms.verify_host(room_id, &player_id).await?;

    let source = Arc::clone(&state.questions);
    let questions = match tokio::task::spawn_blocking(move || source.load()).await {
        Ok(Ok(questions)) => questions,
        Ok(Err(e)) => {
            tracing::warn!(%room_id, error = %e, "question source failed");
            return Err(Rejection::QuestionsUnavailable);
        }
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "question loader task failed");
            return Err(Rejection::QuestionsUnavailable);
        }
    };

    let count = questions.len();
    if !rooms.set_questions(room_id, questions).await {
        return Err(RoomError::NotFound(room_id).into());
    }
    client.send(ServerMessage::QuestionsLoaded { count });
    tracing::info!(%room_id, count, "questions loaded");
    Ok(())
}
