//! Room actor: an isolated Tokio task that owns one quiz room.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. The actor owns the roster, the score ledger,
//! and the game state, so every mutation of a room is serialized without
//! locks. Rooms proceed independently of each other.

use std::collections::HashMap;
use std::sync::Arc;

use quizforge_protocol::{
    GamePhase, GameSnapshot, GameState, LeaderboardEntry, PlayerId, Question, Recipient, RoomId,
    RoomSettings, ServerMessage, clamp_coordinate,
};
use quizforge_store::{Persister, PlayerRecord, RoomRecord, ScoreRecord};
use quizforge_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::manager::Shared;
use crate::{Player, PlayerLink, RoomError, ScoreLedger, now_ms};

/// Notice sent to every connected member when a room shuts down.
pub const ROOM_CLOSED_NOTICE: &str = "room closed";

// ---------------------------------------------------------------------------
// Requests and replies
// ---------------------------------------------------------------------------

/// Everything needed to add (or re-attach) a player.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub name: String,
    pub avatar: Option<String>,
    pub link: PlayerLink,
    /// Send `joinedRoom` plus the current roster to the joiner. Off for
    /// the host's own join, which is answered with `roomCreated` instead.
    pub greet: bool,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player_id: PlayerId,
    pub name: String,
    pub is_quiz_master: bool,
    /// True if the ID was already in the room and only the link changed.
    pub reconnected: bool,
}

/// Result of a successful score update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub player_id: PlayerId,
    pub name: String,
    pub delta: i64,
    pub total_score: i64,
}

/// Host-only phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    StartGame,
    NextQuestion,
    RevealAnswer,
    ShowLeaderboard,
    EndGame,
    /// Announce an answer directly, bypassing the loaded question.
    AnnounceAnswer { correct_answer: String, score: i64 },
}

/// A snapshot of room metadata (not the game itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// Host display name.
    pub quiz_master: String,
    pub quiz_master_id: PlayerId,
    pub player_count: usize,
    /// Roster in join order.
    pub players: Vec<PlayerId>,
    pub is_active: bool,
    pub phase: GamePhase,
    pub created_at: u64,
    pub last_activity: u64,
}

/// Commands sent to a room actor through its channel.
///
/// Every variant carries a reply channel; callers wait on it so that
/// operations on one room complete in the order they were issued.
pub(crate) enum RoomCommand {
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<Result<JoinOutcome, RoomError>>,
    },
    Leave {
        player_id: PlayerId,
        only_if_disconnected: bool,
        reply: oneshot::Sender<Option<Player>>,
    },
    MarkDisconnected {
        player_id: PlayerId,
        conn_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Prune {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Move {
        player_id: PlayerId,
        x: f64,
        y: f64,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    UpdateScore {
        player_id: PlayerId,
        delta: i64,
        reply: oneshot::Sender<Option<ScoreOutcome>>,
    },
    Broadcast {
        msg: ServerMessage,
        exclude: Option<PlayerId>,
        reply: oneshot::Sender<usize>,
    },
    Leaderboard {
        reply: oneshot::Sender<Vec<LeaderboardEntry>>,
    },
    SetQuestions {
        questions: Vec<Question>,
        reply: oneshot::Sender<usize>,
    },
    NextQuestion {
        reply: oneshot::Sender<Option<Question>>,
    },
    CurrentQuestion {
        reply: oneshot::Sender<Option<Question>>,
    },
    VerifyHost {
        caller: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Host {
        caller: PlayerId,
        action: HostAction,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Snapshot {
        requester: PlayerId,
        reply: oneshot::Sender<GameSnapshot>,
    },
    ExistingPlayers {
        requester: PlayerId,
        reply: oneshot::Sender<()>,
    },
    LinkedPlayers {
        reply: oneshot::Sender<Vec<(PlayerId, ConnectionId)>>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Persist {
        reply: oneshot::Sender<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor. Used to send commands to it.
///
/// This is cheap to clone; it's just an `mpsc::Sender` wrapper. The
/// `RoomManager` holds one of these per room.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Sends a command built around a fresh reply channel and waits for
    /// the answer. Fails with `Unavailable` if the actor has stopped.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn join(&self, request: JoinRequest) -> Result<JoinOutcome, RoomError> {
        self.request(|reply| RoomCommand::Join { request, reply })
            .await?
    }

    pub async fn leave(
        &self,
        player_id: PlayerId,
        only_if_disconnected: bool,
    ) -> Result<Option<Player>, RoomError> {
        self.request(|reply| RoomCommand::Leave {
            player_id,
            only_if_disconnected,
            reply,
        })
        .await
    }

    pub async fn mark_disconnected(
        &self,
        player_id: PlayerId,
        conn_id: ConnectionId,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::MarkDisconnected {
            player_id,
            conn_id,
            reply,
        })
        .await
    }

    pub async fn prune(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Prune { player_id, reply })
            .await
    }

    pub async fn move_player(&self, player_id: PlayerId, x: f64, y: f64) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Move {
            player_id,
            x,
            y,
            reply,
        })
        .await?
    }

    pub async fn update_score(
        &self,
        player_id: PlayerId,
        delta: i64,
    ) -> Result<Option<ScoreOutcome>, RoomError> {
        self.request(|reply| RoomCommand::UpdateScore {
            player_id,
            delta,
            reply,
        })
        .await
    }

    pub async fn broadcast(
        &self,
        msg: ServerMessage,
        exclude: Option<PlayerId>,
    ) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Broadcast {
            msg,
            exclude,
            reply,
        })
        .await
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, RoomError> {
        self.request(|reply| RoomCommand::Leaderboard { reply }).await
    }

    pub async fn set_questions(&self, questions: Vec<Question>) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::SetQuestions { questions, reply })
            .await
    }

    pub async fn next_question(&self) -> Result<Option<Question>, RoomError> {
        self.request(|reply| RoomCommand::NextQuestion { reply })
            .await
    }

    pub async fn current_question(&self) -> Result<Option<Question>, RoomError> {
        self.request(|reply| RoomCommand::CurrentQuestion { reply })
            .await
    }

    pub async fn verify_host(&self, caller: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::VerifyHost { caller, reply })
            .await?
    }

    pub async fn host(&self, caller: PlayerId, action: HostAction) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Host {
            caller,
            action,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self, requester: PlayerId) -> Result<GameSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { requester, reply })
            .await
    }

    pub async fn send_existing_players(&self, requester: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::ExistingPlayers { requester, reply })
            .await
    }

    pub async fn linked_players(&self) -> Result<Vec<(PlayerId, ConnectionId)>, RoomError> {
        self.request(|reply| RoomCommand::LinkedPlayers { reply })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Re-persists room, scores, and roster.
    pub async fn persist(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Persist { reply }).await
    }

    /// Closes the room; the actor stops after replying.
    pub async fn close(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Close { reply }).await
    }
}

// ---------------------------------------------------------------------------
// RoomSeed: the starting state of an actor
// ---------------------------------------------------------------------------

/// Initial state for a room actor, either brand new or loaded from disk.
pub(crate) struct RoomSeed {
    pub(crate) room_id: RoomId,
    pub(crate) quiz_master: String,
    pub(crate) quiz_master_id: PlayerId,
    pub(crate) settings: RoomSettings,
    pub(crate) game: GameState,
    pub(crate) players: Vec<Player>,
    pub(crate) ledger: ScoreLedger,
    pub(crate) created_at: u64,
    pub(crate) last_activity: u64,
}

impl RoomSeed {
    pub(crate) fn fresh(
        room_id: RoomId,
        quiz_master: &str,
        quiz_master_id: PlayerId,
        settings: RoomSettings,
        now: u64,
    ) -> Self {
        Self {
            room_id,
            quiz_master: quiz_master.to_string(),
            quiz_master_id,
            settings,
            game: GameState::default(),
            players: Vec::new(),
            ledger: ScoreLedger::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Rebuilds a room from its persisted tables. Every player comes back
    /// without a connection.
    pub(crate) fn recovered(
        record: RoomRecord,
        scores: Vec<ScoreRecord>,
        roster: Vec<PlayerRecord>,
        now: u64,
    ) -> Self {
        let players = roster
            .into_iter()
            .enumerate()
            .map(|(seq, p)| Player::from_record(p, seq as u64, now))
            .collect();
        Self {
            room_id: record.id,
            quiz_master: record.quiz_master,
            quiz_master_id: record.quiz_master_player_id,
            settings: record.settings,
            game: record.game_state,
            players,
            ledger: ScoreLedger::from_records(scores),
            created_at: record.created_at,
            last_activity: record.last_activity,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    quiz_master: String,
    quiz_master_id: PlayerId,
    settings: RoomSettings,
    game: GameState,
    players: HashMap<PlayerId, Player>,
    next_seq: u64,
    ledger: ScoreLedger,
    created_at: u64,
    last_activity: u64,
    closed: bool,
    shared: Arc<Shared>,
    persister: Persister,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop, processing commands until the room closes.
    async fn run(mut self) {
        info!(room_id = %self.room_id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle(cmd);
            if self.closed {
                break;
            }
        }

        info!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { request, reply } => {
                let _ = reply.send(self.handle_join(request));
            }
            RoomCommand::Leave {
                player_id,
                only_if_disconnected,
                reply,
            } => {
                let _ = reply.send(self.handle_leave(&player_id, only_if_disconnected));
            }
            RoomCommand::MarkDisconnected {
                player_id,
                conn_id,
                reply,
            } => {
                let _ = reply.send(self.handle_mark_disconnected(&player_id, conn_id));
            }
            RoomCommand::Prune { player_id, reply } => {
                let _ = reply.send(self.handle_prune(&player_id));
            }
            RoomCommand::Move {
                player_id,
                x,
                y,
                reply,
            } => {
                let _ = reply.send(self.handle_move(player_id, x, y));
            }
            RoomCommand::UpdateScore {
                player_id,
                delta,
                reply,
            } => {
                let _ = reply.send(self.handle_update_score(&player_id, delta));
            }
            RoomCommand::Broadcast {
                msg,
                exclude,
                reply,
            } => {
                let recipient = match exclude {
                    Some(id) => Recipient::AllExcept(id),
                    None => Recipient::All,
                };
                let _ = reply.send(self.dispatch(vec![(recipient, msg)]));
            }
            RoomCommand::Leaderboard { reply } => {
                let _ = reply.send(self.leaderboard());
            }
            RoomCommand::SetQuestions { questions, reply } => {
                let _ = reply.send(self.handle_set_questions(questions));
            }
            RoomCommand::NextQuestion { reply } => {
                let _ = reply.send(self.advance());
            }
            RoomCommand::CurrentQuestion { reply } => {
                let _ = reply.send(self.game.current().cloned());
            }
            RoomCommand::VerifyHost { caller, reply } => {
                let _ = reply.send(self.verify_host(&caller));
            }
            RoomCommand::Host {
                caller,
                action,
                reply,
            } => {
                let _ = reply.send(self.handle_host(&caller, action));
            }
            RoomCommand::Snapshot { requester, reply } => {
                let _ = reply.send(self.snapshot(&requester));
            }
            RoomCommand::ExistingPlayers { requester, reply } => {
                self.handle_existing_players(requester);
                let _ = reply.send(());
            }
            RoomCommand::LinkedPlayers { reply } => {
                let linked = self
                    .players
                    .values()
                    .filter_map(|p| p.link.as_ref().map(|l| (p.id.clone(), l.conn_id)))
                    .collect();
                let _ = reply.send(linked);
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Persist { reply } => {
                self.persist_all();
                let _ = reply.send(());
            }
            RoomCommand::Close { reply } => {
                self.close("closed by request");
                let _ = reply.send(());
            }
        }
    }

    // -- membership ---------------------------------------------------------

    fn handle_join(&mut self, request: JoinRequest) -> Result<JoinOutcome, RoomError> {
        if !self.game.is_active {
            return Err(RoomError::Closed(self.room_id));
        }

        let JoinRequest {
            player_id,
            name,
            avatar,
            link,
            greet,
        } = request;
        let now = now_ms();

        let reconnected = match self.players.get_mut(&player_id) {
            Some(existing) if existing.name == name => {
                existing.link = Some(link);
                existing.last_active = now;
                existing.disconnected_at = None;
                true
            }
            Some(_) => return Err(RoomError::PlayerIdInUse(player_id)),
            None => {
                if self.players.values().any(|p| p.name == name) {
                    return Err(RoomError::NameInUse(name));
                }
                let is_quiz_master = player_id == self.quiz_master_id;
                if !is_quiz_master {
                    self.ledger.enroll(&player_id, &name);
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                let player = Player::new(
                    player_id.clone(),
                    name.clone(),
                    avatar,
                    is_quiz_master,
                    link,
                    now,
                    seq,
                );
                self.players.insert(player_id.clone(), player);
                false
            }
        };

        self.shared.index_player(&player_id, self.room_id);
        self.last_activity = now;
        self.persist_all();

        let Some(player) = self.players.get(&player_id) else {
            return Err(RoomError::NotInRoom(player_id, self.room_id));
        };
        let summary = player.summary();
        let outcome = JoinOutcome {
            player_id: player_id.clone(),
            name,
            is_quiz_master: player.is_quiz_master,
            reconnected,
        };

        info!(
            room_id = %self.room_id,
            %player_id,
            reconnected,
            players = self.players.len(),
            "player joined"
        );

        if greet {
            let mut msgs = vec![(
                Recipient::Player(player_id.clone()),
                ServerMessage::JoinedRoom {
                    room_id: self.room_id,
                    player_id: player_id.clone(),
                    player_name: summary.name.clone(),
                    is_quiz_master: summary.is_quiz_master,
                    x: summary.x,
                    y: summary.y,
                },
            )];
            for other in self.roster().into_iter().filter(|p| p.id != player_id) {
                msgs.push((
                    Recipient::Player(player_id.clone()),
                    ServerMessage::NewPlayer(other.summary()),
                ));
            }
            msgs.push((
                Recipient::AllExcept(player_id),
                ServerMessage::NewPlayer(summary),
            ));
            self.dispatch(msgs);
        }

        Ok(outcome)
    }

    fn handle_leave(&mut self, player_id: &PlayerId, only_if_disconnected: bool) -> Option<Player> {
        let connected = self.players.get(player_id)?.is_connected();
        if only_if_disconnected && connected {
            debug!(room_id = %self.room_id, %player_id, "player reconnected, not expiring");
            return None;
        }

        let player = self.players.remove(player_id)?;
        self.shared.unindex(player_id, self.room_id);
        self.last_activity = now_ms();
        self.persist_room();
        self.persist_roster();
        info!(
            room_id = %self.room_id,
            %player_id,
            players = self.players.len(),
            "player left"
        );

        if player.is_quiz_master {
            self.close("quiz master left");
        }
        Some(player)
    }

    fn handle_mark_disconnected(&mut self, player_id: &PlayerId, conn_id: ConnectionId) -> bool {
        let Some(player) = self.players.get_mut(player_id) else {
            return false;
        };
        // A close from a connection the player already replaced is stale.
        if player.link.as_ref().map(|l| l.conn_id) != Some(conn_id) {
            return false;
        }
        player.link = None;
        player.disconnected_at = Some(now_ms());
        info!(room_id = %self.room_id, %player_id, %conn_id, "player disconnected");
        self.persist_roster();
        true
    }

    fn handle_prune(&mut self, player_id: &PlayerId) -> bool {
        if self.players.remove(player_id).is_none() {
            return false;
        }
        self.shared.unindex(player_id, self.room_id);
        info!(room_id = %self.room_id, %player_id, "stale member pruned");
        self.persist_roster();
        true
    }

    fn handle_existing_players(&mut self, requester: PlayerId) {
        let guests: Vec<&Player> = self
            .roster()
            .into_iter()
            .filter(|p| !p.is_quiz_master)
            .collect();
        let mut msgs: Vec<(Recipient, ServerMessage)> = guests
            .iter()
            .map(|p| {
                (
                    Recipient::Player(requester.clone()),
                    ServerMessage::NewPlayer(p.summary()),
                )
            })
            .collect();
        msgs.push((
            Recipient::Player(requester),
            ServerMessage::RoomStats {
                room_id: self.room_id,
                player_count: self.players.len(),
                players: guests.iter().map(|p| p.id.clone()).collect(),
            },
        ));
        self.dispatch(msgs);
    }

    // -- guest actions ------------------------------------------------------

    fn handle_move(&mut self, player_id: PlayerId, x: f64, y: f64) -> Result<(), RoomError> {
        let now = now_ms();
        let Some(player) = self.players.get_mut(&player_id) else {
            return Err(RoomError::NotInRoom(player_id, self.room_id));
        };
        player.x = clamp_coordinate(x);
        player.y = clamp_coordinate(y);
        player.last_active = now;
        let msg = ServerMessage::PositionUpdate {
            id: player.name.clone(),
            player_id: player_id.clone(),
            x: player.x,
            y: player.y,
        };
        self.last_activity = now;
        self.dispatch(vec![(Recipient::AllExcept(player_id), msg)]);
        Ok(())
    }

    fn handle_update_score(&mut self, player_id: &PlayerId, delta: i64) -> Option<ScoreOutcome> {
        let player = self.players.get(player_id)?;
        if player.is_quiz_master {
            debug!(room_id = %self.room_id, %player_id, "ignoring score for quiz master");
            return None;
        }
        let name = player.name.clone();
        self.ledger.enroll(player_id, &name);
        let total_score = self.ledger.add(player_id, delta)?;
        self.last_activity = now_ms();
        self.persist_room();
        self.persist_scores();
        debug!(room_id = %self.room_id, %player_id, delta, total_score, "score updated");
        Some(ScoreOutcome {
            player_id: player_id.clone(),
            name,
            delta,
            total_score,
        })
    }

    // -- questions and host actions ----------------------------------------

    fn handle_set_questions(&mut self, questions: Vec<Question>) -> usize {
        let count = questions.len();
        self.game.set_questions(questions);
        self.last_activity = now_ms();
        self.persist_room();
        info!(room_id = %self.room_id, count, "questions set");
        count
    }

    fn advance(&mut self) -> Option<Question> {
        let now = now_ms();
        let question = self.game.advance(now).cloned()?;
        self.last_activity = now;
        self.persist_room();
        Some(question)
    }

    fn verify_host(&self, caller: &PlayerId) -> Result<(), RoomError> {
        if *caller == self.quiz_master_id {
            Ok(())
        } else {
            warn!(room_id = %self.room_id, %caller, "host action from non-host");
            Err(RoomError::NotQuizMaster)
        }
    }

    fn handle_host(&mut self, caller: &PlayerId, action: HostAction) -> Result<(), RoomError> {
        self.verify_host(caller)?;
        debug!(room_id = %self.room_id, ?action, "host action");

        match action {
            HostAction::StartGame => {
                let question = self.advance().ok_or(RoomError::NoQuestions)?;
                let msg = self.question_message(question);
                self.dispatch(vec![(Recipient::All, msg)]);
                info!(room_id = %self.room_id, "game started");
            }
            HostAction::NextQuestion => match self.advance() {
                Some(question) => {
                    let msg = self.question_message(question);
                    self.dispatch(vec![(Recipient::All, msg)]);
                }
                None => {
                    self.game.ended = true;
                    self.persist_room();
                    let board = self.leaderboard();
                    self.dispatch(vec![
                        (Recipient::All, ServerMessage::LeaderboardUpdate { leaderboard: board }),
                        (Recipient::All, ServerMessage::GameEnded),
                    ]);
                    info!(room_id = %self.room_id, "no more questions, game ended");
                }
            },
            HostAction::RevealAnswer => {
                let question = self.game.current().cloned().ok_or(RoomError::NoActiveQuestion)?;
                self.game.reveal();
                self.persist_room();
                self.dispatch(vec![(
                    Recipient::All,
                    ServerMessage::Answer {
                        correct_answer: question.answer,
                        score: i64::from(question.points),
                    },
                )]);
            }
            HostAction::ShowLeaderboard => {
                self.game.show_leaderboard();
                let board = self.leaderboard();
                self.dispatch(vec![(
                    Recipient::All,
                    ServerMessage::LeaderboardUpdate { leaderboard: board },
                )]);
            }
            HostAction::EndGame => {
                let board = self.leaderboard();
                self.dispatch(vec![
                    (Recipient::All, ServerMessage::LeaderboardUpdate { leaderboard: board }),
                    (Recipient::All, ServerMessage::GameEnded),
                ]);
                self.game.finish();
                self.persist_room();
                info!(room_id = %self.room_id, "game ended by host");
            }
            HostAction::AnnounceAnswer {
                correct_answer,
                score,
            } => {
                self.game.reveal();
                self.dispatch(vec![(
                    Recipient::All,
                    ServerMessage::Answer {
                        correct_answer,
                        score,
                    },
                )]);
            }
        }

        self.last_activity = now_ms();
        Ok(())
    }

    fn question_message(&self, question: Question) -> ServerMessage {
        ServerMessage::Question {
            question: question.with_timer(self.settings.default_timer),
            question_index: self.game.cursor.unwrap_or_default(),
            total_questions: self.game.questions.len(),
        }
    }

    // -- views --------------------------------------------------------------

    /// Players in join order.
    fn roster(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.seq);
        players
    }

    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.ledger.leaderboard(&self.quiz_master_id, |id| {
            self.players.get(id).and_then(|p| p.avatar.clone())
        })
    }

    fn snapshot(&self, requester: &PlayerId) -> GameSnapshot {
        GameSnapshot {
            room_id: self.room_id,
            phase: self.game.phase(),
            current_question: self
                .game
                .current()
                .map(|q| q.with_timer(self.settings.default_timer)),
            question_index: self.game.question_index(),
            total_questions: self.game.questions.len(),
            player_score: self.ledger.score(requester),
            leaderboard: self.leaderboard(),
            players: self
                .roster()
                .into_iter()
                .filter(|p| p.id != *requester)
                .map(Player::summary)
                .collect(),
            is_active: self.game.is_active,
        }
    }

    fn info(&self) -> RoomInfo {
        let players: Vec<PlayerId> = self.roster().into_iter().map(|p| p.id.clone()).collect();
        RoomInfo {
            room_id: self.room_id,
            quiz_master: self.quiz_master.clone(),
            quiz_master_id: self.quiz_master_id.clone(),
            player_count: players.len(),
            players,
            is_active: self.game.is_active,
            phase: self.game.phase(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    // -- delivery -----------------------------------------------------------

    /// Dispatches outbound messages to the matching members and returns
    /// how many deliveries succeeded.
    ///
    /// Members without a link (inside their grace window) are skipped.
    /// Members whose link is closed or whose send fails are collected and
    /// removed from the room only after the whole batch has gone out.
    fn dispatch(&mut self, msgs: Vec<(Recipient, ServerMessage)>) -> usize {
        let mut delivered = 0;
        let mut failed: Vec<PlayerId> = Vec::new();

        for (recipient, msg) in msgs {
            let kind = msg.kind();
            for player in self.players.values() {
                let wanted = match &recipient {
                    Recipient::All => true,
                    Recipient::Player(id) => player.id == *id,
                    Recipient::AllExcept(id) => player.id != *id,
                };
                let Some(link) = player.link.as_ref().filter(|_| wanted) else {
                    continue;
                };
                if link.is_open() && link.sender.send(msg.clone()).is_ok() {
                    delivered += 1;
                } else if !failed.contains(&player.id) {
                    warn!(room_id = %self.room_id, player_id = %player.id, kind, "delivery failed");
                    failed.push(player.id.clone());
                }
            }
            debug!(room_id = %self.room_id, kind, "dispatched");
        }

        if !failed.is_empty() {
            self.remove_unreachable(failed);
        }
        delivered
    }

    fn remove_unreachable(&mut self, failed: Vec<PlayerId>) {
        let mut host_lost = false;
        for player_id in failed {
            if let Some(player) = self.players.remove(&player_id) {
                self.shared.unindex(&player_id, self.room_id);
                host_lost |= player.is_quiz_master;
                info!(room_id = %self.room_id, %player_id, "removed unreachable player");
            }
        }
        if host_lost {
            self.close("quiz master unreachable");
        } else {
            self.persist_roster();
        }
    }

    /// Marks the room inactive, tells every connected member, drops the
    /// room from the shared registries, and deletes its persisted tables.
    /// The actor loop exits after the current command.
    fn close(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        self.game.is_active = false;

        let notice = ServerMessage::room_closed(ROOM_CLOSED_NOTICE);
        for link in self.players.values().filter_map(|p| p.link.as_ref()) {
            if link.is_open() {
                let _ = link.sender.send(notice.clone());
            }
        }

        for player_id in self.players.keys() {
            self.shared.unindex(player_id, self.room_id);
        }
        self.players.clear();
        self.shared.remove_room(self.room_id);
        self.persister.purge(self.room_id);
        self.closed = true;
        info!(room_id = %self.room_id, reason, "room closed");
    }

    // -- persistence --------------------------------------------------------

    fn record(&self) -> RoomRecord {
        RoomRecord {
            id: self.room_id,
            quiz_master: self.quiz_master.clone(),
            quiz_master_player_id: self.quiz_master_id.clone(),
            settings: self.settings,
            game_state: self.game.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    fn persist_room(&self) {
        self.persister.save_room(self.record());
    }

    fn persist_scores(&self) {
        self.persister.save_scores(self.room_id, self.ledger.to_records());
    }

    fn persist_roster(&self) {
        let roster = self.roster().into_iter().map(Player::record).collect();
        self.persister.save_roster(self.room_id, roster);
    }

    fn persist_all(&self) {
        self.persist_room();
        self.persist_scores();
        self.persist_roster();
    }
}

/// Spawns a room actor task and returns a handle to communicate with it.
///
/// A `fresh` room is persisted before the task starts; a recovered one
/// already is. `channel_size` bounds the command queue.
pub(crate) fn spawn_room(
    seed: RoomSeed,
    fresh: bool,
    shared: Arc<Shared>,
    persister: Persister,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let next_seq = seed.players.iter().map(|p| p.seq + 1).max().unwrap_or(0);
    let actor = RoomActor {
        room_id: seed.room_id,
        quiz_master: seed.quiz_master,
        quiz_master_id: seed.quiz_master_id,
        settings: seed.settings,
        game: seed.game,
        players: seed
            .players
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect(),
        next_seq,
        ledger: seed.ledger,
        created_at: seed.created_at,
        last_activity: seed.last_activity,
        closed: false,
        shared,
        persister,
        receiver: rx,
    };

    for player_id in actor.players.keys() {
        actor.shared.index_player(player_id, actor.room_id);
    }
    if fresh {
        actor.persist_room();
    }

    tokio::spawn(actor.run());

    RoomHandle {
        room_id: seed.room_id,
        sender: tx,
    }
}
