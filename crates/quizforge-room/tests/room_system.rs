//! Integration tests for the room system.

use std::sync::Arc;
use std::time::Duration;

use quizforge_protocol::{
    GamePhase, GameState, PlayerId, Question, RoomId, RoomSettings, ServerMessage,
};
use quizforge_room::{
    HostAction, JoinRequest, PlayerLink, ROOM_CLOSED_NOTICE, RoomError, RoomManager,
};
use quizforge_store::{MemoryStore, RoomRecord, Store};
use quizforge_transport::ConnectionId;
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

type Inbox = mpsc::UnboundedReceiver<ServerMessage>;

fn pid(id: &str) -> PlayerId {
    PlayerId::from(id)
}

fn link(conn: u64) -> (PlayerLink, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PlayerLink::new(ConnectionId::new(conn), tx), rx)
}

fn request(id: &str, name: &str, link: PlayerLink) -> JoinRequest {
    JoinRequest {
        player_id: pid(id),
        name: name.to_string(),
        avatar: None,
        link,
        greet: true,
    }
}

/// Everything queued for a client so far.
fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn kinds(msgs: &[ServerMessage]) -> Vec<&'static str> {
    msgs.iter().map(ServerMessage::kind).collect()
}

fn manager() -> (RoomManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (RoomManager::new(store.clone()), store)
}

/// Creates a room and joins its host on connection 1.
async fn hosted_room(mgr: &RoomManager, settings: RoomSettings) -> (RoomId, Inbox) {
    let room = mgr.create_room("Host", pid("qm"), settings);
    let (l, rx) = link(1);
    let mut req = request("qm", "Host", l);
    req.greet = false;
    mgr.join_room(room, req).await.unwrap();
    (room, rx)
}

async fn join(mgr: &RoomManager, room: RoomId, id: &str, name: &str, conn: u64) -> Inbox {
    let (l, rx) = link(conn);
    mgr.join_room(room, request(id, name, l)).await.unwrap();
    rx
}

fn three_questions() -> Vec<Question> {
    vec![
        Question::ox("Q1", 'O', 10, 50),
        Question::ox("Q2", 'X', 10, 60),
        Question::ox("Q3", 'O', 10, 70),
    ]
}

// =========================================================================
// Room lifecycle
// =========================================================================

#[tokio::test]
async fn test_create_room_ids_increase_from_1000() {
    let (mgr, _) = manager();
    let ids: Vec<RoomId> = (0..3)
        .map(|i| mgr.create_room("Host", pid(&format!("qm{i}")), RoomSettings::default()))
        .collect();
    assert_eq!(ids, vec![RoomId(1000), RoomId(1001), RoomId(1002)]);
    assert_eq!(mgr.room_count(), 3);
}

#[tokio::test]
async fn test_create_room_persists_immediately() {
    let (mgr, store) = manager();
    let room = mgr.create_room("Host", pid("qm"), RoomSettings::with_default_timer(Some(30)));
    mgr.flush().await.unwrap();

    let record = store.load_room(room).unwrap().unwrap();
    assert_eq!(record.quiz_master, "Host");
    assert_eq!(record.settings.default_timer, Some(30));
    assert_eq!(record.game_state.question_index(), -1);
}

#[tokio::test]
async fn test_create_room_skips_recovered_ids() {
    let store = Arc::new(MemoryStore::new());
    store
        .save_room(&RoomRecord {
            id: RoomId(1000),
            quiz_master: "Old".into(),
            quiz_master_player_id: pid("old_qm"),
            settings: RoomSettings::default(),
            game_state: GameState::default(),
            created_at: 0,
            last_activity: 0,
        })
        .unwrap();

    let mgr = RoomManager::new(store.clone());
    assert_eq!(mgr.recover().await.unwrap(), 1);

    let room = mgr.create_room("Host", pid("qm"), RoomSettings::default());
    assert_eq!(room, RoomId(1001));
}

#[tokio::test]
async fn test_close_room_notifies_each_member_once_and_purges() {
    let (mgr, store) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut guest_rx = join(&mgr, room, "p1", "Ann", 2).await;
    drain(&mut host_rx);
    drain(&mut guest_rx);

    mgr.close_room(room).await;
    mgr.close_room(room).await;
    mgr.flush().await.unwrap();

    for rx in [&mut host_rx, &mut guest_rx] {
        let msgs = drain(rx);
        assert_eq!(
            msgs,
            vec![ServerMessage::room_closed(ROOM_CLOSED_NOTICE)],
            "exactly one roomClosed per member"
        );
    }
    assert!(mgr.room_info(room).await.is_none());
    assert!(mgr.rooms_of(&pid("p1")).is_empty());
    assert!(store.is_empty_for(room));
}

#[tokio::test]
async fn test_leave_room_by_quiz_master_closes_room() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut guest_rx = join(&mgr, room, "p1", "Ann", 2).await;
    drain(&mut guest_rx);

    let left = mgr.leave_room(room, &pid("qm")).await.unwrap();
    assert!(left.is_quiz_master);

    assert_eq!(kinds(&drain(&mut guest_rx)), vec!["roomClosed"]);
    assert!(mgr.room_info(room).await.is_none());
}

#[tokio::test]
async fn test_leave_room_by_guest_keeps_ledger_entry() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _rx = join(&mgr, room, "p1", "Ann", 2).await;
    mgr.update_score(room, &pid("p1"), 40).await.unwrap();

    let left = mgr.leave_room(room, &pid("p1")).await.unwrap();
    assert_eq!(left.name, "Ann");
    assert!(mgr.rooms_of(&pid("p1")).is_empty());
    assert!(mgr.leave_room(room, &pid("p1")).await.is_none());

    let board = mgr.leaderboard(room).await;
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].name, "Ann");
    assert_eq!(board[0].score, 40);
}

#[tokio::test]
async fn test_close_idle_rooms() {
    let (mgr, _) = manager();
    let (room, _rx) = hosted_room(&mgr, RoomSettings::default()).await;

    assert!(mgr.close_idle_rooms(Duration::from_secs(3600)).await.is_empty());
    assert_eq!(mgr.close_idle_rooms(Duration::ZERO).await, vec![room]);
    assert_eq!(mgr.room_count(), 0);
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_join_room_greets_joiner_and_announces_to_others() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut ann_rx = join(&mgr, room, "p1", "Ann", 2).await;

    let ann_msgs = drain(&mut ann_rx);
    assert_eq!(kinds(&ann_msgs), vec!["joinedRoom", "newPlayer"]);
    match &ann_msgs[0] {
        ServerMessage::JoinedRoom {
            is_quiz_master, x, y, ..
        } => {
            assert!(!is_quiz_master);
            assert_eq!((*x, *y), (50.0, 50.0));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(kinds(&drain(&mut host_rx)), vec!["newPlayer"]);
}

#[tokio::test]
async fn test_join_room_rejoin_same_id_and_name_reconnects() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _old = join(&mgr, room, "p1", "Ann", 2).await;
    mgr.update_score(room, &pid("p1"), 30).await.unwrap();

    let (l, _new) = link(3);
    let outcome = mgr.join_room(room, request("p1", "Ann", l)).await.unwrap();
    assert!(outcome.reconnected);

    let info = mgr.room_info(room).await.unwrap();
    assert_eq!(info.player_count, 2);
    assert_eq!(mgr.leaderboard(room).await[0].score, 30);
    let linked = mgr.linked_players(room).await;
    assert!(linked.contains(&(pid("p1"), ConnectionId::new(3))));
}

#[tokio::test]
async fn test_join_room_identity_conflicts() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;

    let (l, _rx) = link(3);
    let err = mgr.join_room(room, request("p1", "Bob", l)).await.unwrap_err();
    assert_eq!(err, RoomError::PlayerIdInUse(pid("p1")));

    let (l, _rx) = link(4);
    let err = mgr.join_room(room, request("p2", "Ann", l)).await.unwrap_err();
    assert_eq!(err, RoomError::NameInUse("Ann".into()));

    assert_eq!(mgr.room_info(room).await.unwrap().player_count, 2);
}

#[tokio::test]
async fn test_join_room_unknown_room() {
    let (mgr, _) = manager();
    let (l, _rx) = link(1);
    let err = mgr.join_room(RoomId(4242), request("p1", "Ann", l)).await.unwrap_err();
    assert_eq!(err, RoomError::NotFound(RoomId(4242)));
}

#[tokio::test]
async fn test_join_room_rehydrates_from_store() {
    let store = Arc::new(MemoryStore::new());
    let first = RoomManager::new(store.clone());
    let (room, _host_rx) = hosted_room(&first, RoomSettings::default()).await;
    let _ann = join(&first, room, "p1", "Ann", 2).await;
    first.update_score(room, &pid("p1"), 25).await.unwrap();
    first.flush().await.unwrap();

    // A second manager over the same store knows nothing in memory.
    let second = RoomManager::new(store.clone());
    assert_eq!(second.room_count(), 0);

    let (l, _rx) = link(9);
    let outcome = second.join_room(room, request("p1", "Ann", l)).await.unwrap();
    assert!(outcome.reconnected);
    assert_eq!(second.leaderboard(room).await[0].score, 25);
    // The host came back too, but without a connection.
    let linked = second.linked_players(room).await;
    assert_eq!(linked, vec![(pid("p1"), ConnectionId::new(9))]);
}

// =========================================================================
// Scores and leaderboard
// =========================================================================

#[tokio::test]
async fn test_update_score_ignores_quiz_master_and_accumulates() {
    let (mgr, store) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;

    assert!(mgr.update_score(room, &pid("qm"), 50).await.is_none());
    assert!(mgr.update_score(room, &pid("ghost"), 50).await.is_none());
    assert!(mgr.update_score(RoomId(1), &pid("p1"), 50).await.is_none());

    mgr.update_score(room, &pid("p1"), 30).await.unwrap();
    let outcome = mgr.update_score(room, &pid("p1"), 20).await.unwrap();
    assert_eq!(outcome.total_score, 50);
    assert_eq!(outcome.delta, 20);

    mgr.flush().await.unwrap();
    let scores = store.load_scores(room).unwrap();
    assert_eq!(scores.len(), 1, "quiz master never gets a ledger entry");
    assert_eq!(scores[0].score, 50);
}

#[tokio::test]
async fn test_leaderboard_ranks_and_excludes_quiz_master() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut inboxes = Vec::new();
    for (i, (id, name, score)) in [("p1", "Ann", 100), ("p2", "Bob", 300), ("p3", "Cy", 200)]
        .into_iter()
        .enumerate()
    {
        inboxes.push(join(&mgr, room, id, name, 10 + i as u64).await);
        mgr.update_score(room, &pid(id), score).await.unwrap();
    }

    let board = mgr.leaderboard(room).await;
    let ranked: Vec<(&str, usize)> = board
        .iter()
        .map(|e| (e.player_id.as_str(), e.rank))
        .collect();
    assert_eq!(ranked, vec![("p2", 1), ("p3", 2), ("p1", 3)]);
    assert!(mgr.leaderboard(RoomId(1)).await.is_empty());
}

#[tokio::test]
async fn test_update_score_same_player_id_in_two_rooms() {
    let (mgr, _) = manager();
    let (room_a, _a_host) = hosted_room(&mgr, RoomSettings::default()).await;
    let (room_b, _b_host) = hosted_room(&mgr, RoomSettings::default()).await;
    let _bob = join(&mgr, room_a, "bob_1", "Bob", 10).await;
    let _bobby = join(&mgr, room_b, "bob_1", "Bobby", 11).await;
    assert_eq!(mgr.rooms_of(&pid("bob_1")), vec![room_a, room_b]);

    let outcome = mgr.update_score(room_a, &pid("bob_1"), 30).await.unwrap();
    assert_eq!(outcome.name, "Bob");
    assert_eq!(outcome.total_score, 30);

    let scores = |board: Vec<quizforge_protocol::LeaderboardEntry>| {
        board
            .into_iter()
            .map(|e| (e.name, e.score))
            .collect::<Vec<_>>()
    };
    assert_eq!(scores(mgr.leaderboard(room_a).await), vec![("Bob".to_string(), 30)]);
    assert_eq!(scores(mgr.leaderboard(room_b).await), vec![("Bobby".to_string(), 0)]);

    // Room B's player leaving doesn't touch room A's.
    assert_eq!(mgr.leave_room(room_b, &pid("bob_1")).await.unwrap().name, "Bobby");
    assert_eq!(mgr.rooms_of(&pid("bob_1")), vec![room_a]);
    let outcome = mgr.update_score(room_a, &pid("bob_1"), 5).await.unwrap();
    assert_eq!(outcome.total_score, 35);
}

// =========================================================================
// Questions
// =========================================================================

#[tokio::test]
async fn test_next_question_walks_list_then_none() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    assert!(mgr.set_questions(room, three_questions()).await);

    let q1 = mgr.next_question(room).await.unwrap();
    let q2 = mgr.next_question(room).await.unwrap();
    assert_eq!(mgr.current_question(room).await.unwrap().prompt, "Q2");
    let q3 = mgr.next_question(room).await.unwrap();
    assert!(mgr.next_question(room).await.is_none());

    assert_eq!(
        [q1.prompt, q2.prompt, q3.prompt],
        ["Q1".to_string(), "Q2".to_string(), "Q3".to_string()]
    );
    assert_eq!(mgr.current_question(room).await.unwrap().prompt, "Q3");
}

#[tokio::test]
async fn test_set_questions_mid_game_keeps_cursor() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    mgr.set_questions(room, three_questions()).await;
    mgr.next_question(room).await;
    mgr.next_question(room).await;

    mgr.set_questions(room, three_questions()).await;
    assert_eq!(mgr.current_question(room).await.unwrap().prompt, "Q2");
}

// =========================================================================
// Broadcast
// =========================================================================

#[tokio::test]
async fn test_broadcast_removes_closed_player_after_delivery() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut ann_rx = join(&mgr, room, "p1", "Ann", 2).await;
    let bob_rx = join(&mgr, room, "p2", "Bob", 3).await;
    drop(bob_rx);
    drain(&mut host_rx);
    drain(&mut ann_rx);

    let delivered = mgr.broadcast(room, ServerMessage::GameEnded, None).await;
    assert_eq!(delivered, 2);
    assert_eq!(kinds(&drain(&mut host_rx)), vec!["gameEnded"]);
    assert_eq!(kinds(&drain(&mut ann_rx)), vec!["gameEnded"]);

    let info = mgr.room_info(room).await.unwrap();
    assert_eq!(info.players, vec![pid("qm"), pid("p1")]);
    assert!(mgr.rooms_of(&pid("p2")).is_empty());
}

#[tokio::test]
async fn test_broadcast_excludes_sender() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut ann_rx = join(&mgr, room, "p1", "Ann", 2).await;
    drain(&mut host_rx);
    drain(&mut ann_rx);

    let delivered = mgr
        .broadcast(room, ServerMessage::GameEnded, Some(&pid("p1")))
        .await;
    assert_eq!(delivered, 1);
    assert!(drain(&mut ann_rx).is_empty());
}

#[tokio::test]
async fn test_broadcast_skips_players_in_grace_window() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;

    assert!(mgr.mark_disconnected(room, &pid("p1"), ConnectionId::new(2)).await);
    let delivered = mgr.broadcast(room, ServerMessage::GameEnded, None).await;
    assert_eq!(delivered, 1);
    assert_eq!(mgr.room_info(room).await.unwrap().player_count, 2);
}

#[tokio::test]
async fn test_move_player_clamps_and_skips_sender() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut ann_rx = join(&mgr, room, "p1", "Ann", 2).await;
    drain(&mut host_rx);
    drain(&mut ann_rx);

    mgr.move_player(room, &pid("p1"), 150.0, -3.0).await.unwrap();
    assert_eq!(
        drain(&mut host_rx),
        vec![ServerMessage::PositionUpdate {
            id: "Ann".into(),
            player_id: pid("p1"),
            x: 100.0,
            y: 0.0,
        }]
    );
    assert!(drain(&mut ann_rx).is_empty());

    let err = mgr.move_player(room, &pid("ghost"), 1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, RoomError::NotInRoom(..)));
}

// =========================================================================
// Connection state
// =========================================================================

#[tokio::test]
async fn test_mark_disconnected_ignores_stale_connection() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _old = join(&mgr, room, "p1", "Ann", 2).await;
    let (l, _new) = link(3);
    mgr.join_room(room, request("p1", "Ann", l)).await.unwrap();

    assert!(!mgr.mark_disconnected(room, &pid("p1"), ConnectionId::new(2)).await);
    assert!(mgr.mark_disconnected(room, &pid("p1"), ConnectionId::new(3)).await);
}

#[tokio::test]
async fn test_expire_if_disconnected_only_when_unlinked() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;

    assert!(mgr.expire_if_disconnected(room, &pid("p1")).await.is_none());
    mgr.mark_disconnected(room, &pid("p1"), ConnectionId::new(2)).await;
    let expired = mgr.expire_if_disconnected(room, &pid("p1")).await.unwrap();
    assert_eq!(expired.name, "Ann");
    assert!(mgr.rooms_of(&pid("p1")).is_empty());
}

#[tokio::test]
async fn test_prune_player_removes_without_closing() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;

    assert!(mgr.prune_player(room, &pid("p1")).await);
    assert!(!mgr.prune_player(room, &pid("p1")).await);
    let info = mgr.room_info(room).await.unwrap();
    assert_eq!(info.players, vec![pid("qm")]);
    assert!(info.is_active);
}

// =========================================================================
// Host actions
// =========================================================================

#[tokio::test]
async fn test_host_actions_require_quiz_master() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;
    mgr.set_questions(room, three_questions()).await;

    for action in [
        HostAction::StartGame,
        HostAction::NextQuestion,
        HostAction::RevealAnswer,
        HostAction::ShowLeaderboard,
        HostAction::EndGame,
    ] {
        let err = mgr.host(room, &pid("p1"), action).await.unwrap_err();
        assert_eq!(err, RoomError::NotQuizMaster);
    }
    assert!(mgr.verify_host(room, &pid("qm")).await.is_ok());
    assert!(mgr.current_question(room).await.is_none(), "no state change");
}

#[tokio::test]
async fn test_start_game_without_questions_errors() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let err = mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap_err();
    assert_eq!(err, RoomError::NoQuestions);
}

#[tokio::test]
async fn test_start_game_broadcasts_first_question_with_room_timer() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::with_default_timer(Some(45))).await;
    let mut ann_rx = join(&mgr, room, "p1", "Ann", 2).await;
    mgr.set_questions(room, three_questions()).await;
    drain(&mut host_rx);
    drain(&mut ann_rx);

    mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap();

    for rx in [&mut host_rx, &mut ann_rx] {
        match drain(rx).as_slice() {
            [ServerMessage::Question {
                question,
                question_index,
                total_questions,
            }] => {
                assert_eq!(question.prompt, "Q1");
                assert_eq!(question.countdown_secs, 45);
                assert_eq!((*question_index, *total_questions), (0, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_reveal_answer_sends_correct_key() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    mgr.set_questions(room, three_questions()).await;

    let err = mgr.host(room, &pid("qm"), HostAction::RevealAnswer).await.unwrap_err();
    assert_eq!(err, RoomError::NoActiveQuestion);

    mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap();
    drain(&mut host_rx);
    mgr.host(room, &pid("qm"), HostAction::RevealAnswer).await.unwrap();
    assert_eq!(
        drain(&mut host_rx),
        vec![ServerMessage::Answer {
            correct_answer: "O".into(),
            score: 50,
        }]
    );
    let snapshot = mgr.game_snapshot(room, &pid("qm")).await.unwrap();
    assert_eq!(snapshot.phase, GamePhase::Reveal);
}

#[tokio::test]
async fn test_next_question_past_end_ends_game() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    mgr.set_questions(room, vec![Question::ox("Only", 'X', 10, 50)]).await;
    mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap();
    drain(&mut host_rx);

    mgr.host(room, &pid("qm"), HostAction::NextQuestion).await.unwrap();
    assert_eq!(kinds(&drain(&mut host_rx)), vec!["leaderboardUpdate", "gameEnded"]);
    let snapshot = mgr.game_snapshot(room, &pid("qm")).await.unwrap();
    assert_eq!(snapshot.phase, GamePhase::Ended);
}

#[tokio::test]
async fn test_end_game_broadcasts_then_rewinds() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    mgr.set_questions(room, three_questions()).await;
    mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap();
    mgr.host(room, &pid("qm"), HostAction::NextQuestion).await.unwrap();
    drain(&mut host_rx);

    mgr.host(room, &pid("qm"), HostAction::EndGame).await.unwrap();
    assert_eq!(kinds(&drain(&mut host_rx)), vec!["leaderboardUpdate", "gameEnded"]);
    assert!(mgr.current_question(room).await.is_none());

    // The host can run the quiz again from the top.
    mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap();
    assert_eq!(mgr.current_question(room).await.unwrap().prompt, "Q1");
}

#[tokio::test]
async fn test_announce_answer_is_broadcast_verbatim() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let mut ann_rx = join(&mgr, room, "p1", "Ann", 2).await;
    drain(&mut host_rx);
    drain(&mut ann_rx);

    mgr.host(
        room,
        &pid("qm"),
        HostAction::AnnounceAnswer {
            correct_answer: "B".into(),
            score: 80,
        },
    )
    .await
    .unwrap();

    let expected = vec![ServerMessage::Answer {
        correct_answer: "B".into(),
        score: 80,
    }];
    assert_eq!(drain(&mut host_rx), expected);
    assert_eq!(drain(&mut ann_rx), expected);
}

// =========================================================================
// Views
// =========================================================================

#[tokio::test]
async fn test_game_snapshot_excludes_requester() {
    let (mgr, _) = manager();
    let (room, _host_rx) = hosted_room(&mgr, RoomSettings::with_default_timer(Some(20))).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;
    mgr.update_score(room, &pid("p1"), 15).await.unwrap();
    mgr.set_questions(room, three_questions()).await;

    let waiting = mgr.game_snapshot(room, &pid("p1")).await.unwrap();
    assert_eq!(waiting.phase, GamePhase::Waiting);
    assert_eq!(waiting.question_index, -1);
    assert_eq!(waiting.player_score, 15);
    assert_eq!(waiting.players.len(), 1);
    assert_eq!(waiting.players[0].player_id, pid("qm"));

    mgr.host(room, &pid("qm"), HostAction::StartGame).await.unwrap();
    let playing = mgr.game_snapshot(room, &pid("p1")).await.unwrap();
    assert_eq!(playing.phase, GamePhase::Question);
    assert_eq!(playing.current_question.unwrap().countdown_secs, 20);
    assert_eq!(playing.total_questions, 3);

    assert!(mgr.game_snapshot(RoomId(77), &pid("p1")).await.is_none());
}

#[tokio::test]
async fn test_send_existing_players_lists_guests_then_stats() {
    let (mgr, _) = manager();
    let (room, mut host_rx) = hosted_room(&mgr, RoomSettings::default()).await;
    let _ann = join(&mgr, room, "p1", "Ann", 2).await;
    let _bob = join(&mgr, room, "p2", "Bob", 3).await;
    drain(&mut host_rx);

    mgr.send_existing_players(room, &pid("qm")).await.unwrap();
    let msgs = drain(&mut host_rx);
    assert_eq!(kinds(&msgs), vec!["newPlayer", "newPlayer", "roomStats"]);
    assert_eq!(
        msgs[2],
        ServerMessage::RoomStats {
            room_id: room,
            player_count: 3,
            players: vec![pid("p1"), pid("p2")],
        }
    );
}

#[tokio::test]
async fn test_all_room_info_ordered_by_id() {
    let (mgr, _) = manager();
    let a = mgr.create_room("A", pid("qa"), RoomSettings::default());
    let b = mgr.create_room("B", pid("qb"), RoomSettings::default());
    let infos = mgr.all_room_info().await;
    let ids: Vec<RoomId> = infos.iter().map(|i| i.room_id).collect();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(infos[1].quiz_master, "B");
    assert!(infos.iter().all(|i| i.is_active && i.player_count == 0));
}
