//! Tests for room lifecycle, matchmaking and disconnect handling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::NamedTempFile;
use uuid::Uuid;

use grid_arena::{
    ArenaError, BOT_PLAYER_ID, Difficulty, FeeSchedule, GameMode, GameRepository, GameStatus, GameStore,
    MatchOrchestrator, MoveError, Player, RATING_DELTA, RoomStatus, STARTING_RATING,
};

const FEE: u64 = 10_000_000;

fn setup() -> (NamedTempFile, Arc<GameRepository>, MatchOrchestrator) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = Arc::new(GameRepository::new(db_path).expect("Failed to create repository"));
    repo.run_migrations().expect("Migrations failed");
    let store: Arc<dyn GameStore> = repo.clone();
    let orchestrator = MatchOrchestrator::new(store, FeeSchedule::flat(FEE));
    (db_file, repo, orchestrator)
}

#[test]
fn test_create_room_waits_for_second_player() {
    let (_db, repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    assert_eq!(*room.status(), RoomStatus::Waiting);
    assert_eq!(room.players().len(), 1);
    assert!(arena.snapshot(room.room_id()).is_none());

    let row = repo.get_room(room.room_id()).expect("Query failed").expect("Room missing");
    assert_eq!(row.status(), "WAITING");
    assert!(repo.get_user("alice").expect("Query failed").is_some());
}

#[test]
fn test_join_activates_room() {
    let (_db, repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedMid).expect("Create failed");
    let joined = arena.join_room(room.room_id(), "bob").expect("Join failed");

    assert_eq!(*joined.status(), RoomStatus::Active);
    assert_eq!(joined.symbol_of("alice"), Some(Player::X));
    assert_eq!(joined.symbol_of("bob"), Some(Player::O));
    let snapshot = arena.snapshot(room.room_id()).expect("No live game");
    assert_eq!(snapshot.board.size(), 6);

    let row = repo.get_room(room.room_id()).expect("Query failed").expect("Room missing");
    assert_eq!(row.status(), "ACTIVE");
    assert_eq!(row.player_o().as_deref(), Some("bob"));
}

#[test]
fn test_join_is_idempotent() {
    let (_db, _repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    arena.join_room(room.room_id(), "bob").expect("Join failed");
    arena.apply_move(room.room_id(), 1, 1, Player::X).expect("Move failed");

    let again = arena.join_room(room.room_id(), "bob").expect("Rejoin failed");
    assert_eq!(again.players().len(), 2);
    // The running game is untouched.
    assert_eq!(arena.snapshot(room.room_id()).expect("No game").moves.len(), 1);
}

#[test]
fn test_join_full_room_rejected() {
    let (_db, _repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    arena.join_room(room.room_id(), "bob").expect("Join failed");
    let result = arena.join_room(room.room_id(), "carol");
    assert!(matches!(result, Err(ArenaError::RoomFull(_))));
}

#[test]
fn test_join_missing_room_rejected() {
    let (_db, _repo, arena) = setup();
    let result = arena.join_room("no-such-room", "bob");
    assert!(matches!(result, Err(ArenaError::RoomNotFound(_))));
}

#[test]
fn test_move_in_waiting_room_rejected() {
    let (_db, _repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    let result = arena.apply_move(room.room_id(), 0, 0, Player::X);
    assert!(matches!(result, Err(ArenaError::GameNotActive(_))));
}

#[test]
fn test_engine_errors_surface_as_invalid_move() {
    let (_db, _repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    arena.join_room(room.room_id(), "bob").expect("Join failed");
    let result = arena.apply_move(room.room_id(), 0, 0, Player::O);
    assert!(matches!(
        result,
        Err(ArenaError::InvalidMove(MoveError::WrongPlayer(Player::O)))
    ));
}

#[test]
fn test_matchmaking_pairs_fifo_and_earlier_ticket_plays_x() {
    let (_db, _repo, arena) = setup();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    arena.enqueue("alice", GameMode::RankedLow, a);
    assert!(arena.try_match("alice", GameMode::RankedLow).is_none());
    std::thread::sleep(Duration::from_millis(2));
    arena.enqueue("bob", GameMode::RankedLow, b);
    std::thread::sleep(Duration::from_millis(2));
    arena.enqueue("carol", GameMode::RankedLow, c);
    assert_eq!(arena.queue_depth(GameMode::RankedLow), 3);

    let (requester, opponent) = arena.try_match("carol", GameMode::RankedLow).expect("No match");
    assert_eq!(requester.player_id, "carol");
    assert_eq!(opponent.player_id, "alice");
    assert_eq!(arena.queue_depth(GameMode::RankedLow), 1);

    let room = arena.create_matched_room(&requester, &opponent).expect("Room failed");
    assert_eq!(*room.status(), RoomStatus::Active);
    assert_eq!(room.symbol_of("alice"), Some(Player::X));
    assert_eq!(room.symbol_of("carol"), Some(Player::O));
}

#[test]
fn test_modes_queue_independently() {
    let (_db, _repo, arena) = setup();
    arena.enqueue("alice", GameMode::RankedLow, Uuid::new_v4());
    arena.enqueue("bob", GameMode::RankedHigh, Uuid::new_v4());
    assert!(arena.try_match("bob", GameMode::RankedHigh).is_none());
    assert!(arena.dequeue("alice", GameMode::RankedLow));
    assert!(!arena.dequeue("alice", GameMode::RankedLow));
    assert_eq!(arena.queue_depth(GameMode::RankedLow), 0);
}

#[test]
fn test_finish_game_records_and_rates() {
    let (_db, repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedMid).expect("Create failed");
    let id = room.room_id().clone();
    arena.join_room(&id, "bob").expect("Join failed");

    for (row, col) in [(0, 0), (5, 0), (0, 1), (5, 1), (0, 2), (5, 2), (0, 3)] {
        let turn = arena.snapshot(&id).expect("No game").current_player;
        arena.apply_move(&id, row, col, turn).expect("Move failed");
    }
    let snapshot = arena.snapshot(&id).expect("No game");
    assert_eq!(snapshot.status, GameStatus::Won(Player::X));

    let record = arena.finish_game(&id, snapshot.winner).expect("Finish failed");
    assert_eq!(record.winner.as_deref(), Some("alice"));
    assert_eq!(record.moves.len(), 7);
    assert_eq!(record.stake_lamports, FEE);
    assert_eq!(*arena.room(&id).expect("Room gone").status(), RoomStatus::Finished);
    assert!(arena.snapshot(&id).is_none());

    let games = repo.games_for_room(&id).expect("Query failed");
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].player_o(), "bob");

    let alice = repo.get_user("alice").expect("Query failed").expect("Missing");
    let bob = repo.get_user("bob").expect("Query failed").expect("Missing");
    assert_eq!(*alice.rating(), STARTING_RATING + RATING_DELTA);
    assert_eq!(*bob.rating(), STARTING_RATING - RATING_DELTA);

    // A finished game cannot be finished twice.
    assert!(matches!(arena.finish_game(&id, None), Err(ArenaError::GameNotActive(_))));
}

#[test]
fn test_practice_room_bot_answers() {
    let (_db, repo, arena) = setup();
    let room = arena
        .create_practice_room("alice", GameMode::Bot, Difficulty::Hard)
        .expect("Practice failed");
    let id = room.room_id().clone();
    assert!(room.is_practice());
    assert_eq!(room.player_for(Player::O).map(String::as_str), Some(BOT_PLAYER_ID));

    let mut rng = StdRng::seed_from_u64(5);
    // X to move: the bot waits.
    assert!(arena.play_bot_turn(&id, &mut rng).expect("Bot failed").is_none());

    arena.apply_move(&id, 3, 3, Player::X).expect("Move failed");
    let (coord, snapshot) = arena
        .play_bot_turn(&id, &mut rng)
        .expect("Bot failed")
        .expect("Bot did not move");
    assert_eq!(snapshot.moves.len(), 2);
    assert_ne!((coord.row, coord.col), (3, 3));
    assert_eq!(snapshot.current_player, Player::X);

    let record = arena.finish_game(&id, Some(Player::X)).expect("Finish failed");
    assert_eq!(record.stake_lamports, 0);
    assert!(repo.get_user(BOT_PLAYER_ID).expect("Query failed").is_none());
}

#[test]
fn test_disconnect_abandons_active_room() {
    let (_db, repo, arena) = setup();
    let room = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    let id = room.room_id().clone();
    arena.join_room(&id, "bob").expect("Join failed");

    let (alice_conn, bob_conn) = (Uuid::new_v4(), Uuid::new_v4());
    arena.bind_connection(alice_conn, "alice", Some(&id));
    arena.bind_connection(bob_conn, "bob", Some(&id));
    assert_eq!(arena.connection_of("bob"), Some(bob_conn));

    let outcome = arena.handle_disconnect(alice_conn).expect("No binding");
    assert_eq!(outcome.player_id, "alice");
    assert_eq!(outcome.room_id.as_deref(), Some(id.as_str()));
    assert_eq!(outcome.opponent.as_deref(), Some("bob"));
    assert_eq!(outcome.mode, Some(GameMode::RankedLow));

    assert_eq!(*arena.room(&id).expect("Room gone").status(), RoomStatus::Finished);
    assert!(arena.player_of(alice_conn).is_none());
    assert!(repo.games_for_room(&id).expect("Query failed").is_empty());

    // The remaining player's disconnect finds nothing left to abandon.
    let second = arena.handle_disconnect(bob_conn).expect("No binding");
    assert!(second.room_id.is_none());
}

#[test]
fn test_disconnect_drops_queued_tickets() {
    let (_db, _repo, arena) = setup();
    let conn = Uuid::new_v4();
    arena.bind_connection(conn, "alice", None);
    arena.enqueue("alice", GameMode::RankedHigh, conn);

    let outcome = arena.handle_disconnect(conn).expect("No binding");
    assert!(outcome.room_id.is_none());
    assert_eq!(arena.queue_depth(GameMode::RankedHigh), 0);
    assert!(arena.handle_disconnect(conn).is_none());
}

#[test]
fn test_finished_rooms_are_swept_after_retention() {
    let (_db, _repo, arena) = setup();
    let finished = arena.create_room("alice", GameMode::RankedLow).expect("Create failed");
    let finished_id = finished.room_id().clone();
    arena.join_room(&finished_id, "bob").expect("Join failed");
    arena.finish_game(&finished_id, None).expect("Finish failed");

    let abandoned = arena.create_room("carol", GameMode::RankedLow).expect("Create failed");
    let conn = Uuid::new_v4();
    arena.bind_connection(conn, "carol", Some(abandoned.room_id()));
    arena.handle_disconnect(conn).expect("No binding");

    let waiting = arena.create_room("dave", GameMode::RankedLow).expect("Create failed");
    assert_eq!(arena.room_count(), 3);

    let retention = TimeDelta::seconds(60);
    assert_eq!(arena.sweep_finished_rooms_at(Utc::now(), retention), 0);

    let later = Utc::now() + TimeDelta::seconds(120);
    assert_eq!(arena.sweep_finished_rooms_at(later, retention), 2);
    assert!(arena.room(&finished_id).is_none());
    assert!(arena.room(abandoned.room_id()).is_none());
    assert_eq!(*arena.room(waiting.room_id()).expect("Waiting room swept").status(), RoomStatus::Waiting);
    assert_eq!(arena.room_count(), 1);
}
