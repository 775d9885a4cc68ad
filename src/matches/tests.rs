#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::service::{MatchLifecycle, MatchLifecycleParts, MatchService};
use super::storage::{InMemoryMatchStorage, MatchStorage, MatchStorageTxn};
use super::types::*;
use super::MatchError;
use crate::config::MatchRules;
use crate::coordination::InMemoryCoordinationStore;
use crate::engine::ludo::{MoveKind, PieceId, Pieces, Position, UserId};
use crate::notify::NotificationKind;
use crate::realtime::protocol::{ServerEvent, TurnChangeReason};
use crate::test_utils::{Delivery, RecordingBroadcaster, RecordingNotifier, ScriptedDice};

struct Harness {
    service: Arc<MatchLifecycle>,
    storage: InMemoryMatchStorage,
    broadcaster: Arc<RecordingBroadcaster>,
    notifier: Arc<RecordingNotifier>,
    dice: Arc<ScriptedDice>,
}

struct Duel {
    match_id: MatchId,
    red: UserId,
    green: UserId,
}

fn harness() -> Harness {
    let storage = InMemoryMatchStorage::new();
    build_harness(storage.clone(), Arc::new(storage), MatchRules::default())
}

fn build_harness(
    storage: InMemoryMatchStorage,
    backend: Arc<dyn MatchStorage>,
    rules: MatchRules,
) -> Harness {
    let broadcaster = RecordingBroadcaster::new();
    let notifier = RecordingNotifier::new();
    let dice = ScriptedDice::new(Vec::new());
    let service = MatchLifecycle::new(MatchLifecycleParts {
        storage: backend,
        coordination: Arc::new(InMemoryCoordinationStore::new()),
        broadcaster: broadcaster.clone(),
        notifier: notifier.clone(),
        dice: dice.clone(),
        rules,
    });
    Harness {
        service,
        storage,
        broadcaster,
        notifier,
        dice,
    }
}

fn money(value: i64) -> Decimal {
    Decimal::from(value)
}

fn piece(index: u8) -> PieceId {
    PieceId::new(index).expect("test piece id")
}

fn pieces_at(positions: [i16; 4]) -> Pieces {
    let mut pieces = Pieces::initial();
    for (id, raw) in PieceId::ALL.into_iter().zip(positions) {
        pieces.set_position(id, Position::new(raw).expect("test position in range"));
    }
    pieces
}

fn duel_request(fee: i64) -> CreateMatchRequest {
    CreateMatchRequest {
        game_mode: GameMode::OneVOne,
        entry_fee: money(fee),
    }
}

fn validation_message(err: MatchError) -> String {
    match err {
        MatchError::Validation(message) => message,
        other => panic!("expected validation error, got {other:?}"),
    }
}

async fn funded_user(h: &Harness, name: &str, spendable: i64) -> UserId {
    let user_id = h.storage.seed_user(name, UserRole::User).await;
    h.storage
        .seed_wallet(user_id, money(spendable), Decimal::ZERO)
        .await;
    user_id
}

/// Lets detached notification tasks run.
async fn drain_background() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn started_duel(h: &Harness, fee: i64) -> anyhow::Result<Duel> {
    let red = funded_user(h, "red", 100).await;
    let green = funded_user(h, "green", 100).await;
    let created = h.service.create_match(red, duel_request(fee)).await?;
    h.service.join_match(green, created.id).await?;
    h.service.player_ready(red, created.id).await?;
    let outcome = h.service.player_ready(green, created.id).await?;
    assert!(outcome.all_ready);
    Ok(Duel {
        match_id: created.id,
        red,
        green,
    })
}

async fn record(h: &Harness, match_id: MatchId) -> MatchRecord {
    h.storage
        .match_record(match_id)
        .await
        .expect("match should exist")
}

#[tokio::test]
async fn create_match_prices_pool_and_escrows_fee() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;

    let summary = h.service.create_match(host, duel_request(10)).await?;

    assert_eq!(summary.status, MatchStatus::Waiting);
    assert_eq!(summary.prize_pool, money(20));
    assert_eq!(summary.platform_fee, money(2));
    assert_eq!(summary.max_players, 2);
    assert_eq!(summary.current_players, 1);
    assert_eq!(summary.code.len(), 6);
    assert_eq!(summary.players[0].username, "host");

    let wallet = h.storage.wallet(host).await.expect("wallet");
    assert_eq!(wallet.spendable, money(90));
    assert_eq!(wallet.locked, money(10));

    let wagers = h.storage.wagers(summary.id).await;
    assert_eq!(wagers.len(), 1);
    assert_eq!(wagers[0].status, WagerStatus::Active);
    assert_eq!(wagers[0].potential_win, money(18));
    Ok(())
}

#[tokio::test]
async fn four_player_pool_scales_with_seats() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;

    let summary = h
        .service
        .create_match(
            host,
            CreateMatchRequest {
                game_mode: GameMode::FourPlayer,
                entry_fee: Decimal::new(250, 2),
            },
        )
        .await?;

    assert_eq!(summary.prize_pool, money(10));
    assert_eq!(summary.platform_fee, money(1));
    assert_eq!(summary.max_players, 4);
    Ok(())
}

#[tokio::test]
async fn banned_user_cannot_create() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;
    h.storage.set_banned(host, true).await;

    let err = h
        .service
        .create_match(host, duel_request(10))
        .await
        .expect_err("banned users are refused");
    assert!(matches!(err, MatchError::Forbidden(_)));
    assert_eq!(h.storage.wallet(host).await.expect("wallet").spendable, money(100));
    Ok(())
}

#[tokio::test]
async fn join_fills_match_and_announces_ready() -> anyhow::Result<()> {
    let h = harness();
    let red = funded_user(&h, "red", 100).await;
    let green = funded_user(&h, "green", 100).await;
    let created = h.service.create_match(red, duel_request(10)).await?;

    let joined = h.service.join_match(green, created.id).await?;

    assert_eq!(joined.status, MatchStatus::Ready);
    assert_eq!(joined.current_players, 2);
    assert_eq!(joined.players.len(), 2);
    assert_eq!(joined.players[1].color, crate::engine::ludo::Color::Green);
    assert_eq!(h.broadcaster.room_events(created.id), vec!["match_ready"]);

    let third = funded_user(&h, "late", 100).await;
    let err = h
        .service
        .join_match(third, created.id)
        .await
        .expect_err("ready match is closed");
    assert_eq!(validation_message(err), "Match is not open for joining");
    Ok(())
}

#[tokio::test]
async fn joining_twice_is_rejected() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;
    let created = h
        .service
        .create_match(
            host,
            CreateMatchRequest {
                game_mode: GameMode::FourPlayer,
                entry_fee: money(5),
            },
        )
        .await?;

    let err = h
        .service
        .join_match(host, created.id)
        .await
        .expect_err("host already seated");
    assert_eq!(validation_message(err), "Already in this match");
    Ok(())
}

#[tokio::test]
async fn insufficient_balance_leaves_everything_untouched() -> anyhow::Result<()> {
    let h = harness();
    let red = funded_user(&h, "red", 100).await;
    let poor = funded_user(&h, "poor", 5).await;
    let created = h.service.create_match(red, duel_request(10)).await?;
    let before = record(&h, created.id).await;

    let err = h
        .service
        .join_match(poor, created.id)
        .await
        .expect_err("five cannot cover ten");
    assert_eq!(validation_message(err), "Insufficient balance");

    assert_eq!(record(&h, created.id).await, before);
    assert_eq!(h.storage.players(created.id).await.len(), 1);
    assert_eq!(h.storage.wagers(created.id).await.len(), 1);
    let wallet = h.storage.wallet(poor).await.expect("wallet");
    assert_eq!(wallet.spendable, money(5));
    assert_eq!(wallet.locked, Decimal::ZERO);
    Ok(())
}

#[tokio::test]
async fn bonus_covers_the_remainder_of_a_fee() -> anyhow::Result<()> {
    let h = harness();
    let host = h.storage.seed_user("host", UserRole::User).await;
    h.storage.seed_wallet(host, money(4), money(10)).await;

    h.service.create_match(host, duel_request(10)).await?;

    let wallet = h.storage.wallet(host).await.expect("wallet");
    assert_eq!(wallet.spendable, Decimal::ZERO);
    assert_eq!(wallet.bonus, money(4));
    assert_eq!(wallet.locked, money(10));
    Ok(())
}

#[tokio::test]
async fn all_ready_starts_with_first_seat() -> anyhow::Result<()> {
    let h = harness();
    let red = funded_user(&h, "red", 100).await;
    let green = funded_user(&h, "green", 100).await;
    let created = h.service.create_match(red, duel_request(10)).await?;
    h.service.join_match(green, created.id).await?;

    let first = h.service.player_ready(green, created.id).await?;
    assert!(!first.all_ready);
    assert!(first.started.is_none());

    let second = h.service.player_ready(red, created.id).await?;
    let started = second.started.expect("match starts once everyone is ready");
    assert_eq!(started.user_id, red);

    let live = record(&h, created.id).await;
    assert_eq!(live.status, MatchStatus::InProgress);
    assert_eq!(live.turn_user_id, Some(red));
    assert_eq!(live.turn_number, 1);
    assert!(live.started_at.is_some());
    assert!(h.service.has_turn_timer(created.id));
    assert!(h
        .broadcaster
        .room_events(created.id)
        .contains(&"game_started"));
    Ok(())
}

#[tokio::test]
async fn leaving_a_waiting_match_refunds_and_cancels() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;
    let created = h.service.create_match(host, duel_request(10)).await?;

    h.service.leave_match(host, created.id).await?;

    let cancelled = record(&h, created.id).await;
    assert_eq!(cancelled.status, MatchStatus::Cancelled);
    assert_eq!(cancelled.current_players, 0);
    assert!(cancelled.ended_at.is_some());

    let wallet = h.storage.wallet(host).await.expect("wallet");
    assert_eq!(wallet.spendable, money(100));
    assert_eq!(wallet.locked, Decimal::ZERO);
    assert_eq!(wallet.total_wagered, Decimal::ZERO);
    assert_eq!(h.storage.wagers(created.id).await[0].status, WagerStatus::Refunded);
    Ok(())
}

#[tokio::test]
async fn leaving_a_ready_match_reopens_it() -> anyhow::Result<()> {
    let h = harness();
    let red = funded_user(&h, "red", 100).await;
    let green = funded_user(&h, "green", 100).await;
    let created = h.service.create_match(red, duel_request(10)).await?;
    h.service.join_match(green, created.id).await?;
    h.service.player_ready(red, created.id).await?;

    h.service.leave_match(green, created.id).await?;

    let reopened = record(&h, created.id).await;
    assert_eq!(reopened.status, MatchStatus::Waiting);
    assert_eq!(reopened.current_players, 1);
    assert!(
        !h.service.coordination().is_ready(created.id, red).await?,
        "ready flags reset when the roster changes"
    );
    assert_eq!(h.storage.wallet(green).await.expect("wallet").spendable, money(100));
    Ok(())
}

#[tokio::test]
async fn started_match_cannot_be_left() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let err = h
        .service
        .leave_match(duel.red, duel.match_id)
        .await
        .expect_err("no leaving mid-game");
    assert!(matches!(err, MatchError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn only_the_turn_holder_may_roll() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let err = h
        .service
        .roll_dice(duel.green, duel.match_id)
        .await
        .expect_err("green is waiting");
    assert_eq!(validation_message(err), "Not your turn");
    Ok(())
}

#[tokio::test]
async fn non_six_without_moves_passes_and_records_a_pass() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.dice.push([3]);

    let outcome = h.service.roll_dice(duel.red, duel.match_id).await?;

    assert_eq!(outcome.dice_value, 3);
    assert!(outcome.valid_moves.is_empty());
    assert!(outcome.turn_passed);
    assert_eq!(record(&h, duel.match_id).await.turn_user_id, Some(duel.green));

    let moves = h.storage.moves(duel.match_id).await;
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].kind, MoveKind::Pass);
    assert_eq!(moves[0].piece_id, None);
    assert_eq!(moves[0].turn_number, 1);

    let turn_change = h.broadcaster.deliveries().into_iter().find_map(|d| match d {
        Delivery::Match(_, ServerEvent::TurnChange { reason, user_id, .. }) => {
            Some((reason, user_id))
        }
        _ => None,
    });
    assert_eq!(turn_change, Some((TurnChangeReason::NoValidMoves, duel.green)));
    Ok(())
}

#[tokio::test]
async fn six_without_moves_keeps_the_turn() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([57, 57, 57, 55]))
        .await;
    h.dice.push([6]);

    let outcome = h.service.roll_dice(duel.red, duel.match_id).await?;

    assert!(outcome.valid_moves.is_empty());
    assert!(!outcome.forfeited);
    let live = record(&h, duel.match_id).await;
    assert_eq!(live.turn_user_id, Some(duel.red));
    assert_eq!(live.turn_number, 2);
    assert!(h.storage.moves(duel.match_id).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn rolling_again_before_moving_is_rejected() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([10, -1, -1, -1]))
        .await;
    h.dice.push([4, 4]);

    let outcome = h.service.roll_dice(duel.red, duel.match_id).await?;
    assert_eq!(outcome.valid_moves.len(), 1);
    assert!(h.broadcaster.deliveries().iter().any(|d| matches!(
        d,
        Delivery::User(user, ServerEvent::ValidMoves { .. }) if *user == duel.red
    )));

    let err = h
        .service
        .roll_dice(duel.red, duel.match_id)
        .await
        .expect_err("pending roll must be used first");
    assert_eq!(validation_message(err), "Dice already rolled, move a piece");
    Ok(())
}

#[tokio::test]
async fn moving_requires_a_matching_pending_roll() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([10, -1, -1, -1]))
        .await;

    let err = h
        .service
        .move_piece(duel.red, duel.match_id, piece(0))
        .await
        .expect_err("no roll yet");
    assert_eq!(validation_message(err), "No pending dice roll, roll first");

    h.dice.push([4]);
    h.service.roll_dice(duel.red, duel.match_id).await?;
    let err = h
        .service
        .execute_move(duel.red, duel.match_id, piece(0), 5)
        .await
        .expect_err("claimed dice differs from the roll");
    assert!(matches!(err, MatchError::Validation(_)));

    let err = h
        .service
        .move_piece(duel.red, duel.match_id, piece(1))
        .await
        .expect_err("yard piece cannot move on a four");
    assert_eq!(validation_message(err), "Invalid move");
    Ok(())
}

#[tokio::test]
async fn failed_commits_leave_roll_state_untouched() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([10, -1, -1, -1]))
        .await;
    h.dice.push([6, 6]);
    let coordination = h.service.coordination();

    h.storage.fail_next_commit();
    assert!(h.service.roll_dice(duel.red, duel.match_id).await.is_err());
    assert_eq!(coordination.pending_dice(duel.match_id, duel.red).await?, None);
    assert_eq!(coordination.sixes_streak(duel.match_id).await?, 0);

    h.service.roll_dice(duel.red, duel.match_id).await?;
    assert_eq!(coordination.pending_dice(duel.match_id, duel.red).await?, Some(6));
    assert_eq!(coordination.sixes_streak(duel.match_id).await?, 1);

    h.storage.fail_next_commit();
    assert!(h
        .service
        .move_piece(duel.red, duel.match_id, piece(0))
        .await
        .is_err());
    assert_eq!(coordination.pending_dice(duel.match_id, duel.red).await?, Some(6));
    assert_eq!(
        h.storage.players(duel.match_id).await[0]
            .pieces
            .position_of(piece(0))
            .value(),
        10
    );

    let moved = h.service.move_piece(duel.red, duel.match_id, piece(0)).await?;
    assert_eq!(moved.next_user_id, Some(duel.red));
    assert_eq!(coordination.pending_dice(duel.match_id, duel.red).await?, None);
    Ok(())
}

#[tokio::test]
async fn capture_sends_the_victim_home_and_passes_the_turn() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([10, -1, -1, -1]))
        .await;
    h.storage
        .place_pieces(duel.match_id, duel.green, pieces_at([1, -1, -1, -1]))
        .await;
    h.dice.push([4]);

    h.service.roll_dice(duel.red, duel.match_id).await?;
    let outcome = h.service.move_piece(duel.red, duel.match_id, piece(0)).await?;

    assert!(outcome.is_kill);
    assert_eq!(outcome.killed_user_id, Some(duel.green));
    assert_eq!(outcome.killed_piece_id, Some(piece(0)));
    assert_eq!(outcome.next_user_id, Some(duel.green));

    let players = h.storage.players(duel.match_id).await;
    assert_eq!(players[0].pieces.position_of(piece(0)).value(), 14);
    assert!(players[1].pieces.position_of(piece(0)).is_in_yard());

    let moves = h.storage.moves(duel.match_id).await;
    assert_eq!(moves[0].kind, MoveKind::Kill);
    assert_eq!(moves[0].killed_user_id, Some(duel.green));

    let events = h.broadcaster.room_events(duel.match_id);
    assert!(events.contains(&"piece_killed"));
    assert!(events.contains(&"match_update"));
    assert_eq!(events.last(), Some(&"turn_change"));
    Ok(())
}

#[tokio::test]
async fn third_consecutive_six_forfeits_the_turn() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([10, -1, -1, -1]))
        .await;
    h.dice.push([6, 6, 6]);

    for _ in 0..2 {
        let roll = h.service.roll_dice(duel.red, duel.match_id).await?;
        assert!(!roll.forfeited);
        let moved = h.service.move_piece(duel.red, duel.match_id, piece(0)).await?;
        assert_eq!(moved.next_user_id, Some(duel.red), "a six earns another roll");
    }

    let third = h.service.roll_dice(duel.red, duel.match_id).await?;
    assert!(third.forfeited);
    assert!(third.valid_moves.is_empty());
    assert!(third.turn_passed);

    let live = record(&h, duel.match_id).await;
    assert_eq!(live.turn_user_id, Some(duel.green));
    assert_eq!(
        h.storage.players(duel.match_id).await[0]
            .pieces
            .position_of(piece(0))
            .value(),
        22
    );
    assert_eq!(
        h.service
            .coordination()
            .pending_dice(duel.match_id, duel.red)
            .await?,
        None
    );

    let moves = h.storage.moves(duel.match_id).await;
    assert_eq!(moves.len(), 3);
    let forfeit = &moves[2];
    assert_eq!(forfeit.kind, MoveKind::Pass);
    assert_eq!(forfeit.piece_id, None);
    assert_eq!(forfeit.dice_value, 6);
    assert_eq!(forfeit.turn_number, 3);
    Ok(())
}

#[tokio::test]
async fn winning_move_settles_the_prize() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([57, 57, 57, 56]))
        .await;
    h.dice.push([1]);

    h.service.roll_dice(duel.red, duel.match_id).await?;
    let outcome = h.service.move_piece(duel.red, duel.match_id, piece(3)).await?;
    assert!(outcome.is_win);
    assert!(outcome.is_home);
    assert_eq!(outcome.next_user_id, None);

    let done = record(&h, duel.match_id).await;
    assert_eq!(done.status, MatchStatus::Completed);
    assert_eq!(done.winner_id, Some(duel.red));
    assert!(done.turn_user_id.is_none());
    assert!(!h.service.has_turn_timer(duel.match_id));

    let winner = h.storage.wallet(duel.red).await.expect("wallet");
    assert_eq!(winner.spendable, money(90));
    assert_eq!(winner.locked, Decimal::ZERO);
    assert_eq!(winner.winnings, money(18));
    let loser = h.storage.wallet(duel.green).await.expect("wallet");
    assert_eq!(loser.spendable, money(90));
    assert_eq!(loser.locked, Decimal::ZERO);

    let wagers = h.storage.wagers(duel.match_id).await;
    let won = wagers.iter().find(|w| w.user_id == duel.red).expect("winner wager");
    assert_eq!(won.status, WagerStatus::Won);
    assert_eq!(won.actual_win, Some(money(18)));
    assert_eq!(won.net_profit, Some(money(8)));
    let lost = wagers.iter().find(|w| w.user_id == duel.green).expect("loser wager");
    assert_eq!(lost.status, WagerStatus::Lost);
    assert_eq!(lost.net_profit, Some(money(-10)));

    let players = h.storage.players(duel.match_id).await;
    assert_eq!(players[0].final_rank, Some(1));
    assert_eq!(players[1].final_rank, Some(2));

    let stats = h.storage.user(duel.red).await.expect("user").stats;
    assert_eq!((stats.games_played, stats.wins), (1, 1));

    drain_background().await;
    let notes = h.notifier.sent();
    assert_eq!(notes.len(), 2);
    let win_note = notes.iter().find(|n| n.user_id == duel.red).expect("winner note");
    assert_eq!(win_note.kind, NotificationKind::GameWon);
    assert_eq!(win_note.reference_id, duel.match_id.to_string());
    assert!(h.broadcaster.room_events(duel.match_id).contains(&"game_ended"));
    Ok(())
}

#[tokio::test]
async fn end_game_settles_exactly_once() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let first = h.service.end_game(duel.match_id, duel.green).await?;
    let settlement = first.expect("live match settles");
    assert_eq!(settlement.winner_prize, money(18));
    assert_eq!(settlement.platform_fee, money(2));

    let after_first = h.storage.wallet(duel.green).await.expect("wallet");
    let second = h.service.end_game(duel.match_id, duel.red).await?;
    assert!(second.is_none());
    assert_eq!(h.storage.wallet(duel.green).await.expect("wallet"), after_first);
    assert_eq!(record(&h, duel.match_id).await.winner_id, Some(duel.green));
    Ok(())
}

#[tokio::test]
async fn end_game_rejects_outsiders_as_winner() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let err = h
        .service
        .end_game(duel.match_id, Uuid::new_v4())
        .await
        .expect_err("winner must be seated");
    assert!(matches!(err, MatchError::Validation(_)));
    assert_eq!(record(&h, duel.match_id).await.status, MatchStatus::InProgress);
    Ok(())
}

#[tokio::test]
async fn stale_timeout_is_ignored() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let outcome = h.service.handle_timeout(duel.match_id, duel.green).await?;
    assert_eq!(outcome, TimeoutOutcome::Stale);
    assert_eq!(record(&h, duel.match_id).await.turn_user_id, Some(duel.red));
    Ok(())
}

#[tokio::test]
async fn third_strike_eliminates_and_last_player_wins() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    for strike in 1..=2 {
        let red_out = h.service.handle_timeout(duel.match_id, duel.red).await?;
        let TimeoutOutcome::TurnPassed { strikes, next } = red_out else {
            panic!("expected a passed turn, got {red_out:?}");
        };
        assert_eq!(strikes, strike);
        assert_eq!(next.user_id, duel.green);
        let green_out = h.service.handle_timeout(duel.match_id, duel.green).await?;
        assert!(matches!(green_out, TimeoutOutcome::TurnPassed { .. }));
    }

    let last = h.service.handle_timeout(duel.match_id, duel.red).await?;
    let TimeoutOutcome::Settled(settlement) = last else {
        panic!("expected settlement, got {last:?}");
    };
    assert_eq!(settlement.winner_id, duel.green);

    let players = h.storage.players(duel.match_id).await;
    assert!(players[0].is_eliminated);
    assert_eq!(players[0].final_rank, Some(2));
    assert_eq!(
        h.storage.wallet(duel.green).await.expect("wallet").winnings,
        money(18)
    );
    assert!(h
        .broadcaster
        .room_events(duel.match_id)
        .contains(&"player_eliminated"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn turn_timer_passes_an_idle_turn() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    tokio::time::sleep(Duration::from_secs(31)).await;

    let live = record(&h, duel.match_id).await;
    assert_eq!(live.turn_user_id, Some(duel.green));
    assert_eq!(live.turn_number, 2);
    assert!(h.service.has_turn_timer(duel.match_id), "next turn is armed");
    Ok(())
}

#[tokio::test]
async fn dispute_freezes_the_match_until_an_admin_resolves_it() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    let admin = h.storage.seed_user("admin", UserRole::Admin).await;

    let dispute = h
        .service
        .create_dispute(
            duel.green,
            duel.match_id,
            DisputeRequest {
                reason: "Opponent disconnected on purpose".into(),
                evidence_urls: vec!["https://example.com/clip.mp4".into()],
            },
        )
        .await?;
    assert_eq!(dispute.status, DisputeStatus::Open);

    let frozen = record(&h, duel.match_id).await;
    assert_eq!(frozen.status, MatchStatus::Disputed);
    assert!(frozen.turn_deadline.is_none());
    assert!(!h.service.has_turn_timer(duel.match_id));

    let err = h
        .service
        .roll_dice(duel.red, duel.match_id)
        .await
        .expect_err("disputed matches are frozen");
    assert_eq!(validation_message(err), "Match is not in progress");

    let err = h
        .service
        .create_dispute(
            duel.red,
            duel.match_id,
            DisputeRequest {
                reason: "Second complaint about this".into(),
                evidence_urls: Vec::new(),
            },
        )
        .await
        .expect_err("one open dispute at a time");
    assert_eq!(validation_message(err), "Match is already disputed");

    let err = h
        .service
        .resolve_match(
            duel.red,
            duel.match_id,
            ResolveMatchRequest {
                winner_id: duel.red,
                note: None,
            },
        )
        .await
        .expect_err("players cannot resolve");
    assert!(matches!(err, MatchError::Forbidden(_)));

    let settlement = h
        .service
        .resolve_match(
            admin,
            duel.match_id,
            ResolveMatchRequest {
                winner_id: duel.green,
                note: Some("Replay confirms".into()),
            },
        )
        .await?;
    assert_eq!(settlement.winner_id, duel.green);
    assert_eq!(settlement.winner_prize, money(18));

    let disputes = h.storage.disputes(duel.match_id).await;
    assert_eq!(disputes[0].status, DisputeStatus::Resolved);
    assert_eq!(disputes[0].resolved_by, Some(admin));
    assert_eq!(disputes[0].resolution_note.as_deref(), Some("Replay confirms"));
    assert_eq!(record(&h, duel.match_id).await.status, MatchStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn dispute_requires_a_live_match_and_a_participant() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;
    let outsider = funded_user(&h, "outsider", 100).await;
    let created = h.service.create_match(host, duel_request(10)).await?;
    let request = DisputeRequest {
        reason: "Something went wrong here".into(),
        evidence_urls: Vec::new(),
    };

    let err = h
        .service
        .create_dispute(outsider, created.id, request.clone())
        .await
        .expect_err("outsiders cannot dispute");
    assert!(matches!(err, MatchError::NotFound(_)));

    let err = h
        .service
        .create_dispute(host, created.id, request)
        .await
        .expect_err("waiting match cannot be disputed");
    assert!(matches!(err, MatchError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn snapshot_is_stable_between_reads() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let first = h.service.match_state(duel.match_id).await?;
    let second = h.service.match_state(duel.match_id).await?;

    assert_eq!(first, second);
    assert_eq!(first.status, MatchStatus::InProgress);
    assert_eq!(first.turn_user_id, Some(duel.red));
    let names: Vec<&str> = first.players.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, ["red", "green"]);
    assert!(first.players.iter().all(|p| p.pieces == Pieces::initial()));
    Ok(())
}

#[tokio::test]
async fn lobby_lists_only_open_matches_in_range() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;
    let other = funded_user(&h, "other", 100).await;
    let cheap = h.service.create_match(host, duel_request(5)).await?;
    let pricey = h.service.create_match(other, duel_request(50)).await?;

    let all = h.service.lobby(LobbyFilter::default()).await?;
    assert_eq!(all.len(), 2);

    let filtered = h
        .service
        .lobby(LobbyFilter {
            entry_fee_max: Some(money(10)),
            ..LobbyFilter::default()
        })
        .await?;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, cheap.id);

    let joiner = funded_user(&h, "joiner", 100).await;
    h.service.join_match(joiner, pricey.id).await?;
    let open = h.service.lobby(LobbyFilter::default()).await?;
    assert_eq!(open.iter().map(|m| m.id).collect::<Vec<_>>(), vec![cheap.id]);

    let err = h
        .service
        .lobby(LobbyFilter {
            entry_fee_min: Some(money(10)),
            entry_fee_max: Some(money(5)),
            ..LobbyFilter::default()
        })
        .await
        .expect_err("inverted range");
    assert!(matches!(err, MatchError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn my_matches_pages_through_history() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "host", 100).await;
    for _ in 0..3 {
        h.service.create_match(host, duel_request(1)).await?;
    }

    let page = h
        .service
        .my_matches(host, PageRequest { page: 2, limit: 2 })
        .await?;
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.matches.len(), 1);

    let err = h
        .service
        .my_matches(host, PageRequest { page: 1, limit: 51 })
        .await
        .expect_err("limit capped");
    assert!(matches!(err, MatchError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn capacity_and_pool_invariants_hold_for_four_players() -> anyhow::Result<()> {
    let h = harness();
    let host = funded_user(&h, "p0", 100).await;
    let created = h
        .service
        .create_match(
            host,
            CreateMatchRequest {
                game_mode: GameMode::FourPlayer,
                entry_fee: money(10),
            },
        )
        .await?;

    for n in 1..4 {
        let user = funded_user(&h, &format!("p{n}"), 100).await;
        let summary = h.service.join_match(user, created.id).await?;
        assert!(summary.current_players <= summary.max_players);
    }
    let full = record(&h, created.id).await;
    assert_eq!(full.status, MatchStatus::Ready);
    assert_eq!(full.prize_pool, full.entry_fee * Decimal::from(full.max_players));

    let late = funded_user(&h, "late", 100).await;
    assert!(h.service.join_match(late, created.id).await.is_err());
    assert_eq!(record(&h, created.id).await.current_players, 4);
    Ok(())
}

#[tokio::test]
async fn reactions_reach_the_room_only_from_players() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;
    h.broadcaster.clear();

    h.service
        .react(duel.red, duel.match_id, "🎲".into())
        .await?;
    h.service
        .react(Uuid::new_v4(), duel.match_id, "👀".into())
        .await?;

    assert_eq!(h.broadcaster.room_events(duel.match_id), vec!["emoji_reaction"]);
    assert!(h
        .service
        .react(duel.red, duel.match_id, String::new())
        .await
        .is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnecting_within_the_window_cancels_the_penalty() -> anyhow::Result<()> {
    let storage = InMemoryMatchStorage::new();
    let h = build_harness(storage.clone(), Arc::new(storage), patient_rules());
    let duel = started_duel(&h, 10).await?;

    let live = h.service.player_disconnected(duel.red).await?;
    assert_eq!(live, vec![duel.match_id]);
    assert!(h
        .service
        .coordination()
        .disconnected_at(duel.match_id, duel.red)
        .await?
        .is_some());

    h.service
        .player_reconnected(duel.red, duel.match_id)
        .await?;
    assert_eq!(
        h.service
            .coordination()
            .disconnected_at(duel.match_id, duel.red)
            .await?,
        None
    );

    tokio::time::sleep(Duration::from_secs(61)).await;
    drain_background().await;

    assert_eq!(
        h.service
            .coordination()
            .strikes(duel.match_id, duel.red)
            .await?,
        0
    );
    assert_eq!(record(&h, duel.match_id).await.turn_user_id, Some(duel.red));
    assert!(!h
        .broadcaster
        .room_events(duel.match_id)
        .contains(&"player_eliminated"));
    Ok(())
}

/// Turn timer long enough that only the reconnect window can expire a turn.
fn patient_rules() -> MatchRules {
    MatchRules {
        turn_timeout: Duration::from_secs(600),
        ..MatchRules::default()
    }
}

#[tokio::test(start_paused = true)]
async fn missing_the_reconnect_window_three_times_forfeits_the_match() -> anyhow::Result<()> {
    let storage = InMemoryMatchStorage::new();
    let h = build_harness(storage.clone(), Arc::new(storage), patient_rules());
    let duel = started_duel(&h, 10).await?;

    for strike in 1..=3 {
        assert_eq!(record(&h, duel.match_id).await.turn_user_id, Some(duel.red));
        h.service.player_disconnected(duel.red).await?;
        tokio::time::sleep(Duration::from_secs(61)).await;
        drain_background().await;

        if strike < 3 {
            assert_eq!(
                h.service
                    .coordination()
                    .strikes(duel.match_id, duel.red)
                    .await?,
                strike
            );
            assert_eq!(record(&h, duel.match_id).await.turn_user_id, Some(duel.green));
            h.service
                .player_reconnected(duel.red, duel.match_id)
                .await?;
            h.dice.push([3]);
            h.service.roll_dice(duel.green, duel.match_id).await?;
        }
    }

    let finished = record(&h, duel.match_id).await;
    assert_eq!(finished.status, MatchStatus::Completed);
    assert_eq!(finished.winner_id, Some(duel.green));
    let events = h.broadcaster.room_events(duel.match_id);
    assert!(events.contains(&"player_eliminated"));
    assert!(events.contains(&"game_ended"));
    assert_eq!(
        h.storage.wallet(duel.green).await.expect("wallet").winnings,
        money(18)
    );
    assert!(h.storage.players(duel.match_id).await[0].is_eliminated);
    Ok(())
}

/// Delays every transaction start by a switchable amount of (virtual) time.
struct SlowStorage {
    inner: InMemoryMatchStorage,
    delay: Mutex<Duration>,
}

#[async_trait]
impl MatchStorage for SlowStorage {
    async fn begin(&self) -> Result<Box<dyn MatchStorageTxn + Send>, MatchError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.begin().await
    }
}

#[tokio::test(start_paused = true)]
async fn move_in_flight_beats_the_turn_timer() -> anyhow::Result<()> {
    let storage = InMemoryMatchStorage::new();
    let slow = Arc::new(SlowStorage {
        inner: storage.clone(),
        delay: Mutex::new(Duration::ZERO),
    });
    let h = build_harness(storage, slow.clone(), MatchRules::default());
    let duel = started_duel(&h, 10).await?;
    h.storage
        .place_pieces(duel.match_id, duel.red, pieces_at([10, -1, -1, -1]))
        .await;

    tokio::time::sleep(Duration::from_secs(28)).await;
    h.dice.push([6]);
    h.service.roll_dice(duel.red, duel.match_id).await?;

    // The move holds the match lock across the 30 s deadline.
    *slow.delay.lock() = Duration::from_secs(5);
    let service = Arc::clone(&h.service);
    let (match_id, red) = (duel.match_id, duel.red);
    let in_flight =
        tokio::spawn(async move { service.move_piece(red, match_id, piece(0)).await });
    tokio::time::sleep(Duration::from_secs(15)).await;

    let moved = in_flight.await??;
    assert_eq!(moved.next_user_id, Some(duel.red));

    let live = record(&h, duel.match_id).await;
    assert_eq!(live.turn_user_id, Some(duel.red), "extra roll survives the old timer");
    assert_eq!(live.turn_number, 2);
    assert_eq!(
        h.service
            .coordination()
            .strikes(duel.match_id, duel.red)
            .await?,
        0
    );
    assert!(h.service.has_turn_timer(duel.match_id));
    Ok(())
}

#[tokio::test]
async fn resumed_timers_cover_every_live_match() -> anyhow::Result<()> {
    let h = harness();
    let duel = started_duel(&h, 10).await?;

    let armed = h.service.resume_turn_timers().await?;
    assert_eq!(armed, 1);
    assert!(h.service.has_turn_timer(duel.match_id));
    Ok(())
}
