//! Prize settlement.
//!
//! Runs inside the caller's transaction so the winning move (or the final
//! elimination) and the money movement commit or fail together. Re-entry is
//! refused by status: only `IN_PROGRESS` and `DISPUTED` matches settle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::engine::ludo::UserId;

use super::error::MatchError;
use super::storage::MatchStorageTxn;
use super::types::{MatchRecord, MatchStatus, PlayerRecord, Settlement, WagerStatus};

pub const PLATFORM_FEE_SCALE: u32 = 2;

/// Pool and platform cut for a match of `max_players` seats at `entry_fee`.
pub fn prize_breakdown(
    entry_fee: Decimal,
    max_players: u8,
    fee_rate: Decimal,
) -> (Decimal, Decimal) {
    let prize_pool = entry_fee * Decimal::from(max_players);
    let platform_fee = (prize_pool * fee_rate).round_dp(PLATFORM_FEE_SCALE);
    (prize_pool, platform_fee)
}

/// Winner first, then survivors by pieces home, then eliminated players.
/// Ties keep seat order.
pub fn final_ranks(players: &[PlayerRecord], winner_id: UserId) -> Vec<(UserId, u8)> {
    let mut rest: Vec<&PlayerRecord> = players
        .iter()
        .filter(|p| p.user_id != winner_id)
        .collect();
    rest.sort_by(|a, b| {
        a.is_eliminated
            .cmp(&b.is_eliminated)
            .then(b.pieces_home.cmp(&a.pieces_home))
            .then(a.color.index().cmp(&b.color.index()))
    });

    std::iter::once(winner_id)
        .chain(rest.into_iter().map(|p| p.user_id))
        .zip(1u8..)
        .collect()
}

pub fn ensure_settleable(
    record: &MatchRecord,
    winner_id: UserId,
    players: &[PlayerRecord],
) -> Result<(), MatchError> {
    if !matches!(record.status, MatchStatus::InProgress | MatchStatus::Disputed) {
        return Err(MatchError::validation(format!(
            "Match cannot be settled in status {}",
            record.status
        )));
    }
    if !players.iter().any(|p| p.user_id == winner_id) {
        return Err(MatchError::validation("Winner is not a participant"));
    }
    Ok(())
}

pub async fn settle_in_txn(
    txn: &mut (dyn MatchStorageTxn + Send),
    record: &mut MatchRecord,
    players: &mut [PlayerRecord],
    winner_id: UserId,
    now: DateTime<Utc>,
) -> Result<Settlement, MatchError> {
    ensure_settleable(record, winner_id, players)?;

    let entry_fee = record.entry_fee;
    let winner_prize = record.winner_prize();

    for player in players.iter() {
        if player.user_id == winner_id {
            txn.move_locked_to_winnings(winner_id, entry_fee, winner_prize)
                .await?;
        } else {
            txn.release_locked(player.user_id, entry_fee).await?;
        }
    }

    for mut wager in txn.load_wagers(record.id).await? {
        if wager.status != WagerStatus::Active {
            continue;
        }
        if wager.user_id == winner_id {
            wager.status = WagerStatus::Won;
            wager.actual_win = Some(winner_prize);
            wager.net_profit = Some(winner_prize - wager.entry_amount);
        } else {
            wager.status = WagerStatus::Lost;
            wager.actual_win = Some(Decimal::ZERO);
            wager.net_profit = Some(-wager.entry_amount);
        }
        wager.settled_at = Some(now);
        txn.update_wager(&wager).await?;
    }

    for player in players.iter() {
        let mut account = txn
            .load_user(player.user_id)
            .await?
            .ok_or(MatchError::NotFound("user"))?;
        account.stats.record(player.user_id == winner_id);
        txn.save_user_stats(player.user_id, &account.stats).await?;
    }

    let ranks = final_ranks(players, winner_id);
    for player in players.iter_mut() {
        player.final_rank = ranks
            .iter()
            .find(|(user_id, _)| *user_id == player.user_id)
            .map(|(_, rank)| *rank);
        txn.update_player(player).await?;
    }

    record.status = MatchStatus::Completed;
    record.winner_id = Some(winner_id);
    record.ended_at = Some(now);
    record.turn_user_id = None;
    record.turn_deadline = None;
    txn.update_match(record).await?;

    Ok(Settlement {
        match_id: record.id,
        winner_id,
        prize_pool: record.prize_pool,
        winner_prize,
        platform_fee: record.platform_fee,
    })
}
