use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::db::entity::sea_orm_active_enums::{
    DisputeStatus as DbDisputeStatus, GameMode as DbGameMode, LudoColor,
    LudoMoveType, MatchStatus as DbMatchStatus, WagerStatus as DbWagerStatus,
};
use crate::db::entity::{
    disputes, ludo_match_players, ludo_matches, ludo_moves, users, wagers, wallets,
};
use crate::engine::ludo::{Color, MoveKind, Pieces, UserId};
use crate::matches::error::MatchError;
use crate::matches::types::{
    DisputeRecord, DisputeStatus, GameMode, LobbyFilter, MatchId, MatchRecord, MatchStatus,
    MoveRecord, PlayerRecord, UserAccount, UserRole, UserStats, WagerRecord, WagerStatus,
};
use crate::wallet::{WalletBalances, WalletDelta, WalletError, WalletLedger};

use super::{MatchStorage, MatchStorageTxn};

const GAME_TYPE: &str = "ludo";
const PASS_PIECE: &str = "none";

pub struct SeaOrmMatchStorage {
    connection: DatabaseConnection,
}

impl SeaOrmMatchStorage {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

pub struct SeaOrmMatchTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl MatchStorage for SeaOrmMatchStorage {
    async fn begin(&self) -> Result<Box<dyn MatchStorageTxn + Send>, MatchError> {
        let txn = self.connection.begin().await?;
        Ok(Box::new(SeaOrmMatchTxn { txn }))
    }
}

#[async_trait]
impl WalletLedger for SeaOrmMatchTxn {
    async fn load_wallet(&mut self, user_id: Uuid) -> Result<Option<WalletBalances>, WalletError> {
        let model = wallets::Entity::find_by_id(user_id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(model.map(wallet_from_model))
    }

    async fn apply_delta(
        &mut self,
        user_id: Uuid,
        delta: WalletDelta,
    ) -> Result<WalletBalances, WalletError> {
        let current = self
            .load_wallet(user_id)
            .await?
            .ok_or(WalletError::NotFound(user_id))?;
        let next = current.apply(&delta)?;
        let model = wallets::ActiveModel {
            user_id: Set(user_id),
            main_balance: Set(next.spendable),
            bonus_balance: Set(next.bonus),
            winning_balance: Set(next.winnings),
            locked_balance: Set(next.locked),
            total_wagered: Set(next.total_wagered),
            total_won: Set(next.total_won),
            updated_at: Set(Utc::now()),
        };
        model.update(&self.txn).await?;
        Ok(next)
    }
}

#[async_trait]
impl MatchStorageTxn for SeaOrmMatchTxn {
    async fn load_user(&mut self, user_id: UserId) -> Result<Option<UserAccount>, MatchError> {
        let model = users::Entity::find_by_id(user_id).one(&self.txn).await?;
        model.map(user_from_model).transpose()
    }

    async fn save_user_stats(
        &mut self,
        user_id: UserId,
        stats: &UserStats,
    ) -> Result<(), MatchError> {
        let model = users::ActiveModel {
            id: Set(user_id),
            total_games_played: Set(to_i32(stats.games_played, "games played")?),
            total_wins: Set(to_i32(stats.wins, "wins")?),
            total_losses: Set(to_i32(stats.losses, "losses")?),
            win_rate: Set(stats.win_rate),
            ..Default::default()
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn match_code_exists(&mut self, code: &str) -> Result<bool, MatchError> {
        let count = ludo_matches::Entity::find()
            .filter(ludo_matches::Column::MatchCode.eq(code))
            .count(&self.txn)
            .await?;
        Ok(count > 0)
    }

    async fn insert_match(&mut self, record: &MatchRecord) -> Result<(), MatchError> {
        let model = ludo_matches::ActiveModel {
            id: Set(record.id),
            match_code: Set(record.code.clone()),
            created_by: Set(record.created_by),
            created_at: Set(record.created_at),
            ..match_active_model(record)?
        };
        model.insert(&self.txn).await?;
        Ok(())
    }

    async fn load_match(&mut self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchError> {
        let model = ludo_matches::Entity::find_by_id(match_id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        model.map(match_from_model).transpose()
    }

    async fn update_match(&mut self, record: &MatchRecord) -> Result<(), MatchError> {
        let model = ludo_matches::ActiveModel {
            id: Set(record.id),
            ..match_active_model(record)?
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn list_open_matches(
        &mut self,
        filter: &LobbyFilter,
    ) -> Result<Vec<MatchRecord>, MatchError> {
        let mut query = ludo_matches::Entity::find()
            .filter(ludo_matches::Column::Status.eq(DbMatchStatus::Waiting));
        if let Some(mode) = filter.game_mode {
            query = query.filter(ludo_matches::Column::GameMode.eq(DbGameMode::from(mode)));
        }
        if let Some(min) = filter.entry_fee_min {
            query = query.filter(ludo_matches::Column::EntryFee.gte(min));
        }
        if let Some(max) = filter.entry_fee_max {
            query = query.filter(ludo_matches::Column::EntryFee.lte(max));
        }
        let models = query
            .order_by_desc(ludo_matches::Column::CreatedAt)
            .all(&self.txn)
            .await?;
        models.into_iter().map(match_from_model).collect()
    }

    async fn list_user_matches(
        &mut self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(u64, Vec<MatchRecord>), MatchError> {
        let query = ludo_matches::Entity::find()
            .inner_join(ludo_match_players::Entity)
            .filter(ludo_match_players::Column::UserId.eq(user_id));
        let total = query.clone().count(&self.txn).await?;
        let models = query
            .order_by_desc(ludo_matches::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.txn)
            .await?;
        let records = models
            .into_iter()
            .map(match_from_model)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((total, records))
    }

    async fn list_in_progress(&mut self) -> Result<Vec<MatchRecord>, MatchError> {
        let models = ludo_matches::Entity::find()
            .filter(ludo_matches::Column::Status.eq(DbMatchStatus::InProgress))
            .all(&self.txn)
            .await?;
        models.into_iter().map(match_from_model).collect()
    }

    async fn in_progress_match_ids(&mut self, user_id: UserId) -> Result<Vec<MatchId>, MatchError> {
        let models = ludo_matches::Entity::find()
            .inner_join(ludo_match_players::Entity)
            .filter(ludo_match_players::Column::UserId.eq(user_id))
            .filter(ludo_matches::Column::Status.eq(DbMatchStatus::InProgress))
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(|model| model.id).collect())
    }

    async fn load_players(&mut self, match_id: MatchId) -> Result<Vec<PlayerRecord>, MatchError> {
        let models = ludo_match_players::Entity::find()
            .filter(ludo_match_players::Column::MatchId.eq(match_id))
            .all(&self.txn)
            .await?;
        let mut players = models
            .into_iter()
            .map(player_from_model)
            .collect::<Result<Vec<_>, _>>()?;
        players.sort_by_key(|player| player.color.index());
        Ok(players)
    }

    async fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), MatchError> {
        player_active_model(player).insert(&self.txn).await?;
        Ok(())
    }

    async fn update_player(&mut self, player: &PlayerRecord) -> Result<(), MatchError> {
        player_active_model(player).update(&self.txn).await?;
        Ok(())
    }

    async fn delete_player(
        &mut self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<(), MatchError> {
        ludo_match_players::Entity::delete_many()
            .filter(ludo_match_players::Column::MatchId.eq(match_id))
            .filter(ludo_match_players::Column::UserId.eq(user_id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn insert_move(&mut self, record: &MoveRecord) -> Result<(), MatchError> {
        let model = ludo_moves::ActiveModel {
            match_id: Set(record.match_id),
            user_id: Set(record.user_id),
            turn_number: Set(to_i32(record.turn_number, "turn number")?),
            dice_value: Set(i16::from(record.dice_value)),
            piece_id: Set(record
                .piece_id
                .map_or_else(|| PASS_PIECE.to_owned(), |piece| piece.to_string())),
            from_position: Set(record.from_position.value()),
            to_position: Set(record.to_position.value()),
            is_kill: Set(record.is_kill),
            killed_user_id: Set(record.killed_user_id),
            killed_piece_id: Set(record.killed_piece_id.map(|piece| piece.to_string())),
            is_home_entry: Set(record.is_home_entry),
            move_type: Set(record.kind.into()),
            created_at: Set(record.created_at),
            ..Default::default()
        };
        model.insert(&self.txn).await?;
        Ok(())
    }

    async fn insert_wager(&mut self, wager: &WagerRecord) -> Result<(), MatchError> {
        wager_active_model(wager).insert(&self.txn).await?;
        Ok(())
    }

    async fn load_wagers(&mut self, match_id: MatchId) -> Result<Vec<WagerRecord>, MatchError> {
        let models = wagers::Entity::find()
            .filter(wagers::Column::GameType.eq(GAME_TYPE))
            .filter(wagers::Column::ReferenceId.eq(match_id))
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(wager_from_model).collect())
    }

    async fn update_wager(&mut self, wager: &WagerRecord) -> Result<(), MatchError> {
        wager_active_model(wager).update(&self.txn).await?;
        Ok(())
    }

    async fn insert_dispute(&mut self, dispute: &DisputeRecord) -> Result<(), MatchError> {
        dispute_active_model(dispute)?.insert(&self.txn).await?;
        Ok(())
    }

    async fn load_disputes(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<DisputeRecord>, MatchError> {
        let models = disputes::Entity::find()
            .filter(disputes::Column::GameType.eq(GAME_TYPE))
            .filter(disputes::Column::ReferenceId.eq(match_id))
            .order_by_asc(disputes::Column::CreatedAt)
            .all(&self.txn)
            .await?;
        models.into_iter().map(dispute_from_model).collect()
    }

    async fn update_dispute(&mut self, dispute: &DisputeRecord) -> Result<(), MatchError> {
        dispute_active_model(dispute)?.update(&self.txn).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), MatchError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

// ---- row mapping ----------------------------------------------------------

fn to_i32(value: u32, what: &'static str) -> Result<i32, MatchError> {
    i32::try_from(value).map_err(|_| MatchError::internal(format!("{what} exceeds database range")))
}

fn from_i32(value: i32, what: &'static str) -> Result<u32, MatchError> {
    u32::try_from(value).map_err(|_| MatchError::internal(format!("negative {what} in database")))
}

fn from_i16(value: i16, what: &'static str) -> Result<u8, MatchError> {
    u8::try_from(value).map_err(|_| MatchError::internal(format!("{what} out of range: {value}")))
}

fn wallet_from_model(model: wallets::Model) -> WalletBalances {
    WalletBalances {
        user_id: model.user_id,
        spendable: model.main_balance,
        bonus: model.bonus_balance,
        winnings: model.winning_balance,
        locked: model.locked_balance,
        total_wagered: model.total_wagered,
        total_won: model.total_won,
    }
}

fn user_from_model(model: users::Model) -> Result<UserAccount, MatchError> {
    Ok(UserAccount {
        id: model.id,
        role: UserRole::parse(&model.role),
        is_banned: model.is_banned,
        stats: UserStats {
            games_played: from_i32(model.total_games_played, "games played")?,
            wins: from_i32(model.total_wins, "wins")?,
            losses: from_i32(model.total_losses, "losses")?,
            win_rate: model.win_rate,
        },
        username: model.username,
    })
}

/// Every mutable match column; identity columns are filled in by the caller.
fn match_active_model(record: &MatchRecord) -> Result<ludo_matches::ActiveModel, MatchError> {
    Ok(ludo_matches::ActiveModel {
        game_mode: Set(record.game_mode.into()),
        entry_fee: Set(record.entry_fee),
        prize_pool: Set(record.prize_pool),
        platform_fee: Set(record.platform_fee),
        max_players: Set(i16::from(record.max_players)),
        current_players: Set(i16::from(record.current_players)),
        status: Set(record.status.into()),
        turn_user_id: Set(record.turn_user_id),
        turn_deadline: Set(record.turn_deadline),
        turn_number: Set(to_i32(record.turn_number, "turn number")?),
        winner_id: Set(record.winner_id),
        game_started_at: Set(record.started_at),
        game_ended_at: Set(record.ended_at),
        ..Default::default()
    })
}

fn match_from_model(model: ludo_matches::Model) -> Result<MatchRecord, MatchError> {
    Ok(MatchRecord {
        id: model.id,
        code: model.match_code,
        game_mode: model.game_mode.into(),
        entry_fee: model.entry_fee,
        prize_pool: model.prize_pool,
        platform_fee: model.platform_fee,
        max_players: from_i16(model.max_players, "max players")?,
        current_players: from_i16(model.current_players, "current players")?,
        status: model.status.into(),
        turn_user_id: model.turn_user_id,
        turn_deadline: model.turn_deadline,
        turn_number: from_i32(model.turn_number, "turn number")?,
        winner_id: model.winner_id,
        created_by: model.created_by,
        created_at: model.created_at,
        started_at: model.game_started_at,
        ended_at: model.game_ended_at,
    })
}

fn player_active_model(player: &PlayerRecord) -> ludo_match_players::ActiveModel {
    ludo_match_players::ActiveModel {
        match_id: Set(player.match_id),
        user_id: Set(player.user_id),
        color: Set(player.color.into()),
        pieces_state: Set(player.pieces.to_json()),
        pieces_home: Set(i16::from(player.pieces_home)),
        is_eliminated: Set(player.is_eliminated),
        final_rank: Set(player.final_rank.map(i16::from)),
        joined_at: Set(player.joined_at),
    }
}

fn player_from_model(model: ludo_match_players::Model) -> Result<PlayerRecord, MatchError> {
    Ok(PlayerRecord {
        match_id: model.match_id,
        user_id: model.user_id,
        color: model.color.into(),
        pieces: Pieces::from_json(model.pieces_state)?,
        pieces_home: from_i16(model.pieces_home, "pieces home")?,
        is_eliminated: model.is_eliminated,
        final_rank: model
            .final_rank
            .map(|rank| from_i16(rank, "final rank"))
            .transpose()?,
        joined_at: model.joined_at,
    })
}

fn wager_active_model(wager: &WagerRecord) -> wagers::ActiveModel {
    wagers::ActiveModel {
        id: Set(wager.id),
        user_id: Set(wager.user_id),
        game_type: Set(GAME_TYPE.to_owned()),
        reference_id: Set(wager.match_id),
        entry_amount: Set(wager.entry_amount),
        potential_win: Set(wager.potential_win),
        actual_win: Set(wager.actual_win),
        net_profit: Set(wager.net_profit),
        status: Set(wager.status.into()),
        created_at: Set(wager.created_at),
        settled_at: Set(wager.settled_at),
    }
}

fn wager_from_model(model: wagers::Model) -> WagerRecord {
    WagerRecord {
        id: model.id,
        user_id: model.user_id,
        match_id: model.reference_id,
        entry_amount: model.entry_amount,
        potential_win: model.potential_win,
        actual_win: model.actual_win,
        net_profit: model.net_profit,
        status: model.status.into(),
        created_at: model.created_at,
        settled_at: model.settled_at,
    }
}

fn dispute_active_model(dispute: &DisputeRecord) -> Result<disputes::ActiveModel, MatchError> {
    let evidence = serde_json::to_value(&dispute.evidence_urls)
        .map_err(|err| MatchError::internal(format!("evidence encoding: {err}")))?;
    Ok(disputes::ActiveModel {
        id: Set(dispute.id),
        user_id: Set(dispute.user_id),
        game_type: Set(GAME_TYPE.to_owned()),
        reference_id: Set(dispute.match_id),
        reason: Set(dispute.reason.clone()),
        evidence_urls: Set(evidence),
        status: Set(dispute.status.into()),
        resolution_note: Set(dispute.resolution_note.clone()),
        resolved_by: Set(dispute.resolved_by),
        created_at: Set(dispute.created_at),
        resolved_at: Set(dispute.resolved_at),
    })
}

fn dispute_from_model(model: disputes::Model) -> Result<DisputeRecord, MatchError> {
    let evidence_urls = serde_json::from_value(model.evidence_urls)
        .map_err(|err| MatchError::internal(format!("evidence decoding: {err}")))?;
    Ok(DisputeRecord {
        id: model.id,
        user_id: model.user_id,
        match_id: model.reference_id,
        reason: model.reason,
        evidence_urls,
        status: model.status.into(),
        resolution_note: model.resolution_note,
        resolved_by: model.resolved_by,
        created_at: model.created_at,
        resolved_at: model.resolved_at,
    })
}

// ---- enum mapping ---------------------------------------------------------

macro_rules! mirror_enum {
    ($domain:ident, $db:ident, [$($variant:ident),+ $(,)?]) => {
        impl From<$domain> for $db {
            fn from(value: $domain) -> Self {
                match value {
                    $($domain::$variant => $db::$variant,)+
                }
            }
        }

        impl From<$db> for $domain {
            fn from(value: $db) -> Self {
                match value {
                    $($db::$variant => $domain::$variant,)+
                }
            }
        }
    };
}

mirror_enum!(GameMode, DbGameMode, [OneVOne, TwoVTwo, FourPlayer]);
mirror_enum!(
    MatchStatus,
    DbMatchStatus,
    [Waiting, Ready, InProgress, Completed, Cancelled, Disputed]
);
mirror_enum!(Color, LudoColor, [Red, Green, Yellow, Blue]);
mirror_enum!(MoveKind, LudoMoveType, [Pass, Kill, Home, HomeEntry, Safe, Move]);
mirror_enum!(WagerStatus, DbWagerStatus, [Active, Won, Lost, Refunded]);
mirror_enum!(DisputeStatus, DbDisputeStatus, [Open, Resolved, Rejected]);
