use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::coordination::{CoordinationStore, MatchCoordination};
use crate::engine::ludo::{
    classify_move, ensure_dice, find_move, first_turn_seat, next_free_color, next_turn_seat,
    valid_moves, BoardSeat, Color, DiceSource, DiceValue, PieceId, Position, TurnSeat, UserId,
    ValidMove,
};
use crate::notify::{dispatch, Notification, NotificationKind, Notifier};
use crate::realtime::protocol::{LastMove, ServerEvent, TurnChangeReason};
use crate::realtime::rooms::Broadcaster;
use crate::timers::{ReconnectTimers, TurnTimers};

use super::error::MatchError;
use super::settlement::{prize_breakdown, settle_in_txn};
use super::storage::{MatchStorage, MatchStorageTxn, SeaOrmMatchStorage};
use super::types::{
    CreateMatchRequest, DisputeRecord, DisputeRequest, DisputeStatus, LobbyFilter, MatchId,
    MatchPage, MatchRecord, MatchSnapshot, MatchStatus, MatchSummary, MoveOutcome, MoveRecord,
    PageRequest, PlayerRecord, PlayerSnapshot, ReadyOutcome, ResolveMatchRequest, RollOutcome,
    RosterEntry, Settlement, TimeoutOutcome, TurnHandoff, UserAccount, UserRole, WagerRecord,
    WagerStatus,
};
use super::validation::{
    validate_create_request, validate_dispute, validate_emoji, validate_lobby_filter,
    validate_page,
};

const LOG_TARGET: &str = "matches::service";
const REFERENCE_TYPE: &str = "ludo_match";

#[async_trait]
pub trait MatchService: Send + Sync {
    async fn create_match(
        &self,
        user_id: UserId,
        request: CreateMatchRequest,
    ) -> Result<MatchSummary, MatchError>;

    async fn join_match(&self, user_id: UserId, match_id: MatchId)
        -> Result<MatchSummary, MatchError>;

    async fn player_ready(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<ReadyOutcome, MatchError>;

    async fn leave_match(&self, user_id: UserId, match_id: MatchId) -> Result<(), MatchError>;

    async fn roll_dice(&self, user_id: UserId, match_id: MatchId)
        -> Result<RollOutcome, MatchError>;

    async fn execute_move(
        &self,
        user_id: UserId,
        match_id: MatchId,
        piece_id: PieceId,
        dice_value: DiceValue,
    ) -> Result<MoveOutcome, MatchError>;

    /// Moves `piece_id` using the caller's pending roll.
    async fn move_piece(
        &self,
        user_id: UserId,
        match_id: MatchId,
        piece_id: PieceId,
    ) -> Result<MoveOutcome, MatchError>;

    async fn handle_timeout(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<TimeoutOutcome, MatchError>;

    /// Settles the match in favor of `winner_id`; `None` if it had already ended.
    async fn end_game(
        &self,
        match_id: MatchId,
        winner_id: UserId,
    ) -> Result<Option<Settlement>, MatchError>;

    async fn create_dispute(
        &self,
        user_id: UserId,
        match_id: MatchId,
        request: DisputeRequest,
    ) -> Result<DisputeRecord, MatchError>;

    async fn resolve_match(
        &self,
        admin_id: UserId,
        match_id: MatchId,
        request: ResolveMatchRequest,
    ) -> Result<Settlement, MatchError>;

    async fn match_state(&self, match_id: MatchId) -> Result<MatchSnapshot, MatchError>;

    async fn match_summary(&self, match_id: MatchId) -> Result<MatchSummary, MatchError>;

    async fn lobby(&self, filter: LobbyFilter) -> Result<Vec<MatchSummary>, MatchError>;

    async fn my_matches(&self, user_id: UserId, page: PageRequest)
        -> Result<MatchPage, MatchError>;

    async fn in_progress_matches(&self, user_id: UserId) -> Result<Vec<MatchId>, MatchError>;

    async fn is_participant(&self, match_id: MatchId, user_id: UserId)
        -> Result<bool, MatchError>;

    /// Marks the user disconnected from every live match and starts their grace timers.
    async fn player_disconnected(&self, user_id: UserId) -> Result<Vec<MatchId>, MatchError>;

    async fn player_reconnected(&self, user_id: UserId, match_id: MatchId)
        -> Result<(), MatchError>;

    async fn react(&self, user_id: UserId, match_id: MatchId, emoji: String)
        -> Result<(), MatchError>;
}

/// Collaborators a [`MatchLifecycle`] is built from.
pub struct MatchLifecycleParts {
    pub storage: Arc<dyn MatchStorage>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub notifier: Arc<dyn Notifier>,
    pub dice: Arc<dyn DiceSource>,
    pub rules: MatchRules,
}

impl MatchLifecycleParts {
    pub fn from_sea_orm(
        connection: DatabaseConnection,
        coordination: Arc<dyn CoordinationStore>,
        broadcaster: Arc<dyn Broadcaster>,
        notifier: Arc<dyn Notifier>,
        dice: Arc<dyn DiceSource>,
        rules: MatchRules,
    ) -> Self {
        Self {
            storage: Arc::new(SeaOrmMatchStorage::new(connection)),
            coordination,
            broadcaster,
            notifier,
            dice,
            rules,
        }
    }
}

/// The match state machine.
///
/// Every mutating operation on a match runs under that match's async lock and
/// inside one storage transaction. Side effects (broadcasts, timers,
/// notifications) only happen after the transaction commits.
pub struct MatchLifecycle {
    storage: Arc<dyn MatchStorage>,
    coordination: MatchCoordination,
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Arc<dyn Notifier>,
    dice: Arc<dyn DiceSource>,
    rules: MatchRules,
    turn_timers: TurnTimers,
    reconnect_timers: ReconnectTimers,
    locks: DashMap<MatchId, Arc<Mutex<()>>>,
    this: Weak<MatchLifecycle>,
}

enum RollStep {
    Moves(Vec<ValidMove>),
    /// Third consecutive six: the roll is void and the turn moves on.
    Forfeited(TurnHandoff),
    /// A six with nothing to move keeps the turn.
    Stuck(TurnHandoff),
    Passed(TurnHandoff),
}

struct MoveStep {
    outcome: MoveOutcome,
    last_move: LastMove,
    next: Option<TurnHandoff>,
    finished: Option<(Settlement, MatchRecord, Vec<PlayerRecord>)>,
}

enum TimeoutStep {
    Stale,
    Passed {
        strikes: i64,
        next: TurnHandoff,
    },
    Eliminated {
        next: TurnHandoff,
    },
    Settled {
        settlement: Settlement,
        record: MatchRecord,
        players: Vec<PlayerRecord>,
    },
}

impl MatchLifecycle {
    pub fn new(parts: MatchLifecycleParts) -> Arc<Self> {
        let MatchLifecycleParts {
            storage,
            coordination,
            broadcaster,
            notifier,
            dice,
            rules,
        } = parts;
        Arc::new_cyclic(|this| Self {
            storage,
            coordination: MatchCoordination::new(coordination, rules.clone()),
            broadcaster,
            notifier,
            dice,
            rules,
            turn_timers: TurnTimers::new("turn"),
            reconnect_timers: ReconnectTimers::new("reconnect"),
            locks: DashMap::new(),
            this: this.clone(),
        })
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    pub fn coordination(&self) -> &MatchCoordination {
        &self.coordination
    }

    pub fn has_turn_timer(&self, match_id: MatchId) -> bool {
        self.turn_timers.is_armed(&match_id)
    }

    /// Re-arms turn timers for every live match, e.g. after a restart.
    pub async fn resume_turn_timers(&self) -> Result<usize, MatchError> {
        let mut txn = self.storage.begin().await?;
        let live = match txn.list_in_progress().await {
            Ok(live) => {
                txn.commit().await?;
                live
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        let now = Utc::now();
        let mut armed = 0;
        for record in live {
            let (Some(user_id), Some(deadline)) = (record.turn_user_id, record.turn_deadline) else {
                continue;
            };
            let delay = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            self.arm_turn_timer_after(record.id, user_id, record.turn_number, delay);
            armed += 1;
        }
        tracing::info!(target = LOG_TARGET, armed, "turn timers resumed");
        Ok(armed)
    }

    async fn lock_match(&self, match_id: MatchId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            &*self
                .locks
                .entry(match_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        lock.lock_owned().await
    }

    fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.rules.turn_timeout_chrono()
    }

    fn arm_turn_timer(&self, match_id: MatchId, handoff: &TurnHandoff) {
        self.arm_turn_timer_after(
            match_id,
            handoff.user_id,
            handoff.turn_number,
            self.rules.turn_timeout,
        );
    }

    fn arm_turn_timer_after(
        &self,
        match_id: MatchId,
        user_id: UserId,
        turn_number: u32,
        delay: Duration,
    ) {
        let this = self.this.clone();
        self.turn_timers.arm(match_id, delay, async move {
            let Some(service) = this.upgrade() else {
                return;
            };
            match service.expire_turn(match_id, user_id, Some(turn_number)).await {
                Ok(outcome) => {
                    tracing::debug!(target = LOG_TARGET, %match_id, %user_id, ?outcome, "turn timer fired");
                }
                Err(err) => {
                    tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "turn timeout failed");
                }
            }
        });
    }

    /// Hands the turn to the next active seat after `from` and persists it.
    async fn pass_turn(
        &self,
        txn: &mut (dyn MatchStorageTxn + Send),
        record: &mut MatchRecord,
        players: &[PlayerRecord],
        from: Color,
        now: DateTime<Utc>,
    ) -> Result<TurnHandoff, MatchError> {
        let next = next_turn_seat(from, &turn_seats(players))
            .ok_or_else(|| MatchError::internal("no active player left to take the turn"))?;
        self.grant_turn(txn, record, next.user_id, now).await
    }

    async fn grant_turn(
        &self,
        txn: &mut (dyn MatchStorageTxn + Send),
        record: &mut MatchRecord,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<TurnHandoff, MatchError> {
        let deadline = self.deadline_from(now);
        record.turn_user_id = Some(user_id);
        record.turn_deadline = Some(deadline);
        record.turn_number += 1;
        txn.update_match(record).await?;
        Ok(TurnHandoff {
            user_id,
            deadline,
            turn_number: record.turn_number,
        })
    }

    /// Post-commit side of a turn change.
    async fn announce_turn(
        &self,
        match_id: MatchId,
        previous: UserId,
        next: &TurnHandoff,
        reason: TurnChangeReason,
    ) {
        if next.user_id != previous {
            if let Err(err) = self.coordination.reset_sixes(match_id).await {
                tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "failed to reset six streak");
            }
        }
        self.arm_turn_timer(match_id, next);
        self.broadcaster.to_match(
            match_id,
            ServerEvent::TurnChange {
                match_id,
                user_id: next.user_id,
                turn_deadline: next.deadline,
                reason,
            },
        );
    }

    async fn broadcast_snapshot(&self, match_id: MatchId) {
        match MatchService::match_state(self, match_id).await {
            Ok(snapshot) => self
                .broadcaster
                .to_match(match_id, ServerEvent::MatchState(snapshot)),
            Err(err) => {
                tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "snapshot broadcast failed");
            }
        }
    }

    async fn after_settlement(
        &self,
        settlement: &Settlement,
        record: &MatchRecord,
        players: &[PlayerRecord],
    ) {
        let match_id = settlement.match_id;
        let users: Vec<UserId> = players.iter().map(|p| p.user_id).collect();

        self.turn_timers.cancel(&match_id);
        for user_id in &users {
            self.reconnect_timers.cancel(&(match_id, *user_id));
        }
        if let Err(err) = self.coordination.clear_match(match_id, &users).await {
            tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "failed to clear coordination keys");
        }
        self.locks.remove(&match_id);

        self.broadcaster
            .to_match(match_id, ServerEvent::GameEnded(settlement.clone()));

        for user_id in users {
            let notification = if user_id == settlement.winner_id {
                Notification {
                    user_id,
                    title: "You Won!".into(),
                    body: format!(
                        "Congratulations! You won {:.2} in Ludo match {}.",
                        settlement.winner_prize, record.code
                    ),
                    kind: NotificationKind::GameWon,
                    reference_type: REFERENCE_TYPE.into(),
                    reference_id: match_id.to_string(),
                }
            } else {
                Notification {
                    user_id,
                    title: "Match Ended".into(),
                    body: format!("Ludo match {} has ended. Better luck next time!", record.code),
                    kind: NotificationKind::GameLost,
                    reference_type: REFERENCE_TYPE.into(),
                    reference_id: match_id.to_string(),
                }
            };
            dispatch(&self.notifier, notification);
        }

        tracing::info!(
            target = LOG_TARGET,
            %match_id,
            winner_id = %settlement.winner_id,
            prize = %settlement.winner_prize,
            platform_fee = %settlement.platform_fee,
            "match settled"
        );
    }

    /// Strikes `user_id` for letting the turn lapse.
    ///
    /// With `turn_number` set, only that exact turn may be expired: a move that
    /// won the match lock first and opened a new turn (even for the same
    /// player) turns this call into a no-op.
    async fn expire_turn(
        &self,
        match_id: MatchId,
        user_id: UserId,
        turn_number: Option<u32>,
    ) -> Result<TimeoutOutcome, MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let Some(mut record) = txn.load_match(match_id).await? else {
                return Ok(TimeoutStep::Stale);
            };
            if record.status != MatchStatus::InProgress || !record.is_turn_of(user_id) {
                return Ok(TimeoutStep::Stale);
            }
            if turn_number.is_some_and(|armed| armed != record.turn_number) {
                return Ok(TimeoutStep::Stale);
            }
            let mut players = txn.load_players(match_id).await?;
            let Some(index) = players.iter().position(|p| p.user_id == user_id) else {
                return Ok(TimeoutStep::Stale);
            };
            let color = players[index].color;

            let strikes = self.coordination.strikes(match_id, user_id).await? + 1;
            if strikes < self.rules.strike_limit {
                let next = self
                    .pass_turn(txn.as_mut(), &mut record, &players, color, now)
                    .await?;
                return Ok(TimeoutStep::Passed { strikes, next });
            }

            players[index].is_eliminated = true;
            txn.update_player(&players[index]).await?;
            let survivors: Vec<UserId> = players
                .iter()
                .filter(|p| !p.is_eliminated)
                .map(|p| p.user_id)
                .collect();
            if let [winner_id] = survivors.as_slice() {
                let settlement =
                    settle_in_txn(txn.as_mut(), &mut record, &mut players, *winner_id, now).await?;
                return Ok(TimeoutStep::Settled {
                    settlement,
                    record,
                    players,
                });
            }

            let next = self
                .pass_turn(txn.as_mut(), &mut record, &players, color, now)
                .await?;
            Ok(TimeoutStep::Eliminated { next })
        }
        .await;

        let step = match result {
            Ok(step) => {
                txn.commit().await?;
                step
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        if !matches!(step, TimeoutStep::Stale) {
            if let Err(err) = self.coordination.clear_dice(match_id, user_id).await {
                tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "failed to drop pending roll");
            }
        }

        match step {
            TimeoutStep::Stale => Ok(TimeoutOutcome::Stale),
            TimeoutStep::Passed { strikes, next } => {
                if let Err(err) = self.coordination.add_strike(match_id, user_id).await {
                    tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "failed to record strike");
                }
                tracing::info!(target = LOG_TARGET, %match_id, %user_id, strikes, "turn timed out");
                self.announce_turn(match_id, user_id, &next, TurnChangeReason::Timeout)
                    .await;
                Ok(TimeoutOutcome::TurnPassed { strikes, next })
            }
            TimeoutStep::Eliminated { next } => {
                tracing::info!(target = LOG_TARGET, %match_id, %user_id, "player eliminated");
                if let Err(err) = self.coordination.clear_strikes(match_id, user_id).await {
                    tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "failed to clear strikes");
                }
                self.broadcast_elimination(match_id, user_id);
                self.announce_turn(match_id, user_id, &next, TurnChangeReason::Timeout)
                    .await;
                Ok(TimeoutOutcome::Eliminated { next: Some(next) })
            }
            TimeoutStep::Settled {
                settlement,
                record,
                players,
            } => {
                tracing::info!(target = LOG_TARGET, %match_id, %user_id, "player eliminated");
                self.broadcast_elimination(match_id, user_id);
                self.after_settlement(&settlement, &record, &players).await;
                Ok(TimeoutOutcome::Settled(settlement))
            }
        }
    }

    async fn reconnect_expired(&self, match_id: MatchId, user_id: UserId) {
        match self.coordination.disconnected_at(match_id, user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "disconnect marker unreadable");
            }
        }
        tracing::info!(target = LOG_TARGET, %match_id, %user_id, "reconnect window expired");
        if let Err(err) = MatchService::handle_timeout(self, match_id, user_id).await {
            tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "disconnect timeout failed");
        }
        if let Err(err) = self.coordination.clear_disconnected(match_id, user_id).await {
            tracing::warn!(target = LOG_TARGET, %match_id, %user_id, error = %err, "failed to clear disconnect marker");
        }
    }

    async fn unique_match_code(
        &self,
        txn: &mut (dyn MatchStorageTxn + Send),
    ) -> Result<String, MatchError> {
        for _ in 0..self.rules.match_code_attempts {
            let code = generate_match_code();
            if !txn.match_code_exists(&code).await? {
                return Ok(code);
            }
        }
        Err(MatchError::internal("could not allocate a unique match code"))
    }
}

#[async_trait]
impl MatchService for MatchLifecycle {
    async fn create_match(
        &self,
        user_id: UserId,
        request: CreateMatchRequest,
    ) -> Result<MatchSummary, MatchError> {
        validate_create_request(&request)?;
        let max_players = request.game_mode.max_players();
        let (prize_pool, platform_fee) =
            prize_breakdown(request.entry_fee, max_players, self.rules.platform_fee_rate);
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let account = active_account(txn.as_mut(), user_id).await?;
            let code = self.unique_match_code(txn.as_mut()).await?;
            txn.lock_entry_fee(user_id, request.entry_fee).await?;

            let record = MatchRecord {
                id: Uuid::new_v4(),
                code,
                game_mode: request.game_mode,
                entry_fee: request.entry_fee,
                prize_pool,
                platform_fee,
                max_players,
                current_players: 1,
                status: MatchStatus::Waiting,
                turn_user_id: None,
                turn_deadline: None,
                turn_number: 0,
                winner_id: None,
                created_by: user_id,
                created_at: now,
                started_at: None,
                ended_at: None,
            };
            txn.insert_match(&record).await?;

            let player = PlayerRecord::new(record.id, user_id, Color::Red, now);
            txn.insert_player(&player).await?;
            txn.insert_wager(&entry_wager(&record, user_id, now)).await?;

            let names = HashMap::from([(account.id, account.username)]);
            Ok(summarize(&record, &[player], &names))
        }
        .await;

        match result {
            Ok(summary) => {
                txn.commit().await?;
                tracing::info!(
                    target = LOG_TARGET,
                    match_id = %summary.id,
                    code = %summary.code,
                    %user_id,
                    entry_fee = %summary.entry_fee,
                    "match created"
                );
                Ok(summary)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn join_match(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<MatchSummary, MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            if record.status != MatchStatus::Waiting {
                return Err(MatchError::validation("Match is not open for joining"));
            }
            if record.is_full() {
                return Err(MatchError::validation("Match is full"));
            }
            let mut players = txn.load_players(match_id).await?;
            if players.iter().any(|p| p.user_id == user_id) {
                return Err(MatchError::validation("Already in this match"));
            }
            active_account(txn.as_mut(), user_id).await?;

            let color = next_free_color(players.iter().map(|p| p.color))
                .ok_or_else(|| MatchError::validation("Match is full"))?;
            txn.lock_entry_fee(user_id, record.entry_fee).await?;

            let player = PlayerRecord::new(match_id, user_id, color, now);
            txn.insert_player(&player).await?;
            txn.insert_wager(&entry_wager(&record, user_id, now)).await?;

            record.current_players += 1;
            if record.is_full() {
                record.status = MatchStatus::Ready;
            }
            txn.update_match(&record).await?;

            players.push(player);
            players.sort_by_key(|p| p.color.index());
            let names = usernames(txn.as_mut(), &players).await?;
            Ok(summarize(&record, &players, &names))
        }
        .await;

        let summary = match result {
            Ok(summary) => {
                txn.commit().await?;
                summary
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        tracing::info!(
            target = LOG_TARGET,
            %match_id,
            %user_id,
            players = summary.current_players,
            "player joined"
        );
        if summary.status == MatchStatus::Ready {
            self.broadcaster.to_match(
                match_id,
                ServerEvent::MatchReady {
                    match_id,
                    players: summary.players.clone(),
                },
            );
        }
        Ok(summary)
    }

    async fn player_ready(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<ReadyOutcome, MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            if record.status != MatchStatus::Ready {
                return Err(MatchError::validation("Match is not ready to start"));
            }
            let players = txn.load_players(match_id).await?;
            if !players.iter().any(|p| p.user_id == user_id) {
                return Err(MatchError::NotFound("match player"));
            }

            self.coordination.mark_ready(match_id, user_id).await?;
            let mut all_ready = true;
            for player in &players {
                if !self.coordination.is_ready(match_id, player.user_id).await? {
                    all_ready = false;
                    break;
                }
            }
            if !all_ready {
                return Ok((ReadyOutcome { all_ready, started: None }, players));
            }

            let first = first_turn_seat(&turn_seats(&players))
                .ok_or_else(|| MatchError::internal("ready match has no seated players"))?;
            record.status = MatchStatus::InProgress;
            record.started_at = Some(now);
            let handoff = self
                .grant_turn(txn.as_mut(), &mut record, first.user_id, now)
                .await?;
            Ok((
                ReadyOutcome {
                    all_ready,
                    started: Some(handoff),
                },
                players,
            ))
        }
        .await;

        let (outcome, players) = match result {
            Ok(value) => {
                txn.commit().await?;
                value
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        if let Some(handoff) = &outcome.started {
            let users: Vec<UserId> = players.iter().map(|p| p.user_id).collect();
            if let Err(err) = self.coordination.clear_ready(match_id, &users).await {
                tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "failed to clear ready flags");
            }
            self.arm_turn_timer(match_id, handoff);
            self.broadcaster.to_match(
                match_id,
                ServerEvent::GameStarted {
                    match_id,
                    turn_user_id: handoff.user_id,
                    turn_deadline: handoff.deadline,
                },
            );
            tracing::info!(target = LOG_TARGET, %match_id, first = %handoff.user_id, "match started");
        }
        Ok(outcome)
    }

    async fn leave_match(&self, user_id: UserId, match_id: MatchId) -> Result<(), MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            if !record.status.is_pre_start() {
                return Err(MatchError::validation(
                    "Cannot leave a match that has already started",
                ));
            }
            let players = txn.load_players(match_id).await?;
            if !players.iter().any(|p| p.user_id == user_id) {
                return Err(MatchError::NotFound("match player"));
            }

            txn.delete_player(match_id, user_id).await?;
            txn.move_locked_to_spendable(user_id, record.entry_fee).await?;
            for mut wager in txn.load_wagers(match_id).await? {
                if wager.user_id == user_id && wager.status == WagerStatus::Active {
                    wager.status = WagerStatus::Refunded;
                    wager.actual_win = Some(Decimal::ZERO);
                    wager.net_profit = Some(Decimal::ZERO);
                    wager.settled_at = Some(now);
                    txn.update_wager(&wager).await?;
                }
            }

            record.current_players = record.current_players.saturating_sub(1);
            if record.current_players == 0 {
                record.status = MatchStatus::Cancelled;
                record.ended_at = Some(now);
            } else {
                record.status = MatchStatus::Waiting;
            }
            txn.update_match(&record).await?;
            Ok((record, players))
        }
        .await;

        let (record, players) = match result {
            Ok(value) => {
                txn.commit().await?;
                value
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        let users: Vec<UserId> = players.iter().map(|p| p.user_id).collect();
        if let Err(err) = self.coordination.clear_ready(match_id, &users).await {
            tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "failed to clear ready flags");
        }
        tracing::info!(
            target = LOG_TARGET,
            %match_id,
            %user_id,
            status = %record.status,
            "player left"
        );
        if record.status == MatchStatus::Cancelled {
            self.locks.remove(&match_id);
        } else {
            self.broadcast_snapshot(match_id).await;
        }
        Ok(())
    }

    async fn roll_dice(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<RollOutcome, MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            ensure_turn(&record, user_id)?;
            if self
                .coordination
                .pending_dice(match_id, user_id)
                .await?
                .is_some()
            {
                return Err(MatchError::validation("Dice already rolled, move a piece"));
            }

            let dice = ensure_dice(self.dice.roll())?;
            let players = txn.load_players(match_id).await?;
            let mover = find_player(&players, user_id)?;

            if dice == 6 {
                let streak = self.coordination.sixes_streak(match_id).await? + 1;
                if streak >= self.rules.sixes_limit {
                    txn.insert_move(&pass_move(&record, user_id, mover.color, dice, now))
                        .await?;
                    let next = self
                        .pass_turn(txn.as_mut(), &mut record, &players, mover.color, now)
                        .await?;
                    return Ok((dice, RollStep::Forfeited(next)));
                }
            }

            let moves = valid_moves(dice, mover.color, user_id, &mover.pieces, &board(&players));
            if !moves.is_empty() {
                return Ok((dice, RollStep::Moves(moves)));
            }

            if dice == 6 {
                let again = self
                    .grant_turn(txn.as_mut(), &mut record, user_id, now)
                    .await?;
                return Ok((dice, RollStep::Stuck(again)));
            }

            txn.insert_move(&pass_move(&record, user_id, mover.color, dice, now))
                .await?;
            let next = self
                .pass_turn(txn.as_mut(), &mut record, &players, mover.color, now)
                .await?;
            Ok((dice, RollStep::Passed(next)))
        }
        .await;

        let (dice, step) = match result {
            Ok(value) => {
                txn.commit().await?;
                value
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        if matches!(step, RollStep::Moves(_)) {
            self.coordination.store_dice(match_id, user_id, dice).await?;
        }
        let streak = if dice == 6 && !matches!(step, RollStep::Forfeited(_)) {
            self.coordination.record_six(match_id).await.map(drop)
        } else {
            self.coordination.reset_sixes(match_id).await
        };
        if let Err(err) = streak {
            tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "failed to update six streak");
        }

        let (valid_moves, forfeited, handoff) = match step {
            RollStep::Moves(moves) => (moves, false, None),
            RollStep::Forfeited(next) => {
                (Vec::new(), true, Some((next, TurnChangeReason::ThreeSixes)))
            }
            RollStep::Stuck(next) | RollStep::Passed(next) => {
                (Vec::new(), false, Some((next, TurnChangeReason::NoValidMoves)))
            }
        };

        tracing::debug!(
            target = LOG_TARGET,
            %match_id,
            %user_id,
            dice,
            moves = valid_moves.len(),
            forfeited,
            "dice rolled"
        );
        self.broadcaster.to_user(
            user_id,
            ServerEvent::DiceResult {
                match_id,
                user_id,
                dice_value: dice,
                valid_moves: valid_moves.clone(),
                forfeited,
            },
        );
        if !valid_moves.is_empty() {
            self.broadcaster.to_user(
                user_id,
                ServerEvent::ValidMoves {
                    match_id,
                    moves: valid_moves.clone(),
                },
            );
        }
        let turn_passed = handoff.is_some();
        if let Some((next, reason)) = handoff {
            self.announce_turn(match_id, user_id, &next, reason).await;
        }

        Ok(RollOutcome {
            dice_value: dice,
            valid_moves,
            forfeited,
            turn_passed,
        })
    }

    async fn execute_move(
        &self,
        user_id: UserId,
        match_id: MatchId,
        piece_id: PieceId,
        dice_value: DiceValue,
    ) -> Result<MoveOutcome, MatchError> {
        let dice = ensure_dice(dice_value)?;
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            ensure_turn(&record, user_id)?;
            match self.coordination.pending_dice(match_id, user_id).await? {
                Some(pending) if pending == dice => {}
                Some(_) => {
                    return Err(MatchError::validation(
                        "Dice value does not match the pending roll",
                    ))
                }
                None => return Err(MatchError::validation("No pending dice roll, roll first")),
            }

            let mut players = txn.load_players(match_id).await?;
            let mover_index = players
                .iter()
                .position(|p| p.user_id == user_id)
                .ok_or(MatchError::NotFound("match player"))?;
            let mover_color = players[mover_index].color;
            let moves = valid_moves(
                dice,
                mover_color,
                user_id,
                &players[mover_index].pieces,
                &board(&players),
            );
            let chosen = find_move(&moves, piece_id)?.clone();

            if let (Some(victim_id), Some(victim_piece)) =
                (chosen.killed_user_id, chosen.killed_piece_id)
            {
                let victim = players
                    .iter_mut()
                    .find(|p| p.user_id == victim_id)
                    .ok_or_else(|| MatchError::internal("captured piece has no owner"))?;
                victim.pieces.set_position(victim_piece, Position::YARD);
                victim.pieces_home = victim.pieces.home_count();
                txn.update_player(victim).await?;
            }

            let mover = &mut players[mover_index];
            mover.pieces.set_position(piece_id, chosen.to_position);
            mover.pieces_home = mover.pieces.home_count();
            let is_win = mover.pieces.all_home();
            txn.update_player(mover).await?;

            txn.insert_move(&MoveRecord {
                match_id,
                user_id,
                turn_number: record.turn_number,
                dice_value: dice,
                piece_id: Some(piece_id),
                from_position: chosen.from_position,
                to_position: chosen.to_position,
                is_kill: chosen.is_kill,
                killed_user_id: chosen.killed_user_id,
                killed_piece_id: chosen.killed_piece_id,
                is_home_entry: chosen.is_home_entry,
                kind: classify_move(mover_color, chosen.to_position, chosen.is_kill, false),
                created_at: now,
            })
            .await?;

            let last_move = LastMove {
                user_id,
                piece_id,
                dice_value: dice,
                from_position: chosen.from_position,
                to_position: chosen.to_position,
            };
            let mut outcome = MoveOutcome {
                is_kill: chosen.is_kill,
                killed_user_id: chosen.killed_user_id,
                killed_piece_id: chosen.killed_piece_id,
                is_home: chosen.to_position.is_home(),
                is_win,
                next_user_id: None,
            };

            if is_win {
                let settlement =
                    settle_in_txn(txn.as_mut(), &mut record, &mut players, user_id, now).await?;
                return Ok(MoveStep {
                    outcome,
                    last_move,
                    next: None,
                    finished: Some((settlement, record, players)),
                });
            }

            let next = if dice == 6 {
                self.grant_turn(txn.as_mut(), &mut record, user_id, now).await?
            } else {
                self.pass_turn(txn.as_mut(), &mut record, &players, mover_color, now)
                    .await?
            };
            outcome.next_user_id = Some(next.user_id);
            Ok(MoveStep {
                outcome,
                last_move,
                next: Some(next),
                finished: None,
            })
        }
        .await;

        let step = match result {
            Ok(step) => {
                txn.commit().await?;
                step
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };
        if let Err(err) = self.coordination.clear_dice(match_id, user_id).await {
            tracing::error!(target = LOG_TARGET, %match_id, %user_id, error = %err, "failed to consume pending roll");
        }

        let MoveStep {
            outcome,
            last_move,
            next,
            finished,
        } = step;

        if let (Some(victim_id), Some(victim_piece)) =
            (outcome.killed_user_id, outcome.killed_piece_id)
        {
            self.broadcaster.to_match(
                match_id,
                ServerEvent::PieceKilled {
                    match_id,
                    killer_id: user_id,
                    victim_id,
                    piece_id: victim_piece,
                },
            );
        }
        if outcome.is_home {
            self.broadcaster.to_match(
                match_id,
                ServerEvent::PieceHome {
                    match_id,
                    user_id,
                    piece_id,
                },
            );
        }
        match MatchService::match_state(self, match_id).await {
            Ok(snapshot) => self.broadcaster.to_match(
                match_id,
                ServerEvent::MatchUpdate {
                    snapshot,
                    last_move: Some(last_move),
                },
            ),
            Err(err) => {
                tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "snapshot after move failed");
            }
        }

        if let Some((settlement, record, players)) = finished {
            self.after_settlement(&settlement, &record, &players).await;
        } else if let Some(next) = next {
            let reason = if next.user_id == user_id {
                TurnChangeReason::ExtraRoll
            } else {
                TurnChangeReason::Move
            };
            self.announce_turn(match_id, user_id, &next, reason).await;
        }

        Ok(outcome)
    }

    async fn move_piece(
        &self,
        user_id: UserId,
        match_id: MatchId,
        piece_id: PieceId,
    ) -> Result<MoveOutcome, MatchError> {
        let dice = self
            .coordination
            .pending_dice(match_id, user_id)
            .await?
            .ok_or_else(|| MatchError::validation("No pending dice roll, roll first"))?;
        self.execute_move(user_id, match_id, piece_id, dice).await
    }

    async fn handle_timeout(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<TimeoutOutcome, MatchError> {
        self.expire_turn(match_id, user_id, None).await
    }

    async fn end_game(
        &self,
        match_id: MatchId,
        winner_id: UserId,
    ) -> Result<Option<Settlement>, MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            if record.status.is_terminal() {
                return Ok(None);
            }
            let mut players = txn.load_players(match_id).await?;
            let settlement =
                settle_in_txn(txn.as_mut(), &mut record, &mut players, winner_id, now).await?;
            Ok(Some((settlement, record, players)))
        }
        .await;

        match result {
            Ok(Some((settlement, record, players))) => {
                txn.commit().await?;
                self.after_settlement(&settlement, &record, &players).await;
                Ok(Some(settlement))
            }
            Ok(None) => {
                txn.rollback().await;
                tracing::debug!(target = LOG_TARGET, %match_id, "end_game on finished match ignored");
                Ok(None)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn create_dispute(
        &self,
        user_id: UserId,
        match_id: MatchId,
        request: DisputeRequest,
    ) -> Result<DisputeRecord, MatchError> {
        validate_dispute(&request)?;
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let mut record = load_match(txn.as_mut(), match_id).await?;
            let players = txn.load_players(match_id).await?;
            if !players.iter().any(|p| p.user_id == user_id) {
                return Err(MatchError::NotFound("match player"));
            }
            match record.status {
                MatchStatus::InProgress => {}
                MatchStatus::Disputed => {
                    return Err(MatchError::validation("Match is already disputed"))
                }
                _ => {
                    return Err(MatchError::validation(
                        "Only matches in progress can be disputed",
                    ))
                }
            }

            let dispute = DisputeRecord {
                id: Uuid::new_v4(),
                user_id,
                match_id,
                reason: request.reason.trim().to_owned(),
                evidence_urls: request.evidence_urls,
                status: DisputeStatus::Open,
                resolution_note: None,
                resolved_by: None,
                created_at: now,
                resolved_at: None,
            };
            txn.insert_dispute(&dispute).await?;

            let turn_user = record.turn_user_id;
            record.status = MatchStatus::Disputed;
            record.turn_deadline = None;
            txn.update_match(&record).await?;
            Ok((dispute, turn_user))
        }
        .await;

        let (dispute, turn_user) = match result {
            Ok(value) => {
                txn.commit().await?;
                value
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        self.turn_timers.cancel(&match_id);
        if let Some(turn_user) = turn_user {
            if let Err(err) = self.coordination.clear_dice(match_id, turn_user).await {
                tracing::warn!(target = LOG_TARGET, %match_id, error = %err, "failed to drop pending roll");
            }
        }
        tracing::info!(target = LOG_TARGET, %match_id, %user_id, dispute_id = %dispute.id, "match disputed");
        self.broadcast_snapshot(match_id).await;
        Ok(dispute)
    }

    async fn resolve_match(
        &self,
        admin_id: UserId,
        match_id: MatchId,
        request: ResolveMatchRequest,
    ) -> Result<Settlement, MatchError> {
        let _guard = self.lock_match(match_id).await;
        let now = Utc::now();

        let mut txn = self.storage.begin().await?;
        let result = async {
            let admin = txn
                .load_user(admin_id)
                .await?
                .ok_or(MatchError::NotFound("user"))?;
            if admin.role != UserRole::Admin {
                return Err(MatchError::forbidden("Admin role required"));
            }
            let mut record = load_match(txn.as_mut(), match_id).await?;
            if record.status.is_terminal() {
                return Err(MatchError::validation("Match is already settled"));
            }
            let mut players = txn.load_players(match_id).await?;

            for mut dispute in txn.load_disputes(match_id).await? {
                if dispute.status == DisputeStatus::Open {
                    dispute.status = DisputeStatus::Resolved;
                    dispute.resolution_note = request.note.clone();
                    dispute.resolved_by = Some(admin_id);
                    dispute.resolved_at = Some(now);
                    txn.update_dispute(&dispute).await?;
                }
            }

            let settlement = settle_in_txn(
                txn.as_mut(),
                &mut record,
                &mut players,
                request.winner_id,
                now,
            )
            .await?;
            Ok((settlement, record, players))
        }
        .await;

        let (settlement, record, players) = match result {
            Ok(value) => {
                txn.commit().await?;
                value
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        tracing::info!(target = LOG_TARGET, %match_id, %admin_id, winner_id = %settlement.winner_id, "match resolved by admin");
        self.after_settlement(&settlement, &record, &players).await;
        Ok(settlement)
    }

    async fn match_state(&self, match_id: MatchId) -> Result<MatchSnapshot, MatchError> {
        let mut txn = self.storage.begin().await?;
        let result = async {
            let record = load_match(txn.as_mut(), match_id).await?;
            let players = txn.load_players(match_id).await?;
            let names = usernames(txn.as_mut(), &players).await?;
            Ok(snapshot(&record, &players, &names))
        }
        .await;

        match result {
            Ok(snapshot) => {
                txn.commit().await?;
                Ok(snapshot)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn match_summary(&self, match_id: MatchId) -> Result<MatchSummary, MatchError> {
        let mut txn = self.storage.begin().await?;
        let result = async {
            let record = load_match(txn.as_mut(), match_id).await?;
            let players = txn.load_players(match_id).await?;
            let names = usernames(txn.as_mut(), &players).await?;
            Ok(summarize(&record, &players, &names))
        }
        .await;

        match result {
            Ok(summary) => {
                txn.commit().await?;
                Ok(summary)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn lobby(&self, filter: LobbyFilter) -> Result<Vec<MatchSummary>, MatchError> {
        validate_lobby_filter(&filter)?;
        let mut txn = self.storage.begin().await?;
        let result = async {
            let records = txn.list_open_matches(&filter).await?;
            summarize_all(txn.as_mut(), records).await
        }
        .await;

        match result {
            Ok(open) => {
                txn.commit().await?;
                Ok(open)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn my_matches(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<MatchPage, MatchError> {
        let page = validate_page(page)?;
        let mut txn = self.storage.begin().await?;
        let result = async {
            let (total, records) = txn
                .list_user_matches(user_id, page.offset(), u64::from(page.limit))
                .await?;
            let matches = summarize_all(txn.as_mut(), records).await?;
            Ok(MatchPage {
                total,
                page: page.page,
                limit: page.limit,
                total_pages: total.div_ceil(u64::from(page.limit)),
                matches,
            })
        }
        .await;

        match result {
            Ok(page) => {
                txn.commit().await?;
                Ok(page)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn in_progress_matches(&self, user_id: UserId) -> Result<Vec<MatchId>, MatchError> {
        let mut txn = self.storage.begin().await?;
        match txn.in_progress_match_ids(user_id).await {
            Ok(ids) => {
                txn.commit().await?;
                Ok(ids)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn is_participant(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<bool, MatchError> {
        let mut txn = self.storage.begin().await?;
        match txn.load_players(match_id).await {
            Ok(players) => {
                txn.commit().await?;
                Ok(players.iter().any(|p| p.user_id == user_id))
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn player_disconnected(&self, user_id: UserId) -> Result<Vec<MatchId>, MatchError> {
        let live = self.in_progress_matches(user_id).await?;
        let now = Utc::now();
        let window = self.rules.reconnect_window;
        for match_id in &live {
            let match_id = *match_id;
            self.coordination
                .mark_disconnected(match_id, user_id, now)
                .await?;
            self.broadcaster.to_match(
                match_id,
                ServerEvent::PlayerDisconnected {
                    match_id,
                    user_id,
                    reconnect_window_seconds: window.as_secs(),
                },
            );
            let this = self.this.clone();
            self.reconnect_timers
                .arm((match_id, user_id), window, async move {
                    if let Some(service) = this.upgrade() {
                        service.reconnect_expired(match_id, user_id).await;
                    }
                });
        }
        if !live.is_empty() {
            tracing::info!(target = LOG_TARGET, %user_id, matches = live.len(), "player disconnected");
        }
        Ok(live)
    }

    async fn player_reconnected(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<(), MatchError> {
        if self.reconnect_timers.cancel(&(match_id, user_id)) {
            tracing::info!(target = LOG_TARGET, %match_id, %user_id, "player reconnected");
        }
        self.coordination
            .clear_disconnected(match_id, user_id)
            .await?;
        Ok(())
    }

    async fn react(
        &self,
        user_id: UserId,
        match_id: MatchId,
        emoji: String,
    ) -> Result<(), MatchError> {
        validate_emoji(&emoji)?;
        if !self.is_participant(match_id, user_id).await? {
            return Ok(());
        }
        self.broadcaster.to_match(
            match_id,
            ServerEvent::EmojiReaction {
                match_id,
                user_id,
                emoji,
            },
        );
        Ok(())
    }
}

impl MatchLifecycle {
    fn broadcast_elimination(&self, match_id: MatchId, user_id: UserId) {
        self.broadcaster.to_match(
            match_id,
            ServerEvent::PlayerEliminated {
                match_id,
                user_id,
                reason: "timeout".into(),
            },
        );
    }
}

fn generate_match_code() -> String {
    let bytes: [u8; 3] = rand::thread_rng().gen();
    hex::encode_upper(bytes)
}

async fn load_match(
    txn: &mut (dyn MatchStorageTxn + Send),
    match_id: MatchId,
) -> Result<MatchRecord, MatchError> {
    txn.load_match(match_id)
        .await?
        .ok_or(MatchError::NotFound("match"))
}

async fn active_account(
    txn: &mut (dyn MatchStorageTxn + Send),
    user_id: UserId,
) -> Result<UserAccount, MatchError> {
    let account = txn
        .load_user(user_id)
        .await?
        .ok_or(MatchError::NotFound("user"))?;
    if account.is_banned {
        return Err(MatchError::forbidden("Account is banned"));
    }
    Ok(account)
}

fn ensure_turn(record: &MatchRecord, user_id: UserId) -> Result<(), MatchError> {
    if record.status != MatchStatus::InProgress {
        return Err(MatchError::validation("Match is not in progress"));
    }
    if !record.is_turn_of(user_id) {
        return Err(MatchError::validation("Not your turn"));
    }
    Ok(())
}

fn find_player(players: &[PlayerRecord], user_id: UserId) -> Result<&PlayerRecord, MatchError> {
    players
        .iter()
        .find(|p| p.user_id == user_id)
        .ok_or(MatchError::NotFound("match player"))
}

/// Audit row for a roll that moved nothing.
fn pass_move(
    record: &MatchRecord,
    user_id: UserId,
    color: Color,
    dice: DiceValue,
    now: DateTime<Utc>,
) -> MoveRecord {
    MoveRecord {
        match_id: record.id,
        user_id,
        turn_number: record.turn_number,
        dice_value: dice,
        piece_id: None,
        from_position: Position::YARD,
        to_position: Position::YARD,
        is_kill: false,
        killed_user_id: None,
        killed_piece_id: None,
        is_home_entry: false,
        kind: classify_move(color, Position::YARD, false, true),
        created_at: now,
    }
}

fn turn_seats(players: &[PlayerRecord]) -> Vec<TurnSeat> {
    players
        .iter()
        .map(|p| TurnSeat {
            user_id: p.user_id,
            color: p.color,
            is_eliminated: p.is_eliminated,
        })
        .collect()
}

fn board(players: &[PlayerRecord]) -> Vec<BoardSeat<'_>> {
    players
        .iter()
        .map(|p| BoardSeat {
            user_id: p.user_id,
            color: p.color,
            pieces: &p.pieces,
        })
        .collect()
}

fn entry_wager(record: &MatchRecord, user_id: UserId, now: DateTime<Utc>) -> WagerRecord {
    WagerRecord {
        id: Uuid::new_v4(),
        user_id,
        match_id: record.id,
        entry_amount: record.entry_fee,
        potential_win: record.winner_prize(),
        actual_win: None,
        net_profit: None,
        status: WagerStatus::Active,
        created_at: now,
        settled_at: None,
    }
}

async fn usernames(
    txn: &mut (dyn MatchStorageTxn + Send),
    players: &[PlayerRecord],
) -> Result<HashMap<UserId, String>, MatchError> {
    let mut names = HashMap::with_capacity(players.len());
    for player in players {
        if let Some(account) = txn.load_user(player.user_id).await? {
            names.insert(player.user_id, account.username);
        }
    }
    Ok(names)
}

fn name_of(names: &HashMap<UserId, String>, user_id: UserId) -> String {
    names.get(&user_id).cloned().unwrap_or_default()
}

fn summarize(
    record: &MatchRecord,
    players: &[PlayerRecord],
    names: &HashMap<UserId, String>,
) -> MatchSummary {
    MatchSummary {
        id: record.id,
        code: record.code.clone(),
        game_mode: record.game_mode,
        entry_fee: record.entry_fee,
        prize_pool: record.prize_pool,
        platform_fee: record.platform_fee,
        max_players: record.max_players,
        current_players: record.current_players,
        status: record.status,
        winner_id: record.winner_id,
        created_at: record.created_at,
        players: players
            .iter()
            .map(|p| RosterEntry {
                user_id: p.user_id,
                username: name_of(names, p.user_id),
                color: p.color,
            })
            .collect(),
    }
}

async fn summarize_all(
    txn: &mut (dyn MatchStorageTxn + Send),
    records: Vec<MatchRecord>,
) -> Result<Vec<MatchSummary>, MatchError> {
    let mut summaries = Vec::with_capacity(records.len());
    for record in records {
        let players = txn.load_players(record.id).await?;
        let names = usernames(txn, &players).await?;
        summaries.push(summarize(&record, &players, &names));
    }
    Ok(summaries)
}

fn snapshot(
    record: &MatchRecord,
    players: &[PlayerRecord],
    names: &HashMap<UserId, String>,
) -> MatchSnapshot {
    MatchSnapshot {
        match_id: record.id,
        status: record.status,
        turn_user_id: record.turn_user_id,
        turn_deadline: record.turn_deadline,
        turn_number: record.turn_number,
        players: players
            .iter()
            .map(|p| PlayerSnapshot {
                user_id: p.user_id,
                username: name_of(names, p.user_id),
                color: p.color,
                pieces: p.pieces,
                pieces_home: p.pieces_home,
                is_eliminated: p.is_eliminated,
                final_rank: p.final_rank,
            })
            .collect(),
    }
}
