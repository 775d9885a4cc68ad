use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::engine::ludo::{Pieces, UserId};
use crate::matches::error::MatchError;
use crate::matches::types::{
    DisputeRecord, LobbyFilter, MatchId, MatchRecord, MatchStatus, MoveRecord, PlayerRecord,
    UserAccount, UserRole, UserStats, WagerRecord,
};
use crate::wallet::{WalletBalances, WalletDelta, WalletError, WalletLedger};

use super::{MatchStorage, MatchStorageTxn};

#[derive(Clone, Default)]
struct Inner {
    users: HashMap<UserId, UserAccount>,
    wallets: HashMap<UserId, WalletBalances>,
    matches: HashMap<MatchId, MatchRecord>,
    players: Vec<PlayerRecord>,
    moves: Vec<MoveRecord>,
    wagers: Vec<WagerRecord>,
    disputes: Vec<DisputeRecord>,
}

/// Storage for tests and single-process development.
///
/// Transactions are serialized: each one holds the store lock and edits a
/// private copy that only replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryMatchStorage {
    inner: Arc<Mutex<Inner>>,
    fail_commit: Arc<AtomicBool>,
}

impl InMemoryMatchStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail after the transaction body has run.
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub async fn seed_user(&self, username: &str, role: UserRole) -> UserId {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.users.insert(
            id,
            UserAccount {
                id,
                username: username.to_owned(),
                role,
                is_banned: false,
                stats: UserStats::default(),
            },
        );
        inner.wallets.insert(id, WalletBalances::empty(id));
        id
    }

    pub async fn seed_wallet(&self, user_id: UserId, spendable: Decimal, bonus: Decimal) {
        let mut inner = self.inner.lock().await;
        let wallet = inner
            .wallets
            .entry(user_id)
            .or_insert_with(|| WalletBalances::empty(user_id));
        wallet.spendable = spendable;
        wallet.bonus = bonus;
    }

    pub async fn set_banned(&self, user_id: UserId, banned: bool) {
        if let Some(user) = self.inner.lock().await.users.get_mut(&user_id) {
            user.is_banned = banned;
        }
    }

    pub async fn wallet(&self, user_id: UserId) -> Option<WalletBalances> {
        self.inner.lock().await.wallets.get(&user_id).cloned()
    }

    pub async fn user(&self, user_id: UserId) -> Option<UserAccount> {
        self.inner.lock().await.users.get(&user_id).cloned()
    }

    pub async fn match_record(&self, match_id: MatchId) -> Option<MatchRecord> {
        self.inner.lock().await.matches.get(&match_id).cloned()
    }

    pub async fn players(&self, match_id: MatchId) -> Vec<PlayerRecord> {
        let inner = self.inner.lock().await;
        let mut players: Vec<PlayerRecord> = inner
            .players
            .iter()
            .filter(|p| p.match_id == match_id)
            .cloned()
            .collect();
        players.sort_by_key(|p| p.color.index());
        players
    }

    pub async fn moves(&self, match_id: MatchId) -> Vec<MoveRecord> {
        let inner = self.inner.lock().await;
        inner
            .moves
            .iter()
            .filter(|m| m.match_id == match_id)
            .cloned()
            .collect()
    }

    pub async fn wagers(&self, match_id: MatchId) -> Vec<WagerRecord> {
        let inner = self.inner.lock().await;
        inner
            .wagers
            .iter()
            .filter(|w| w.match_id == match_id)
            .cloned()
            .collect()
    }

    pub async fn disputes(&self, match_id: MatchId) -> Vec<DisputeRecord> {
        let inner = self.inner.lock().await;
        inner
            .disputes
            .iter()
            .filter(|d| d.match_id == match_id)
            .cloned()
            .collect()
    }

    /// Overwrites a seated player's pieces, e.g. to stage an endgame.
    pub async fn place_pieces(&self, match_id: MatchId, user_id: UserId, pieces: Pieces) {
        let mut inner = self.inner.lock().await;
        if let Some(player) = inner
            .players
            .iter_mut()
            .find(|p| p.match_id == match_id && p.user_id == user_id)
        {
            player.pieces = pieces;
            player.pieces_home = pieces.home_count();
        }
    }
}

pub struct InMemoryMatchTxn {
    guard: OwnedMutexGuard<Inner>,
    working: Inner,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl MatchStorage for InMemoryMatchStorage {
    async fn begin(&self) -> Result<Box<dyn MatchStorageTxn + Send>, MatchError> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryMatchTxn {
            guard,
            working,
            fail_commit: Arc::clone(&self.fail_commit),
        }))
    }
}

#[async_trait]
impl WalletLedger for InMemoryMatchTxn {
    async fn load_wallet(&mut self, user_id: Uuid) -> Result<Option<WalletBalances>, WalletError> {
        Ok(self.working.wallets.get(&user_id).cloned())
    }

    async fn apply_delta(
        &mut self,
        user_id: Uuid,
        delta: WalletDelta,
    ) -> Result<WalletBalances, WalletError> {
        let current = self
            .working
            .wallets
            .get(&user_id)
            .ok_or(WalletError::NotFound(user_id))?;
        let next = current.apply(&delta)?;
        self.working.wallets.insert(user_id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl MatchStorageTxn for InMemoryMatchTxn {
    async fn load_user(&mut self, user_id: UserId) -> Result<Option<UserAccount>, MatchError> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn save_user_stats(
        &mut self,
        user_id: UserId,
        stats: &UserStats,
    ) -> Result<(), MatchError> {
        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or(MatchError::NotFound("user"))?;
        user.stats = stats.clone();
        Ok(())
    }

    async fn match_code_exists(&mut self, code: &str) -> Result<bool, MatchError> {
        Ok(self.working.matches.values().any(|m| m.code == code))
    }

    async fn insert_match(&mut self, record: &MatchRecord) -> Result<(), MatchError> {
        if self.working.matches.contains_key(&record.id) {
            return Err(MatchError::validation("match already exists"));
        }
        self.working.matches.insert(record.id, record.clone());
        Ok(())
    }

    async fn load_match(&mut self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchError> {
        Ok(self.working.matches.get(&match_id).cloned())
    }

    async fn update_match(&mut self, record: &MatchRecord) -> Result<(), MatchError> {
        let slot = self
            .working
            .matches
            .get_mut(&record.id)
            .ok_or(MatchError::NotFound("match"))?;
        *slot = record.clone();
        Ok(())
    }

    async fn list_open_matches(
        &mut self,
        filter: &LobbyFilter,
    ) -> Result<Vec<MatchRecord>, MatchError> {
        let mut open: Vec<MatchRecord> = self
            .working
            .matches
            .values()
            .filter(|m| filter.accepts(m))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    async fn list_user_matches(
        &mut self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(u64, Vec<MatchRecord>), MatchError> {
        let mut mine: Vec<MatchRecord> = self
            .working
            .players
            .iter()
            .filter(|p| p.user_id == user_id)
            .filter_map(|p| self.working.matches.get(&p.match_id).cloned())
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = mine.len() as u64;
        let page = mine
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((total, page))
    }

    async fn list_in_progress(&mut self) -> Result<Vec<MatchRecord>, MatchError> {
        Ok(self
            .working
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::InProgress)
            .cloned()
            .collect())
    }

    async fn in_progress_match_ids(&mut self, user_id: UserId) -> Result<Vec<MatchId>, MatchError> {
        Ok(self
            .working
            .players
            .iter()
            .filter(|p| p.user_id == user_id)
            .filter(|p| {
                self.working
                    .matches
                    .get(&p.match_id)
                    .is_some_and(|m| m.status == MatchStatus::InProgress)
            })
            .map(|p| p.match_id)
            .collect())
    }

    async fn load_players(&mut self, match_id: MatchId) -> Result<Vec<PlayerRecord>, MatchError> {
        let mut players: Vec<PlayerRecord> = self
            .working
            .players
            .iter()
            .filter(|p| p.match_id == match_id)
            .cloned()
            .collect();
        players.sort_by_key(|p| p.color.index());
        Ok(players)
    }

    async fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), MatchError> {
        let taken = self.working.players.iter().any(|p| {
            p.match_id == player.match_id
                && (p.user_id == player.user_id || p.color == player.color)
        });
        if taken {
            return Err(MatchError::validation("seat already taken"));
        }
        self.working.players.push(player.clone());
        Ok(())
    }

    async fn update_player(&mut self, player: &PlayerRecord) -> Result<(), MatchError> {
        let slot = self
            .working
            .players
            .iter_mut()
            .find(|p| p.match_id == player.match_id && p.user_id == player.user_id)
            .ok_or(MatchError::NotFound("match player"))?;
        *slot = player.clone();
        Ok(())
    }

    async fn delete_player(
        &mut self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<(), MatchError> {
        self.working
            .players
            .retain(|p| !(p.match_id == match_id && p.user_id == user_id));
        Ok(())
    }

    async fn insert_move(&mut self, record: &MoveRecord) -> Result<(), MatchError> {
        self.working.moves.push(record.clone());
        Ok(())
    }

    async fn insert_wager(&mut self, wager: &WagerRecord) -> Result<(), MatchError> {
        self.working.wagers.push(wager.clone());
        Ok(())
    }

    async fn load_wagers(&mut self, match_id: MatchId) -> Result<Vec<WagerRecord>, MatchError> {
        Ok(self
            .working
            .wagers
            .iter()
            .filter(|w| w.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn update_wager(&mut self, wager: &WagerRecord) -> Result<(), MatchError> {
        let slot = self
            .working
            .wagers
            .iter_mut()
            .find(|w| w.id == wager.id)
            .ok_or(MatchError::NotFound("wager"))?;
        *slot = wager.clone();
        Ok(())
    }

    async fn insert_dispute(&mut self, dispute: &DisputeRecord) -> Result<(), MatchError> {
        self.working.disputes.push(dispute.clone());
        Ok(())
    }

    async fn load_disputes(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<DisputeRecord>, MatchError> {
        Ok(self
            .working
            .disputes
            .iter()
            .filter(|d| d.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn update_dispute(&mut self, dispute: &DisputeRecord) -> Result<(), MatchError> {
        let slot = self
            .working
            .disputes
            .iter_mut()
            .find(|d| d.id == dispute.id)
            .ok_or(MatchError::NotFound("dispute"))?;
        *slot = dispute.clone();
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), MatchError> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(MatchError::internal("commit failed"));
        }
        let working = std::mem::take(&mut self.working);
        *self.guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}
