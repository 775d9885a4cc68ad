//! Wallet ledger seam.
//!
//! Balances belong to the wallet service; the match engine only moves funds
//! between buckets, always inside the storage transaction that changes the
//! match rows, so a failed step rolls every bucket back together.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    Spendable,
    Bonus,
    Winnings,
    Locked,
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("wallet for user {0} not found")]
    NotFound(Uuid),
    #[error("insufficient {0:?} balance")]
    Insufficient(BalanceKind),
    #[error("amount must be positive, got {0}")]
    NonPositive(Decimal),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalances {
    pub user_id: Uuid,
    pub spendable: Decimal,
    pub bonus: Decimal,
    pub winnings: Decimal,
    pub locked: Decimal,
    pub total_wagered: Decimal,
    pub total_won: Decimal,
}

impl WalletBalances {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            spendable: Decimal::ZERO,
            bonus: Decimal::ZERO,
            winnings: Decimal::ZERO,
            locked: Decimal::ZERO,
            total_wagered: Decimal::ZERO,
            total_won: Decimal::ZERO,
        }
    }

    /// Funds usable for an entry fee.
    pub fn available_for_entry(&self) -> Decimal {
        self.spendable + self.bonus
    }

    /// Splits an entry fee across spendable first, then bonus.
    pub fn entry_split(&self, fee: Decimal) -> Option<(Decimal, Decimal)> {
        if self.available_for_entry() < fee {
            return None;
        }
        let from_spendable = self.spendable.min(fee).max(Decimal::ZERO);
        Some((from_spendable, fee - from_spendable))
    }

    pub fn get(&self, kind: BalanceKind) -> Decimal {
        match kind {
            BalanceKind::Spendable => self.spendable,
            BalanceKind::Bonus => self.bonus,
            BalanceKind::Winnings => self.winnings,
            BalanceKind::Locked => self.locked,
        }
    }

    fn slot(&mut self, kind: BalanceKind) -> &mut Decimal {
        match kind {
            BalanceKind::Spendable => &mut self.spendable,
            BalanceKind::Bonus => &mut self.bonus,
            BalanceKind::Winnings => &mut self.winnings,
            BalanceKind::Locked => &mut self.locked,
        }
    }

    /// Applies `delta`, refusing any change that would leave a bucket negative.
    pub fn apply(&self, delta: &WalletDelta) -> Result<WalletBalances, WalletError> {
        let mut next = self.clone();
        for (kind, change) in delta.changes() {
            let slot = next.slot(kind);
            let updated = *slot + change;
            if updated < Decimal::ZERO {
                return Err(WalletError::Insufficient(kind));
            }
            *slot = updated;
        }
        next.total_wagered += delta.wagered;
        next.total_won += delta.won;
        Ok(next)
    }
}

/// Signed per-bucket change applied atomically to one wallet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletDelta {
    pub spendable: Decimal,
    pub bonus: Decimal,
    pub winnings: Decimal,
    pub locked: Decimal,
    pub wagered: Decimal,
    pub won: Decimal,
}

impl WalletDelta {
    fn changes(&self) -> [(BalanceKind, Decimal); 4] {
        [
            (BalanceKind::Spendable, self.spendable),
            (BalanceKind::Bonus, self.bonus),
            (BalanceKind::Winnings, self.winnings),
            (BalanceKind::Locked, self.locked),
        ]
    }

    fn add(mut self, kind: BalanceKind, amount: Decimal) -> Self {
        match kind {
            BalanceKind::Spendable => self.spendable += amount,
            BalanceKind::Bonus => self.bonus += amount,
            BalanceKind::Winnings => self.winnings += amount,
            BalanceKind::Locked => self.locked += amount,
        }
        self
    }
}

fn ensure_positive(amount: Decimal) -> Result<Decimal, WalletError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(WalletError::NonPositive(amount))
    }
}

/// Wallet operations callable inside a storage transaction.
///
/// Implementors provide loading and one atomic delta primitive; the named
/// operations are built on top of it.
#[async_trait]
pub trait WalletLedger: Send {
    async fn load_wallet(&mut self, user_id: Uuid) -> Result<Option<WalletBalances>, WalletError>;

    async fn apply_delta(
        &mut self,
        user_id: Uuid,
        delta: WalletDelta,
    ) -> Result<WalletBalances, WalletError>;

    async fn debit(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
        from: BalanceKind,
    ) -> Result<WalletBalances, WalletError> {
        let amount = ensure_positive(amount)?;
        self.apply_delta(user_id, WalletDelta::default().add(from, -amount))
            .await
    }

    async fn credit(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
        to: BalanceKind,
    ) -> Result<WalletBalances, WalletError> {
        let amount = ensure_positive(amount)?;
        self.apply_delta(user_id, WalletDelta::default().add(to, amount))
            .await
    }

    /// Escrows an entry fee: spendable first, bonus for the remainder.
    async fn lock_entry_fee(
        &mut self,
        user_id: Uuid,
        fee: Decimal,
    ) -> Result<WalletBalances, WalletError> {
        let wallet = self
            .load_wallet(user_id)
            .await?
            .ok_or(WalletError::NotFound(user_id))?;
        if fee.is_zero() {
            return Ok(wallet);
        }
        let fee = ensure_positive(fee)?;
        let (from_spendable, from_bonus) = wallet
            .entry_split(fee)
            .ok_or(WalletError::Insufficient(BalanceKind::Spendable))?;
        let delta = WalletDelta {
            spendable: -from_spendable,
            bonus: -from_bonus,
            locked: fee,
            wagered: fee,
            ..WalletDelta::default()
        };
        self.apply_delta(user_id, delta).await
    }

    async fn move_locked_to_spendable(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<WalletBalances, WalletError> {
        if amount.is_zero() {
            return self
                .load_wallet(user_id)
                .await?
                .ok_or(WalletError::NotFound(user_id));
        }
        let amount = ensure_positive(amount)?;
        let delta = WalletDelta {
            locked: -amount,
            spendable: amount,
            wagered: -amount,
            ..WalletDelta::default()
        };
        self.apply_delta(user_id, delta).await
    }

    /// Settles a winner: the escrowed stake leaves `locked` and the payout lands in `winnings`.
    async fn move_locked_to_winnings(
        &mut self,
        user_id: Uuid,
        locked: Decimal,
        payout: Decimal,
    ) -> Result<WalletBalances, WalletError> {
        let delta = WalletDelta {
            locked: -locked,
            winnings: payout,
            won: payout,
            ..WalletDelta::default()
        };
        self.apply_delta(user_id, delta).await
    }

    /// Releases a loser's escrow into the prize pool.
    async fn release_locked(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<WalletBalances, WalletError> {
        let delta = WalletDelta {
            locked: -amount,
            ..WalletDelta::default()
        };
        self.apply_delta(user_id, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(spendable: i64, bonus: i64) -> WalletBalances {
        WalletBalances {
            spendable: Decimal::from(spendable),
            bonus: Decimal::from(bonus),
            ..WalletBalances::empty(Uuid::new_v4())
        }
    }

    #[test]
    fn entry_split_prefers_spendable() {
        assert_eq!(
            wallet(20, 5).entry_split(Decimal::from(10)),
            Some((Decimal::from(10), Decimal::ZERO))
        );
        assert_eq!(
            wallet(4, 10).entry_split(Decimal::from(10)),
            Some((Decimal::from(4), Decimal::from(6)))
        );
        assert_eq!(wallet(4, 5).entry_split(Decimal::from(10)), None);
    }

    #[test]
    fn apply_refuses_negative_buckets() {
        let base = wallet(5, 0);
        let overdraw = WalletDelta {
            spendable: Decimal::from(-6),
            ..WalletDelta::default()
        };
        assert!(matches!(
            base.apply(&overdraw),
            Err(WalletError::Insufficient(BalanceKind::Spendable))
        ));

        let exact = WalletDelta {
            spendable: Decimal::from(-5),
            locked: Decimal::from(5),
            ..WalletDelta::default()
        };
        let next = base.apply(&exact).expect("exact debit fits");
        assert!(next.spendable.is_zero());
        assert_eq!(next.locked, Decimal::from(5));
    }
}
