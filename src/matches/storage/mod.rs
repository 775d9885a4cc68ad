use async_trait::async_trait;

use crate::engine::ludo::UserId;
use crate::wallet::WalletLedger;

use super::error::MatchError;
use super::types::{
    DisputeRecord, LobbyFilter, MatchId, MatchRecord, MoveRecord, PlayerRecord, UserAccount,
    UserStats, WagerRecord,
};

#[async_trait]
pub trait MatchStorage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn MatchStorageTxn + Send>, MatchError>;
}

/// One unit of work over match rows, wallets and audit tables.
///
/// `load_match` takes the row lock where the backend supports one, so every
/// read-check-write sequence on a match should start with it.
#[async_trait]
pub trait MatchStorageTxn: WalletLedger + Send {
    async fn load_user(&mut self, user_id: UserId) -> Result<Option<UserAccount>, MatchError>;

    async fn save_user_stats(
        &mut self,
        user_id: UserId,
        stats: &UserStats,
    ) -> Result<(), MatchError>;

    async fn match_code_exists(&mut self, code: &str) -> Result<bool, MatchError>;

    async fn insert_match(&mut self, record: &MatchRecord) -> Result<(), MatchError>;

    async fn load_match(&mut self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchError>;

    async fn update_match(&mut self, record: &MatchRecord) -> Result<(), MatchError>;

    /// Open matches accepted by `filter`, newest first.
    async fn list_open_matches(
        &mut self,
        filter: &LobbyFilter,
    ) -> Result<Vec<MatchRecord>, MatchError>;

    /// Returns the total count alongside the requested page, newest first.
    async fn list_user_matches(
        &mut self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(u64, Vec<MatchRecord>), MatchError>;

    async fn list_in_progress(&mut self) -> Result<Vec<MatchRecord>, MatchError>;

    async fn in_progress_match_ids(&mut self, user_id: UserId) -> Result<Vec<MatchId>, MatchError>;

    /// Players ordered by seat color.
    async fn load_players(&mut self, match_id: MatchId) -> Result<Vec<PlayerRecord>, MatchError>;

    async fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), MatchError>;

    async fn update_player(&mut self, player: &PlayerRecord) -> Result<(), MatchError>;

    async fn delete_player(&mut self, match_id: MatchId, user_id: UserId)
        -> Result<(), MatchError>;

    async fn insert_move(&mut self, record: &MoveRecord) -> Result<(), MatchError>;

    async fn insert_wager(&mut self, wager: &WagerRecord) -> Result<(), MatchError>;

    async fn load_wagers(&mut self, match_id: MatchId) -> Result<Vec<WagerRecord>, MatchError>;

    async fn update_wager(&mut self, wager: &WagerRecord) -> Result<(), MatchError>;

    async fn insert_dispute(&mut self, dispute: &DisputeRecord) -> Result<(), MatchError>;

    async fn load_disputes(&mut self, match_id: MatchId)
        -> Result<Vec<DisputeRecord>, MatchError>;

    async fn update_dispute(&mut self, dispute: &DisputeRecord) -> Result<(), MatchError>;

    async fn commit(self: Box<Self>) -> Result<(), MatchError>;
    async fn rollback(self: Box<Self>);
}

pub mod in_memory;
pub mod sea_orm;

pub use self::in_memory::InMemoryMatchStorage;
pub use self::sea_orm::SeaOrmMatchStorage;
