use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ludo_game_mode")]
pub enum GameMode {
    #[sea_orm(string_value = "ONE_V_ONE")]
    OneVOne,
    #[sea_orm(string_value = "TWO_V_TWO")]
    TwoVTwo,
    #[sea_orm(string_value = "FOUR_PLAYER")]
    FourPlayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ludo_match_status")]
pub enum MatchStatus {
    #[sea_orm(string_value = "WAITING")]
    Waiting,
    #[sea_orm(string_value = "READY")]
    Ready,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "DISPUTED")]
    Disputed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ludo_color")]
pub enum LudoColor {
    #[sea_orm(string_value = "RED")]
    Red,
    #[sea_orm(string_value = "GREEN")]
    Green,
    #[sea_orm(string_value = "YELLOW")]
    Yellow,
    #[sea_orm(string_value = "BLUE")]
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ludo_move_type")]
pub enum LudoMoveType {
    #[sea_orm(string_value = "PASS")]
    Pass,
    #[sea_orm(string_value = "KILL")]
    Kill,
    #[sea_orm(string_value = "HOME")]
    Home,
    #[sea_orm(string_value = "HOME_ENTRY")]
    HomeEntry,
    #[sea_orm(string_value = "SAFE")]
    Safe,
    #[sea_orm(string_value = "MOVE")]
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "wager_status")]
pub enum WagerStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "WON")]
    Won,
    #[sea_orm(string_value = "LOST")]
    Lost,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "dispute_status")]
pub enum DisputeStatus {
    #[sea_orm(string_value = "OPEN")]
    Open,
    #[sea_orm(string_value = "RESOLVED")]
    Resolved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}
