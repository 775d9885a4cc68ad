use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{GameMode, MatchStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ludo_matches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub match_code: String,
    pub game_mode: GameMode,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub entry_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub prize_pool: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub platform_fee: Decimal,
    pub max_players: i16,
    pub current_players: i16,
    pub status: MatchStatus,
    pub turn_user_id: Option<Uuid>,
    pub turn_deadline: Option<DateTimeUtc>,
    pub turn_number: i32,
    pub winner_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTimeUtc,
    pub game_started_at: Option<DateTimeUtc>,
    pub game_ended_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ludo_match_players::Entity")]
    Players,
}

impl Related<super::ludo_match_players::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Players.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
