use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::WagerStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wagers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub game_type: String,
    pub reference_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub entry_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub potential_win: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))", nullable)]
    pub actual_win: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))", nullable)]
    pub net_profit: Option<Decimal>,
    pub status: WagerStatus,
    pub created_at: DateTimeUtc,
    pub settled_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
