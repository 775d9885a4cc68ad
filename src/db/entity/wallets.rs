use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub main_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub bonus_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub winning_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub locked_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_wagered: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_won: Decimal,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
