use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::LudoMoveType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ludo_moves")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub turn_number: i32,
    pub dice_value: i16,
    pub piece_id: String,
    pub from_position: i16,
    pub to_position: i16,
    pub is_kill: bool,
    pub killed_user_id: Option<Uuid>,
    pub killed_piece_id: Option<String>,
    pub is_home_entry: bool,
    pub move_type: LudoMoveType,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
