use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::LudoColor;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ludo_match_players")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub match_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    pub color: LudoColor,
    pub pieces_state: Json,
    pub pieces_home: i16,
    pub is_eliminated: bool,
    pub final_rank: Option<i16>,
    pub joined_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ludo_matches::Entity",
        from = "Column::MatchId",
        to = "super::ludo_matches::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Match,
}

impl Related<super::ludo_matches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Match.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
