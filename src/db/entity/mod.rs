pub mod coordination_keys;
pub mod disputes;
pub mod ludo_match_players;
pub mod ludo_matches;
pub mod ludo_moves;
pub mod notifications;
pub mod sea_orm_active_enums;
pub mod users;
pub mod wagers;
pub mod wallets;
