//! Match lifecycle: lobby, turns, timeouts, disputes and prize settlement.

pub mod error;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
mod tests;

pub use error::MatchError;
pub use service::{MatchLifecycle, MatchLifecycleParts, MatchService};
pub use storage::{InMemoryMatchStorage, MatchStorage, MatchStorageTxn, SeaOrmMatchStorage};
pub use types::*;
