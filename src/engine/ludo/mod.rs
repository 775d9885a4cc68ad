pub mod board;
pub mod dice;
pub mod errors;
pub mod moves;
pub mod turn_order;
pub mod types;

pub use board::*;
pub use dice::*;
pub use errors::*;
pub use moves::*;
pub use turn_order::*;
pub use types::*;

#[cfg(test)]
mod tests;
