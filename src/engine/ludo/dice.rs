use rand::rngs::OsRng;
use rand::Rng;

use super::types::DiceValue;

pub trait DiceSource: Send + Sync {
    fn roll(&self) -> DiceValue;
}

/// Uniform 1..=6 drawn from the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecureDice;

impl DiceSource for SecureDice {
    fn roll(&self) -> DiceValue {
        OsRng.gen_range(1..=6)
    }
}

pub fn roll_dice() -> DiceValue {
    SecureDice.roll()
}
