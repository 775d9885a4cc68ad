use std::time::Duration;

use rust_decimal::Decimal;

/// Tunable timings and money rules for a match.
///
/// Defaults are the production values; tests shrink the durations.
#[derive(Clone, Debug)]
pub struct MatchRules {
    pub turn_timeout: Duration,
    pub ready_ttl: Duration,
    pub dice_ttl: Duration,
    pub sixes_ttl: Duration,
    pub strike_ttl: Duration,
    pub reconnect_window: Duration,
    pub disconnect_buffer: Duration,
    pub strike_limit: i64,
    pub sixes_limit: i64,
    /// Share of the prize pool kept by the platform (0.10 = 10 %).
    pub platform_fee_rate: Decimal,
    pub match_code_attempts: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(30),
            ready_ttl: Duration::from_secs(60),
            dice_ttl: Duration::from_secs(60),
            sixes_ttl: Duration::from_secs(300),
            strike_ttl: Duration::from_secs(3_600),
            reconnect_window: Duration::from_secs(60),
            disconnect_buffer: Duration::from_secs(10),
            strike_limit: 3,
            sixes_limit: 3,
            platform_fee_rate: Decimal::new(10, 2),
            match_code_attempts: 5,
        }
    }
}

impl MatchRules {
    pub fn disconnect_ttl(&self) -> Duration {
        self.reconnect_window + self.disconnect_buffer
    }

    pub fn turn_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.turn_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30))
    }
}
