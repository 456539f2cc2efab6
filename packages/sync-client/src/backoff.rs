//! Reconnection delay policy
//!
//! Exponential backoff with jitter centred on 1.0. Jitter is applied after
//! the cap, so with the defaults a delay can reach 1.5 × `max_delay`.

use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
const DEFAULT_JITTER_FACTOR: f64 = 0.5;

/// Floor applied to every computed delay
pub const MIN_DELAY: Duration = Duration::from_millis(100);

/// Configuration for automatic reconnection behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect
    pub base_delay: Duration,
    /// Cap on the exponential term (before jitter)
    pub max_delay: Duration,
    /// Spread of the jitter multiplier around 1.0, in `[0, 1]`
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before reconnect number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, rand::random::<f64>())
    }

    /// Same as [`delay`](Self::delay) with the random draw supplied
    pub fn delay_with(&self, attempt: u32, random: f64) -> Duration {
        delay_with(
            attempt,
            self.base_delay,
            self.max_delay,
            self.jitter_factor,
            random,
        )
    }

    /// Whether `attempts` reconnects have used up the budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// `min(base * 2^attempt, max)`, saturating
pub fn capped_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(max)
}

/// Jittered backoff delay for `attempt`
pub fn delay(attempt: u32, base: Duration, max: Duration, jitter_factor: f64) -> Duration {
    delay_with(attempt, base, max, jitter_factor, rand::random::<f64>())
}

fn delay_with(
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter_factor: f64,
    random: f64,
) -> Duration {
    let capped = capped_delay(attempt, base, max).as_millis() as f64;
    let multiplier = (1.0 - jitter_factor) + random * jitter_factor * 2.0;
    let raw = capped * multiplier;
    let floor = MIN_DELAY.as_millis() as f64;

    Duration::from_millis(raw.max(floor) as u64)
}
