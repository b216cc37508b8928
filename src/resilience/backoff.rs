//! Linear backoff between retry attempts.

use std::time::Duration;

/// Delay to wait after failed attempt `attempt` (1-based): `attempt * step`.
pub fn calculate_backoff(attempt: u32, step: Duration) -> Duration {
    step.saturating_mul(attempt)
}
