//! Exponential backoff between stage retries.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Delay before the given attempt number may run again.
///
/// `base * 2^attempt`, capped at `max`. Attempt 1 is the first retry.
pub fn delay_for_attempt(base: Duration, max: Duration, attempt: u32) -> Duration {
    // Beyond 2^20 the cap always wins; avoid the shift overflowing.
    let exp = attempt.min(20);
    base.saturating_mul(2u32.saturating_pow(exp)).min(max)
}

/// Absolute instant the job becomes eligible again.
pub fn next_eligible_at(
    now: DateTime<Utc>,
    base: Duration,
    max: Duration,
    attempt: u32,
) -> DateTime<Utc> {
    let delay = delay_for_attempt(base, max, attempt);
    now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(3600);

        assert_eq!(delay_for_attempt(base, max, 1), Duration::from_secs(60));
        assert_eq!(delay_for_attempt(base, max, 2), Duration::from_secs(120));
        assert_eq!(delay_for_attempt(base, max, 3), Duration::from_secs(240));
    }

    #[test]
    fn test_delay_is_strictly_increasing_until_cap() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(900);

        let mut previous = Duration::ZERO;
        for attempt in 1..=9 {
            let delay = delay_for_attempt(base, max, attempt);
            assert!(delay > previous, "attempt {attempt} did not increase");
            previous = delay;
        }
    }

    #[test]
    fn test_delay_caps_at_max() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(300);

        assert_eq!(delay_for_attempt(base, max, 10), max);
        assert_eq!(delay_for_attempt(base, max, u32::MAX), max);
    }

    #[test]
    fn test_next_eligible_is_in_the_future() {
        let now = Utc::now();
        let at = next_eligible_at(now, Duration::from_secs(30), Duration::from_secs(900), 1);
        assert_eq!((at - now).num_seconds(), 60);
    }
}
