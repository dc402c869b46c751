//! Adaptive backoff between status polls.

use std::time::Duration;

/// Wait before the very first status query.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(5_000);

/// Upper bound for any single wait between polls.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(60_000);

/// Growth factor applied after every non-terminal poll.
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Next wait after a non-terminal poll: `min(current * 2, max)`.
pub fn next_interval(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(BACKOFF_MULTIPLIER).min(max)
}

/// Infinite sequence of poll waits: `initial`, then doubling up to `max`.
///
/// With the defaults this yields 5s, 10s, 20s, 40s, 60s, 60s, ...
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    next: Duration,
    max: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL)
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = next_interval(current, self.max);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_schedule_doubles_then_caps() {
        let waits: Vec<u128> = BackoffSchedule::default()
            .take(7)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(waits, vec![5_000, 10_000, 20_000, 40_000, 60_000, 60_000, 60_000]);
    }

    #[test]
    fn next_interval_is_capped() {
        assert_eq!(
            next_interval(Duration::from_secs(40), DEFAULT_MAX_INTERVAL),
            Duration::from_secs(60)
        );
        assert_eq!(
            next_interval(Duration::from_secs(60), DEFAULT_MAX_INTERVAL),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn next_interval_does_not_overflow() {
        assert_eq!(next_interval(Duration::MAX, Duration::MAX), Duration::MAX);
    }

    proptest! {
        /// Property: the n-th wait equals min(initial * 2^(n-1), max).
        #[test]
        fn nth_wait_matches_closed_form(n in 1usize..64) {
            let wait = BackoffSchedule::default().nth(n - 1).unwrap().as_millis();
            let doubled = 5_000u128.saturating_mul(1u128 << (n - 1).min(100));
            prop_assert_eq!(wait, doubled.min(60_000));
        }

        /// Property: a step never exceeds the cap and never shrinks below the input.
        #[test]
        fn step_is_monotone_and_bounded(current_ms in 0u64..10_000_000, max_ms in 1u64..10_000_000) {
            let current = Duration::from_millis(current_ms);
            let max = Duration::from_millis(max_ms);
            let next = next_interval(current, max);
            prop_assert!(next <= max);
            if current <= max {
                prop_assert!(next >= current);
            }
        }
    }
}
