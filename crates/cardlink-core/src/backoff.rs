//! Retry delay policies.
//!
//! The reader reconnects with a linear backoff (1 s, 2 s, ... capped at 5 s)
//! that resets after a successful connect; the queue consumer retries with a
//! fixed delay. Both are expressed by [`Backoff`].

use crate::constants::{RECONNECT_CAP_MS, RECONNECT_FLOOR_MS, RECONNECT_STEP_MS};
use std::time::Duration;

/// Linear, capped retry delay.
///
/// Each call to [`next_delay`](Backoff::next_delay) returns the current delay
/// and then grows it by `step`, never beyond `cap`. [`reset`](Backoff::reset)
/// returns to `floor`. The sequence of delays is therefore monotonically
/// non-decreasing between resets.
///
/// # Examples
///
/// ```
/// use cardlink_core::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::linear(
///     Duration::from_secs(1),
///     Duration::from_secs(1),
///     Duration::from_secs(3),
/// );
///
/// assert_eq!(backoff.next_delay(), Duration::from_secs(1));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(2));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(3));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(3));
///
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    step: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    /// Linear backoff from `floor` in increments of `step`, capped at `cap`.
    ///
    /// A `cap` below `floor` is raised to `floor`.
    pub fn linear(floor: Duration, step: Duration, cap: Duration) -> Self {
        let cap = cap.max(floor);
        Self {
            floor,
            step,
            cap,
            current: floor,
        }
    }

    /// Constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self::linear(delay, Duration::ZERO, delay)
    }

    /// Delay that will be returned by the next call to `next_delay`.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the current delay and advance towards the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + self.step).min(self.cap);
        delay
    }

    /// Return to the floor delay.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::linear(
            Duration::from_millis(RECONNECT_FLOOR_MS),
            Duration::from_millis(RECONNECT_STEP_MS),
            Duration::from_millis(RECONNECT_CAP_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reader_backoff_sequence() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3, 4, 5, 5, 5]);
    }

    #[test]
    fn test_backoff_is_monotonic_until_reset() {
        let mut backoff = Backoff::linear(
            Duration::from_millis(250),
            Duration::from_millis(300),
            Duration::from_secs(2),
        );

        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(2));
            previous = delay;
        }
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_secs(4));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_backoff() {
        let mut backoff = Backoff::fixed(Duration::from_secs(5));
        for _ in 0..3 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_cap_below_floor_is_raised() {
        let mut backoff = Backoff::linear(
            Duration::from_secs(3),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
    }
}
