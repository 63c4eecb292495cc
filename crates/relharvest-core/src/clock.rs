//! Time source used by the rate governor and retry loop.
//!
//! Production code uses [`SystemClock`]; tests inject a [`SimulatedClock`]
//! whose `sleep` advances virtual time instantly.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock reads and blocking sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Real clock backed by `chrono::Utc` and `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual clock: `sleep` advances `now` and records the requested duration.
#[derive(Debug)]
pub struct SimulatedClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move virtual time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
    }

    /// Every non-zero sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of all recorded sleeps
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
    }
}

/// Convert a signed chrono interval to a std duration, clamping negatives to zero
pub fn until(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_sleep_advances_time() {
        let clock = SimulatedClock::default();
        let start = clock.now();
        clock.sleep(Duration::from_secs(5));
        clock.sleep(Duration::ZERO);
        assert_eq!(clock.now() - start, chrono::Duration::seconds(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn advance_does_not_record_sleep() {
        let clock = SimulatedClock::default();
        clock.advance(Duration::from_secs(10));
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.now().timestamp(), 10);
    }

    #[test]
    fn until_clamps_past_to_zero() {
        let a = DateTime::from_timestamp(100, 0).unwrap();
        let b = DateTime::from_timestamp(40, 0).unwrap();
        assert_eq!(until(a, b), Duration::ZERO);
        assert_eq!(until(b, a), Duration::from_secs(60));
    }
}
