//! Deterministic clock for tests.

use charter_types::{Clock, Timestamp, SECS_PER_DAY};
use std::sync::atomic::{AtomicU64, Ordering};

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to. Shareable across threads so the
/// async orchestrator can hold it behind an `Arc`.
#[derive(Debug)]
pub struct NullClock {
    current: AtomicU64,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_secs),
        }
    }

    /// Advance time by a number of seconds.
    pub fn advance(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: u64) {
        self.advance(days * SECS_PER_DAY);
    }

    /// Set the time to a specific value.
    pub fn set(&self, secs: u64) {
        self.current.store(secs, Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_when_told() {
        let clock = NullClock::new(1_000);
        assert_eq!(clock.now().as_secs(), 1_000);
        clock.advance(5);
        assert_eq!(clock.now().as_secs(), 1_005);
        clock.advance_days(1);
        assert_eq!(clock.now().as_secs(), 1_005 + SECS_PER_DAY);
        clock.set(7);
        assert_eq!(clock.now().as_secs(), 7);
    }
}
