//! Protocol Clock
//!
//! Every time comparison in the engine (epoch windows, oracle staleness,
//! sequencer grace period) reads one injected `Clock`. Simulations and tests
//! use `SimClock` and move time explicitly; a live process uses
//! `SystemClock`.

use super::types::{Timestamp, SECONDS_PER_DAY};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait Clock: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> Timestamp;
}

/// Monotonic simulated clock.
///
/// # Determinism Contract
/// - `now()` never reads system time
/// - `advance_to()` only moves forward
#[derive(Debug)]
pub struct SimClock {
    current: AtomicU64,
}

impl SimClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: AtomicU64::new(start),
        }
    }

    /// Advance to an absolute time. Earlier targets are ignored.
    pub fn advance_to(&self, target: Timestamp) {
        self.current.fetch_max(target, Ordering::SeqCst);
    }

    pub fn advance_by(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: u64) {
        self.advance_by(days * SECONDS_PER_DAY);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.current.load(Ordering::SeqCst)
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp().max(0) as Timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_clock_only_moves_forward() {
        let clock = SimClock::new(1_000);
        clock.advance_by(50);
        assert_eq!(clock.now(), 1_050);
        clock.advance_to(900);
        assert_eq!(clock.now(), 1_050);
        clock.advance_to(2_000);
        assert_eq!(clock.now(), 2_000);
        clock.advance_days(1);
        assert_eq!(clock.now(), 2_000 + SECONDS_PER_DAY);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
