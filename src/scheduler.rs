//! # Sample Scheduler
//!
//! Drift-free periodic deadline tracking for the acquisition loop.
//!
//! The scheduler never sleeps. The control loop polls [`Scheduler::due`] as
//! often as it likes and gets `true` at most once per elapsed period.
//!
//! ## Deadline advance
//!
//! On a due tick the next deadline moves forward by exactly one period from
//! the *previous deadline*, not from `now`. Lateness on one tick therefore
//! never shifts the deadlines after it.
//!
//! ## Missed periods
//!
//! When the loop polls so late that one or more whole periods have already
//! passed, those periods are dropped, not caught up: the deadline jumps
//! forward in whole periods and stays phase-aligned with the start time. The
//! monitor accepts losing samples over drifting its cadence. Dropped periods
//! are counted in [`Scheduler::missed_periods`].
//!
//! ```
//! use std::time::Duration;
//! use volt_monitor::scheduler::Scheduler;
//!
//! let mut scheduler = Scheduler::from_rate(100, Duration::ZERO);
//! assert!(scheduler.due(Duration::ZERO));
//! assert!(!scheduler.due(Duration::from_millis(9)));
//! assert!(scheduler.due(Duration::from_millis(10)));
//! ```

use std::time::{Duration, Instant};

/// Source of monotonic time, measured from an arbitrary fixed start.
pub trait Clock {
    /// Elapsed time since the clock's start.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Starts a clock at the current instant.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Converts a sampling rate in Hz to a sample period.
///
/// Uses nanosecond resolution so that rates like 240 Hz (≈4.167 ms) keep
/// their fractional part.
///
/// # Panics
///
/// Never; a zero rate yields a zero period (config validation rejects it).
#[must_use]
pub fn period_from_rate(rate_hz: u32) -> Duration {
    if rate_hz == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(1_000_000_000 / u64::from(rate_hz))
}

/// Periodic deadline tracker.
#[derive(Debug, Clone)]
pub struct Scheduler {
    period: Duration,
    next_deadline: Duration,
    fired: u64,
    missed: u64,
}

impl Scheduler {
    /// Creates a scheduler whose first deadline is `start`.
    #[must_use]
    pub fn new(period: Duration, start: Duration) -> Self {
        Self {
            period,
            next_deadline: start,
            fired: 0,
            missed: 0,
        }
    }

    /// Creates a scheduler for a sampling rate in Hz.
    #[must_use]
    pub fn from_rate(rate_hz: u32, start: Duration) -> Self {
        Self::new(period_from_rate(rate_hz), start)
    }

    /// Returns `true` if a sample is due at `now`.
    ///
    /// Advances the deadline by one period on a due tick, and skips any
    /// additional periods that have already fully elapsed.
    pub fn due(&mut self, now: Duration) -> bool {
        if now < self.next_deadline {
            return false;
        }

        self.next_deadline += self.period;
        self.fired += 1;

        if self.period.is_zero() || now < self.next_deadline {
            return true;
        }

        // Polled late by at least one whole period: drop the elapsed ones.
        let period_ns = self.period.as_nanos();
        let skipped = (now - self.next_deadline).as_nanos() / period_ns + 1;
        let next_ns = self.next_deadline.as_nanos() + skipped * period_ns;
        self.next_deadline = Duration::from_nanos(u64::try_from(next_ns).unwrap_or(u64::MAX));
        self.missed = self
            .missed
            .saturating_add(u64::try_from(skipped).unwrap_or(u64::MAX));

        true
    }

    /// Sample period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Next deadline, measured on the same clock as `due`.
    #[must_use]
    pub fn next_deadline(&self) -> Duration {
        self.next_deadline
    }

    /// Number of due ticks reported so far.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Number of periods dropped because the loop polled too late.
    #[must_use]
    pub fn missed_periods(&self) -> u64 {
        self.missed
    }
}
