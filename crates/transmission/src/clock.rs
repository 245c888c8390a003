// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time source used to measure network exchanges.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Supplies the current instant. Substitute [`SteppingClock`] for deterministic timings.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;

    /// Time elapsed since `start`, saturating at zero.
    fn elapsed(&self, start: Instant) -> Duration {
        self.now().saturating_duration_since(start)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that moves forward by a fixed step every time it is read.
///
/// Two consecutive readings are always exactly `step` apart, so a request
/// timed with `now()`/`elapsed()` reports a duration of `step`.
#[derive(Debug)]
pub struct SteppingClock {
    origin: Instant,
    step: Duration,
    readings: AtomicU32,
}

impl SteppingClock {
    #[must_use]
    pub fn new(step: Duration) -> Self {
        SteppingClock {
            origin: Instant::now(),
            step,
            readings: AtomicU32::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let reading = self.readings.fetch_add(1, Ordering::SeqCst);
        self.origin + self.step * reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepping_clock_advances_per_reading() {
        let clock = SteppingClock::new(Duration::from_secs(10));
        let start = clock.now();
        assert_eq!(clock.elapsed(start), Duration::from_secs(10));
        assert_eq!(clock.elapsed(start), Duration::from_secs(20));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let start = clock.now();
        assert!(clock.now() >= start);
    }
}
