//! Wall-clock abstraction.
//!
//! Revision epochs and gc horizons depend on the current time; routing
//! them through [`Clock`] keeps that dependency injectable, with
//! [`MockClock`] standing in for the system clock under test.

use std::ops::Add;
use std::{
    sync::RwLock,
    time::{Duration, SystemTime},
};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Microseconds since the Unix epoch, the resolution of revision
    /// epochs.
    fn now_micros(&self) -> u64 {
        self.now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros() as u64
    }
}

/// The real wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap()
    }
}

impl MockClock {
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    pub fn new() -> Self {
        Self::with_time(SystemTime::now())
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap();
        *now = now.add(duration);
    }

    pub fn set_time(&self, time: SystemTime) {
        *self.now.write().unwrap() = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}
