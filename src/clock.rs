//! Time sources

use std::fmt::Debug;

use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;

/// Source of "now" for lifecycle transitions and retention cutoffs.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
///
/// Used to simulate retention windows elapsing without waiting for them.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for a negative duration).
    ///
    /// # Errors
    ///
    /// Returns an error if the result falls outside the supported timestamp range.
    pub fn advance(&self, by: SignedDuration) -> Result<Timestamp, jiff::Error> {
        let mut now = self.now.lock();

        *now = now.checked_add(by)?;

        Ok(*now)
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
