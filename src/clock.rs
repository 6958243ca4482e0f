//! Wall-clock abstraction.
//!
//! Everything that stamps records or decides whether a scheduled job is due
//! reads time through [`Clock`], so the scheduler can be driven by a
//! [`ManualClock`] instead of the system time.

use std::sync::{Arc, Mutex};

use jiff::{SignedDuration, Timestamp};

/// Source of the current instant
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Reads the operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: Timestamp) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    /// Moves the clock forward by `seconds` (backwards if negative).
    pub fn advance_secs(&self, seconds: i64) {
        if let Ok(mut now) = self.now.lock()
            && let Ok(next) = now.checked_add(SignedDuration::from_secs(seconds))
        {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Shared clock handle passed to the services
pub type SharedClock = Arc<dyn Clock>;
