//! Time Provider and Day-Boundary Abstractions
//!
//! The engine never computes "today" or local midnight on its own. A
//! [`TimeProvider`] supplies the current instant (so completion stamps and
//! ledger walks are deterministic under test), and day filtering consumes an
//! externally-defined [`DayWindow`]: the start/end-of-day convention belongs
//! to the calling presentation layer, not to this crate.
//!
//! # Examples
//!
//! ```rust
//! use goalgraph_core::models::time::{SystemTimeProvider, TimeProvider};
//! use chrono::Utc;
//!
//! let provider = SystemTimeProvider;
//! assert!(provider.now() <= Utc::now());
//! ```

use chrono::{DateTime, Utc};

/// Trait for providing current time
///
/// Enables deterministic testing of completion stamps and the history ledger
/// without thread sleeps.
pub trait TimeProvider: Send + Sync {
    /// Get the current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// System time provider using the actual system clock
///
/// This is the default implementation for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An externally-defined day boundary: the half-open-in-spirit instant pair
/// `[start, end]` the caller considers one calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether an instant falls inside this day (inclusive on both ends,
    /// matching the collaborator's start-of-day/end-of-day convention)
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Mock time provider for deterministic tests
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct MockTimeProvider {
    current_time: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

#[cfg(test)]
impl MockTimeProvider {
    /// Create a mock provider pinned to a specific instant
    pub fn with_time(time: DateTime<Utc>) -> Self {
        Self {
            current_time: std::sync::Arc::new(std::sync::Mutex::new(time)),
        }
    }

    /// Move the mock clock to a new instant
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.current_time.lock().unwrap() = time;
    }

    /// Advance the mock clock
    pub fn advance(&self, duration: chrono::Duration) {
        let mut current = self.current_time.lock().unwrap();
        *current += duration;
    }
}

#[cfg(test)]
impl TimeProvider for MockTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.current_time.lock().unwrap()
    }
}
