//! Source of "now" for freshness decisions.

use std::time::SystemTime;

/// Supplies the wall-clock time the cache compares expirations against.
///
/// HTTP dates are wall-clock instants, so this is a [`SystemTime`] rather
/// than a monotonic clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
