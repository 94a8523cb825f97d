//! Time source port.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Everything that compares against `window.t_end`, dispute windows or job
/// schedules reads time through this trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
