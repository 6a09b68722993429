//! Wall clock seam. Every "now" the desk uses comes from here.

use crate::types::{from_millis, to_millis, Timestamp};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub trait Clock: Send {
    fn now(&self) -> Timestamp;
}

/// Real UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
/// Clones share the same instant, so a test can keep a handle
/// while the engine owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(to_millis(start))),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(to_millis(at), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clones_share_one_instant() {
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let handle = clock.clone();

        handle.advance(Duration::minutes(90));
        assert_eq!(clock.now(), t0 + Duration::minutes(90));

        clock.set(t0);
        assert_eq!(handle.now(), t0);
    }
}
