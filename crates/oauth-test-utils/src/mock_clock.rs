//! Settable clock for token expiry tests.

use crate::fixtures::epoch;
use chrono::{DateTime, Duration, Utc};
use oauth_client::Clock;
use std::sync::{Arc, Mutex};

/// Clock whose time only moves when the test moves it.
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the code under test.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Create a clock frozen `secs` seconds after [`epoch`].
    #[must_use]
    pub fn at_offset(secs: i64) -> Self {
        Self::new(epoch() + Duration::seconds(secs))
    }

    /// Jump to `secs` seconds after [`epoch`].
    pub fn set_offset(&self, secs: i64) {
        self.set(epoch() + Duration::seconds(secs));
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    /// Move forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(epoch())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::at_offset(0);
        let handle = clock.clone();

        handle.advance_secs(30);
        assert_eq!(clock.now(), epoch() + Duration::seconds(30));

        clock.set_offset(5);
        assert_eq!(handle.now(), epoch() + Duration::seconds(5));
    }
}
