//! Aligned sample scheduling
//!
//! Samples fire on wall-clock boundaries that are whole multiples of the
//! sample period. Every probe configured with the same period therefore
//! samples at the same instants regardless of when it started, which keeps
//! reports from different nodes comparable by timestamp.

use std::pin::Pin;

use chrono::Utc;
use tokio::time::{Instant, Sleep};

/// Period-aligned schedule for one probe instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSchedule {
    period_secs: i64,
}

impl SampleSchedule {
    pub fn new(period_secs: u32) -> Self {
        Self {
            period_secs: i64::from(period_secs.max(1)),
        }
    }

    pub fn period_secs(&self) -> i64 {
        self.period_secs
    }

    /// The next boundary strictly after `now` (both in epoch seconds):
    /// `now + period - now % period`.
    pub fn next_boundary(&self, now: i64) -> i64 {
        now + self.period_secs - now.rem_euclid(self.period_secs)
    }

    /// Arm a timer for the next boundary.
    ///
    /// Returns the boundary timestamp (epoch seconds) to stamp the resulting
    /// report with, and the sleep future that completes at that instant.
    pub fn arm(&self) -> (i64, Pin<Box<Sleep>>) {
        let now = Utc::now();
        let boundary = self.next_boundary(now.timestamp());

        let wait_ms = (boundary * 1000 - now.timestamp_millis()).max(0) as u64;
        let sleep = tokio::time::sleep_until(
            Instant::now() + std::time::Duration::from_millis(wait_ms),
        );

        (boundary, Box::pin(sleep))
    }
}
