use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Generator of placeholder ids for records the server has not seen yet.
///
/// Ids are the negated microsecond clock, forced strictly decreasing so two
/// records created in the same microsecond never collide. Negative ids can
/// never clash with server ids.
#[derive(Debug)]
pub struct SyntheticIds {
    last: AtomicI64,
}

impl Default for SyntheticIds {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticIds {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Continues below `lowest`, an id already in use.
    pub fn below(lowest: i64) -> Self {
        Self {
            last: AtomicI64::new(lowest.min(0)),
        }
    }

    pub fn next(&self) -> i64 {
        self.next_at(Utc::now())
    }

    pub fn next_at(&self, now: DateTime<Utc>) -> i64 {
        let candidate = -now.timestamp_micros().max(1);
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.min(last - 1))
            })
            .unwrap_or_else(|last| last);
        candidate.min(previous - 1)
    }
}
