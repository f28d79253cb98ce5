use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Local, SecondsFormat, Utc};

/// Timestamp-based id generator that never hands out the same id twice.
///
/// Ids are the current wall-clock time in milliseconds unless that would not
/// exceed the last issued (or observed) id, in which case the last id plus
/// one is used.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Record an id that already exists so it is never issued again.
    pub fn observe(&self, id: i64) {
        self.last.fetch_max(id, Ordering::Relaxed);
    }
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Local calendar date and wall-clock time for display.
pub fn local_date_time() -> (String, String) {
    let now = Local::now();
    (
        now.format("%Y-%m-%d").to_string(),
        now.format("%H:%M:%S").to_string(),
    )
}

/// Current UTC date, used in backup file names.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
