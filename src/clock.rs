use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use parking_lot::Mutex;

/// Time source for every component that needs "now".
///
/// Timestamps are unix epoch milliseconds; `utc_offset_secs` carries the
/// device-local timezone so hour-of-day and date derivations stay testable.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    fn utc_offset_secs(&self) -> i32 {
        0
    }

    /// Local wall-clock view of an arbitrary timestamp.
    fn local_datetime(&self, ts_ms: i64) -> DateTime<FixedOffset> {
        let offset =
            FixedOffset::east_opt(self.utc_offset_secs()).unwrap_or_else(|| Utc.fix());
        let utc =
            DateTime::<Utc>::from_timestamp_millis(ts_ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        utc.with_timezone(&offset)
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Production clock backed by chrono.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn utc_offset_secs(&self) -> i32 {
        chrono::Local::now().offset().local_minus_utc()
    }
}

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

/// Settable clock for tests.
pub struct ManualClock {
    now_ms: Mutex<i64>,
    offset_secs: i32,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Mutex::new(now_ms),
            offset_secs: 0,
        }
    }

    pub fn with_offset(now_ms: i64, offset_secs: i32) -> Self {
        Self {
            now_ms: Mutex::new(now_ms),
            offset_secs,
        }
    }

    pub fn set(&self, now_ms: i64) {
        *self.now_ms.lock() = now_ms;
    }

    pub fn advance(&self, delta_ms: i64) {
        *self.now_ms.lock() += delta_ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        *self.now_ms.lock()
    }

    fn utc_offset_secs(&self) -> i32 {
        self.offset_secs
    }
}
