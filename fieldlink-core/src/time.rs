//! Time handling for field devices
//!
//! Two kinds of time meet in the delivery path:
//! - Clock time from a [`TimeSource`] (milliseconds), used when an event has
//!   no usable timestamp of its own
//! - Event timestamps as text (`YYYY-MM-DDThh:mm:ss +hh:mm`), produced by the
//!   RTC/NTP layer and converted to unix seconds to name spill files
//!
//! Calendar math is delegated to `chrono`.

use chrono::NaiveDate;

pub use crate::traits::time::{Delay, TimeSource};

/// Timestamp in milliseconds since epoch (or device boot for monotonic)
pub type Timestamp = u64;

/// System time source (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Blocking delay backed by `std::thread::sleep`
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

#[cfg(feature = "std")]
impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// Fixed time source for testing
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn advance(&mut self, ms: u64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Converts an event timestamp to unix seconds
///
/// Reads the `YYYY-MM-DDThh:mm:ss` part and treats it as UTC. A trailing
/// offset is ignored: spill keys only need to order files from the same
/// device, which never changes zone. Returns `None` for empty or malformed
/// text and for dates before 1970.
pub fn unix_seconds(timestamp: &str) -> Option<u64> {
    let bytes = timestamp.as_bytes();
    if bytes.len() < 19 {
        return None;
    }
    if bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' || bytes[13] != b':' || bytes[16] != b':' {
        return None;
    }

    let year = digits(timestamp.get(0..4)?)? as i32;
    let month = digits(timestamp.get(5..7)?)?;
    let day = digits(timestamp.get(8..10)?)?;
    let hour = digits(timestamp.get(11..13)?)?;
    let minute = digits(timestamp.get(14..16)?)?;
    let second = digits(timestamp.get(17..19)?)?;

    let secs = NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?
        .and_utc()
        .timestamp();

    u64::try_from(secs).ok()
}

fn digits(field: &str) -> Option<u32> {
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
