//! Time Source and Delay Abstractions for Embedded Systems
//!
//! `TimeSource` abstracts the clock across bare metal, RTOS and Linux builds;
//! `Delay` abstracts blocking waits so link supervision can be tested without
//! sleeping.
//!
//! ## Common Implementations
//!
//! - `SystemTime`: Wall clock time (may jump due to NTP)
//! - `FixedTime`: Controllable time for testing
//! - `ThreadDelay`: `std::thread::sleep`

use crate::time::Timestamp;

/// Source of time for the system
///
/// The delivery path only reads the clock to name a spill file when none of
/// the spilled events carries a parsable timestamp, so a monotonic source
/// works too; files are then ordered by uptime instead of date.
///
/// ## Example Implementation
///
/// ```rust
/// use fieldlink_core::traits::TimeSource;
/// use fieldlink_core::time::Timestamp;
///
/// struct RtcTimeSource {
///     // ... RTC peripheral handle
/// }
///
/// impl TimeSource for RtcTimeSource {
///     fn now(&self) -> Timestamp {
///         // Read the RTC and convert to milliseconds since epoch
///         0 // placeholder
///     }
///
///     fn is_wall_clock(&self) -> bool {
///         true
///     }
///
///     fn precision_ms(&self) -> u32 {
///         1000 // RTC ticks once per second
///     }
/// }
/// ```
pub trait TimeSource: Send {
    /// Get current timestamp in milliseconds
    ///
    /// The epoch depends on the implementation:
    /// - Monotonic sources: typically milliseconds since boot
    /// - Wall clock sources: milliseconds since Unix epoch
    /// - Test sources: arbitrary starting point
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;

    /// Get precision in milliseconds
    fn precision_ms(&self) -> u32;
}

impl<T: TimeSource + Sync> TimeSource for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn is_wall_clock(&self) -> bool {
        (**self).is_wall_clock()
    }

    fn precision_ms(&self) -> u32 {
        (**self).precision_ms()
    }
}

/// Blocking millisecond delay
///
/// Link supervision waits between association polls and before a
/// lightweight reconnect. On the device this is a busy-wait or an RTOS
/// sleep; tests record the requested durations instead.
pub trait Delay {
    /// Block for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}
