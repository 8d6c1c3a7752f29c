//! Store-and-forward delivery core for FieldLink devices
//!
//! Buffers sensor events on a field device and gets them to the server
//! across link outages and server failures.
//!
//! Key constraints:
//! - Runs without an allocator (`no_std` with default features off)
//! - Fixed-size buffers everywhere; capacities are const generics
//! - An event is only dropped when the overflow store fails while the ring
//!   buffer is full, and that drop is counted
//!
//! ```
//! use fieldlink_core::{Event, RingBuffer, StatusCode};
//!
//! let mut buffer = RingBuffer::<6>::new();
//! let event = Event::measurement("2024-05-01T10:00:00 -05:00", "[]").unwrap();
//! assert!(buffer.append(event).is_none());
//!
//! // Server accepted it
//! buffer.reconcile(&[StatusCode::CREATED]);
//! assert!(buffer.is_empty());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod buffer;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod delivery;
pub mod device;
pub mod errors;
pub mod events;
pub mod notify;
pub mod payload;
pub mod store;
pub mod time;
pub mod traits;

// Public API
pub use buffer::RingBuffer;
pub use config::{ConnectivityConfig, DeliveryConfig, DeviceConfig};
pub use connectivity::{ConnectivityStateMachine, LinkState, ReconnectMode};
pub use delivery::{DeliveryManager, DeliveryReport, ReplayReport, SpillReport};
pub use device::{FieldDevice, TickReport};
pub use errors::{
    ConfigError, ConnectivityError, DeliveryError, EventError, NotifyError, PayloadError,
    StoreError, StoreOp,
};
pub use events::{Event, EventKind, OutcomeClass, StatusCode};
pub use notify::{ConnectionRecorder, ReplayTrigger, Subscriber, SubscriberList};
pub use payload::PayloadBuilder;
pub use store::{MemoryStore, OverflowStore, SpillKey};
#[cfg(feature = "std")]
pub use store::DirStore;
pub use traits::{Delay, DeliveryTransport, Link, ReachabilityProbe, TimeSource};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
