//! Constants for FieldLink Core
//!
//! Firmware defaults grouped by domain:
//! - **Buffers**: ring, spill file and event field capacities
//! - **Time**: link supervision budgets and scheduler cadence
//!
//! Config structs take their defaults from here; nothing else in the crate
//! should carry a bare number.

/// Buffer sizes and memory constraints for embedded systems.
pub mod buffers;

/// Time-related constants for link supervision and scheduling.
pub mod time;

pub use buffers::{
    BUFFER_CAPACITY, MAX_EVENTS_PER_FILE, MAX_EXCESS_EVENTS, MAX_MEASUREMENTS,
    MAX_PAYLOAD_LEN, MAX_REPLAYS_PER_TICK, MAX_TIMESTAMP_LEN,
};

pub use time::{
    CONNECT_ATTEMPT_BUDGET, CONNECT_POLL_INTERVAL_MS, DEFAULT_REPLAY_EVERY_TICKS,
    HTTP_TIMEOUT_MS, RECONNECT_SETTLE_MS,
};
