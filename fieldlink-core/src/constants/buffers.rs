//! Buffer Sizes and Memory Constraints
//!
//! Every in-memory structure in FieldLink is fixed size. The values below are
//! the firmware defaults for an ESP32-class logger with an SD card; the ring
//! buffer capacity is a const generic so boards with more RAM can raise it.

// ===== RING BUFFER =====

/// Measurement events a producer may hand over in one cycle.
///
/// One event per sensor adapter (temperature/humidity, light, soil).
/// Larger batches are truncated to this size with a warning.
pub const MAX_MEASUREMENTS: usize = 3;

/// Extra ring slots beyond one producer cycle.
///
/// Gives the link one full cycle of slack before undelivered events have
/// to be spilled to the overflow store.
pub const MAX_EXCESS_EVENTS: usize = 3;

/// Ring buffer capacity used by the firmware build.
pub const BUFFER_CAPACITY: usize = MAX_MEASUREMENTS + MAX_EXCESS_EVENTS;

// ===== OVERFLOW STORE =====

/// Events written to a single spill file.
///
/// Kept small so that reloading a file for replay fits in the same
/// fixed-size batch the ring buffer uses.
pub const MAX_EVENTS_PER_FILE: usize = 3;

/// Upper bound on spills replayed in one scheduler tick.
pub const MAX_REPLAYS_PER_TICK: usize = 4;

// ===== EVENT FIELDS =====

/// Capacity of an event payload in bytes.
///
/// A four-variable measurement array with UUIDs and timestamps is ~650
/// bytes; 1 KiB leaves room for longer crop identifiers.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Capacity of an event timestamp (`YYYY-MM-DDThh:mm:ss +hh:mm` is 26).
pub const MAX_TIMESTAMP_LEN: usize = 32;

// ===== CONNECTIVITY =====

/// Reachability probe endpoints kept in the connectivity config.
pub const MAX_PROBE_ENDPOINTS: usize = 4;

/// Capacity of a single `host:port` probe endpoint.
pub const MAX_ENDPOINT_LEN: usize = 64;

/// Connection records kept by the diagnostics recorder.
pub const CONNECTION_HISTORY_LEN: usize = 8;

/// Subscribers a device can register for connection events.
pub const MAX_SUBSCRIBERS: usize = 4;

/// Capacity of the configured spill directory path.
pub const MAX_PATH_LEN: usize = 128;
