//! Event Types for the Delivery Path
//!
//! ## Overview
//!
//! Everything the device sends upstream is an [`Event`]: either a batch of
//! measurements produced by a sensor adapter, or a record of a connectivity
//! outcome. The same type lives in the ring buffer, in spill files and on the
//! wire, so it carries exactly four fields:
//!
//! ```text
//! Event
//! ├── kind:      Connection | Measurement   (Unassigned for an empty slot)
//! ├── outcome:   HTTP-like status code       (503 = not attempted yet)
//! ├── timestamp: "YYYY-MM-DDThh:mm:ss +hh:mm" (may be empty)
//! └── payload:   JSON-like array of measurement objects, or an error text
//! ```
//!
//! ### Memory Model
//!
//! Text fields are `heapless::String`s so an event has a fixed size and the
//! ring buffer never allocates:
//!
//! ```text
//! Event size (approximate):
//! ├── payload:   1024 bytes + length
//! ├── timestamp:   32 bytes + length
//! ├── outcome:      2 bytes
//! └── kind:         1 byte
//! Total: ~1.1 KB
//! ```
//!
//! ### The Empty Event
//!
//! `Event::default()` is the canonical "slot not in use" marker. Delivered
//! events in a reloaded spill batch are reset to it, and spill files never
//! contain it.

use core::fmt::{self, Write as _};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_PAYLOAD_LEN, MAX_TIMESTAMP_LEN};
use crate::errors::{EventError, EventResult};

/// Fixed-capacity payload text
pub type Payload = heapless::String<MAX_PAYLOAD_LEN>;

/// Fixed-capacity timestamp text
pub type EventTimestamp = heapless::String<MAX_TIMESTAMP_LEN>;

/// What an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum EventKind {
    /// Empty slot marker, never delivered or persisted
    #[default]
    Unassigned = 0,
    /// Connectivity outcome
    Connection = 1,
    /// Sensor measurement batch
    Measurement = 2,
}

impl EventKind {
    /// Single-character tag used in spill files
    pub const fn tag(&self) -> char {
        match self {
            EventKind::Unassigned => '-',
            EventKind::Connection => 'C',
            EventKind::Measurement => 'M',
        }
    }

    /// Parse a spill file tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "-" => Some(EventKind::Unassigned),
            "C" => Some(EventKind::Connection),
            "M" => Some(EventKind::Measurement),
            _ => None,
        }
    }
}

/// How a single outcome code is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    /// Server accepted the event (200, 201)
    Delivered,
    /// Server refused the event (4xx); kept for retry
    Rejected,
    /// Server-side failure (5xx other than 503)
    ServerError,
    /// Not attempted or endpoint unreachable (503)
    Unavailable,
    /// Anything else
    Unrecognized(u16),
}

/// HTTP-like outcome code of a delivery or connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// 200 OK
    pub const OK: Self = Self(200);
    /// 201 Created
    pub const CREATED: Self = Self(201);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    /// 503, doubling as the "not attempted / unreachable" sentinel
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// Raw code
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// True for the two codes that confirm delivery
    pub const fn is_success(&self) -> bool {
        self.0 == Self::OK.0 || self.0 == Self::CREATED.0
    }

    /// True for 5xx codes, the sentinel included
    pub const fn is_server_error(&self) -> bool {
        self.0 >= 500
    }

    /// Classify the code
    pub const fn class(&self) -> OutcomeClass {
        match self.0 {
            200 | 201 => OutcomeClass::Delivered,
            503 => OutcomeClass::Unavailable,
            400..=499 => OutcomeClass::Rejected,
            500..=599 => OutcomeClass::ServerError,
            other => OutcomeClass::Unrecognized(other),
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::SERVICE_UNAVAILABLE
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A measurement batch or connectivity record
///
/// Equality compares all four fields. Construct with [`Event::measurement`],
/// [`Event::connection`] or [`Event::new`]; text that does not fit is
/// rejected with an [`EventError`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    kind: EventKind,
    outcome: StatusCode,
    timestamp: EventTimestamp,
    payload: Payload,
}

impl Event {
    /// Build an event from raw parts
    pub fn new(
        kind: EventKind,
        outcome: StatusCode,
        timestamp: &str,
        payload: &str,
    ) -> EventResult<Self> {
        let mut ts = EventTimestamp::new();
        ts.push_str(timestamp).map_err(|_| EventError::TimestampTooLong {
            len: timestamp.len(),
            max: MAX_TIMESTAMP_LEN,
        })?;

        let mut body = Payload::new();
        body.push_str(payload).map_err(|_| EventError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        })?;

        Ok(Self {
            kind,
            outcome,
            timestamp: ts,
            payload: body,
        })
    }

    /// Measurement batch as produced by a sensor adapter
    pub fn measurement(timestamp: &str, payload: &str) -> EventResult<Self> {
        Self::new(EventKind::Measurement, StatusCode::OK, timestamp, payload)
    }

    /// Connectivity record with an `{"error": ...}` description
    ///
    /// Descriptions are short static strings; anything past the payload
    /// capacity would be dropped, which no caller in the crate comes near.
    pub fn connection(outcome: StatusCode, description: &str) -> Self {
        let mut payload = Payload::new();
        let _ = write!(payload, "{{\"error\":\"{}\"}}", description);
        Self {
            kind: EventKind::Connection,
            outcome,
            timestamp: EventTimestamp::new(),
            payload,
        }
    }

    /// Event kind
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Last known outcome code
    pub fn outcome(&self) -> StatusCode {
        self.outcome
    }

    /// Timestamp text (may be empty)
    pub fn timestamp(&self) -> &str {
        self.timestamp.as_str()
    }

    /// Payload text
    pub fn payload(&self) -> &str {
        self.payload.as_str()
    }

    /// True for measurement batches
    pub fn is_measurement(&self) -> bool {
        self.kind == EventKind::Measurement
    }

    /// True for the "slot not in use" marker
    pub fn is_empty(&self) -> bool {
        self.kind == EventKind::Unassigned
            && self.outcome == StatusCode::default()
            && self.timestamp.is_empty()
            && self.payload.is_empty()
    }

    /// Record a new outcome code
    pub fn set_outcome(&mut self, outcome: StatusCode) {
        self.outcome = outcome;
    }

    /// Reset to the empty event
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
