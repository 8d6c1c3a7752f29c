//! Error Types for the Delivery Path
//!
//! ## Design Philosophy
//!
//! Errors here follow the same rules as the rest of the core:
//!
//! 1. **Small and Copy**: every variant is a few words of inline data, no
//!    `String`, only `&'static str` reasons. Errors are returned from the
//!    scheduler tick and may sit in a `TickReport` until logged.
//!
//! 2. **Nothing is fatal**: a failed delivery is not an error at all (it is an
//!    outcome code and the event stays buffered). The types below cover the
//!    conditions the caller has to *know* about, and each one is retryable on
//!    the next cycle.
//!
//! ## Error Taxonomy
//!
//! | Condition                         | Type                                   |
//! |-----------------------------------|----------------------------------------|
//! | Event field does not fit          | [`EventError`]                         |
//! | Measurement value cannot be sent  | [`PayloadError`]                       |
//! | Spill file cannot be written/read | [`StoreError`]                         |
//! | Producer handed a bad batch       | [`DeliveryError::MalformedBatch`]      |
//! | Outcome code outside every class  | [`ConnectivityError::UnexpectedOutcome`] |
//! | Subscriber table exhausted        | [`NotifyError`]                        |
//! | Config rejected                   | [`ConfigError`]                        |
//!
//! ## Example
//!
//! ```rust
//! use fieldlink_core::{DeliveryError, StoreError};
//!
//! fn describe(err: &DeliveryError) -> &'static str {
//!     match err {
//!         DeliveryError::MalformedBatch { .. } => "producer bug, batch dropped",
//!         DeliveryError::Store(StoreError::Io { .. }) => "SD card fault, data kept in RAM",
//!         DeliveryError::Store(_) => "spill file problem, retry next cycle",
//!     }
//! }
//! ```

use core::fmt;

use thiserror_no_std::Error;

use crate::events::{EventKind, StatusCode};

/// Result type for event construction
pub type EventResult<T> = Result<T, EventError>;

/// Result type for payload formatting
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Result type for overflow store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Result type for link supervision
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Result type for subscriber registration
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Result type for configuration loading and validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Event fields are fixed capacity; oversized text is rejected, never cut
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    /// Payload longer than the event can hold
    #[error("Payload of {len} bytes exceeds capacity {max}")]
    PayloadTooLong {
        /// Length of the rejected payload
        len: usize,
        /// Payload capacity
        max: usize,
    },

    /// Timestamp longer than the event can hold
    #[error("Timestamp of {len} bytes exceeds capacity {max}")]
    TimestampTooLong {
        /// Length of the rejected timestamp
        len: usize,
        /// Timestamp capacity
        max: usize,
    },
}

/// Measurement payload formatting errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// Formatted payload would not fit in an event
    #[error("Payload exceeds {max} bytes")]
    Overflow {
        /// Payload capacity
        max: usize,
    },

    /// NaN or infinite value
    #[error("Invalid value: not a finite number")]
    InvalidValue,

    /// Timestamp does not fit in an event
    #[error("Event rejected: {0}")]
    Event(EventError),
}

impl From<EventError> for PayloadError {
    fn from(err: EventError) -> Self {
        PayloadError::Event(err)
    }
}

/// Storage operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Creating the spill directory or a spill file
    Create,
    /// Opening a spill file
    Open,
    /// Writing or flushing a spill file
    Write,
    /// Reading a spill file
    Read,
    /// Deleting a spill file
    Remove,
    /// Listing the spill directory
    List,
    /// Setting an unreadable spill aside
    Quarantine,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Create => "create",
            StoreOp::Open => "open",
            StoreOp::Write => "write",
            StoreOp::Read => "read",
            StoreOp::Remove => "remove",
            StoreOp::List => "list",
            StoreOp::Quarantine => "quarantine",
        };
        f.write_str(name)
    }
}

/// Overflow store failures
///
/// The in-memory copy of the data is never dropped because of one of these;
/// the caller keeps the events buffered and retries next cycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage refused the operation
    #[error("Storage {op} failed")]
    Io {
        /// Operation that failed
        op: StoreOp,
    },

    /// No spill stored under this key
    #[error("Spill {key} not found")]
    NotFound {
        /// Unix timestamp key of the missing spill
        key: u64,
    },

    /// Spill line could not be decoded
    #[error("Malformed spill record: {reason}")]
    Format {
        /// What was wrong with the line
        reason: &'static str,
    },

    /// Spill holds more events than the caller's batch
    #[error("Spill holds more than {capacity} events")]
    BatchTooLarge {
        /// Size of the batch the caller offered
        capacity: usize,
    },

    /// Store has no room for another spill
    #[error("Overflow store full")]
    Full,

    /// Every key from the requested one up to `u64::MAX` is taken
    #[error("No free spill key from {from}")]
    KeysExhausted {
        /// Key the store was asked to use
        from: u64,
    },
}

/// Delivery path errors surfaced to producers and the scheduler
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// First event of a producer batch was not a measurement
    #[error("Malformed batch: first event is {kind:?}, expected Measurement")]
    MalformedBatch {
        /// Kind of the offending first event
        kind: EventKind,
    },

    /// Spill or replay hit a storage failure
    #[error("Overflow store: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DeliveryError {
    fn from(err: StoreError) -> Self {
        DeliveryError::Store(err)
    }
}

/// Link supervision errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// Last connection outcome belongs to no known class
    ///
    /// Retryable: the state machine schedules a full reconnect for the next
    /// cycle before returning this.
    #[error("Unexpected connection outcome {code}")]
    UnexpectedOutcome {
        /// The unclassified code
        code: StatusCode,
    },
}

/// Subscriber registration errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// Subscriber table is full
    #[error("Subscriber table full ({capacity} entries)")]
    Full {
        /// Table capacity
        capacity: usize,
    },
}

/// Configuration errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value the device cannot run with
    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// Constraint that was violated
        reason: &'static str,
    },

    /// Config text is not valid JSON for the schema
    #[error("Config parse error at line {line}, column {column}")]
    Parse {
        /// 1-based line of the error
        line: usize,
        /// 1-based column of the error
        column: usize,
    },

    /// Config file could not be read
    #[error("Config file could not be read")]
    Io,
}

#[cfg(feature = "defmt")]
impl defmt::Format for StoreError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Io { .. } => defmt::write!(fmt, "Storage I/O failed"),
            Self::NotFound { key } => defmt::write!(fmt, "Spill {} not found", key),
            Self::Format { reason } => defmt::write!(fmt, "Malformed spill: {}", reason),
            Self::BatchTooLarge { capacity } => {
                defmt::write!(fmt, "Spill exceeds {} events", capacity)
            }
            Self::Full => defmt::write!(fmt, "Overflow store full"),
            Self::KeysExhausted { from } => defmt::write!(fmt, "No free spill key from {}", from),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeliveryError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::MalformedBatch { .. } => defmt::write!(fmt, "Malformed batch"),
            Self::Store(err) => defmt::write!(fmt, "Overflow store: {}", err),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectivityError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::UnexpectedOutcome { code } => {
                defmt::write!(fmt, "Unexpected connection outcome {}", code.as_u16())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_into_delivery_error() {
        let err: DeliveryError = StoreError::Io { op: StoreOp::Write }.into();
        assert_eq!(err, DeliveryError::Store(StoreError::Io { op: StoreOp::Write }));
    }

    #[cfg(feature = "std")]
    #[test]
    fn messages_name_the_failure() {
        let err = StoreError::Io { op: StoreOp::Remove };
        assert_eq!(err.to_string(), "Storage remove failed");

        let err = ConnectivityError::UnexpectedOutcome { code: StatusCode(302) };
        assert_eq!(err.to_string(), "Unexpected connection outcome 302");

        let err = DeliveryError::MalformedBatch { kind: EventKind::Connection };
        assert!(err.to_string().contains("Connection"));
    }
}
