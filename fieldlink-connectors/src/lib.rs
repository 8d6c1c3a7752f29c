//! Network Collaborators for FieldLink Devices
//!
//! ## Overview
//!
//! `fieldlink-core` never touches the network itself; it talks to a server
//! through the [`DeliveryTransport`](fieldlink_core::DeliveryTransport) trait
//! and checks the internet through
//! [`ReachabilityProbe`](fieldlink_core::ReachabilityProbe). This crate holds
//! the `std` implementations used on gateways and in bench setups.
//!
//! | Collaborator      | Trait                | Backing                       |
//! |-------------------|----------------------|-------------------------------|
//! | [`HttpTransport`] | `DeliveryTransport`  | One `POST` per event (ureq)   |
//! | [`TcpProbe`]      | `ReachabilityProbe`  | TCP connect with a timeout    |
//!
//! ## Outcome Codes
//!
//! The transport reports the HTTP status of every request as the event's
//! outcome. When the request never reaches a server (DNS, connect, timeout)
//! the event and the rest of its batch get the 503 sentinel, which the core
//! treats as "link down": the events stay buffered and the next refresh does
//! a full reconnect.
//!
//! ## Example Usage
//!
//! ```no_run
//! use fieldlink_connectors::{HttpConfig, HttpTransport, TcpProbe};
//!
//! let config = HttpConfig::new("http://192.168.1.105:8000")
//!     .token("872408e3e07b09c35cd89b10eba29aae1e35bcfd")
//!     .timeout_ms(5000);
//! let transport = HttpTransport::new(config)?;
//! let probe = TcpProbe::default();
//! # Ok::<(), fieldlink_connectors::ConnectorError>(())
//! ```

#[cfg(feature = "http")]
pub mod http;
pub mod probe;

#[cfg(feature = "http")]
pub use http::{AuthMethod, HttpConfig, HttpError, HttpTransport};
pub use probe::TcpProbe;

use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[cfg(feature = "http")]
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Request counters common to all transports
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    /// Requests that got an HTTP response
    pub requests: u64,
    /// Responses with a success status
    pub accepted: u64,
    /// Responses with a 4xx status
    pub rejected: u64,
    /// Responses with a 5xx status
    pub server_errors: u64,
    /// Requests that never got a response
    pub transport_errors: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Last transport error message
    pub last_error: Option<String>,
}
