//! Collaborator Traits for FieldLink
//!
//! The delivery core talks to hardware and the network only through the
//! traits in this module. Each one is implemented by a board support crate on
//! the device, by `fieldlink-connectors` on Linux gateways, and by scripted
//! mocks in tests.
//!
//! ## Module Organization
//!
//! - [`time`] - Clock and blocking delay
//! - [`link`] - Wireless association and reachability probing
//! - [`transport`] - Batch submission to the collection endpoint
//!
//! The overflow store trait lives next to its implementations in
//! [`crate::store`].
//!
//! ## Design Philosophy
//!
//! All collaborators are taken as generic parameters and owned by the device
//! (or borrowed with `&mut`), never as trait objects. Firmware builds
//! monomorphize the whole delivery path and nothing needs a heap.

pub mod link;
pub mod time;
pub mod transport;

pub use link::{Link, ReachabilityProbe};
pub use time::{Delay, TimeSource};
pub use transport::DeliveryTransport;
