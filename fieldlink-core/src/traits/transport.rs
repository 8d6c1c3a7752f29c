//! Delivery Transport Abstraction

use crate::events::{Event, StatusCode};

/// Submits events to the collection endpoint
///
/// One call per batch. The transport writes exactly one outcome per event
/// into `outcomes`, same order, and never fails as a whole: a request that
/// could not be made at all is reported as
/// [`StatusCode::SERVICE_UNAVAILABLE`] for every event it covers.
///
/// `outcomes` is pre-filled with the sentinel and always has the same length
/// as `events`.
pub trait DeliveryTransport {
    fn submit_batch(&mut self, events: &[Event], outcomes: &mut [StatusCode]);
}

impl<T: DeliveryTransport + ?Sized> DeliveryTransport for &mut T {
    fn submit_batch(&mut self, events: &[Event], outcomes: &mut [StatusCode]) {
        (**self).submit_batch(events, outcomes)
    }
}
