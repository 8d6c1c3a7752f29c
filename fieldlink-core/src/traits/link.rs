//! Wireless Link Abstractions
//!
//! [`Link`] is the radio: tear down, start association, re-associate, and a
//! non-blocking poll that reports whether association completed. The poll
//! follows the `nb` convention used by embedded-hal drivers:
//!
//! | Poll result                    | Meaning                              |
//! |--------------------------------|--------------------------------------|
//! | `Ok(())`                       | Associated, link usable              |
//! | `Err(nb::Error::WouldBlock)`   | Still associating, poll again later  |
//! | `Err(nb::Error::Other(e))`     | Attempt failed, give up this attempt |
//!
//! [`ReachabilityProbe`] checks whether the internet is actually reachable
//! through an associated link (captive portals and dead uplinks associate
//! fine).

/// Wireless association handle
pub trait Link {
    /// Driver error
    type Error: core::fmt::Debug;

    /// Tear the link down; idempotent
    fn disconnect(&mut self);

    /// Start a fresh association with stored credentials
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Re-associate without re-initialising the radio
    fn reconnect(&mut self) -> Result<(), Self::Error>;

    /// Check association progress
    fn poll_associated(&mut self) -> nb::Result<(), Self::Error>;
}

impl<L: Link + ?Sized> Link for &mut L {
    type Error = L::Error;

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        (**self).begin()
    }

    fn reconnect(&mut self) -> Result<(), Self::Error> {
        (**self).reconnect()
    }

    fn poll_associated(&mut self) -> nb::Result<(), Self::Error> {
        (**self).poll_associated()
    }
}

/// Reachability check against a `host:port` endpoint
pub trait ReachabilityProbe {
    /// True when a connection to `endpoint` could be opened
    fn probe(&mut self, endpoint: &str) -> bool;
}

impl<P: ReachabilityProbe + ?Sized> ReachabilityProbe for &mut P {
    fn probe(&mut self, endpoint: &str) -> bool {
        (**self).probe(endpoint)
    }
}
