//! TCP reachability probe
//!
//! An endpoint counts as reachable when a TCP connection to it can be
//! opened within the timeout. Endpoints are `host:port`; a bare host gets
//! the default port.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use fieldlink_core::ReachabilityProbe;

const DEFAULT_PORT: u16 = 80;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Reachability check by TCP connect
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
    default_port: u16,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            default_port: DEFAULT_PORT,
        }
    }
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Port used for endpoints given without one
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    fn address(&self, endpoint: &str) -> String {
        match endpoint.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => endpoint.to_string(),
            _ => format!("{}:{}", endpoint, self.default_port),
        }
    }
}

impl ReachabilityProbe for TcpProbe {
    fn probe(&mut self, endpoint: &str) -> bool {
        let address = self.address(endpoint);
        let addrs = match address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                log::debug!("Cannot resolve {}: {}", address, err);
                return false;
            }
        };

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(err) => log::debug!("Probe {} ({}) failed: {}", address, addr, err),
            }
        }
        false
    }
}
