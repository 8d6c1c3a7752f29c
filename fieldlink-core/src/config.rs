//! Device Configuration
//!
//! Builder-style settings for the delivery manager and link supervision,
//! defaulting to the firmware constants in [`crate::constants`].
//!
//! On `std` builds a [`DeviceConfig`] can be loaded from JSON. Every field is
//! optional; missing ones keep their defaults:
//!
//! ```json
//! {
//!   "delivery": { "max_per_cycle": 3, "max_events_per_file": 3 },
//!   "connectivity": { "attempt_budget": 120, "probe_endpoints": ["example.com:80"] },
//!   "spill_dir": "/var/lib/fieldlink/spill"
//! }
//! ```
//!
//! Call [`DeviceConfig::validate`] with the ring buffer capacity before
//! handing the config to a device.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::buffers::{MAX_ENDPOINT_LEN, MAX_PATH_LEN, MAX_PROBE_ENDPOINTS};
use crate::constants::{
    CONNECT_ATTEMPT_BUDGET, CONNECT_POLL_INTERVAL_MS, DEFAULT_REPLAY_EVERY_TICKS,
    MAX_EVENTS_PER_FILE, MAX_MEASUREMENTS, MAX_REPLAYS_PER_TICK, RECONNECT_SETTLE_MS,
};
use crate::errors::{ConfigError, ConfigResult};

/// One `host:port` probe endpoint
pub type Endpoint = heapless::String<MAX_ENDPOINT_LEN>;

/// Default reachability probe targets
pub const DEFAULT_PROBE_ENDPOINTS: [&str; 3] = ["google.com:80", "facebook.com:80", "twitter.com:80"];

/// Delivery manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DeliveryConfig {
    /// Largest producer batch accepted per cycle; longer batches are truncated
    pub max_per_cycle: usize,
    /// Events written to one spill
    pub max_events_per_file: usize,
    /// Scheduler ticks between periodic spill replays while online
    pub replay_every_ticks: u32,
    /// Spills replayed back to back in one tick while each one clears
    pub max_replays_per_tick: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_per_cycle: MAX_MEASUREMENTS,
            max_events_per_file: MAX_EVENTS_PER_FILE,
            replay_every_ticks: DEFAULT_REPLAY_EVERY_TICKS,
            max_replays_per_tick: MAX_REPLAYS_PER_TICK,
        }
    }
}

impl DeliveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_per_cycle(mut self, n: usize) -> Self {
        self.max_per_cycle = n;
        self
    }

    pub fn with_max_events_per_file(mut self, n: usize) -> Self {
        self.max_events_per_file = n;
        self
    }

    pub fn with_replay_every_ticks(mut self, ticks: u32) -> Self {
        self.replay_every_ticks = ticks;
        self
    }

    pub fn with_max_replays_per_tick(mut self, n: usize) -> Self {
        self.max_replays_per_tick = n;
        self
    }

    /// True when `len` buffered events leave no room for a full producer cycle
    pub fn needs_spill(&self, len: usize, capacity: usize) -> bool {
        len + self.max_per_cycle > capacity
    }

    /// Check against a ring buffer of `capacity` events
    pub fn validate(&self, capacity: usize) -> ConfigResult<()> {
        if self.max_per_cycle == 0 {
            return Err(invalid("max_per_cycle", "must be at least 1"));
        }
        if self.max_per_cycle > capacity {
            return Err(invalid("max_per_cycle", "exceeds ring buffer capacity"));
        }
        if self.max_events_per_file == 0 {
            return Err(invalid("max_events_per_file", "must be at least 1"));
        }
        if self.max_events_per_file > capacity {
            return Err(invalid("max_events_per_file", "exceeds ring buffer capacity"));
        }
        if self.replay_every_ticks == 0 {
            return Err(invalid("replay_every_ticks", "must be at least 1"));
        }
        if !(1..=MAX_REPLAYS_PER_TICK).contains(&self.max_replays_per_tick) {
            return Err(invalid("max_replays_per_tick", "out of range"));
        }
        Ok(())
    }
}

/// Link supervision settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ConnectivityConfig {
    /// Association polls per connect attempt
    pub attempt_budget: u32,
    /// Delay between polls (ms)
    pub poll_interval_ms: u32,
    /// Delay between teardown and a lightweight reconnect (ms)
    pub settle_delay_ms: u32,
    /// `host:port` endpoints for the reachability probe; empty disables it
    pub probe_endpoints: heapless::Vec<Endpoint, MAX_PROBE_ENDPOINTS>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        let mut probe_endpoints = heapless::Vec::new();
        for endpoint in DEFAULT_PROBE_ENDPOINTS {
            let mut text = Endpoint::new();
            // Defaults are well within both capacities
            let _ = text.push_str(endpoint);
            let _ = probe_endpoints.push(text);
        }

        Self {
            attempt_budget: CONNECT_ATTEMPT_BUDGET,
            poll_interval_ms: CONNECT_POLL_INTERVAL_MS,
            settle_delay_ms: RECONNECT_SETTLE_MS,
            probe_endpoints,
        }
    }
}

impl ConnectivityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempt_budget(mut self, polls: u32) -> Self {
        self.attempt_budget = polls;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_settle_delay_ms(mut self, ms: u32) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Drop every probe endpoint (probing then always passes)
    pub fn without_probe_endpoints(mut self) -> Self {
        self.probe_endpoints.clear();
        self
    }

    /// Add a probe endpoint
    pub fn add_probe_endpoint(&mut self, endpoint: &str) -> ConfigResult<()> {
        let mut text = Endpoint::new();
        text.push_str(endpoint)
            .map_err(|_| invalid("probe_endpoints", "endpoint too long"))?;
        self.probe_endpoints
            .push(text)
            .map_err(|_| invalid("probe_endpoints", "too many endpoints"))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.attempt_budget == 0 {
            return Err(invalid("attempt_budget", "must be at least 1"));
        }
        if self.probe_endpoints.iter().any(|e| e.is_empty()) {
            return Err(invalid("probe_endpoints", "empty endpoint"));
        }
        Ok(())
    }
}

/// Everything a [`FieldDevice`](crate::device::FieldDevice) needs
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DeviceConfig {
    pub delivery: DeliveryConfig,
    pub connectivity: ConnectivityConfig,
    /// Spill directory for the file-backed overflow store
    pub spill_dir: heapless::String<MAX_PATH_LEN>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut spill_dir = heapless::String::new();
        let _ = spill_dir.push_str("spill");
        Self {
            delivery: DeliveryConfig::default(),
            connectivity: ConnectivityConfig::default(),
            spill_dir,
        }
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_connectivity(mut self, connectivity: ConnectivityConfig) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_spill_dir(mut self, dir: &str) -> ConfigResult<Self> {
        self.spill_dir.clear();
        self.spill_dir
            .push_str(dir)
            .map_err(|_| invalid("spill_dir", "path too long"))?;
        Ok(self)
    }

    /// Check every section against a ring buffer of `capacity` events
    pub fn validate(&self, capacity: usize) -> ConfigResult<()> {
        self.delivery.validate(capacity)?;
        self.connectivity.validate()?;
        if self.spill_dir.is_empty() {
            return Err(invalid("spill_dir", "must not be empty"));
        }
        Ok(())
    }

    /// Parse JSON overrides on top of the defaults
    #[cfg(feature = "std")]
    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse {
            line: err.line(),
            column: err.column(),
        })
    }

    /// Read and parse a JSON config file
    #[cfg(feature = "std")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::Io)?;
        Self::from_json_str(&text)
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BUFFER_CAPACITY;

    #[test]
    fn defaults_match_firmware() {
        let config = DeviceConfig::default();
        assert_eq!(config.delivery.max_per_cycle, 3);
        assert_eq!(config.delivery.max_events_per_file, 3);
        assert_eq!(config.connectivity.attempt_budget, 600);
        assert_eq!(config.connectivity.poll_interval_ms, 1000);
        assert_eq!(config.connectivity.probe_endpoints.len(), 3);
        assert_eq!(config.connectivity.probe_endpoints[0].as_str(), "google.com:80");
        assert_eq!(config.spill_dir.as_str(), "spill");
        assert!(config.validate(BUFFER_CAPACITY).is_ok());
    }

    #[test]
    fn spill_threshold_is_one_cycle_before_overflow() {
        let config = DeliveryConfig::default();
        assert!(!config.needs_spill(3, 6));
        assert!(config.needs_spill(4, 6));
        assert!(config.needs_spill(5, 6));
    }

    #[test]
    fn validation_rejects_impossible_values() {
        let config = DeliveryConfig::new().with_max_per_cycle(0);
        assert_eq!(
            config.validate(6),
            Err(ConfigError::InvalidValue { field: "max_per_cycle", reason: "must be at least 1" })
        );

        let config = DeliveryConfig::new().with_max_events_per_file(7);
        assert!(config.validate(6).is_err());

        let config = DeliveryConfig::new().with_max_replays_per_tick(MAX_REPLAYS_PER_TICK + 1);
        assert!(config.validate(6).is_err());

        let config = ConnectivityConfig::new().with_attempt_budget(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn probe_endpoints_are_bounded() {
        let mut config = ConnectivityConfig::new().without_probe_endpoints();
        for i in 0..MAX_PROBE_ENDPOINTS {
            config.add_probe_endpoint(&format!("host{}:80", i)).unwrap();
        }
        assert!(config.add_probe_endpoint("one-too-many:80").is_err());
        assert!(config.add_probe_endpoint(&"x".repeat(MAX_ENDPOINT_LEN + 1)).is_err());
    }

    #[cfg(feature = "std")]
    #[test]
    fn json_overrides_keep_other_defaults() {
        let config = DeviceConfig::from_json_str(
            r#"{
                "delivery": { "max_per_cycle": 2 },
                "connectivity": { "attempt_budget": 5, "probe_endpoints": ["10.0.0.1:80"] },
                "spill_dir": "/tmp/spill"
            }"#,
        )
        .unwrap();

        assert_eq!(config.delivery.max_per_cycle, 2);
        assert_eq!(config.delivery.max_events_per_file, MAX_EVENTS_PER_FILE);
        assert_eq!(config.connectivity.attempt_budget, 5);
        assert_eq!(config.connectivity.poll_interval_ms, CONNECT_POLL_INTERVAL_MS);
        assert_eq!(config.connectivity.probe_endpoints.len(), 1);
        assert_eq!(config.spill_dir.as_str(), "/tmp/spill");
    }

    #[cfg(feature = "std")]
    #[test]
    fn json_errors_carry_position() {
        let err = DeviceConfig::from_json_str("{\n  \"delivery\": 7\n}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[cfg(feature = "std")]
    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = DeviceConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err, ConfigError::Io);
    }
}
