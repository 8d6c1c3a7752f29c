//! Shared doubles for integration tests
//!
//! - `FakeServer`: transport answering from a script of status codes
//! - `FakeLink` / `FakeProbe` / `RecordedDelay`: link supervision doubles
//! - `measurements`: producer batches with distinct payloads

#![allow(dead_code)]

use std::collections::VecDeque;

use fieldlink_core::{
    config::{ConnectivityConfig, DeliveryConfig, DeviceConfig},
    Delay, DeliveryTransport, Event, Link, PayloadBuilder, ReachabilityProbe, StatusCode,
};

pub const TIMESTAMP: &str = "2024-05-01T10:00:00 -05:00";

/// Transport answering from a script; once the script runs dry every event
/// gets `fallback`
pub struct FakeServer {
    pub script: VecDeque<StatusCode>,
    pub fallback: StatusCode,
    pub accepted: Vec<String>,
    pub calls: usize,
}

impl FakeServer {
    pub fn accepting() -> Self {
        Self::answering(StatusCode::CREATED)
    }

    pub fn answering(fallback: StatusCode) -> Self {
        Self {
            script: VecDeque::new(),
            fallback,
            accepted: Vec::new(),
            calls: 0,
        }
    }

    pub fn then(mut self, codes: &[u16]) -> Self {
        self.script.extend(codes.iter().copied().map(StatusCode));
        self
    }
}

impl DeliveryTransport for FakeServer {
    fn submit_batch(&mut self, events: &[Event], outcomes: &mut [StatusCode]) {
        self.calls += 1;
        for (event, slot) in events.iter().zip(outcomes.iter_mut()) {
            *slot = self.script.pop_front().unwrap_or(self.fallback);
            if slot.is_success() {
                self.accepted.push(event.payload().to_string());
            }
        }
    }
}

/// Link that associates on the first poll while `up`
#[derive(Default)]
pub struct FakeLink {
    pub up: bool,
    pub begins: usize,
    pub reconnects: usize,
    pub disconnects: usize,
}

impl FakeLink {
    pub fn up() -> Self {
        Self { up: true, ..Self::default() }
    }

    pub fn down() -> Self {
        Self::default()
    }
}

impl Link for FakeLink {
    type Error = ();

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    fn begin(&mut self) -> Result<(), ()> {
        self.begins += 1;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), ()> {
        self.reconnects += 1;
        Ok(())
    }

    fn poll_associated(&mut self) -> nb::Result<(), ()> {
        if self.up {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

pub struct FakeProbe {
    pub reachable: bool,
}

impl ReachabilityProbe for FakeProbe {
    fn probe(&mut self, _endpoint: &str) -> bool {
        self.reachable
    }
}

#[derive(Default)]
pub struct RecordedDelay {
    pub total_ms: u64,
}

impl Delay for RecordedDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += u64::from(ms);
    }
}

/// Small budgets so offline ticks stay cheap
pub fn test_config() -> DeviceConfig {
    DeviceConfig::default()
        .with_connectivity(ConnectivityConfig::new().with_attempt_budget(3))
        .with_delivery(DeliveryConfig::new())
}

pub fn measurement(seq: usize) -> Event {
    let mut batch = PayloadBuilder::new();
    batch
        .push("temperature", seq as f32, "maize", TIMESTAMP)
        .expect("payload fits");
    Event::measurement_batch(TIMESTAMP, batch).expect("valid measurement")
}

pub fn measurements(range: core::ops::Range<usize>) -> Vec<Event> {
    range.map(measurement).collect()
}
