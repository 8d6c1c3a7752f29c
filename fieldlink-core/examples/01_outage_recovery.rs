//! Outage Recovery Example
//!
//! Runs a field device through a simulated network outage and shows how
//! measurements move from the ring buffer to spill files and back to the
//! server once the link returns.
//!
//! ## What You'll Learn
//!
//! - Wiring a `FieldDevice` from its collaborators
//! - Building measurement payloads with `PayloadBuilder`
//! - Reading `TickReport`s and delivery statistics
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_outage_recovery
//! ```

use std::cell::Cell;
use std::rc::Rc;

use fieldlink_core::{
    config::{ConnectivityConfig, DeliveryConfig, DeviceConfig},
    constants::BUFFER_CAPACITY,
    time::FixedTime,
    Delay, DeliveryTransport, DirStore, Event, FieldDevice, Link, PayloadBuilder,
    ReachabilityProbe, StatusCode,
};

/// Shared on/off switch for the simulated network
type Network = Rc<Cell<bool>>;

struct SimLink(Network);

impl Link for SimLink {
    type Error = ();

    fn disconnect(&mut self) {}

    fn begin(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn poll_associated(&mut self) -> nb::Result<(), ()> {
        if self.0.get() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

struct SimProbe(Network);

impl ReachabilityProbe for SimProbe {
    fn probe(&mut self, _endpoint: &str) -> bool {
        self.0.get()
    }
}

struct NoDelay;

impl Delay for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}

/// Server that accepts everything while the network is up
struct SimServer {
    network: Network,
    accepted: usize,
}

impl DeliveryTransport for SimServer {
    fn submit_batch(&mut self, events: &[Event], outcomes: &mut [StatusCode]) {
        for (_, outcome) in events.iter().zip(outcomes.iter_mut()) {
            *outcome = if self.network.get() {
                self.accepted += 1;
                StatusCode::CREATED
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
        }
    }
}

fn reading(minute: u32) -> Result<Event, Box<dyn std::error::Error>> {
    let timestamp = format!("2024-05-01T10:{:02}:00 -05:00", minute % 60);
    let mut batch = PayloadBuilder::new();
    batch
        .push("temperature", 21.0 + minute as f32 * 0.1, "maize", &timestamp)?
        .push("humidity", 64.5, "maize", &timestamp)?;
    Ok(Event::measurement_batch(&timestamp, batch)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== FieldLink Outage Recovery ===\n");

    let network: Network = Rc::new(Cell::new(true));
    let spill_dir = std::env::temp_dir().join("fieldlink-outage-example");
    let store = DirStore::open(&spill_dir)?;

    let config = DeviceConfig::default()
        .with_connectivity(ConnectivityConfig::new().with_attempt_budget(3))
        .with_delivery(DeliveryConfig::new().with_replay_every_ticks(2));

    let mut device: FieldDevice<_, _, _, _, _, _, BUFFER_CAPACITY> = FieldDevice::new(
        SimLink(network.clone()),
        SimProbe(network.clone()),
        NoDelay,
        SimServer {
            network: network.clone(),
            accepted: 0,
        },
        store,
        FixedTime::new(0),
        config,
    )?;

    for minute in 0..24 {
        // Network drops between minutes 4 and 12
        network.set(!(4..12).contains(&minute));

        device.ingest(&[reading(minute)?])?;
        let report = device.tick();

        let state = format!("{:?}", report.state);
        print!("minute {:>2}: {:<12} buffered {}", minute, state, device.delivery().buffer().len());
        if let Some(spill) = report.spilled {
            print!("  spilled {} as {}", spill.events, spill.key.as_secs());
        }
        for replay in &report.replayed {
            print!("  replayed {} ({} delivered)", replay.key.as_secs(), replay.delivery.delivered);
        }
        if let Some(err) = report.storage_error {
            print!("  storage error: {}", err);
        }
        println!();
    }

    let stats = device.delivery().stats();
    println!("\nIngested:  {}", stats.ingested);
    println!("Delivered: {}", stats.delivered);
    println!("Spilled:   {}", stats.spilled);
    println!("Replayed:  {}", stats.replayed);
    println!("Evicted:   {}", stats.evicted);
    println!("Server saw {} events", device.delivery().transport().accepted);

    Ok(())
}
