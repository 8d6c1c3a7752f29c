//! Field Device Scheduler
//!
//! [`FieldDevice`] owns every collaborator and component of the delivery
//! path and runs them in a fixed order once per scheduler tick:
//!
//! 1. Link supervision (`refresh`), then subscriber notification
//! 2. Resubmission of buffered events
//! 3. Spill of the oldest events if the buffer is near saturation
//! 4. Replay of the oldest spills, right after the link comes back or every
//!    `replay_every_ticks` ticks while online. Spills are replayed oldest
//!    first, up to `max_replays_per_tick`, until one is not fully delivered
//!
//! Producers call [`FieldDevice::ingest`] between ticks. Nothing in a tick
//! aborts the device: errors are collected in the [`TickReport`] and every
//! step is retried on the next tick.
//!
//! ```rust,ignore
//! let mut device: FieldDevice<_, _, _, _, _, _, BUFFER_CAPACITY> =
//!     FieldDevice::new(wifi, probe, delay, http, store, SystemTime, config)?;
//!
//! loop {
//!     device.ingest(&adapter.read(now))?;
//!     let report = device.tick();
//!     if let Some(err) = report.storage_error {
//!         log::warn!("spill storage: {}", err);
//!     }
//! }
//! ```

use crate::config::DeviceConfig;
use crate::connectivity::{ConnectivityStateMachine, LinkState};
use crate::constants::buffers::{MAX_REPLAYS_PER_TICK, MAX_SUBSCRIBERS};
use crate::delivery::{DeliveryManager, DeliveryReport, ReplayReport, SpillReport};
use crate::errors::{ConfigError, ConfigResult, ConnectivityError, DeliveryError, DeliveryResult, NotifyResult};
use crate::events::Event;
use crate::notify::{ReplayTrigger, Subscriber, SubscriberHandle, SubscriberList};
use crate::store::OverflowStore;
use crate::traits::{Delay, DeliveryTransport, Link, ReachabilityProbe, TimeSource};

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Link state at the end of the tick
    pub state: LinkState,
    /// Unexpected connection outcome hit by supervision
    pub link_error: Option<ConnectivityError>,
    /// Resubmission of buffered events
    pub flushed: DeliveryReport,
    /// Spill written this tick
    pub spilled: Option<SpillReport>,
    /// Spills replayed this tick, oldest first
    pub replayed: heapless::Vec<ReplayReport, MAX_REPLAYS_PER_TICK>,
    /// First overflow store failure of the tick
    pub storage_error: Option<DeliveryError>,
}

/// Owns the link, the delivery path and the subscribers
pub struct FieldDevice<L, P, D, T, S, K, const C: usize> {
    link: L,
    probe: P,
    delay: D,
    connectivity: ConnectivityStateMachine,
    delivery: DeliveryManager<T, S, K, C>,
    subscribers: SubscriberList<MAX_SUBSCRIBERS>,
    replay_trigger: SubscriberHandle,
    replay_every: u32,
    replay_budget: usize,
    ticks: u32,
}

impl<L, P, D, T, S, K, const C: usize> FieldDevice<L, P, D, T, S, K, C>
where
    L: Link,
    P: ReachabilityProbe,
    D: Delay,
    T: DeliveryTransport,
    S: OverflowStore,
    K: TimeSource,
{
    /// Assemble a device; `config` is validated against the buffer capacity
    pub fn new(
        link: L,
        probe: P,
        delay: D,
        transport: T,
        store: S,
        clock: K,
        config: DeviceConfig,
    ) -> ConfigResult<Self> {
        config.validate(C)?;

        let mut subscribers = SubscriberList::new();
        let replay_trigger = subscribers
            .register(Subscriber::ReplayTrigger(ReplayTrigger::new()))
            .map_err(|_| ConfigError::InvalidValue {
                field: "subscribers",
                reason: "no room for replay trigger",
            })?;

        let replay_every = config.delivery.replay_every_ticks;
        let replay_budget = config.delivery.max_replays_per_tick;
        Ok(Self {
            link,
            probe,
            delay,
            connectivity: ConnectivityStateMachine::new(config.connectivity),
            delivery: DeliveryManager::new(transport, store, clock, config.delivery),
            subscribers,
            replay_trigger,
            replay_every,
            replay_budget,
            ticks: 0,
        })
    }

    /// Register a connection event subscriber
    pub fn subscribe(&mut self, subscriber: Subscriber) -> NotifyResult<SubscriberHandle> {
        self.subscribers.register(subscriber)
    }

    pub fn subscribers(&self) -> &SubscriberList<MAX_SUBSCRIBERS> {
        &self.subscribers
    }

    pub fn connectivity(&self) -> &ConnectivityStateMachine {
        &self.connectivity
    }

    pub fn delivery(&self) -> &DeliveryManager<T, S, K, C> {
        &self.delivery
    }

    pub fn delivery_mut(&mut self) -> &mut DeliveryManager<T, S, K, C> {
        &mut self.delivery
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Producer entry point
    pub fn ingest(&mut self, events: &[Event]) -> DeliveryResult<DeliveryReport> {
        let online = self.connectivity.is_online();
        let report = self.delivery.ingest_new(events, online)?;
        self.feed_back(&report);
        Ok(report)
    }

    /// Run one scheduler cycle
    pub fn tick(&mut self) -> TickReport {
        self.ticks = self.ticks.wrapping_add(1);
        let mut report = TickReport::default();

        if let Err(err) = self
            .connectivity
            .refresh(&mut self.link, &mut self.probe, &mut self.delay)
        {
            report.link_error = Some(err);
        }
        self.subscribers
            .notify(self.connectivity.last_event(), self.connectivity.state());

        report.flushed = self.delivery.flush_buffered(self.connectivity.is_online());
        self.feed_back(&report.flushed);

        match self.delivery.drain_overflow_if_needed() {
            Ok(spill) => report.spilled = spill,
            Err(err) => {
                report.storage_error.get_or_insert(err);
            }
        }

        if self.connectivity.is_online() && self.replay_due() {
            self.replay_spills(&mut report);
        }

        report.state = self.connectivity.state();
        report
    }

    fn replay_spills(&mut self, report: &mut TickReport) {
        for _ in 0..self.replay_budget.min(MAX_REPLAYS_PER_TICK) {
            if !self.connectivity.is_online() {
                break;
            }

            let replay = match self.delivery.replay_oldest_spill(true) {
                Ok(Some(replay)) => replay,
                Ok(None) => break,
                Err(err) => {
                    report.storage_error.get_or_insert(err);
                    break;
                }
            };

            self.feed_back(&replay.delivery);
            if let Some(err) = replay.unreadable {
                report.storage_error.get_or_insert(DeliveryError::Store(err));
            }
            // Budget never exceeds the capacity
            let _ = report.replayed.push(replay);
            if !replay.removed {
                break;
            }
        }
    }

    fn replay_due(&mut self) -> bool {
        let triggered = self
            .subscribers
            .get_mut(self.replay_trigger)
            .and_then(Subscriber::as_replay_trigger_mut)
            .map_or(false, ReplayTrigger::take);
        let periodic = self.ticks % self.replay_every.max(1) == 0;
        triggered || periodic
    }

    fn feed_back(&mut self, report: &DeliveryReport) {
        if report.skipped {
            return;
        }
        if let Some(code) = report.worst_failure {
            self.connectivity.report_outcome(code);
        }
    }
}
