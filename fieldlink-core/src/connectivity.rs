//! Connectivity State Machine
//!
//! ## Overview
//!
//! Supervises the wireless link and decides, once per scheduler cycle, what
//! to do about it. The decision is driven by the outcome code of the last
//! connection event:
//!
//! ```text
//! last outcome          action
//! ─────────────────────────────────────────────────────────────────────
//! 503 (sentinel)        full reconnect: disconnect, begin, poll
//! other >= 500          light reconnect: disconnect, settle, reconnect, poll
//! 200                   reachability probe; on failure full reconnect
//! anything else         UnexpectedOutcome error, full reconnect next cycle
//! ```
//!
//! ### States
//!
//! ```text
//!            ┌──────────── probe failed / server error ────────────┐
//!            ▼                                                     │
//! Unknown ─► Connecting ──── associated ──────────────────────► Connected
//!            │    ▲
//!            │    └──────────── next refresh ─────────┐
//!            └──── budget exhausted ──► Unreachable ──┘
//! ```
//!
//! `Unreachable` is not terminal; its sentinel connection event makes the
//! next refresh try again from scratch.
//!
//! ### Connection Events
//!
//! Every decision is recorded as a connection event (an [`Event`] of kind
//! `Connection`). The machine keeps the first one ever created, for
//! diagnostics, and the latest one, which drives the next refresh. Neither is
//! buffered or delivered.

use crate::config::ConnectivityConfig;
use crate::errors::{ConnectivityError, ConnectivityResult};
use crate::events::{Event, StatusCode};
use crate::traits::{Delay, Link, ReachabilityProbe};

// Connection event descriptions, stored as `{"error":"..."}` payloads
pub const NO_EVENTS_YET: &str = "No connection events yet";
pub const CONNECTED: &str = "Successfully connected to WiFi";
pub const REACHABLE: &str = "Connection successful";
pub const FAILED: &str = "Connection failed";
pub const SERVER_FAILURE: &str = "Server failure during delivery";
pub const UNHANDLED: &str = "Unhandled connection status code";

/// Link status as seen by the delivery path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Nothing attempted yet
    #[default]
    Unknown,
    /// Association in progress, or scheduled for the next refresh
    Connecting,
    /// Associated and reachable; delivery allowed
    Connected,
    /// Last attempt exhausted its budget
    Unreachable,
}

/// How a connect attempt starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReconnectMode {
    /// Tear down and start a fresh association
    Full,
    /// Tear down, wait for the radio to settle, re-associate
    Light,
}

/// Supervision counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivityStats {
    /// Calls to `refresh`
    pub refreshes: u32,
    /// Connect attempts started
    pub attempts: u32,
    /// Attempts that associated
    pub successes: u32,
    /// Attempts that ran out of polls or failed to start
    pub exhausted: u32,
    /// Reachability probes that found no endpoint
    pub probe_failures: u32,
    /// Refreshes that hit an unclassified outcome
    pub unexpected_outcomes: u32,
    /// Server failures reported by the delivery path
    pub server_failures: u32,
    /// State changes
    pub transitions: u32,
}

/// Drives reconnect behaviour and gates delivery
#[derive(Debug, Clone)]
pub struct ConnectivityStateMachine {
    config: ConnectivityConfig,
    state: LinkState,
    first_event: Event,
    last_event: Event,
    stats: ConnectivityStats,
}

impl ConnectivityStateMachine {
    /// Start in `Unknown`; the first refresh performs a full connect
    pub fn new(config: ConnectivityConfig) -> Self {
        let first_event = Event::connection(StatusCode::SERVICE_UNAVAILABLE, NO_EVENTS_YET);
        Self {
            config,
            state: LinkState::Unknown,
            last_event: first_event.clone(),
            first_event,
            stats: ConnectivityStats::default(),
        }
    }

    /// Resume from a connection event persisted before a restart
    pub fn with_last_event(mut self, event: Event) -> Self {
        self.last_event = event;
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Delivery gate
    pub fn is_online(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Latest connection event
    pub fn last_event(&self) -> &Event {
        &self.last_event
    }

    /// Connection event created at startup, never modified
    pub fn first_event(&self) -> &Event {
        &self.first_event
    }

    pub fn stats(&self) -> &ConnectivityStats {
        &self.stats
    }

    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Run one supervision step and return the resulting state
    ///
    /// Blocks for as long as association polling takes. An unexpected outcome
    /// code is returned as an error after a full reconnect has been scheduled
    /// for the next call.
    pub fn refresh<L, P, D>(
        &mut self,
        link: &mut L,
        probe: &mut P,
        delay: &mut D,
    ) -> ConnectivityResult<LinkState>
    where
        L: Link,
        P: ReachabilityProbe,
        D: Delay,
    {
        self.stats.refreshes += 1;
        let code = self.last_event.outcome();

        if code == StatusCode::SERVICE_UNAVAILABLE {
            self.connect(link, delay, ReconnectMode::Full);
        } else if code.is_server_error() {
            self.connect(link, delay, ReconnectMode::Light);
        } else if code == StatusCode::OK {
            if self.probe(probe) {
                self.record(StatusCode::OK, REACHABLE);
                self.transition(LinkState::Connected);
            } else {
                self.stats.probe_failures += 1;
                log_warn!("No probe endpoint reachable, reconnecting");
                self.record(StatusCode::SERVICE_UNAVAILABLE, FAILED);
                self.connect(link, delay, ReconnectMode::Full);
            }
        } else {
            self.stats.unexpected_outcomes += 1;
            log_warn!("Unhandled connection status code {}", code);
            self.record(StatusCode::SERVICE_UNAVAILABLE, UNHANDLED);
            self.transition(LinkState::Connecting);
            return Err(ConnectivityError::UnexpectedOutcome { code });
        }

        Ok(self.state)
    }

    /// Feed a delivery outcome back into supervision
    ///
    /// A server failure while connected schedules a reconnect on the next
    /// refresh: light for a 5xx, full for the sentinel. Returns whether the
    /// outcome was taken into account.
    pub fn report_outcome(&mut self, code: StatusCode) -> bool {
        if !code.is_server_error() || self.state != LinkState::Connected {
            return false;
        }

        self.stats.server_failures += 1;
        log_warn!("Delivery reported {}, scheduling reconnect", code);
        self.record(code, SERVER_FAILURE);
        self.transition(LinkState::Connecting);
        true
    }

    fn probe<P: ReachabilityProbe>(&mut self, probe: &mut P) -> bool {
        let endpoints = &self.config.probe_endpoints;
        endpoints.is_empty() || endpoints.iter().any(|endpoint| probe.probe(endpoint))
    }

    fn connect<L: Link, D: Delay>(&mut self, link: &mut L, delay: &mut D, mode: ReconnectMode) {
        self.transition(LinkState::Connecting);
        self.stats.attempts += 1;

        link.disconnect();
        let started = match mode {
            ReconnectMode::Full => link.begin(),
            ReconnectMode::Light => {
                delay.delay_ms(self.config.settle_delay_ms);
                link.reconnect()
            }
        };

        let associated = match started {
            Ok(()) => self.poll(link, delay),
            Err(err) => {
                log_warn!("Link start failed ({:?}): {:?}", mode, err);
                false
            }
        };

        if associated {
            self.stats.successes += 1;
            self.record(StatusCode::OK, CONNECTED);
            self.transition(LinkState::Connected);
        } else {
            self.stats.exhausted += 1;
            log_warn!("Link not associated after {} polls", self.config.attempt_budget);
            self.record(StatusCode::SERVICE_UNAVAILABLE, FAILED);
            self.transition(LinkState::Unreachable);
        }
    }

    fn poll<L: Link, D: Delay>(&mut self, link: &mut L, delay: &mut D) -> bool {
        for _ in 0..self.config.attempt_budget {
            match link.poll_associated() {
                Ok(()) => return true,
                Err(nb::Error::WouldBlock) => delay.delay_ms(self.config.poll_interval_ms),
                Err(nb::Error::Other(err)) => {
                    log_warn!("Association failed: {:?}", err);
                    return false;
                }
            }
        }
        false
    }

    fn record(&mut self, outcome: StatusCode, description: &str) {
        self.last_event = Event::connection(outcome, description);
    }

    fn transition(&mut self, next: LinkState) {
        if self.state != next {
            log_info!("Link {:?} -> {:?}", self.state, next);
            self.state = next;
            self.stats.transitions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ScriptLink {
        polls: Vec<nb::Result<(), ()>>,
        calls: Vec<&'static str>,
    }

    impl Link for ScriptLink {
        type Error = ();

        fn disconnect(&mut self) {
            self.calls.push("disconnect");
        }

        fn begin(&mut self) -> Result<(), ()> {
            self.calls.push("begin");
            Ok(())
        }

        fn reconnect(&mut self) -> Result<(), ()> {
            self.calls.push("reconnect");
            Ok(())
        }

        fn poll_associated(&mut self) -> nb::Result<(), ()> {
            if self.polls.is_empty() {
                Err(nb::Error::WouldBlock)
            } else {
                self.polls.remove(0)
            }
        }
    }

    struct Reachable(bool);

    impl ReachabilityProbe for Reachable {
        fn probe(&mut self, _endpoint: &str) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct Sleeps(Vec<u32>);

    impl Delay for Sleeps {
        fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    fn machine(budget: u32) -> ConnectivityStateMachine {
        ConnectivityStateMachine::new(ConnectivityConfig::new().with_attempt_budget(budget))
    }

    #[test]
    fn starts_unknown_with_sentinel_event() {
        let sm = machine(3);
        assert_eq!(sm.state(), LinkState::Unknown);
        assert!(!sm.is_online());
        assert_eq!(sm.first_event().outcome(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(sm.first_event(), sm.last_event());
    }

    #[test]
    fn full_connect_succeeds_after_polling() {
        let mut sm = machine(5);
        let mut link = ScriptLink {
            polls: vec![Err(nb::Error::WouldBlock), Ok(())],
            ..Default::default()
        };
        let mut delay = Sleeps::default();

        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Connected);
        assert_eq!(link.calls, vec!["disconnect", "begin"]);
        assert_eq!(delay.0, vec![1000]);
        assert_eq!(sm.last_event().outcome(), StatusCode::OK);
        assert_eq!(sm.first_event().outcome(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn exhausted_budget_is_unreachable_and_retried() {
        let mut sm = machine(3);
        let mut link = ScriptLink::default();
        let mut delay = Sleeps::default();

        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Unreachable);
        assert_eq!(delay.0.len(), 3);
        assert_eq!(sm.last_event().outcome(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(sm.stats().exhausted, 1);

        link.polls.push(Ok(()));
        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Connected);
        assert_eq!(sm.stats().attempts, 2);
    }

    #[test]
    fn poll_error_aborts_attempt() {
        let mut sm = machine(10);
        let mut link = ScriptLink {
            polls: vec![Err(nb::Error::Other(()))],
            ..Default::default()
        };
        let mut delay = Sleeps::default();
        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Unreachable);
        assert!(delay.0.is_empty());
    }

    #[test]
    fn connected_refresh_probes_only() {
        let mut sm = machine(3);
        let mut link = ScriptLink {
            polls: vec![Ok(())],
            ..Default::default()
        };
        let mut delay = Sleeps::default();
        sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        link.calls.clear();

        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Connected);
        assert!(link.calls.is_empty());
        assert_eq!(sm.last_event().payload(), r#"{"error":"Connection successful"}"#);
    }

    #[test]
    fn failed_probe_reconnects_immediately() {
        let mut sm = machine(3);
        let mut link = ScriptLink {
            polls: vec![Ok(()), Ok(())],
            ..Default::default()
        };
        let mut delay = Sleeps::default();
        sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        link.calls.clear();

        let state = sm.refresh(&mut link, &mut Reachable(false), &mut delay).unwrap();
        assert_eq!(state, LinkState::Connected);
        assert_eq!(link.calls, vec!["disconnect", "begin"]);
        assert_eq!(sm.stats().probe_failures, 1);
    }

    #[test]
    fn server_error_triggers_light_reconnect() {
        let mut sm = machine(3).with_last_event(Event::connection(StatusCode::OK, "restored"));
        let mut link = ScriptLink {
            polls: vec![Ok(())],
            ..Default::default()
        };
        let mut delay = Sleeps::default();
        assert_eq!(
            sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap(),
            LinkState::Connected
        );

        assert!(sm.report_outcome(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(sm.state(), LinkState::Connecting);
        assert!(!sm.is_online());

        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Connected);
        assert_eq!(link.calls, vec!["disconnect", "reconnect"]);
        assert_eq!(delay.0, vec![1000]);
    }

    #[test]
    fn client_errors_are_not_link_problems() {
        let mut sm = machine(3).with_last_event(Event::connection(StatusCode::OK, "restored"));
        let mut link = ScriptLink::default();
        sm.refresh(&mut link, &mut Reachable(true), &mut Sleeps::default()).unwrap();
        assert!(!sm.report_outcome(StatusCode(404)));
        assert!(sm.is_online());
    }

    #[test]
    fn unexpected_outcome_is_retryable_error() {
        let mut sm = machine(3).with_last_event(Event::connection(StatusCode(302), "restored"));
        let mut link = ScriptLink {
            polls: vec![Ok(())],
            ..Default::default()
        };
        let mut delay = Sleeps::default();

        let err = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap_err();
        assert_eq!(err, ConnectivityError::UnexpectedOutcome { code: StatusCode(302) });
        assert_eq!(sm.state(), LinkState::Connecting);
        assert!(link.calls.is_empty());

        let state = sm.refresh(&mut link, &mut Reachable(true), &mut delay).unwrap();
        assert_eq!(state, LinkState::Connected);
        assert_eq!(link.calls, vec!["disconnect", "begin"]);
    }
}
