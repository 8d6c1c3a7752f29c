//! Connection Event Subscribers
//!
//! Whenever link supervision records a new connection event, every registered
//! subscriber is told about it, synchronously and in registration order. The
//! set of subscribers is closed: a fixed table of [`Subscriber`] variants, no
//! trait objects and no heap.
//!
//! | Variant        | Reacts by                                            |
//! |----------------|------------------------------------------------------|
//! | `Recorder`     | Keeping the last few connection events for diagnostics |
//! | `ReplayTrigger`| Arming when the link comes back, so spills replay    |

use crate::connectivity::LinkState;
use crate::constants::buffers::CONNECTION_HISTORY_LEN;
use crate::errors::{NotifyError, NotifyResult};
use crate::events::{Event, StatusCode};

/// One entry of the connection history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// Outcome carried by the connection event
    pub outcome: StatusCode,
    /// Link state right after the event
    pub state: LinkState,
    /// Running count of events seen by the recorder
    pub sequence: u32,
}

/// Keeps the most recent connection events
#[derive(Debug, Clone, Default)]
pub struct ConnectionRecorder {
    history: heapless::Deque<ConnectionRecord, CONNECTION_HISTORY_LEN>,
    seen: u32,
}

impl ConnectionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_event(&mut self, event: &Event, state: LinkState) {
        self.seen = self.seen.wrapping_add(1);
        if self.history.is_full() {
            self.history.pop_front();
        }
        let _ = self.history.push_back(ConnectionRecord {
            outcome: event.outcome(),
            state,
            sequence: self.seen,
        });
    }

    /// Oldest to newest
    pub fn history(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.history.iter()
    }

    /// Most recent record
    pub fn latest(&self) -> Option<&ConnectionRecord> {
        self.history.back()
    }

    /// Total events seen, including those rotated out of the history
    pub fn seen(&self) -> u32 {
        self.seen
    }
}

/// Arms when the link enters `Connected` from any other state
#[derive(Debug, Clone, Default)]
pub struct ReplayTrigger {
    armed: bool,
    previous: Option<LinkState>,
}

impl ReplayTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_event(&mut self, state: LinkState) {
        if state == LinkState::Connected && self.previous != Some(LinkState::Connected) {
            self.armed = true;
        }
        self.previous = Some(state);
    }

    /// Whether a replay is pending
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Consume the pending replay, if any
    pub fn take(&mut self) -> bool {
        core::mem::replace(&mut self.armed, false)
    }
}

/// Connection event observer
#[derive(Debug, Clone)]
pub enum Subscriber {
    Recorder(ConnectionRecorder),
    ReplayTrigger(ReplayTrigger),
}

impl Subscriber {
    /// Deliver one connection event
    pub fn notify(&mut self, event: &Event, state: LinkState) {
        match self {
            Subscriber::Recorder(recorder) => recorder.on_event(event, state),
            Subscriber::ReplayTrigger(trigger) => trigger.on_event(state),
        }
    }

    pub fn as_recorder(&self) -> Option<&ConnectionRecorder> {
        match self {
            Subscriber::Recorder(recorder) => Some(recorder),
            _ => None,
        }
    }

    pub fn as_replay_trigger_mut(&mut self) -> Option<&mut ReplayTrigger> {
        match self {
            Subscriber::ReplayTrigger(trigger) => Some(trigger),
            _ => None,
        }
    }
}

/// Index of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberHandle(usize);

/// Fixed table of up to `N` subscribers
#[derive(Debug, Clone, Default)]
pub struct SubscriberList<const N: usize> {
    subscribers: heapless::Vec<Subscriber, N>,
}

impl<const N: usize> SubscriberList<N> {
    pub fn new() -> Self {
        Self {
            subscribers: heapless::Vec::new(),
        }
    }

    /// Add a subscriber; it is notified after every earlier one
    pub fn register(&mut self, subscriber: Subscriber) -> NotifyResult<SubscriberHandle> {
        let handle = SubscriberHandle(self.subscribers.len());
        self.subscribers
            .push(subscriber)
            .map_err(|_| NotifyError::Full { capacity: N })?;
        Ok(handle)
    }

    /// Notify every subscriber in registration order
    pub fn notify(&mut self, event: &Event, state: LinkState) {
        for subscriber in self.subscribers.iter_mut() {
            subscriber.notify(event, state);
        }
    }

    pub fn get(&self, handle: SubscriberHandle) -> Option<&Subscriber> {
        self.subscribers.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: SubscriberHandle) -> Option<&mut Subscriber> {
        self.subscribers.get_mut(handle.0)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
