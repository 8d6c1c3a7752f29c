//! Delivery Reliability Manager
//!
//! ## Overview
//!
//! Every event a producer hands over is either confirmed by the server or
//! kept until it can be: first in the [`RingBuffer`], then, when the buffer
//! nears saturation, in the overflow store. Nothing is dropped unless the
//! overflow store itself fails while the buffer is full, and that is counted.
//!
//! ```text
//! producer ──► ingest_new ──► transport ──► delivered
//!                  │
//!                  └─ failures ──► RingBuffer ──► flush_buffered ──► transport
//!                                     │
//!                                     └─ near full ──► drain_overflow_if_needed ──► store
//!                                                                                    │
//!                           transport ◄── retry_overflowed ◄── replay_oldest_spill ◄─┘
//! ```
//!
//! ## Link Gate
//!
//! Every operation takes an `online` flag from the connectivity state
//! machine. While offline no transport call is made; every outcome is the
//! 503 sentinel, so events are buffered exactly as if the server had been
//! unreachable.
//!
//! ## Reports
//!
//! Operations return a [`DeliveryReport`]. Its `worst_failure` is the most
//! severe server-side outcome seen (the sentinel ranks above other 5xx
//! codes), which the scheduler feeds back into link supervision.

use crate::buffer::RingBuffer;
use crate::config::DeliveryConfig;
use crate::errors::{DeliveryError, DeliveryResult, StoreError, StoreResult};
use crate::events::{Event, StatusCode};
use crate::store::{spill_key_for, OverflowStore, SpillKey};
use crate::traits::{DeliveryTransport, TimeSource};

/// Outcome summary of one delivery operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Events handed to the transport
    pub attempted: usize,
    /// Events confirmed by the server
    pub delivered: usize,
    /// Events that still need delivery after this operation
    pub retained: usize,
    /// Events evicted from the full buffer because a spill failed
    pub evicted: usize,
    /// Most severe server-side outcome seen, if any
    pub worst_failure: Option<StatusCode>,
    /// True when the link gate was closed and nothing was sent
    pub skipped: bool,
}

impl DeliveryReport {
    fn note(&mut self, code: StatusCode) {
        if code.is_success() {
            self.delivered += 1;
        } else {
            self.retained += 1;
            self.note_failure(code);
        }
    }

    fn note_failure(&mut self, code: StatusCode) {
        let worst_known = self.worst_failure == Some(StatusCode::SERVICE_UNAVAILABLE);
        if code.is_server_error()
            && !worst_known
            && (code == StatusCode::SERVICE_UNAVAILABLE || self.worst_failure.is_none())
        {
            self.worst_failure = Some(code);
        }
    }

    fn absorb(&mut self, other: DeliveryReport) {
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.retained += other.retained;
        self.evicted += other.evicted;
        self.skipped |= other.skipped;
        if let Some(code) = other.worst_failure {
            self.note_failure(code);
        }
    }
}

/// Result of moving buffered events to the overflow store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillReport {
    /// Key the spill was stored under
    pub key: SpillKey,
    /// Events written
    pub events: usize,
}

/// Result of resubmitting one spill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    /// Spill that was replayed
    pub key: SpillKey,
    /// Events read back from the store
    pub loaded: usize,
    /// Delivery outcome of the resubmission
    pub delivery: DeliveryReport,
    /// Spill deleted because everything was delivered
    pub removed: bool,
    /// Older spills set aside because they could not be loaded
    pub quarantined: usize,
    /// First load failure behind those quarantines
    pub unreadable: Option<StoreError>,
}

/// Running totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events accepted from producers (after truncation)
    pub ingested: usize,
    /// Events confirmed by the server, any path
    pub delivered: usize,
    /// Events appended to the ring buffer
    pub retained: usize,
    /// Events written to the overflow store
    pub spilled: usize,
    /// Spills written
    pub spill_files: usize,
    /// Spilled events later confirmed by the server
    pub replayed: usize,
    /// Events lost because the buffer was full and spilling failed
    pub evicted: usize,
    /// Producer batches refused as malformed
    pub rejected_batches: usize,
    /// Producer batches cut down to the per-cycle limit
    pub truncated_batches: usize,
    /// Overflow store operations that failed
    pub storage_failures: usize,
    /// Spills set aside because they could not be loaded
    pub quarantined_spills: usize,
    /// Replayed events still in their spill because the rewrite or removal
    /// failed; they are sent again on the next replay
    pub pending_duplicates: usize,
}

/// Orchestrates submission, buffering, spilling and replay
///
/// Owns the ring buffer of capacity `C` along with the transport, the
/// overflow store and the clock used to name spills.
pub struct DeliveryManager<T, S, K, const C: usize> {
    transport: T,
    store: S,
    clock: K,
    buffer: RingBuffer<C>,
    config: DeliveryConfig,
    stats: DeliveryStats,
}

impl<T, S, K, const C: usize> DeliveryManager<T, S, K, C>
where
    T: DeliveryTransport,
    S: OverflowStore,
    K: TimeSource,
{
    pub fn new(transport: T, store: S, clock: K, config: DeliveryConfig) -> Self {
        Self {
            transport,
            store,
            clock,
            buffer: RingBuffer::new(),
            config,
            stats: DeliveryStats::default(),
        }
    }

    /// Events waiting in memory, oldest first
    pub fn buffer(&self) -> &RingBuffer<C> {
        &self.buffer
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Submit a batch and collect one outcome per event
    ///
    /// `outcomes` is overwritten with the sentinel first; only
    /// `min(events.len(), outcomes.len())` events are submitted. While
    /// offline the transport is not called and the report is `skipped`.
    pub fn submit(
        &mut self,
        events: &[Event],
        outcomes: &mut [StatusCode],
        online: bool,
    ) -> DeliveryReport {
        let n = events.len().min(outcomes.len());
        let (events, outcomes) = (&events[..n], &mut outcomes[..n]);
        outcomes.fill(StatusCode::SERVICE_UNAVAILABLE);

        if !online {
            return DeliveryReport {
                retained: n,
                skipped: true,
                ..DeliveryReport::default()
            };
        }
        if n == 0 {
            return DeliveryReport::default();
        }

        self.transport.submit_batch(events, outcomes);

        let mut report = DeliveryReport {
            attempted: n,
            ..DeliveryReport::default()
        };
        for code in outcomes.iter() {
            report.note(*code);
        }
        report
    }

    /// Accept a fresh producer batch
    ///
    /// Batches longer than `max_per_cycle` are truncated. A batch whose first
    /// event is not a measurement is refused without touching any state.
    /// Everything the server did not confirm is appended to the buffer, after
    /// spilling if the buffer cannot hold it.
    pub fn ingest_new(&mut self, events: &[Event], online: bool) -> DeliveryResult<DeliveryReport> {
        let Some(first) = events.first() else {
            return Ok(DeliveryReport::default());
        };
        if !first.is_measurement() {
            self.stats.rejected_batches += 1;
            log_warn!("First event is {:?}, ignoring batch of {}", first.kind(), events.len());
            return Err(DeliveryError::MalformedBatch { kind: first.kind() });
        }

        let limit = self.config.max_per_cycle.min(C);
        let batch = if events.len() > limit {
            self.stats.truncated_batches += 1;
            log_warn!("Batch of {} events exceeds {}, truncating", events.len(), limit);
            &events[..limit]
        } else {
            events
        };

        let mut outcomes = [StatusCode::SERVICE_UNAVAILABLE; C];
        let mut report = self.submit(batch, &mut outcomes, online);
        self.stats.ingested += batch.len();
        self.stats.delivered += report.delivered;

        let failures = outcomes[..batch.len()].iter().filter(|c| !c.is_success()).count();
        self.make_room(failures);

        for (event, code) in batch.iter().zip(outcomes.iter()) {
            if code.is_success() {
                continue;
            }
            self.stats.retained += 1;
            if self.buffer.append(event.clone()).is_some() {
                self.stats.evicted += 1;
                report.evicted += 1;
                log_warn!("Ring buffer full, oldest event evicted");
            }
        }

        log_debug!("Ring buffer holds {}/{} events", self.buffer.len(), C);
        Ok(report)
    }

    /// Resubmit everything in the buffer and drop what was delivered
    pub fn flush_buffered(&mut self, online: bool) -> DeliveryReport {
        if self.buffer.is_empty() {
            return DeliveryReport::default();
        }

        let mut pending: heapless::Vec<Event, C> = heapless::Vec::new();
        for event in self.buffer.iter() {
            // len <= C
            let _ = pending.push(event.clone());
        }

        let mut outcomes = [StatusCode::SERVICE_UNAVAILABLE; C];
        let report = self.submit(&pending, &mut outcomes, online);
        if !report.skipped {
            self.buffer.reconcile(&outcomes[..pending.len()]);
            self.stats.delivered += report.delivered;
        }
        report
    }

    /// Spill the oldest events when the next producer cycle could overflow
    ///
    /// On a store failure the events go back to the front of the buffer and
    /// the error is returned.
    pub fn drain_overflow_if_needed(&mut self) -> DeliveryResult<Option<SpillReport>> {
        if !self.config.needs_spill(self.buffer.len(), C) {
            return Ok(None);
        }
        self.spill_oldest()
    }

    /// Resubmit a batch reloaded from the overflow store
    ///
    /// Delivered events are reset to the empty event, empty events are
    /// skipped. Returns whether everything in the batch is now delivered.
    pub fn retry_overflowed(&mut self, batch: &mut [Event], online: bool) -> bool {
        self.retry_batch(batch, online).retained == 0
    }

    /// Replay the oldest spill
    ///
    /// The spill is deleted when every event was delivered, otherwise
    /// rewritten with the events still pending. A spill that cannot be
    /// loaded is quarantined and the next oldest one is tried in the same
    /// call; the report carries the first load failure. Returns `None` when
    /// offline or when there is nothing to replay, and the load failure as
    /// an error when every remaining spill was quarantined.
    pub fn replay_oldest_spill(&mut self, online: bool) -> DeliveryResult<Option<ReplayReport>> {
        if !online {
            return Ok(None);
        }

        let mut batch: [Event; C] = core::array::from_fn(|_| Event::default());
        let mut quarantined = 0;
        let mut unreadable = None;

        let (key, loaded) = loop {
            let oldest = self.store.oldest();
            let Some(key) = self.storage(oldest)? else {
                return match unreadable {
                    Some(err) => Err(DeliveryError::Store(err)),
                    None => Ok(None),
                };
            };

            match self.store.load(key, &mut batch) {
                Ok(loaded) => break (key, loaded),
                Err(err) => {
                    self.stats.storage_failures += 1;
                    log_warn!("Spill {} cannot be loaded ({}), quarantining", key.as_secs(), err);
                    let set_aside = self.store.quarantine(key);
                    self.storage(set_aside)?;
                    self.stats.quarantined_spills += 1;
                    quarantined += 1;
                    unreadable.get_or_insert(err);
                }
            }
        };

        let delivery = self.retry_batch(&mut batch[..loaded], online);
        let removed = delivery.retained == 0;

        // Until the spill is removed or rewritten, delivered events stay in it
        let updated = if removed {
            self.store.remove(key)
        } else if delivery.delivered > 0 {
            self.store.rewrite(key, &batch[..loaded])
        } else {
            Ok(())
        };
        if updated.is_err() {
            self.stats.pending_duplicates += delivery.delivered;
        }
        self.storage(updated)?;

        log_info!(
            "Replayed spill {}: {} of {} delivered",
            key.as_secs(),
            delivery.delivered,
            loaded
        );
        Ok(Some(ReplayReport {
            key,
            loaded,
            delivery,
            removed,
            quarantined,
            unreadable,
        }))
    }

    fn retry_batch(&mut self, batch: &mut [Event], online: bool) -> DeliveryReport {
        let mut total = DeliveryReport::default();

        for chunk in batch.chunks_mut(C.max(1)) {
            let mut pending: heapless::Vec<Event, C> = heapless::Vec::new();
            let mut index: heapless::Vec<usize, C> = heapless::Vec::new();
            for (i, event) in chunk.iter().enumerate() {
                if !event.is_empty() && pending.push(event.clone()).is_ok() {
                    let _ = index.push(i);
                }
            }
            if pending.is_empty() {
                continue;
            }

            let mut outcomes = [StatusCode::SERVICE_UNAVAILABLE; C];
            let report = self.submit(&pending, &mut outcomes, online);
            for (k, &i) in index.iter().enumerate() {
                if outcomes[k].is_success() {
                    chunk[i].clear();
                }
            }

            self.stats.delivered += report.delivered;
            self.stats.replayed += report.delivered;
            total.absorb(report);
        }

        total
    }

    fn make_room(&mut self, incoming: usize) {
        while self.buffer.len() + incoming > C && !self.buffer.is_empty() {
            match self.spill_oldest() {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn spill_oldest(&mut self) -> DeliveryResult<Option<SpillReport>> {
        let Some(batch) = self.buffer.extract_oldest(self.config.max_events_per_file) else {
            return Ok(None);
        };
        if batch.is_empty() {
            return Ok(None);
        }

        let key = spill_key_for(&batch, &self.clock);
        match self.store.store(key, &batch) {
            Ok(key) => {
                self.stats.spilled += batch.len();
                self.stats.spill_files += 1;
                log_info!("Spilled {} events as {}", batch.len(), key.as_secs());
                Ok(Some(SpillReport {
                    key,
                    events: batch.len(),
                }))
            }
            Err(err) => {
                let dropped = self.buffer.restore_oldest(&batch);
                self.stats.evicted += dropped;
                self.stats.storage_failures += 1;
                log_warn!("Spill failed, keeping {} events in memory: {}", batch.len(), err);
                Err(err.into())
            }
        }
    }

    fn storage<R>(&mut self, result: StoreResult<R>) -> DeliveryResult<R> {
        result.map_err(|err| {
            self.stats.storage_failures += 1;
            log_warn!("Overflow store failed: {}", err);
            DeliveryError::Store(err)
        })
    }
}
