//! Fixed-Capacity Ring Buffer for Undelivered Events
//!
//! ## Overview
//!
//! Events that could not be confirmed by the server wait here until the next
//! delivery attempt or until they are spilled to the overflow store. The
//! buffer is sized at compile time through a const generic and never
//! allocates.
//!
//! ## Design Rationale
//!
//! ### Bounded Counter
//!
//! The logical count never exceeds `C`. Slots are addressed as
//! `(head + i) % C` for logical index `i`, so the oldest event is always at
//! `head`:
//!
//! ```text
//! RingBuffer<6> after 8 appends and 2 extractions:
//! ┌─────┬─────┬─────┬─────┬─────┬─────┐
//! │  G  │  H  │  -  │  -  │  E  │  F  │  ← physical slots
//! └─────┴─────┴─────┴─────┴─────┴─────┘
//!                           ↑
//!                           └── head = 4, len = 4
//!
//! Logical view: [E, F, G, H]
//! ```
//!
//! ### No Silent Overwrite
//!
//! Appending to a full buffer evicts the oldest event and hands it back to
//! the caller. The delivery manager spills before that can happen, so an
//! eviction only occurs when the overflow store itself has failed, and it
//! is counted.
//!
//! ### Stable Compaction
//!
//! [`RingBuffer::reconcile`] removes delivered events and shifts survivors
//! towards the head without reordering them. Spill files are named after
//! the oldest event they contain, so insertion order has to survive every
//! reconcile.
//!
//! ## Usage Example
//!
//! ```rust
//! use fieldlink_core::buffer::RingBuffer;
//! use fieldlink_core::{Event, StatusCode};
//!
//! let mut buffer: RingBuffer<6> = RingBuffer::new();
//! for i in 0..3 {
//!     let payload = format!("[{}]", i);
//!     buffer.append(Event::measurement("", &payload).unwrap());
//! }
//!
//! // Middle event was accepted by the server
//! let left = buffer.reconcile(&[StatusCode(500), StatusCode::CREATED, StatusCode(500)]);
//! assert_eq!(left, 2);
//! assert_eq!(buffer.oldest().map(|e| e.payload()), Some("[0]"));
//! ```

use crate::events::{Event, StatusCode};

/// Ring buffer of events awaiting delivery
///
/// ## Internal Invariants
///
/// - `len <= C`
/// - `head < C` whenever `C > 0`
/// - Logical slots `0..len` are `Some`, every other slot is `None`
#[derive(Debug, Clone)]
pub struct RingBuffer<const C: usize> {
    slots: [Option<Event>; C],
    head: usize,
    len: usize,
    low_water: usize,
}

impl<const C: usize> RingBuffer<C> {
    /// Creates an empty buffer with a low-water mark of one event
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            head: 0,
            len: 0,
            low_water: 1,
        }
    }

    /// Sets the minimum occupancy below which [`extract_oldest`](Self::extract_oldest)
    /// declines to extract anything
    pub fn with_low_water_mark(mut self, mark: usize) -> Self {
        self.low_water = mark.max(1);
        self
    }

    /// Current low-water mark
    pub fn low_water_mark(&self) -> usize {
        self.low_water
    }

    /// Number of events held
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no events are held
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the next append would evict
    pub fn is_full(&self) -> bool {
        self.len == C
    }

    /// Maximum number of events
    pub const fn capacity(&self) -> usize {
        C
    }

    /// Free slots left
    pub fn remaining(&self) -> usize {
        C - self.len
    }

    #[inline]
    fn slot(&self, logical: usize) -> usize {
        (self.head + logical) % C
    }

    /// Inserts an event after the newest one
    ///
    /// Returns the evicted oldest event when the buffer was already full.
    pub fn append(&mut self, event: Event) -> Option<Event> {
        if C == 0 {
            return Some(event);
        }

        let evicted = if self.is_full() { self.pop_front() } else { None };

        let idx = self.slot(self.len);
        self.slots[idx] = Some(event);
        self.len += 1;

        evicted
    }

    /// Applies per-event outcomes in insertion order
    ///
    /// `outcomes[i]` belongs to the `i`-th oldest event. Delivered events are
    /// dropped and the rest are compacted towards the head, preserving order.
    /// Events without an outcome (slice shorter than the buffer) were not
    /// attempted and are kept. Returns the new count.
    pub fn reconcile(&mut self, outcomes: &[StatusCode]) -> usize {
        let mut kept = 0;

        for read in 0..self.len {
            let delivered = outcomes.get(read).map_or(false, StatusCode::is_success);
            let from = self.slot(read);
            let event = self.slots[from].take();

            if !delivered {
                let to = self.slot(kept);
                self.slots[to] = event;
                kept += 1;
            }
        }

        self.len = kept;
        kept
    }

    /// Removes and returns up to `max_n` oldest events
    ///
    /// Returns `None`, leaving the buffer untouched, when fewer events than
    /// the low-water mark are held.
    pub fn extract_oldest(&mut self, max_n: usize) -> Option<heapless::Vec<Event, C>> {
        if self.len < self.low_water {
            return None;
        }

        let take = max_n.min(self.len);
        let mut out = heapless::Vec::new();
        for _ in 0..take {
            if let Some(event) = self.pop_front() {
                // take <= len <= C
                let _ = out.push(event);
            }
        }

        Some(out)
    }

    /// Puts previously extracted events back in front of the oldest one
    ///
    /// Order within `events` is preserved. Returns how many events did not fit
    /// because the buffer filled up in the meantime; those are the newest of
    /// `events`.
    pub fn restore_oldest(&mut self, events: &[Event]) -> usize {
        let fit = events.len().min(self.remaining());
        let dropped = events.len() - fit;

        for event in events[..fit].iter().rev() {
            self.head = (self.head + C - 1) % C;
            self.slots[self.head] = Some(event.clone());
            self.len += 1;
        }

        dropped
    }

    /// Event at logical index `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&Event> {
        if index >= self.len {
            return None;
        }
        self.slots[self.slot(index)].as_ref()
    }

    /// Oldest event
    pub fn oldest(&self) -> Option<&Event> {
        self.get(0)
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> RingBufferIter<'_, C> {
        RingBufferIter {
            buffer: self,
            index: 0,
        }
    }

    /// Drops every event
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    fn pop_front(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }
        let event = self.slots[self.head].take();
        self.head = (self.head + 1) % C;
        self.len -= 1;
        event
    }
}

impl<const C: usize> Default for RingBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over buffered events, oldest first
pub struct RingBufferIter<'a, const C: usize> {
    buffer: &'a RingBuffer<C>,
    index: usize,
}

impl<'a, const C: usize> Iterator for RingBufferIter<'a, C> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.buffer.get(self.index)?;
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.buffer.len().saturating_sub(self.index);
        (left, Some(left))
    }
}
