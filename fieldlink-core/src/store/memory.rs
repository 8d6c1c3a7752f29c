//! In-memory overflow store
//!
//! Fixed table of `FILES` spills of up to `PER_FILE` events each. Used by
//! tests and by RAM-only boards that accept losing spills on power loss.

use crate::errors::{StoreError, StoreOp, StoreResult};
use crate::events::Event;

use super::{OverflowStore, SpillKey};

#[derive(Debug, Clone)]
struct Spill<const PER_FILE: usize> {
    key: SpillKey,
    events: heapless::Vec<Event, PER_FILE>,
}

/// Heapless overflow store
#[derive(Debug, Clone)]
pub struct MemoryStore<const FILES: usize, const PER_FILE: usize> {
    spills: heapless::Vec<Spill<PER_FILE>, FILES>,
    quarantined: usize,
    unreadable: Option<SpillKey>,
    fail_writes: bool,
}

impl<const FILES: usize, const PER_FILE: usize> MemoryStore<FILES, PER_FILE> {
    pub fn new() -> Self {
        Self {
            spills: heapless::Vec::new(),
            quarantined: 0,
            unreadable: None,
            fail_writes: false,
        }
    }

    /// Make every `store`/`rewrite` fail with a write error
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make `load` of `key` fail with a read error
    pub fn set_unreadable(&mut self, key: Option<SpillKey>) {
        self.unreadable = key;
    }

    /// Spills dropped by `quarantine`
    pub fn quarantined(&self) -> usize {
        self.quarantined
    }

    /// Number of spills held
    pub fn len(&self) -> usize {
        self.spills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spills.is_empty()
    }

    /// Events of a spill, without going through `load`
    pub fn peek(&self, key: SpillKey) -> Option<&[Event]> {
        self.position(key).map(|i| self.spills[i].events.as_slice())
    }

    fn position(&self, key: SpillKey) -> Option<usize> {
        self.spills.iter().position(|spill| spill.key == key)
    }

    fn collect(events: &[Event]) -> StoreResult<heapless::Vec<Event, PER_FILE>> {
        let mut kept = heapless::Vec::new();
        for event in events.iter().filter(|e| !e.is_empty()) {
            kept.push(event.clone())
                .map_err(|_| StoreError::BatchTooLarge { capacity: PER_FILE })?;
        }
        Ok(kept)
    }
}

impl<const FILES: usize, const PER_FILE: usize> Default for MemoryStore<FILES, PER_FILE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FILES: usize, const PER_FILE: usize> OverflowStore for MemoryStore<FILES, PER_FILE> {
    fn store(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<SpillKey> {
        if self.fail_writes {
            return Err(StoreError::Io { op: StoreOp::Write });
        }

        let events = Self::collect(events)?;
        let requested = key;
        let mut key = key;
        while self.position(key).is_some() {
            key = key.next().ok_or(StoreError::KeysExhausted { from: requested.0 })?;
        }

        self.spills
            .push(Spill { key, events })
            .map_err(|_| StoreError::Full)?;
        Ok(key)
    }

    fn rewrite(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::Io { op: StoreOp::Write });
        }

        let idx = self.position(key).ok_or(StoreError::NotFound { key: key.0 })?;
        self.spills[idx].events = Self::collect(events)?;
        Ok(())
    }

    fn load(&mut self, key: SpillKey, into: &mut [Event]) -> StoreResult<usize> {
        let idx = self.position(key).ok_or(StoreError::NotFound { key: key.0 })?;
        if self.unreadable == Some(key) {
            return Err(StoreError::Io { op: StoreOp::Read });
        }
        let events = &self.spills[idx].events;
        if events.len() > into.len() {
            return Err(StoreError::BatchTooLarge { capacity: into.len() });
        }

        for (slot, event) in into.iter_mut().zip(events.iter()) {
            *slot = event.clone();
        }
        Ok(events.len())
    }

    fn find_extreme(&mut self, newest: bool) -> StoreResult<Option<SpillKey>> {
        let keys = self.spills.iter().map(|spill| spill.key);
        Ok(if newest { keys.max() } else { keys.min() })
    }

    fn remove(&mut self, key: SpillKey) -> StoreResult<()> {
        let idx = self.position(key).ok_or(StoreError::NotFound { key: key.0 })?;
        self.spills.swap_remove(idx);
        Ok(())
    }

    /// RAM has nowhere to keep a bad spill, so it is dropped
    fn quarantine(&mut self, key: SpillKey) -> StoreResult<()> {
        self.remove(key)?;
        self.quarantined += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(i: usize) -> Event {
        Event::measurement("", &format!("[{}]", i)).unwrap()
    }

    #[test]
    fn store_never_overwrites() {
        let mut store = MemoryStore::<4, 3>::new();
        let first = store.store(SpillKey(10), &[event(0)]).unwrap();
        let second = store.store(SpillKey(10), &[event(1)]).unwrap();
        assert_eq!(first, SpillKey(10));
        assert_eq!(second, SpillKey(11));
        assert_eq!(store.peek(first).unwrap()[0], event(0));
    }

    #[test]
    fn empty_events_are_not_stored() {
        let mut store = MemoryStore::<4, 3>::new();
        let key = store.store(SpillKey(1), &[Event::default(), event(1)]).unwrap();

        let mut into: [Event; 3] = Default::default();
        assert_eq!(store.load(key, &mut into).unwrap(), 1);
        assert_eq!(into[0], event(1));
    }

    #[test]
    fn extremes_and_removal() {
        let mut store = MemoryStore::<4, 3>::new();
        assert_eq!(store.oldest().unwrap(), None);
        store.store(SpillKey(30), &[event(0)]).unwrap();
        store.store(SpillKey(10), &[event(1)]).unwrap();
        store.store(SpillKey(20), &[event(2)]).unwrap();

        assert_eq!(store.oldest().unwrap(), Some(SpillKey(10)));
        assert_eq!(store.newest().unwrap(), Some(SpillKey(30)));

        store.remove(SpillKey(10)).unwrap();
        assert_eq!(store.oldest().unwrap(), Some(SpillKey(20)));
        assert_eq!(store.remove(SpillKey(10)), Err(StoreError::NotFound { key: 10 }));
    }

    #[test]
    fn store_stops_at_last_key() {
        let mut store = MemoryStore::<4, 3>::new();
        store.store(SpillKey(u64::MAX), &[event(0)]).unwrap();
        assert_eq!(
            store.store(SpillKey(u64::MAX - 1), &[event(1)]).unwrap(),
            SpillKey(u64::MAX - 1)
        );
        assert_eq!(
            store.store(SpillKey(u64::MAX - 1), &[event(2)]),
            Err(StoreError::KeysExhausted { from: u64::MAX - 1 })
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unreadable_spill_can_be_quarantined() {
        let mut store = MemoryStore::<4, 3>::new();
        store.store(SpillKey(1), &[event(0)]).unwrap();
        store.store(SpillKey(2), &[event(1)]).unwrap();
        store.set_unreadable(Some(SpillKey(1)));

        let mut into: [Event; 3] = Default::default();
        assert_eq!(store.load(SpillKey(1), &mut into), Err(StoreError::Io { op: StoreOp::Read }));
        store.quarantine(SpillKey(1)).unwrap();
        assert_eq!(store.oldest().unwrap(), Some(SpillKey(2)));
        assert_eq!(store.quarantined(), 1);
    }

    #[test]
    fn load_rejects_small_target() {
        let mut store = MemoryStore::<4, 3>::new();
        let key = store.store(SpillKey(1), &[event(0), event(1)]).unwrap();
        let mut into: [Event; 1] = Default::default();
        assert_eq!(store.load(key, &mut into), Err(StoreError::BatchTooLarge { capacity: 1 }));
    }

    #[test]
    fn failure_injection_and_capacity() {
        let mut store = MemoryStore::<1, 3>::new();
        store.set_fail_writes(true);
        assert_eq!(
            store.store(SpillKey(1), &[event(0)]),
            Err(StoreError::Io { op: StoreOp::Write })
        );
        store.set_fail_writes(false);
        store.store(SpillKey(1), &[event(0)]).unwrap();
        assert_eq!(store.store(SpillKey(2), &[event(1)]), Err(StoreError::Full));
    }
}
