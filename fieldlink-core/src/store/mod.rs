//! Persistent Overflow Store
//!
//! When the ring buffer nears saturation its oldest events are spilled to
//! persistent storage (an SD card on the device, a directory on a gateway)
//! and replayed later. Each spill is a small batch stored under a
//! [`SpillKey`], the unix second of its oldest event.
//!
//! ## Implementations
//!
//! | Store           | Feature | Backing                                 |
//! |-----------------|---------|-----------------------------------------|
//! | [`DirStore`]    | `std`   | One `<key>.txt` file per spill          |
//! | [`MemoryStore`] | none    | Fixed table of batches, for tests/RAM   |
//!
//! ## Spill File Format
//!
//! One event per line, see [`codec`]:
//!
//! ```text
//! M|500|2024-05-01T10:00:00 -05:00|[{"variable": "...", "value": 23.46, ...}]
//! C|503||{"error":"Connection failed"}
//! ```

use core::fmt::Write as _;

use crate::errors::StoreResult;
use crate::events::Event;
use crate::time::{unix_seconds, TimeSource};

pub mod codec;
#[cfg(feature = "std")]
pub mod file;
pub mod memory;

#[cfg(feature = "std")]
pub use file::{DirStore, DirStoreStats};
pub use memory::MemoryStore;

/// File name suffix for spill files
pub const SPILL_EXTENSION: &str = ".txt";

/// Identifies one spill: unix seconds of its oldest event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpillKey(pub u64);

impl SpillKey {
    /// Raw seconds value
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Following key, used to avoid overwriting an existing spill
    ///
    /// `None` at `u64::MAX`.
    pub const fn next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(secs) => Some(SpillKey(secs)),
            None => None,
        }
    }

    /// `<secs>.txt`
    pub fn file_name(&self) -> heapless::String<24> {
        let mut name = heapless::String::new();
        // u64::MAX has 20 digits, plus 4 for the extension
        let _ = write!(name, "{}{}", self.0, SPILL_EXTENSION);
        name
    }

    /// Parses `<secs>.txt`; anything else is not a spill file
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(SPILL_EXTENSION)?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(SpillKey)
    }
}

/// Key for a batch about to be spilled
///
/// Uses the timestamp of the first non-empty event; falls back to the clock
/// (in seconds) when that timestamp is missing or unparsable.
pub fn spill_key_for<T: TimeSource + ?Sized>(events: &[Event], clock: &T) -> SpillKey {
    events
        .iter()
        .find(|event| !event.is_empty())
        .and_then(|event| unix_seconds(event.timestamp()))
        .map(SpillKey)
        .unwrap_or_else(|| SpillKey(clock.now() / crate::constants::time::MS_PER_SECOND))
}

/// Persistent storage for spilled event batches
///
/// Empty events are never persisted. Stores must be lossless: `load` after
/// `store` reproduces every non-empty event exactly, in order.
pub trait OverflowStore {
    /// Persist a new spill
    ///
    /// Never overwrites: when `key` is taken the next free key is used, and
    /// `KeysExhausted` is returned when there is none. Returns the key
    /// actually written.
    fn store(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<SpillKey>;

    /// Replace the contents of an existing spill
    fn rewrite(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<()>;

    /// Read a spill into `into`, returning how many events were loaded
    ///
    /// Fails with `BatchTooLarge` when the spill holds more events than
    /// `into` has room for.
    fn load(&mut self, key: SpillKey, into: &mut [Event]) -> StoreResult<usize>;

    /// Oldest (`newest == false`) or newest spill, if any
    fn find_extreme(&mut self, newest: bool) -> StoreResult<Option<SpillKey>>;

    /// Delete a spill
    fn remove(&mut self, key: SpillKey) -> StoreResult<()>;

    /// Set aside a spill that cannot be loaded
    ///
    /// Afterwards the key is no longer listed by `find_extreme`. Stores that
    /// can keep the data for inspection should do so.
    fn quarantine(&mut self, key: SpillKey) -> StoreResult<()>;

    /// Oldest spill, if any
    fn oldest(&mut self) -> StoreResult<Option<SpillKey>> {
        self.find_extreme(false)
    }

    /// Newest spill, if any
    fn newest(&mut self) -> StoreResult<Option<SpillKey>> {
        self.find_extreme(true)
    }
}

impl<S: OverflowStore + ?Sized> OverflowStore for &mut S {
    fn store(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<SpillKey> {
        (**self).store(key, events)
    }

    fn rewrite(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<()> {
        (**self).rewrite(key, events)
    }

    fn load(&mut self, key: SpillKey, into: &mut [Event]) -> StoreResult<usize> {
        (**self).load(key, into)
    }

    fn find_extreme(&mut self, newest: bool) -> StoreResult<Option<SpillKey>> {
        (**self).find_extreme(newest)
    }

    fn remove(&mut self, key: SpillKey) -> StoreResult<()> {
        (**self).remove(key)
    }

    fn quarantine(&mut self, key: SpillKey) -> StoreResult<()> {
        (**self).quarantine(key)
    }
}
