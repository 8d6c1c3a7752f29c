//! Directory-backed overflow store
//!
//! Each spill is a text file `<unix_seconds>.txt` inside one directory, one
//! encoded event per line (see [`super::codec`]). Files whose names do not
//! follow that pattern are left alone, so the directory can be shared with
//! other logs.
//!
//! ## Durability
//!
//! - New spills are created with `create_new`, so an existing spill is never
//!   overwritten; a taken key moves on to the next second.
//! - Rewrites go to `<key>.tmp` and are renamed over the original.
//! - A partially written new spill is deleted before the error is returned.
//! - A spill that cannot be loaded is renamed to `<key>.bad` when quarantined;
//!   it stays in the directory but is no longer listed.
//! - Lines that are not valid UTF-8 or fail to decode are skipped and
//!   counted, the rest of the file still loads.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fieldlink_core::store::{DirStore, OverflowStore, SpillKey};
//! use fieldlink_core::Event;
//!
//! let mut store = DirStore::open("/sd/spill")?;
//! let event = Event::measurement("2024-05-01T10:00:00 -05:00", "[]").unwrap();
//! let key = store.store(SpillKey(1_714_557_600), &[event])?;
//! assert_eq!(store.oldest()?, Some(key));
//! # Ok::<(), fieldlink_core::StoreError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::errors::{StoreError, StoreOp, StoreResult};
use crate::events::Event;

use super::codec::{decode_line, encode_line};
use super::{OverflowStore, SpillKey};

/// Statistics for the directory store
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirStoreStats {
    /// Spill files created
    pub files_written: usize,
    /// Spill files rewritten in place
    pub files_rewritten: usize,
    /// Spill files loaded
    pub files_read: usize,
    /// Spill files deleted
    pub files_removed: usize,
    /// Spill files renamed to `.bad`
    pub files_quarantined: usize,
    /// Events written across all files
    pub events_written: usize,
    /// Events loaded across all files
    pub events_read: usize,
    /// Lines skipped because they could not be decoded (including non UTF-8)
    pub parse_errors: usize,
}

/// Overflow store writing one file per spill into a directory
#[derive(Debug)]
pub struct DirStore {
    dir: PathBuf,
    stats: DirStoreStats,
}

impl DirStore {
    /// Open (and create if needed) a spill directory
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|err| io_error(StoreOp::Create, &err))?;
        Ok(Self {
            dir,
            stats: DirStoreStats::default(),
        })
    }

    /// Spill directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get statistics
    pub fn stats(&self) -> &DirStoreStats {
        &self.stats
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.stats = DirStoreStats::default();
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: SpillKey) -> PathBuf {
        self.dir.join(key.file_name().as_str())
    }

    /// Path a quarantined spill is moved to
    pub fn quarantine_path_for(&self, key: SpillKey) -> PathBuf {
        self.path_for(key).with_extension("bad")
    }

    /// Every spill key in the directory, ascending
    pub fn keys(&self) -> StoreResult<Vec<SpillKey>> {
        let entries = fs::read_dir(&self.dir).map_err(|err| io_error(StoreOp::List, &err))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(StoreOp::List, &err))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(SpillKey::from_file_name) {
                keys.push(key);
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }

    fn encode(events: &[Event]) -> (String, usize) {
        let mut text = String::new();
        let mut count = 0;
        for event in events.iter().filter(|e| !e.is_empty()) {
            // Writing into a String cannot fail
            let _ = encode_line(event, &mut text);
            text.push('\n');
            count += 1;
        }
        (text, count)
    }

    fn write_all(file: &mut File, text: &str) -> io::Result<()> {
        file.write_all(text.as_bytes())?;
        file.flush()
    }
}

impl OverflowStore for DirStore {
    fn store(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<SpillKey> {
        let (text, count) = Self::encode(events);

        let requested = key;
        let mut key = key;
        let (mut file, path) = loop {
            let path = self.path_for(key);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file, path),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    key = key.next().ok_or(StoreError::KeysExhausted { from: requested.0 })?;
                }
                Err(err) => return Err(io_error(StoreOp::Create, &err)),
            }
        };

        if let Err(err) = Self::write_all(&mut file, &text) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(io_error(StoreOp::Write, &err));
        }

        self.stats.files_written += 1;
        self.stats.events_written += count;
        log_debug!("Spilled {} events to {}", count, path.display());
        Ok(key)
    }

    fn rewrite(&mut self, key: SpillKey, events: &[Event]) -> StoreResult<()> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(StoreError::NotFound { key: key.0 });
        }

        let (text, count) = Self::encode(events);
        let tmp = path.with_extension("tmp");

        let written = File::create(&tmp)
            .and_then(|mut file| Self::write_all(&mut file, &text))
            .and_then(|_| fs::rename(&tmp, &path));
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(StoreOp::Write, &err));
        }

        self.stats.files_rewritten += 1;
        self.stats.events_written += count;
        Ok(())
    }

    fn load(&mut self, key: SpillKey, into: &mut [Event]) -> StoreResult<usize> {
        let bytes = fs::read(self.path_for(key)).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound { key: key.0 }
            } else {
                io_error(StoreOp::Read, &err)
            }
        })?;

        let capacity = into.len();
        let mut count = 0;
        for raw in bytes.split(|&b| b == b'\n') {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }
            let Ok(line) = std::str::from_utf8(raw) else {
                self.stats.parse_errors += 1;
                log_warn!("Skipping non UTF-8 spill line in {}", key.0);
                continue;
            };

            match decode_line(line) {
                Ok(event) => {
                    let slot = into
                        .get_mut(count)
                        .ok_or(StoreError::BatchTooLarge { capacity })?;
                    *slot = event;
                    count += 1;
                }
                Err(err) => {
                    self.stats.parse_errors += 1;
                    log_warn!("Skipping spill line in {}: {}", key.0, err);
                }
            }
        }

        self.stats.files_read += 1;
        self.stats.events_read += count;
        Ok(count)
    }

    fn find_extreme(&mut self, newest: bool) -> StoreResult<Option<SpillKey>> {
        let keys = self.keys()?;
        Ok(if newest { keys.last().copied() } else { keys.first().copied() })
    }

    fn remove(&mut self, key: SpillKey) -> StoreResult<()> {
        fs::remove_file(self.path_for(key)).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound { key: key.0 }
            } else {
                io_error(StoreOp::Remove, &err)
            }
        })?;
        self.stats.files_removed += 1;
        Ok(())
    }

    fn quarantine(&mut self, key: SpillKey) -> StoreResult<()> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(StoreError::NotFound { key: key.0 });
        }

        let bad = self.quarantine_path_for(key);
        fs::rename(&path, &bad).map_err(|err| io_error(StoreOp::Quarantine, &err))?;
        self.stats.files_quarantined += 1;
        log_warn!("Spill {} set aside as {}", key.0, bad.display());
        Ok(())
    }
}

fn io_error(op: StoreOp, err: &io::Error) -> StoreError {
    log_warn!("Spill storage {} failed: {}", op, err);
    StoreError::Io { op }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatusCode;
    use tempfile::TempDir;

    fn event(i: usize) -> Event {
        Event::new(
            crate::events::EventKind::Measurement,
            StatusCode(500),
            "2024-05-01T10:00:00 -05:00",
            &format!("[{}]", i),
        )
        .unwrap()
    }

    #[test]
    fn creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("spill");
        let store = DirStore::open(&dir).unwrap();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn file_contents_are_one_line_per_event() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let key = store
            .store(SpillKey(100), &[event(0), Event::default(), event(1)])
            .unwrap();

        let text = fs::read_to_string(store.path_for(key)).unwrap();
        assert_eq!(
            text,
            "M|500|2024-05-01T10:00:00 -05:00|[0]\nM|500|2024-05-01T10:00:00 -05:00|[1]\n"
        );
        assert_eq!(store.stats().events_written, 2);
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        fs::write(
            tmp.path().join("100.txt"),
            "M|500||[0]\ngarbage\n\nC|503||{\"error\":\"x\"}\n",
        )
        .unwrap();

        let mut into: [Event; 3] = Default::default();
        assert_eq!(store.load(SpillKey(100), &mut into).unwrap(), 2);
        assert_eq!(store.stats().parse_errors, 1);
        assert_eq!(into[1].outcome(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_utf8_lines_do_not_hide_the_rest() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let mut bytes = b"M|500||[0]\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"M|500||[2]\r\n");
        fs::write(tmp.path().join("100.txt"), bytes).unwrap();

        let mut into: [Event; 3] = Default::default();
        assert_eq!(store.load(SpillKey(100), &mut into).unwrap(), 2);
        assert_eq!(into[0].payload(), "[0]");
        assert_eq!(into[1].payload(), "[2]");
        assert_eq!(store.stats().parse_errors, 1);
    }

    #[test]
    fn quarantined_spills_are_no_longer_listed() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        store.store(SpillKey(1), &[event(0)]).unwrap();
        store.store(SpillKey(2), &[event(1)]).unwrap();

        store.quarantine(SpillKey(1)).unwrap();
        assert_eq!(store.keys().unwrap(), vec![SpillKey(2)]);
        assert!(tmp.path().join("1.bad").is_file());
        assert_eq!(store.stats().files_quarantined, 1);
        assert_eq!(store.quarantine(SpillKey(1)), Err(StoreError::NotFound { key: 1 }));
    }

    #[test]
    fn store_stops_at_last_key() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let max = SpillKey(u64::MAX);
        assert_eq!(store.store(max, &[event(0)]).unwrap(), max);
        assert_eq!(
            store.store(max, &[event(1)]),
            Err(StoreError::KeysExhausted { from: u64::MAX })
        );
        assert_eq!(store.keys().unwrap(), vec![max]);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let key = store.store(SpillKey(5), &[event(0), event(1), event(2)]).unwrap();
        store.rewrite(key, &[Event::default(), event(1), Event::default()]).unwrap();

        let mut into: [Event; 3] = Default::default();
        assert_eq!(store.load(key, &mut into).unwrap(), 1);
        assert_eq!(into[0], event(1));
        assert!(!tmp.path().join("5.tmp").exists());
    }

    #[test]
    fn missing_spills_report_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        let mut into: [Event; 3] = Default::default();
        assert_eq!(store.load(SpillKey(9), &mut into), Err(StoreError::NotFound { key: 9 }));
        assert_eq!(store.remove(SpillKey(9)), Err(StoreError::NotFound { key: 9 }));
        assert_eq!(store.rewrite(SpillKey(9), &[]), Err(StoreError::NotFound { key: 9 }));
    }
}
