//! Write-ahead log.
//!
//! A WAL is a directory of segment files `wal_0001.log, wal_0002.log, …`.
//! Every mutation is appended to the active segment before the memtable is
//! touched — this is the engine's only durability anchor.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::codec::{decode_record, encode_record, Record};
use crate::error::WalError;

const SEGMENT_PREFIX: &str = "wal_";
const SEGMENT_SUFFIX: &str = ".log";
const MAX_SEGMENT: u32 = 9999;

fn segment_name(n: u32) -> String {
    format!("{SEGMENT_PREFIX}{n:04}{SEGMENT_SUFFIX}")
}

fn segment_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    digits.parse().ok()
}

/// Segmented append-only log under `root/Wal`.
pub struct Wal {
    dir: PathBuf,
    active_segment: u32,
    record_count: u64,
    segment_capacity: u64,
}

impl Wal {
    /// Opens (creating if absent) the WAL directory under `root`, resuming
    /// at the highest-numbered existing segment.
    pub fn open(root: impl AsRef<Path>, segment_capacity: u64) -> Result<Self, WalError> {
        let dir = root.as_ref().join("Wal");
        fs::create_dir_all(&dir)?;

        let mut active_segment = 1;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str().and_then(segment_number) {
                active_segment = active_segment.max(name);
            }
        }

        let record_count = Self::count_records(&dir.join(segment_name(active_segment)))?;

        Ok(Wal {
            dir,
            active_segment,
            record_count,
            segment_capacity,
        })
    }

    fn count_records(path: &Path) -> Result<u64, WalError> {
        if !path.exists() {
            return Ok(0);
        }
        let bytes = fs::read(path)?;
        let mut count = 0u64;
        let mut offset = 0;
        while offset < bytes.len() {
            match decode_record(&bytes[offset..]) {
                Some((_, consumed)) => {
                    offset += consumed;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(segment_name(self.active_segment))
    }

    /// Appends one record to the active segment, rolling to a new segment
    /// first if the active one is already at capacity. The only fatal
    /// write path in the core.
    pub fn append(&mut self, key: &str, value: &[u8], tombstone: bool, timestamp: i64) -> Result<(), WalError> {
        if self.record_count >= self.segment_capacity {
            self.roll_segment()?;
        }

        let record = encode_record(key, value, tombstone, timestamp);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.active_path())?;
        file.write_all(&record)?;
        self.record_count += 1;
        trace!(key, tombstone, segment = self.active_segment, "WAL append");
        Ok(())
    }

    fn roll_segment(&mut self) -> Result<(), WalError> {
        let next = self.active_segment + 1;
        if next > MAX_SEGMENT {
            return Err(WalError::SegmentOverflow);
        }
        self.active_segment = next;
        self.record_count = 0;
        debug!(segment = next, "WAL rolled to new segment");
        Ok(())
    }

    /// Rebuilds an ordered `(key, value, tombstone, timestamp)` sequence
    /// from the most-recently-modified segment only; earlier segments are
    /// not replayed.
    pub fn read_from_last_segment(&mut self) -> Result<Vec<Record>, WalError> {
        let mut latest: Option<(PathBuf, std::time::SystemTime)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if latest.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
                latest = Some((entry.path(), modified));
            }
        }

        let Some((path, _)) = latest else {
            return Ok(Vec::new());
        };

        let mut file = File::open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match decode_record(&bytes[offset..]) {
                Some((record, consumed)) => {
                    offset += consumed;
                    records.push(record);
                }
                None => {
                    return Err(WalError::Corrupt(format!(
                        "truncated record in {}",
                        path.display()
                    )))
                }
            }
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()).and_then(segment_number) {
            self.active_segment = name;
        }
        self.record_count = records.len() as u64;
        debug!(segment = self.active_segment, records = records.len(), "recovered WAL segment");
        Ok(records)
    }

    /// Deletes every segment file and resets to `wal_0001.log`, 0 records
    /// — called after a successful flush.
    pub fn remove_all_segments(&mut self) -> Result<(), WalError> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), %err, "failed to remove WAL segment");
                return Err(err.into());
            }
        }
        self.active_segment = 1;
        self.record_count = 0;
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool, WalError> {
        let mut entries = fs::read_dir(&self.dir)?;
        Ok(entries.next().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_recover_round_trips_records() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 10).unwrap();
        wal.append("a", b"1", false, 100).unwrap();
        wal.append("b", b"2", false, 101).unwrap();

        let records = wal.read_from_last_segment().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "a");
        assert_eq!(records[1].key, "b");
    }

    #[test]
    fn rolls_segment_at_capacity() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 2).unwrap();
        wal.append("a", b"1", false, 1).unwrap();
        wal.append("b", b"2", false, 2).unwrap();
        wal.append("c", b"3", false, 3).unwrap(); // triggers roll
        assert_eq!(wal.active_segment, 2);
        assert_eq!(wal.record_count, 1);
    }

    #[test]
    fn remove_all_segments_resets_state() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 10).unwrap();
        wal.append("a", b"1", false, 1).unwrap();
        wal.remove_all_segments().unwrap();
        assert!(wal.is_empty().unwrap());
        assert_eq!(wal.active_segment, 1);
        assert_eq!(wal.record_count, 0);
    }

    #[test]
    fn reopen_resumes_at_highest_existing_segment() {
        let dir = tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path(), 1).unwrap();
            wal.append("a", b"1", false, 1).unwrap();
            wal.append("b", b"2", false, 2).unwrap(); // rolls to segment 2
        }
        let wal = Wal::open(dir.path(), 1).unwrap();
        assert_eq!(wal.active_segment, 2);
    }
}
