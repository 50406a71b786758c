//! Skip-list-backed memtable.
//!
//! Wraps a [`SkipList`] with a capacity `C`. An insertion that brings the
//! skip list to exactly `C` entries reports a [`FlushBatch`] — the
//! flattened level-0 chain plus head/tail — and resets the skip list to
//! empty. This is how the memtable tells the engine "flush me" without
//! touching I/O itself.

use crate::error::SkipListError;
use crate::skiplist::SkipList;
use crate::sstable::FlushEntry;

/// What the memtable hands back when an insertion just reached capacity.
pub struct FlushBatch {
    pub entries: Vec<FlushEntry>,
    pub head: String,
    pub tail: String,
}

pub struct Memtable {
    skiplist: SkipList,
    capacity: u64,
}

impl Memtable {
    pub fn new(capacity: u64) -> Self {
        Memtable {
            skiplist: SkipList::new(capacity as usize),
            capacity,
        }
    }

    pub fn len(&self) -> u64 {
        self.skiplist.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.skiplist.is_empty()
    }

    /// Inserts `key` with `value`, tombstone already resolved by the
    /// caller. Returns `Some(FlushBatch)` iff this insertion brought the
    /// skip list to exactly `capacity` entries, in which case the skip
    /// list is reset to a fresh, empty one of the same capacity.
    pub fn put(&mut self, key: &str, value: &[u8], tombstone: bool) -> Option<FlushBatch> {
        let mut prefixed = Vec::with_capacity(value.len() + 1);
        prefixed.push(if tombstone { b'1' } else { b'0' });
        prefixed.extend_from_slice(value);
        self.skiplist.add(key, prefixed);

        if self.skiplist.len() as u64 != self.capacity {
            return None;
        }

        let head = self.skiplist.head().unwrap_or_default().to_string();
        let tail = self.skiplist.tail().unwrap_or_default().to_string();
        let entries = self
            .skiplist
            .level0_entries()
            .into_iter()
            .map(|(key, value)| FlushEntry {
                key: key.to_string(),
                tombstone: value.first() == Some(&b'1'),
                value: value[1..].to_vec(),
            })
            .collect();

        self.skiplist = SkipList::new(self.capacity as usize);
        Some(FlushBatch { entries, head, tail })
    }

    pub fn delete(&mut self, key: &str) -> Result<(), SkipListError> {
        self.skiplist.delete(key)
    }

    /// Looks up `key`, honoring tombstones. The returned slice is the
    /// payload with the leading tombstone-marker byte stripped.
    pub fn find(&self, key: &str) -> Option<&[u8]> {
        self.skiplist.find(key).map(|n| &n.value[1..])
    }

    /// Like [`find`](Self::find), but distinguishes "tombstoned" from
    /// "absent" — the engine's read path needs this to stop at a delete
    /// instead of falling through to the cache or an SSTable.
    pub fn lookup(&self, key: &str) -> Lookup<'_> {
        match self.skiplist.lookup_raw(key) {
            Some((true, _)) => Lookup::Tombstoned,
            Some((false, value)) => Lookup::Found(value),
            None => Lookup::Absent,
        }
    }
}

/// Result of [`Memtable::lookup`].
pub enum Lookup<'a> {
    Found(&'a [u8]),
    Tombstoned,
    Absent,
}
