//! Skip list memtable index.
//!
//! Nodes live in a flat arena (`Vec<Node>`); forward links are node
//! indices, never pointers or back-links. Level 0 is the dense bottom
//! level; height is capped at construction to
//! `floor(log2(memtable_capacity))`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SkipListError;

const NIL: usize = usize::MAX;

struct Node {
    key: String,
    /// Leading byte `b'0'`/`b'1'` is the tombstone marker.
    value: Vec<u8>,
    /// `forward[level]` is the arena index of the next node at that level,
    /// or `NIL` at the end of the chain.
    forward: Vec<usize>,
}

impl Node {
    fn tombstone(&self) -> bool {
        self.value.first() == Some(&b'1')
    }
}

/// A reference to a node discovered by [`SkipList::find`].
pub struct FoundNode<'a> {
    pub key: &'a str,
    pub value: &'a [u8],
}

/// Multi-level linked sorted list keyed by string.
pub struct SkipList {
    nodes: Vec<Node>,
    /// `heads[level]` is the arena index of that level's first node.
    heads: Vec<usize>,
    tail: usize,
    height: usize,
    max_height: usize,
    len: usize,
    rng: StdRng,
}

impl SkipList {
    /// `max_height = floor(log2(memtable_capacity))`, at least 1.
    pub fn new(memtable_capacity: usize) -> Self {
        let max_height = (memtable_capacity.max(2) as f64).log2().floor() as usize;
        SkipList {
            nodes: Vec::new(),
            heads: vec![NIL],
            tail: NIL,
            height: 1,
            max_height: max_height.max(1),
            len: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// The first key in level-0 order, if any.
    pub fn head(&self) -> Option<&str> {
        let idx = *self.heads.first()?;
        (idx != NIL).then(|| self.nodes[idx].key.as_str())
    }

    /// The last key in level-0 order, if any.
    pub fn tail(&self) -> Option<&str> {
        (self.tail != NIL).then(|| self.nodes[self.tail].key.as_str())
    }

    /// Walks the descent path: for each level from top to 0, the index of
    /// the last node whose key is strictly less than `key` (or `NIL` if
    /// none — meaning `key` would be the new head at that level).
    fn descend(&self, key: &str) -> Vec<usize> {
        let mut path = vec![NIL; self.height];
        let mut level = self.height - 1;
        let mut current = NIL;
        loop {
            let mut next = if current == NIL {
                self.heads[level]
            } else {
                self.nodes[current].forward[level]
            };
            while next != NIL && self.nodes[next].key.as_str() < key {
                current = next;
                next = self.nodes[current].forward[level];
            }
            path[level] = current;
            if level == 0 {
                break;
            }
            level -= 1;
        }
        path
    }

    /// Inserts or updates `key` with `value`. On key collision, the value
    /// is replaced in place and `len` is unchanged.
    pub fn add(&mut self, key: &str, value: Vec<u8>) {
        let path = self.descend(key);
        let successor = |node: usize, level: usize| -> usize {
            if node == NIL {
                self.heads[level]
            } else {
                self.nodes[node].forward[level]
            }
        };
        let existing = successor(path[0], 0);
        if existing != NIL && self.nodes[existing].key == key {
            self.nodes[existing].value = value;
            return;
        }

        let mut new_height = 1;
        while new_height < self.max_height && self.rng.random_bool(0.5) {
            new_height += 1;
        }
        while new_height > self.height {
            self.heads.push(NIL);
            self.height += 1;
        }

        let idx = self.nodes.len();
        self.nodes.push(Node {
            key: key.to_string(),
            value,
            forward: vec![NIL; new_height],
        });

        for level in 0..new_height {
            let pred = if level < path.len() { path[level] } else { NIL };
            if pred == NIL {
                self.nodes[idx].forward[level] = self.heads[level];
                self.heads[level] = idx;
            } else {
                self.nodes[idx].forward[level] = self.nodes[pred].forward[level];
                self.nodes[pred].forward[level] = idx;
            }
        }

        if self.nodes[idx].forward[0] == NIL {
            self.tail = idx;
        }
        self.len += 1;
    }

    /// Removes `key`, unlinking it at every level it appears. Shrinks
    /// `height` if it was the sole tenant of the top level, and reassigns
    /// `tail` if it was the last node.
    pub fn delete(&mut self, key: &str) -> Result<(), SkipListError> {
        let path = self.descend(key);
        let target = if path[0] == NIL {
            self.heads[0]
        } else {
            self.nodes[path[0]].forward[0]
        };
        if target == NIL || self.nodes[target].key != key {
            return Err(SkipListError::KeyNotPresent);
        }

        let target_height = self.nodes[target].forward.len();
        for level in 0..target_height {
            let pred = if level < path.len() { path[level] } else { NIL };
            let next = self.nodes[target].forward[level];
            if pred == NIL {
                self.heads[level] = next;
            } else {
                self.nodes[pred].forward[level] = next;
            }
        }

        if self.tail == target {
            self.tail = path.first().copied().unwrap_or(NIL);
            if self.tail == NIL {
                // find new tail by walking level 0 from the head
                let mut cur = self.heads[0];
                let mut last = NIL;
                while cur != NIL {
                    last = cur;
                    cur = self.nodes[cur].forward[0];
                }
                self.tail = last;
            }
        }

        while self.height > 1 && self.heads[self.height - 1] == NIL {
            self.heads.pop();
            self.height -= 1;
        }

        self.len -= 1;
        Ok(())
    }

    /// Returns the node matching `key`, unless its tombstone byte is set.
    pub fn find(&self, key: &str) -> Option<FoundNode<'_>> {
        let path = self.descend(key);
        let candidate = if path[0] == NIL {
            self.heads[0]
        } else {
            self.nodes[path[0]].forward[0]
        };
        if candidate == NIL || self.nodes[candidate].key != key {
            return None;
        }
        let node = &self.nodes[candidate];
        if node.tombstone() {
            return None;
        }
        Some(FoundNode {
            key: &node.key,
            value: &node.value,
        })
    }

    /// Like [`find`](Self::find), but reports a tombstoned entry instead
    /// of hiding it. Used by the engine's read path, which must tell
    /// "deleted" apart from "absent" to mask a stale lower layer rather
    /// than falling through to it.
    pub fn lookup_raw(&self, key: &str) -> Option<(bool, &[u8])> {
        let path = self.descend(key);
        let candidate = if path[0] == NIL {
            self.heads[0]
        } else {
            self.nodes[path[0]].forward[0]
        };
        if candidate == NIL || self.nodes[candidate].key != key {
            return None;
        }
        let node = &self.nodes[candidate];
        Some((node.tombstone(), &node.value[1..]))
    }

    /// The level-0 chain in ascending key order, including tombstoned
    /// entries — used by the memtable when it reports a flush sequence,
    /// since flushed records must preserve tombstones.
    pub fn level0_entries(&self) -> Vec<(&str, &[u8])> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.heads[0];
        while cur != NIL {
            let node = &self.nodes[cur];
            out.push((node.key.as_str(), node.value.as_slice()));
            cur = node.forward[0];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(v: &str) -> Vec<u8> {
        // tombstone byte '0' followed by payload
        let mut buf = vec![b'0'];
        buf.extend_from_slice(v.as_bytes());
        buf
    }

    fn tombstone() -> Vec<u8> {
        vec![b'1']
    }

    #[test]
    fn ascending_order_on_level0() {
        let mut sl = SkipList::new(16);
        for k in ["d", "b", "a", "c"] {
            sl.add(k, val(k));
        }
        let keys: Vec<&str> = sl.level0_entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn add_on_collision_replaces_value_in_place() {
        let mut sl = SkipList::new(16);
        sl.add("a", val("1"));
        sl.add("a", val("2"));
        assert_eq!(sl.len(), 1);
        assert_eq!(sl.find("a").unwrap().value, val("2"));
    }

    #[test]
    fn find_hides_tombstoned_entries() {
        let mut sl = SkipList::new(16);
        sl.add("a", val("1"));
        sl.add("a", tombstone());
        assert!(sl.find("a").is_none());
    }

    #[test]
    fn find_returns_none_for_missing_key() {
        let sl = SkipList::new(16);
        assert!(sl.find("missing").is_none());
    }

    #[test]
    fn delete_removes_key_and_reports_not_present_on_repeat() {
        let mut sl = SkipList::new(16);
        sl.add("a", val("1"));
        sl.add("b", val("2"));
        sl.delete("a").unwrap();
        assert!(sl.find("a").is_none());
        assert_eq!(sl.len(), 1);
        assert!(matches!(sl.delete("a"), Err(SkipListError::KeyNotPresent)));
    }

    #[test]
    fn head_and_tail_track_extremes() {
        let mut sl = SkipList::new(16);
        sl.add("m", val("1"));
        sl.add("a", val("2"));
        sl.add("z", val("3"));
        assert_eq!(sl.head(), Some("a"));
        assert_eq!(sl.tail(), Some("z"));
    }

    #[test]
    fn deleting_tail_reassigns_tail_to_predecessor() {
        let mut sl = SkipList::new(16);
        sl.add("a", val("1"));
        sl.add("b", val("2"));
        sl.add("c", val("3"));
        sl.delete("c").unwrap();
        assert_eq!(sl.tail(), Some("b"));
    }

    #[test]
    fn height_never_exceeds_cap() {
        let mut sl = SkipList::new(16); // floor(log2(16)) = 4
        for i in 0..200 {
            sl.add(&format!("k{i:04}"), val("x"));
        }
        assert!(sl.height() <= 4);
    }
}
