//! Count-Min Sketch frequency estimator.
//!
//! The sketch itself is the well-known standard construction. File layout:
//! `[d: u32 ‖ w: u32]` followed by `d*w` little-endian `u64` counters in
//! row-major order.

use std::io::Cursor;

/// A `d`-by-`w` frequency-estimation sketch keyed by seeded Murmur3-32
/// hashes, one independent hash per row.
pub struct CountMinSketch {
    d: u32,
    w: u32,
    table: Vec<Vec<u64>>,
}

impl CountMinSketch {
    pub fn new(d: u32, w: u32) -> Self {
        CountMinSketch {
            d,
            w,
            table: vec![vec![0u64; w as usize]; d as usize],
        }
    }

    /// Sizes `(d, w)` from an error bound `epsilon` and failure
    /// probability `delta`: `w = ceil(e/epsilon)`, `d = ceil(ln(e/delta))`.
    pub fn with_estimates(epsilon: f64, delta: f64) -> Self {
        let w = (std::f64::consts::E / epsilon).ceil() as u32;
        let d = (std::f64::consts::E / delta).ln().ceil() as u32;
        Self::new(d.max(1), w.max(1))
    }

    pub fn d(&self) -> u32 {
        self.d
    }

    pub fn w(&self) -> u32 {
        self.w
    }

    fn locations(&self, key: &[u8]) -> Vec<u32> {
        (1..=self.d)
            .map(|seed| {
                let hash = murmur3::murmur3_32(&mut Cursor::new(key), seed).unwrap_or(0);
                hash % self.w
            })
            .collect()
    }

    pub fn update(&mut self, key: &str) {
        for (row, column) in self.locations(key.as_bytes()).into_iter().enumerate() {
            self.table[row][column as usize] += 1;
        }
    }

    /// The minimum count across all `d` rows, i.e. the frequency estimate.
    pub fn estimate(&self, key: &str) -> u64 {
        self.locations(key.as_bytes())
            .into_iter()
            .enumerate()
            .map(|(row, column)| self.table[row][column as usize])
            .min()
            .unwrap_or(0)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + (self.d as usize * self.w as usize) * 8);
        buf.extend_from_slice(&self.d.to_le_bytes());
        buf.extend_from_slice(&self.w.to_le_bytes());
        for row in &self.table {
            for &count in row {
                buf.extend_from_slice(&count.to_le_bytes());
            }
        }
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let d = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?);
        let w = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?);
        let mut table = vec![vec![0u64; w as usize]; d as usize];
        let mut cursor = 8usize;
        for row in table.iter_mut() {
            for cell in row.iter_mut() {
                *cell = u64::from_le_bytes(bytes.get(cursor..cursor + 8)?.try_into().ok()?);
                cursor += 8;
            }
        }
        Some(CountMinSketch { d, w, table })
    }
}

impl std::fmt::Display for CountMinSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "count-min sketch: d={} w={}", self.d, self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_never_undercounts() {
        let mut cms = CountMinSketch::new(4, 64);
        for _ in 0..5 {
            cms.update("hot-key");
        }
        cms.update("other-key");
        assert!(cms.estimate("hot-key") >= 5);
    }

    #[test]
    fn round_trips_through_serialization() {
        let mut cms = CountMinSketch::new(2, 8);
        cms.update("a");
        cms.update("a");
        let bytes = cms.serialize();
        let restored = CountMinSketch::deserialize(&bytes).unwrap();
        assert_eq!(restored.d(), 2);
        assert_eq!(restored.w(), 8);
        assert_eq!(restored.estimate("a"), cms.estimate("a"));
    }
}
