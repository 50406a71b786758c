//! HyperLogLog cardinality estimator.
//!
//! Standard construction with `2^precision` registers. File layout:
//! `[m: u64 ‖ p: u32]` followed by `m` register bytes.

use fnv::FnvHasher;
use std::hash::Hasher;

/// Cardinality estimator with `2^precision` registers.
pub struct HyperLogLog {
    m: u64,
    p: u32,
    reg: Vec<u8>,
}

impl HyperLogLog {
    pub fn new(precision: u32) -> Self {
        let m = 1u64 << precision;
        HyperLogLog {
            m,
            p: precision,
            reg: vec![0u8; m as usize],
        }
    }

    fn hash32(item: &[u8]) -> u32 {
        let mut hasher = FnvHasher::default();
        hasher.write(item);
        hasher.finish() as u32
    }

    /// Adds `item`, updating the register selected by the top `p` bits of
    /// the hash with the longest observed run of trailing zero bits.
    pub fn add(&mut self, item: &[u8]) {
        let hash = Self::hash32(item);
        let k = 32 - self.p;
        let value = hash.trailing_zeros() as u8;
        let index = (hash >> k) as usize;
        if value > self.reg[index] {
            self.reg[index] = value;
        }
    }

    fn empty_count(&self) -> usize {
        self.reg.iter().filter(|&&v| v == 0).count()
    }

    /// Harmonic-mean estimate with small/large range correction.
    pub fn estimate(&self) -> f64 {
        let sum: f64 = self.reg.iter().map(|&v| 2f64.powi(-(v as i32))).sum();
        let alpha = 0.7213 / (1.0 + 1.079 / self.m as f64);
        let mut estimation = alpha * (self.m as f64).powi(2) / sum;
        let empty = self.empty_count();
        if estimation <= 2.5 * self.m as f64 {
            if empty > 0 {
                estimation = self.m as f64 * (self.m as f64 / empty as f64).ln();
            }
        } else if estimation > (1.0 / 30.0) * 2f64.powi(32) {
            estimation = -(2f64.powi(32)) * (1.0 - estimation / 2f64.powi(32)).ln();
        }
        estimation.ceil()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.reg.len());
        buf.extend_from_slice(&self.m.to_le_bytes());
        buf.extend_from_slice(&self.p.to_le_bytes());
        buf.extend_from_slice(&self.reg);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let m = u64::from_le_bytes(bytes.get(0..8)?.try_into().ok()?);
        let p = u32::from_le_bytes(bytes.get(8..12)?.try_into().ok()?);
        let reg = bytes.get(12..12 + m as usize)?.to_vec();
        Some(HyperLogLog { m, p, reg })
    }
}

impl std::fmt::Display for HyperLogLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hyperloglog: m={} p={} estimate={}", self.m, self.p, self.estimate())
    }
}
