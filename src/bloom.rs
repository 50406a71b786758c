//! Bloom filter.
//!
//! Sizing follows the standard formulas: `m = ceil(n * |ln p| / (ln 2)^2)`
//! bits and `k = ceil((m / n) * ln 2)` hash functions. The hash family is
//! `k` seeded Murmur3-32 hashes (seeds `1..=k`).
//!
//! The on-disk format is a 20-byte header
//! `[m: u32 ‖ k: u32 ‖ n: u32 ‖ p: f64]` followed by the marshaled bit
//! array (here: `ceil(m / 8)` bytes, LSB-first within each byte).

use std::io::Cursor;

use crate::error::BloomError;

const HEADER_SIZE: usize = 20;

/// A fixed-size bit array backing a [`BloomFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct BitArray {
    bits: Vec<u8>,
    len: u32,
}

impl BitArray {
    fn new(len: u32) -> Self {
        BitArray {
            bits: vec![0u8; len.div_ceil(8) as usize],
            len,
        }
    }

    fn set(&mut self, index: u32) {
        let byte = (index / 8) as usize;
        let bit = index % 8;
        self.bits[byte] |= 1 << bit;
    }

    fn get(&self, index: u32) -> bool {
        let byte = (index / 8) as usize;
        let bit = index % 8;
        (self.bits[byte] >> bit) & 1 == 1
    }
}

/// A probabilistic set-membership structure with no false negatives.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    m: u32,
    k: u32,
    n: u32,
    p: f64,
    set: BitArray,
}

impl BloomFilter {
    /// `m = ceil(n * |ln p| / (ln 2)^2)`.
    pub fn calculate_m(expected_elements: usize, false_positive_rate: f64) -> u32 {
        ((expected_elements as f64) * false_positive_rate.ln().abs()
            / std::f64::consts::LN_2.powi(2))
        .ceil() as u32
    }

    /// `k = ceil((m / n) * ln 2)`.
    pub fn calculate_k(expected_elements: usize, m: u32) -> u32 {
        if expected_elements == 0 {
            return 1;
        }
        ((m as f64 / expected_elements as f64) * std::f64::consts::LN_2).ceil() as u32
    }

    /// Builds a new, empty filter sized for `expected_elements` items at
    /// the given `false_positive_rate`.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        let m = Self::calculate_m(expected_elements.max(1), false_positive_rate).max(1);
        let k = Self::calculate_k(expected_elements.max(1), m).max(1);
        BloomFilter {
            m,
            k,
            n: expected_elements as u32,
            p: false_positive_rate,
            set: BitArray::new(m),
        }
    }

    /// Expected element count this filter was sized for.
    pub fn n(&self) -> u32 {
        self.n
    }

    fn hash(&self, item: &[u8], seed: u32) -> u32 {
        murmur3::murmur3_32(&mut Cursor::new(item), seed).unwrap_or(0)
    }

    /// Adds `key` to the filter.
    pub fn add(&mut self, key: &str) {
        let m = self.m;
        for seed in 1..=self.k {
            let index = self.hash(key.as_bytes(), seed) % m;
            self.set.set(index);
        }
    }

    /// Returns `true` if `key` may be a member (no false negatives).
    pub fn check(&self, key: &str) -> bool {
        let m = self.m;
        for seed in 1..=self.k {
            let index = self.hash(key.as_bytes(), seed) % m;
            if !self.set.get(index) {
                return false;
            }
        }
        true
    }

    /// Serializes the header and bit array.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.set.bits.len());
        buf.extend_from_slice(&self.m.to_le_bytes());
        buf.extend_from_slice(&self.k.to_le_bytes());
        buf.extend_from_slice(&self.n.to_le_bytes());
        buf.extend_from_slice(&self.p.to_le_bytes());
        buf.extend_from_slice(&self.set.bits);
        buf
    }

    /// Deserializes a filter previously written by [`BloomFilter::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BloomError> {
        if bytes.len() < HEADER_SIZE {
            return Err(BloomError::Malformed(format!(
                "expected at least {HEADER_SIZE} header bytes, got {}",
                bytes.len()
            )));
        }
        let m = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let k = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let n = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let p = f64::from_le_bytes(bytes[12..20].try_into().unwrap());
        let expected_bit_bytes = (m as usize).div_ceil(8);
        let bit_bytes = &bytes[HEADER_SIZE..];
        if bit_bytes.len() < expected_bit_bytes {
            return Err(BloomError::Malformed(format!(
                "expected {expected_bit_bytes} bit-array bytes, got {}",
                bit_bytes.len()
            )));
        }
        Ok(BloomFilter {
            m,
            k,
            n,
            p,
            set: BitArray {
                bits: bit_bytes[..expected_bit_bytes].to_vec(),
                len: m,
            },
        })
    }
}

impl std::fmt::Display for BloomFilter {
    /// Diagnostic summary for CLI info commands.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bloom filter: m={} k={} n={} p={}", self.m, self.k, self.n, self.p)
    }
}
