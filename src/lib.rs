//! # ferrolsm
//!
//! An embeddable, single-process, single-threaded key-value storage
//! engine built on a **log-structured merge tree (LSM-tree)**. Every
//! mutation is appended to a write-ahead log before it touches the
//! in-memory index; once that index reaches capacity it is flushed to an
//! immutable, sorted on-disk table, and tables are periodically merged
//! across levels by leveled compaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                          Engine                           │
//! │  ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐ │
//! │  │   WAL    │──▶│ Memtable  │──▶│ SSTable │──▶│   LSM   │ │
//! │  │ (segments│   │(skip list)│   │ (flush) │   │ levels  │ │
//! │  │  + CRC)  │   │           │   │         │   │(compact)│ │
//! │  └──────────┘   └─────┬─────┘   └────┬────┘   └────┬────┘ │
//! │                       │              │             │      │
//! │                       ▼              ▼             ▼      │
//! │                 ┌───────────────────────────────────────┐ │
//! │                 │   read path: memtable → cache → SSTable│ │
//! │                 └───────────────────────────────────────┘ │
//! │  ┌──────────┐   ┌─────────────┐   ┌────────┐              │
//! │  │LRU cache │   │ Token bucket│   │CMS/HLL │              │
//! │  └──────────┘   └─────────────┘   └────────┘              │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Driver: composes every component, exposes get/put/delete/compact |
//! | [`memtable`] | Capacity-bounded skip-list write buffer, reports flush batches |
//! | [`skiplist`] | Arena-indexed multi-level sorted list, the memtable's index |
//! | [`wal`] | Segmented, fixed-width-record write-ahead log |
//! | [`sstable`] | Five-file immutable sorted table: data/index/summary/filter/metadata |
//! | [`lsm`] | Level directory layout and latest-table lookup |
//! | [`compaction`] | Pairwise leveled merge with tombstone drop and timestamp resolution |
//! | [`bloom`] | Murmur3-seeded bloom filter, pinned file format |
//! | [`merkle`] | SHA-1 Merkle tree over table contents |
//! | [`cache`] | Fixed-capacity LRU read cache with tombstone filtering |
//! | [`token_bucket`] | Wall-clock request admission control |
//! | [`cms`] | Count-Min Sketch key-frequency estimator |
//! | [`hll`] | HyperLogLog distinct-value estimator |
//! | [`codec`] | Shared fixed-width record encoding used by WAL and SSTable |
//! | [`config`] | Settings record and its on-disk YAML-subset loader |
//! | [`error`] | Per-module `thiserror` enums, wrapped by [`error::EngineError`] |
//!
//! ## Key properties
//!
//! - **Write-ahead logging** — every mutation is durable before the
//!   memtable is touched; it is the engine's only durability anchor.
//! - **Tombstone masking** — a delete is visible the instant it lands in
//!   the memtable or cache, even if an older value for the same key still
//!   physically exists in a lower-level SSTable.
//! - **Bloom-filtered point lookups** — each SSTable carries a bloom
//!   filter sized for its expected key count and a target false-positive
//!   rate, checked before any file I/O.
//! - **Leveled compaction** — tables pair up by age within a level and
//!   merge into the next, dropping tombstones and resolving collisions by
//!   timestamp.
//! - **Token-bucket admission** — get/put/delete/compact all consume one
//!   token from a wall-clock-refilled bucket; frequency/cardinality
//!   queries are exempt.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ferrolsm::engine::{Admission, Engine};
//!
//! let mut engine = Engine::open("/tmp/my_store").unwrap();
//!
//! if let Admission::Admitted(()) = engine.put("hello", b"world").unwrap() {
//!     // written
//! }
//!
//! if let Admission::Admitted(Some(value)) = engine.get("hello").unwrap() {
//!     assert_eq!(value, b"world");
//! }
//!
//! engine.delete("hello").unwrap();
//! engine.close().unwrap();
//! ```

pub mod bloom;
pub mod cache;
pub mod cms;
pub mod codec;
pub mod compaction;
pub mod config;
pub mod engine;
pub mod error;
pub mod hll;
pub mod lsm;
pub mod memtable;
pub mod merkle;
pub mod skiplist;
pub mod sstable;
pub mod token_bucket;
pub mod wal;
