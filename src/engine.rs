//! The storage engine driver.
//!
//! Composes the WAL, the skip-list memtable, the LRU cache, the token
//! bucket and the two statistics sketches behind one handle, rather than
//! separate singletons. Write path: WAL append → memtable insert →
//! flush-on-full. Read path: memtable → cache → the latest SSTable on the
//! highest non-empty level (see `lsm::get_latest` for the search
//! direction).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::cache::LruCache;
use crate::cms::CountMinSketch;
use crate::compaction;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::hll::HyperLogLog;
use crate::lsm;
use crate::memtable::{FlushBatch, Lookup, Memtable};
use crate::sstable;
use crate::token_bucket::TokenBucket;
use crate::wal::Wal;

const CMS_HLL_DIR: &str = "CMS_HLL";
const CMS_FILE: &str = "cms.dat";
const HLL_FILE: &str = "hll.dat";

/// Error bound for a freshly created (never-persisted) Count-Min Sketch.
const CMS_EPSILON: f64 = 0.1;
const CMS_DELTA: f64 = 0.1;
/// HyperLogLog register precision for a fresh instance.
const HLL_PRECISION: u32 = 8;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Outcome of an operation gated by the token bucket: `get`, `put`,
/// `delete` and `compact` all consume a token; `key_frequency` and
/// `distinct_values` are exempt and never return `RateLimited`.
#[derive(Debug)]
pub enum Admission<T> {
    Admitted(T),
    RateLimited,
}

/// A single embedded LSM-tree store rooted at one directory.
pub struct Engine {
    root: PathBuf,
    config: EngineConfig,
    wal: Wal,
    memtable: Memtable,
    cache: LruCache,
    bucket: TokenBucket,
    cms: CountMinSketch,
    hll: HyperLogLog,
}

impl Engine {
    /// Opens (creating if absent) the store at `root`. Recovers the
    /// memtable from the WAL's most-recently-modified segment; if replay
    /// itself brings the memtable to capacity, the resulting flush runs
    /// immediately, same as a live `put` would.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EngineError> {
        let root = root.as_ref().to_path_buf();
        let config = EngineConfig::load(&root)?;
        lsm::generate_levels(&root, &config)?;

        let mut wal = Wal::open(&root, config.wal_size)?;
        let mut memtable = Memtable::new(config.memtable_size);
        let records = wal.read_from_last_segment()?;
        for record in records {
            if let Some(batch) = memtable.put(&record.key, &record.value, record.tombstone) {
                flush_batch(&root, &mut wal, batch)?;
            }
        }

        let cache = LruCache::new(config.cache_size as usize)?;
        let bucket = TokenBucket::new(config.threshold, config.time_rate, unix_now());
        let (cms, hll) = load_cms_hll(&root)?;

        Ok(Engine {
            root,
            config,
            wal,
            memtable,
            cache,
            bucket,
            cms,
            hll,
        })
    }

    /// Returns the value for `key`, consulting memtable → cache → the
    /// latest SSTable in turn, and updates the frequency sketch. A
    /// tombstone encountered at any layer masks the key immediately
    /// rather than falling through to a staler layer.
    pub fn get(&mut self, key: &str) -> Result<Admission<Option<Vec<u8>>>, EngineError> {
        let now = unix_now();
        if !self.bucket.check(now) {
            return Ok(Admission::RateLimited);
        }
        let result = self.read(key)?;
        self.cms.update(key);
        self.bucket.remove();
        Ok(Admission::Admitted(result))
    }

    fn read(&mut self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        match self.memtable.lookup(key) {
            Lookup::Found(value) => {
                let mut prefixed = Vec::with_capacity(value.len() + 1);
                prefixed.push(b'0');
                prefixed.extend_from_slice(value);
                let found = value.to_vec();
                self.cache.add(key, prefixed);
                info!(key, "found in memtable");
                return Ok(Some(found));
            }
            Lookup::Tombstoned => return Ok(None),
            Lookup::Absent => {}
        }

        if let Some((tombstone, value)) = self.cache.lookup_raw(key) {
            if tombstone {
                return Ok(None);
            }
            info!(key, "found in cache");
            return Ok(Some(value.to_vec()));
        }

        let Some(table_dir) = lsm::get_latest(&self.root, self.config.lsm_levels)? else {
            return Ok(None);
        };
        match sstable::lookup(&table_dir, key)? {
            Some(found) if found.tombstone => Ok(None),
            Some(found) => {
                let mut prefixed = Vec::with_capacity(found.value.len() + 1);
                prefixed.push(b'0');
                prefixed.extend_from_slice(&found.value);
                self.cache.add(key, prefixed);
                info!(key, table = %table_dir.display(), "found in SSTable");
                Ok(Some(found.value))
            }
            None => Ok(None),
        }
    }

    /// Inserts `key`/`value`. Updates the frequency and cardinality
    /// sketches on success.
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<Admission<()>, EngineError> {
        let now = unix_now();
        if !self.bucket.check(now) {
            return Ok(Admission::RateLimited);
        }
        self.put_del(key, value, false)?;
        self.cms.update(key);
        self.hll.add(value);
        self.bucket.remove();
        Ok(Admission::Admitted(()))
    }

    /// Marks `key` deleted. The tombstone masks older versions in every
    /// layer immediately; physical removal happens only at compaction.
    pub fn delete(&mut self, key: &str) -> Result<Admission<()>, EngineError> {
        let now = unix_now();
        if !self.bucket.check(now) {
            return Ok(Admission::RateLimited);
        }
        self.put_del(key, b"", true)?;
        self.cms.update(key);
        self.bucket.remove();
        Ok(Admission::Admitted(()))
    }

    fn put_del(&mut self, key: &str, value: &[u8], tombstone: bool) -> Result<(), EngineError> {
        let now = unix_now();
        self.wal.append(key, value, tombstone, now)?;

        let mut prefixed = Vec::with_capacity(value.len() + 1);
        prefixed.push(if tombstone { b'1' } else { b'0' });
        prefixed.extend_from_slice(value);
        self.cache.add(key, prefixed);

        if let Some(batch) = self.memtable.put(key, value, tombstone) {
            flush_batch(&self.root, &mut self.wal, batch)?;
        }
        Ok(())
    }

    /// Runs one pass of leveled compaction over every level.
    pub fn compact(&mut self) -> Result<Admission<()>, EngineError> {
        let now = unix_now();
        if !self.bucket.check(now) {
            return Ok(Admission::RateLimited);
        }
        compaction::compact_all(&self.root, &self.config)?;
        self.bucket.remove();
        Ok(Admission::Admitted(()))
    }

    /// Estimated occurrence count of `key`, via the Count-Min Sketch.
    /// Exempt from token admission.
    pub fn key_frequency(&self, key: &str) -> u64 {
        self.cms.estimate(key)
    }

    /// Estimated count of distinct values ever inserted, via HyperLogLog.
    /// Exempt from token admission.
    pub fn distinct_values(&self) -> f64 {
        self.hll.estimate()
    }

    /// Persists the Count-Min Sketch and HyperLogLog to `CMS_HLL/` so a
    /// later `open` can resume them.
    pub fn close(&self) -> Result<(), EngineError> {
        let dir = self.root.join(CMS_HLL_DIR);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(CMS_FILE), self.cms.serialize())?;
        fs::write(dir.join(HLL_FILE), self.hll.serialize())?;
        Ok(())
    }
}

fn flush_batch(root: &Path, wal: &mut Wal, batch: FlushBatch) -> Result<(), EngineError> {
    let level_dir = lsm::level_dir(root, 1);
    sstable::flush(&level_dir, &batch.entries, unix_now(), sstable::FLUSH_FALSE_POSITIVE_RATE)?;
    wal.remove_all_segments()?;
    info!(records = batch.entries.len(), head = %batch.head, tail = %batch.tail, "flushed memtable to level 1");
    Ok(())
}

fn load_cms_hll(root: &Path) -> Result<(CountMinSketch, HyperLogLog), EngineError> {
    let dir = root.join(CMS_HLL_DIR);
    let cms_path = dir.join(CMS_FILE);
    let hll_path = dir.join(HLL_FILE);
    if cms_path.exists() && hll_path.exists() {
        let cms = CountMinSketch::deserialize(&fs::read(&cms_path)?)
            .ok_or_else(|| EngineError::Internal(format!("corrupt CMS file at {}", cms_path.display())))?;
        let hll = HyperLogLog::deserialize(&fs::read(&hll_path)?)
            .ok_or_else(|| EngineError::Internal(format!("corrupt HLL file at {}", hll_path.display())))?;
        Ok((cms, hll))
    } else {
        warn!("no persisted CMS/HLL found, starting fresh");
        Ok((
            CountMinSketch::with_estimates(CMS_EPSILON, CMS_DELTA),
            HyperLogLog::new(HLL_PRECISION),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn admitted<T>(admission: Admission<T>) -> T {
        match admission {
            Admission::Admitted(v) => v,
            Admission::RateLimited => panic!("unexpectedly rate-limited"),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let mut engine = Engine::open(dir.path()).unwrap();
        admitted(engine.put("a", b"1").unwrap());
        let value = admitted(engine.get("a").unwrap());
        assert_eq!(value, Some(b"1".to_vec()));
    }

    #[test]
    fn delete_masks_memtable_entry() {
        let dir = tempdir().unwrap();
        let mut engine = Engine::open(dir.path()).unwrap();
        admitted(engine.put("a", b"1").unwrap());
        admitted(engine.delete("a").unwrap());
        assert_eq!(admitted(engine.get("a").unwrap()), None);
    }

    #[test]
    fn flush_triggers_at_memtable_capacity_and_empties_wal() {
        let dir = tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.memtable_size = 2;
        config.lsm_levels = 4;
        let config_dir = dir.path().join("Configuration");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("configuration.yaml"),
            "memtable_size: 2\nwal_size: 5\nlsm_levels: 4\ncache_size: 5\nthreshold: 5\ntime_rate: 30\nlvl_tables:\n  1: 4\n  2: 2\n  3: 1\n",
        )
        .unwrap();

        let mut engine = Engine::open(dir.path()).unwrap();
        admitted(engine.put("a", b"1").unwrap());
        admitted(engine.put("b", b"2").unwrap());

        assert_eq!(lsm::table_count(dir.path(), 1).unwrap(), 1);
        assert!(engine.wal.is_empty().unwrap());
        assert_eq!(admitted(engine.get("a").unwrap()), Some(b"1".to_vec()));
    }

    #[test]
    fn memtable_shadows_flushed_sstable() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("Configuration");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("configuration.yaml"),
            "memtable_size: 2\nwal_size: 5\nlsm_levels: 4\ncache_size: 5\nthreshold: 5\ntime_rate: 30\nlvl_tables:\n  1: 4\n  2: 2\n  3: 1\n",
        )
        .unwrap();

        let mut engine = Engine::open(dir.path()).unwrap();
        admitted(engine.put("a", b"1").unwrap());
        admitted(engine.put("b", b"2").unwrap()); // flushes to level 1
        admitted(engine.put("a", b"9").unwrap());

        assert_eq!(admitted(engine.get("a").unwrap()), Some(b"9".to_vec()));
    }

    #[test]
    fn rate_limited_put_is_reported_and_not_applied() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("Configuration");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("configuration.yaml"),
            "memtable_size: 10\nwal_size: 5\nlsm_levels: 4\ncache_size: 5\nthreshold: 1\ntime_rate: 1000000\nlvl_tables:\n  1: 4\n  2: 2\n  3: 1\n",
        )
        .unwrap();

        let mut engine = Engine::open(dir.path()).unwrap();
        admitted(engine.put("a", b"1").unwrap());
        assert!(matches!(engine.put("b", b"2").unwrap(), Admission::RateLimited));
        assert_eq!(engine.memtable.len(), 1);
    }

    #[test]
    fn key_frequency_and_distinct_values_are_never_rate_limited() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("Configuration");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("configuration.yaml"),
            "memtable_size: 10\nwal_size: 5\nlsm_levels: 4\ncache_size: 5\nthreshold: 0\ntime_rate: 1000000\nlvl_tables:\n  1: 4\n  2: 2\n  3: 1\n",
        )
        .unwrap();

        let engine = Engine::open(dir.path()).unwrap();
        assert_eq!(engine.key_frequency("a"), 0);
        assert_eq!(engine.distinct_values(), 0.0);
    }

    #[test]
    fn close_and_reopen_resumes_statistics() {
        let dir = tempdir().unwrap();
        {
            let mut engine = Engine::open(dir.path()).unwrap();
            admitted(engine.put("a", b"1").unwrap());
            admitted(engine.put("a", b"1").unwrap());
            engine.close().unwrap();
        }
        let engine = Engine::open(dir.path()).unwrap();
        assert!(engine.key_frequency("a") >= 2);
    }
}
