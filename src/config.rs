//! Engine configuration.
//!
//! `EngineConfig` is the plain settings record every subsystem reads.
//! Loading `Configuration/configuration.yaml` is intentionally minimal: a
//! line-oriented reader for the flat `key: value` pairs plus the
//! `lvl_tables` map, not a general YAML parser.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Directory under which `configuration.yaml` is expected to live.
pub const CONFIG_DIR: &str = "Configuration";

/// The plain settings record consumed by every subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of records per WAL segment before it rolls.
    pub wal_size: u64,

    /// Number of entries the memtable holds before it flushes.
    pub memtable_size: u64,

    /// Number of LSM levels, including the terminal one (`L-1`).
    pub lsm_levels: u64,

    /// Capacity of the LRU read cache.
    pub cache_size: u64,

    /// Token bucket capacity (requests admitted per refill window).
    pub threshold: u8,

    /// Token bucket refill interval, in seconds.
    pub time_rate: i64,

    /// Per-level compaction threshold: level index -> minimum table count.
    /// Keys range over `1..=lsm_levels-2`.
    pub lvl_tables: BTreeMap<u64, u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            wal_size: 5,
            memtable_size: 10,
            lsm_levels: 4,
            cache_size: 5,
            threshold: 5,
            time_rate: 30,
            lvl_tables: BTreeMap::from([(1, 4), (2, 2), (3, 1)]),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `Configuration/configuration.yaml` under
    /// `root`. If the configuration directory is absent or empty, returns
    /// [`EngineConfig::default`]. A present-but-malformed file is a fatal
    /// [`ConfigError::Malformed`].
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = root.as_ref().join(CONFIG_DIR);
        let path = dir.join("configuration.yaml");
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        let text = fs::read_to_string(&path)?;
        Self::parse(&text)
    }

    /// Parses the minimal `key: value` subset of YAML this crate supports.
    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();
        let mut in_lvl_tables = false;

        for raw_line in text.lines() {
            let line = raw_line.trim_end();
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            if !line.starts_with(char::is_whitespace) {
                in_lvl_tables = false;
                let (key, value) = split_kv(line)?;
                match key {
                    "wal_size" => config.wal_size = parse_u64(value)?,
                    "memtable_size" => config.memtable_size = parse_u64(value)?,
                    "lsm_levels" => config.lsm_levels = parse_u64(value)?,
                    "cache_size" => config.cache_size = parse_u64(value)?,
                    "threshold" => {
                        config.threshold = parse_u64(value)?.try_into().map_err(|_| {
                            ConfigError::Malformed(format!("threshold out of range: {value}"))
                        })?
                    }
                    "time_rate" => {
                        config.time_rate = value.parse().map_err(|_| {
                            ConfigError::Malformed(format!("invalid time_rate: {value}"))
                        })?
                    }
                    "lvl_tables" => {
                        in_lvl_tables = true;
                        config.lvl_tables.clear();
                    }
                    other => {
                        return Err(ConfigError::Malformed(format!("unknown key: {other}")));
                    }
                }
            } else if in_lvl_tables {
                let (key, value) = split_kv(line.trim_start())?;
                let level: u64 = key
                    .parse()
                    .map_err(|_| ConfigError::Malformed(format!("invalid level key: {key}")))?;
                config.lvl_tables.insert(level, parse_u64(value)?);
            } else {
                return Err(ConfigError::Malformed(format!(
                    "unexpected indented line: {line}"
                )));
            }
        }

        Ok(config)
    }
}

impl std::fmt::Display for EngineConfig {
    /// Diagnostic summary for CLI info commands.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "wal_size={} memtable_size={} lsm_levels={} cache_size={} threshold={} time_rate={} lvl_tables={:?}",
            self.wal_size, self.memtable_size, self.lsm_levels, self.cache_size, self.threshold, self.time_rate, self.lvl_tables
        )
    }
}

fn split_kv(line: &str) -> Result<(&str, &str), ConfigError> {
    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| ConfigError::Malformed(format!("expected `key: value`, got: {line}")))?;
    Ok((key.trim(), value.trim()))
}

fn parse_u64(value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Malformed(format!("expected integer, got: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_pinned_values() {
        let config = EngineConfig::default();
        assert_eq!(config.wal_size, 5);
        assert_eq!(config.memtable_size, 10);
        assert_eq!(config.lsm_levels, 4);
        assert_eq!(config.cache_size, 5);
        assert_eq!(config.threshold, 5);
        assert_eq!(config.time_rate, 30);
        assert_eq!(
            config.lvl_tables,
            BTreeMap::from([(1, 4), (2, 2), (3, 1)])
        );
    }

    #[test]
    fn missing_directory_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn parses_flat_fields_and_lvl_tables() {
        let text = "\
wal_size: 7
memtable_size: 20
lsm_levels: 5
cache_size: 8
threshold: 9
time_rate: 60
lvl_tables:
  1: 3
  2: 2
  3: 1
";
        let config = EngineConfig::parse(text).unwrap();
        assert_eq!(config.wal_size, 7);
        assert_eq!(config.memtable_size, 20);
        assert_eq!(config.lsm_levels, 5);
        assert_eq!(config.threshold, 9);
        assert_eq!(config.lvl_tables, BTreeMap::from([(1, 3), (2, 2), (3, 1)]));
    }

    #[test]
    fn malformed_line_is_an_error() {
        let err = EngineConfig::parse("not a key value line").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }
}
