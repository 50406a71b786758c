//! SSTable flush and point lookup.
//!
//! An SSTable is a directory of five fixed-name files under
//! `LSM/C<level>/SSTable<n>/`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::bloom::BloomFilter;
use crate::codec::{
    decode_record, encode_record, get_fixed_le, put_fixed_le, Record, KEY_SIZE_SIZE, OFFSET_SIZE,
};
use crate::error::SSTableError;
use crate::merkle::MerkleTree;

const DATA_FILE: &str = "sstable-data.dat";
const INDEX_FILE: &str = "sstable-index.dat";
const SUMMARY_FILE: &str = "sstable-summary.dat";
const FILTER_FILE: &str = "sstable-filter.dat";
const METADATA_FILE: &str = "metadata.dat";

/// Bloom false-positive rate used when flushing a memtable.
pub const FLUSH_FALSE_POSITIVE_RATE: f64 = 0.001;
/// Bloom false-positive rate used for compaction output.
pub const COMPACTION_FALSE_POSITIVE_RATE: f64 = 0.0001;

/// One logical entry handed to [`flush`] or compaction output, already
/// stripped of the tombstone-prefix-byte encoding.
#[derive(Debug, Clone)]
pub struct FlushEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub tombstone: bool,
}

fn write_sized_key(buf: &mut Vec<u8>, key: &str) {
    put_fixed_le(buf, key.len() as u64, KEY_SIZE_SIZE);
    buf.extend_from_slice(key.as_bytes());
}

fn read_sized_key(bytes: &[u8], pos: usize) -> Option<(String, usize)> {
    let key_size = get_fixed_le(bytes.get(pos..pos + KEY_SIZE_SIZE)?) as usize;
    let start = pos + KEY_SIZE_SIZE;
    let key = std::str::from_utf8(bytes.get(start..start + key_size)?).ok()?.to_string();
    Some((key, start + key_size))
}

/// Returns the next `SSTable<n>` number for `level_dir` (1 if empty).
pub fn next_table_number(level_dir: &Path) -> std::io::Result<u64> {
    let mut max = 0u64;
    if level_dir.exists() {
        for entry in fs::read_dir(level_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(suffix) = name.strip_prefix("SSTable") {
                    if let Ok(n) = suffix.parse::<u64>() {
                        max = max.max(n);
                    }
                }
            }
        }
    }
    Ok(max + 1)
}

/// Writes a new SSTable directory under `level_dir` from `records`
/// (must already be in ascending key order), using an explicit `(lower,
/// upper)` summary header and bloom sizing `n` — the degrees of freedom
/// the compactor needs (its upper bound is `max` of the two *source*
/// headers, independent of what actually got emitted; see
/// `compaction::compact`).
pub fn write_table(
    level_dir: &Path,
    records: &[Record],
    lower: &str,
    upper: &str,
    expected_n: usize,
    false_positive_rate: f64,
) -> Result<PathBuf, SSTableError> {
    let number = next_table_number(level_dir)?;
    let table_dir = level_dir.join(format!("SSTable{number}"));
    fs::create_dir_all(&table_dir)?;

    let mut data_buf = Vec::new();
    let mut index_buf = Vec::new();
    let mut summary_buf = Vec::new();
    write_sized_key(&mut summary_buf, lower);
    write_sized_key(&mut summary_buf, upper);

    let mut bloom = BloomFilter::new(expected_n.max(1), false_positive_rate);
    let mut offset_data: u64 = 0;
    let mut offset_index: u64 = 0;

    for record in records {
        bloom.add(&record.key);

        let encoded = encode_record(&record.key, &record.value, record.tombstone, record.timestamp);
        data_buf.extend_from_slice(&encoded);

        let index_offset_in_summary = offset_index;
        write_sized_key(&mut index_buf, &record.key);
        put_fixed_le(&mut index_buf, offset_data, OFFSET_SIZE);

        write_sized_key(&mut summary_buf, &record.key);
        put_fixed_le(&mut summary_buf, index_offset_in_summary, OFFSET_SIZE);

        offset_data += encoded.len() as u64;
        offset_index = index_buf.len() as u64;
    }

    let merkle_leaves: Vec<(String, Vec<u8>)> =
        records.iter().map(|r| (r.key.clone(), r.value.clone())).collect();
    let merkle_bytes = MerkleTree::build(&merkle_leaves)
        .map(|t| t.serialize())
        .unwrap_or_default();

    fs::write(table_dir.join(DATA_FILE), &data_buf)?;
    fs::write(table_dir.join(INDEX_FILE), &index_buf)?;
    fs::write(table_dir.join(SUMMARY_FILE), &summary_buf)?;
    fs::write(table_dir.join(FILTER_FILE), bloom.serialize())?;
    fs::write(table_dir.join(METADATA_FILE), &merkle_bytes)?;

    debug!(table = %table_dir.display(), records = records.len(), "wrote SSTable");
    Ok(table_dir)
}

/// Writes a fresh flush from a memtable's level-0 chain: every record is
/// stamped with the same `timestamp` (Unix seconds at flush time), and the
/// summary bounds are simply the first and last emitted keys.
pub fn flush(
    level_dir: &Path,
    entries: &[FlushEntry],
    timestamp: i64,
    false_positive_rate: f64,
) -> Result<PathBuf, SSTableError> {
    let lower = entries.first().map(|e| e.key.as_str()).unwrap_or("").to_string();
    let upper = entries.last().map(|e| e.key.as_str()).unwrap_or("").to_string();
    let records: Vec<Record> = entries
        .iter()
        .map(|e| Record {
            key: e.key.clone(),
            value: e.value.clone(),
            tombstone: e.tombstone,
            timestamp,
        })
        .collect();
    write_table(level_dir, &records, &lower, &upper, entries.len(), false_positive_rate)
}

/// Result of a successful [`lookup`].
pub struct LookupResult {
    pub value: Vec<u8>,
    pub tombstone: bool,
    pub timestamp: i64,
}

/// Looks up `key` in the table at `table_dir`: bloom → summary → index →
/// data. The CRC stored in each data record is never verified on this
/// read path.
pub fn lookup(table_dir: &Path, key: &str) -> Result<Option<LookupResult>, SSTableError> {
    let filter_bytes = fs::read(table_dir.join(FILTER_FILE))?;
    let bloom = BloomFilter::deserialize(&filter_bytes)?;
    if !bloom.check(key) {
        trace!(table = %table_dir.display(), key, "bloom negative");
        return Ok(None);
    }

    let summary = fs::read(table_dir.join(SUMMARY_FILE))?;
    let Some((lower, pos)) = read_sized_key(&summary, 0) else {
        return Ok(None);
    };
    let Some((upper, mut pos)) = read_sized_key(&summary, pos) else {
        return Ok(None);
    };
    if key < lower.as_str() || key > upper.as_str() {
        return Ok(None);
    }

    let mut index_offset = None;
    while pos < summary.len() {
        let Some((entry_key, after_key)) = read_sized_key(&summary, pos) else {
            break;
        };
        let offset = get_fixed_le(&summary[after_key..after_key + OFFSET_SIZE]);
        pos = after_key + OFFSET_SIZE;
        if entry_key == key {
            index_offset = Some(offset as usize);
            break;
        }
    }

    let Some(index_offset) = index_offset else {
        return Ok(None);
    };

    let index = fs::read(table_dir.join(INDEX_FILE))?;
    let Some((_, after_key)) = read_sized_key(&index, index_offset) else {
        return Err(SSTableError::Corrupt("index entry truncated".into()));
    };
    let data_offset = get_fixed_le(
        index
            .get(after_key..after_key + OFFSET_SIZE)
            .ok_or_else(|| SSTableError::Corrupt("index offset truncated".into()))?,
    ) as usize;

    let data = fs::read(table_dir.join(DATA_FILE))?;
    let Some((record, _)) = decode_record(
        data.get(data_offset..)
            .ok_or_else(|| SSTableError::Corrupt("data offset out of range".into()))?,
    ) else {
        return Err(SSTableError::Corrupt("data record truncated".into()));
    };

    Ok(Some(LookupResult {
        value: record.value,
        tombstone: record.tombstone,
        timestamp: record.timestamp,
    }))
}

/// Reads the `(lower, upper)` key bounds from a table's summary header.
pub fn read_bounds(table_dir: &Path) -> Result<(String, String), SSTableError> {
    let summary = fs::read(table_dir.join(SUMMARY_FILE))?;
    let (lower, pos) = read_sized_key(&summary, 0)
        .ok_or_else(|| SSTableError::Corrupt("missing summary lower bound".into()))?;
    let (upper, _) = read_sized_key(&summary, pos)
        .ok_or_else(|| SSTableError::Corrupt("missing summary upper bound".into()))?;
    Ok((lower, upper))
}

/// Reads every record from a table's data file in on-disk order, used by
/// the compactor's sorted merge.
pub fn read_all_records(table_dir: &Path) -> Result<Vec<crate::codec::Record>, SSTableError> {
    let data = fs::read(table_dir.join(DATA_FILE))?;
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let Some((record, consumed)) = decode_record(&data[offset..]) else {
            return Err(SSTableError::Corrupt("truncated data record".into()));
        };
        offset += consumed;
        records.push(record);
    }
    Ok(records)
}

/// The expected element count a table's bloom filter was sized for —
/// used by the compactor to size the merged output's filter.
pub fn bloom_n(table_dir: &Path) -> Result<u32, SSTableError> {
    let filter_bytes = fs::read(table_dir.join(FILTER_FILE))?;
    Ok(BloomFilter::deserialize(&filter_bytes)?.n())
}

/// One-line diagnostic summary of a table's bounds, record count and
/// bloom filter, for CLI info commands.
pub fn describe_table(table_dir: &Path) -> Result<String, SSTableError> {
    let (lower, upper) = read_bounds(table_dir)?;
    let records = read_all_records(table_dir)?;
    let filter_bytes = fs::read(table_dir.join(FILTER_FILE))?;
    let bloom = BloomFilter::deserialize(&filter_bytes)?;
    Ok(format!(
        "table {}: keys [{lower}, {upper}], {} records, {bloom}",
        table_dir.display(),
        records.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries() -> Vec<FlushEntry> {
        vec![
            FlushEntry { key: "a".into(), value: b"1".to_vec(), tombstone: false },
            FlushEntry { key: "b".into(), value: b"2".to_vec(), tombstone: false },
            FlushEntry { key: "c".into(), value: b"3".to_vec(), tombstone: true },
        ]
    }

    #[test]
    fn flush_then_lookup_round_trips() {
        let dir = tempdir().unwrap();
        let table = flush(dir.path(), &entries(), 1_000, FLUSH_FALSE_POSITIVE_RATE).unwrap();

        let found = lookup(&table, "b").unwrap().unwrap();
        assert_eq!(found.value, b"2");
        assert!(!found.tombstone);
    }

    #[test]
    fn lookup_reports_tombstone() {
        let dir = tempdir().unwrap();
        let table = flush(dir.path(), &entries(), 1_000, FLUSH_FALSE_POSITIVE_RATE).unwrap();
        let found = lookup(&table, "c").unwrap().unwrap();
        assert!(found.tombstone);
    }

    #[test]
    fn lookup_misses_key_outside_bounds() {
        let dir = tempdir().unwrap();
        let table = flush(dir.path(), &entries(), 1_000, FLUSH_FALSE_POSITIVE_RATE).unwrap();
        assert!(lookup(&table, "zzz").unwrap().is_none());
        assert!(lookup(&table, "0").unwrap().is_none());
    }

    #[test]
    fn table_numbers_increment_per_level() {
        let dir = tempdir().unwrap();
        flush(dir.path(), &entries(), 1, FLUSH_FALSE_POSITIVE_RATE).unwrap();
        let second = flush(dir.path(), &entries(), 2, FLUSH_FALSE_POSITIVE_RATE).unwrap();
        assert!(second.ends_with("SSTable2"));
    }

    #[test]
    fn read_all_records_preserves_order() {
        let dir = tempdir().unwrap();
        let table = flush(dir.path(), &entries(), 5, FLUSH_FALSE_POSITIVE_RATE).unwrap();
        let records = read_all_records(&table).unwrap();
        assert_eq!(records.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
