//! Pairwise leveled compaction.

use std::path::Path;

use tracing::info;

use crate::codec::Record;
use crate::config::EngineConfig;
use crate::error::CompactionError;
use crate::lsm;
use crate::sstable::{self, COMPACTION_FALSE_POSITIVE_RATE};

/// Sorted-merges the tables at `t1_dir` and `t2_dir` (both on `level`)
/// into a new table on `level + 1`. Tombstoned records are dropped
/// (physical deletion); on key collision the record with the greater
/// timestamp wins, ties favoring `t1`. Removes both source
/// directories once the merged table is closed.
pub fn compact(root: &Path, t1_dir: &Path, t2_dir: &Path, level: u64) -> Result<(), CompactionError> {
    let records1 = sstable::read_all_records(t1_dir)?;
    let records2 = sstable::read_all_records(t2_dir)?;
    let (_, upper1) = sstable::read_bounds(t1_dir)?;
    let (_, upper2) = sstable::read_bounds(t2_dir)?;
    let upper = if upper1 > upper2 { upper1 } else { upper2 };

    let n1 = sstable::bloom_n(t1_dir)?;
    let n2 = sstable::bloom_n(t2_dir)?;

    let mut merged = Vec::with_capacity(records1.len() + records2.len());
    let mut i = 0;
    let mut j = 0;
    while i < records1.len() && j < records2.len() {
        match records1[i].key.cmp(&records2[j].key) {
            std::cmp::Ordering::Equal => {
                let winner = if records1[i].timestamp >= records2[j].timestamp {
                    &records1[i]
                } else {
                    &records2[j]
                };
                push_if_live(&mut merged, winner);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                push_if_live(&mut merged, &records1[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                push_if_live(&mut merged, &records2[j]);
                j += 1;
            }
        }
    }
    while i < records1.len() {
        push_if_live(&mut merged, &records1[i]);
        i += 1;
    }
    while j < records2.len() {
        push_if_live(&mut merged, &records2[j]);
        j += 1;
    }

    let lower = merged.first().map(|r: &Record| r.key.clone()).unwrap_or_default();
    let level_dir = lsm::level_dir(root, level + 1);
    sstable::write_table(
        &level_dir,
        &merged,
        &lower,
        &upper,
        (n1 + n2) as usize,
        COMPACTION_FALSE_POSITIVE_RATE,
    )?;

    lsm::remove_table_dir(t1_dir);
    lsm::remove_table_dir(t2_dir);
    info!(
        level,
        emitted = merged.len(),
        "compacted pair into level {}",
        level + 1
    );
    Ok(())
}

fn push_if_live(out: &mut Vec<Record>, record: &Record) {
    if !record.tombstone {
        out.push(record.clone());
    }
}

/// Walks levels `1..lsm_levels-1`. A level whose table count is at least
/// `config.lvl_tables[level]` has its tables sorted by age and compacted
/// pairwise; an odd final table is left untouched.
pub fn compact_all(root: &Path, config: &EngineConfig) -> Result<(), CompactionError> {
    for level in 1..config.lsm_levels.saturating_sub(1) {
        let Some(&threshold) = config.lvl_tables.get(&level) else {
            continue;
        };
        let tables = lsm::tables_by_age(root, level)?;
        if (tables.len() as u64) < threshold {
            continue;
        }

        let mut pairs = tables.chunks_exact(2);
        for pair in &mut pairs {
            compact(root, &pair[0], &pair[1], level)?;
        }
        // `chunks_exact`'s remainder is the odd final table; left untouched.
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::{flush, FlushEntry};
    use tempfile::tempdir;

    fn entries(pairs: &[(&str, &str, bool)]) -> Vec<FlushEntry> {
        pairs
            .iter()
            .map(|(k, v, t)| FlushEntry {
                key: k.to_string(),
                value: v.as_bytes().to_vec(),
                tombstone: *t,
            })
            .collect()
    }

    #[test]
    fn compact_merges_disjoint_keys_and_removes_sources() {
        let root = tempdir().unwrap();
        let config = EngineConfig::default();
        lsm::generate_levels(root.path(), &config).unwrap();
        let level1 = lsm::level_dir(root.path(), 1);

        let t1 = flush(&level1, &entries(&[("a", "1", false), ("b", "2", false)]), 100, 0.01).unwrap();
        let t2 = flush(&level1, &entries(&[("c", "3", false), ("d", "4", false)]), 101, 0.01).unwrap();

        compact(root.path(), &t1, &t2, 1).unwrap();

        assert!(!t1.exists());
        assert!(!t2.exists());
        let level2 = lsm::level_dir(root.path(), 2);
        let merged_dir = level2.join("SSTable1");
        let records = sstable::read_all_records(&merged_dir).unwrap();
        assert_eq!(
            records.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn compact_resolves_collision_by_greater_timestamp() {
        let root = tempdir().unwrap();
        let config = EngineConfig::default();
        lsm::generate_levels(root.path(), &config).unwrap();
        let level1 = lsm::level_dir(root.path(), 1);

        let t1 = flush(&level1, &entries(&[("a", "old", false)]), 100, 0.01).unwrap();
        let t2 = flush(&level1, &entries(&[("a", "new", false)]), 200, 0.01).unwrap();

        compact(root.path(), &t1, &t2, 1).unwrap();
        let merged_dir = lsm::level_dir(root.path(), 2).join("SSTable1");
        let records = sstable::read_all_records(&merged_dir).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, b"new");
    }

    #[test]
    fn compact_drops_tombstoned_records() {
        let root = tempdir().unwrap();
        let config = EngineConfig::default();
        lsm::generate_levels(root.path(), &config).unwrap();
        let level1 = lsm::level_dir(root.path(), 1);

        let t1 = flush(&level1, &entries(&[("a", "1", false), ("b", "2", true)]), 100, 0.01).unwrap();
        let t2 = flush(&level1, &entries(&[("c", "3", false)]), 101, 0.01).unwrap();

        compact(root.path(), &t1, &t2, 1).unwrap();
        let merged_dir = lsm::level_dir(root.path(), 2).join("SSTable1");
        let records = sstable::read_all_records(&merged_dir).unwrap();
        assert_eq!(records.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn compact_all_leaves_an_odd_table_untouched() {
        let root = tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.lvl_tables.insert(1, 3);
        lsm::generate_levels(root.path(), &config).unwrap();
        let level1 = lsm::level_dir(root.path(), 1);

        flush(&level1, &entries(&[("a", "1", false)]), 1, 0.01).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        flush(&level1, &entries(&[("b", "2", false)]), 2, 0.01).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        flush(&level1, &entries(&[("c", "3", false)]), 3, 0.01).unwrap();

        compact_all(root.path(), &config).unwrap();

        assert_eq!(lsm::table_count(root.path(), 1).unwrap(), 1);
        assert_eq!(lsm::table_count(root.path(), 2).unwrap(), 1);
    }
}
