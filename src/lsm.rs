//! LSM level directory layout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::config::EngineConfig;
use crate::error::CompactionError;

/// Root directory name for level subdirectories (`LSM/C<i>`).
pub const LSM_DIR: &str = "LSM";

pub fn level_dir(root: &Path, level: u64) -> PathBuf {
    root.join(LSM_DIR).join(format!("C{level}"))
}

/// Creates `LSM/C1 .. LSM/C<lsm_levels-1>` with platform-default directory
/// permissions (see DESIGN.md for why this doesn't pin a specific mode).
pub fn generate_levels(root: &Path, config: &EngineConfig) -> Result<(), CompactionError> {
    for level in 1..config.lsm_levels {
        fs::create_dir_all(level_dir(root, level))?;
    }
    Ok(())
}

fn most_recently_modified_child(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut best: Option<(PathBuf, SystemTime)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if best.as_ref().map(|(_, t)| modified >= *t).unwrap_or(true) {
            best = Some((entry.path(), modified));
        }
    }
    Ok(best.map(|(path, _)| path))
}

fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Returns the directory of the newest table on the highest non-empty
/// level, searching **downward** from `max_level - 1` to level 1.
///
/// This direction is preserved deliberately (see DESIGN.md): a caller
/// expecting the freshest data at the *lowest* populated level (the most
/// recent flush target) will find this function instead prefers the
/// oldest, most-compacted level first whenever a higher level is
/// non-empty.
pub fn get_latest(root: &Path, max_level: u64) -> std::io::Result<Option<PathBuf>> {
    let mut level = max_level;
    loop {
        if level == 0 {
            return Ok(None);
        }
        let dir = level_dir(root, level - 1);
        if !is_empty_dir(&dir)? {
            return most_recently_modified_child(&dir);
        }
        level -= 1;
    }
}

/// Table directories under `level`, sorted by modification time ascending
/// — creation order is recoverable from directory modification time.
pub fn tables_by_age(root: &Path, level: u64) -> std::io::Result<Vec<PathBuf>> {
    let dir = level_dir(root, level);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut tables = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        tables.push((entry.path(), modified));
    }
    tables.sort_by_key(|(_, t)| *t);
    Ok(tables.into_iter().map(|(p, _)| p).collect())
}

pub fn table_count(root: &Path, level: u64) -> std::io::Result<usize> {
    Ok(tables_by_age(root, level)?.len())
}

/// Removes a compacted-away source directory, warning rather than failing
/// hard — a filesystem error here aborts the *merge*, not the whole
/// compaction pass.
pub fn remove_table_dir(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), %err, "failed to remove compacted SSTable directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn generate_levels_creates_all_but_level_zero() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        generate_levels(dir.path(), &config).unwrap();
        for level in 1..config.lsm_levels {
            assert!(level_dir(dir.path(), level).is_dir());
        }
        assert!(!level_dir(dir.path(), 0).exists());
    }

    #[test]
    fn get_latest_returns_none_when_all_levels_empty() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        generate_levels(dir.path(), &config).unwrap();
        assert!(get_latest(dir.path(), config.lsm_levels).unwrap().is_none());
    }

    #[test]
    fn get_latest_searches_from_the_top_level_down() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::default();
        generate_levels(dir.path(), &config).unwrap();

        // populate only level 1 (the freshest flush target)
        fs::create_dir_all(level_dir(dir.path(), 1).join("SSTable1")).unwrap();
        let found = get_latest(dir.path(), config.lsm_levels).unwrap();
        assert!(found.unwrap().ends_with("SSTable1"));

        // now populate a higher level too; per the preserved directionality
        // the higher level wins even though level 1 is newer data
        sleep(Duration::from_millis(5));
        fs::create_dir_all(level_dir(dir.path(), 2).join("SSTable1")).unwrap();
        let found = get_latest(dir.path(), config.lsm_levels).unwrap().unwrap();
        assert_eq!(found, level_dir(dir.path(), 2).join("SSTable1"));
    }

    #[test]
    fn tables_by_age_orders_ascending() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(level_dir(dir.path(), 1).join("SSTable1")).unwrap();
        sleep(Duration::from_millis(5));
        fs::create_dir_all(level_dir(dir.path(), 1).join("SSTable2")).unwrap();
        let tables = tables_by_age(dir.path(), 1).unwrap();
        assert!(tables[0].ends_with("SSTable1"));
        assert!(tables[1].ends_with("SSTable2"));
    }
}
