//! Explicit configuration, plumbed through constructors rather than read
//! from global singletons. The only ambient input is the filesystem itself.

use std::path::PathBuf;

use crate::digest::HashAlgorithm;
use crate::error::{Error, Result};

/// Default compaction thresholds (§4.1.1).
#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    pub max_operations: u64,
    pub max_age_days: i64,
    pub max_size_bytes: u64,
    pub batch_size: u64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        CompactionPolicy {
            max_operations: 10_000,
            max_age_days: 90,
            max_size_bytes: 100 * 1024 * 1024,
            batch_size: 1_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub trash_root: PathBuf,
    pub hash_algorithm: HashAlgorithm,
    pub compaction: CompactionPolicy,
}

impl Config {
    /// Resolve `~/.file_organizer/{history.db,trash}` via the platform home
    /// directory, matching the persisted state layout in §6.
    pub fn default_paths() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::input("could not determine home directory"))?;
        let base = home.join(".file_organizer");
        Ok(Config {
            db_path: base.join("history.db"),
            trash_root: base.join("trash"),
            hash_algorithm: HashAlgorithm::Sha256,
            compaction: CompactionPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_nests_under_file_organizer() {
        let config = Config::default_paths().unwrap();
        assert!(config.db_path.ends_with("history.db"));
        assert!(config.trash_root.ends_with("trash"));
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn compaction_defaults_match_spec() {
        let policy = CompactionPolicy::default();
        assert_eq!(policy.max_operations, 10_000);
        assert_eq!(policy.max_age_days, 90);
        assert_eq!(policy.max_size_bytes, 100 * 1024 * 1024);
        assert_eq!(policy.batch_size, 1_000);
    }
}
