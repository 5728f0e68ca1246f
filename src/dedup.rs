//! Content-addressed duplicate detection (C9): a cheap size-based grouping
//! pass narrows candidates before the expensive digest pass groups them by
//! actual content. Removal of everything but the kept file in each group
//! runs as one transaction per group through the same executor every other
//! mutation goes through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::info;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::digest::{digest_file, HashAlgorithm};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::model::Operation;
use crate::progress::ProgressTracker;
use crate::txn::run_in_transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepPolicy {
    /// Caller names the survivor explicitly; scanning only reports groups.
    Manual,
    Oldest,
    Newest,
    Largest,
    Smallest,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub algorithm: HashAlgorithm,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            recursive: true,
            min_size: None,
            max_size: None,
            include: Vec::new(),
            exclude: Vec::new(),
            algorithm: HashAlgorithm::Sha256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub digest: String,
    pub size: u64,
    /// All paths sharing this content, in directory-walk order.
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Picks the survivor under `policy`. Every path in a group shares
    /// identical content and size, so `Largest`/`Smallest` have no
    /// meaningful distinction to make here and fall back to the
    /// lexicographically-first path for a deterministic choice across runs.
    /// `Oldest`/`Newest` read live mtimes. `Manual` has no well-defined
    /// choice — callers using it resolve the survivor themselves and never
    /// pass a `DuplicateGroup` through [`remove_group`].
    pub fn keep(&self, policy: KeepPolicy) -> Result<&Path> {
        if self.paths.is_empty() {
            return Err(Error::input("duplicate group has no paths"));
        }
        match policy {
            KeepPolicy::Manual => Err(Error::input("manual keep policy requires an explicit survivor")),
            KeepPolicy::Largest | KeepPolicy::Smallest => {
                Ok(self.paths.iter().min().expect("non-empty"))
            }
            KeepPolicy::Oldest => self.pick_by_mtime(true),
            KeepPolicy::Newest => self.pick_by_mtime(false),
        }
    }

    fn pick_by_mtime(&self, oldest: bool) -> Result<&Path> {
        let mut best: Option<(&Path, std::time::SystemTime)> = None;
        for path in &self.paths {
            let modified = std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map_err(|e| Error::filesystem(path, e))?;
            best = Some(match best {
                None => (path, modified),
                Some((bp, bm)) => {
                    let take_new = if oldest { modified < bm } else { modified > bm };
                    if take_new { (path, modified) } else { (bp, bm) }
                }
            });
        }
        Ok(best.expect("non-empty").0)
    }
}

fn matches_filters(path: &Path, options: &ScanOptions) -> bool {
    let name = path.to_string_lossy();
    if !options.include.is_empty() {
        let included = options
            .include
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|p| p.matches(&name));
        if !included {
            return false;
        }
    }
    if options
        .exclude
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches(&name))
    {
        return false;
    }
    true
}

/// Walks `root`, groups files by size, then by digest within each
/// size-group, and returns every group with two or more members.
/// Cooperatively cancellable via `cancel`; reports progress via `progress`.
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
) -> Result<Vec<DuplicateGroup>> {
    let mut by_size: HashMap<u64, Vec<PathBuf>> = HashMap::new();

    let walker = WalkDir::new(root).min_depth(1).max_depth(if options.recursive { usize::MAX } else { 1 });
    progress.set_message("scanning directory tree");
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        cancel.check("duplicate scan")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !matches_filters(path, options) {
            continue;
        }
        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(_) => continue,
        };
        if let Some(min) = options.min_size {
            if size < min {
                continue;
            }
        }
        if let Some(max) = options.max_size {
            if size > max {
                continue;
            }
        }
        by_size.entry(size).or_default().push(path.to_path_buf());
        progress.increment(1);
    }

    let mut groups = Vec::new();
    progress.set_message("hashing size-matched candidates");
    for (size, paths) in by_size {
        if paths.len() < 2 {
            continue;
        }
        let mut by_digest: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for path in paths {
            cancel.check("duplicate scan")?;
            if let Some(digest) = digest_file(&path, options.algorithm) {
                by_digest.entry(digest).or_default().push(path);
            }
        }
        for (digest, paths) in by_digest {
            if paths.len() >= 2 {
                groups.push(DuplicateGroup { digest, size, paths });
            }
        }
    }

    progress.finish_with_message(&format!("found {} duplicate group(s)", groups.len()));
    info!(groups = groups.len(), "duplicate scan complete");
    Ok(groups)
}

/// Deletes every path in `group` except `keep`, all inside one transaction
/// (a partial removal is never left half-applied). Refuses if `keep` is
/// not a member of the group, upholding the invariant that the keep set
/// is never empty (P5).
pub fn remove_group(executor: &Executor, group: &DuplicateGroup, keep: &Path) -> Result<Vec<Operation>> {
    if !group.paths.iter().any(|p| p == keep) {
        return Err(Error::input(format!(
            "keep path {} is not a member of its duplicate group",
            keep.display()
        )));
    }

    run_in_transaction(executor.journal(), Default::default(), |handle| {
        let mut ops = Vec::new();
        for path in &group.paths {
            if path == keep {
                continue;
            }
            ops.push(executor.delete(path, Some(handle))?);
        }
        Ok(ops)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use crate::progress::SilentProgress;
    use crate::trash::TrashStore;
    use tempfile::tempdir;

    #[test]
    fn scan_groups_identical_content_by_digest() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"same").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"same").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"different").unwrap();

        let groups = scan(
            dir.path(),
            &ScanOptions::default(),
            &CancelToken::new(),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].paths.len(), 2);
    }

    #[test]
    fn scan_respects_min_size_filter() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"x").unwrap();

        let options = ScanOptions {
            min_size: Some(100),
            ..ScanOptions::default()
        };
        let groups = scan(dir.path(), &options, &CancelToken::new(), &SilentProgress).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn keep_breaks_ties_lexicographically() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();

        let group = DuplicateGroup {
            digest: "irrelevant".to_string(),
            size: 4,
            paths: vec![b.clone(), a.clone()],
        };
        assert_eq!(group.keep(KeepPolicy::Largest).unwrap(), a.as_path());
    }

    #[test]
    fn remove_group_deletes_everything_but_the_keep_path() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("history.db")).unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();

        let group = DuplicateGroup {
            digest: "x".to_string(),
            size: 4,
            paths: vec![a.clone(), b.clone()],
        };
        remove_group(&executor, &group, &a).unwrap();

        assert!(a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn remove_group_rejects_keep_path_outside_group() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("history.db")).unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let group = DuplicateGroup {
            digest: "x".to_string(),
            size: 4,
            paths: vec![dir.path().join("a.txt")],
        };
        assert!(remove_group(&executor, &group, &dir.path().join("elsewhere.txt")).is_err());
    }
}
