//! Per-operation holding area for logically deleted files (C6).
//!
//! Layout: `trash_root/<operation_id>/<basename>`. Moves are atomic renames
//! when source and trash root share a filesystem, falling back to
//! copy-then-fsync-then-remove on `EXDEV`, the same primitive the FS
//! executor uses for cross-device Move.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fsops::move_path_atomic;

pub struct TrashStore {
    root: PathBuf,
}

impl TrashStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TrashStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_dir(&self, operation_id: i64) -> PathBuf {
        self.root.join(operation_id.to_string())
    }

    /// Moves `path` into `trash_root/<operation_id>/<basename>`, creating the
    /// per-operation directory as needed. Atomic rename when possible.
    pub fn move_to_trash(&self, path: &Path, operation_id: i64) -> Result<PathBuf> {
        let basename = path
            .file_name()
            .ok_or_else(|| Error::input(format!("path has no file name: {}", path.display())))?;
        let slot = self.slot_dir(operation_id);
        fs::create_dir_all(&slot).map_err(|e| Error::filesystem(&slot, e))?;
        let dest = slot.join(basename);

        move_path_atomic(path, &dest)?;
        info!(operation_id, dest = %dest.display(), "moved file to trash");
        Ok(dest)
    }

    /// Moves the trashed file for `operation_id` back to `original_path`.
    /// Removes the now-empty per-operation directory afterwards.
    pub fn restore_from_trash(&self, operation_id: i64, original_path: &Path) -> Result<()> {
        let basename = original_path.file_name().ok_or_else(|| {
            Error::input(format!("path has no file name: {}", original_path.display()))
        })?;
        let slot = self.slot_dir(operation_id);
        let trashed = slot.join(basename);

        if !trashed.exists() {
            return Err(Error::input(format!(
                "no trash entry for operation {operation_id} at {}",
                trashed.display()
            )));
        }

        if let Some(parent) = original_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }
        move_path_atomic(&trashed, original_path)?;

        if slot.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&slot);
        }
        debug!(operation_id, "restored file from trash");
        Ok(())
    }

    /// The stored path for `operation_id`'s trashed file, or `None` if the
    /// per-id slot doesn't hold it. Does not search by basename — callers
    /// wanting the repair-only fallback use [`TrashStore::locate`].
    pub fn slot_path(&self, operation_id: i64, basename: &std::ffi::OsStr) -> Option<PathBuf> {
        let candidate = self.slot_dir(operation_id).join(basename);
        candidate.exists().then_some(candidate)
    }

    /// Returns the stored path, or — if the per-id slot is missing — a
    /// best-effort search for a file with the same basename anywhere under
    /// the trash root. Repair/rescue only; never used by normal undo.
    pub fn locate(&self, operation_id: i64, basename: &std::ffi::OsStr) -> Option<PathBuf> {
        if let Some(found) = self.slot_path(operation_id, basename) {
            return Some(found);
        }
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == basename {
                return Some(entry.into_path());
            }
        }
        None
    }

    /// Removes the per-operation trash directory entirely. Called by
    /// compaction once the enclosing Delete record has been evicted; never
    /// called while the record still exists (P6).
    pub fn evict(&self, operation_id: i64) -> Result<()> {
        let slot = self.slot_dir(operation_id);
        if slot.exists() {
            fs::remove_dir_all(&slot).map_err(|e| Error::filesystem(&slot, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn move_to_trash_then_restore_round_trips() {
        let workdir = tempdir().unwrap();
        let trash_root = tempdir().unwrap();
        let store = TrashStore::new(trash_root.path());

        let original = workdir.path().join("x.txt");
        std::fs::write(&original, b"v1").unwrap();

        let trashed = store.move_to_trash(&original, 1).unwrap();
        assert!(!original.exists());
        assert!(trashed.exists());

        store.restore_from_trash(1, &original).unwrap();
        assert!(original.exists());
        assert_eq!(std::fs::read(&original).unwrap(), b"v1");
    }

    #[test]
    fn restore_fails_when_slot_missing() {
        let trash_root = tempdir().unwrap();
        let store = TrashStore::new(trash_root.path());
        let result = store.restore_from_trash(999, Path::new("/tmp/whatever.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn locate_falls_back_to_basename_search() {
        let trash_root = tempdir().unwrap();
        let store = TrashStore::new(trash_root.path());

        // Simulate a misplaced trash entry under a different operation id.
        let misplaced_dir = trash_root.path().join("7");
        std::fs::create_dir_all(&misplaced_dir).unwrap();
        let mut f = std::fs::File::create(misplaced_dir.join("lost.txt")).unwrap();
        f.write_all(b"hi").unwrap();

        let found = store.locate(999, std::ffi::OsStr::new("lost.txt"));
        assert!(found.is_some());
    }

    #[test]
    fn evict_removes_slot_directory() {
        let workdir = tempdir().unwrap();
        let trash_root = tempdir().unwrap();
        let store = TrashStore::new(trash_root.path());

        let original = workdir.path().join("y.txt");
        std::fs::write(&original, b"bye").unwrap();
        store.move_to_trash(&original, 5).unwrap();

        store.evict(5).unwrap();
        assert!(store.slot_path(5, std::ffi::OsStr::new("y.txt")).is_none());
    }
}
