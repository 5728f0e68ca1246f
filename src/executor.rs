//! Performs one filesystem mutation per call and records it (C5).
//!
//! A record is appended only after the mutation has succeeded. If recording
//! fails after the filesystem succeeded, the executor attempts to revert the
//! change, best-effort, before propagating the error.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::digest::{digest_file, HashAlgorithm};
use crate::error::{Error, Result};
use crate::fsops::{copy_file_fsynced, ensure_parent_dir, move_path_atomic, path_exists};
use crate::journal::{Journal, NewOperation};
use crate::model::{Operation, OperationKind, OperationMetadata, OperationStatus};
use crate::trash::TrashStore;
use crate::txn::TransactionHandle;

pub struct Executor<'a> {
    journal: &'a Journal,
    trash: &'a TrashStore,
    algorithm: HashAlgorithm,
}

impl<'a> Executor<'a> {
    pub fn new(journal: &'a Journal, trash: &'a TrashStore, algorithm: HashAlgorithm) -> Self {
        Executor { journal, trash, algorithm }
    }

    pub fn journal(&self) -> &'a Journal {
        self.journal
    }

    fn transaction_id(txn: Option<&TransactionHandle>) -> Option<String> {
        txn.map(|h| h.id().to_string())
    }

    /// Appends the record for an already-applied mutation. If the append
    /// fails, invokes `revert` best-effort before propagating the error.
    fn finalize<F>(&self, draft: NewOperation, revert: F) -> Result<Operation>
    where
        F: FnOnce(),
    {
        match self.journal.append_operation(draft) {
            Ok(id) => {
                let op = self
                    .journal
                    .get_operation(id)?
                    .expect("just-inserted operation must exist");
                Ok(op)
            }
            Err(e) => {
                warn!(error = %e, "journal append failed after fs mutation, reverting best-effort");
                revert();
                Err(e)
            }
        }
    }

    pub fn mv(&self, src: &Path, dst: &Path, txn: Option<&TransactionHandle>) -> Result<Operation> {
        let meta = fs::symlink_metadata(src).map_err(|e| Error::filesystem(src, e))?;
        if !meta.is_file() {
            return Err(Error::input(format!("move source is not a regular file: {}", src.display())));
        }
        if path_exists(dst) {
            return Err(Error::input(format!("move destination already exists: {}", dst.display())));
        }
        ensure_parent_dir(dst)?;

        let digest = digest_file(src, self.algorithm);
        let metadata = OperationMetadata::from_path(src);

        move_path_atomic(src, dst)?;
        info!(src = %src.display(), dst = %dst.display(), "moved file");

        let src_owned = src.to_path_buf();
        let dst_owned = dst.to_path_buf();
        self.finalize(
            NewOperation {
                kind: OperationKind::Move,
                source: src.to_path_buf(),
                destination: Some(dst.to_path_buf()),
                content_digest: digest,
                metadata,
                transaction_id: Self::transaction_id(txn),
                status: OperationStatus::Completed,
                error_message: None,
            },
            move || {
                let _ = move_path_atomic(&dst_owned, &src_owned);
            },
        )
    }

    /// As [`Executor::mv`] but requires `src` and `dst` to share a parent
    /// directory (a same-parent name change).
    pub fn rename(&self, src: &Path, dst: &Path, txn: Option<&TransactionHandle>) -> Result<Operation> {
        if src.parent() != dst.parent() {
            return Err(Error::input("rename requires src and dst to share a parent directory"));
        }
        if !path_exists(src) {
            return Err(Error::input(format!("rename source does not exist: {}", src.display())));
        }
        if path_exists(dst) {
            return Err(Error::input(format!("rename destination already exists: {}", dst.display())));
        }

        let digest = digest_file(src, self.algorithm);
        let metadata = OperationMetadata::from_path(src);

        move_path_atomic(src, dst)?;
        info!(src = %src.display(), dst = %dst.display(), "renamed file");

        let src_owned = src.to_path_buf();
        let dst_owned = dst.to_path_buf();
        self.finalize(
            NewOperation {
                kind: OperationKind::Rename,
                source: src.to_path_buf(),
                destination: Some(dst.to_path_buf()),
                content_digest: digest,
                metadata,
                transaction_id: Self::transaction_id(txn),
                status: OperationStatus::Completed,
                error_message: None,
            },
            move || {
                let _ = move_path_atomic(&dst_owned, &src_owned);
            },
        )
    }

    /// Deletes `src` by reserving a record id, moving the bytes to trash
    /// under that id, then finalising the record — the two-step sequence
    /// named in §4.5 so the trash slot and the record agree on the id.
    pub fn delete(&self, src: &Path, txn: Option<&TransactionHandle>) -> Result<Operation> {
        if !path_exists(src) {
            return Err(Error::input(format!("delete source does not exist: {}", src.display())));
        }

        let digest = digest_file(src, self.algorithm);
        let metadata = OperationMetadata::from_path(src);

        let id = self.journal.append_operation(NewOperation {
            kind: OperationKind::Delete,
            source: src.to_path_buf(),
            destination: None,
            content_digest: digest,
            metadata,
            transaction_id: Self::transaction_id(txn),
            status: OperationStatus::Pending,
            error_message: None,
        })?;

        match self.trash.move_to_trash(src, id) {
            Ok(_) => {
                self.journal.update_operation_status(id, OperationStatus::Completed, None)?;
                info!(id, src = %src.display(), "deleted file (trashed)");
            }
            Err(e) => {
                self.journal
                    .update_operation_status(id, OperationStatus::Failed, Some(&e.to_string()))?;
                return Err(e);
            }
        }

        Ok(self.journal.get_operation(id)?.expect("just-finalized operation must exist"))
    }

    pub fn copy(&self, src: &Path, dst: &Path, txn: Option<&TransactionHandle>) -> Result<Operation> {
        let meta = fs::symlink_metadata(src).map_err(|e| Error::filesystem(src, e))?;
        if !meta.is_file() {
            return Err(Error::input(format!("copy source is not a regular file: {}", src.display())));
        }
        if path_exists(dst) {
            return Err(Error::input(format!("copy destination already exists: {}", dst.display())));
        }
        ensure_parent_dir(dst)?;

        let digest = digest_file(src, self.algorithm);
        let metadata = OperationMetadata::from_path(src);

        copy_file_fsynced(src, dst)?;
        info!(src = %src.display(), dst = %dst.display(), "copied file");

        let dst_owned = dst.to_path_buf();
        self.finalize(
            NewOperation {
                kind: OperationKind::Copy,
                source: src.to_path_buf(),
                destination: Some(dst.to_path_buf()),
                content_digest: digest,
                metadata,
                transaction_id: Self::transaction_id(txn),
                status: OperationStatus::Completed,
                error_message: None,
            },
            move || {
                let _ = fs::remove_file(&dst_owned);
            },
        )
    }

    /// Creates an empty regular file, or a directory when `is_dir` is set.
    /// Digest is omitted (empty content).
    pub fn create(&self, path: &Path, is_dir: bool, txn: Option<&TransactionHandle>) -> Result<Operation> {
        if path_exists(path) {
            return Err(Error::input(format!("create target already exists: {}", path.display())));
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                return Err(Error::input(format!("create parent does not exist: {}", parent.display())));
            }
            _ => {}
        }

        if is_dir {
            fs::create_dir(path).map_err(|e| Error::filesystem(path, e))?;
        } else {
            fs::File::create(path).map_err(|e| Error::filesystem(path, e))?;
        }
        info!(path = %path.display(), is_dir, "created path");

        let metadata = OperationMetadata {
            is_file: !is_dir,
            is_dir,
            ..OperationMetadata::from_path(path)
        };

        let path_owned = path.to_path_buf();
        self.finalize(
            NewOperation {
                kind: OperationKind::Create,
                source: path.to_path_buf(),
                destination: None,
                content_digest: None,
                metadata,
                transaction_id: Self::transaction_id(txn),
                status: OperationStatus::Completed,
                error_message: None,
            },
            move || {
                if is_dir {
                    let _ = fs::remove_dir(&path_owned);
                } else {
                    let _ = fs::remove_file(&path_owned);
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Journal, TrashStore) {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("history.db")).unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        (dir, journal, trash)
    }

    #[test]
    fn move_records_digest_and_moves_bytes() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let src = dir.path().join("a.txt");
        let dst = dir.path().join("sub/a.txt");
        std::fs::write(&src, b"hello").unwrap();

        let op = executor.mv(&src, &dst, None).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello");
        assert_eq!(op.kind, OperationKind::Move);
        assert!(op.content_digest.is_some());
        assert_eq!(op.status, OperationStatus::Completed);
    }

    #[test]
    fn move_rejects_existing_destination() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, b"hello").unwrap();
        std::fs::write(&dst, b"occupied").unwrap();

        assert!(executor.mv(&src, &dst, None).is_err());
    }

    #[test]
    fn rename_requires_same_parent() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();
        let dst = dir.path().join("sub/a.txt");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();

        assert!(executor.rename(&src, &dst, None).is_err());
        assert!(src.exists());
    }

    #[test]
    fn delete_moves_bytes_to_trash_and_completes_record() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let src = dir.path().join("x.txt");
        std::fs::write(&src, b"v1").unwrap();

        let op = executor.delete(&src, None).unwrap();
        assert!(!src.exists());
        assert_eq!(op.status, OperationStatus::Completed);
        assert!(trash.slot_path(op.id, std::ffi::OsStr::new("x.txt")).is_some());
    }

    #[test]
    fn copy_leaves_source_untouched() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&src, b"hello").unwrap();

        executor.copy(&src, &dst, None).unwrap();
        assert!(src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn create_file_then_dir() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);

        let file_path = dir.path().join("new.txt");
        let op = executor.create(&file_path, false, None).unwrap();
        assert!(file_path.is_file());
        assert!(op.content_digest.is_none());

        let dir_path = dir.path().join("new_dir");
        let op = executor.create(&dir_path, true, None).unwrap();
        assert!(dir_path.is_dir());
        assert!(op.metadata.is_dir);
    }

    #[test]
    fn create_rejects_missing_parent() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);
        let path = dir.path().join("missing_parent/new.txt");
        assert!(executor.create(&path, false, None).is_err());
    }
}
