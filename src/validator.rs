//! Decides whether a recorded operation can still be safely reversed given
//! the current filesystem (C7). Never mutates the filesystem or the
//! journal — it only reads and reports.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::digest::{digest_file, HashAlgorithm};
use crate::error::Result;
use crate::model::{Operation, OperationKind};
use crate::trash::TrashStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    FileModified,
    FileMissing,
    PathOccupied,
    PermissionDenied,
    DiskSpace,
    ParentMissing,
    /// Convenience alias of `FileModified` when emitted by an explicit
    /// integrity check rather than a generic presence check.
    HashMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub path: PathBuf,
    pub description: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl Conflict {
    fn new(conflict_type: ConflictType, path: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        Conflict {
            conflict_type,
            path: path.into(),
            description: description.into(),
            expected: None,
            actual: None,
        }
    }

    fn with_digests(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub can_proceed: bool,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

impl ValidationResult {
    fn ok(warnings: Vec<String>) -> Self {
        ValidationResult {
            can_proceed: true,
            conflicts: Vec::new(),
            warnings,
            error_message: None,
        }
    }

    fn blocked(conflicts: Vec<Conflict>, warnings: Vec<String>) -> Self {
        let error_message = conflicts.first().map(|c| c.description.clone());
        ValidationResult {
            can_proceed: false,
            conflicts,
            warnings,
            error_message,
        }
    }

    /// Collapses a blocked result into `Error::Precondition`, for callers
    /// that want undo/redo to short-circuit on the first conflict rather
    /// than inspect `conflicts` themselves.
    pub fn into_result(self) -> crate::error::Result<()> {
        if self.can_proceed {
            Ok(())
        } else {
            Err(crate::error::Error::Precondition(self.conflicts))
        }
    }
}

pub struct Validator<'a> {
    trash: &'a TrashStore,
    algorithm: HashAlgorithm,
}

impl<'a> Validator<'a> {
    pub fn new(trash: &'a TrashStore, algorithm: HashAlgorithm) -> Self {
        Validator { trash, algorithm }
    }

    fn check_digest(&self, path: &Path, expected: &str) -> Option<Conflict> {
        match digest_file(path, self.algorithm) {
            Some(actual) if actual == expected => None,
            Some(actual) => Some(
                Conflict::new(
                    ConflictType::FileModified,
                    path,
                    format!("content at {} no longer matches the recorded digest", path.display()),
                )
                .with_digests(expected, actual),
            ),
            None => Some(Conflict::new(
                ConflictType::FileMissing,
                path,
                format!("could not read {} to verify its digest", path.display()),
            )),
        }
    }

    fn check_parent_exists(&self, path: &Path) -> Option<Conflict> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => Some(Conflict::new(
                ConflictType::ParentMissing,
                parent,
                format!("parent directory {} does not exist", parent.display()),
            )),
            _ => None,
        }
    }

    fn check_available(&self, path: &Path) -> Option<Conflict> {
        if path.symlink_metadata().is_ok() {
            Some(Conflict::new(
                ConflictType::PathOccupied,
                path,
                format!("{} is already occupied", path.display()),
            ))
        } else {
            None
        }
    }

    fn check_missing(&self, path: &Path) -> Option<Conflict> {
        if path.symlink_metadata().is_ok() {
            None
        } else {
            Some(Conflict::new(
                ConflictType::FileMissing,
                path,
                format!("expected file at {} is not there", path.display()),
            ))
        }
    }

    fn check_writable_parent(&self, path: &Path) -> Option<Conflict> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty())?;
        let meta = std::fs::metadata(parent).ok()?;
        if meta.permissions().readonly() {
            Some(Conflict::new(
                ConflictType::PermissionDenied,
                parent,
                format!("insufficient permissions to write into {}", parent.display()),
            ))
        } else {
            None
        }
    }

    fn check_disk_space(&self, destination_parent: &Path, required: u64) -> Option<Conflict> {
        match fs2::available_space(destination_parent) {
            Ok(available) if available < required => Some(Conflict::new(
                ConflictType::DiskSpace,
                destination_parent,
                format!(
                    "need {required} bytes at {} but only {available} available",
                    destination_parent.display()
                ),
            )),
            _ => None,
        }
    }

    fn status_warning(&self, op: &Operation) -> Vec<String> {
        if op.status != crate::model::OperationStatus::Completed {
            vec![format!(
                "operation {} has status {:?}, not Completed",
                op.id, op.status
            )]
        } else {
            Vec::new()
        }
    }

    /// Decides whether reversing `op` is safe right now.
    pub fn validate_undo(&self, op: &Operation) -> Result<ValidationResult> {
        let warnings = self.status_warning(op);
        let mut conflicts = Vec::new();

        match op.kind {
            OperationKind::Move | OperationKind::Rename => {
                let dst = op.destination.as_ref().expect("move/rename always records a destination");
                if let Some(c) = self.check_missing(dst) {
                    conflicts.push(c);
                } else if let Some(digest) = &op.content_digest {
                    if let Some(c) = self.check_digest(dst, digest) {
                        conflicts.push(c);
                    }
                }
                if let Some(c) = self.check_available(&op.source) {
                    conflicts.push(c);
                }
                if let Some(c) = self.check_parent_exists(&op.source) {
                    conflicts.push(c);
                }
            }
            OperationKind::Delete => {
                let basename = op.source.file_name().unwrap_or_default();
                match self.trash.slot_path(op.id, basename) {
                    Some(trashed) => {
                        if let Some(digest) = &op.content_digest {
                            if let Some(c) = self.check_digest(&trashed, digest) {
                                conflicts.push(c);
                            }
                        }
                    }
                    None => conflicts.push(Conflict::new(
                        ConflictType::FileMissing,
                        self.trash.root().join(op.id.to_string()),
                        format!("no trash entry for operation {}", op.id),
                    )),
                }
                if let Some(c) = self.check_available(&op.source) {
                    conflicts.push(c);
                }
                if let Some(c) = self.check_parent_exists(&op.source) {
                    conflicts.push(c);
                }
            }
            OperationKind::Copy => {
                let dst = op.destination.as_ref().expect("copy always records a destination");
                if let Some(c) = self.check_missing(dst) {
                    conflicts.push(c);
                } else if let Some(digest) = &op.content_digest {
                    if let Some(c) = self.check_digest(dst, digest) {
                        conflicts.push(c);
                    }
                }
            }
            OperationKind::Create => {
                if let Some(c) = self.check_missing(&op.source) {
                    conflicts.push(c);
                }
            }
        }

        if conflicts.is_empty() {
            Ok(ValidationResult::ok(warnings))
        } else {
            Ok(ValidationResult::blocked(conflicts, warnings))
        }
    }

    /// Decides whether re-applying `op` (after it was undone) is safe.
    pub fn validate_redo(&self, op: &Operation) -> Result<ValidationResult> {
        let warnings = self.status_warning(op);
        let mut conflicts = Vec::new();

        match op.kind {
            OperationKind::Move | OperationKind::Rename => {
                let dst = op.destination.as_ref().expect("move/rename always records a destination");
                if let Some(c) = self.check_missing(&op.source) {
                    conflicts.push(c);
                }
                if let Some(c) = self.check_available(dst) {
                    conflicts.push(c);
                }
                if let Some(c) = self.check_parent_exists(dst) {
                    conflicts.push(c);
                }
            }
            OperationKind::Delete => {
                if let Some(c) = self.check_missing(&op.source) {
                    conflicts.push(c);
                }
            }
            OperationKind::Copy => {
                let dst = op.destination.as_ref().expect("copy always records a destination");
                if let Some(c) = self.check_missing(&op.source) {
                    conflicts.push(c);
                }
                if let Some(c) = self.check_available(dst) {
                    conflicts.push(c);
                }
                if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
                    if let Some(size) = op.metadata.size {
                        if let Some(c) = self.check_disk_space(parent, size) {
                            conflicts.push(c);
                        }
                    }
                }
            }
            OperationKind::Create => {
                if let Some(c) = self.check_available(&op.source) {
                    conflicts.push(c);
                }
            }
        }

        if conflicts.is_empty() {
            Ok(ValidationResult::ok(warnings))
        } else {
            Ok(ValidationResult::blocked(conflicts, warnings))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use crate::model::{OperationMetadata, OperationStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    fn base_operation(kind: OperationKind, source: PathBuf, destination: Option<PathBuf>) -> Operation {
        Operation {
            id: 1,
            kind,
            timestamp: Utc::now(),
            source,
            destination,
            content_digest: None,
            metadata: OperationMetadata::default(),
            transaction_id: None,
            status: OperationStatus::Completed,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn undo_move_succeeds_when_destination_matches_digest() {
        let dir = tempdir().unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let validator = Validator::new(&trash, HashAlgorithm::Sha256);

        let dst = dir.path().join("b/a.txt");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, b"hello").unwrap();

        let mut op = base_operation(OperationKind::Move, dir.path().join("a.txt"), Some(dst.clone()));
        op.content_digest = Some(hash_bytes(HashAlgorithm::Sha256, b"hello"));

        let result = validator.validate_undo(&op).unwrap();
        assert!(result.can_proceed);
        assert!(result.conflicts.is_empty());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn blocked_validation_result_collapses_to_precondition_error() {
        let dir = tempdir().unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let validator = Validator::new(&trash, HashAlgorithm::Sha256);

        let op = base_operation(OperationKind::Delete, dir.path().join("gone.txt"), None);
        let result = validator.validate_undo(&op).unwrap();
        assert!(matches!(result.into_result(), Err(crate::error::Error::Precondition(_))));
    }

    #[test]
    fn undo_move_reports_file_modified_conflict() {
        let dir = tempdir().unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let validator = Validator::new(&trash, HashAlgorithm::Sha256);

        let dst = dir.path().join("b/a.txt");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, b"tampered").unwrap();

        let mut op = base_operation(OperationKind::Move, dir.path().join("a.txt"), Some(dst.clone()));
        op.content_digest = Some(hash_bytes(HashAlgorithm::Sha256, b"hello"));

        let result = validator.validate_undo(&op).unwrap();
        assert!(!result.can_proceed);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::FileModified);
    }

    #[test]
    fn undo_delete_with_missing_trash_is_file_missing() {
        let dir = tempdir().unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let validator = Validator::new(&trash, HashAlgorithm::Sha256);

        let op = base_operation(OperationKind::Delete, dir.path().join("gone.txt"), None);
        let result = validator.validate_undo(&op).unwrap();
        assert!(!result.can_proceed);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::FileMissing);
    }

    #[test]
    fn redo_move_requires_source_path_and_free_destination() {
        let dir = tempdir().unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let validator = Validator::new(&trash, HashAlgorithm::Sha256);

        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();
        let dst = dir.path().join("b.txt");

        let op = base_operation(OperationKind::Move, src, Some(dst));
        let result = validator.validate_redo(&op).unwrap();
        assert!(result.can_proceed);
    }

    #[test]
    fn redo_create_blocked_when_path_already_occupied() {
        let dir = tempdir().unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        let validator = Validator::new(&trash, HashAlgorithm::Sha256);

        let path = dir.path().join("new.txt");
        std::fs::write(&path, b"").unwrap();
        let op = base_operation(OperationKind::Create, path, None);

        let result = validator.validate_redo(&op).unwrap();
        assert!(!result.can_proceed);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::PathOccupied);
    }
}
