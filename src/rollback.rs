//! Reverses recorded operations (C8): the inverse filesystem mutation for a
//! single operation, whole-transaction rollback in reverse order, and an
//! undo/redo facade over the journal for callers that think in terms of
//! "last thing I did" rather than explicit ids.

use std::fs;

use tracing::{info, warn};

use crate::digest::HashAlgorithm;
use crate::error::{Error, Result};
use crate::fsops::move_path_atomic;
use crate::journal::Journal;
use crate::model::{Operation, OperationKind, OperationStatus, QueryFilter, TransactionStatus};
use crate::trash::TrashStore;
use crate::validator::{ValidationResult, Validator};

/// What happened to one operation id during a transaction-wide rollback.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub operation_id: i64,
    pub error: Option<String>,
}

pub struct RollbackExecutor<'a> {
    journal: &'a Journal,
    trash: &'a TrashStore,
    validator: Validator<'a>,
}

impl<'a> RollbackExecutor<'a> {
    pub fn new(journal: &'a Journal, trash: &'a TrashStore, algorithm: HashAlgorithm) -> Self {
        RollbackExecutor {
            journal,
            trash,
            validator: Validator::new(trash, algorithm),
        }
    }

    /// Reverses the filesystem effect of a single Completed operation and
    /// marks it RolledBack. Validates first; refuses on any conflict.
    pub fn undo_operation(&self, op: &Operation) -> Result<ValidationResult> {
        let validation = self.validator.validate_undo(op)?;
        if !validation.can_proceed {
            return Ok(validation);
        }

        match op.kind {
            OperationKind::Move | OperationKind::Rename => {
                let dst = op.destination.as_ref().expect("move/rename always records a destination");
                move_path_atomic(dst, &op.source)?;
            }
            OperationKind::Delete => {
                self.trash.restore_from_trash(op.id, &op.source)?;
            }
            OperationKind::Copy => {
                let dst = op.destination.as_ref().expect("copy always records a destination");
                fs::remove_file(dst).map_err(|e| Error::filesystem(dst, e))?;
            }
            OperationKind::Create => {
                if op.metadata.is_dir {
                    fs::remove_dir(&op.source).map_err(|e| Error::filesystem(&op.source, e))?;
                } else {
                    fs::remove_file(&op.source).map_err(|e| Error::filesystem(&op.source, e))?;
                }
            }
        }

        self.journal.update_operation_status(op.id, OperationStatus::RolledBack, None)?;
        info!(id = op.id, kind = op.kind.as_str(), "undone operation");
        Ok(validation)
    }

    /// Re-applies a previously undone operation's filesystem effect and
    /// marks it Completed again.
    pub fn redo_operation(&self, op: &Operation) -> Result<ValidationResult> {
        let validation = self.validator.validate_redo(op)?;
        if !validation.can_proceed {
            return Ok(validation);
        }

        match op.kind {
            OperationKind::Move | OperationKind::Rename => {
                let dst = op.destination.as_ref().expect("move/rename always records a destination");
                move_path_atomic(&op.source, dst)?;
            }
            OperationKind::Delete => {
                self.trash.move_to_trash(&op.source, op.id)?;
            }
            OperationKind::Copy => {
                let dst = op.destination.as_ref().expect("copy always records a destination");
                crate::fsops::copy_file_fsynced(&op.source, dst)?;
            }
            OperationKind::Create => {
                if op.metadata.is_dir {
                    fs::create_dir(&op.source).map_err(|e| Error::filesystem(&op.source, e))?;
                } else {
                    fs::File::create(&op.source).map_err(|e| Error::filesystem(&op.source, e))?;
                }
            }
        }

        self.journal.update_operation_status(op.id, OperationStatus::Completed, None)?;
        info!(id = op.id, kind = op.kind.as_str(), "redone operation");
        Ok(validation)
    }

    /// Rolls back every operation of a transaction in reverse id order,
    /// fail-fast: the first unrecoverable conflict stops the walk and the
    /// transaction is marked PartiallyRolledBack rather than RolledBack.
    pub fn undo_transaction(&self, transaction_id: &str) -> Result<Vec<RollbackOutcome>> {
        let mut ops = self.journal.operations_for_transaction(transaction_id)?;
        ops.reverse();

        let mut outcomes = Vec::with_capacity(ops.len());
        let mut all_ok = true;

        for op in &ops {
            if op.status != OperationStatus::Completed {
                continue;
            }
            match self.undo_operation(op) {
                Ok(validation) if validation.can_proceed => {
                    outcomes.push(RollbackOutcome { operation_id: op.id, error: None });
                }
                Ok(validation) => {
                    all_ok = false;
                    outcomes.push(RollbackOutcome {
                        operation_id: op.id,
                        error: validation.error_message,
                    });
                    break;
                }
                Err(e) => {
                    all_ok = false;
                    outcomes.push(RollbackOutcome {
                        operation_id: op.id,
                        error: Some(e.to_string()),
                    });
                    break;
                }
            }
        }

        // The data model has no distinct "fully rolled back" terminal state;
        // a clean reversal reuses Failed (the same status a transaction
        // gets when it fails mid-flight), reserving PartiallyRolledBack for
        // a reversal that stopped partway through.
        let status = if all_ok {
            TransactionStatus::Failed
        } else {
            TransactionStatus::PartiallyRolledBack
        };
        self.journal.update_transaction_status(transaction_id, status)?;
        warn!(transaction_id, all_ok, "transaction rollback finished");
        Ok(outcomes)
    }
}

/// Convenience facade over the journal for "undo the last thing" style
/// callers (CLI `undo`/`redo` subcommands). Dry-run variants call the
/// validator only, matching the "never mutates" requirement on inspection.
pub struct UndoManager<'a> {
    journal: &'a Journal,
    executor: RollbackExecutor<'a>,
    validator: Validator<'a>,
}

impl<'a> UndoManager<'a> {
    pub fn new(journal: &'a Journal, trash: &'a TrashStore, algorithm: HashAlgorithm) -> Self {
        UndoManager {
            journal,
            executor: RollbackExecutor::new(journal, trash, algorithm),
            validator: Validator::new(trash, algorithm),
        }
    }

    fn most_recent(&self, status: OperationStatus) -> Result<Option<Operation>> {
        let filter = QueryFilter {
            status: Some(status),
            limit: Some(1),
            ascending: false,
            ..Default::default()
        };
        Ok(self.journal.query(&filter)?.into_iter().next())
    }

    pub fn undo_last(&self) -> Result<Option<ValidationResult>> {
        match self.most_recent(OperationStatus::Completed)? {
            Some(op) => Ok(Some(self.executor.undo_operation(&op)?)),
            None => Ok(None),
        }
    }

    pub fn undo_operation(&self, id: i64) -> Result<ValidationResult> {
        let op = self
            .journal
            .get_operation(id)?
            .ok_or_else(|| Error::input(format!("no such operation id {id}")))?;
        self.executor.undo_operation(&op)
    }

    pub fn undo_transaction(&self, transaction_id: &str) -> Result<Vec<RollbackOutcome>> {
        self.executor.undo_transaction(transaction_id)
    }

    pub fn redo_last(&self) -> Result<Option<ValidationResult>> {
        match self.most_recent(OperationStatus::RolledBack)? {
            Some(op) => Ok(Some(self.executor.redo_operation(&op)?)),
            None => Ok(None),
        }
    }

    pub fn redo_operation(&self, id: i64) -> Result<ValidationResult> {
        let op = self
            .journal
            .get_operation(id)?
            .ok_or_else(|| Error::input(format!("no such operation id {id}")))?;
        self.executor.redo_operation(&op)
    }

    /// Reports whether the most recent Completed operation could be undone
    /// right now, without touching the filesystem or the journal.
    pub fn can_undo(&self) -> Result<bool> {
        match self.most_recent(OperationStatus::Completed)? {
            Some(op) => Ok(self.validator.validate_undo(&op)?.can_proceed),
            None => Ok(false),
        }
    }

    pub fn can_redo(&self) -> Result<bool> {
        match self.most_recent(OperationStatus::RolledBack)? {
            Some(op) => Ok(self.validator.validate_redo(&op)?.can_proceed),
            None => Ok(false),
        }
    }
}
