//! Scoped transaction context (C4): guaranteed commit-or-rollback on every
//! exit path. Mirrors a scope/guard pattern — acquire at the top of a block,
//! release on every exit including the abnormal ones via `Drop`.

use std::cell::Cell;

use tracing::{info, warn};

use crate::error::Result;
use crate::journal::Journal;
use crate::model::{OperationStatus, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open,
    Committed,
    RolledBack,
}

/// A live transaction. Not `Sync` — a transaction is single-threaded from
/// the caller's point of view; multiple transactions may be open
/// concurrently in separate scopes since C1 serialises the writes itself.
pub struct TransactionHandle<'a> {
    journal: &'a Journal,
    transaction_id: String,
    state: Cell<HandleState>,
}

impl<'a> TransactionHandle<'a> {
    pub(crate) fn begin(journal: &'a Journal, metadata: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let txn = journal.append_transaction(metadata)?;
        info!(transaction_id = %txn.transaction_id, "began transaction");
        Ok(TransactionHandle {
            journal,
            transaction_id: txn.transaction_id,
            state: Cell::new(HandleState::Open),
        })
    }

    pub fn id(&self) -> &str {
        &self.transaction_id
    }

    /// Marks the transaction Completed. A no-op if already committed;
    /// rejected if the handle already rolled back.
    pub fn commit(&self) -> Result<()> {
        match self.state.get() {
            HandleState::Committed => return Ok(()),
            HandleState::RolledBack => {
                return Err(crate::error::Error::input(format!(
                    "cannot commit transaction {}: already rolled back",
                    self.transaction_id
                )))
            }
            HandleState::Open => {}
        }
        self.journal
            .update_transaction_status(&self.transaction_id, TransactionStatus::Completed)?;
        self.state.set(HandleState::Committed);
        info!(transaction_id = %self.transaction_id, "committed transaction");
        Ok(())
    }

    /// Marks the transaction Failed and every operation it carries
    /// RolledBack. A no-op if already rolled back; rejected if already
    /// committed.
    pub fn rollback(&self) -> Result<()> {
        match self.state.get() {
            HandleState::RolledBack => return Ok(()),
            HandleState::Committed => {
                return Err(crate::error::Error::input(format!(
                    "cannot roll back transaction {}: already committed",
                    self.transaction_id
                )))
            }
            HandleState::Open => {}
        }

        for op in self.journal.operations_for_transaction(&self.transaction_id)? {
            self.journal
                .update_operation_status(op.id, OperationStatus::RolledBack, None)?;
        }
        self.journal
            .update_transaction_status(&self.transaction_id, TransactionStatus::Failed)?;
        self.state.set(HandleState::RolledBack);
        warn!(transaction_id = %self.transaction_id, "rolled back transaction");
        Ok(())
    }
}

impl<'a> Drop for TransactionHandle<'a> {
    fn drop(&mut self) {
        if self.state.get() == HandleState::Open {
            if let Err(e) = self.rollback() {
                warn!(
                    transaction_id = %self.transaction_id,
                    error = %e,
                    "best-effort rollback on drop failed"
                );
            }
        }
    }
}

/// Runs `f` inside a transaction scope: commits on `Ok`, rolls back on `Err`
/// or cancellation. This is the usual entry point rather than driving
/// [`TransactionHandle`] by hand.
pub fn run_in_transaction<F, R>(
    journal: &Journal,
    metadata: serde_json::Map<String, serde_json::Value>,
    f: F,
) -> Result<R>
where
    F: FnOnce(&TransactionHandle) -> Result<R>,
{
    let handle = TransactionHandle::begin(journal, metadata)?;
    match f(&handle) {
        Ok(value) => {
            handle.commit()?;
            Ok(value)
        }
        Err(e) => {
            let _ = handle.rollback();
            Err(e)
        }
    }
}
