//! Durable operation journal, transactional filesystem executor, and
//! content-addressed duplicate detector for organizing directory trees.
//!
//! Every mutation goes through [`executor::Executor`], which records a
//! journal entry in [`journal::Journal`] before or after the filesystem
//! change depending on the operation kind, and every such change can later
//! be reversed through [`rollback::UndoManager`] once [`validator::Validator`]
//! confirms the filesystem still matches what was recorded.

pub mod cancel;
pub mod config;
pub mod dedup;
pub mod digest;
pub mod error;
pub mod executor;
pub mod fsops;
pub mod journal;
pub mod model;
pub mod progress;
pub mod rollback;
pub mod trash;
pub mod txn;
pub mod validator;

pub use cancel::CancelToken;
pub use config::{CompactionPolicy, Config};
pub use dedup::{DuplicateGroup, KeepPolicy, ScanOptions};
pub use digest::HashAlgorithm;
pub use error::{Error, Result};
pub use executor::Executor;
pub use journal::Journal;
pub use model::{Operation, OperationKind, OperationMetadata, OperationStatus, QueryFilter, Transaction, TransactionStatus};
pub use progress::{CliProgress, LogProgress, ProgressTracker, SilentProgress};
pub use rollback::{RollbackExecutor, RollbackOutcome, UndoManager};
pub use trash::TrashStore;
pub use txn::{run_in_transaction, TransactionHandle};
pub use validator::{Conflict, ConflictType, ValidationResult, Validator};
