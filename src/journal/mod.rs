//! Durable, process-local journal store (C1): append-only operation and
//! transaction records over a local file-backed relational substrate.
//!
//! A single re-entrant lock serialises every mutating call; readers use
//! SQLite's own snapshot isolation and never block on writers or vice versa.
//! Internal helpers take `&Connection` directly instead of re-acquiring the
//! lock, so nested calls never deadlock against themselves.

mod schema;
pub mod compaction;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExt, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    Operation, OperationKind, OperationMetadata, OperationStatus, QueryFilter, Transaction,
    TransactionStatus,
};

pub use schema::SCHEMA_VERSION;

/// Bounded lock wait before a mutating call fails with a journal-busy error.
const BUSY_TIMEOUT_MS: u32 = 30_000;

/// A new operation record about to be appended, before an id is assigned.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub kind: OperationKind,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub content_digest: Option<String>,
    pub metadata: OperationMetadata,
    pub transaction_id: Option<String>,
    pub status: OperationStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total_operations: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
    pub db_size_bytes: u64,
}

pub struct Journal {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Journal {
    /// Open (creating if absent) the journal at `path`, apply any pending
    /// migrations, and enable write-ahead logging so concurrent readers
    /// never observe a torn write (I7).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;

        info!("journal opened at {}", path.display());
        Ok(Journal {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic insert; increments the parent transaction's `operation_count`
    /// in the same scope if the record carries a `transaction_id` (I5).
    pub fn append_operation(&self, draft: NewOperation) -> Result<i64> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&draft.metadata)?;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO operations
                (kind, timestamp, source, destination, content_digest, metadata,
                 transaction_id, status, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                draft.kind.as_str(),
                now.to_rfc3339(),
                draft.source.to_string_lossy(),
                draft.destination.as_ref().map(|p| p.to_string_lossy().to_string()),
                draft.content_digest,
                metadata_json,
                draft.transaction_id,
                draft.status.as_str(),
                draft.error_message,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(txn_id) = &draft.transaction_id {
            let updated = tx.execute(
                "UPDATE transactions SET operation_count = operation_count + 1 WHERE transaction_id = ?1",
                params![txn_id],
            )?;
            if updated == 0 {
                return Err(Error::input(format!(
                    "operation references unknown transaction {txn_id}"
                )));
            }
        }
        tx.commit()?;

        debug!(id, kind = draft.kind.as_str(), "appended operation");
        Ok(id)
    }

    pub fn update_operation_status(
        &self,
        id: i64,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let updated = conn.execute(
            "UPDATE operations SET status = ?1, error_message = ?2 WHERE id = ?3",
            params![status.as_str(), error_message, id],
        )?;
        if updated == 0 {
            return Err(Error::input(format!("no such operation id {id}")));
        }
        debug!(id, status = status.as_str(), "updated operation status");
        Ok(())
    }

    pub fn get_operation(&self, id: i64) -> Result<Option<Operation>> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        conn.query_row(
            "SELECT id, kind, timestamp, source, destination, content_digest, metadata,
                    transaction_id, status, error_message, created_at
             FROM operations WHERE id = ?1",
            params![id],
            row_to_operation,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Creates a new in-progress transaction with a fresh uuid (C4).
    pub fn append_transaction(&self, metadata: serde_json::Map<String, serde_json::Value>) -> Result<Transaction> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&metadata)?;

        conn.execute(
            "INSERT INTO transactions (transaction_id, started_at, completed_at, operation_count, status, metadata)
             VALUES (?1, ?2, NULL, 0, ?3, ?4)",
            params![
                transaction_id,
                now.to_rfc3339(),
                TransactionStatus::InProgress.as_str(),
                metadata_json,
            ],
        )?;

        Ok(Transaction {
            transaction_id,
            started_at: now,
            completed_at: None,
            operation_count: 0,
            status: TransactionStatus::InProgress,
            metadata,
        })
    }

    pub fn update_transaction_status(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let terminal = !matches!(status, TransactionStatus::InProgress);
        let updated = if terminal {
            conn.execute(
                "UPDATE transactions SET status = ?1, completed_at = ?2 WHERE transaction_id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), transaction_id],
            )?
        } else {
            conn.execute(
                "UPDATE transactions SET status = ?1 WHERE transaction_id = ?2",
                params![status.as_str(), transaction_id],
            )?
        };
        if updated == 0 {
            return Err(Error::input(format!(
                "no such transaction {transaction_id}"
            )));
        }
        debug!(transaction_id, status = status.as_str(), "updated transaction status");
        Ok(())
    }

    pub fn get_transaction(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        conn.query_row(
            "SELECT transaction_id, started_at, completed_at, operation_count, status, metadata
             FROM transactions WHERE transaction_id = ?1",
            params![transaction_id],
            row_to_transaction,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Every operation carrying this transaction id, in ascending id order
    /// (callers that need reverse order for rollback reverse it themselves).
    pub fn operations_for_transaction(&self, transaction_id: &str) -> Result<Vec<Operation>> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, kind, timestamp, source, destination, content_digest, metadata,
                    transaction_id, status, error_message, created_at
             FROM operations WHERE transaction_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![transaction_id], row_to_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Ordered by timestamp descending unless `filter.ascending` is set.
    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<Operation>> {
        let conn = self.conn.lock().expect("journal lock poisoned");

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(kind) = filter.kind {
            clauses.push("kind = ?".to_string());
            values.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?".to_string());
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(txn_id) = &filter.transaction_id {
            clauses.push("transaction_id = ?".to_string());
            values.push(Box::new(txn_id.clone()));
        }
        if let Some(since) = filter.since {
            clauses.push("timestamp >= ?".to_string());
            values.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = filter.until {
            clauses.push("timestamp <= ?".to_string());
            values.push(Box::new(until.to_rfc3339()));
        }
        if let Some(substring) = &filter.path_substring {
            clauses.push("(source LIKE ? OR destination LIKE ?)".to_string());
            let pattern = format!("%{substring}%");
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let order = if filter.ascending { "ASC" } else { "DESC" };
        let limit_clause = match filter.limit {
            Some(n) => format!(" LIMIT {n}"),
            None => String::new(),
        };

        let sql = format!(
            "SELECT id, kind, timestamp, source, destination, content_digest, metadata,
                    transaction_id, status, error_message, created_at
             FROM operations {where_clause} ORDER BY timestamp {order}{limit_clause}"
        );

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn operation_count(&self) -> Result<u64> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM operations", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// Size of the database file plus its WAL/shared-memory index siblings.
    pub fn size_bytes(&self) -> Result<u64> {
        let mut total = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let base = self.path.as_os_str().to_string_lossy().into_owned();
        for suffix in ["-wal", "-shm"] {
            let sibling = PathBuf::from(format!("{base}{suffix}"));
            if let Ok(meta) = std::fs::metadata(&sibling) {
                total += meta.len();
            }
        }
        Ok(total)
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM operations", [], |r| r.get(0))?;
        let mut stats = Statistics {
            total_operations: total as u64,
            db_size_bytes: self.size_bytes().unwrap_or(0),
            ..Default::default()
        };

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM operations GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "rolled_back" => stats.rolled_back = count,
                _ => {}
            }
        }

        stats.oldest_timestamp = conn
            .query_row("SELECT MIN(timestamp) FROM operations", [], |r| r.get::<_, Option<String>>(0))?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        stats.newest_timestamp = conn
            .query_row("SELECT MAX(timestamp) FROM operations", [], |r| r.get::<_, Option<String>>(0))?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(stats)
    }

    /// Oldest-first operations at or beyond `cutoff`, capped at `batch_size`.
    pub fn candidates_older_than(&self, cutoff: DateTime<Utc>, batch_size: u64) -> Result<Vec<Operation>> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, kind, timestamp, source, destination, content_digest, metadata,
                    transaction_id, status, error_message, created_at
             FROM operations WHERE timestamp < ?1 ORDER BY timestamp ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cutoff.to_rfc3339(), batch_size as i64], row_to_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Oldest operations beyond the newest `max_operations`, capped at `batch_size`.
    pub fn candidates_over_count(&self, max_operations: u64, batch_size: u64) -> Result<Vec<Operation>> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, kind, timestamp, source, destination, content_digest, metadata,
                    transaction_id, status, error_message, created_at
             FROM operations ORDER BY timestamp DESC LIMIT -1 OFFSET ?1
             ",
        )?;
        // SQLite's ORDER BY ... LIMIT -1 OFFSET n returns every row after the
        // newest n, i.e. exactly the excess beyond max_operations.
        let rows = stmt
            .query_map(params![max_operations as i64], row_to_operation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut rows = rows;
        rows.sort_by_key(|op| op.timestamp);
        rows.truncate(batch_size as usize);
        Ok(rows)
    }

    pub fn delete_operations(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().expect("journal lock poisoned");
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM operations WHERE id IN ({placeholders})");
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|i| i as &dyn rusqlite::ToSql).collect();
        let deleted = conn.execute(&sql, params.as_slice())?;
        Ok(deleted as u64)
    }

    /// Transactions with zero surviving operations (per lifecycle: "never
    /// destroyed except by orphan cleanup").
    ///
    /// `operation_count` is a running tally incremented on append and never
    /// decremented on delete, so it goes stale the moment compaction removes
    /// a transaction's operations — it cannot be used to detect "no
    /// surviving operations" on its own. The anti-join against `operations`
    /// is the only reliable check.
    pub fn delete_orphaned_transactions(&self) -> Result<u64> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        let deleted = conn.execute(
            "DELETE FROM transactions
             WHERE transaction_id NOT IN (SELECT DISTINCT transaction_id FROM operations WHERE transaction_id IS NOT NULL)",
            [],
        )?;
        Ok(deleted as u64)
    }

    /// Reclaim free space after a deletion run.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.conn.lock().expect("journal lock poisoned");
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Releases the underlying connection handle. Idempotent: closing a
    /// journal whose connection is already gone is a no-op.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().expect("journal lock poisoned");
        conn.close().map_err(|(_, e)| Error::from(e))?;
        Ok(())
    }
}

fn row_to_operation(row: &Row) -> rusqlite::Result<Operation> {
    let kind_str: String = row.get(1)?;
    let timestamp_str: String = row.get(2)?;
    let destination: Option<String> = row.get(4)?;
    let metadata_str: String = row.get(6)?;
    let transaction_id: Option<String> = row.get(7)?;
    let status_str: String = row.get(8)?;
    let created_at_str: String = row.get(10)?;

    let kind = kind_str.parse().map_err(to_sqlite_error)?;
    let status = status_str.parse().map_err(to_sqlite_error)?;
    let metadata: OperationMetadata = serde_json::from_str(&metadata_str).map_err(to_sqlite_error)?;
    let timestamp = parse_rfc3339(&timestamp_str)?;
    let created_at = parse_rfc3339(&created_at_str)?;

    Ok(Operation {
        id: row.get(0)?,
        kind,
        timestamp,
        source: PathBuf::from(row.get::<_, String>(3)?),
        destination: destination.map(PathBuf::from),
        content_digest: row.get(5)?,
        metadata,
        transaction_id,
        status,
        error_message: row.get(9)?,
        created_at,
    })
}

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let started_at_str: String = row.get(1)?;
    let completed_at_str: Option<String> = row.get(2)?;
    let status_str: String = row.get(4)?;
    let metadata_str: String = row.get(5)?;

    let status = status_str.parse().map_err(to_sqlite_error)?;
    let metadata: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&metadata_str).map_err(to_sqlite_error)?;

    Ok(Transaction {
        transaction_id: row.get(0)?,
        started_at: parse_rfc3339(&started_at_str)?,
        completed_at: completed_at_str.map(|s| parse_rfc3339(&s)).transpose()?,
        operation_count: row.get(3)?,
        status,
        metadata,
    })
}

fn parse_rfc3339(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(to_sqlite_error)
}

fn to_sqlite_error<E: std::fmt::Display>(e: E) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
    )
}
