//! Schema definition and migrations for the journal store (C1).
//!
//! Two tables, `operations` and `transactions`, shaped per the record model
//! in [`crate::model`], plus a `schema_version` table used to apply forward
//! migrations on later opens.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;
    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date.
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    info!("current journal schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        info!("journal schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("applying journal migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("journal migration complete, now at version {}", SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        other => Err(crate::error::Error::journal(format!(
            "unknown schema migration version: {other}"
        ))),
    }
}

/// Initial schema: `operations`, `transactions`, and their indexes.
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("creating journal schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE transactions (
            transaction_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            operation_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL CHECK(status IN ('in_progress', 'completed', 'failed', 'partially_rolled_back')),
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX idx_transactions_status ON transactions(status);
        CREATE INDEX idx_transactions_started_at ON transactions(started_at);

        CREATE TABLE operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK(kind IN ('move', 'rename', 'delete', 'copy', 'create')),
            timestamp TEXT NOT NULL,
            source TEXT NOT NULL,
            destination TEXT,
            content_digest TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            transaction_id TEXT,
            status TEXT NOT NULL CHECK(status IN ('pending', 'completed', 'failed', 'rolled_back')),
            error_message TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (transaction_id) REFERENCES transactions(transaction_id)
        );

        CREATE INDEX idx_operations_timestamp ON operations(timestamp);
        CREATE INDEX idx_operations_transaction_id ON operations(transaction_id);
        CREATE INDEX idx_operations_kind ON operations(kind);
        CREATE INDEX idx_operations_status ON operations(status);
        ",
    )?;

    info!("journal schema version 1 created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_db() -> (NamedTempFile, Connection) {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        (file, conn)
    }

    #[test]
    fn version_starts_at_zero() {
        let (_f, conn) = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn migrate_creates_both_tables_and_indexes() {
        let (_f, conn) = test_db();
        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"operations".to_string()));
        assert!(tables.contains(&"transactions".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn migrate_is_idempotent() {
        let (_f, conn) = test_db();
        migrate(&conn).unwrap();
        let v1 = get_schema_version(&conn).unwrap();
        migrate(&conn).unwrap();
        let v2 = get_schema_version(&conn).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1, SCHEMA_VERSION);
    }

    #[test]
    fn status_check_constraint_rejects_unknown_values() {
        let (_f, conn) = test_db();
        migrate(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO transactions (transaction_id, started_at, status) VALUES (?1, ?2, ?3)",
            ["t1", "2024-01-01T00:00:00Z", "bogus"],
        );
        assert!(result.is_err());
    }
}
