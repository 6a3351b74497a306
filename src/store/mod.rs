//! Local embedded relational store.
//!
//! Two handles are kept against the same underlying file: a
//! read-write handle (`max_open_conns = 1`, `busy_timeout = 60s`,
//! `txlock = immediate`) used for every mutation and for the processor's
//! batch transaction, and short-lived read-only connections opened on demand
//! for the non-mutating reads performed by ingest, the processor's batch
//! fetch, and the reply publisher's pending-batch query. WAL mode with
//! `synchronous=NORMAL` lets those readers see a consistent snapshot without
//! blocking the single writer.
//!
//! Schema migration (`CREATE TABLE IF NOT EXISTS ...`) runs unconditionally
//! at startup on the write handle, after a `PRAGMA integrity_check` gate.

pub mod config_store;
pub mod messages;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Errors arising from any store operation.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    IntegrityCheckFailed(String),
    Conflict(String),
    InvalidData(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::IntegrityCheckFailed(s) => write!(f, "integrity check failed: {s}"),
            StoreError::Conflict(s) => write!(f, "conflict: {s}"),
            StoreError::InvalidData(s) => write!(f, "invalid data: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

/// The local datastore for a single agent.
///
/// Holds the sole read-write connection behind a blocking mutex (single
/// writer) and the file path so read-only connections can be
/// opened on demand.
pub struct Store {
    db_path: PathBuf,
    rw: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path`.
    ///
    /// Applies PRAGMAs, runs `PRAGMA integrity_check`, and migrates the
    /// schema. Returns `Err` if the integrity check fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        apply_rw_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        apply_schema(&conn)?;
        Ok(Store {
            db_path: path.to_path_buf(),
            rw: Mutex::new(conn),
        })
    }

    /// Run `f` against the sole read-write connection, outside any explicit
    /// transaction (used for single-statement ingest writes).
    pub fn with_rw<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.rw.lock().expect("rw connection mutex poisoned");
        f(&conn)
    }

    /// Open a single write transaction against the read-write connection and
    /// run `f` inside it, committing on `Ok` and rolling back on `Err`.
    ///
    /// This is the batch-level atomicity unit the processor uses: everything
    /// a processor batch does — message updates, mutation
    /// handler writes, and orphan GC — happens inside one call to this
    /// method.
    pub fn with_write_transaction<T>(
        &self,
        f: impl FnOnce(&mut rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.rw.lock().expect("rw connection mutex poisoned");
        let mut tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Open a fresh read-only connection for non-mutating reads (ingest
    /// dedup lookups, processor batch fetch, reply publisher pending-batch
    /// query). Cheap under WAL; callers do not pool these themselves.
    pub fn read_only_connection(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_ro_pragmas(&conn)?;
        Ok(conn)
    }
}

fn apply_rw_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=60000;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn apply_ro_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(std::time::Duration::from_secs(60))?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<(), StoreError> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(include_str!("schema.sql"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_and_passes_integrity_check() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();
        store
            .with_rw(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
                    .unwrap();
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn read_only_connection_sees_committed_writes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();
        store
            .with_rw(|conn| {
                conn.execute(
                    "INSERT INTO messages (event, request_id, request_payload, requested_at, queued_at)
                     VALUES ('v1.tls_certificate.upsert', 'r1', '{}', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let ro = store.read_only_connection().unwrap();
        let count: i64 = ro
            .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn write_transaction_rolls_back_on_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path()).unwrap();

        let result: Result<(), StoreError> = store.with_write_transaction(|tx| {
            tx.execute(
                "INSERT INTO messages (event, request_id, request_payload, requested_at, queued_at)
                 VALUES ('v1.tls_certificate.upsert', 'r1', '{}', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                [],
            )?;
            Err(StoreError::InvalidData("forced failure".to_owned()))
        });
        assert!(result.is_err());

        store
            .with_rw(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
                    .unwrap();
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }
}
