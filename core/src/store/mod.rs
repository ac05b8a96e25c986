//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Every other module calls typed store methods and never executes SQL.
//!
//! RULE: every multi-statement write runs in an IMMEDIATE transaction, so
//! SQLite admits one writer per database at a time. Concurrent workers each
//! open their own connection with `reopen()`.

use crate::{
    error::{DrawError, DrawResult},
    event::{DrawEvent, EventLogEntry},
};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::time::Duration;

mod catalog;
mod commitment;
mod ledger;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct DrawStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl DrawStore {
    pub fn open(path: &str) -> DrawResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_timeout(path: &str, busy_timeout_ms: u64) -> DrawResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DrawResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open another connection to the same database.
    /// For in-memory databases this returns a new, isolated database.
    pub fn reopen(&self) -> DrawResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DrawResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_catalog.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_ledger.sql"))?;
        Ok(())
    }

    /// Begin a write transaction that takes the database write lock up front.
    fn write_txn(&self) -> DrawResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Begin a read transaction for a consistent multi-query view.
    fn read_txn(&self) -> DrawResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Deferred,
        )?)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &DrawEvent, created_at: &str) -> DrawResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (product_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.product_id(),
                event.type_name(),
                serde_json::to_string(event)?,
                created_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_product(&self, product_id: &str) -> DrawResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, product_id, event_type, payload, created_at
             FROM event_log WHERE product_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![product_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    product_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload:    row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, product_id: &str, event_type: &str) -> DrawResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE product_id = ?1 AND event_type = ?2",
            params![product_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn not_found(product_id: &str) -> DrawError {
    DrawError::ProductNotFound {
        product_id: product_id.to_string(),
    }
}
