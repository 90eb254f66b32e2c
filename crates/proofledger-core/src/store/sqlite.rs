//! `SQLite`-backed ledger store.
//!
//! Live values sit in the `state` table; every write and delete also appends a
//! row to `history`, whose autoincrement sequence becomes the transaction id.
//! Selector queries are pushed down to `json_extract` with the JSON path bound
//! as a parameter.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use tracing::debug;

use super::{
    HistoryEntry, KeyValue, LedgerStore, Selector, StoreError, now_rfc3339, validate_key,
};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

const JSON_DOC: &str = "CAST(value AS TEXT)";

/// Ledger store persisted in a `SQLite` database.
///
/// File-backed stores run in WAL mode. Clones share the same connection.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedgerStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLedgerStore {
    /// Opens or creates a store at the specified path.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::initialize_connection(&conn)?;
        debug!(path = %path.display(), journal_mode = %mode, "opened sqlite ledger store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_connection(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds the `WHERE` clause and bound parameters for a selector.
fn selector_sql(selector: &Selector) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut clause =
        format!("CASE WHEN json_valid({JSON_DOC}) THEN json_type({JSON_DOC}) END = 'object'");
    let mut bound = Vec::with_capacity(selector.constraints().len() * 2);

    for (field, expected) in selector.constraints() {
        if field.contains('"') {
            return Err(StoreError::InvalidSelector {
                reason: format!("field name {field:?} contains a double quote"),
            });
        }
        let value = match expected {
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(StoreError::InvalidSelector {
                    reason: format!("field {field:?} must compare against a scalar"),
                });
            },
        };

        let path_idx = bound.len() + 1;
        let value_idx = bound.len() + 2;
        clause.push_str(&format!(
            " AND CASE WHEN json_valid({JSON_DOC}) THEN json_extract({JSON_DOC}, ?{path_idx}) END = ?{value_idx}"
        ));
        bound.push(SqlValue::Text(format!("$.\"{field}\"")));
        bound.push(value);
    }

    Ok((clause, bound))
}

impl LedgerStore for SqliteLedgerStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM state WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let timestamp = now_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, timestamp],
        )?;
        tx.execute(
            "INSERT INTO history (key, timestamp, is_delete, value) VALUES (?1, ?2, 0, ?3)",
            params![key, timestamp, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM state WHERE key = ?1", [key])?;
        if removed > 0 {
            tx.execute(
                "INSERT INTO history (key, timestamp, is_delete, value) VALUES (?1, ?2, 1, NULL)",
                params![key, now_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn query(&self, selector: &Selector) -> Result<Vec<KeyValue>, StoreError> {
        let (clause, bound) = selector_sql(selector)?;
        let sql = format!("SELECT key, value FROM state WHERE {clause} ORDER BY key");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound), |row| {
            Ok(KeyValue {
                key: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        let hits = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT seq, timestamp, is_delete, value FROM history WHERE key = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([key], |row| {
            let seq: i64 = row.get(0)?;
            Ok(HistoryEntry {
                tx_id: format!("tx-{seq}"),
                timestamp: row.get(1)?,
                is_delete: row.get(2)?,
                value: row.get(3)?,
            })
        })?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
