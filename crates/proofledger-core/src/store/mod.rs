//! Ledger storage seam.
//!
//! The domain logic never touches a storage engine directly. Everything goes
//! through [`LedgerStore`]: point reads, point writes, point deletes,
//! exact-match selector queries and per-key version history.
//!
//! Two backends ship with the crate:
//!
//! - [`InMemoryLedgerStore`]: deterministic map-backed store with failure
//!   injection, used by tests and throwaway sessions.
//! - [`SqliteLedgerStore`]: `SQLite`-backed store with WAL mode and a history
//!   table, used by the CLI.
//!
//! # Example
//!
//! ```rust
//! use proofledger_core::store::{InMemoryLedgerStore, LedgerStore, Selector};
//!
//! # fn example() -> Result<(), proofledger_core::store::StoreError> {
//! let store = InMemoryLedgerStore::new();
//! store.put("TICKET_7", br#"{"docType":"ticket","id":"7","incrementId":3}"#)?;
//!
//! let hits = store.query(&Selector::new().eq("docType", "ticket").eq("incrementId", 3.0))?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```

mod memory;
mod sqlite;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Errors surfaced by a [`LedgerStore`] backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while opening or preparing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Keys must be non-empty.
    #[error("invalid key: {key:?}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// The selector cannot be executed by this backend.
    #[error("invalid selector: {reason}")]
    InvalidSelector {
        /// Why the selector was rejected.
        reason: String,
    },

    /// The backend refused the operation (for example an injected fault).
    #[error("{operation} unavailable: {detail}")]
    Unavailable {
        /// Store operation that failed.
        operation: &'static str,
        /// Backend-specific detail.
        detail: String,
    },
}

/// A `(key, value)` pair returned by a selector query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Storage key.
    pub key: String,
    /// Raw stored bytes (JSON for every entity this crate writes).
    pub value: Vec<u8>,
}

/// One version of a key, as recorded by [`LedgerStore::history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Backend-assigned transaction identifier.
    pub tx_id: String,
    /// UTC RFC 3339 timestamp of the write.
    pub timestamp: String,
    /// `true` when this version is a deletion marker.
    pub is_delete: bool,
    /// Value written by this version; `None` for deletions.
    pub value: Option<Vec<u8>>,
}

/// Exact-match selector over top-level JSON document fields.
///
/// Constraints are kept in insertion order; setting the same field twice
/// replaces the earlier value. Numeric values compare by magnitude, so a
/// constraint of `5` matches a stored `5.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    constraints: Vec<(String, Value)>,
}

impl Selector {
    /// Creates an empty selector (matches every JSON object).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Adds (or replaces) an equality constraint on `field`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        if let Some(slot) = self.constraints.iter_mut().find(|(name, _)| *name == field) {
            slot.1 = value;
        } else {
            self.constraints.push((field, value));
        }
        self
    }

    /// Returns the constraints in insertion order.
    #[must_use]
    pub fn constraints(&self) -> &[(String, Value)] {
        &self.constraints
    }

    /// Returns `true` if `document` satisfies every constraint.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        let Some(object) = document.as_object() else {
            return false;
        };
        self.constraints.iter().all(|(field, expected)| {
            object
                .get(field)
                .is_some_and(|actual| values_equal(actual, expected))
        })
    }

    /// Renders the selector in the `{"selector": {...}}` shape used in logs.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let fields: serde_json::Map<String, Value> = self.constraints.iter().cloned().collect();
        serde_json::json!({ "selector": fields })
    }
}

/// Selector equality: numbers compare as `f64`, everything else structurally.
#[must_use]
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

/// Key/value ledger consumed by ingestion, reconciliation and queries.
///
/// Calls are blocking and issued one at a time per operation. Query results
/// are fully drained before they are returned, so no cursor outlives a call.
pub trait LedgerStore {
    /// Reads the current value of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write is rejected.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Deletes `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Returns every entry whose JSON value satisfies `selector`, ordered by
    /// key.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector is unsupported or the read fails.
    fn query(&self, selector: &Selector) -> Result<Vec<KeyValue>, StoreError>;

    /// Returns every version ever written for `key`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for &T {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn query(&self, selector: &Selector) -> Result<Vec<KeyValue>, StoreError> {
        (**self).query(selector)
    }

    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(key)
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn query(&self, selector: &Selector) -> Result<Vec<KeyValue>, StoreError> {
        (**self).query(selector)
    }

    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(key)
    }
}

impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn query(&self, selector: &Selector) -> Result<Vec<KeyValue>, StoreError> {
        (**self).query(selector)
    }

    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(key)
    }
}

/// Rejects empty or whitespace-only keys.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Current UTC time formatted for history entries.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
