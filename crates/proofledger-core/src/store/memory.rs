//! Map-backed [`LedgerStore`] with deterministic revisions and failure
//! injection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    HistoryEntry, KeyValue, LedgerStore, Selector, StoreError, now_rfc3339, validate_key,
};

#[derive(Debug, Default)]
struct MemoryState {
    next_revision: u64,
    records: BTreeMap<String, Vec<u8>>,
    history: BTreeMap<String, Vec<HistoryEntry>>,
    fail_reads: bool,
    fail_writes: bool,
    failing_delete_keys: BTreeSet<String>,
}

impl MemoryState {
    fn record(&mut self, key: &str, value: Option<Vec<u8>>) {
        self.next_revision = self.next_revision.saturating_add(1);
        let entry = HistoryEntry {
            tx_id: format!("tx-{}", self.next_revision),
            timestamp: now_rfc3339(),
            is_delete: value.is_none(),
            value,
        };
        self.history.entry(key.to_string()).or_default().push(entry);
    }
}

/// In-memory ledger store.
///
/// Every successful write is assigned the next revision number, exposed as
/// the `tx-<n>` transaction id in [`LedgerStore::history`]. Iteration order is
/// key order, so queries are deterministic across runs.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get`, `query` and `history` call fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Makes every subsequent `put` and `delete` call fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes `delete` fail for one specific key.
    pub fn fail_delete_of(&self, key: impl Into<String>) {
        self.lock().failing_delete_keys.insert(key.into());
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns `true` if no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn injected(operation: &'static str) -> StoreError {
    StoreError::Unavailable {
        operation,
        detail: format!("{operation} failure injected"),
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(injected("get"));
        }
        Ok(state.records.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut state = self.lock();
        if state.fail_writes {
            return Err(injected("put"));
        }
        state.records.insert(key.to_string(), value.to_vec());
        state.record(key, Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_writes || state.failing_delete_keys.contains(key) {
            return Err(injected("delete"));
        }
        if state.records.remove(key).is_some() {
            state.record(key, None);
        }
        Ok(())
    }

    fn query(&self, selector: &Selector) -> Result<Vec<KeyValue>, StoreError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(injected("query"));
        }
        let hits = state
            .records
            .iter()
            .filter(|(_, value)| {
                serde_json::from_slice::<serde_json::Value>(value)
                    .is_ok_and(|document| selector.matches(&document))
            })
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Ok(hits)
    }

    fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(injected("history"));
        }
        Ok(state.history.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_are_monotonic_across_keys() {
        let store = InMemoryLedgerStore::new();
        store.put("a", b"{}").unwrap();
        store.put("b", b"{}").unwrap();
        store.put("a", b"{\"v\":2}").unwrap();

        let history = store.history("a").unwrap();
        let ids: Vec<_> = history.iter().map(|h| h.tx_id.as_str()).collect();
        assert_eq!(ids, ["tx-1", "tx-3"]);
    }

    #[test]
    fn delete_of_missing_key_leaves_no_history() {
        let store = InMemoryLedgerStore::new();
        store.delete("ghost").unwrap();
        assert!(store.history("ghost").unwrap().is_empty());
    }

    #[test]
    fn injected_failures_are_reported() {
        let store = InMemoryLedgerStore::new();
        store.put("a", b"{}").unwrap();

        store.fail_delete_of("a");
        assert!(matches!(
            store.delete("a"),
            Err(StoreError::Unavailable {
                operation: "delete",
                ..
            })
        ));

        store.set_fail_reads(true);
        assert!(store.get("a").is_err());
        assert!(store.query(&Selector::new()).is_err());

        store.set_fail_reads(false);
        store.set_fail_writes(true);
        assert!(store.put("b", b"{}").is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn query_skips_non_json_values() {
        let store = InMemoryLedgerStore::new();
        store.put("raw", b"not json").unwrap();
        store.put("doc", br#"{"docType":"ticket"}"#).unwrap();

        let hits = store.query(&Selector::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "doc");
    }
}
