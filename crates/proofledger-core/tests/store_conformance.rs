//! Behaviour every `LedgerStore` backend must share.
//!
//! Each check runs against the in-memory store, an in-memory `SQLite`
//! database and a file-backed `SQLite` database.

use proofledger_core::store::{
    InMemoryLedgerStore, LedgerStore, Selector, SqliteLedgerStore, StoreError,
};
use serde_json::json;
use tempfile::TempDir;

struct Backends {
    _dir: TempDir,
    stores: Vec<(&'static str, Box<dyn LedgerStore>)>,
}

fn backends() -> Backends {
    let dir = tempfile::tempdir().unwrap();
    let file = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
    Backends {
        stores: vec![
            ("memory", Box::new(InMemoryLedgerStore::new())),
            ("sqlite-mem", Box::new(SqliteLedgerStore::in_memory().unwrap())),
            ("sqlite-file", Box::new(file)),
        ],
        _dir: dir,
    }
}

fn put_json(store: &dyn LedgerStore, key: &str, value: &serde_json::Value) {
    store.put(key, value.to_string().as_bytes()).unwrap();
}

// =============================================================================
// Point operations
// =============================================================================

#[test]
fn get_put_delete() {
    let backends = backends();
    for (name, store) in backends.stores {
        assert_eq!(store.get("k").unwrap(), None, "{name}");

        store.put("k", b"{\"v\":1}").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"{\"v\":1}"[..]), "{name}");

        store.put("k", b"{\"v\":2}").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"{\"v\":2}"[..]), "{name}");

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None, "{name}");

        store.delete("never-written").unwrap();
    }
}

#[test]
fn empty_keys_are_rejected() {
    let backends = backends();
    for (name, store) in backends.stores {
        let err = store.put("", b"{}").unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }), "{name}: {err:?}");
    }
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn query_is_exact_match_and_key_ordered() {
    let backends = backends();
    for (name, store) in backends.stores {
        let store = store.as_ref();
        put_json(store, "TICKET_b", &json!({"docType": "ticket", "id": "b", "incrementId": 3}));
        put_json(store, "TICKET_a", &json!({"docType": "ticket", "id": "a", "incrementId": 3.0}));
        put_json(store, "TICKET_c", &json!({"docType": "ticket", "id": "c", "incrementId": 4}));
        put_json(store, "PROOF_1_x", &json!({"docType": "proofRecord", "incrementId": 3}));

        let hits = store
            .query(&Selector::new().eq("docType", "ticket").eq("incrementId", 3))
            .unwrap();
        let keys: Vec<_> = hits.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["TICKET_a", "TICKET_b"], "{name}");

        let hits = store
            .query(&Selector::new().eq("docType", "ticket").eq("id", "c"))
            .unwrap();
        assert_eq!(hits.len(), 1, "{name}");

        let hits = store
            .query(&Selector::new().eq("docType", "ticket").eq("missing", "x"))
            .unwrap();
        assert!(hits.is_empty(), "{name}");
    }
}

#[test]
fn query_string_does_not_match_number() {
    let backends = backends();
    for (name, store) in backends.stores {
        let store = store.as_ref();
        put_json(store, "a", &json!({"docType": "ticket", "incrementId": 5}));
        put_json(store, "b", &json!({"docType": "ticket", "incrementId": "5"}));

        let hits = store.query(&Selector::new().eq("incrementId", "5")).unwrap();
        let keys: Vec<_> = hits.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["b"], "{name}");

        let hits = store.query(&Selector::new().eq("incrementId", 5)).unwrap();
        let keys: Vec<_> = hits.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["a"], "{name}");
    }
}

#[test]
fn deleted_entries_leave_queries() {
    let backends = backends();
    for (name, store) in backends.stores {
        let store = store.as_ref();
        put_json(store, "a", &json!({"docType": "proofRecord"}));
        store.delete("a").unwrap();
        let hits = store.query(&Selector::new().eq("docType", "proofRecord")).unwrap();
        assert!(hits.is_empty(), "{name}");
    }
}

// =============================================================================
// History
// =============================================================================

#[test]
fn history_records_every_version() {
    let backends = backends();
    for (name, store) in backends.stores {
        store.put("k", b"1").unwrap();
        store.put("other", b"x").unwrap();
        store.put("k", b"2").unwrap();
        store.delete("k").unwrap();

        let history = store.history("k").unwrap();
        assert_eq!(history.len(), 3, "{name}");
        assert_eq!(history[0].value.as_deref(), Some(&b"1"[..]), "{name}");
        assert_eq!(history[1].value.as_deref(), Some(&b"2"[..]), "{name}");
        assert!(history[2].is_delete, "{name}");
        assert_eq!(history[2].value, None, "{name}");

        let ids: std::collections::BTreeSet<_> = history.iter().map(|h| &h.tx_id).collect();
        assert_eq!(ids.len(), 3, "{name}: tx ids must be distinct");
        for entry in &history {
            assert!(entry.timestamp.ends_with('Z'), "{name}: {}", entry.timestamp);
        }

        assert!(store.history("unknown").unwrap().is_empty(), "{name}");
    }
}
