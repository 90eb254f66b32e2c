//! Read-side operations: point lookup, listing, field queries and history.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::contract::ContractError;
use crate::entity::{DOC_TYPE, EntityKind};
use crate::store::{HistoryEntry, KeyValue, LedgerStore, Selector, StoreError};

/// One `{"Key", "Record"}` row of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    #[serde(rename = "Key")]
    pub key: String,
    /// Stored document, or the raw text when it is not valid JSON.
    #[serde(rename = "Record")]
    pub record: Value,
}

impl QueryRow {
    /// Builds a row from a store hit.
    #[must_use]
    pub fn from_key_value(kv: &KeyValue) -> Self {
        Self {
            key: kv.key.clone(),
            record: decode_record(&kv.value),
        }
    }
}

/// One version in a key's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    #[serde(rename = "TxId")]
    pub tx_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "IsDelete")]
    pub is_delete: bool,
    /// `null` for deletions.
    #[serde(rename = "Record")]
    pub record: Value,
}

impl From<HistoryEntry> for HistoryRow {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            tx_id: entry.tx_id,
            timestamp: entry.timestamp,
            is_delete: entry.is_delete,
            record: entry.value.as_deref().map_or(Value::Null, decode_record),
        }
    }
}

/// Parses stored bytes as JSON, falling back to a JSON string.
#[must_use]
pub fn decode_record(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|e| {
        debug!(error = %e, "stored value is not JSON, returning raw text");
        Value::String(String::from_utf8_lossy(bytes).into_owned())
    })
}

/// Raw stored text for `key`.
///
/// # Errors
///
/// Returns [`ContractError::NotFound`] for a missing or empty value and
/// [`ContractError::Store`] when the read fails.
pub fn get_entity(
    store: &dyn LedgerStore,
    kind: EntityKind,
    key: &str,
) -> Result<String, ContractError> {
    match store.get(key)? {
        Some(bytes) if !bytes.is_empty() => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        _ => Err(ContractError::NotFound {
            kind,
            key: key.to_string(),
        }),
    }
}

/// Every entity of `kind`, ordered by key.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub fn list_all(store: &dyn LedgerStore, kind: EntityKind) -> Result<Vec<QueryRow>, StoreError> {
    let hits = store.query(&Selector::new().eq(DOC_TYPE, kind.doc_type()))?;
    Ok(hits.iter().map(QueryRow::from_key_value).collect())
}

/// Converts a textual query value to the JSON value stored for `field`.
///
/// Numeric fields must parse as finite numbers; everything else compares as
/// a string.
#[must_use]
pub fn field_value(kind: EntityKind, field: &str, raw: &str) -> Option<Value> {
    if !kind.is_numeric_field(field) {
        return Some(Value::String(raw.to_string()));
    }
    let parsed: f64 = raw.trim().parse().ok()?;
    serde_json::Number::from_f64(parsed).map(Value::Number)
}

/// Entities of `kind` whose `field` equals `raw`.
///
/// Never fails: an unparsable numeric value or a store error yields an empty
/// list and a warning.
#[must_use]
pub fn list_by_field(
    store: &dyn LedgerStore,
    kind: EntityKind,
    field: &str,
    raw: &str,
) -> Vec<QueryRow> {
    let Some(value) = field_value(kind, field, raw) else {
        warn!(kind = %kind, field, value = raw, "query value is not a number");
        return Vec::new();
    };

    // docType goes last so a caller-supplied `docType` field cannot widen
    // the query to another kind.
    let selector = Selector::new().eq(field, value).eq(DOC_TYPE, kind.doc_type());
    debug!(selector = %selector.to_json(), "querying by field");

    match store.query(&selector) {
        Ok(hits) => hits.iter().map(QueryRow::from_key_value).collect(),
        Err(e) => {
            warn!(kind = %kind, field, error = %e, "field query failed");
            Vec::new()
        },
    }
}

/// Every version written for `key`, oldest first.
///
/// # Errors
///
/// Returns an error if the history cannot be read.
pub fn history(store: &dyn LedgerStore, key: &str) -> Result<Vec<HistoryRow>, StoreError> {
    Ok(store
        .history(key)?
        .into_iter()
        .map(HistoryRow::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn seeded() -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        store
            .put("PROOF_1_a", br#"{"docType":"proofRecord","parent_increment":5,"bulk_name":"B"}"#)
            .unwrap();
        store
            .put("PROOF_2_b", br#"{"docType":"proofRecord","parent_increment":6,"bulk_name":"B"}"#)
            .unwrap();
        store
            .put("TICKET_1", br#"{"docType":"ticket","id":"1","incrementId":5}"#)
            .unwrap();
        store
    }

    #[test]
    fn numeric_fields_are_parsed() {
        let store = seeded();
        let rows = list_by_field(&store, EntityKind::ProofRecord, "parent_increment", "5.0");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "PROOF_1_a");

        let rows = list_by_field(&store, EntityKind::ProofRecord, "parent_increment", "five");
        assert!(rows.is_empty());
        assert_eq!(field_value(EntityKind::Ticket, "incrementId", "NaN"), None);
    }

    #[test]
    fn string_fields_compare_as_text() {
        let store = seeded();
        let rows = list_by_field(&store, EntityKind::ProofRecord, "bulk_name", "B");
        assert_eq!(rows.len(), 2);
        let rows = list_by_field(&store, EntityKind::Ticket, "incrementId", "5");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn doc_type_field_cannot_escape_kind() {
        let store = seeded();
        let rows = list_by_field(&store, EntityKind::ProofRecord, "docType", "ticket");
        assert!(rows.is_empty());
    }

    #[test]
    fn store_failure_yields_empty_listing() {
        let store = seeded();
        store.set_fail_reads(true);
        assert!(list_by_field(&store, EntityKind::Ticket, "id", "1").is_empty());
        assert!(list_all(&store, EntityKind::Ticket).is_err());
    }

    #[test]
    fn non_json_values_surface_as_strings() {
        let store = InMemoryLedgerStore::new();
        store.put("k", b"plain").unwrap();
        store.delete("k").unwrap();

        let rows = history(&store, "k").unwrap();
        assert_eq!(rows[0].record, json!("plain"));
        assert!(rows[1].is_delete);
        assert_eq!(rows[1].record, Value::Null);
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = seeded();
        let err = get_entity(&store, EntityKind::Ticket, "TICKET_9").unwrap_err();
        assert_eq!(err.to_string(), "Ticket TICKET_9 does not exist");
    }
}
