//! Ledger entity model: proof records, tickets and their wire field names.
//!
//! Both entity types are a typed core plus an `extra` bag holding any
//! caller-supplied fields the model does not know about. The bag is
//! persisted verbatim alongside the typed fields.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::duplicate::DuplicatePolicy;
use crate::keys;
use crate::numeric::Numeric;

// =============================================================================
// Field names
// =============================================================================

/// Kind discriminator carried by every stored entity.
pub const DOC_TYPE: &str = "docType";
/// Storage key echoed into proof records.
pub const RECORD_ID: &str = "recordId";
/// Creation timestamp stamp.
pub const CREATED_AT: &str = "createdAt";
/// Caller identity stamp.
pub const CREATED_BY: &str = "createdBy";

pub const SPONSOR_ID: &str = "sponsor_id";
pub const PROOF_SHORT_ID: &str = "proof_short_id";
pub const COLLECTOR_NAME: &str = "collector_name";
pub const BULK_NAME: &str = "bulk_name";
pub const PARENT_INCREMENT: &str = "parent_increment";
pub const CHAINED_WEIGHT: &str = "chained_weight";
pub const TRACE_CHAIN_TYPE: &str = "traceChainType";
pub const BULK_SHORT_ID: &str = "bulk_short_id";
pub const STORE_INCREMENT: &str = "store_increment";
pub const PRESS_INCREMENT: &str = "press_increment";

pub const TICKET_ID: &str = "id";
pub const RECEIVED_WEIGHT: &str = "receivedWeight";
pub const INCREMENT_ID: &str = "incrementId";

const PROOF_REQUIRED: &[&str] = &[
    SPONSOR_ID,
    PROOF_SHORT_ID,
    COLLECTOR_NAME,
    BULK_NAME,
    PARENT_INCREMENT,
    CHAINED_WEIGHT,
    TRACE_CHAIN_TYPE,
    BULK_SHORT_ID,
];
const PROOF_NUMERIC: &[&str] = &[
    PARENT_INCREMENT,
    STORE_INCREMENT,
    PRESS_INCREMENT,
    CHAINED_WEIGHT,
];

const TICKET_REQUIRED: &[&str] = &[TICKET_ID, RECEIVED_WEIGHT, INCREMENT_ID];
const TICKET_NUMERIC: &[&str] = &[INCREMENT_ID, RECEIVED_WEIGHT];

const STAMP_FIELDS: &[&str] = &[RECORD_ID, CREATED_AT, CREATED_BY, DOC_TYPE];

// =============================================================================
// EntityKind
// =============================================================================

/// Closed set of entity kinds stored in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A provenance assertion in a traceability chain.
    ProofRecord,
    /// A physical weighing event.
    Ticket,
}

impl EntityKind {
    /// Value of the `docType` discriminator.
    #[must_use]
    pub const fn doc_type(self) -> &'static str {
        match self {
            Self::ProofRecord => "proofRecord",
            Self::Ticket => "ticket",
        }
    }

    /// Resolves a `docType` value.
    #[must_use]
    pub fn from_doc_type(doc_type: &str) -> Option<Self> {
        match doc_type {
            "proofRecord" => Some(Self::ProofRecord),
            "ticket" => Some(Self::Ticket),
            _ => None,
        }
    }

    /// Lowercase name used in operation messages ("proof record").
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ProofRecord => "proof record",
            Self::Ticket => "ticket",
        }
    }

    /// Capitalised name used in not-found errors ("Proof record").
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::ProofRecord => "Proof record",
            Self::Ticket => "Ticket",
        }
    }

    /// Short noun used in validation and duplicate messages ("record").
    #[must_use]
    pub const fn noun(self) -> &'static str {
        match self {
            Self::ProofRecord => "record",
            Self::Ticket => "ticket",
        }
    }

    /// Fields that must be present and non-null on creation.
    #[must_use]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::ProofRecord => PROOF_REQUIRED,
            Self::Ticket => TICKET_REQUIRED,
        }
    }

    /// Fields holding numeric values.
    #[must_use]
    pub const fn numeric_fields(self) -> &'static [&'static str] {
        match self {
            Self::ProofRecord => PROOF_NUMERIC,
            Self::Ticket => TICKET_NUMERIC,
        }
    }

    /// Returns `true` if `field` holds numeric values for this kind.
    #[must_use]
    pub fn is_numeric_field(self, field: &str) -> bool {
        self.numeric_fields().contains(&field)
    }

    /// Ordered duplicate-detection groups for this kind.
    #[must_use]
    pub const fn duplicate_policy(self) -> &'static DuplicatePolicy {
        match self {
            Self::ProofRecord => &DuplicatePolicy::PROOF_RECORD,
            Self::Ticket => &DuplicatePolicy::TICKET,
        }
    }

    /// Required fields that are absent or null in `candidate`, in declaration
    /// order.
    #[must_use]
    pub fn missing_required_fields(self, candidate: &Map<String, Value>) -> Vec<&'static str> {
        self.required_fields()
            .iter()
            .copied()
            .filter(|field| !is_present(candidate, field))
            .collect()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.doc_type())
    }
}

/// Returns `true` if `field` is set to a non-null value.
#[must_use]
pub fn is_present(candidate: &Map<String, Value>, field: &str) -> bool {
    candidate.get(field).is_some_and(|v| !v.is_null())
}

/// Removes caller-supplied values for system-assigned fields.
pub fn strip_stamps(candidate: &mut Map<String, Value>) {
    for field in STAMP_FIELDS {
        candidate.remove(*field);
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A provenance assertion.
///
/// Descriptive fields only need to be present; any non-null JSON value is
/// accepted and stored verbatim. Increments and weights must be numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub sponsor_id: Value,
    pub proof_short_id: Value,
    pub collector_name: Value,
    pub bulk_name: Value,
    pub parent_increment: Numeric,
    pub chained_weight: Numeric,
    #[serde(rename = "traceChainType")]
    pub trace_chain_type: Value,
    pub bulk_short_id: Value,
    /// Set only on store-path chains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_increment: Option<Numeric>,
    /// Set only on press-path chains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub press_increment: Option<Numeric>,

    #[serde(rename = "recordId", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "createdBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(rename = "docType", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    /// Caller fields outside the model, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A weighing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    #[serde(rename = "receivedWeight")]
    pub received_weight: Numeric,
    #[serde(rename = "incrementId")]
    pub increment_id: Numeric,

    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "createdBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(rename = "docType", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    /// Caller fields outside the model, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Behaviour shared by every storable entity.
pub trait LedgerEntity: Serialize + DeserializeOwned {
    /// Kind of this entity.
    const KIND: EntityKind;

    /// Storage key for this entity.
    ///
    /// `candidate` is the validated caller document before stamping.
    fn storage_key(&self, candidate: &Map<String, Value>, timestamp_ms: i64) -> String;

    /// Applies the system stamps.
    fn stamp(&mut self, key: &str, created_at: String, created_by: String);
}

impl LedgerEntity for ProofRecord {
    const KIND: EntityKind = EntityKind::ProofRecord;

    fn storage_key(&self, candidate: &Map<String, Value>, timestamp_ms: i64) -> String {
        keys::new_record_key(candidate, timestamp_ms)
    }

    fn stamp(&mut self, key: &str, created_at: String, created_by: String) {
        self.record_id = Some(key.to_string());
        self.created_at = Some(created_at);
        self.created_by = Some(created_by);
        self.doc_type = Some(Self::KIND.doc_type().to_string());
    }
}

impl LedgerEntity for Ticket {
    const KIND: EntityKind = EntityKind::Ticket;

    fn storage_key(&self, _candidate: &Map<String, Value>, _timestamp_ms: i64) -> String {
        keys::ticket_key(&self.id)
    }

    fn stamp(&mut self, _key: &str, created_at: String, created_by: String) {
        self.created_at = Some(created_at);
        self.created_by = Some(created_by);
        self.doc_type = Some(Self::KIND.doc_type().to_string());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn proof_json() -> Value {
        json!({
            "sponsor_id": "S1",
            "proof_short_id": "P1",
            "collector_name": "C",
            "bulk_name": "B",
            "parent_increment": 5,
            "chained_weight": 10.5,
            "traceChainType": "store",
            "bulk_short_id": "BS",
            "store_increment": 12,
            "press_increment": null,
            "lotColour": "amber"
        })
    }

    #[test]
    fn proof_record_keeps_extras_and_drops_null_increments() {
        let record: ProofRecord = serde_json::from_value(proof_json()).unwrap();
        assert_eq!(record.store_increment, Some(Numeric(12.0)));
        assert_eq!(record.press_increment, None);
        assert_eq!(record.extra.get("lotColour"), Some(&json!("amber")));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["parent_increment"], json!(5));
        assert_eq!(back["lotColour"], json!("amber"));
        assert!(back.get("press_increment").is_none());
        assert!(back.get("recordId").is_none());
    }

    #[test]
    fn stamping_sets_system_fields() {
        let mut record: ProofRecord = serde_json::from_value(proof_json()).unwrap();
        record.stamp("PROOF_1_x", "2024-01-01T00:00:00Z".into(), String::new());

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back[RECORD_ID], "PROOF_1_x");
        assert_eq!(back[CREATED_BY], "");
        assert_eq!(back[DOC_TYPE], "proofRecord");
    }

    #[test]
    fn missing_fields_treat_null_as_absent() {
        let mut candidate = proof_json().as_object().cloned().unwrap();
        candidate.insert(BULK_NAME.into(), Value::Null);
        candidate.remove(SPONSOR_ID);

        assert_eq!(
            EntityKind::ProofRecord.missing_required_fields(&candidate),
            [SPONSOR_ID, BULK_NAME]
        );
    }

    #[test]
    fn descriptive_fields_accept_any_json_value() {
        let mut doc = proof_json();
        doc[SPONSOR_ID] = json!(42);
        doc[BULK_NAME] = json!({"lot": ["a", "b"]});
        doc[TRACE_CHAIN_TYPE] = json!(true);

        let record: ProofRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(record.sponsor_id, json!(42));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back[SPONSOR_ID], json!(42));
        assert_eq!(back[BULK_NAME], json!({"lot": ["a", "b"]}));
        assert_eq!(back[TRACE_CHAIN_TYPE], json!(true));

        let mut doc = proof_json();
        doc[CHAINED_WEIGHT] = json!("10.5");
        assert!(serde_json::from_value::<ProofRecord>(doc).is_err());
    }

    #[test]
    fn ticket_id_must_be_a_string() {
        let bad = json!({"id": 7, "receivedWeight": 1, "incrementId": 2});
        assert!(serde_json::from_value::<Ticket>(bad).is_err());

        let ticket: Ticket =
            serde_json::from_value(json!({"id": "7", "receivedWeight": 1, "incrementId": 2}))
                .unwrap();
        assert_eq!(ticket.storage_key(&Map::new(), 0), "TICKET_7");
    }

    #[test]
    fn kinds_round_trip_through_doc_type() {
        for kind in [EntityKind::ProofRecord, EntityKind::Ticket] {
            assert_eq!(EntityKind::from_doc_type(kind.doc_type()), Some(kind));
        }
        assert!(EntityKind::Ticket.is_numeric_field(INCREMENT_ID));
        assert!(!EntityKind::Ticket.is_numeric_field(TICKET_ID));
    }
}
