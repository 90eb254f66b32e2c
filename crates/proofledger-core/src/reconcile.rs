//! Weight reconciliation between proof records and tickets.
//!
//! Proof records and tickets are grouped by increment value. Per group, the
//! chained weights of the proof records are summed and the received weights
//! of the tickets are reduced to their maximum. A group is a violation when
//! its summed chained weight exceeds the maximum received weight. Violating
//! proof records can optionally be deleted.
//!
//! The same pass runs over either increment field ([`IncrementField`]).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entity::{
    CHAINED_WEIGHT, DOC_TYPE, EntityKind, INCREMENT_ID, PRESS_INCREMENT, RECEIVED_WEIGHT,
    STORE_INCREMENT,
};
use crate::numeric::Numeric;
use crate::query::decode_record;
use crate::store::{KeyValue, LedgerStore, Selector, StoreError};

/// Which proof record field links a record to ticket increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncrementField {
    /// `press_increment`
    Press,
    /// `store_increment`
    Store,
}

impl IncrementField {
    /// Wire name of the field.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Press => PRESS_INCREMENT,
            Self::Store => STORE_INCREMENT,
        }
    }
}

/// Group key: an increment value with a total order.
#[derive(Debug, Clone, Copy)]
pub struct IncrementKey(f64);

impl IncrementKey {
    /// Wraps `value`, folding `-0.0` into `0.0`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(if value == 0.0 { 0.0 } else { value })
    }

    /// The increment value.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for IncrementKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IncrementKey {}

impl PartialOrd for IncrementKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IncrementKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Per-increment aggregate built during one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupData {
    pub chained_weight_sum: f64,
    pub received_weight_max: Option<f64>,
    pub ticket_count: usize,
    /// Keys of the contributing proof records, in query order.
    pub record_keys: Vec<String>,
}

impl GroupData {
    /// Summed chained weight exceeds the maximum received weight.
    #[must_use]
    pub fn is_violation(&self) -> bool {
        match self.received_weight_max {
            Some(max) => {
                self.chained_weight_sum > 0.0
                    && self.ticket_count > 0
                    && self.chained_weight_sum > max
            },
            None => false,
        }
    }
}

/// One violating increment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub increment_id: i64,
    pub chained_weight: f64,
    pub received_weight: f64,
}

/// Response of the compare operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResponse {
    pub success: bool,
    pub results: Vec<ComparisonResult>,
    pub deleted_records: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComparisonResponse {
    fn failure(error: &StoreError) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            deleted_records: Vec::new(),
            message: Some(format!("Error comparing weights: {error}")),
        }
    }
}

/// Rounds to two decimals, half away from zero on the scaled value.
///
/// The product is taken in binary floating point: `17.005` becomes `17.01`
/// (the product is exactly `1700.5`) but `1.005` becomes `1.0` (the product
/// is `100.49999999999999`).
#[must_use]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn number(record: &Value, field: &str) -> Option<f64> {
    record.get(field).and_then(Numeric::from_json).map(Numeric::get)
}

/// Groups `proofs` and `tickets` by increment value.
///
/// Entries whose increment or weight is absent, null or not a number are
/// skipped.
#[must_use]
pub fn aggregate(
    field: IncrementField,
    proofs: &[KeyValue],
    tickets: &[KeyValue],
) -> BTreeMap<IncrementKey, GroupData> {
    let increment_field = field.field_name();
    let mut groups: BTreeMap<IncrementKey, GroupData> = BTreeMap::new();

    for kv in proofs {
        let record = decode_record(&kv.value);
        let raw_increment = record.get(increment_field).filter(|v| !v.is_null());
        if raw_increment.is_none() || record.get(CHAINED_WEIGHT).is_none() {
            continue;
        }
        let (Some(increment), Some(weight)) =
            (number(&record, increment_field), number(&record, CHAINED_WEIGHT))
        else {
            debug!(key = %kv.key, field = increment_field, "skipping proof record with non-numeric increment or weight");
            continue;
        };
        let group = groups.entry(IncrementKey::new(increment)).or_default();
        group.chained_weight_sum += weight;
        group.record_keys.push(kv.key.clone());
    }

    for kv in tickets {
        let ticket = decode_record(&kv.value);
        let (Some(increment), Some(weight)) =
            (number(&ticket, INCREMENT_ID), number(&ticket, RECEIVED_WEIGHT))
        else {
            debug!(key = %kv.key, "skipping ticket with missing or non-numeric increment or weight");
            continue;
        };
        let group = groups.entry(IncrementKey::new(increment)).or_default();
        group.received_weight_max = Some(
            group
                .received_weight_max
                .map_or(weight, |max| max.max(weight)),
        );
        group.ticket_count += 1;
    }

    groups
}

/// Runs reconciliation passes against a store.
#[derive(Clone, Copy)]
pub struct WeightReconciler<'a> {
    store: &'a dyn LedgerStore,
}

impl<'a> WeightReconciler<'a> {
    /// Creates a reconciler over `store`.
    #[must_use]
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        Self { store }
    }

    /// Reports violating increments and, if `delete_violations` is set,
    /// deletes their proof records.
    ///
    /// Read failures produce a `success: false` response. A failed delete is
    /// logged and left out of `deleted_records`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn reconcile(&self, field: IncrementField, delete_violations: bool) -> ComparisonResponse {
        let proofs = match self.load(EntityKind::ProofRecord) {
            Ok(hits) => hits,
            Err(e) => return ComparisonResponse::failure(&e),
        };
        let tickets = match self.load(EntityKind::Ticket) {
            Ok(hits) => hits,
            Err(e) => return ComparisonResponse::failure(&e),
        };

        let groups = aggregate(field, &proofs, &tickets);
        let mut results = Vec::new();
        let mut deleted_records = Vec::new();

        for (increment, group) in groups.iter().filter(|(_, g)| g.is_violation()) {
            let max = group.received_weight_max.unwrap_or_default();
            results.push(ComparisonResult {
                increment_id: increment.get() as i64,
                chained_weight: round2(group.chained_weight_sum),
                received_weight: round2(max),
            });

            if !delete_violations {
                continue;
            }
            for key in &group.record_keys {
                match self.store.delete(key) {
                    Ok(()) => deleted_records.push(key.clone()),
                    Err(e) => warn!(key = %key, error = %e, "failed to delete violating proof record"),
                }
            }
        }

        info!(
            field = field.field_name(),
            groups = groups.len(),
            violations = results.len(),
            deleted = deleted_records.len(),
            "weight comparison complete"
        );

        ComparisonResponse {
            success: true,
            results,
            deleted_records,
            message: None,
        }
    }

    fn load(&self, kind: EntityKind) -> Result<Vec<KeyValue>, StoreError> {
        self.store
            .query(&Selector::new().eq(DOC_TYPE, kind.doc_type()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn kv(key: &str, value: &Value) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: value.to_string().into_bytes(),
        }
    }

    #[test]
    fn rounding_boundaries() {
        assert_eq!(round2(17.005), 17.01);
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(18.0), 18.0);
        assert_eq!(round2(-0.125), -0.13);
    }

    #[test]
    fn violation_requires_tickets_and_positive_sum() {
        let mut group = GroupData {
            chained_weight_sum: 10.0,
            ..GroupData::default()
        };
        assert!(!group.is_violation());

        group.received_weight_max = Some(9.0);
        group.ticket_count = 1;
        assert!(group.is_violation());

        group.received_weight_max = Some(10.0);
        assert!(!group.is_violation());

        group.chained_weight_sum = -1.0;
        group.received_weight_max = Some(-5.0);
        assert!(!group.is_violation());
    }

    #[test]
    fn aggregate_sums_records_and_maxes_tickets() {
        let proofs = [
            kv("A", &json!({"press_increment": 5, "chained_weight": 10})),
            kv("B", &json!({"press_increment": 5.0, "chained_weight": 8})),
            kv("C", &json!({"press_increment": null, "chained_weight": 99})),
            kv("D", &json!({"press_increment": "5", "chained_weight": 99})),
            kv("E", &json!({"store_increment": 5, "chained_weight": 99})),
        ];
        let tickets = [
            kv("T1", &json!({"incrementId": 5, "receivedWeight": 15})),
            kv("T2", &json!({"incrementId": 5, "receivedWeight": 12})),
            kv("T3", &json!({"incrementId": 5, "receivedWeight": "99"})),
        ];

        let groups = aggregate(IncrementField::Press, &proofs, &tickets);
        assert_eq!(groups.len(), 1);
        let group = &groups[&IncrementKey::new(5.0)];
        assert_eq!(group.chained_weight_sum, 18.0);
        assert_eq!(group.received_weight_max, Some(15.0));
        assert_eq!(group.ticket_count, 2);
        assert_eq!(group.record_keys, ["A", "B"]);
    }

    #[test]
    fn negative_zero_shares_a_group_with_zero() {
        assert_eq!(IncrementKey::new(-0.0), IncrementKey::new(0.0));
        assert!(IncrementKey::new(-1.0) < IncrementKey::new(0.0));
    }

    #[test]
    fn results_are_sorted_and_truncated() {
        let store = InMemoryLedgerStore::new();
        for (key, doc) in [
            ("PROOF_2", json!({"docType": "proofRecord", "store_increment": 7.9, "chained_weight": 3})),
            ("PROOF_1", json!({"docType": "proofRecord", "store_increment": -2.5, "chained_weight": 3})),
            ("TICKET_a", json!({"docType": "ticket", "incrementId": 7.9, "receivedWeight": 1})),
            ("TICKET_b", json!({"docType": "ticket", "incrementId": -2.5, "receivedWeight": 1})),
        ] {
            store.put(key, doc.to_string().as_bytes()).unwrap();
        }

        let response = WeightReconciler::new(&store).reconcile(IncrementField::Store, false);
        let ids: Vec<_> = response.results.iter().map(|r| r.increment_id).collect();
        assert_eq!(ids, [-2, 7]);
        assert!(response.deleted_records.is_empty());
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn read_failure_is_reported() {
        let store = InMemoryLedgerStore::new();
        store.set_fail_reads(true);
        let response = WeightReconciler::new(&store).reconcile(IncrementField::Press, true);
        assert!(!response.success);
        assert!(
            response
                .message
                .as_deref()
                .unwrap()
                .starts_with("Error comparing weights: ")
        );
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["results"], json!([]));
        assert_eq!(body["deletedRecords"], json!([]));
    }
}
