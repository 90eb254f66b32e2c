//! Conditional duplicate detection.
//!
//! A [`DuplicatePolicy`] is an ordered list of [`FieldGroup`]s. Each group has
//! an eligibility condition over the candidate's optional fields. For every
//! eligible group, in order, the detector queries the ledger for entities of
//! the same kind that match the candidate on the group's fields. The first
//! group with any match decides the outcome.
//!
//! A group field that is absent or null on the candidate is left out of the
//! selector; it never means "must be absent on the existing entity". The
//! fields reported for a duplicate are the ones that were actually compared.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::entity::{
    DOC_TYPE, EntityKind, INCREMENT_ID, PARENT_INCREMENT, PRESS_INCREMENT, STORE_INCREMENT,
    TICKET_ID, is_present,
};
use crate::query::QueryRow;
use crate::store::{LedgerStore, Selector, StoreError};

/// Condition under which a [`FieldGroup`] is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Always evaluated.
    Always,
    /// Evaluated when the field is present and non-null.
    Present(&'static str),
    /// Evaluated when the field is absent or null.
    Absent(&'static str),
    /// Evaluated when every listed field is absent or null.
    AllAbsent(&'static [&'static str]),
}

impl Eligibility {
    /// Evaluates the condition against `candidate`.
    #[must_use]
    pub fn holds(self, candidate: &Map<String, Value>) -> bool {
        match self {
            Self::Always => true,
            Self::Present(field) => is_present(candidate, field),
            Self::Absent(field) => !is_present(candidate, field),
            Self::AllAbsent(fields) => fields.iter().all(|f| !is_present(candidate, f)),
        }
    }
}

/// One group of fields compared together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGroup {
    /// When this group applies.
    pub when: Eligibility,
    /// Fields compared, in reporting order.
    pub fields: &'static [&'static str],
}

/// Ordered field groups for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicatePolicy {
    groups: &'static [FieldGroup],
}

impl DuplicatePolicy {
    /// Proof record groups.
    ///
    /// A store-path record (store increment set) that matches nothing on
    /// group 1 is also tried against group 3 when its press increment is
    /// unset. Group 4 can only match when group 2 already would have.
    pub const PROOF_RECORD: Self = Self {
        groups: &[
            FieldGroup {
                when: Eligibility::Present(STORE_INCREMENT),
                fields: &[STORE_INCREMENT, PRESS_INCREMENT, PARENT_INCREMENT],
            },
            FieldGroup {
                when: Eligibility::Absent(STORE_INCREMENT),
                fields: &[PRESS_INCREMENT, PARENT_INCREMENT],
            },
            FieldGroup {
                when: Eligibility::Absent(PRESS_INCREMENT),
                fields: &[PARENT_INCREMENT, STORE_INCREMENT],
            },
            FieldGroup {
                when: Eligibility::AllAbsent(&[PRESS_INCREMENT, STORE_INCREMENT]),
                fields: &[PARENT_INCREMENT],
            },
        ],
    };

    /// Ticket groups.
    pub const TICKET: Self = Self {
        groups: &[FieldGroup {
            when: Eligibility::Always,
            fields: &[INCREMENT_ID, TICKET_ID],
        }],
    };

    /// Groups in evaluation order.
    #[must_use]
    pub const fn groups(&self) -> &'static [FieldGroup] {
        self.groups
    }
}

/// What to do when a duplicate query fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFailurePolicy {
    /// Treat the group as matching nothing and move on.
    #[default]
    FailOpen,
    /// Abort the duplicate check with the store error.
    FailClosed,
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    /// No eligible group matched.
    Unique,
    /// A group matched existing entities.
    Duplicate {
        /// Fields of the matching group that the candidate carries, in
        /// policy order.
        fields: Vec<String>,
        /// Entities that matched.
        existing: Vec<QueryRow>,
    },
}

impl DuplicateCheck {
    /// Returns `true` for [`DuplicateCheck::Duplicate`].
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Evaluates a kind's [`DuplicatePolicy`] against the ledger.
#[derive(Clone, Copy)]
pub struct DuplicateDetector<'a> {
    store: &'a dyn LedgerStore,
    on_query_error: QueryFailurePolicy,
}

impl<'a> DuplicateDetector<'a> {
    /// Creates a detector reading from `store`.
    #[must_use]
    pub fn new(store: &'a dyn LedgerStore, on_query_error: QueryFailurePolicy) -> Self {
        Self {
            store,
            on_query_error,
        }
    }

    /// Runs `kind`'s policy for `candidate`.
    ///
    /// # Errors
    ///
    /// Returns the store error of a failed query under
    /// [`QueryFailurePolicy::FailClosed`]. Under
    /// [`QueryFailurePolicy::FailOpen`] this never fails.
    pub fn find_duplicates(
        &self,
        kind: EntityKind,
        candidate: &Map<String, Value>,
    ) -> Result<DuplicateCheck, StoreError> {
        for group in kind.duplicate_policy().groups() {
            if !group.when.holds(candidate) {
                continue;
            }

            let (selector, compared) = group_selector(kind, group, candidate);
            let hits = match self.store.query(&selector) {
                Ok(hits) => hits,
                Err(e) => match self.on_query_error {
                    QueryFailurePolicy::FailOpen => {
                        warn!(
                            kind = %kind,
                            fields = ?group.fields,
                            error = %e,
                            "duplicate query failed, treating group as unique"
                        );
                        continue;
                    },
                    QueryFailurePolicy::FailClosed => return Err(e),
                },
            };

            if !hits.is_empty() {
                debug!(kind = %kind, fields = ?group.fields, matches = hits.len(), "duplicate found");
                return Ok(DuplicateCheck::Duplicate {
                    fields: compared,
                    existing: hits.iter().map(QueryRow::from_key_value).collect(),
                });
            }
        }
        Ok(DuplicateCheck::Unique)
    }
}

/// Selector for one group plus the group fields it constrains.
fn group_selector(
    kind: EntityKind,
    group: &FieldGroup,
    candidate: &Map<String, Value>,
) -> (Selector, Vec<String>) {
    let mut selector = Selector::new().eq(DOC_TYPE, kind.doc_type());
    let mut compared = Vec::with_capacity(group.fields.len());
    for field in group.fields {
        if let Some(value) = candidate.get(*field).filter(|v| !v.is_null()) {
            selector = selector.eq(*field, value.clone());
            compared.push((*field).to_string());
        }
    }
    (selector, compared)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn seed(store: &InMemoryLedgerStore, key: &str, value: Value) {
        store.put(key, value.to_string().as_bytes()).unwrap();
    }

    #[test]
    fn group_selector_omits_absent_fields() {
        let candidate = object(json!({"parent_increment": 5, "press_increment": null}));
        let group = &DuplicatePolicy::PROOF_RECORD.groups()[1];
        let (selector, compared) = group_selector(EntityKind::ProofRecord, group, &candidate);
        assert_eq!(compared, ["parent_increment"]);
        assert_eq!(
            selector.to_json(),
            json!({"selector": {"docType": "proofRecord", "parent_increment": 5}})
        );
    }

    #[test]
    fn parent_only_records_collide_on_parent_increment() {
        let store = InMemoryLedgerStore::new();
        seed(&store, "PROOF_1_a", json!({"docType": "proofRecord", "parent_increment": 5}));

        let detector = DuplicateDetector::new(&store, QueryFailurePolicy::FailOpen);
        let check = detector
            .find_duplicates(EntityKind::ProofRecord, &object(json!({"parent_increment": 5.0})))
            .unwrap();

        // Group 2 is the first eligible group; only parent_increment is compared.
        match check {
            DuplicateCheck::Duplicate { fields, existing } => {
                assert_eq!(fields, ["parent_increment"]);
                assert_eq!(existing.len(), 1);
                assert_eq!(existing[0].key, "PROOF_1_a");
            },
            DuplicateCheck::Unique => panic!("expected duplicate"),
        }
    }

    #[test]
    fn store_path_record_falls_through_to_group_three() {
        let store = InMemoryLedgerStore::new();
        seed(
            &store,
            "PROOF_1_a",
            json!({"docType": "proofRecord", "parent_increment": 5, "store_increment": 9}),
        );

        let detector = DuplicateDetector::new(&store, QueryFailurePolicy::FailOpen);
        let candidate = object(json!({"parent_increment": 5, "store_increment": 9}));
        let check = detector
            .find_duplicates(EntityKind::ProofRecord, &candidate)
            .unwrap();
        let DuplicateCheck::Duplicate { fields, .. } = check else {
            panic!("expected duplicate");
        };
        assert_eq!(fields, ["store_increment", "parent_increment"]);

        let candidate = object(json!({"parent_increment": 5, "store_increment": 10}));
        let check = detector
            .find_duplicates(EntityKind::ProofRecord, &candidate)
            .unwrap();
        assert_eq!(check, DuplicateCheck::Unique);
    }

    #[test]
    fn other_kinds_never_collide() {
        let store = InMemoryLedgerStore::new();
        seed(&store, "TICKET_1", json!({"docType": "ticket", "parent_increment": 5}));

        let detector = DuplicateDetector::new(&store, QueryFailurePolicy::FailOpen);
        let check = detector
            .find_duplicates(EntityKind::ProofRecord, &object(json!({"parent_increment": 5})))
            .unwrap();
        assert!(!check.is_duplicate());
    }

    #[test]
    fn query_failure_follows_policy() {
        let store = InMemoryLedgerStore::new();
        store.set_fail_reads(true);
        let candidate = object(json!({"id": "1", "incrementId": 3}));

        let open = DuplicateDetector::new(&store, QueryFailurePolicy::FailOpen);
        assert_eq!(
            open.find_duplicates(EntityKind::Ticket, &candidate).unwrap(),
            DuplicateCheck::Unique
        );

        let closed = DuplicateDetector::new(&store, QueryFailurePolicy::FailClosed);
        assert!(closed.find_duplicates(EntityKind::Ticket, &candidate).is_err());
    }

    #[test]
    fn failure_policy_uses_snake_case() {
        let policy: QueryFailurePolicy = serde_json::from_value(json!("fail_closed")).unwrap();
        assert_eq!(policy, QueryFailurePolicy::FailClosed);
        assert_eq!(QueryFailurePolicy::default(), QueryFailurePolicy::FailOpen);
    }
}
