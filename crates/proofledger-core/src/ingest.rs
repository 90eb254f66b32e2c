//! Proof record and ticket ingestion.
//!
//! Ingestion never returns an error. Every failure (bad JSON, missing
//! fields, mistyped fields, duplicates, store faults) becomes a response with
//! `success: false` and a message. The pipeline is:
//!
//! 1. parse the payload as a JSON object
//! 2. check required fields
//! 3. parse into the typed entity
//! 4. run the kind's duplicate policy
//! 5. derive the key and apply stamps
//! 6. persist

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::duplicate::{DuplicateCheck, DuplicateDetector, QueryFailurePolicy};
use crate::entity::{EntityKind, LedgerEntity, ProofRecord, Ticket, strip_stamps};
use crate::identity::IdentityProvider;
use crate::keys::Clock;
use crate::query::QueryRow;
use crate::store::LedgerStore;

/// Fallback body if a response cannot be serialised.
const ENCODE_FAILURE: &str = r#"{"success":false,"message":"failed to encode response"}"#;

/// Collaborators needed by one ingestion call.
#[derive(Clone, Copy)]
pub struct IngestContext<'a> {
    pub store: &'a dyn LedgerStore,
    pub identity: &'a dyn IdentityProvider,
    pub clock: &'a dyn Clock,
    pub on_query_error: QueryFailurePolicy,
}

/// Why an entity was not created.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rejection {
    pub message: String,
    pub missing_fields: Vec<String>,
    pub duplicate_fields: Vec<String>,
    pub existing: Vec<QueryRow>,
}

impl Rejection {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Result of [`create_entity`].
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Persisted under `key`.
    Created {
        key: String,
        /// Stored document, stamps included.
        document: Value,
    },
    /// Not persisted.
    Rejected(Rejection),
}

impl IngestOutcome {
    /// Returns `true` for [`IngestOutcome::Created`].
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

fn saved_message(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::ProofRecord => "Record saved successfully",
        EntityKind::Ticket => "Ticket saved successfully",
    }
}

/// Validates, deduplicates, stamps and stores one entity.
pub fn create_entity<E: LedgerEntity>(ctx: &IngestContext<'_>, payload: &str) -> IngestOutcome {
    let kind = E::KIND;
    let label = kind.label();
    let noun = kind.noun();
    let fail = |detail: &dyn std::fmt::Display| {
        IngestOutcome::Rejected(Rejection::new(format!("Error creating {label}: {detail}")))
    };

    // 1. Parse.
    let mut candidate: Map<String, Value> = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return fail(&"payload must be a JSON object"),
        Err(e) => return fail(&e),
    };

    // 2. Required fields.
    let missing = kind.missing_required_fields(&candidate);
    if !missing.is_empty() {
        debug!(kind = %kind, missing = ?missing, "rejecting entity with missing fields");
        let mut rejection = Rejection::new(format!(
            "Error creating {label}: Invalid {noun} data. Missing required fields."
        ));
        rejection.missing_fields = missing.into_iter().map(str::to_string).collect();
        return IngestOutcome::Rejected(rejection);
    }

    // 3. Typed parse. System fields are always re-stamped, so caller values
    //    for them are dropped first.
    strip_stamps(&mut candidate);
    let mut entity: E = match serde_json::from_value(Value::Object(candidate.clone())) {
        Ok(entity) => entity,
        Err(e) => return fail(&format_args!("Invalid {noun} data. {e}")),
    };

    // 4. Duplicates.
    let detector = DuplicateDetector::new(ctx.store, ctx.on_query_error);
    match detector.find_duplicates(kind, &candidate) {
        Ok(DuplicateCheck::Unique) => {},
        Ok(DuplicateCheck::Duplicate { fields, existing }) => {
            info!(kind = %kind, fields = ?fields, matches = existing.len(), "duplicate rejected");
            return IngestOutcome::Rejected(Rejection {
                message: format!("Duplicate {noun} found"),
                missing_fields: Vec::new(),
                duplicate_fields: fields,
                existing,
            });
        },
        Err(e) => return fail(&e),
    }

    // 5. Key and stamps.
    let key = entity.storage_key(&candidate, ctx.clock.now_ms());
    let created_by = ctx.identity.caller_identity().unwrap_or_else(|e| {
        warn!(kind = %kind, key = %key, error = %e, "caller identity unavailable, stamping empty createdBy");
        String::new()
    });
    entity.stamp(&key, ctx.clock.now_rfc3339(), created_by);

    // 6. Persist.
    let document = match serde_json::to_value(&entity) {
        Ok(document) => document,
        Err(e) => return fail(&e),
    };
    let bytes = match serde_json::to_vec(&document) {
        Ok(bytes) => bytes,
        Err(e) => return fail(&e),
    };
    if let Err(e) = ctx.store.put(&key, &bytes) {
        warn!(kind = %kind, key = %key, error = %e, "failed to persist entity");
        return fail(&e);
    }

    info!(kind = %kind, key = %key, "entity created");
    IngestOutcome::Created { key, document }
}

// =============================================================================
// Responses
// =============================================================================

/// Response of the create-proof-record operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProofRecordResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub existing_records: Vec<QueryRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

/// Response of the create-ticket operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub existing_tickets: Vec<QueryRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl From<IngestOutcome> for CreateProofRecordResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Created { key, document } => Self {
                success: true,
                message: saved_message(EntityKind::ProofRecord).to_string(),
                record_id: Some(key),
                record: Some(document),
                duplicate_fields: Vec::new(),
                existing_records: Vec::new(),
                missing_fields: Vec::new(),
            },
            IngestOutcome::Rejected(r) => Self {
                success: false,
                message: r.message,
                record_id: None,
                record: None,
                duplicate_fields: r.duplicate_fields,
                existing_records: r.existing,
                missing_fields: r.missing_fields,
            },
        }
    }
}

impl From<IngestOutcome> for CreateTicketResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Created { key, document } => Self {
                success: true,
                message: saved_message(EntityKind::Ticket).to_string(),
                ticket_key: Some(key),
                ticket: Some(document),
                duplicate_fields: Vec::new(),
                existing_tickets: Vec::new(),
                missing_fields: Vec::new(),
            },
            IngestOutcome::Rejected(r) => Self {
                success: false,
                message: r.message,
                ticket_key: None,
                ticket: None,
                duplicate_fields: r.duplicate_fields,
                existing_tickets: r.existing,
                missing_fields: r.missing_fields,
            },
        }
    }
}

/// Serialises a response, falling back to a fixed failure body.
pub(crate) fn to_json<T: Serialize>(response: &T) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        warn!(error = %e, "failed to encode response");
        ENCODE_FAILURE.to_string()
    })
}

/// Creates a proof record from a JSON payload.
#[must_use]
pub fn create_proof_record(ctx: &IngestContext<'_>, payload: &str) -> CreateProofRecordResponse {
    create_entity::<ProofRecord>(ctx, payload).into()
}

/// Creates a ticket from a JSON payload.
#[must_use]
pub fn create_ticket(ctx: &IngestContext<'_>, payload: &str) -> CreateTicketResponse {
    create_entity::<Ticket>(ctx, payload).into()
}
