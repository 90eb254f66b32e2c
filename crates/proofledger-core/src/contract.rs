//! Text-in, text-out operation surface.
//!
//! [`ProofRecordsContract`] exposes one method per externally invokable
//! operation. Arguments arrive as strings and results leave as JSON text.
//! Create and compare operations always answer with a JSON body (business
//! failures set `success: false`); only the pass-through queries can return
//! [`ContractError`].
//!
//! # Example
//!
//! ```rust
//! use proofledger_core::contract::ProofRecordsContract;
//! use proofledger_core::identity::StaticIdentity;
//! use proofledger_core::store::InMemoryLedgerStore;
//!
//! let contract = ProofRecordsContract::new(InMemoryLedgerStore::new(), StaticIdentity::new("alice"));
//! let body = contract.create_ticket(r#"{"id":"T1","incrementId":5,"receivedWeight":15}"#);
//! assert!(body.contains(r#""success":true"#));
//!
//! let report = contract.compare_weights_by_press_increment("false");
//! assert!(report.contains(r#""results":[]"#));
//! ```

use thiserror::Error;
use tracing::info;

use crate::duplicate::QueryFailurePolicy;
use crate::entity::EntityKind;
use crate::identity::IdentityProvider;
use crate::ingest::{self, IngestContext};
use crate::keys::{Clock, SystemClock};
use crate::query;
use crate::reconcile::{IncrementField, WeightReconciler};
use crate::store::{LedgerStore, StoreError};

/// Errors returned by the pass-through query operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContractError {
    /// No value is stored under the key.
    #[error("{} {key} does not exist", kind.title())]
    NotFound {
        /// Kind the caller asked for.
        kind: EntityKind,
        /// Requested key.
        key: String,
    },

    /// The ledger could not be read.
    #[error("failed to read from world state: {0}")]
    Store(#[from] StoreError),

    /// A result could not be encoded.
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Returns `true` only for the exact string `"true"`.
#[must_use]
pub fn parse_delete_flag(flag: &str) -> bool {
    flag == "true"
}

/// Proof record and ticket operations over a ledger store.
pub struct ProofRecordsContract<S, I> {
    store: S,
    identity: I,
    clock: Box<dyn Clock + Send + Sync>,
    on_query_error: QueryFailurePolicy,
}

impl<S, I> std::fmt::Debug for ProofRecordsContract<S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofRecordsContract")
            .field("on_query_error", &self.on_query_error)
            .finish_non_exhaustive()
    }
}

impl<S: LedgerStore, I: IdentityProvider> ProofRecordsContract<S, I> {
    /// Creates a contract using the system clock and fail-open duplicate
    /// detection.
    #[must_use]
    pub fn new(store: S, identity: I) -> Self {
        Self {
            store,
            identity,
            clock: Box::new(SystemClock),
            on_query_error: QueryFailurePolicy::default(),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Sets the duplicate-query failure policy.
    #[must_use]
    pub fn with_query_failure_policy(mut self, policy: QueryFailurePolicy) -> Self {
        self.on_query_error = policy;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn ingest_context(&self) -> IngestContext<'_> {
        IngestContext {
            store: &self.store,
            identity: &self.identity,
            clock: self.clock.as_ref(),
            on_query_error: self.on_query_error,
        }
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Initialises the ledger. Nothing is seeded; the store is probed so an
    /// unreadable ledger is reported up front.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub fn init_ledger(&self) -> Result<(), ContractError> {
        let records = query::list_all(&self.store, EntityKind::ProofRecord)?.len();
        let tickets = query::list_all(&self.store, EntityKind::Ticket)?.len();
        info!(operation = "init_ledger", records, tickets, "ledger initialised");
        Ok(())
    }

    // =========================================================================
    // Proof records
    // =========================================================================

    /// Validates and stores a proof record. Always returns a JSON response.
    #[must_use]
    pub fn create_proof_record(&self, record_data: &str) -> String {
        let response = ingest::create_proof_record(&self.ingest_context(), record_data);
        info!(
            operation = "create_proof_record",
            success = response.success,
            message = %response.message,
            "operation complete"
        );
        ingest::to_json(&response)
    }

    /// Raw stored JSON of one proof record.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::NotFound`] if the key is unknown and
    /// [`ContractError::Store`] if the read fails.
    pub fn query_proof_record(&self, record_id: &str) -> Result<String, ContractError> {
        query::get_entity(&self.store, EntityKind::ProofRecord, record_id)
    }

    /// Every proof record as `[{"Key", "Record"}]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn query_all_proof_records(&self) -> Result<String, ContractError> {
        self.query_all(EntityKind::ProofRecord)
    }

    /// Proof records whose `field_name` equals `field_value`. Numeric fields
    /// are compared as numbers. Any failure yields `[]`.
    #[must_use]
    pub fn query_records_by_field(&self, field_name: &str, field_value: &str) -> String {
        self.query_by_field(EntityKind::ProofRecord, field_name, field_value)
    }

    /// Version history of a key as `[{"TxId", "Timestamp", "IsDelete",
    /// "Record"}]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub fn get_record_history(&self, record_id: &str) -> Result<String, ContractError> {
        let rows = query::history(&self.store, record_id)?;
        info!(operation = "get_record_history", key = %record_id, versions = rows.len(), "operation complete");
        Ok(serde_json::to_string(&rows)?)
    }

    // =========================================================================
    // Tickets
    // =========================================================================

    /// Validates and stores a ticket. Always returns a JSON response.
    #[must_use]
    pub fn create_ticket(&self, ticket_data: &str) -> String {
        let response = ingest::create_ticket(&self.ingest_context(), ticket_data);
        info!(
            operation = "create_ticket",
            success = response.success,
            message = %response.message,
            "operation complete"
        );
        ingest::to_json(&response)
    }

    /// Raw stored JSON of one ticket.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::NotFound`] if the key is unknown and
    /// [`ContractError::Store`] if the read fails.
    pub fn query_ticket(&self, ticket_key: &str) -> Result<String, ContractError> {
        query::get_entity(&self.store, EntityKind::Ticket, ticket_key)
    }

    /// Every ticket as `[{"Key", "Record"}]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn query_all_tickets(&self) -> Result<String, ContractError> {
        self.query_all(EntityKind::Ticket)
    }

    /// Tickets whose `field_name` equals `field_value`. Any failure yields
    /// `[]`.
    #[must_use]
    pub fn query_tickets_by_field(&self, field_name: &str, field_value: &str) -> String {
        self.query_by_field(EntityKind::Ticket, field_name, field_value)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Compares weights grouped by `press_increment`. Only the exact string
    /// `"true"` enables deletion.
    #[must_use]
    pub fn compare_weights_by_press_increment(&self, delete_violations: &str) -> String {
        self.compare(IncrementField::Press, delete_violations)
    }

    /// Compares weights grouped by `store_increment`. Only the exact string
    /// `"true"` enables deletion.
    #[must_use]
    pub fn compare_weights_by_store_increment(&self, delete_violations: &str) -> String {
        self.compare(IncrementField::Store, delete_violations)
    }

    fn compare(&self, field: IncrementField, delete_violations: &str) -> String {
        let delete = parse_delete_flag(delete_violations);
        let response = WeightReconciler::new(&self.store).reconcile(field, delete);
        info!(
            operation = "compare_weights",
            field = field.field_name(),
            delete,
            success = response.success,
            "operation complete"
        );
        ingest::to_json(&response)
    }

    fn query_all(&self, kind: EntityKind) -> Result<String, ContractError> {
        let rows = query::list_all(&self.store, kind)?;
        info!(operation = "query_all", kind = %kind, rows = rows.len(), "operation complete");
        Ok(serde_json::to_string(&rows)?)
    }

    fn query_by_field(&self, kind: EntityKind, field: &str, value: &str) -> String {
        let rows = query::list_by_field(&self.store, kind, field, value);
        info!(operation = "query_by_field", kind = %kind, field, rows = rows.len(), "operation complete");
        serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
    }
}
