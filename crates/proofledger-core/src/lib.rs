//! # proofledger-core
//!
//! Proof record and ticket ledger with conditional duplicate detection and
//! weight reconciliation.
//!
//! Two entity streams are written to a key/value ledger:
//!
//! - **Proof records** assert a link in a traceability chain and carry a
//!   chained weight plus the press or store increment they belong to.
//! - **Tickets** record a physical weighing against an increment.
//!
//! Ingestion rejects entities that duplicate an existing one on a set of
//! fields chosen by which optional increments the candidate carries.
//! Reconciliation groups both streams by increment and flags groups whose
//! summed chained weight exceeds the largest received weight, optionally
//! deleting the offending proof records.
//!
//! ## Example
//!
//! ```rust
//! use proofledger_core::prelude::*;
//!
//! let contract = ProofRecordsContract::new(InMemoryLedgerStore::new(), UnresolvedIdentity);
//!
//! for (chain, weight) in [("A", 10), ("B", 8)] {
//!     let body = contract.create_proof_record(&format!(
//!         r#"{{"sponsor_id":"S","proof_short_id":"{chain}","collector_name":"C",
//!             "bulk_name":"{chain}","parent_increment":{weight},"chained_weight":{weight},
//!             "traceChainType":"press","bulk_short_id":"BS","press_increment":5}}"#
//!     ));
//!     assert!(body.contains(r#""success":true"#), "{body}");
//! }
//! let _ = contract.create_ticket(r#"{"id":"T1","incrementId":5,"receivedWeight":15}"#);
//!
//! let report = contract.compare_weights_by_press_increment("false");
//! assert!(report.contains(r#"{"incrementId":5,"chainedWeight":18.0,"receivedWeight":15.0}"#));
//! ```
//!
//! ## Modules
//!
//! - [`store`]: the [`LedgerStore`](store::LedgerStore) seam and its
//!   in-memory and `SQLite` backends
//! - [`entity`]: entity kinds, typed entities, wire field names
//! - [`duplicate`]: field-group duplicate policies
//! - [`ingest`]: create operations
//! - [`reconcile`]: weight comparison
//! - [`query`]: read-side operations
//! - [`contract`]: the text-in, text-out operation surface
//! - [`config`]: TOML configuration

pub mod config;
pub mod contract;
pub mod duplicate;
pub mod entity;
pub mod identity;
pub mod ingest;
pub mod keys;
pub mod numeric;
pub mod query;
pub mod reconcile;
pub mod store;

pub use config::{ConfigError, LedgerConfig};
pub use contract::{ContractError, ProofRecordsContract};
pub use entity::{EntityKind, ProofRecord, Ticket};
pub use store::{LedgerStore, StoreError};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{LedgerConfig, StoreBackend};
    pub use crate::contract::{ContractError, ProofRecordsContract};
    pub use crate::duplicate::QueryFailurePolicy;
    pub use crate::entity::EntityKind;
    pub use crate::identity::{IdentityProvider, StaticIdentity, UnresolvedIdentity};
    pub use crate::keys::{Clock, FixedClock, SystemClock};
    pub use crate::reconcile::IncrementField;
    pub use crate::store::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore};
}
