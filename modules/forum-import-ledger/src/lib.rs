//! Idempotency ledger for the forum importer.
//!
//! Maps `(origin, entity type, legacy ID)` to the ID the destination assigned
//! when the legacy record was materialized. Durable rows live behind
//! [`ImportStore`]; [`Ledger`] mirrors them in a per-type in-memory cache so
//! the hot lookup path never touches the database.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::{ImportOutcome, Ledger};
pub use memory::MemoryImportStore;
pub use store::{ImportStore, PgImportStore};
pub use types::{ImportOrigin, ImportRecord};
