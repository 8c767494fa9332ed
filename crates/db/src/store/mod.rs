//! Implementations of the ledger storage contract.
//!
//! - [`InMemoryLedgerStore`]: process-local tables with per-card async mutexes
//! - [`PgLedgerStore`]: PostgreSQL with row locks and per-transaction lock timeouts

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::map_db_err;
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;
