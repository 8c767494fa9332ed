//! Append-only ledger of card money movements.
//!
//! This module implements:
//! - Ledger entries and their direction (debit or credit)
//! - Deterministic entry filtering for listing queries
//! - The storage contract every engine implements
//! - The error taxonomy shared by all ledger operations
//! - Transaction service for recording entries and querying aggregates

pub mod entry;
pub mod error;
pub mod service;
pub mod store;

pub use entry::{
    AMOUNT_SCALE, Direction, EntryFilter, EntryType, LedgerEntry, check_amount_scale, window_sum,
};
pub use error::{ErrorKind, LedgerError};
pub use service::{RecordTransactionInput, TransactionService};
pub use store::{LedgerStore, TransactionLedger, UnitOfWork};
