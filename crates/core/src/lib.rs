//! Ledger core for card accounts.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Storage engines plug in through the contract in [`ledger::store`].
//!
//! # Modules
//!
//! - `card` - Card accounts, balances and ownership
//! - `ledger` - Ledger entries, the storage contract and the error taxonomy
//! - `limits` - Spending limits and the limit evaluator
//! - `transfer` - Atomic transfers between a user's own cards
//! - `services` - One-stop bundle of every service over a shared store

pub mod card;
pub mod ledger;
pub mod limits;
pub mod services;
pub mod transfer;

pub use card::{Card, CardFilter, CardService, CardStatus, OpenCardInput};
pub use ledger::{
    EntryFilter, EntryType, LedgerEntry, LedgerError, LedgerStore, RecordTransactionInput,
    TransactionLedger, TransactionService, UnitOfWork,
};
pub use limits::{
    CreateLimitInput, LimitDecision, LimitEvaluator, LimitService, PeriodType, PeriodWindow,
    SpendingLimit, UpdateLimitInput,
};
pub use services::LedgerServices;
pub use transfer::{TransferCoordinator, TransferReceipt, TransferRequest};
