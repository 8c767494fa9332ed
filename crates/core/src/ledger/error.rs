//! Ledger error types.
//!
//! Every ledger operation fails with one of these variants; each variant
//! belongs to exactly one [`ErrorKind`] of the taxonomy callers branch on.

use cardledger_shared::AppError;
use cardledger_shared::types::{CardId, LedgerEntryId, SpendingLimitId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse classification of ledger failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Card, limit or entry absent, or not owned by the caller.
    NotFound,
    /// Input rejected before any state was read.
    InvalidArgument,
    /// Debit larger than the card balance.
    InsufficientFunds,
    /// Debit would breach a spending limit.
    LimitExceeded,
    /// Concurrent modification or lock contention.
    Conflict,
    /// Storage engine failure.
    Storage,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Not Found ==========
    /// Card not found, or not owned by the caller.
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    /// Spending limit not found.
    #[error("Spending limit not found: {0}")]
    LimitNotFound(SpendingLimitId),

    /// Ledger entry not found.
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(LedgerEntryId),

    // ========== Validation Errors ==========
    /// Argument rejected by validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Business Rule Errors ==========
    /// Card balance does not cover the debit.
    #[error("Insufficient funds on card {card_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// The debited card.
        card_id: CardId,
        /// Balance observed under lock.
        balance: Decimal,
        /// Requested debit amount.
        requested: Decimal,
    },

    /// Debit would reach or exceed a spending limit.
    #[error("Spending limit {0} exceeded")]
    LimitExceeded(SpendingLimitId),

    // ========== Concurrency Errors ==========
    /// Concurrent modification or lock timeout.
    #[error("Concurrent modification detected, please retry: {0}")]
    Conflict(String),

    // ========== Storage Errors ==========
    /// Storage engine error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CardNotFound(_) | Self::LimitNotFound(_) | Self::EntryNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CardNotFound(_) => "CARD_NOT_FOUND",
            Self::LimitNotFound(_) => "LIMIT_NOT_FOUND",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::LimitExceeded(_) => "LIMIT_EXCEEDED",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::InsufficientFunds | ErrorKind::LimitExceeded => 402,
            ErrorKind::Conflict => 409,
            ErrorKind::Storage => 500,
        }
    }

    /// Returns true if the caller may retry the same request unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::InvalidArgument => Self::Validation(message),
            ErrorKind::InsufficientFunds | ErrorKind::LimitExceeded => Self::Declined(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::Storage => Self::Database(message),
        }
    }
}
