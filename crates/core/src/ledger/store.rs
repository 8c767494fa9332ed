//! Storage contract for ledger engines.
//!
//! The core never persists anything itself. It talks to a [`LedgerStore`],
//! which hands out [`UnitOfWork`] scopes:
//!
//! - `lock_card` holds the card's row lock until the unit of work ends
//! - writes are only visible to others after `commit`
//! - dropping a unit of work without committing discards every staged write
//!
//! Every write touching a card (balance, entries, limits) must happen while that
//! card is locked, so a unit of work holding the lock sees a stable balance,
//! limit set and ledger window. Callers locking more than one card lock them in
//! ascending [`CardId`] order.

use async_trait::async_trait;
use cardledger_shared::types::{
    CardId, LedgerEntryId, PageRequest, PageResponse, SpendingLimitId,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::entry::{EntryFilter, EntryType, LedgerEntry};
use super::error::LedgerError;
use crate::card::{Card, CardFilter};
use crate::limits::SpendingLimit;

/// Append-only recording and aggregate-query surface over ledger entries.
#[async_trait]
pub trait TransactionLedger: Send {
    /// Sums entry amounts of `card_id` dated within `[start, end]` inclusive,
    /// skipping entries of type `exclude`.
    async fn period_sum(
        &mut self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError>;

    /// Same as [`TransactionLedger::period_sum`] for a single date.
    async fn daily_sum(
        &mut self,
        card_id: CardId,
        exclude: EntryType,
        date: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        self.period_sum(card_id, exclude, date, date).await
    }

    /// Appends a new entry. Existing entries are never rewritten through this path.
    async fn append(&mut self, entry: LedgerEntry) -> Result<LedgerEntryId, LedgerError>;
}

/// An atomic scope over the store.
#[async_trait]
pub trait UnitOfWork: TransactionLedger {
    /// Locks the card and returns its current state, or `None` if it does not exist.
    ///
    /// Locking a card already held by this unit of work returns immediately.
    async fn lock_card(&mut self, card_id: CardId) -> Result<Option<Card>, LedgerError>;

    /// Stages a new card.
    async fn insert_card(&mut self, card: &Card) -> Result<(), LedgerError>;

    /// Stages new balance and status values for a locked card.
    async fn save_card(&mut self, card: &Card) -> Result<(), LedgerError>;

    /// Stages removal of a locked card together with its entries and limits.
    async fn remove_card(&mut self, card_id: CardId) -> Result<(), LedgerError>;

    /// Returns every limit of a locked card, active or not.
    async fn limits_for_card(&mut self, card_id: CardId)
    -> Result<Vec<SpendingLimit>, LedgerError>;

    /// Reads one limit as seen by this unit of work.
    async fn find_limit(
        &mut self,
        limit_id: SpendingLimitId,
    ) -> Result<Option<SpendingLimit>, LedgerError>;

    /// Stages a limit insert or update. The limit's card must be locked.
    async fn save_limit(&mut self, limit: &SpendingLimit) -> Result<(), LedgerError>;

    /// Stages removal of a limit. The limit's card must be locked.
    async fn remove_limit(&mut self, limit_id: SpendingLimitId) -> Result<(), LedgerError>;

    /// Reads one entry as seen by this unit of work.
    async fn find_entry(
        &mut self,
        entry_id: LedgerEntryId,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Stages a description change on an entry of a locked card.
    async fn set_entry_description(
        &mut self,
        entry_id: LedgerEntryId,
        description: &str,
    ) -> Result<(), LedgerError>;

    /// Makes every staged write visible at once and releases the locks.
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Durable storage for cards, ledger entries and spending limits.
///
/// The read methods observe committed state only and take no locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError>;

    /// Reads one card.
    async fn card(&self, card_id: CardId) -> Result<Option<Card>, LedgerError>;

    /// Lists cards matching the filter, ordered by id.
    async fn cards(&self, filter: &CardFilter) -> Result<Vec<Card>, LedgerError>;

    /// Reads one limit.
    async fn limit(&self, limit_id: SpendingLimitId) -> Result<Option<SpendingLimit>, LedgerError>;

    /// Lists the limits of a card, ordered by period start date then id.
    async fn limits(&self, card_id: CardId) -> Result<Vec<SpendingLimit>, LedgerError>;

    /// Reads one entry.
    async fn entry(&self, entry_id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Lists entries matching the filter, ordered by timestamp then id.
    async fn entries(
        &self,
        filter: &EntryFilter,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, LedgerError>;

    /// Committed-state variant of [`TransactionLedger::period_sum`].
    async fn period_sum(
        &self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError>;
}
