//! Transaction service for recording entries and querying the ledger.
//!
//! Recording a transaction is a single unit of work: lock the card, check funds
//! and limits for debits, append the entry, apply its effect to the balance and
//! commit. Credits (`DEPOSIT`, `TRANSFER_IN`) never consult spending limits.

use std::sync::Arc;

use cardledger_shared::config::LedgerConfig;
use cardledger_shared::types::{CardId, LedgerEntryId, PageRequest, PageResponse};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::entry::{EntryFilter, EntryType, LedgerEntry, check_amount_scale};
use super::error::LedgerError;
use super::store::{LedgerStore, UnitOfWork};
use crate::limits::LimitEvaluator;

/// Input for recording a single-card transaction.
#[derive(Debug, Clone)]
pub struct RecordTransactionInput {
    /// Card the entry belongs to.
    pub card_id: CardId,
    /// Positive amount.
    pub amount: Decimal,
    /// Entry type; fixes the direction.
    pub entry_type: EntryType,
    /// Free-text description.
    pub description: String,
}

/// Transaction service over a ledger store.
#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    default_page_size: u32,
}

impl TransactionService {
    /// Creates a new transaction service with the default ledger settings.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, &LedgerConfig::default())
    }

    /// Creates a new transaction service using `config` for listing defaults.
    #[must_use]
    pub fn with_config(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            default_page_size: config.default_page_size,
        }
    }

    /// First page at the configured default size.
    #[must_use]
    pub fn default_page(&self) -> PageRequest {
        PageRequest::new(1, self.default_page_size)
    }

    /// Records a transaction now.
    ///
    /// # Errors
    ///
    /// See [`TransactionService::record_transaction_at`].
    pub async fn record_transaction(
        &self,
        input: RecordTransactionInput,
    ) -> Result<LedgerEntry, LedgerError> {
        self.record_transaction_at(input, Utc::now()).await
    }

    /// Records a transaction stamped with `now` and applies it to the balance.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a non-positive amount or one with more than
    ///   four decimal places
    /// - `CardNotFound` if the card does not exist
    /// - `InsufficientFunds` for a debit larger than the balance
    /// - `LimitExceeded` for a debit reaching an active limit
    #[instrument(
        skip(self, input),
        fields(card_id = %input.card_id, entry_type = %input.entry_type, amount = %input.amount)
    )]
    pub async fn record_transaction_at(
        &self,
        input: RecordTransactionInput,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if input.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid("transaction amount must be positive"));
        }
        check_amount_scale(input.amount, "transaction amount")?;

        let mut uow = self.store.begin().await?;
        let entry = match Self::record(&mut *uow, input, now).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "transaction rejected");
                return Err(err);
            }
        };
        uow.commit().await?;

        info!(entry_id = %entry.id, "transaction recorded");
        Ok(entry)
    }

    async fn record(
        uow: &mut dyn UnitOfWork,
        input: RecordTransactionInput,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut card = uow
            .lock_card(input.card_id)
            .await?
            .ok_or(LedgerError::CardNotFound(input.card_id))?;

        if input.entry_type.is_debit() {
            if card.balance < input.amount {
                return Err(LedgerError::InsufficientFunds {
                    card_id: card.id,
                    balance: card.balance,
                    requested: input.amount,
                });
            }
            LimitEvaluator::evaluate(uow, card.id, input.amount, now)
                .await?
                .into_result()?;
        }

        card.apply(input.entry_type, input.amount, now)?;

        let entry = LedgerEntry::new(
            card.id,
            input.amount,
            input.entry_type,
            input.description,
            now,
        );
        uow.append(entry.clone()).await?;
        uow.save_card(&card).await?;
        Ok(entry)
    }

    /// Replaces the description of a committed entry. Nothing else about an
    /// entry can change once recorded.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if the entry does not exist.
    #[instrument(skip(self, description))]
    pub async fn update_entry_description(
        &self,
        entry_id: LedgerEntryId,
        description: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let card_id = self
            .store
            .entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?
            .card_id;

        let mut uow = self.store.begin().await?;
        uow.lock_card(card_id).await?;
        let mut entry = uow
            .find_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;

        uow.set_entry_description(entry_id, description).await?;
        uow.commit().await?;

        entry.description = description.to_string();
        info!(%card_id, "entry description updated");
        Ok(entry)
    }

    /// Finds an entry by ID.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if the entry does not exist.
    pub async fn find_entry(&self, entry_id: LedgerEntryId) -> Result<LedgerEntry, LedgerError> {
        self.store
            .entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))
    }

    /// Lists entries matching the filter, oldest first. Without a page the
    /// first page at the configured default size is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list_entries(
        &self,
        filter: &EntryFilter,
        page: Option<PageRequest>,
    ) -> Result<PageResponse<LedgerEntry>, LedgerError> {
        let page = page.unwrap_or_else(|| self.default_page());
        self.store.entries(filter, page).await
    }

    /// Lists the entries of one card, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `CardNotFound` if the card does not exist.
    pub async fn entries_for_card(
        &self,
        card_id: CardId,
        page: Option<PageRequest>,
    ) -> Result<PageResponse<LedgerEntry>, LedgerError> {
        self.ensure_card(card_id).await?;
        self.list_entries(&EntryFilter::for_card(card_id), page).await
    }

    /// Sums the card's entries on `date`, skipping `exclude`.
    ///
    /// # Errors
    ///
    /// Returns `CardNotFound` if the card does not exist.
    pub async fn daily_sum(
        &self,
        card_id: CardId,
        exclude: EntryType,
        date: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        self.period_sum(card_id, exclude, date, date).await
    }

    /// Sums the card's entries within `[start, end]`, skipping `exclude`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `start` is after `end` and `CardNotFound`
    /// if the card does not exist.
    pub async fn period_sum(
        &self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        if start > end {
            return Err(LedgerError::invalid(format!(
                "period start {start} is after end {end}"
            )));
        }
        self.ensure_card(card_id).await?;
        self.store.period_sum(card_id, exclude, start, end).await
    }

    async fn ensure_card(&self, card_id: CardId) -> Result<(), LedgerError> {
        match self.store.card(card_id).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::CardNotFound(card_id)),
        }
    }
}
