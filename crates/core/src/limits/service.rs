//! Limit service: create, update, delete and inspect spending limits.
//!
//! Limit writes lock the limit's card first, so a limit never changes under a
//! transfer that is evaluating it.

use std::sync::Arc;

use cardledger_shared::types::{CardId, SpendingLimitId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use super::evaluator::{LimitDecision, LimitEvaluator};
use super::types::{CreateLimitInput, SpendingLimit, UpdateLimitInput};
use crate::ledger::{LedgerError, LedgerStore, UnitOfWork};

/// Spending limit service over a ledger store.
#[derive(Clone)]
pub struct LimitService {
    store: Arc<dyn LedgerStore>,
}

impl LimitService {
    /// Creates a new limit service.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Creates an active limit, validating against today's UTC date.
    ///
    /// # Errors
    ///
    /// See [`LimitService::create_limit_on`].
    pub async fn create_limit(&self, input: CreateLimitInput) -> Result<SpendingLimit, LedgerError> {
        self.create_limit_on(input, Utc::now().date_naive()).await
    }

    /// Creates an active limit, validating against `today`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-positive amount or a start date after
    /// `today`, and `CardNotFound` if the card does not exist.
    #[instrument(skip(self, input), fields(card_id = %input.card_id, period = %input.period_type))]
    pub async fn create_limit_on(
        &self,
        input: CreateLimitInput,
        today: NaiveDate,
    ) -> Result<SpendingLimit, LedgerError> {
        input.validate(today)?;

        let mut uow = self.store.begin().await?;
        if uow.lock_card(input.card_id).await?.is_none() {
            return Err(LedgerError::CardNotFound(input.card_id));
        }

        let limit = SpendingLimit::new(&input, Utc::now());
        uow.save_limit(&limit).await?;
        uow.commit().await?;

        info!(limit_id = %limit.id, amount = %limit.limit_amount, "spending limit created");
        Ok(limit)
    }

    /// Updates a limit, validating against today's UTC date.
    ///
    /// # Errors
    ///
    /// See [`LimitService::update_limit_on`].
    pub async fn update_limit(
        &self,
        limit_id: SpendingLimitId,
        input: UpdateLimitInput,
    ) -> Result<SpendingLimit, LedgerError> {
        self.update_limit_on(limit_id, input, Utc::now().date_naive())
            .await
    }

    /// Updates the present fields of a limit.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for invalid fields and `LimitNotFound` if the
    /// limit does not exist.
    #[instrument(skip(self, input))]
    pub async fn update_limit_on(
        &self,
        limit_id: SpendingLimitId,
        input: UpdateLimitInput,
        today: NaiveDate,
    ) -> Result<SpendingLimit, LedgerError> {
        input.validate(today)?;

        let (mut uow, mut limit) = self.lock_limit(limit_id).await?;
        input.apply(&mut limit, Utc::now());
        uow.save_limit(&limit).await?;
        uow.commit().await?;

        info!(
            card_id = %limit.card_id,
            amount = %limit.limit_amount,
            active = limit.active,
            "spending limit updated"
        );
        Ok(limit)
    }

    /// Deletes a limit.
    ///
    /// # Errors
    ///
    /// Returns `LimitNotFound` if the limit does not exist.
    #[instrument(skip(self))]
    pub async fn delete_limit(&self, limit_id: SpendingLimitId) -> Result<(), LedgerError> {
        let (mut uow, limit) = self.lock_limit(limit_id).await?;
        uow.remove_limit(limit_id).await?;
        uow.commit().await?;

        info!(card_id = %limit.card_id, "spending limit deleted");
        Ok(())
    }

    /// Finds a limit by ID.
    ///
    /// # Errors
    ///
    /// Returns `LimitNotFound` if the limit does not exist.
    pub async fn find_limit(&self, limit_id: SpendingLimitId) -> Result<SpendingLimit, LedgerError> {
        self.store
            .limit(limit_id)
            .await?
            .ok_or(LedgerError::LimitNotFound(limit_id))
    }

    /// Lists every limit of a card, ordered by period start date.
    ///
    /// # Errors
    ///
    /// Returns `CardNotFound` if the card does not exist.
    pub async fn list_limits(&self, card_id: CardId) -> Result<Vec<SpendingLimit>, LedgerError> {
        if self.store.card(card_id).await?.is_none() {
            return Err(LedgerError::CardNotFound(card_id));
        }
        self.store.limits(card_id).await
    }

    /// Reports whether a debit of `amount` would currently pass every limit.
    ///
    /// Runs under the card lock and commits nothing, so the answer is only
    /// advisory once the lock is released.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-positive amount and `CardNotFound`
    /// if the card does not exist.
    pub async fn evaluate(
        &self,
        card_id: CardId,
        amount: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<LimitDecision, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid("amount must be positive"));
        }

        let mut uow = self.store.begin().await?;
        if uow.lock_card(card_id).await?.is_none() {
            return Err(LedgerError::CardNotFound(card_id));
        }
        LimitEvaluator::evaluate(&mut *uow, card_id, amount, as_of).await
    }

    /// Opens a unit of work holding the lock of the limit's card and returns
    /// the limit as seen under that lock.
    async fn lock_limit(
        &self,
        limit_id: SpendingLimitId,
    ) -> Result<(Box<dyn UnitOfWork>, SpendingLimit), LedgerError> {
        let card_id = self
            .store
            .limit(limit_id)
            .await?
            .ok_or(LedgerError::LimitNotFound(limit_id))?
            .card_id;

        let mut uow = self.store.begin().await?;
        uow.lock_card(card_id).await?;

        // Re-read under the lock; the limit may have been removed meanwhile.
        let limit = uow
            .find_limit(limit_id)
            .await?
            .filter(|limit| limit.card_id == card_id)
            .ok_or(LedgerError::LimitNotFound(limit_id))?;

        Ok((uow, limit))
    }
}
