//! Card service: opening, status changes and removal of card accounts.

use std::sync::Arc;

use cardledger_shared::types::CardId;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use super::types::{Card, CardFilter, CardStatus, OpenCardInput};
use crate::ledger::{LedgerError, LedgerStore, check_amount_scale};

/// Card service over a ledger store.
#[derive(Clone)]
pub struct CardService {
    store: Arc<dyn LedgerStore>,
}

impl CardService {
    /// Creates a new card service.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Opens a card for an owner.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a negative opening balance or one with
    /// more than four decimal places.
    #[instrument(skip(self, input), fields(owner_id = %input.owner_id))]
    pub async fn open_card(&self, input: OpenCardInput) -> Result<Card, LedgerError> {
        if input.initial_balance < Decimal::ZERO {
            return Err(LedgerError::invalid("opening balance cannot be negative"));
        }
        check_amount_scale(input.initial_balance, "opening balance")?;

        let card = Card::new(input.owner_id, input.initial_balance, input.status, Utc::now());

        let mut uow = self.store.begin().await?;
        uow.insert_card(&card).await?;
        uow.commit().await?;

        info!(card_id = %card.id, balance = %card.balance, "card opened");
        Ok(card)
    }

    /// Finds a card by ID.
    ///
    /// # Errors
    ///
    /// Returns `CardNotFound` if the card does not exist.
    pub async fn find_card(&self, card_id: CardId) -> Result<Card, LedgerError> {
        self.store
            .card(card_id)
            .await?
            .ok_or(LedgerError::CardNotFound(card_id))
    }

    /// Lists cards matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn list_cards(&self, filter: &CardFilter) -> Result<Vec<Card>, LedgerError> {
        self.store.cards(filter).await
    }

    /// Changes a card's status.
    ///
    /// # Errors
    ///
    /// Returns `CardNotFound` if the card does not exist.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        card_id: CardId,
        status: CardStatus,
    ) -> Result<Card, LedgerError> {
        let mut uow = self.store.begin().await?;
        let mut card = uow
            .lock_card(card_id)
            .await?
            .ok_or(LedgerError::CardNotFound(card_id))?;

        card.status = status;
        card.updated_at = Utc::now();
        uow.save_card(&card).await?;
        uow.commit().await?;

        info!(%card_id, %status, "card status changed");
        Ok(card)
    }

    /// Deletes a card together with its ledger entries and spending limits.
    ///
    /// # Errors
    ///
    /// Returns `CardNotFound` if the card does not exist.
    #[instrument(skip(self))]
    pub async fn delete_card(&self, card_id: CardId) -> Result<(), LedgerError> {
        let mut uow = self.store.begin().await?;
        if uow.lock_card(card_id).await?.is_none() {
            return Err(LedgerError::CardNotFound(card_id));
        }

        uow.remove_card(card_id).await?;
        uow.commit().await?;

        info!(%card_id, "card deleted with its entries and limits");
        Ok(())
    }
}
