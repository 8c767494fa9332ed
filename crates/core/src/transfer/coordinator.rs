//! Transfer coordinator.
//!
//! A transfer runs in one unit of work:
//! 1. Lock both cards in ascending id order.
//! 2. Resolve both cards against the caller (missing or foreign → `CardNotFound`).
//! 3. Reject a same-card transfer and a non-positive amount.
//! 4. Check the source balance, then every active limit of the source card.
//! 5. Debit, credit, append `TRANSFER_OUT` / `TRANSFER_IN`, commit.
//!
//! Any failure drops the unit of work, which discards everything staged.

use std::sync::Arc;

use cardledger_shared::types::{CardId, LedgerEntryId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::card::Card;
use crate::ledger::{
    EntryType, LedgerEntry, LedgerError, LedgerStore, UnitOfWork, check_amount_scale,
};
use crate::limits::LimitEvaluator;

/// A request to move money between two cards of one user.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// The user both cards must belong to.
    pub user_id: UserId,
    /// Card to debit.
    pub from_card_id: CardId,
    /// Card to credit.
    pub to_card_id: CardId,
    /// Amount to move.
    pub amount: Decimal,
    /// Description stored on both entries.
    pub description: String,
}

/// Result of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// The `TRANSFER_OUT` entry on the source card.
    pub debit_entry_id: LedgerEntryId,
    /// The `TRANSFER_IN` entry on the destination card.
    pub credit_entry_id: LedgerEntryId,
    /// Source balance after the transfer.
    pub from_balance: Decimal,
    /// Destination balance after the transfer.
    pub to_balance: Decimal,
    /// Timestamp carried by both entries.
    pub occurred_at: DateTime<Utc>,
}

/// Orchestrates atomic transfers between own cards.
#[derive(Clone)]
pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
}

impl TransferCoordinator {
    /// Creates a new coordinator.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Transfers money now.
    ///
    /// # Errors
    ///
    /// See [`TransferCoordinator::transfer_at`].
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, LedgerError> {
        self.transfer_at(request, Utc::now()).await
    }

    /// Transfers money, stamping both entries with `now`.
    ///
    /// # Errors
    ///
    /// In order of precedence:
    /// - `CardNotFound` if either card is missing or not owned by the user
    /// - `InvalidArgument` for a same-card transfer, a non-positive amount or
    ///   an amount with more than four decimal places
    /// - `InsufficientFunds` if the source balance is short
    /// - `LimitExceeded` if an active limit of the source card would be reached
    /// - `Conflict` / `Storage` from the store
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            from = %request.from_card_id,
            to = %request.to_card_id,
            amount = %request.amount
        )
    )]
    pub async fn transfer_at(
        &self,
        request: TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<TransferReceipt, LedgerError> {
        let mut uow = self.store.begin().await?;

        let result = Self::run(&mut *uow, &request, now).await;
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "transfer rejected");
                return Err(err);
            }
        };

        uow.commit().await?;

        info!(
            debit_entry_id = %receipt.debit_entry_id,
            credit_entry_id = %receipt.credit_entry_id,
            from_balance = %receipt.from_balance,
            "transfer committed"
        );
        Ok(receipt)
    }

    async fn run(
        uow: &mut dyn UnitOfWork,
        request: &TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<TransferReceipt, LedgerError> {
        let (mut from, mut to) = Self::lock_pair(uow, request).await?;

        if request.from_card_id == request.to_card_id {
            return Err(LedgerError::invalid("cannot transfer to the same card"));
        }
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid("transfer amount must be positive"));
        }
        check_amount_scale(request.amount, "transfer amount")?;
        if from.balance < request.amount {
            return Err(LedgerError::InsufficientFunds {
                card_id: from.id,
                balance: from.balance,
                requested: request.amount,
            });
        }

        LimitEvaluator::evaluate(uow, from.id, request.amount, now)
            .await?
            .into_result()?;

        from.debit(request.amount, now)?;
        to.credit(request.amount, now);

        let debit_entry_id = uow
            .append(LedgerEntry::new(
                from.id,
                request.amount,
                EntryType::TransferOut,
                request.description.clone(),
                now,
            ))
            .await?;
        let credit_entry_id = uow
            .append(LedgerEntry::new(
                to.id,
                request.amount,
                EntryType::TransferIn,
                request.description.clone(),
                now,
            ))
            .await?;

        uow.save_card(&from).await?;
        uow.save_card(&to).await?;

        Ok(TransferReceipt {
            debit_entry_id,
            credit_entry_id,
            from_balance: from.balance,
            to_balance: to.balance,
            occurred_at: now,
        })
    }

    /// Locks both cards in ascending id order and resolves them against the user.
    ///
    /// A same-card request locks the card once and returns it twice.
    async fn lock_pair(
        uow: &mut dyn UnitOfWork,
        request: &TransferRequest,
    ) -> Result<(Card, Card), LedgerError> {
        let mut order = [request.from_card_id, request.to_card_id];
        order.sort();

        let first = uow.lock_card(order[0]).await?;
        let second = if order[0] == order[1] {
            first.clone()
        } else {
            uow.lock_card(order[1]).await?
        };

        let (from, to) = if order[0] == request.from_card_id {
            (first, second)
        } else {
            (second, first)
        };

        let owned = |card: Option<Card>, card_id: CardId| {
            card.filter(|card| card.is_owned_by(request.user_id))
                .ok_or(LedgerError::CardNotFound(card_id))
        };
        let from = owned(from, request.from_card_id)?;
        let to = owned(to, request.to_card_id)?;
        Ok((from, to))
    }
}
