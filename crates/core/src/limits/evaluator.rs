//! Limit evaluator: decides whether a proposed debit fits every active limit.
//!
//! For each active limit of the card, ordered by period start date then id:
//! 1. Compute the period window.
//! 2. Sum the card's entries over the window, excluding `DEPOSIT` entries.
//! 3. Require `sum + proposed < limit_amount` (strict).
//!
//! The first failing limit is reported. A card without active limits admits
//! every proposal. Evaluation only reads; callers run it inside the unit of work
//! holding the card lock so the aggregates cannot move before commit.

use cardledger_shared::types::{CardId, SpendingLimitId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::types::SpendingLimit;
use crate::ledger::{EntryType, LedgerError, TransactionLedger, UnitOfWork};

/// Entry type left out of every limit aggregate.
pub const EXCLUDED_FROM_SPEND: EntryType = EntryType::Deposit;

/// Outcome of a limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    /// Every active limit admits the proposal.
    Allowed,
    /// The first limit the proposal would reach or exceed.
    Exceeded(SpendingLimitId),
}

impl LimitDecision {
    /// Returns true if the proposal was admitted.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Converts the decision into a result, failing with `LimitExceeded`.
    ///
    /// # Errors
    ///
    /// Returns `LimitExceeded` carrying the offending limit.
    pub fn into_result(self) -> Result<(), LedgerError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Exceeded(limit_id) => Err(LedgerError::LimitExceeded(limit_id)),
        }
    }
}

/// Stateless evaluator over a [`TransactionLedger`].
pub struct LimitEvaluator;

impl LimitEvaluator {
    /// Evaluates `proposed` against every active limit of `card_id`.
    ///
    /// The card must already be locked by `uow`. `as_of` is the moment the
    /// debit would be recorded; windows come from each limit's own start date.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn evaluate(
        uow: &mut dyn UnitOfWork,
        card_id: CardId,
        proposed: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<LimitDecision, LedgerError> {
        let limits = uow.limits_for_card(card_id).await?;
        Self::evaluate_limits(uow, &limits, card_id, proposed, as_of).await
    }

    /// Evaluates `proposed` against an explicit limit set.
    ///
    /// Inactive limits are skipped. Limits are visited by period start date
    /// then id, so the reported limit does not depend on storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub async fn evaluate_limits<L>(
        ledger: &mut L,
        limits: &[SpendingLimit],
        card_id: CardId,
        proposed: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<LimitDecision, LedgerError>
    where
        L: TransactionLedger + ?Sized,
    {
        let mut active: Vec<&SpendingLimit> = limits
            .iter()
            .filter(|limit| limit.active && limit.card_id == card_id)
            .collect();
        active.sort_by_key(|limit| (limit.period_start_date, limit.id));

        for limit in active {
            let window = limit.window();
            let spent = ledger
                .period_sum(card_id, EXCLUDED_FROM_SPEND, window.start, window.end)
                .await?;

            debug!(
                %card_id,
                limit_id = %limit.id,
                period = %limit.period_type,
                window_start = %window.start,
                window_end = %window.end,
                %spent,
                %proposed,
                limit_amount = %limit.limit_amount,
                %as_of,
                "evaluating spending limit"
            );

            if !Self::admits(spent, proposed, limit.limit_amount) {
                return Ok(LimitDecision::Exceeded(limit.id));
            }
        }

        Ok(LimitDecision::Allowed)
    }

    /// Returns true if `spent + proposed` stays strictly below `limit_amount`.
    #[must_use]
    pub fn admits(spent: Decimal, proposed: Decimal, limit_amount: Decimal) -> bool {
        spent + proposed < limit_amount
    }
}
