//! Card account types.

use cardledger_shared::types::{CardId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{EntryType, LedgerError};

/// Lifecycle status of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    /// Card is usable.
    Active,
    /// Card was blocked by the owner or the bank.
    Blocked,
    /// Card passed its expiry date.
    Expired,
}

impl CardStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 3] = [Self::Active, Self::Blocked, Self::Expired];

    /// Returns the storage representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Blocked => "BLOCKED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown card status: {s}"))
    }
}

/// A card account holding an exact decimal balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card ID.
    pub id: CardId,
    /// Owning user.
    pub owner_id: UserId,
    /// Current balance; never negative after a committed debit.
    pub balance: Decimal,
    /// Card status.
    pub status: CardStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Creates a card with a fresh id.
    #[must_use]
    pub fn new(owner_id: UserId, balance: Decimal, status: CardStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: CardId::new(),
            owner_id,
            balance,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the card belongs to `user_id`.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    /// Takes `amount` off the balance.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the balance does not cover the amount;
    /// the card is left untouched.
    pub fn debit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                card_id: self.id,
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        self.updated_at = now;
        Ok(())
    }

    /// Adds `amount` to the balance.
    pub fn credit(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.balance += amount;
        self.updated_at = now;
    }

    /// Applies an entry of the given type to the balance.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` for a debit the balance does not cover.
    pub fn apply(
        &mut self,
        entry_type: EntryType,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if entry_type.is_debit() {
            self.debit(amount, now)
        } else {
            self.credit(amount, now);
            Ok(())
        }
    }
}

/// Input for opening a card.
#[derive(Debug, Clone)]
pub struct OpenCardInput {
    /// Owning user.
    pub owner_id: UserId,
    /// Opening balance (must not be negative).
    pub initial_balance: Decimal,
    /// Initial status.
    pub status: CardStatus,
}

/// Filter options for listing cards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFilter {
    /// Filter by owner.
    pub owner_id: Option<UserId>,
    /// Filter by status.
    pub status: Option<CardStatus>,
    /// Filter by the UTC calendar date the card was opened.
    pub created_on: Option<NaiveDate>,
}

impl CardFilter {
    /// Filter matching every card of one owner.
    #[must_use]
    pub fn for_owner(owner_id: UserId) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    /// Returns true if the card satisfies every present predicate.
    #[must_use]
    pub fn matches(&self, card: &Card) -> bool {
        self.owner_id.is_none_or(|owner| card.owner_id == owner)
            && self.status.is_none_or(|status| card.status == status)
            && self.created_on.is_none_or(|day| card.created_at.date_naive() == day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn card(balance: Decimal) -> Card {
        Card::new(UserId::new(), balance, CardStatus::Active, Utc::now())
    }

    #[test]
    fn test_debit_reduces_balance() {
        let mut card = card(dec!(100.00));
        card.debit(dec!(60.00), Utc::now()).unwrap();
        assert_eq!(card.balance, dec!(40.00));
    }

    #[test]
    fn test_debit_of_whole_balance_allowed() {
        let mut card = card(dec!(100.00));
        card.debit(dec!(100.00), Utc::now()).unwrap();
        assert_eq!(card.balance, dec!(0.00));
    }

    #[test]
    fn test_debit_beyond_balance_leaves_card_untouched() {
        let mut card = card(dec!(40.00));
        let before = card.clone();
        let err = card.debit(dec!(40.01), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(card, before);
    }

    #[test]
    fn test_apply_by_direction() {
        let mut card = card(dec!(10));
        card.apply(EntryType::Deposit, dec!(5), Utc::now()).unwrap();
        card.apply(EntryType::Payment, dec!(12), Utc::now()).unwrap();
        assert_eq!(card.balance, dec!(3));
        assert!(card.apply(EntryType::Withdrawal, dec!(4), Utc::now()).is_err());
    }

    #[test]
    fn test_card_filter() {
        let card = card(dec!(1));
        assert!(CardFilter::default().matches(&card));
        assert!(CardFilter::for_owner(card.owner_id).matches(&card));
        assert!(!CardFilter::for_owner(UserId::new()).matches(&card));
        assert!(
            !CardFilter {
                status: Some(CardStatus::Blocked),
                ..CardFilter::default()
            }
            .matches(&card)
        );
        assert!(
            CardFilter {
                created_on: Some(card.created_at.date_naive()),
                ..CardFilter::for_owner(card.owner_id)
            }
            .matches(&card)
        );
        assert!(
            !CardFilter {
                created_on: card.created_at.date_naive().pred_opt(),
                ..CardFilter::default()
            }
            .matches(&card)
        );
    }
}
