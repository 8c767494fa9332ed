//! Ledger entry domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use cardledger_shared::types::{CardId, LedgerEntryId};

use super::error::LedgerError;

/// Decimal places every stored amount fits in (`NUMERIC(19, 4)`).
pub const AMOUNT_SCALE: u32 = 4;

/// Which way an entry moves money relative to its card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Money leaves the card.
    Debit,
    /// Money arrives on the card.
    Credit,
}

/// Type of ledger entry.
///
/// The amount of an entry is always positive; its direction is carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Card payment to a merchant.
    Payment,
    /// Money paid onto the card.
    Deposit,
    /// Incoming leg of a transfer between own cards.
    TransferIn,
    /// Outgoing leg of a transfer between own cards.
    TransferOut,
    /// Cash withdrawal.
    Withdrawal,
}

impl EntryType {
    /// Every entry type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Payment,
        Self::Deposit,
        Self::TransferIn,
        Self::TransferOut,
        Self::Withdrawal,
    ];

    /// Returns the direction this entry type moves money.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Deposit | Self::TransferIn => Direction::Credit,
            Self::Payment | Self::TransferOut | Self::Withdrawal => Direction::Debit,
        }
    }

    /// Returns true if entries of this type take money off the card.
    #[must_use]
    pub const fn is_debit(self) -> bool {
        matches!(self.direction(), Direction::Debit)
    }

    /// Applies the direction to a positive amount.
    #[must_use]
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self.direction() {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }

    /// Returns the storage representation of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::Deposit => "DEPOSIT",
            Self::TransferIn => "TRANSFER_IN",
            Self::TransferOut => "TRANSFER_OUT",
            Self::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown entry type: {s}"))
    }
}

/// A single committed movement of money against one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier for this entry.
    pub id: LedgerEntryId,
    /// The card this entry belongs to.
    pub card_id: CardId,
    /// Positive amount moved.
    pub amount: Decimal,
    /// Entry type, which also fixes the direction.
    pub entry_type: EntryType,
    /// Free-text description; the only field editable after commit.
    pub description: String,
    /// When the movement happened.
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a new entry with a fresh id.
    #[must_use]
    pub fn new(
        card_id: CardId,
        amount: Decimal,
        entry_type: EntryType,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            card_id,
            amount,
            entry_type,
            description: description.into(),
            occurred_at,
        }
    }

    /// Returns the signed effect on the card balance (credits positive).
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.entry_type.signed(self.amount)
    }

    /// Returns the UTC calendar date the entry counts towards.
    #[must_use]
    pub fn occurred_on(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }
}

/// Sums entry amounts of one card inside `[start, end]`, skipping one entry type.
///
/// Storage engines without a query planner use this for the aggregate queries.
pub fn window_sum<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    card_id: CardId,
    exclude: EntryType,
    start: NaiveDate,
    end: NaiveDate,
) -> Decimal {
    entries
        .into_iter()
        .filter(|e| e.card_id == card_id && e.entry_type != exclude)
        .filter(|e| (start..=end).contains(&e.occurred_on()))
        .map(|e| e.amount)
        .sum()
}

/// Rejects an amount with more fractional digits than storage keeps.
///
/// Trailing zeros do not count, so `1.50000` passes.
///
/// # Errors
///
/// Returns `InvalidArgument` naming `what` when the amount is too precise.
pub fn check_amount_scale(amount: Decimal, what: &str) -> Result<(), LedgerError> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::invalid(format!(
            "{what} {amount} has more than {AMOUNT_SCALE} decimal places"
        )));
    }
    Ok(())
}

/// Filter options for listing ledger entries.
///
/// Only fields that are set contribute a predicate; an empty filter matches
/// every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    /// Filter by card.
    pub card_id: Option<CardId>,
    /// Filter by entry type.
    pub entry_type: Option<EntryType>,
    /// Minimum amount (inclusive).
    pub min_amount: Option<Decimal>,
    /// Case-sensitive substring of the description.
    pub description_contains: Option<String>,
    /// Earliest timestamp (inclusive).
    pub occurred_from: Option<DateTime<Utc>>,
    /// Latest timestamp (inclusive).
    pub occurred_to: Option<DateTime<Utc>>,
}

impl EntryFilter {
    /// Filter matching all entries of one card.
    #[must_use]
    pub fn for_card(card_id: CardId) -> Self {
        Self {
            card_id: Some(card_id),
            ..Self::default()
        }
    }

    /// Restricts the filter to one entry type.
    #[must_use]
    pub fn with_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    /// Restricts the filter to a timestamp range (inclusive).
    #[must_use]
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.occurred_from = Some(from);
        self.occurred_to = Some(to);
        self
    }

    /// Returns true if the entry satisfies every present predicate.
    #[must_use]
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.card_id.is_none_or(|id| entry.card_id == id)
            && self.entry_type.is_none_or(|t| entry.entry_type == t)
            && self.min_amount.is_none_or(|min| entry.amount >= min)
            && self
                .description_contains
                .as_deref()
                .is_none_or(|needle| entry.description.contains(needle))
            && self.occurred_from.is_none_or(|from| entry.occurred_at >= from)
            && self.occurred_to.is_none_or(|to| entry.occurred_at <= to)
    }
}
