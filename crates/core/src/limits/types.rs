//! Spending limit types.

use cardledger_shared::types::{CardId, SpendingLimitId};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerError, check_amount_scale};

/// Length of a `MONTHLY` window in days, start date included.
pub const MONTHLY_WINDOW_DAYS: u64 = 30;

/// Period a limit aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    /// The start date only.
    Daily,
    /// Thirty consecutive days from the start date (not a calendar month).
    Monthly,
}

impl PeriodType {
    /// Every period type.
    pub const ALL: [Self; 2] = [Self::Daily, Self::Monthly];

    /// Returns the window this period covers when anchored at `start`.
    #[must_use]
    pub fn window(self, start: NaiveDate) -> PeriodWindow {
        let end = match self {
            Self::Daily => start,
            Self::Monthly => start
                .checked_add_days(Days::new(MONTHLY_WINDOW_DAYS - 1))
                .unwrap_or(NaiveDate::MAX),
        };
        PeriodWindow { start, end }
    }

    /// Returns the storage representation of this period.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Monthly => "MONTHLY",
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|period| period.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown period type: {s}"))
    }
}

/// Inclusive date range a limit aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    /// First date (inclusive).
    pub start: NaiveDate,
    /// Last date (inclusive).
    pub end: NaiveDate,
}

impl PeriodWindow {
    /// Returns true if `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date)
    }
}

/// A spending limit on one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimit {
    /// Limit ID.
    pub id: SpendingLimitId,
    /// Card the limit applies to.
    pub card_id: CardId,
    /// Period type.
    pub period_type: PeriodType,
    /// Cap on aggregate spend; a proposal reaching it exactly is rejected.
    pub limit_amount: Decimal,
    /// Anchor of the window.
    pub period_start_date: NaiveDate,
    /// Inactive limits are kept but never evaluated.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SpendingLimit {
    /// Creates an active limit from validated input.
    #[must_use]
    pub fn new(input: &CreateLimitInput, now: DateTime<Utc>) -> Self {
        Self {
            id: SpendingLimitId::new(),
            card_id: input.card_id,
            period_type: input.period_type,
            limit_amount: input.limit_amount,
            period_start_date: input.period_start_date,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the window this limit aggregates over.
    #[must_use]
    pub fn window(&self) -> PeriodWindow {
        self.period_type.window(self.period_start_date)
    }
}

/// Input for creating a spending limit.
#[derive(Debug, Clone)]
pub struct CreateLimitInput {
    /// Card the limit applies to.
    pub card_id: CardId,
    /// Period type.
    pub period_type: PeriodType,
    /// Cap (must be positive).
    pub limit_amount: Decimal,
    /// Window anchor (must not be in the future).
    pub period_start_date: NaiveDate,
}

impl CreateLimitInput {
    /// Validates the input against `today`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-positive amount or a future start date.
    pub fn validate(&self, today: NaiveDate) -> Result<(), LedgerError> {
        validate_limit_amount(self.limit_amount)?;
        validate_period_start(self.period_start_date, today)
    }
}

/// Input for updating a spending limit. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateLimitInput {
    /// New period type.
    pub period_type: Option<PeriodType>,
    /// New cap (must be positive).
    pub limit_amount: Option<Decimal>,
    /// New window anchor (must not be in the future).
    pub period_start_date: Option<NaiveDate>,
    /// New active flag.
    pub active: Option<bool>,
}

impl UpdateLimitInput {
    /// Validates the present fields against `today`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-positive amount or a future start date.
    pub fn validate(&self, today: NaiveDate) -> Result<(), LedgerError> {
        if let Some(amount) = self.limit_amount {
            validate_limit_amount(amount)?;
        }
        if let Some(start) = self.period_start_date {
            validate_period_start(start, today)?;
        }
        Ok(())
    }

    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.period_type.is_none()
            && self.limit_amount.is_none()
            && self.period_start_date.is_none()
            && self.active.is_none()
    }

    /// Writes the present fields onto `limit`.
    pub fn apply(&self, limit: &mut SpendingLimit, now: DateTime<Utc>) {
        if let Some(period_type) = self.period_type {
            limit.period_type = period_type;
        }
        if let Some(amount) = self.limit_amount {
            limit.limit_amount = amount;
        }
        if let Some(start) = self.period_start_date {
            limit.period_start_date = start;
        }
        if let Some(active) = self.active {
            limit.active = active;
        }
        limit.updated_at = now;
    }
}

fn validate_limit_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid("limit amount must be positive"));
    }
    check_amount_scale(amount, "limit amount")
}

fn validate_period_start(start: NaiveDate, today: NaiveDate) -> Result<(), LedgerError> {
    if start > today {
        return Err(LedgerError::invalid(format!(
            "period start date {start} is in the future"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_window_is_single_date() {
        let window = PeriodType::Daily.window(date(2026, 5, 17));
        assert_eq!(window.start, date(2026, 5, 17));
        assert_eq!(window.end, date(2026, 5, 17));
    }

    #[test]
    fn test_monthly_window_is_thirty_days_not_calendar_month() {
        let window = PeriodType::Monthly.window(date(2026, 2, 1));
        assert_eq!(window.end, date(2026, 3, 2));
        assert!(window.contains(date(2026, 3, 2)));
        assert!(!window.contains(date(2026, 3, 3)));

        let window = PeriodType::Monthly.window(date(2026, 1, 1));
        assert_eq!(window.end, date(2026, 1, 30));
        assert!(!window.contains(date(2026, 1, 31)));
    }

    #[test]
    fn test_create_validation() {
        let today = date(2026, 6, 1);
        let mut input = CreateLimitInput {
            card_id: CardId::new(),
            period_type: PeriodType::Daily,
            limit_amount: dec!(50.00),
            period_start_date: today,
        };
        assert!(input.validate(today).is_ok());

        input.limit_amount = dec!(0);
        assert!(matches!(input.validate(today), Err(LedgerError::InvalidArgument(_))));

        input.limit_amount = dec!(-1);
        assert!(input.validate(today).is_err());

        input.limit_amount = dec!(49.99999);
        assert!(matches!(input.validate(today), Err(LedgerError::InvalidArgument(_))));

        input.limit_amount = dec!(10);
        input.period_start_date = date(2026, 6, 2);
        assert!(input.validate(today).is_err());
    }

    #[test]
    fn test_update_applies_present_fields_only() {
        let now = Utc::now();
        let mut limit = SpendingLimit::new(
            &CreateLimitInput {
                card_id: CardId::new(),
                period_type: PeriodType::Daily,
                limit_amount: dec!(50),
                period_start_date: date(2026, 6, 1),
            },
            now,
        );

        let update = UpdateLimitInput {
            limit_amount: Some(dec!(75)),
            active: Some(false),
            ..UpdateLimitInput::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut limit, now);

        assert_eq!(limit.limit_amount, dec!(75));
        assert!(!limit.active);
        assert_eq!(limit.period_type, PeriodType::Daily);
        assert_eq!(limit.period_start_date, date(2026, 6, 1));
    }

    #[test]
    fn test_update_validation() {
        let today = date(2026, 6, 1);
        assert!(UpdateLimitInput::default().validate(today).is_ok());
        assert!(
            UpdateLimitInput {
                limit_amount: Some(dec!(0)),
                ..UpdateLimitInput::default()
            }
            .validate(today)
            .is_err()
        );
        assert!(
            UpdateLimitInput {
                limit_amount: Some(dec!(0.00001)),
                ..UpdateLimitInput::default()
            }
            .validate(today)
            .is_err()
        );
        assert!(
            UpdateLimitInput {
                period_start_date: Some(date(2026, 7, 1)),
                ..UpdateLimitInput::default()
            }
            .validate(today)
            .is_err()
        );
    }
}
