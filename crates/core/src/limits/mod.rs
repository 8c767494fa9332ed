//! Spending limits and their enforcement.
//!
//! A limit caps the aggregate spend of a card over a period window:
//! - `DAILY`: the single date `period_start_date`
//! - `MONTHLY`: the fixed 30-day span starting at `period_start_date`

pub mod evaluator;
pub mod service;
pub mod types;

#[cfg(test)]
mod evaluator_props;

pub use evaluator::{LimitDecision, LimitEvaluator};
pub use service::LimitService;
pub use types::{
    CreateLimitInput, MONTHLY_WINDOW_DAYS, PeriodType, PeriodWindow, SpendingLimit,
    UpdateLimitInput,
};
