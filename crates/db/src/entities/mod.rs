//! `SeaORM` entities for the card ledger tables.

pub mod cards;
pub mod ledger_entries;
pub mod spending_limits;

pub mod prelude {
    //! Entity re-exports.
    pub use super::cards::Entity as Cards;
    pub use super::ledger_entries::Entity as LedgerEntries;
    pub use super::spending_limits::Entity as SpendingLimits;
}
