//! Card accounts: balances, status and ownership.

pub mod service;
pub mod types;

pub use service::CardService;
pub use types::{Card, CardFilter, CardStatus, OpenCardInput};
