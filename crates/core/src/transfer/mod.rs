//! Transfers between two cards of the same owner.

pub mod coordinator;

pub use coordinator::{TransferCoordinator, TransferReceipt, TransferRequest};
