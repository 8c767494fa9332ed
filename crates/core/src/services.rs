//! Bundle of every ledger service over one shared store.

use std::sync::Arc;

use cardledger_shared::config::LedgerConfig;

use crate::card::CardService;
use crate::ledger::{LedgerStore, TransactionService};
use crate::limits::LimitService;
use crate::transfer::TransferCoordinator;

/// All ledger services, sharing one store.
#[derive(Clone)]
pub struct LedgerServices {
    /// Card accounts.
    pub cards: CardService,
    /// Spending limits.
    pub limits: LimitService,
    /// Single-card transactions and ledger queries.
    pub transactions: TransactionService,
    /// Transfers between own cards.
    pub transfers: TransferCoordinator,
}

impl LedgerServices {
    /// Builds every service over `store` with the default ledger settings.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, &LedgerConfig::default())
    }

    /// Builds every service over `store`, applying `config`.
    #[must_use]
    pub fn with_config(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            cards: CardService::new(Arc::clone(&store)),
            limits: LimitService::new(Arc::clone(&store)),
            transactions: TransactionService::with_config(Arc::clone(&store), config),
            transfers: TransferCoordinator::new(store),
        }
    }
}
