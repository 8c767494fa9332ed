//! Shared fixtures for the ledger integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use cardledger_core::{
    Card, CardStatus, LedgerServices, LedgerStore, OpenCardInput, TransferRequest,
};
use cardledger_db::InMemoryLedgerStore;
use cardledger_shared::types::{CardId, UserId};
use rust_decimal::Decimal;

/// Services over a fresh in-memory store, plus the store itself for inspection.
pub struct Fixture {
    pub store: Arc<InMemoryLedgerStore>,
    pub services: LedgerServices,
    pub owner: UserId,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let services = LedgerServices::new(Arc::clone(&store) as Arc<dyn LedgerStore>);
        Self {
            store,
            services,
            owner: UserId::new(),
        }
    }

    pub async fn card(&self, balance: Decimal) -> Card {
        self.services
            .cards
            .open_card(OpenCardInput {
                owner_id: self.owner,
                initial_balance: balance,
                status: CardStatus::Active,
            })
            .await
            .expect("open card")
    }

    pub async fn balance(&self, card_id: CardId) -> Decimal {
        self.services
            .cards
            .find_card(card_id)
            .await
            .expect("find card")
            .balance
    }

    pub fn transfer(&self, from: CardId, to: CardId, amount: Decimal) -> TransferRequest {
        TransferRequest {
            user_id: self.owner,
            from_card_id: from,
            to_card_id: to,
            amount,
            description: "between own cards".to_string(),
        }
    }
}
