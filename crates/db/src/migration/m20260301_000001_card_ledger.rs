//! Card ledger schema.
//!
//! Creates the cards, ledger_entries and spending_limits tables. Foreign keys
//! carry no `ON DELETE CASCADE`: removing a card deletes its entries and limits
//! explicitly inside the same transaction.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: CARDS
        // ============================================================
        db.execute_unprepared(CARDS_SQL).await?;

        // ============================================================
        // PART 2: LEDGER
        // ============================================================
        db.execute_unprepared(LEDGER_ENTRIES_SQL).await?;

        // ============================================================
        // PART 3: SPENDING LIMITS
        // ============================================================
        db.execute_unprepared(SPENDING_LIMITS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const CARDS_SQL: &str = r"
CREATE TABLE cards (
    id UUID PRIMARY KEY,
    owner_id UUID NOT NULL,
    balance NUMERIC(19, 4) NOT NULL,
    status VARCHAR(16) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_card_balance_non_negative CHECK (balance >= 0),
    CONSTRAINT chk_card_status CHECK (status IN ('ACTIVE', 'BLOCKED', 'EXPIRED'))
);

CREATE INDEX idx_cards_owner ON cards(owner_id);
";

const LEDGER_ENTRIES_SQL: &str = r"
CREATE TABLE ledger_entries (
    id UUID PRIMARY KEY,
    card_id UUID NOT NULL REFERENCES cards(id),
    amount NUMERIC(19, 4) NOT NULL,
    entry_type VARCHAR(16) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    occurred_at TIMESTAMPTZ NOT NULL,
    occurred_on DATE NOT NULL,
    CONSTRAINT chk_entry_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_entry_type CHECK (
        entry_type IN ('PAYMENT', 'DEPOSIT', 'TRANSFER_IN', 'TRANSFER_OUT', 'WITHDRAWAL')
    ),
    CONSTRAINT chk_entry_date_matches CHECK (occurred_on = (occurred_at AT TIME ZONE 'UTC')::date)
);

-- Window sums: card + date range
CREATE INDEX idx_ledger_entries_card_date ON ledger_entries(card_id, occurred_on);
CREATE INDEX idx_ledger_entries_occurred ON ledger_entries(occurred_at, id);
";

const SPENDING_LIMITS_SQL: &str = r"
CREATE TABLE spending_limits (
    id UUID PRIMARY KEY,
    card_id UUID NOT NULL REFERENCES cards(id),
    period_type VARCHAR(16) NOT NULL,
    limit_amount NUMERIC(19, 4) NOT NULL,
    period_start_date DATE NOT NULL,
    active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_limit_amount_positive CHECK (limit_amount > 0),
    CONSTRAINT chk_limit_period CHECK (period_type IN ('DAILY', 'MONTHLY'))
);

CREATE INDEX idx_spending_limits_card ON spending_limits(card_id, period_start_date);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS spending_limits;
DROP TABLE IF EXISTS ledger_entries;
DROP TABLE IF EXISTS cards;
";
