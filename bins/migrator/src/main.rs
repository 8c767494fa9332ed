//! Database migration runner for the card ledger.
//!
//! Usage:
//!   migrator up            - Run all pending migrations
//!   migrator down [-n N]   - Rollback the last N migrations (default 1)
//!   migrator status        - Show migration status
//!   migrator fresh         - Drop all tables and re-run migrations
//!   migrator refresh       - Rollback all migrations, then re-apply them
//!   migrator reset         - Rollback all migrations
//!
//! The database URL comes from `DATABASE_URL` (a `.env` file is honoured) or
//! `-u <url>`.

use cardledger_db::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Run the migrator CLI (it sets up its own tracing)
    cli::run_cli(Migrator).await;
}
