//! Database layer with `SeaORM` entities and ledger store engines.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Database migrations
//! - In-memory and PostgreSQL implementations of the ledger storage contract

pub mod entities;
pub mod migration;
pub mod store;

pub use migration::Migrator;
pub use store::{InMemoryLedgerStore, PgLedgerStore};

use std::sync::Arc;
use std::time::Duration;

use cardledger_core::{LedgerError, LedgerServices};
use cardledger_shared::config::{AppConfig, DatabaseConfig};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection pool to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    Database::connect(options).await
}

/// Connects the PostgreSQL store and builds every ledger service from `config`.
///
/// # Errors
///
/// Returns `Storage` if the connection cannot be established.
pub async fn connect_services(config: &AppConfig) -> Result<LedgerServices, LedgerError> {
    let store = PgLedgerStore::connect(&config.database).await?;
    Ok(LedgerServices::with_config(Arc::new(store), &config.ledger))
}
