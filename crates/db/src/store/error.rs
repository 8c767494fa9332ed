//! Mapping of database errors onto the ledger taxonomy.

use cardledger_core::ledger::LedgerError;
use sea_orm::{DbErr, RuntimeErr};

/// SQLSTATE codes reported when concurrent work got in the way:
/// serialization failure, deadlock detected, lock not available.
const CONFLICT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

/// Converts a `DbErr` into a [`LedgerError`].
///
/// Contention surfaces as `Conflict` so callers may retry; everything else is `Storage`.
pub fn map_db_err(err: DbErr) -> LedgerError {
    match sqlstate(&err) {
        Some(code) if CONFLICT_SQLSTATES.contains(&code.as_str()) => {
            LedgerError::Conflict(err.to_string())
        }
        _ => LedgerError::Storage(err.to_string()),
    }
}

fn sqlstate(err: &DbErr) -> Option<String> {
    let runtime = match err {
        DbErr::Conn(runtime) | DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return None,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx_err) => database_code(sqlx_err),
        RuntimeErr::Internal(_) => None,
    }
}

fn database_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(std::borrow::Cow::into_owned)
}
