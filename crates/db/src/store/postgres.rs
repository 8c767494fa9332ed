//! PostgreSQL ledger store.
//!
//! A unit of work is one database transaction. `lock_card` issues
//! `SELECT ... FOR UPDATE` on the card row and `SET LOCAL lock_timeout` bounds
//! how long it waits, so contention ends in a `Conflict` instead of a hang.

use std::collections::BTreeSet;

use async_trait::async_trait;
use cardledger_core::card::{Card, CardFilter};
use cardledger_core::ledger::{
    EntryFilter, EntryType, LedgerEntry, LedgerError, LedgerStore, TransactionLedger, UnitOfWork,
};
use cardledger_core::limits::SpendingLimit;
use cardledger_shared::config::DatabaseConfig;
use cardledger_shared::types::{
    CardId, LedgerEntryId, PageRequest, PageResponse, SpendingLimitId, UserId,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ActiveValue::Unchanged, ColumnTrait, Condition,
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    TransactionTrait,
};
use tracing::{debug, instrument};

use super::error::map_db_err;
use crate::entities::{cards, ledger_entries, spending_limits};

/// Ledger store backed by PostgreSQL through `SeaORM`.
#[derive(Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
    lock_timeout_ms: u64,
}

impl PgLedgerStore {
    /// Wraps an open connection pool.
    #[must_use]
    pub fn new(db: DatabaseConnection, lock_timeout_ms: u64) -> Self {
        Self { db, lock_timeout_ms }
    }

    /// Connects using the database configuration.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the connection cannot be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, LedgerError> {
        let db = crate::connect(config).await.map_err(map_db_err)?;
        Ok(Self::new(db, config.lock_timeout_ms))
    }

    /// Returns the underlying connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        let txn = self.db.begin().await.map_err(map_db_err)?;
        txn.execute_unprepared(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout_ms
        ))
        .await
        .map_err(map_db_err)?;

        Ok(Box::new(PgUnitOfWork {
            txn,
            locked: BTreeSet::new(),
        }))
    }

    async fn card(&self, card_id: CardId) -> Result<Option<Card>, LedgerError> {
        cards::Entity::find_by_id(card_id.into_inner())
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .map(card_from_model)
            .transpose()
    }

    async fn cards(&self, filter: &CardFilter) -> Result<Vec<Card>, LedgerError> {
        let mut condition = Condition::all();
        if let Some(owner_id) = filter.owner_id {
            condition = condition.add(cards::Column::OwnerId.eq(owner_id.into_inner()));
        }
        if let Some(status) = filter.status {
            condition = condition.add(cards::Column::Status.eq(status.as_str()));
        }
        if let Some(day) = filter.created_on {
            condition = condition.add(cards::Column::CreatedAt.gte(start_of_day(day)));
            if let Some(next) = day.succ_opt() {
                condition = condition.add(cards::Column::CreatedAt.lt(start_of_day(next)));
            }
        }

        cards::Entity::find()
            .filter(condition)
            .order_by_asc(cards::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(card_from_model)
            .collect()
    }

    async fn limit(&self, limit_id: SpendingLimitId) -> Result<Option<SpendingLimit>, LedgerError> {
        spending_limits::Entity::find_by_id(limit_id.into_inner())
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .map(limit_from_model)
            .transpose()
    }

    async fn limits(&self, card_id: CardId) -> Result<Vec<SpendingLimit>, LedgerError> {
        limits_of_card(&self.db, card_id).await
    }

    async fn entry(&self, entry_id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        ledger_entries::Entity::find_by_id(entry_id.into_inner())
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .map(entry_from_model)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn entries(
        &self,
        filter: &EntryFilter,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, LedgerError> {
        let query = ledger_entries::Entity::find().filter(entry_condition(filter));

        let total = query.clone().count(&self.db).await.map_err(map_db_err)?;

        let data = query
            .order_by_asc(ledger_entries::Column::OccurredAt)
            .order_by_asc(ledger_entries::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(entry_from_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResponse::new(data, page, total))
    }

    async fn period_sum(
        &self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        window_total(&self.db, card_id, exclude, start, end).await
    }
}

/// One database transaction plus the set of card rows it has locked.
struct PgUnitOfWork {
    txn: DatabaseTransaction,
    locked: BTreeSet<CardId>,
}

impl PgUnitOfWork {
    fn ensure_locked(&self, card_id: CardId) -> Result<(), LedgerError> {
        if self.locked.contains(&card_id) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!(
                "card {card_id} must be locked before it is written"
            )))
        }
    }
}

#[async_trait]
impl TransactionLedger for PgUnitOfWork {
    async fn period_sum(
        &mut self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        window_total(&self.txn, card_id, exclude, start, end).await
    }

    async fn append(&mut self, entry: LedgerEntry) -> Result<LedgerEntryId, LedgerError> {
        self.ensure_locked(entry.card_id)?;

        ledger_entries::ActiveModel {
            id: Set(entry.id.into_inner()),
            card_id: Set(entry.card_id.into_inner()),
            amount: Set(entry.amount),
            entry_type: Set(entry.entry_type.as_str().to_string()),
            description: Set(entry.description.clone()),
            occurred_at: Set(entry.occurred_at.into()),
            occurred_on: Set(entry.occurred_on()),
        }
        .insert(&self.txn)
        .await
        .map_err(map_db_err)?;

        Ok(entry.id)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_card(&mut self, card_id: CardId) -> Result<Option<Card>, LedgerError> {
        let model = cards::Entity::find_by_id(card_id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;

        debug!(%card_id, found = model.is_some(), "card row locked");
        self.locked.insert(card_id);
        model.map(card_from_model).transpose()
    }

    async fn insert_card(&mut self, card: &Card) -> Result<(), LedgerError> {
        cards::ActiveModel {
            id: Set(card.id.into_inner()),
            owner_id: Set(card.owner_id.into_inner()),
            balance: Set(card.balance),
            status: Set(card.status.as_str().to_string()),
            created_at: Set(card.created_at.into()),
            updated_at: Set(card.updated_at.into()),
        }
        .insert(&self.txn)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn save_card(&mut self, card: &Card) -> Result<(), LedgerError> {
        self.ensure_locked(card.id)?;

        cards::ActiveModel {
            id: Unchanged(card.id.into_inner()),
            balance: Set(card.balance),
            status: Set(card.status.as_str().to_string()),
            updated_at: Set(card.updated_at.into()),
            ..Default::default()
        }
        .update(&self.txn)
        .await
        .map_err(|err| match err {
            sea_orm::DbErr::RecordNotUpdated => LedgerError::CardNotFound(card.id),
            other => map_db_err(other),
        })?;
        Ok(())
    }

    async fn remove_card(&mut self, card_id: CardId) -> Result<(), LedgerError> {
        self.ensure_locked(card_id)?;
        let id = card_id.into_inner();

        let entries = ledger_entries::Entity::delete_many()
            .filter(ledger_entries::Column::CardId.eq(id))
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        let limits = spending_limits::Entity::delete_many()
            .filter(spending_limits::Column::CardId.eq(id))
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        cards::Entity::delete_by_id(id)
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;

        debug!(
            %card_id,
            entries = entries.rows_affected,
            limits = limits.rows_affected,
            "card removed"
        );
        Ok(())
    }

    async fn limits_for_card(
        &mut self,
        card_id: CardId,
    ) -> Result<Vec<SpendingLimit>, LedgerError> {
        limits_of_card(&self.txn, card_id).await
    }

    async fn find_limit(
        &mut self,
        limit_id: SpendingLimitId,
    ) -> Result<Option<SpendingLimit>, LedgerError> {
        spending_limits::Entity::find_by_id(limit_id.into_inner())
            .one(&self.txn)
            .await
            .map_err(map_db_err)?
            .map(limit_from_model)
            .transpose()
    }

    async fn save_limit(&mut self, limit: &SpendingLimit) -> Result<(), LedgerError> {
        self.ensure_locked(limit.card_id)?;

        let model = spending_limits::ActiveModel {
            id: Set(limit.id.into_inner()),
            card_id: Set(limit.card_id.into_inner()),
            period_type: Set(limit.period_type.as_str().to_string()),
            limit_amount: Set(limit.limit_amount),
            period_start_date: Set(limit.period_start_date),
            active: Set(limit.active),
            created_at: Set(limit.created_at.into()),
            updated_at: Set(limit.updated_at.into()),
        };

        spending_limits::Entity::insert(model)
            .on_conflict(
                OnConflict::column(spending_limits::Column::Id)
                    .update_columns([
                        spending_limits::Column::PeriodType,
                        spending_limits::Column::LimitAmount,
                        spending_limits::Column::PeriodStartDate,
                        spending_limits::Column::Active,
                        spending_limits::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn remove_limit(&mut self, limit_id: SpendingLimitId) -> Result<(), LedgerError> {
        let limit = self
            .find_limit(limit_id)
            .await?
            .ok_or(LedgerError::LimitNotFound(limit_id))?;
        self.ensure_locked(limit.card_id)?;

        let result = spending_limits::Entity::delete_by_id(limit_id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::LimitNotFound(limit_id));
        }
        Ok(())
    }

    async fn find_entry(
        &mut self,
        entry_id: LedgerEntryId,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        ledger_entries::Entity::find_by_id(entry_id.into_inner())
            .one(&self.txn)
            .await
            .map_err(map_db_err)?
            .map(entry_from_model)
            .transpose()
    }

    async fn set_entry_description(
        &mut self,
        entry_id: LedgerEntryId,
        description: &str,
    ) -> Result<(), LedgerError> {
        let entry = self
            .find_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        self.ensure_locked(entry.card_id)?;

        let result = ledger_entries::Entity::update_many()
            .col_expr(ledger_entries::Column::Description, Expr::value(description))
            .filter(ledger_entries::Column::Id.eq(entry_id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::EntryNotFound(entry_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let this = *self;
        this.txn.commit().await.map_err(map_db_err)
    }
}

#[derive(Debug, FromQueryResult)]
struct WindowTotal {
    total: Decimal,
}

const WINDOW_TOTAL_SQL: &str = r"
SELECT COALESCE(SUM(amount), 0) AS total
FROM ledger_entries
WHERE card_id = $1
  AND entry_type <> $2
  AND occurred_on BETWEEN $3 AND $4
";

async fn window_total<C: ConnectionTrait>(
    conn: &C,
    card_id: CardId,
    exclude: EntryType,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Decimal, LedgerError> {
    let row = WindowTotal::find_by_statement(Statement::from_sql_and_values(
        DbBackend::Postgres,
        WINDOW_TOTAL_SQL,
        [
            card_id.into_inner().into(),
            exclude.as_str().into(),
            start.into(),
            end.into(),
        ],
    ))
    .one(conn)
    .await
    .map_err(map_db_err)?;

    Ok(row.map_or(Decimal::ZERO, |row| row.total))
}

async fn limits_of_card<C: ConnectionTrait>(
    conn: &C,
    card_id: CardId,
) -> Result<Vec<SpendingLimit>, LedgerError> {
    spending_limits::Entity::find()
        .filter(spending_limits::Column::CardId.eq(card_id.into_inner()))
        .order_by_asc(spending_limits::Column::PeriodStartDate)
        .order_by_asc(spending_limits::Column::Id)
        .all(conn)
        .await
        .map_err(map_db_err)?
        .into_iter()
        .map(limit_from_model)
        .collect()
}

/// Builds the entry predicate from the present filter fields only.
fn entry_condition(filter: &EntryFilter) -> Condition {
    let mut condition = Condition::all();
    if let Some(card_id) = filter.card_id {
        condition = condition.add(ledger_entries::Column::CardId.eq(card_id.into_inner()));
    }
    if let Some(entry_type) = filter.entry_type {
        condition = condition.add(ledger_entries::Column::EntryType.eq(entry_type.as_str()));
    }
    if let Some(min_amount) = filter.min_amount {
        condition = condition.add(ledger_entries::Column::Amount.gte(min_amount));
    }
    if let Some(needle) = filter.description_contains.as_deref() {
        condition = condition.add(ledger_entries::Column::Description.contains(needle));
    }
    if let Some(from) = filter.occurred_from {
        condition = condition.add(ledger_entries::Column::OccurredAt.gte(from));
    }
    if let Some(to) = filter.occurred_to {
        condition = condition.add(ledger_entries::Column::OccurredAt.lte(to));
    }
    condition
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("corrupt {what}: {detail}"))
}

fn card_from_model(model: cards::Model) -> Result<Card, LedgerError> {
    Ok(Card {
        id: CardId::from_uuid(model.id),
        owner_id: UserId::from_uuid(model.owner_id),
        balance: model.balance,
        status: model.status.parse().map_err(|e| corrupt("card status", e))?,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn limit_from_model(model: spending_limits::Model) -> Result<SpendingLimit, LedgerError> {
    Ok(SpendingLimit {
        id: SpendingLimitId::from_uuid(model.id),
        card_id: CardId::from_uuid(model.card_id),
        period_type: model
            .period_type
            .parse()
            .map_err(|e| corrupt("period type", e))?,
        limit_amount: model.limit_amount,
        period_start_date: model.period_start_date,
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn entry_from_model(model: ledger_entries::Model) -> Result<LedgerEntry, LedgerError> {
    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(model.id),
        card_id: CardId::from_uuid(model.card_id),
        amount: model.amount,
        entry_type: model
            .entry_type
            .parse()
            .map_err(|e| corrupt("entry type", e))?,
        description: model.description,
        occurred_at: model.occurred_at.with_timezone(&Utc),
    })
}
