//! In-memory ledger store.
//!
//! Each card has its own `tokio::sync::Mutex` in a `DashMap` registry; a unit
//! of work keeps the owned guards of every card it locked until it commits or
//! is dropped. Writes are staged inside the unit of work and applied to the
//! committed tables under a single write lock, so readers never observe half a
//! transfer.
//!
//! The registry only holds existing cards: a missing card is never entered,
//! and a deleted card's mutex is evicted once no unit of work holds it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use cardledger_core::card::{Card, CardFilter};
use cardledger_core::ledger::{
    EntryFilter, EntryType, LedgerEntry, LedgerError, LedgerStore, TransactionLedger, UnitOfWork,
    window_sum,
};
use cardledger_core::limits::SpendingLimit;
use cardledger_shared::types::{
    CardId, LedgerEntryId, PageRequest, PageResponse, SpendingLimitId,
};
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Tables {
    cards: BTreeMap<CardId, Card>,
    limits: BTreeMap<SpendingLimitId, SpendingLimit>,
    entries: BTreeMap<LedgerEntryId, LedgerEntry>,
}

type LockRegistry = DashMap<CardId, Arc<Mutex<()>>>;

/// Ledger store keeping every table in process memory.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<LockRegistry>,
    lock_timeout: Option<Duration>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store whose units of work wait for card locks indefinitely.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes units of work fail with `Conflict` after waiting `timeout` for a card lock.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, LedgerError> {
        read_tables(&self.tables)
    }
}

fn read_tables(tables: &RwLock<Tables>) -> Result<RwLockReadGuard<'_, Tables>, LedgerError> {
    tables
        .read()
        .map_err(|_| LedgerError::Storage("ledger tables poisoned".to_string()))
}

fn write_tables(tables: &RwLock<Tables>) -> Result<RwLockWriteGuard<'_, Tables>, LedgerError> {
    tables
        .write()
        .map_err(|_| LedgerError::Storage("ledger tables poisoned".to_string()))
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        Ok(Box::new(MemoryUnitOfWork {
            tables: Arc::clone(&self.tables),
            locks: Arc::clone(&self.locks),
            lock_timeout: self.lock_timeout,
            guards: BTreeMap::new(),
            staged: Staged::default(),
        }))
    }

    async fn card(&self, card_id: CardId) -> Result<Option<Card>, LedgerError> {
        Ok(self.read()?.cards.get(&card_id).cloned())
    }

    async fn cards(&self, filter: &CardFilter) -> Result<Vec<Card>, LedgerError> {
        Ok(self
            .read()?
            .cards
            .values()
            .filter(|card| filter.matches(card))
            .cloned()
            .collect())
    }

    async fn limit(&self, limit_id: SpendingLimitId) -> Result<Option<SpendingLimit>, LedgerError> {
        Ok(self.read()?.limits.get(&limit_id).cloned())
    }

    async fn limits(&self, card_id: CardId) -> Result<Vec<SpendingLimit>, LedgerError> {
        let mut limits: Vec<SpendingLimit> = self
            .read()?
            .limits
            .values()
            .filter(|limit| limit.card_id == card_id)
            .cloned()
            .collect();
        limits.sort_by_key(|limit| (limit.period_start_date, limit.id));
        Ok(limits)
    }

    async fn entry(&self, entry_id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.read()?.entries.get(&entry_id).cloned())
    }

    async fn entries(
        &self,
        filter: &EntryFilter,
        page: PageRequest,
    ) -> Result<PageResponse<LedgerEntry>, LedgerError> {
        let mut matching: Vec<LedgerEntry> = self
            .read()?
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        matching.sort_by_key(|entry| (entry.occurred_at, entry.id));

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let data = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(PageResponse::new(data, page, total))
    }

    async fn period_sum(
        &self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        Ok(window_sum(
            self.read()?.entries.values(),
            card_id,
            exclude,
            start,
            end,
        ))
    }
}

/// Writes staged by a unit of work. `None` marks a removal.
#[derive(Debug, Default)]
struct Staged {
    cards: HashMap<CardId, Option<Card>>,
    limits: HashMap<SpendingLimitId, Option<SpendingLimit>>,
    entries: HashMap<LedgerEntryId, Option<LedgerEntry>>,
}

struct MemoryUnitOfWork {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<LockRegistry>,
    lock_timeout: Option<Duration>,
    guards: BTreeMap<CardId, OwnedMutexGuard<()>>,
    staged: Staged,
}

impl MemoryUnitOfWork {
    fn card_view(&self, card_id: CardId) -> Result<Option<Card>, LedgerError> {
        if let Some(staged) = self.staged.cards.get(&card_id) {
            return Ok(staged.clone());
        }
        Ok(read_tables(&self.tables)?.cards.get(&card_id).cloned())
    }

    fn limit_view(&self, limit_id: SpendingLimitId) -> Result<Option<SpendingLimit>, LedgerError> {
        if let Some(staged) = self.staged.limits.get(&limit_id) {
            return Ok(staged.clone());
        }
        Ok(read_tables(&self.tables)?.limits.get(&limit_id).cloned())
    }

    fn entry_view(&self, entry_id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        if let Some(staged) = self.staged.entries.get(&entry_id) {
            return Ok(staged.clone());
        }
        Ok(read_tables(&self.tables)?.entries.get(&entry_id).cloned())
    }

    /// Entries of a card as seen by this unit of work.
    fn card_entries(&self, card_id: CardId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let tables = read_tables(&self.tables)?;
        let committed = tables
            .entries
            .values()
            .filter(|entry| entry.card_id == card_id)
            .filter(|entry| !self.staged.entries.contains_key(&entry.id));
        let staged = self
            .staged
            .entries
            .values()
            .flatten()
            .filter(|entry| entry.card_id == card_id);
        Ok(committed.chain(staged).cloned().collect())
    }

    /// Limits of a card as seen by this unit of work.
    fn card_limits(&self, card_id: CardId) -> Result<Vec<SpendingLimit>, LedgerError> {
        let tables = read_tables(&self.tables)?;
        let committed = tables
            .limits
            .values()
            .filter(|limit| limit.card_id == card_id)
            .filter(|limit| !self.staged.limits.contains_key(&limit.id));
        let staged = self
            .staged
            .limits
            .values()
            .flatten()
            .filter(|limit| limit.card_id == card_id);
        let mut limits: Vec<SpendingLimit> = committed.chain(staged).cloned().collect();
        limits.sort_by_key(|limit| (limit.period_start_date, limit.id));
        Ok(limits)
    }

    fn ensure_locked(&self, card_id: CardId) -> Result<(), LedgerError> {
        if self.guards.contains_key(&card_id) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!(
                "card {card_id} must be locked before it is written"
            )))
        }
    }

    /// Releases every card guard and evicts registry entries of cards that no
    /// longer exist.
    fn release(&mut self) {
        let locked: Vec<CardId> = std::mem::take(&mut self.guards).into_keys().collect();
        if locked.is_empty() {
            return;
        }
        let Ok(tables) = read_tables(&self.tables) else {
            return;
        };
        let gone: Vec<CardId> = locked
            .into_iter()
            .filter(|card_id| !tables.cards.contains_key(card_id))
            .collect();
        drop(tables);

        for card_id in gone {
            // A waiter holds its own clone, so a contended mutex stays put.
            if self
                .locks
                .remove_if(&card_id, |_, mutex| Arc::strong_count(mutex) == 1)
                .is_some()
            {
                debug!(%card_id, "card lock evicted");
            }
        }
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl TransactionLedger for MemoryUnitOfWork {
    async fn period_sum(
        &mut self,
        card_id: CardId,
        exclude: EntryType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        let entries = self.card_entries(card_id)?;
        Ok(window_sum(&entries, card_id, exclude, start, end))
    }

    async fn append(&mut self, entry: LedgerEntry) -> Result<LedgerEntryId, LedgerError> {
        self.ensure_locked(entry.card_id)?;
        if self.entry_view(entry.id)?.is_some() {
            return Err(LedgerError::Conflict(format!("entry {} already exists", entry.id)));
        }
        let id = entry.id;
        self.staged.entries.insert(id, Some(entry));
        Ok(id)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_card(&mut self, card_id: CardId) -> Result<Option<Card>, LedgerError> {
        if !self.guards.contains_key(&card_id) {
            if self.card_view(card_id)?.is_none() {
                return Ok(None);
            }
            let mutex = Arc::clone(self.locks.entry(card_id).or_default().value());
            let guard = match self.lock_timeout {
                Some(timeout) => tokio::time::timeout(timeout, mutex.lock_owned())
                    .await
                    .map_err(|_| {
                        warn!(%card_id, ?timeout, "timed out waiting for card lock");
                        LedgerError::Conflict(format!("timed out waiting for card {card_id}"))
                    })?,
                None => mutex.lock_owned().await,
            };
            debug!(%card_id, "card locked");
            self.guards.insert(card_id, guard);
        }
        self.card_view(card_id)
    }

    async fn insert_card(&mut self, card: &Card) -> Result<(), LedgerError> {
        if self.card_view(card.id)?.is_some() {
            return Err(LedgerError::Conflict(format!("card {} already exists", card.id)));
        }
        self.staged.cards.insert(card.id, Some(card.clone()));
        Ok(())
    }

    async fn save_card(&mut self, card: &Card) -> Result<(), LedgerError> {
        self.ensure_locked(card.id)?;
        if self.card_view(card.id)?.is_none() {
            return Err(LedgerError::CardNotFound(card.id));
        }
        self.staged.cards.insert(card.id, Some(card.clone()));
        Ok(())
    }

    async fn remove_card(&mut self, card_id: CardId) -> Result<(), LedgerError> {
        self.ensure_locked(card_id)?;
        for entry in self.card_entries(card_id)? {
            self.staged.entries.insert(entry.id, None);
        }
        for limit in self.card_limits(card_id)? {
            self.staged.limits.insert(limit.id, None);
        }
        self.staged.cards.insert(card_id, None);
        Ok(())
    }

    async fn limits_for_card(
        &mut self,
        card_id: CardId,
    ) -> Result<Vec<SpendingLimit>, LedgerError> {
        self.card_limits(card_id)
    }

    async fn find_limit(
        &mut self,
        limit_id: SpendingLimitId,
    ) -> Result<Option<SpendingLimit>, LedgerError> {
        self.limit_view(limit_id)
    }

    async fn save_limit(&mut self, limit: &SpendingLimit) -> Result<(), LedgerError> {
        self.ensure_locked(limit.card_id)?;
        self.staged.limits.insert(limit.id, Some(limit.clone()));
        Ok(())
    }

    async fn remove_limit(&mut self, limit_id: SpendingLimitId) -> Result<(), LedgerError> {
        let limit = self
            .limit_view(limit_id)?
            .ok_or(LedgerError::LimitNotFound(limit_id))?;
        self.ensure_locked(limit.card_id)?;
        self.staged.limits.insert(limit_id, None);
        Ok(())
    }

    async fn find_entry(
        &mut self,
        entry_id: LedgerEntryId,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.entry_view(entry_id)
    }

    async fn set_entry_description(
        &mut self,
        entry_id: LedgerEntryId,
        description: &str,
    ) -> Result<(), LedgerError> {
        let mut entry = self
            .entry_view(entry_id)?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        self.ensure_locked(entry.card_id)?;
        entry.description = description.to_string();
        self.staged.entries.insert(entry_id, Some(entry));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let mut this = *self;
        let staged = std::mem::take(&mut this.staged);
        {
            let mut tables = write_tables(&this.tables)?;
            for (id, card) in staged.cards {
                match card {
                    Some(card) => tables.cards.insert(id, card),
                    None => tables.cards.remove(&id),
                };
            }
            for (id, limit) in staged.limits {
                match limit {
                    Some(limit) => tables.limits.insert(id, limit),
                    None => tables.limits.remove(&id),
                };
            }
            for (id, entry) in staged.entries {
                match entry {
                    Some(entry) => tables.entries.insert(id, entry),
                    None => tables.entries.remove(&id),
                };
            }
        }
        // Card guards are released only after the new state is visible.
        drop(this);
        Ok(())
    }
}
