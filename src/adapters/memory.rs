//! In-memory implementations of the persistence and state-store ports.
//!
//! Used by the test suite and by embedders that do not need durable
//! storage. Record-level exclusivity is a per-record `tokio::sync::Mutex`
//! whose owned guard lives inside the `SettlementGuard`, so the lock spans
//! the whole load-verify-commit sequence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::transaction::{NewTransaction, SettlementOutcome, TransactionRecord};
use crate::ports::{SettlementGuard, StateStore, StorageError, StorageResult, TransactionRepository};

#[derive(Default)]
struct Inner {
    next_id: AtomicI64,
    records: RwLock<HashMap<i64, Arc<Mutex<TransactionRecord>>>>,
    traces: RwLock<HashSet<String>>,
}

#[derive(Clone, Default)]
pub struct MemoryTransactionRepository {
    inner: Arc<Inner>,
}

impl MemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, id: i64) -> StorageResult<Arc<Mutex<TransactionRecord>>> {
        self.inner
            .records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl TransactionRepository for MemoryTransactionRepository {
    async fn create(&self, draft: NewTransaction) -> StorageResult<TransactionRecord> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = TransactionRecord::new(id, draft);
        self.inner
            .records
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<TransactionRecord>> {
        match self.inner.records.read().await.get(&id) {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_by_order_id(&self, order_id: &str) -> StorageResult<Option<TransactionRecord>> {
        let slots: Vec<_> = self.inner.records.read().await.values().cloned().collect();
        for slot in slots {
            let record = slot.lock().await;
            if record.order_id == order_id {
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }

    async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<TransactionRecord>> {
        let slots: Vec<_> = self.inner.records.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            records.push(slot.lock().await.clone());
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_authorized(
        &self,
        id: i64,
        reference_id: Option<&str>,
        token: Option<&str>,
    ) -> StorageResult<()> {
        let slot = self.slot(id).await?;
        let mut record = slot.lock().await;
        record.set_authorized(
            reference_id.map(str::to_string),
            token.map(str::to_string),
        );
        Ok(())
    }

    async fn mark_failed(&self, id: i64, code: &str, message: &str) -> StorageResult<()> {
        let slot = self.slot(id).await?;
        let mut record = slot.lock().await;
        record.mark_failed(code, message);
        Ok(())
    }

    async fn begin_settlement(&self, id: i64) -> StorageResult<Box<dyn SettlementGuard>> {
        let slot = self.slot(id).await?;
        let guard = slot.lock_owned().await;
        Ok(Box::new(MemorySettlementGuard {
            inner: Arc::clone(&self.inner),
            guard,
        }))
    }

    async fn trace_number_exists(&self, trace_number: &str) -> StorageResult<bool> {
        Ok(self.inner.traces.read().await.contains(trace_number))
    }
}

struct MemorySettlementGuard {
    inner: Arc<Inner>,
    guard: OwnedMutexGuard<TransactionRecord>,
}

#[async_trait]
impl SettlementGuard for MemorySettlementGuard {
    fn record(&self) -> &TransactionRecord {
        &self.guard
    }

    async fn commit_succeeded(
        self: Box<Self>,
        outcome: SettlementOutcome,
    ) -> StorageResult<TransactionRecord> {
        let mut this = *self;
        let trace = outcome.trace_number.clone();
        this.guard.mark_succeeded(outcome);
        if let Some(trace) = trace {
            this.inner.traces.write().await.insert(trace);
        }
        Ok(this.guard.clone())
    }

    async fn commit_failed(
        self: Box<Self>,
        code: &str,
        message: &str,
    ) -> StorageResult<TransactionRecord> {
        let mut this = *self;
        this.guard.mark_failed(code, message);
        Ok(this.guard.clone())
    }
}

/// In-memory scoped state store with atomic read-and-clear.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn pull(&self, key: &str) -> Option<String> {
        self.entries.lock().await.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::{Amount, CURRENCY_TOMAN};
    use bigdecimal::BigDecimal;
    use serde_json::Map;

    fn draft(order_id: &str) -> NewTransaction {
        NewTransaction {
            provider: "sandbox".into(),
            amount: Amount::new(BigDecimal::from(500), CURRENCY_TOMAN).unwrap(),
            order_id: order_id.into(),
            client_ip: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn create_assigns_monotonic_ids() {
        let repo = MemoryTransactionRepository::new();
        let first = repo.create(draft("a")).await.unwrap();
        let second = repo.create(draft("b")).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(
            repo.find_by_order_id("b").await.unwrap().unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn settlement_guard_blocks_second_caller_until_commit() {
        let repo = MemoryTransactionRepository::new();
        let record = repo.create(draft("a")).await.unwrap();

        let guard = repo.begin_settlement(record.id).await.unwrap();

        let contender = {
            let repo = repo.clone();
            let id = record.id;
            tokio::spawn(async move { repo.begin_settlement(id).await.unwrap() })
        };
        // the contender cannot acquire the lock while the guard is held
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        let settled = guard
            .commit_succeeded(SettlementOutcome {
                trace_number: Some("T-1".into()),
                log_code: "0".into(),
                log_message: "ok".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(settled.status.is_terminal());

        let late = contender.await.unwrap();
        assert!(late.record().status.is_terminal());
        assert!(repo.trace_number_exists("T-1").await.unwrap());
    }

    #[tokio::test]
    async fn dropping_a_guard_leaves_the_record_untouched() {
        let repo = MemoryTransactionRepository::new();
        let record = repo.create(draft("a")).await.unwrap();
        {
            let guard = repo.begin_settlement(record.id).await.unwrap();
            assert_eq!(guard.record().order_id, "a");
        }
        let reloaded = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert!(!reloaded.status.is_terminal());
        assert!(reloaded.log.is_empty());
    }

    #[tokio::test]
    async fn state_store_pull_is_read_and_clear() {
        let store = MemoryStateStore::new();
        store.put("k", "v").await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert_eq!(store.pull("k").await.as_deref(), Some("v"));
        assert_eq!(store.pull("k").await, None);
    }
}
