//! Collaborator contracts: the persistence operations the engine requires
//! and the scoped per-request state store used for anti-replay tokens.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::transaction::{NewTransaction, SettlementOutcome, TransactionRecord};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StorageError::NotFound(err.to_string()),
            _ => StorageError::Backend(err.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Exclusive hold on one record during settlement.
///
/// The lock is acquired when the guard is created and released when the
/// guard commits or is dropped. Dropping without committing leaves the
/// record untouched, so a losing concurrent caller observes the winner's
/// terminal status, never a half-applied one.
#[async_trait]
pub trait SettlementGuard: Send {
    fn record(&self) -> &TransactionRecord;

    /// Transitions the record to succeeded with the settlement fields and a
    /// log entry, then releases the lock.
    async fn commit_succeeded(
        self: Box<Self>,
        outcome: SettlementOutcome,
    ) -> StorageResult<TransactionRecord>;

    /// Transitions the record to failed, appending the code/message to the
    /// log, then releases the lock.
    async fn commit_failed(
        self: Box<Self>,
        code: &str,
        message: &str,
    ) -> StorageResult<TransactionRecord>;
}

/// Read/write operations required of the transaction store.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists a new record in its initial status and assigns its id.
    async fn create(&self, draft: NewTransaction) -> StorageResult<TransactionRecord>;

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<TransactionRecord>>;

    async fn find_by_order_id(&self, order_id: &str) -> StorageResult<Option<TransactionRecord>>;

    /// Audit paging over all records, newest first.
    async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<TransactionRecord>>;

    /// Stores the provider-assigned authorization handles.
    async fn update_authorized(
        &self,
        id: i64,
        reference_id: Option<&str>,
        token: Option<&str>,
    ) -> StorageResult<()>;

    /// Marks a record failed outside of a settlement lock (authorization
    /// phase failures), appending the code/message to its log.
    async fn mark_failed(&self, id: i64, code: &str, message: &str) -> StorageResult<()>;

    /// Loads a record under a record-level exclusive lock. The returned
    /// guard is the only way to transition the record to a terminal status.
    async fn begin_settlement(&self, id: i64) -> StorageResult<Box<dyn SettlementGuard>>;

    /// Duplicate-spend detection by gateway trace number.
    async fn trace_number_exists(&self, trace_number: &str) -> StorageResult<bool>;
}

/// Scoped per-request key/value store.
///
/// Backings vary (server-side session, signed cookie, in-memory test store);
/// the engine only requires that `pull` is an atomic read-and-clear, making
/// stored anti-replay tokens single-use.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: &str);

    async fn get(&self, key: &str) -> Option<String>;

    /// Atomically reads and removes a value.
    async fn pull(&self, key: &str) -> Option<String>;
}
