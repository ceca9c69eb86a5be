//! Postgres implementation of the transaction repository.
//!
//! Two tables, named with a configurable prefix: the transaction table and
//! an append-style log table keyed by transaction id. Settlement exclusivity
//! uses `SELECT ... FOR UPDATE` inside a database transaction held by the
//! guard until the terminal status is committed.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};

use crate::domain::amount::Amount;
use crate::domain::transaction::{
    LogEntry, NewTransaction, SettlementOutcome, TransactionRecord, TransactionStatus,
};
use crate::ports::{SettlementGuard, StorageError, StorageResult, TransactionRepository};

#[derive(Debug, Clone)]
struct TableNames {
    transactions: String,
    logs: String,
}

impl TableNames {
    fn new(prefix: &str) -> Self {
        Self {
            transactions: format!("{prefix}transactions"),
            logs: format!("{prefix}transaction_logs"),
        }
    }
}

#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool, table_prefix: &str) -> Self {
        Self {
            pool,
            tables: TableNames::new(table_prefix),
        }
    }

    fn select_sql(&self, predicate: &str) -> String {
        format!(
            "SELECT id, provider, amount, currency, order_id, token, reference_id, \
             trace_number, rrn, card_number, status, extra, client_ip, paid_at, \
             created_at, updated_at FROM {} {}",
            self.tables.transactions, predicate
        )
    }

    async fn load_log<'e, E>(&self, executor: E, id: i64) -> StorageResult<Vec<LogEntry>>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT code, message, logged_at FROM {} WHERE transaction_id = $1 ORDER BY id",
            self.tables.logs
        ))
        .bind(id)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(LogRow::into_domain).collect())
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, draft: NewTransaction) -> StorageResult<TransactionRecord> {
        let mut record = TransactionRecord::new(0, draft);
        let id: i64 = sqlx::query_scalar(&format!(
            r#"
            INSERT INTO {} (
                provider, amount, currency, order_id, status, extra,
                client_ip, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
            self.tables.transactions
        ))
        .bind(&record.provider)
        .bind(record.amount.total())
        .bind(record.amount.currency())
        .bind(&record.order_id)
        .bind(record.status.as_str())
        .bind(Value::Object(record.extra.clone()))
        .bind(&record.client_ip)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await?;

        record.id = id;
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&self.select_sql("WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let log = self.load_log(&self.pool, row.id).await?;
                Ok(Some(row.into_domain(log)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_order_id(&self, order_id: &str) -> StorageResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(&self.select_sql("WHERE order_id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let log = self.load_log(&self.pool, row.id).await?;
                Ok(Some(row.into_domain(log)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            &self.select_sql("ORDER BY created_at DESC LIMIT $1 OFFSET $2"),
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let log = self.load_log(&self.pool, row.id).await?;
            records.push(row.into_domain(log)?);
        }
        Ok(records)
    }

    async fn update_authorized(
        &self,
        id: i64,
        reference_id: Option<&str>,
        token: Option<&str>,
    ) -> StorageResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET reference_id = $2, token = $3, updated_at = $4 WHERE id = $1",
            self.tables.transactions
        ))
        .bind(id)
        .bind(reference_id)
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, code: &str, message: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(&format!(
            "UPDATE {} SET status = $2, updated_at = $3 WHERE id = $1",
            self.tables.transactions
        ))
        .bind(id)
        .bind(TransactionStatus::Failed.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }

        append_log(&mut tx, &self.tables, id, code, message, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn begin_settlement(&self, id: i64) -> StorageResult<Box<dyn SettlementGuard>> {
        let mut tx = self.pool.begin().await?;

        let row =
            sqlx::query_as::<_, TransactionRow>(&self.select_sql("WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(row) = row else {
            return Err(StorageError::NotFound(id.to_string()));
        };

        let log = self.load_log(&mut *tx, row.id).await?;
        let record = row.into_domain(log)?;

        Ok(Box::new(PgSettlementGuard {
            tx,
            record,
            tables: self.tables.clone(),
        }))
    }

    async fn trace_number_exists(&self, trace_number: &str) -> StorageResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE trace_number = $1)",
            self.tables.transactions
        ))
        .bind(trace_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

struct PgSettlementGuard {
    tx: PgTransaction<'static, Postgres>,
    record: TransactionRecord,
    tables: TableNames,
}

#[async_trait]
impl SettlementGuard for PgSettlementGuard {
    fn record(&self) -> &TransactionRecord {
        &self.record
    }

    async fn commit_succeeded(
        self: Box<Self>,
        outcome: SettlementOutcome,
    ) -> StorageResult<TransactionRecord> {
        let mut this = *self;
        this.record.mark_succeeded(outcome);

        sqlx::query(&format!(
            r#"
            UPDATE {} SET status = $2, trace_number = $3, rrn = $4, card_number = $5,
                extra = $6, paid_at = $7, updated_at = $8
            WHERE id = $1
            "#,
            this.tables.transactions
        ))
        .bind(this.record.id)
        .bind(this.record.status.as_str())
        .bind(&this.record.trace_number)
        .bind(&this.record.rrn)
        .bind(&this.record.card_number)
        .bind(Value::Object(this.record.extra.clone()))
        .bind(this.record.paid_at)
        .bind(this.record.updated_at)
        .execute(&mut *this.tx)
        .await?;

        if let Some(entry) = this.record.log.last() {
            append_log(
                &mut this.tx,
                &this.tables,
                this.record.id,
                &entry.code,
                &entry.message,
                entry.logged_at,
            )
            .await?;
        }

        this.tx.commit().await?;
        Ok(this.record)
    }

    async fn commit_failed(
        self: Box<Self>,
        code: &str,
        message: &str,
    ) -> StorageResult<TransactionRecord> {
        let mut this = *self;
        this.record.mark_failed(code, message);

        sqlx::query(&format!(
            "UPDATE {} SET status = $2, updated_at = $3 WHERE id = $1",
            this.tables.transactions
        ))
        .bind(this.record.id)
        .bind(this.record.status.as_str())
        .bind(this.record.updated_at)
        .execute(&mut *this.tx)
        .await?;

        append_log(
            &mut this.tx,
            &this.tables,
            this.record.id,
            code,
            message,
            this.record.updated_at,
        )
        .await?;

        this.tx.commit().await?;
        Ok(this.record)
    }
}

async fn append_log(
    tx: &mut PgTransaction<'static, Postgres>,
    tables: &TableNames,
    transaction_id: i64,
    code: &str,
    message: &str,
    logged_at: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {} (transaction_id, code, message, logged_at) VALUES ($1, $2, $3, $4)",
        tables.logs
    ))
    .bind(transaction_id)
    .bind(code)
    .bind(message)
    .bind(logged_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    provider: String,
    amount: BigDecimal,
    currency: String,
    order_id: String,
    token: Option<String>,
    reference_id: Option<String>,
    trace_number: Option<String>,
    rrn: Option<String>,
    card_number: Option<String>,
    status: String,
    extra: Value,
    client_ip: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self, log: Vec<LogEntry>) -> StorageResult<TransactionRecord> {
        let amount = Amount::new(self.amount, self.currency)
            .map_err(|e| StorageError::Backend(format!("corrupt amount column: {e}")))?;
        let status = TransactionStatus::parse(&self.status)
            .ok_or_else(|| StorageError::Backend(format!("unknown status: {}", self.status)))?;
        let extra = match self.extra {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(TransactionRecord {
            id: self.id,
            provider: self.provider,
            amount,
            order_id: self.order_id,
            token: self.token,
            reference_id: self.reference_id,
            trace_number: self.trace_number,
            rrn: self.rrn,
            card_number: self.card_number,
            status,
            extra,
            log,
            client_ip: self.client_ip,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    code: String,
    message: String,
    logged_at: DateTime<Utc>,
}

impl LogRow {
    fn into_domain(self) -> LogEntry {
        LogEntry {
            code: self.code,
            message: self.message,
            logged_at: self.logged_at,
        }
    }
}
