//! Transaction domain entity.
//!
//! One record per payment attempt, carrying the provider-assigned handles
//! and an append-only event log. Records are soft-retained for audit and are
//! never deleted; once a record reaches a terminal status no further
//! authorize/settle transition is permitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::amount::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Init,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Succeeded | TransactionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Init => "init",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "init" => Some(TransactionStatus::Init),
            "succeeded" => Some(TransactionStatus::Succeeded),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// One entry of the append-only transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub code: String,
    pub message: String,
    pub logged_at: DateTime<Utc>,
}

/// Input for creating a record; the repository assigns the id.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub provider: String,
    pub amount: Amount,
    pub order_id: String,
    pub client_ip: Option<String>,
    pub extra: Map<String, Value>,
}

/// Persisted entity representing one payment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub provider: String,
    pub amount: Amount,
    pub order_id: String,
    pub token: Option<String>,
    pub reference_id: Option<String>,
    pub trace_number: Option<String>,
    pub rrn: Option<String>,
    pub card_number: Option<String>,
    pub status: TransactionStatus,
    pub extra: Map<String, Value>,
    pub log: Vec<LogEntry>,
    pub client_ip: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(id: i64, draft: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id,
            provider: draft.provider,
            amount: draft.amount,
            order_id: draft.order_id,
            token: None,
            reference_id: None,
            trace_number: None,
            rrn: None,
            card_number: None,
            status: TransactionStatus::Init,
            extra: draft.extra,
            log: Vec::new(),
            client_ip: draft.client_ip,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn currency(&self) -> &str {
        self.amount.currency()
    }

    pub fn append_log(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.log.push(LogEntry {
            code: code.into(),
            message: message.into(),
            logged_at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    pub fn set_authorized(&mut self, reference_id: Option<String>, token: Option<String>) {
        self.reference_id = reference_id;
        self.token = token;
        self.updated_at = Utc::now();
    }

    pub fn mark_succeeded(&mut self, outcome: SettlementOutcome) {
        self.status = TransactionStatus::Succeeded;
        if outcome.trace_number.is_some() {
            self.trace_number = outcome.trace_number;
        }
        if outcome.rrn.is_some() {
            self.rrn = outcome.rrn;
        }
        if outcome.card_number.is_some() {
            self.card_number = outcome.card_number;
        }
        for (key, value) in outcome.extra {
            self.extra.insert(key, value);
        }
        self.paid_at = Some(Utc::now());
        self.append_log(outcome.log_code, outcome.log_message);
    }

    pub fn mark_failed(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.status = TransactionStatus::Failed;
        self.append_log(code, message);
    }
}

/// Settlement fields written when a record transitions to succeeded.
#[derive(Debug, Clone, Default)]
pub struct SettlementOutcome {
    pub trace_number: Option<String>,
    pub rrn: Option<String>,
    pub card_number: Option<String>,
    pub extra: Map<String, Value>,
    pub log_code: String,
    pub log_message: String,
}
