//! Provider-agnostic payment orchestration engine.
//!
//! Mediates payment transactions between a merchant application and
//! externally operated gateways: a uniform adapter contract, a transaction
//! state machine with an idempotency guard, declarative anti-tampering
//! field matching, a monetary value type with domestic currency-unit
//! conversion, and a bounded-retry wrapper for flaky remote calls.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod providers;
pub mod services;
pub mod validation;

pub use config::{Config, ProviderConfig};
pub use domain::amount::{Amount, AmountError, CURRENCY_RIAL, CURRENCY_TOMAN};
pub use domain::field_match::FieldMatch;
pub use domain::redirect::{
    CallbackRequest, HttpMethod, RedirectDescriptor, PARAM_STATE, PARAM_TRANSACTION_ID,
};
pub use domain::transaction::{
    LogEntry, NewTransaction, SettlementOutcome, TransactionRecord, TransactionStatus,
};
pub use error::PaymentError;
pub use ports::{SettlementGuard, StateStore, StorageError, TransactionRepository};
pub use providers::{
    AuthorizeContext, GatewayAuthorization, GatewayDriver, GatewaySettlement, ProviderRegistry,
    SandboxDriver, SettleContext,
};
pub use providers::workflow::{AuthorizedPayment, PaymentRequest, ProviderWorkflow};
pub use services::{PaymentManager, ResilientInvoker, TransientFault};
