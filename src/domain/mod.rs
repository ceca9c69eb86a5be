pub mod amount;
pub mod field_match;
pub mod redirect;
pub mod transaction;

pub use amount::{Amount, AmountError, CURRENCY_RIAL, CURRENCY_TOMAN};
pub use field_match::FieldMatch;
pub use redirect::{CallbackRequest, HttpMethod, RedirectDescriptor};
pub use transaction::{
    LogEntry, NewTransaction, SettlementOutcome, TransactionRecord, TransactionStatus,
};
