use thiserror::Error;

use crate::domain::amount::AmountError;
use crate::ports::StorageError;

/// Failure taxonomy of the orchestration engine.
///
/// Callers can distinguish "the payer can try again" (`InvalidRequest`,
/// `InvalidState`) from "this attempt is terminally failed" (`Gateway`,
/// `Transport`) from "this was already handled" (`Retry`).
#[derive(Error, Debug)]
pub enum PaymentError {
    /// The inbound callback is structurally malformed. Raised before any
    /// gateway call and before any record mutation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The anti-replay state token is missing or does not match.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transaction not found: {0}")]
    NotFound(String),

    /// The record is already in a terminal status; a settled transaction can
    /// never be re-settled.
    #[error("transaction already settled: {0}")]
    Retry(String),

    /// The remote gateway reported a defined failure code. The record has
    /// been marked failed and the code/message appended to its log.
    #[error("gateway error {code}: {message}")]
    Gateway { code: String, message: String },

    /// Connection-level fault talking to the remote gateway, surfaced only
    /// after the retry budget is exhausted.
    #[error("gateway transport fault: {0}")]
    Transport(String),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("no provider registered for code: {0}")]
    ProviderNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PaymentError {
    pub fn gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Gateway {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_carries_code_and_message() {
        let err = PaymentError::gateway("-4", "already verified");
        assert_eq!(err.to_string(), "gateway error -4: already verified");
    }

    #[test]
    fn storage_not_found_converts() {
        let err: PaymentError = StorageError::NotFound("42".into()).into();
        assert!(matches!(
            err,
            PaymentError::Storage(StorageError::NotFound(_))
        ));
    }
}
