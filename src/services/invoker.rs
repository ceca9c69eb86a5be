//! Bounded-retry wrapper for calls to flaky remote gateways.
//!
//! Only connection-level instability is retried; a well-formed error
//! response from the remote peer propagates immediately. The retry budget is
//! a fixed attempt count with an optional fixed pause between attempts.

use std::future::Future;
use std::time::Duration;

use crate::error::PaymentError;

/// Classifies an error as a connection-level fault worth retrying.
pub trait TransientFault {
    fn is_transient(&self) -> bool;
}

impl TransientFault for PaymentError {
    fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Transport(_))
    }
}

#[derive(Debug, Clone)]
pub struct ResilientInvoker {
    attempts: u32,
    backoff: Duration,
}

impl ResilientInvoker {
    /// `attempts` is clamped to at least one.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// Fixed pause between attempts. Defaults to none.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `call`, retrying transient faults until the budget is exhausted,
    /// then propagates the last fault.
    pub async fn invoke<T, E, F, Fut>(&self, mut call: F) -> Result<T, E>
    where
        E: TransientFault + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut remaining = self.attempts;
        loop {
            remaining -= 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && remaining > 0 => {
                    tracing::warn!(remaining, error = %err, "transient gateway fault, retrying");
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transport() -> PaymentError {
        PaymentError::Transport("connection reset".into())
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_within_budget() {
        let calls = AtomicU32::new(0);
        let invoker = ResilientInvoker::new(3);
        let result: Result<u32, PaymentError> = invoker
            .invoke(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(transport())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_propagates_first_fault() {
        let calls = AtomicU32::new(0);
        let invoker = ResilientInvoker::new(1);
        let result: Result<(), PaymentError> = invoker
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transport()) }
            })
            .await;
        assert!(matches!(result, Err(PaymentError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_propagates_last_fault() {
        let calls = AtomicU32::new(0);
        let invoker = ResilientInvoker::new(3);
        let result: Result<(), PaymentError> = invoker
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transport()) }
            })
            .await;
        assert!(matches!(result, Err(PaymentError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gateway_rejections_are_not_retried() {
        let calls = AtomicU32::new(0);
        let invoker = ResilientInvoker::new(5);
        let result: Result<(), PaymentError> = invoker
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PaymentError::gateway("-2", "amount out of range")) }
            })
            .await;
        assert!(matches!(result, Err(PaymentError::Gateway { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(ResilientInvoker::new(0).attempts(), 1);
    }
}
