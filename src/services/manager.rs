//! Orchestration of callback settlement.
//!
//! Drives an unauthenticated HTTP-style callback to a settled result:
//! correlation-id resolution, single-use anti-replay check, record load
//! under an exclusive lock, idempotency guard, then dispatch to the
//! provider's settlement workflow. A gateway error is terminal for the
//! attempt; the only retries in the engine live inside the resilient
//! invoker.

use std::sync::Arc;

use crate::config::Config;
use crate::domain::redirect::{CallbackRequest, PARAM_STATE, PARAM_TRANSACTION_ID};
use crate::domain::transaction::TransactionRecord;
use crate::error::PaymentError;
use crate::ports::{StateStore, StorageError, TransactionRepository};
use crate::providers::workflow::{
    AuthorizedPayment, PaymentRequest, ProviderWorkflow, STATE_KEY_TOKEN, STATE_KEY_TRANSACTION,
};
use crate::providers::ProviderRegistry;

pub struct PaymentManager {
    repository: Arc<dyn TransactionRepository>,
    registry: ProviderRegistry,
    config: Arc<Config>,
}

impl PaymentManager {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        registry: ProviderRegistry,
        config: Config,
    ) -> Self {
        Self {
            repository,
            registry,
            config: Arc::new(config),
        }
    }

    pub fn repository(&self) -> &Arc<dyn TransactionRepository> {
        &self.repository
    }

    fn workflow(&self, code: &str) -> Result<ProviderWorkflow, PaymentError> {
        let driver = self.registry.resolve(code)?;
        let provider = self
            .config
            .providers
            .get(code)
            .cloned()
            .ok_or_else(|| PaymentError::Config(format!("no configuration for provider: {code}")))?;
        Ok(ProviderWorkflow::new(
            Arc::clone(&self.repository),
            driver,
            provider,
        ))
    }

    /// Registers intent to pay with the named provider and returns the
    /// redirect descriptor for sending the payer to the gateway.
    pub async fn authorize(
        &self,
        provider: &str,
        state: &dyn StateStore,
        request: PaymentRequest,
    ) -> Result<AuthorizedPayment, PaymentError> {
        self.workflow(provider)?.authorize(state, request).await
    }

    /// Settles a previously authorized transaction from its gateway
    /// callback.
    pub async fn settle(
        &self,
        state: &dyn StateStore,
        callback: &CallbackRequest,
    ) -> Result<TransactionRecord, PaymentError> {
        // Correlation id comes from the restored per-request state when one
        // exists, otherwise from caller input (stateless adapters). Both the
        // stored id and the expected token are read-and-cleared up front:
        // the anti-replay check is single-use whether or not it passes.
        let restored = state.pull(STATE_KEY_TRANSACTION).await;
        let expected_token = state.pull(STATE_KEY_TOKEN).await;

        let via_state = restored.is_some();
        let correlation = match restored {
            Some(value) => value,
            None => callback
                .param(PARAM_TRANSACTION_ID)
                .map(str::to_string)
                .ok_or_else(|| PaymentError::InvalidRequest("missing correlation id".into()))?,
        };
        let id: i64 = correlation.parse().map_err(|_| {
            PaymentError::InvalidRequest(format!("malformed correlation id: {correlation}"))
        })?;

        if via_state {
            let expected = expected_token
                .filter(|token| !token.is_empty())
                .ok_or_else(|| PaymentError::InvalidState("anti-replay token missing".into()))?;
            let supplied = callback.param(PARAM_STATE).unwrap_or_default();
            if supplied != expected {
                tracing::warn!(transaction_id = id, "anti-replay token mismatch");
                return Err(PaymentError::InvalidState(
                    "anti-replay token mismatch".into(),
                ));
            }
        }

        let guard = match self.repository.begin_settlement(id).await {
            Ok(guard) => guard,
            Err(StorageError::NotFound(_)) => return Err(PaymentError::NotFound(correlation)),
            Err(err) => return Err(err.into()),
        };

        // A settled transaction can never be re-settled; the lock guarantees
        // at most one caller sees the non-terminal status.
        if guard.record().status.is_terminal() {
            tracing::warn!(transaction_id = id, "settlement replay rejected");
            return Err(PaymentError::Retry(correlation));
        }

        let provider_code = guard.record().provider.clone();
        let workflow = self.workflow(&provider_code)?;
        if !workflow.stateless() && !via_state {
            return Err(PaymentError::InvalidState(
                "anti-replay token missing".into(),
            ));
        }

        workflow.settle(state, guard, callback).await
    }
}
