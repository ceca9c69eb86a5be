//! Shared authorize/settle workflow.
//!
//! Implements the parts of the adapter lifecycle that are identical across
//! gateways: record creation, callback-URL construction, anti-replay token
//! issuance, persisting authorization handles, applying the field-match
//! verification, and committing terminal statuses with a log entry. The
//! gateway-specific calls are delegated to the injected [`GatewayDriver`].

use std::sync::Arc;

use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::domain::amount::Amount;
use crate::domain::redirect::{CallbackRequest, RedirectDescriptor, PARAM_STATE, PARAM_TRANSACTION_ID};
use crate::domain::transaction::{NewTransaction, SettlementOutcome, TransactionRecord};
use crate::error::PaymentError;
use crate::ports::{SettlementGuard, StateStore, TransactionRepository};

use super::{AuthorizeContext, GatewayDriver, SettleContext};

/// State-store key holding the correlation id between redirect and callback.
pub const STATE_KEY_TRANSACTION: &str = "paygate.transaction_id";
/// State-store key holding the single-use anti-replay token.
pub const STATE_KEY_TOKEN: &str = "paygate.state";
/// State-store key holding adapter-declared custom callback parameters.
pub const STATE_KEY_PARAMS: &str = "paygate.params";

/// Log code recorded on a successful settlement.
pub const CODE_SETTLED: &str = "succeeded";
/// Failure code recorded when the gateway response contradicts the record.
pub const CODE_FIELD_MISMATCH: &str = "field_mismatch";
/// Failure code recorded by the advisory duplicate trace-number check.
pub const CODE_DUPLICATE_TRACE: &str = "duplicate_trace";
const CODE_TRANSPORT: &str = "transport";

/// Caller's request to authorize a payment.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub order_id: Option<String>,
    pub client_ip: Option<String>,
    pub extra: Map<String, Value>,
}

impl PaymentRequest {
    pub fn new(amount: Amount) -> Self {
        Self {
            amount,
            order_id: None,
            client_ip: None,
            extra: Map::new(),
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

/// Authorization result: the created record plus how to send the payer to
/// the gateway.
#[derive(Debug, Clone)]
pub struct AuthorizedPayment {
    pub record: TransactionRecord,
    pub redirect: RedirectDescriptor,
}

pub struct ProviderWorkflow {
    repository: Arc<dyn TransactionRepository>,
    driver: Arc<dyn GatewayDriver>,
    provider: ProviderConfig,
}

impl ProviderWorkflow {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        driver: Arc<dyn GatewayDriver>,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            repository,
            driver,
            provider,
        }
    }

    pub fn stateless(&self) -> bool {
        self.driver.stateless()
    }

    /// Creates the record, runs the gateway authorization and returns the
    /// redirect descriptor. Any gateway failure marks the record failed with
    /// a log entry before propagating.
    pub async fn authorize(
        &self,
        state: &dyn StateStore,
        request: PaymentRequest,
    ) -> Result<AuthorizedPayment, PaymentError> {
        let order_id = request
            .order_id
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let mut record = self
            .repository
            .create(NewTransaction {
                provider: self.driver.name().to_string(),
                amount: request.amount,
                order_id,
                client_ip: request.client_ip,
                extra: request.extra,
            })
            .await?;
        tracing::info!(
            transaction_id = record.id,
            provider = %record.provider,
            "transaction created"
        );

        let callback_url = self.build_callback_url(state, &record).await?;
        let ctx = AuthorizeContext { callback_url };

        let authorization = match self.driver.authorize(&record, &ctx).await {
            Ok(authorization) => authorization,
            Err(err) => {
                let (code, message) = self.failure_parts(&err);
                tracing::error!(
                    transaction_id = record.id,
                    code = %code,
                    "gateway authorization failed"
                );
                self.repository
                    .mark_failed(record.id, &code, &message)
                    .await?;
                return Err(err);
            }
        };

        self.repository
            .update_authorized(
                record.id,
                authorization.reference_id.as_deref(),
                authorization.token.as_deref(),
            )
            .await?;
        record.set_authorized(authorization.reference_id, authorization.token);

        Ok(AuthorizedPayment {
            record,
            redirect: authorization.redirect,
        })
    }

    /// Runs the gateway verify/confirm call against a record held under the
    /// settlement lock and commits the terminal status.
    pub async fn settle(
        &self,
        state: &dyn StateStore,
        guard: Box<dyn SettlementGuard>,
        callback: &CallbackRequest,
    ) -> Result<TransactionRecord, PaymentError> {
        self.driver.validate_callback(callback)?;
        self.verify_custom_params(state, callback).await?;

        let record = guard.record().clone();
        let ctx = SettleContext { callback };

        let settlement = match self.driver.settle(&record, &ctx).await {
            Ok(settlement) => settlement,
            Err(err) => {
                let (code, message) = self.failure_parts(&err);
                tracing::error!(
                    transaction_id = record.id,
                    code = %code,
                    "gateway settlement failed"
                );
                guard.commit_failed(&code, &message).await?;
                return Err(err);
            }
        };

        if self.driver.checks_duplicate_trace() {
            if let Some(trace) = settlement.trace_number.as_deref() {
                if self.repository.trace_number_exists(trace).await? {
                    let message = self.driver.translate_code(CODE_DUPLICATE_TRACE);
                    guard.commit_failed(CODE_DUPLICATE_TRACE, &message).await?;
                    return Err(PaymentError::gateway(CODE_DUPLICATE_TRACE, message));
                }
            }
        }

        if !settlement.checks.matches(&record) {
            let message = "gateway response does not match the stored transaction";
            guard.commit_failed(CODE_FIELD_MISMATCH, message).await?;
            return Err(PaymentError::gateway(CODE_FIELD_MISMATCH, message));
        }

        let updated = guard
            .commit_succeeded(SettlementOutcome {
                trace_number: settlement.trace_number,
                rrn: settlement.rrn,
                card_number: settlement.card_number,
                extra: settlement.extra,
                log_code: CODE_SETTLED.to_string(),
                log_message: "transaction settled".to_string(),
            })
            .await?;
        tracing::info!(
            transaction_id = updated.id,
            provider = %updated.provider,
            "transaction settled"
        );
        Ok(updated)
    }

    /// Builds the redirect-back URL: correlation id, anti-replay token
    /// (unless the driver is stateless) and adapter-declared parameters.
    /// Whatever lands on the URL beyond the token is also kept in the scoped
    /// state store and must come back verbatim.
    async fn build_callback_url(
        &self,
        state: &dyn StateStore,
        record: &TransactionRecord,
    ) -> Result<String, PaymentError> {
        let base = self
            .driver
            .callback_url()
            .unwrap_or(self.provider.callback_url.as_str());
        let mut url = Url::parse(base)
            .map_err(|e| PaymentError::Config(format!("invalid callback url {base}: {e}")))?;

        let token = (!self.driver.stateless()).then(|| Uuid::new_v4().simple().to_string());
        let custom = self.driver.custom_callback_params(record);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(PARAM_TRANSACTION_ID, &record.id.to_string());
            if let Some(token) = &token {
                pairs.append_pair(PARAM_STATE, token);
            }
            for (key, value) in &custom {
                pairs.append_pair(key, value);
            }
        }

        if let Some(token) = &token {
            state
                .put(STATE_KEY_TRANSACTION, &record.id.to_string())
                .await;
            state.put(STATE_KEY_TOKEN, token).await;
            if !custom.is_empty() {
                let map: Map<String, Value> = custom
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect();
                state.put(STATE_KEY_PARAMS, &Value::Object(map).to_string()).await;
            }
        }

        Ok(url.to_string())
    }

    /// Stored custom parameters must come back untouched on the callback.
    async fn verify_custom_params(
        &self,
        state: &dyn StateStore,
        callback: &CallbackRequest,
    ) -> Result<(), PaymentError> {
        let Some(raw) = state.pull(STATE_KEY_PARAMS).await else {
            return Ok(());
        };
        let stored: Map<String, Value> = serde_json::from_str(&raw)
            .map_err(|e| PaymentError::InvalidState(format!("corrupt stored parameters: {e}")))?;
        for (key, value) in &stored {
            let expected = value.as_str().unwrap_or_default();
            if callback.param(key) != Some(expected) {
                return Err(PaymentError::InvalidState(format!(
                    "callback parameter altered: {key}"
                )));
            }
        }
        Ok(())
    }

    /// Code/message pair appended to the record log for a failure. Gateway
    /// codes with no explicit message fall back to the driver's code table.
    fn failure_parts(&self, err: &PaymentError) -> (String, String) {
        match err {
            PaymentError::Gateway { code, message } => {
                let message = if message.is_empty() {
                    self.driver.translate_code(code)
                } else {
                    message.clone()
                };
                (code.clone(), message)
            }
            PaymentError::Transport(message) => (CODE_TRANSPORT.to_string(), message.clone()),
            other => ("error".to_string(), other.to_string()),
        }
    }
}
