//! Reference gateway driver speaking a JSON-over-HTTP protocol.
//!
//! Serves as the executable example of the adapter contract: purchase call
//! during authorization, POST redirect into the gateway, verify call during
//! settlement, a vendor error-code table, and the advisory duplicate
//! trace-number check. Remote calls go through the [`ResilientInvoker`].

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ProviderConfig;
use crate::domain::amount::{Amount, CURRENCY_RIAL};
use crate::domain::field_match::FieldMatch;
use crate::domain::redirect::{CallbackRequest, RedirectDescriptor};
use crate::domain::transaction::TransactionRecord;
use crate::error::PaymentError;
use crate::services::invoker::ResilientInvoker;
use crate::validation::mask_pan;

use super::{AuthorizeContext, GatewayAuthorization, GatewayDriver, GatewaySettlement, SettleContext};

pub const PROVIDER_SANDBOX: &str = "sandbox";

const STATUS_OK: i32 = 0;
const CODE_INVALID_RESPONSE: &str = "invalid_response";

#[derive(Debug, Serialize)]
struct PurchaseRequest<'a> {
    merchant: &'a str,
    amount: String,
    order_id: &'a str,
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PurchaseResponse {
    status: i32,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    merchant: &'a str,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: i32,
    amount: Option<String>,
    trace_number: Option<String>,
    rrn: Option<String>,
    card_number: Option<String>,
}

pub struct SandboxDriver {
    client: Client,
    endpoint: String,
    merchant_id: String,
    invoker: ResilientInvoker,
}

impl SandboxDriver {
    pub fn new(config: &ProviderConfig, retry_attempts: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            merchant_id: config.merchant_id.clone(),
            invoker: ResilientInvoker::new(retry_attempts),
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, PaymentError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::Transport(format!(
                "gateway returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(self.rejection(status.as_str()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::gateway(CODE_INVALID_RESPONSE, e.to_string()))
    }

    fn rejection(&self, code: &str) -> PaymentError {
        PaymentError::gateway(code, self.translate_code(code))
    }

    fn parse_amount(&self, raw: &str) -> Result<Amount, PaymentError> {
        let total = BigDecimal::from_str(raw).map_err(|e| {
            PaymentError::gateway(CODE_INVALID_RESPONSE, format!("malformed amount {raw}: {e}"))
        })?;
        Ok(Amount::new(total, CURRENCY_RIAL)?)
    }
}

#[async_trait]
impl GatewayDriver for SandboxDriver {
    fn name(&self) -> &str {
        PROVIDER_SANDBOX
    }

    fn checks_duplicate_trace(&self) -> bool {
        true
    }

    fn translate_code(&self, code: &str) -> String {
        match code {
            "-1" => "unknown merchant".to_string(),
            "-2" => "amount out of range".to_string(),
            "-3" => "payment token expired".to_string(),
            "-4" => "transaction already verified".to_string(),
            "-5" => "payment canceled by payer".to_string(),
            "duplicate_trace" => "trace number already spent".to_string(),
            other => other.to_string(),
        }
    }

    fn validate_callback(&self, callback: &CallbackRequest) -> Result<(), PaymentError> {
        callback.require("token")?;
        callback.require("status")?;
        Ok(())
    }

    async fn authorize(
        &self,
        record: &TransactionRecord,
        ctx: &AuthorizeContext,
    ) -> Result<GatewayAuthorization, PaymentError> {
        // the gateway quotes amounts in rials
        let minor = record.amount.to_minor_unit()?;
        let body = PurchaseRequest {
            merchant: &self.merchant_id,
            amount: minor.total().to_string(),
            order_id: &record.order_id,
            callback_url: &ctx.callback_url,
        };

        let response: PurchaseResponse =
            self.invoker.invoke(|| self.post("purchase", &body)).await?;
        if response.status != STATUS_OK {
            return Err(self.rejection(&response.status.to_string()));
        }
        let token = response.token.ok_or_else(|| {
            PaymentError::gateway(CODE_INVALID_RESPONSE, "purchase response missing token")
        })?;

        let mut form_fields = HashMap::new();
        form_fields.insert("token".to_string(), token.clone());
        Ok(GatewayAuthorization {
            reference_id: Some(token.clone()),
            token: Some(token),
            redirect: RedirectDescriptor::post(format!("{}/gateway", self.endpoint), form_fields),
        })
    }

    async fn settle(
        &self,
        record: &TransactionRecord,
        ctx: &SettleContext<'_>,
    ) -> Result<GatewaySettlement, PaymentError> {
        let callback_status = ctx.callback.require("status")?;
        if callback_status != STATUS_OK.to_string() {
            return Err(self.rejection(callback_status));
        }
        let callback_token = ctx.callback.require("token")?.to_string();

        let body = VerifyRequest {
            merchant: &self.merchant_id,
            token: &callback_token,
        };
        let response: VerifyResponse = self.invoker.invoke(|| self.post("verify", &body)).await?;
        if response.status != STATUS_OK {
            return Err(self.rejection(&response.status.to_string()));
        }

        // the token echoed through the callback and the amount confirmed by
        // the gateway must both reproduce the stored record
        let mut checks = FieldMatch::new().token(callback_token);
        if let Some(raw) = response.amount.as_deref() {
            checks = checks.amount(self.parse_amount(raw)?);
        }

        let mut extra = Map::new();
        extra.insert(
            "gateway_status".to_string(),
            Value::from(response.status),
        );

        Ok(GatewaySettlement {
            trace_number: response.trace_number,
            rrn: response.rrn,
            card_number: response.card_number.as_deref().map(mask_pan),
            extra,
            checks,
        })
    }
}
