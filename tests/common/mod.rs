#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use paygate_core::adapters::MemoryTransactionRepository;
use paygate_core::{
    Amount, AuthorizeContext, CallbackRequest, Config, FieldMatch, GatewayAuthorization,
    GatewayDriver, GatewaySettlement, PaymentError, PaymentManager, ProviderConfig,
    ProviderRegistry, RedirectDescriptor, SettleContext, TransactionRecord, TransactionRepository,
    CURRENCY_TOMAN,
};

pub const MOCK_PROVIDER: &str = "mock";

pub fn toman(total: i64) -> Amount {
    Amount::new(BigDecimal::from(total), CURRENCY_TOMAN).unwrap()
}

/// Scriptable in-process gateway driver.
pub struct MockDriver {
    stateless: bool,
    fail_authorize: Option<(String, String)>,
    fail_settle: Option<(String, String)>,
    settle_delay: Duration,
    declared_order_id: Option<String>,
    last_callback_url: Mutex<Option<String>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            stateless: false,
            fail_authorize: None,
            fail_settle: None,
            settle_delay: Duration::ZERO,
            declared_order_id: None,
            last_callback_url: Mutex::new(None),
        }
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stateless(mut self) -> Self {
        self.stateless = true;
        self
    }

    pub fn failing_authorize(mut self, code: &str, message: &str) -> Self {
        self.fail_authorize = Some((code.to_string(), message.to_string()));
        self
    }

    pub fn failing_settle(mut self, code: &str, message: &str) -> Self {
        self.fail_settle = Some((code.to_string(), message.to_string()));
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Makes the settlement declare this order id in its field-match
    /// specification.
    pub fn declaring_order_id(mut self, order_id: &str) -> Self {
        self.declared_order_id = Some(order_id.to_string());
        self
    }

    /// The redirect-back URL handed to the most recent authorization call.
    pub fn last_callback_url(&self) -> Option<String> {
        self.last_callback_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayDriver for MockDriver {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    fn stateless(&self) -> bool {
        self.stateless
    }

    fn validate_callback(&self, callback: &CallbackRequest) -> Result<(), PaymentError> {
        callback.require("status")?;
        Ok(())
    }

    async fn authorize(
        &self,
        record: &TransactionRecord,
        ctx: &AuthorizeContext,
    ) -> Result<GatewayAuthorization, PaymentError> {
        *self.last_callback_url.lock().unwrap() = Some(ctx.callback_url.clone());
        if let Some((code, message)) = &self.fail_authorize {
            return Err(PaymentError::gateway(code, message));
        }
        Ok(GatewayAuthorization {
            reference_id: Some(format!("ref-{}", record.id)),
            token: Some(format!("tok-{}", record.id)),
            redirect: RedirectDescriptor::get(format!(
                "https://gateway.example/pay/{}",
                record.id
            )),
        })
    }

    async fn settle(
        &self,
        record: &TransactionRecord,
        _ctx: &SettleContext<'_>,
    ) -> Result<GatewaySettlement, PaymentError> {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        if let Some((code, message)) = &self.fail_settle {
            return Err(PaymentError::gateway(code, message));
        }
        let mut checks = FieldMatch::new();
        if let Some(order_id) = &self.declared_order_id {
            checks = checks.order_id(order_id);
        }
        Ok(GatewaySettlement {
            trace_number: Some(format!("trace-{}", record.id)),
            rrn: Some(format!("rrn-{}", record.id)),
            card_number: Some("603799xxxxxx7890".to_string()),
            extra: serde_json::Map::new(),
            checks,
        })
    }
}

pub fn mock_provider_config() -> ProviderConfig {
    ProviderConfig {
        endpoint: "https://gateway.example".to_string(),
        merchant_id: "merchant-1".to_string(),
        callback_url: "https://merchant.example/payments/callback".to_string(),
        extra: HashMap::new(),
    }
}

/// Manager wired with the given driver, an in-memory repository and the
/// mock provider configuration.
pub fn manager_with(
    driver: Arc<dyn GatewayDriver>,
) -> (Arc<PaymentManager>, Arc<MemoryTransactionRepository>) {
    let repo = Arc::new(MemoryTransactionRepository::new());
    let code = driver.name().to_string();
    let registry = ProviderRegistry::new().with(driver);
    let config = Config::default().with_provider(code, mock_provider_config());
    let manager = PaymentManager::new(
        Arc::clone(&repo) as Arc<dyn TransactionRepository>,
        registry,
        config,
    );
    (Arc::new(manager), repo)
}

/// Extracts the query parameters of the redirect-back URL the workflow
/// built for the gateway.
pub fn callback_params(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}
