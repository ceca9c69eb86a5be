//! Gateway adapter contract and registry.
//!
//! A `GatewayDriver` carries only the gateway-specific parts of an adapter:
//! the remote authorization and verify/confirm calls, structural callback
//! validation, and the vendor error-code vocabulary. The shared
//! authorize/settle workflow lives in [`workflow::ProviderWorkflow`] and
//! takes the driver as a dependency.

pub mod sandbox;
pub mod workflow;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::field_match::FieldMatch;
use crate::domain::redirect::{CallbackRequest, RedirectDescriptor};
use crate::domain::transaction::TransactionRecord;
use crate::error::PaymentError;

pub use sandbox::SandboxDriver;
pub use workflow::{AuthorizedPayment, PaymentRequest, ProviderWorkflow};

/// Inputs the shared workflow prepares for the driver's authorization call.
#[derive(Debug, Clone)]
pub struct AuthorizeContext {
    /// Fully built redirect-back URL, correlation id and anti-replay token
    /// already appended.
    pub callback_url: String,
}

/// Inputs for the driver's verify/confirm call.
#[derive(Debug)]
pub struct SettleContext<'a> {
    pub callback: &'a CallbackRequest,
}

/// Result of a gateway-specific authorization call.
#[derive(Debug, Clone)]
pub struct GatewayAuthorization {
    pub reference_id: Option<String>,
    pub token: Option<String>,
    pub redirect: RedirectDescriptor,
}

/// Result of a gateway-specific verify/confirm call.
///
/// `checks` names the record fields the response must reproduce; the shared
/// workflow applies it before committing the settlement.
#[derive(Debug, Clone, Default)]
pub struct GatewaySettlement {
    pub trace_number: Option<String>,
    pub rrn: Option<String>,
    pub card_number: Option<String>,
    pub extra: Map<String, Value>,
    pub checks: FieldMatch,
}

/// The contract every gateway adapter satisfies.
#[async_trait]
pub trait GatewayDriver: Send + Sync {
    /// Provider code stored on each record and used for dispatch.
    fn name(&self) -> &str;

    /// Stateless adapters rely on signed, self-contained callback data and
    /// skip the session-based anti-replay check.
    fn stateless(&self) -> bool {
        false
    }

    /// Overrides the per-provider configured callback URL.
    fn callback_url(&self) -> Option<&str> {
        None
    }

    /// Extra parameters appended to the redirect-back URL and expected back
    /// verbatim on the callback.
    fn custom_callback_params(&self, _record: &TransactionRecord) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Opt-in advisory duplicate-spend check by trace number.
    fn checks_duplicate_trace(&self) -> bool {
        false
    }

    /// Resolves a vendor failure code to a human-readable message, falling
    /// back to the raw code.
    fn translate_code(&self, code: &str) -> String {
        code.to_string()
    }

    /// Structural presence check on the inbound callback, before any
    /// gateway call is made.
    fn validate_callback(&self, callback: &CallbackRequest) -> Result<(), PaymentError>;

    async fn authorize(
        &self,
        record: &TransactionRecord,
        ctx: &AuthorizeContext,
    ) -> Result<GatewayAuthorization, PaymentError>;

    async fn settle(
        &self,
        record: &TransactionRecord,
        ctx: &SettleContext<'_>,
    ) -> Result<GatewaySettlement, PaymentError>;
}

/// Dispatch table from provider code to driver.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    drivers: HashMap<String, Arc<dyn GatewayDriver>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn GatewayDriver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn with(mut self, driver: Arc<dyn GatewayDriver>) -> Self {
        self.register(driver);
        self
    }

    pub fn resolve(&self, code: &str) -> Result<Arc<dyn GatewayDriver>, PaymentError> {
        self.drivers
            .get(code)
            .cloned()
            .ok_or_else(|| PaymentError::ProviderNotFound(code.to_string()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}
