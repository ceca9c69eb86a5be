//! Outbound redirect descriptor and inbound callback surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

/// Query parameter carrying the correlation id on the redirect-out URL.
pub const PARAM_TRANSACTION_ID: &str = "transaction_id";
/// Query parameter carrying the anti-replay state token.
pub const PARAM_STATE: &str = "state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// How the caller must send the payer to the external gateway.
///
/// `Get` is a plain redirect; `Post` means rendering an auto-submitting form
/// with the given hidden fields, for gateways that only accept POST entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectDescriptor {
    pub method: HttpMethod,
    pub url: String,
    pub form_fields: HashMap<String, String>,
}

impl RedirectDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            form_fields: HashMap::new(),
        }
    }

    pub fn post(url: impl Into<String>, form_fields: HashMap<String, String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            form_fields,
        }
    }
}

/// The gateway's callback reduced to what the engine consumes: a flat bag of
/// parameters plus the caller's address.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    params: HashMap<String, String>,
    client_ip: Option<String>,
}

impl CallbackRequest {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self {
            params,
            client_ip: None,
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Required-parameter accessor; absence is a malformed callback.
    pub fn require(&self, name: &str) -> Result<&str, PaymentError> {
        self.param(name)
            .ok_or_else(|| PaymentError::InvalidRequest(format!("missing parameter: {name}")))
    }
}
