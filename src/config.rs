use std::collections::HashMap;
use std::env;

use dotenvy::dotenv;
use serde::Deserialize;

fn default_table_prefix() -> String {
    "paygate_".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

/// Gateway credentials and endpoints for one provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub merchant_id: String,
    /// Default redirect-back URL; drivers may override it.
    pub callback_url: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// Engine configuration consumed by the orchestration core.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    /// Attempt budget for resilient remote calls.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            retry_attempts: default_retry_attempts(),
            providers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let table_prefix =
            env::var("PAYGATE_TABLE_PREFIX").unwrap_or_else(|_| default_table_prefix());
        let retry_attempts = env::var("PAYGATE_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| default_retry_attempts().to_string())
            .parse()?;
        let providers = match env::var("PAYGATE_PROVIDERS") {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => HashMap::new(),
        };

        Ok(Config {
            table_prefix,
            retry_attempts,
            providers,
        })
    }

    pub fn with_provider(mut self, code: impl Into<String>, provider: ProviderConfig) -> Self {
        self.providers.insert(code.into(), provider);
        self
    }
}
