// Environment-driven client configuration

use std::time::Duration;
use tracing::warn;

use crate::eligibility::{PurchasePolicy, DEFAULT_PURCHASE_LIMIT};
use crate::ledger::DEFAULT_TIMEOUT_SECS;

pub const DEFAULT_CATALOG_PATH: &str = "catalog/items.json";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ledger gateway URL; None selects the in-process mock ledger
    pub gateway_url: Option<String>,
    /// Path of the JSON catalog source
    pub catalog_path: String,
    /// Per-account purchase limit enforced by the eligibility guard
    pub purchase_limit: u64,
    /// Gateway request timeout
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    /// Build from environment variables, falling back to defaults:
    /// LEDGER_GATEWAY_URL, MARKET_CATALOG_PATH, MARKET_PURCHASE_LIMIT,
    /// LEDGER_TIMEOUT_SECS. A .env file is honored when present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        ClientConfig {
            gateway_url: std::env::var("LEDGER_GATEWAY_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            catalog_path: std::env::var("MARKET_CATALOG_PATH")
                .unwrap_or_else(|_| DEFAULT_CATALOG_PATH.to_string()),
            purchase_limit: parse_var("MARKET_PURCHASE_LIMIT", DEFAULT_PURCHASE_LIMIT),
            request_timeout_secs: parse_var("LEDGER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn policy(&self) -> PurchasePolicy {
        PurchasePolicy {
            purchase_limit: self.purchase_limit,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            gateway_url: None,
            catalog_path: DEFAULT_CATALOG_PATH.to_string(),
            purchase_limit: DEFAULT_PURCHASE_LIMIT,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn parse_var(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, raw = %raw, default, "unparsable value; using default");
                default
            }
        },
        Err(_) => default,
    }
}
