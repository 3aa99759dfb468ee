//! Server Configuration
//!
//! Read from the process environment (after `.env` is loaded). Parsing takes
//! a key lookup so tests never touch the real environment.

use std::time::Duration;
use thiserror::Error;

use market_payments::DEFAULT_TOLERANCE_SECS;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Origin used to build checkout success/cancel URLs
    pub base_url: String,
    /// Reconciliation sweep period; `None` disables the sweep
    pub reconcile_interval: Option<Duration>,
    pub webhook_tolerance_secs: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
        let base_url = lookup("APP_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "APP_BASE_URL",
                reason: "must start with http:// or https://".into(),
            });
        }

        let reconcile_interval = match lookup("RECONCILE_INTERVAL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "RECONCILE_INTERVAL_SECS",
                        reason: e.to_string(),
                    });
                }
            },
            None => None,
        };

        let webhook_tolerance_secs = match lookup("WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: "WEBHOOK_TOLERANCE_SECS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_TOLERANCE_SECS,
        };

        Ok(Self {
            bind_addr,
            base_url: base_url.trim_end_matches('/').to_string(),
            reconcile_interval,
            webhook_tolerance_secs,
        })
    }
}

/// Stripe credentials
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            secret_key: lookup("STRIPE_SECRET_KEY").ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?,
            webhook_secret: lookup("STRIPE_WEBHOOK_SECRET")
                .ok_or(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::Missing("STRIPE_SECRET_KEY"));
        }
        if !self.secret_key.starts_with("sk_") {
            return Err(ConfigError::Invalid {
                key: "STRIPE_SECRET_KEY",
                reason: "must start with 'sk_'".into(),
            });
        }
        if self.webhook_secret.trim().is_empty() {
            return Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"));
        }
        if !self.webhook_secret.starts_with("whsec_") {
            return Err(ConfigError::Invalid {
                key: "STRIPE_WEBHOOK_SECRET",
                reason: "must start with 'whsec_'".into(),
            });
        }
        Ok(())
    }

    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }
}
