//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::services::pricing::PricingConfig;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string; the in-memory store is used when unset
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `SMS_WEBHOOK_SECRET`: shared secret of the SMS forwarder
/// - `PROVIDER_API_URL`, `PROVIDER_API_KEY`: upstream SMM panel API
/// - `PROVIDER_TIMEOUT_SECS` (optional): defaults to 15
/// - `USD_TO_INR_RATE`, `MARKUP_MULTIPLIER`, `GLOBAL_DISCOUNT_PERCENT`: pricing
/// - `MANUAL_APPROVAL_SERVICES`: comma-separated provider service ids held for admin approval
/// - `BOOTSTRAP_ADMIN_KEY` (optional): API key of an admin created at startup
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub sms_webhook_secret: Option<String>,

    #[serde(default)]
    pub provider_api_url: Option<String>,

    #[serde(default)]
    pub provider_api_key: Option<String>,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_usd_to_inr", with = "rust_decimal::serde::str")]
    pub usd_to_inr_rate: Decimal,

    #[serde(default = "default_markup", with = "rust_decimal::serde::str")]
    pub markup_multiplier: Decimal,

    #[serde(default, with = "rust_decimal::serde::str")]
    pub global_discount_percent: Decimal,

    #[serde(default)]
    pub manual_approval_services: Vec<i64>,

    #[serde(default)]
    pub bootstrap_admin_key: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_provider_timeout() -> u64 {
    15
}

fn default_usd_to_inr() -> Decimal {
    Decimal::from(90)
}

fn default_markup() -> Decimal {
    Decimal::new(15, 1)
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from explicit key/value pairs instead of the process environment.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(pairs)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.pricing().map(|_| ())
    }

    /// Validated pricing parameters.
    pub fn pricing(&self) -> Result<PricingConfig, ConfigError> {
        let usd_to_inr = self.usd_to_inr_rate;
        let markup = self.markup_multiplier;
        let discount_percent = self.global_discount_percent;

        if usd_to_inr <= Decimal::ZERO {
            return Err(ConfigError::Invalid("USD_TO_INR_RATE must be positive".into()));
        }
        if markup <= Decimal::ZERO {
            return Err(ConfigError::Invalid("MARKUP_MULTIPLIER must be positive".into()));
        }
        if discount_percent < Decimal::ZERO || discount_percent >= Decimal::ONE_HUNDRED {
            return Err(ConfigError::Invalid(
                "GLOBAL_DISCOUNT_PERCENT must be in [0, 100)".into(),
            ));
        }

        Ok(PricingConfig {
            usd_to_inr,
            markup,
            discount_percent,
        })
    }

    pub fn is_manual_service(&self, service_id: i64) -> bool {
        self.manual_approval_services.contains(&service_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_pairs(pairs(&[])).unwrap();
        assert_eq!(config.server_port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.manual_approval_services.is_empty());
        assert_eq!(config.provider_timeout_secs, 15);
        let pricing = config.pricing().unwrap();
        assert_eq!(pricing.markup, Decimal::new(15, 1));
        assert_eq!(pricing.usd_to_inr, Decimal::from(90));
    }

    #[test]
    fn pricing_values_keep_their_decimal_digits() {
        let config = Config::from_pairs(pairs(&[
            ("USD_TO_INR_RATE", "83.3"),
            ("MARKUP_MULTIPLIER", "1.15"),
            ("GLOBAL_DISCOUNT_PERCENT", "2.5"),
        ]))
        .unwrap();
        let pricing = config.pricing().unwrap();
        assert_eq!(pricing.usd_to_inr.to_string(), "83.3");
        assert_eq!(pricing.markup.to_string(), "1.15");
        assert_eq!(pricing.discount_percent.to_string(), "2.5");

        let err = Config::from_pairs(pairs(&[("MARKUP_MULTIPLIER", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env(_)));
    }

    #[test]
    fn parses_service_list_and_secrets() {
        let config = Config::from_pairs(pairs(&[
            ("SERVER_PORT", "8080"),
            ("SMS_WEBHOOK_SECRET", "hunter2"),
            ("MANUAL_APPROVAL_SERVICES", "12,40"),
        ]))
        .unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.sms_webhook_secret.as_deref(), Some("hunter2"));
        assert!(config.is_manual_service(40));
        assert!(!config.is_manual_service(41));
    }

    #[test]
    fn rejects_out_of_range_discount() {
        let err = Config::from_pairs(pairs(&[("GLOBAL_DISCOUNT_PERCENT", "100")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
