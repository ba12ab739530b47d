//! Client for the upstream SMM panel.
//!
//! Panels speak the common "API v2" dialect: every call is a form POST to
//! one URL carrying `key` and `action`, answered with JSON. Ids, rates and
//! limits arrive as numbers or as strings depending on the panel, so the
//! response types decode both.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("SMM provider API is not configured")]
    NotConfigured,

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The panel answered with an `error` payload.
    #[error("{0}")]
    Api(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// One entry of the panel's service catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderService {
    #[serde(rename = "service", deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    /// USD per 1000 units.
    #[serde(deserialize_with = "lenient_decimal")]
    pub rate: Decimal,
    #[serde(deserialize_with = "lenient_i64")]
    pub min: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub max: i64,
}

#[async_trait]
pub trait SmmProvider: Send + Sync {
    async fn services(&self) -> Result<Vec<ProviderService>, ProviderError>;

    /// Place an order upstream; returns the panel's order id.
    async fn add_order(
        &self,
        service_id: i64,
        link: &str,
        quantity: i64,
    ) -> Result<String, ProviderError>;

    /// Raw status document for one upstream order.
    async fn order_status(&self, provider_order_id: &str) -> Result<Value, ProviderError>;

    async fn find_service(&self, service_id: i64) -> Result<Option<ProviderService>, ProviderError> {
        let services = self.services().await?;
        Ok(services.into_iter().find(|s| s.id == service_id))
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    key: String,
}

/// [`SmmProvider`] over HTTP.
///
/// Built even when the URL or key is missing; every call then fails with
/// [`ProviderError::NotConfigured`].
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    endpoint: Option<Endpoint>,
}

impl HttpProvider {
    pub fn new(
        url: Option<String>,
        key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = match (url, key) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some(Endpoint { url, key })
            }
            _ => None,
        };
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(
            config.provider_api_url.clone(),
            config.provider_api_key.clone(),
            Duration::from_secs(config.provider_timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn call(&self, action: &str, params: &[(&str, String)]) -> Result<Value, ProviderError> {
        let endpoint = self.endpoint.as_ref().ok_or(ProviderError::NotConfigured)?;

        let mut form: Vec<(&str, String)> =
            vec![("key", endpoint.key.clone()), ("action", action.to_string())];
        form.extend(params.iter().cloned());

        let response = self.client.post(&endpoint.url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Api(format!("provider returned HTTP {status}")));
            }
            Err(_) => {
                tracing::warn!(action, "provider returned a non-JSON body");
                return Err(ProviderError::InvalidResponse("response is not JSON".into()));
            }
        };

        if !status.is_success() {
            let message = error_message(&value).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ProviderError::Api(message));
        }
        Ok(value)
    }
}

#[async_trait]
impl SmmProvider for HttpProvider {
    async fn services(&self) -> Result<Vec<ProviderService>, ProviderError> {
        let value = self.call("services", &[]).await?;
        if let Some(message) = error_message(&value) {
            return Err(ProviderError::Api(message));
        }
        serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn add_order(
        &self,
        service_id: i64,
        link: &str,
        quantity: i64,
    ) -> Result<String, ProviderError> {
        let value = self
            .call(
                "add",
                &[
                    ("service", service_id.to_string()),
                    ("link", link.to_string()),
                    ("quantity", quantity.to_string()),
                ],
            )
            .await?;

        if let Some(message) = error_message(&value) {
            return Err(ProviderError::Api(message));
        }
        match value.get("order") {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(ProviderError::InvalidResponse("missing order id".into())),
        }
    }

    async fn order_status(&self, provider_order_id: &str) -> Result<Value, ProviderError> {
        self.call("status", &[("order", provider_order_id.to_string())])
            .await
    }
}

fn error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl NumberOrString {
    fn text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.trim().to_string(),
        }
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = NumberOrString::deserialize(deserializer)?;
    let text = raw.text();
    if let Ok(n) = text.parse::<i64>() {
        return Ok(n);
    }
    // Some panels send "100.0"; only integral values within range pass.
    Decimal::from_str(&text)
        .ok()
        .filter(|d| d.fract().is_zero())
        .and_then(|d| d.to_i64())
        .ok_or_else(|| serde::de::Error::custom(format!("not an integer: {text}")))
}

fn lenient_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let raw = NumberOrString::deserialize(deserializer)?;
    let text = raw.text();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| serde::de::Error::custom(format!("not a decimal: {text}")))
}
