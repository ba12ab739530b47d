//! Authentication of inbound SMS webhook deliveries.
//!
//! Forwarder apps prove knowledge of the shared secret in one of three ways:
//!
//! - `X-Android-Secret: <secret>` header
//! - `"secret": "<secret>"` in the JSON body
//! - `X-Webhook-Signature: sha256=<hex>`, the HMAC-SHA256 of the raw body
//!   keyed with the secret
//!
//! The check runs before the body is looked at for anything else.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_HEADER: &str = "x-android-secret";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Accept the delivery or fail with `InvalidWebhookSecret`.
///
/// With no secret configured on the server every delivery is refused.
pub fn authenticate(
    server_secret: Option<&str>,
    headers: &HeaderMap,
    raw_body: &[u8],
    body_secret: Option<&str>,
) -> Result<(), AppError> {
    let Some(server_secret) = server_secret.filter(|s| !s.is_empty()) else {
        tracing::error!("SMS_WEBHOOK_SECRET is not set, refusing webhook delivery");
        return Err(AppError::Config("SMS webhook secret is not configured".into()));
    };

    if let Some(signature) = header(headers, SIGNATURE_HEADER) {
        return if verify_signature(server_secret, raw_body, signature) {
            Ok(())
        } else {
            tracing::warn!("webhook signature mismatch");
            Err(AppError::InvalidWebhookSecret)
        };
    }

    let presented = header(headers, SECRET_HEADER).or(body_secret);
    match presented {
        Some(secret) if secrets_match(server_secret, secret) => Ok(()),
        Some(_) => {
            tracing::warn!("webhook secret mismatch");
            Err(AppError::InvalidWebhookSecret)
        }
        None => {
            tracing::warn!("webhook delivery without secret");
            Err(AppError::InvalidWebhookSecret)
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Compares digests so the comparison time does not depend on how much of
/// the secret was guessed.
fn secrets_match(expected: &str, presented: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(presented.as_bytes())
}

/// Check a `sha256=<hex>` HMAC signature in constant time.
fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(expected) = signature
        .strip_prefix("sha256=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
    else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Signature header value for `payload`, as a forwarder would compute it.
pub fn sign(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "forwarder-secret";

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn header_or_body_secret() {
        assert!(authenticate(Some(SECRET), &headers(&[(SECRET_HEADER, SECRET)]), b"", None).is_ok());
        assert!(authenticate(Some(SECRET), &HeaderMap::new(), b"", Some(SECRET)).is_ok());
    }

    #[test]
    fn wrong_or_missing_secret_is_unauthorized() {
        let wrong = authenticate(Some(SECRET), &headers(&[(SECRET_HEADER, "nope")]), b"", None);
        assert!(matches!(wrong, Err(AppError::InvalidWebhookSecret)));

        let missing = authenticate(Some(SECRET), &HeaderMap::new(), b"", None);
        assert!(matches!(missing, Err(AppError::InvalidWebhookSecret)));
    }

    #[test]
    fn unset_server_secret_refuses_everything() {
        let result = authenticate(None, &HeaderMap::new(), b"", Some(""));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn hmac_signature_over_raw_body() {
        let body = br#"{"message":"Rs.500 credited, UPI Ref 123456789012"}"#;
        let signature = sign(SECRET, body).unwrap();

        assert!(authenticate(Some(SECRET), &headers(&[(SIGNATURE_HEADER, signature.as_str())]), body, None).is_ok());

        let tampered = br#"{"message":"Rs.900 credited, UPI Ref 123456789012"}"#;
        let result = authenticate(Some(SECRET), &headers(&[(SIGNATURE_HEADER, signature.as_str())]), tampered, None);
        assert!(matches!(result, Err(AppError::InvalidWebhookSecret)));

        let garbage = authenticate(Some(SECRET), &headers(&[(SIGNATURE_HEADER, "sha256=zz")]), body, None);
        assert!(matches!(garbage, Err(AppError::InvalidWebhookSecret)));
    }
}
