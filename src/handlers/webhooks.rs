//! Inbound SMS webhook.
//!
//! - POST /api/v1/webhooks/sms - bank SMS forwarded from the merchant's phone

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use crate::{
    error::AppError,
    models::deposit::{SmsWebhookPayload, SmsWebhookResponse},
    services::{reconciliation, webhook_service},
    state::AppState,
};

/// Receive one forwarded SMS.
///
/// # Endpoint
///
/// `POST /api/v1/webhooks/sms`
///
/// # Authentication
///
/// Shared secret, not an API key. See `services::webhook_service`.
///
/// # Request Body
///
/// ```json
/// { "message": "Rs.500 credited to a/c XX12, UPI Ref 412345678901" }
/// ```
///
/// or, from forwarders that parse on the phone:
///
/// ```json
/// { "utr": "412345678901", "amount": 500 }
/// ```
///
/// # Response
///
/// - **200**: accepted; `matched` says whether a funding request was
///   completed. Irrelevant messages (OTPs, debits) are accepted and ignored.
/// - **400**: body is not JSON, or carries neither fields nor text
/// - **401**: secret missing or wrong
/// - **500**: store failure; the forwarder should retry
pub async fn receive_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SmsWebhookResponse>, AppError> {
    let parsed = serde_json::from_slice::<SmsWebhookPayload>(&body);
    let body_secret = parsed.as_ref().ok().and_then(|p| p.secret.as_deref());

    webhook_service::authenticate(
        state.config.sms_webhook_secret.as_deref(),
        &headers,
        &body,
        body_secret,
    )?;

    let payload =
        parsed.map_err(|e| AppError::InvalidRequest(format!("invalid webhook body: {e}")))?;
    let response = reconciliation::ingest_sms(state.store.as_ref(), &payload).await?;
    Ok(Json(response))
}
