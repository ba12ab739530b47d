use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

use smm_wallet_server::services::webhook_service;
use smm_wallet_server::store::LedgerStore;

use crate::support::{TestApp, WEBHOOK_SECRET};

mod support;

const CREDIT_SMS: &str = "Rs.500 credited to your account, UPI Ref 123456789012";

#[tokio::test]
async fn missing_or_wrong_secret_is_rejected_before_parsing() {
    let app = TestApp::new().await;
    let body = json!({ "message": CREDIT_SMS }).to_string();

    let (status, error) = app.webhook(None, &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["error"]["code"], "invalid_webhook_secret");

    let (status, _) = app.webhook(Some("guess"), &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Nothing was recorded.
    assert!(app.store.get_deposit("123456789012").await.unwrap().is_none());
}

#[tokio::test]
async fn secret_in_body_is_accepted() {
    let app = TestApp::new().await;
    let body = json!({ "sms": CREDIT_SMS, "secret": WEBHOOK_SECRET }).to_string();

    let (status, response) = app.webhook(None, &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], true);
    assert_eq!(response["matched"], false);
    assert_eq!(response["extracted"]["utr"], "123456789012");
    assert_eq!(response["extracted"]["amount"], 500.0);
}

#[tokio::test]
async fn noise_is_acknowledged_and_ignored() {
    let app = TestApp::new().await;

    for text in [
        "Your OTP is 123456",
        "Rs.500 debited from your account, UPI Ref 123456789012",
    ] {
        let (status, response) = app.sms(text).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["success"], true);
        assert_eq!(response["matched"], false);
        assert!(response["extracted"].is_null());
    }
    assert!(app.store.get_deposit("123456789012").await.unwrap().is_none());
}

#[tokio::test]
async fn body_without_fields_or_text_is_bad_request() {
    let app = TestApp::new().await;

    let (status, _) = app.webhook(Some(WEBHOOK_SECRET), "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.webhook(Some(WEBHOOK_SECRET), "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_delivery_is_accepted() {
    let app = TestApp::new().await;
    let body = json!({ "utr": "222233334444", "amount": 125.5 }).to_string();
    let signature = webhook_service::sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();

    let request = Request::post("/api/v1/webhooks/sms")
        .header("content-type", "application/json")
        .header("x-webhook-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let (status, response) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["extracted"]["amount"], 125.5);
    let deposit = app.store.get_deposit("222233334444").await.unwrap().unwrap();
    assert_eq!(deposit.amount_paise, 12_550);
}

#[tokio::test]
async fn repeated_delivery_is_idempotent() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("asha", 0).await;
    app.post(
        "/api/v1/funding-requests",
        &key,
        json!({ "utr": "123456789012", "amount": 500 }),
    )
    .await;

    let (_, first) = app.sms(CREDIT_SMS).await;
    assert_eq!(first["matched"], true);
    for _ in 0..3 {
        let (status, again) = app.sms(CREDIT_SMS).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["matched"], false);
    }

    let deposit = app.store.get_deposit("123456789012").await.unwrap().unwrap();
    assert!(deposit.is_used);
    assert_eq!(deposit.used_by, Some(user_id));
    assert_eq!(app.balance_paise(user_id).await, 50_000);
}

#[tokio::test]
async fn health_reports_store() {
    let app = TestApp::new().await;
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "connected");
}
