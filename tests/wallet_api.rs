use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

use smm_wallet_server::models::compensation::{CompensationFilter, CompensationStatus};
use smm_wallet_server::models::order::OrderFilter;
use smm_wallet_server::store::{Fault, LedgerStore};

use crate::support::{ADMIN_KEY, CHEAP_SERVICE, HELD_SERVICE, PRICEY_SERVICE, TestApp};

mod support;

const UTR: &str = "412345678901";

fn sms(amount: &str, utr: &str) -> String {
    format!("Dear Customer, INR {amount} credited to A/c XX4521. UPI Ref {utr}")
}

#[tokio::test]
async fn requests_without_api_key_are_unauthorized() {
    let app = TestApp::new().await;

    let request = Request::get("/api/v1/me").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "invalid_api_key");

    let (status, _) = app.get("/api/v1/me", "not-a-key").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sms_first_then_request_then_verify_credits_once() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("ravi", 0).await;

    // The SMS arrives before anyone asked for it.
    let (status, early) = app.sms(&sms("500.00", UTR)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(early["matched"], false);

    let (status, submitted) = app
        .post("/api/v1/funding-requests", &key, json!({ "utr": UTR, "amount": 500 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submitted["status"], "pending");
    assert_eq!(app.balance_paise(user_id).await, 0);

    let (status, verified) = app
        .post("/api/v1/payments/verify", &key, json!({ "utr": UTR, "amount": 500 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["success"], true);
    assert_eq!(verified["credited"], 500.0);
    assert_eq!(verified["newBalance"], 500.0);

    // Nothing can credit this UTR again.
    let (status, again) = app
        .post("/api/v1/payments/verify", &key, json!({ "utr": UTR }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["message"], "Payment already verified");
    let (_, replay) = app.sms(&sms("900.00", UTR)).await;
    assert_eq!(replay["matched"], false);
    let (status, _) = app
        .post("/api/v1/funding-requests", &key, json!({ "utr": UTR, "amount": 500 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, me) = app.get("/api/v1/me", &key).await;
    assert_eq!(me["balance"], 500.0);
    let (_, ledger) = app.get("/api/v1/ledger", &key).await;
    assert_eq!(ledger.as_array().unwrap().len(), 1);
    assert_eq!(ledger[0]["kind"], "credit");
    assert_eq!(ledger[0]["reference"], UTR);
}

#[tokio::test]
async fn verify_reports_each_outcome_with_its_status() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("meera", 0).await;

    let (status, body) = app
        .post("/api/v1/payments/verify", &key, json!({ "utr": "100000000001" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    app.post(
        "/api/v1/funding-requests",
        &key,
        json!({ "utr": "100000000001", "amount": 502.01 }),
    )
    .await;
    let (status, body) = app
        .post("/api/v1/payments/verify", &key, json!({ "utr": "100000000001" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    app.sms(&sms("500.00", "100000000001")).await;
    let (status, body) = app
        .post("/api/v1/payments/verify", &key, json!({ "utr": "100000000001" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Amount mismatch: requested 502.01, received 500.00");

    // Correcting the request to within 2.00 lets it match.
    app.post(
        "/api/v1/funding-requests",
        &key,
        json!({ "utr": "100000000001", "amount": 502 }),
    )
    .await;
    let (status, body) = app
        .post("/api/v1/payments/verify", &key, json!({ "utr": "100000000001" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(app.balance_paise(user_id).await, 50_000);
}

#[tokio::test]
async fn users_cannot_verify_for_someone_else() {
    let app = TestApp::new().await;
    let (victim, _) = app.user("victim", 0).await;
    let (_, key) = app.user("prober", 0).await;

    let (status, body) = app
        .post(
            "/api/v1/payments/verify",
            &key,
            json!({ "userId": victim, "utr": UTR }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, _) = app.get("/api/v1/admin/funding-requests", &key).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn order_above_balance_is_rejected_without_debit() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("nina", 100_000).await;

    let (status, body) = app
        .post(
            "/api/v1/orders",
            &key,
            json!({ "serviceId": PRICEY_SERVICE, "link": "https://instagram.com/p/x", "quantity": 1000 }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(app.balance_paise(user_id).await, 100_000);
    assert!(app.panel.calls().is_empty());
}

#[tokio::test]
async fn provider_failure_restores_balance_and_surfaces_error() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("omar", 200_000).await;
    app.panel.fail_next_orders("Not enough funds on balance");

    let (status, body) = app
        .post(
            "/api/v1/orders",
            &key,
            json!({ "serviceId": CHEAP_SERVICE, "link": "https://instagram.com/p/x", "quantity": 1000 }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["message"], "Not enough funds on balance");
    assert_eq!(app.balance_paise(user_id).await, 200_000);
    let orders = app.store.list_orders(OrderFilter::default()).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn placed_order_and_status_relay() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("lena", 200_000).await;

    let (status, placed) = app
        .post(
            "/api/v1/orders",
            &key,
            json!({ "serviceId": CHEAP_SERVICE, "link": "https://instagram.com/p/x", "quantity": 1000 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(placed["success"], true);
    assert_eq!(placed["orderId"], "P1");
    assert_eq!(placed["charge"], 300.0);
    assert_eq!(placed["newBalance"], 1700.0);
    assert_eq!(app.balance_paise(user_id).await, 170_000);

    // A client-supplied action never reaches the provider.
    let (status, relayed) = app
        .get("/api/v1/orders/status?order=P1&action=add", &key)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(relayed["status"], "In progress");
    let (status, _) = app
        .post("/api/v1/orders/status", &key, json!({ "order": "P1", "action": "refill" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.panel.calls(), vec!["add:2", "status:P1", "status:P1"]);

    let (_, stranger_key) = app.user("stranger", 0).await;
    let (status, _) = app.get("/api/v1/orders/status?order=P1", &stranger_key).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, orders) = app.get("/api/v1/orders", &key).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["status"], "processing");
}

#[tokio::test]
async fn held_orders_are_approved_or_refunded_by_admin() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("kiran", 10_000).await;
    let held = json!({ "serviceId": HELD_SERVICE, "link": "https://t.me/c", "quantity": 500 });

    let (status, first) = app.post("/api/v1/orders", &key, held.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "pending_approval");
    let (_, second) = app.post("/api/v1/orders", &key, held).await;
    assert_eq!(app.balance_paise(user_id).await, 0);

    let first_id = first["orderId"].as_str().unwrap();
    let second_id = second["orderId"].as_str().unwrap();

    let (status, approved) = app
        .post(&format!("/api/v1/admin/orders/{first_id}/approve"), ADMIN_KEY, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "processing");

    let (status, rejected) = app
        .post(&format!("/api/v1/admin/orders/{second_id}/reject"), ADMIN_KEY, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "canceled_refunded");
    assert_eq!(rejected["newBalance"], 50.0);
    assert_eq!(app.balance_paise(user_id).await, 5_000);

    let (status, _) = app
        .post(&format!("/api/v1/admin/orders/{second_id}/reject"), ADMIN_KEY, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_approves_funding_without_sms() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("dev", 0).await;
    let (_, request) = app
        .post("/api/v1/funding-requests", &key, json!({ "utr": UTR, "amount": 250 }))
        .await;
    let id = request["id"].as_str().unwrap();

    let (status, approved) = app
        .post(
            &format!("/api/v1/admin/funding-requests/{id}/approve"),
            ADMIN_KEY,
            json!({ "amount": 240 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "completed");
    assert_eq!(approved["newBalance"], 240.0);

    // The SMS showing up late changes nothing.
    let (_, late) = app.sms(&sms("250.00", UTR)).await;
    assert_eq!(late["matched"], false);
    assert_eq!(app.balance_paise(user_id).await, 24_000);
}

#[tokio::test]
async fn stranded_compensation_is_replayed_once() {
    let app = TestApp::new().await;
    let (user_id, key) = app.user("sam", 100_000).await;
    app.panel.fail_next_orders("timeout");
    app.store.inject(Fault::CompensationApply).await;

    let (status, _) = app
        .post(
            "/api/v1/orders",
            &key,
            json!({ "serviceId": CHEAP_SERVICE, "link": "https://instagram.com/p/x", "quantity": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.balance_paise(user_id).await, 97_000);
    app.store.clear_faults().await;

    let (_, pending) = app
        .get("/api/v1/admin/compensations?status=pending", ADMIN_KEY)
        .await;
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    let id = pending[0]["id"].as_str().unwrap();

    let (status, replayed) = app
        .post(&format!("/api/v1/admin/compensations/{id}/replay"), ADMIN_KEY, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replayed["newBalance"], 1000.0);

    let (status, _) = app
        .post(&format!("/api/v1/admin/compensations/{id}/replay"), ADMIN_KEY, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.balance_paise(user_id).await, 100_000);

    let applied = app
        .store
        .list_compensations(CompensationFilter {
            status: Some(CompensationStatus::Applied),
        })
        .await
        .unwrap();
    assert_eq!(applied.len(), 1);
}

#[tokio::test]
async fn admin_provisions_users_with_working_keys() {
    let app = TestApp::new().await;

    let (status, created) = app
        .post("/api/v1/admin/users", ADMIN_KEY, json!({ "displayName": "Farah" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = created["apiKey"].as_str().unwrap();

    let (status, me) = app.get("/api/v1/me", key).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["displayName"], "Farah");
    assert_eq!(me["role"], "user");
    assert_eq!(me["balance"], 0.0);
}
