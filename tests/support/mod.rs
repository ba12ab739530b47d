#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use smm_wallet_server::{
    AppState, build_router,
    config::Config,
    models::user::{CreateUserRequest, Role},
    services::{
        admin_service,
        provider::{ProviderError, ProviderService, SmmProvider},
    },
    store::{LedgerStore, MemoryStore},
};

pub const WEBHOOK_SECRET: &str = "test-secret";
pub const ADMIN_KEY: &str = "admin-key";

/// Service 1 costs 1200 per 1000, service 2 costs 300 per 1000, service 3
/// costs 100 per 1000 and is held for approval (pricing is 1:1 in tests).
pub const PRICEY_SERVICE: i64 = 1;
pub const CHEAP_SERVICE: i64 = 2;
pub const HELD_SERVICE: i64 = 3;

#[derive(Default)]
pub struct FakePanel {
    pub fail_with: Mutex<Option<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePanel {
    pub fn fail_next_orders(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn service(id: i64, rate: i64) -> ProviderService {
    ProviderService {
        id,
        name: format!("service {id}"),
        category: None,
        rate: Decimal::from(rate),
        min: 10,
        max: 100_000,
    }
}

#[async_trait]
impl SmmProvider for FakePanel {
    async fn services(&self) -> Result<Vec<ProviderService>, ProviderError> {
        Ok(vec![
            service(PRICEY_SERVICE, 1200),
            service(CHEAP_SERVICE, 300),
            service(HELD_SERVICE, 100),
        ])
    }

    async fn add_order(
        &self,
        service_id: i64,
        _link: &str,
        _quantity: i64,
    ) -> Result<String, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(format!("add:{service_id}"));
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(ProviderError::Api(message));
        }
        Ok(format!("P{}", calls.len()))
    }

    async fn order_status(&self, provider_order_id: &str) -> Result<Value, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("status:{provider_order_id}"));
        Ok(serde_json::json!({ "status": "In progress", "remains": "0" }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub panel: Arc<FakePanel>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = Config::from_pairs(vec![
            ("SMS_WEBHOOK_SECRET".to_string(), WEBHOOK_SECRET.to_string()),
            ("USD_TO_INR_RATE".to_string(), "1".to_string()),
            ("MARKUP_MULTIPLIER".to_string(), "1".to_string()),
            ("MANUAL_APPROVAL_SERVICES".to_string(), HELD_SERVICE.to_string()),
        ])
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::default());
        admin_service::ensure_admin(store.as_ref(), ADMIN_KEY)
            .await
            .unwrap();

        let state = AppState::new(store.clone(), panel.clone(), config);
        Self {
            router: build_router(state),
            store,
            panel,
        }
    }

    /// Provision a user; returns its id and API key.
    pub async fn user(&self, name: &str, balance_paise: i64) -> (Uuid, String) {
        let created = admin_service::create_user(
            self.store.as_ref(),
            CreateUserRequest {
                display_name: name.to_string(),
                role: Role::User,
            },
        )
        .await
        .unwrap();
        self.store
            .seed_balance(created.user_id, balance_paise)
            .await
            .unwrap();
        (created.user_id, created.api_key)
    }

    pub async fn balance_paise(&self, user_id: Uuid) -> i64 {
        self.store
            .get_user(user_id)
            .await
            .unwrap()
            .unwrap()
            .balance_paise
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, key: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header("authorization", format!("Bearer {key}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, key: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("authorization", format!("Bearer {key}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn webhook(&self, secret: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut builder = Request::post("/api/v1/webhooks/sms").header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header("x-android-secret", secret);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn sms(&self, text: &str) -> (StatusCode, Value) {
        let body = serde_json::json!({ "message": text }).to_string();
        self.webhook(Some(WEBHOOK_SECRET), &body).await
    }
}
