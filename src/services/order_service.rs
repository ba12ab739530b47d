//! Order placement against the upstream panel.
//!
//! The wallet is debited first, in its own atomic step. The provider call
//! happens afterwards with no transaction open. If anything fails after the
//! debit and before the order row exists, the charge is given back through a
//! compensation record that is written before the refund is applied.

use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::compensation::{Compensation, NewCompensation};
use crate::models::order::{NewOrder, Order, OrderStatus, OrderStatusQuery, PlaceOrderRequest};
use crate::services::pricing;
use crate::services::provider::SmmProvider;
use crate::store::LedgerStore;

/// A recorded order and the balance left after paying for it.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub new_balance_paise: i64,
}

/// Price, debit, place upstream and record one order.
///
/// Services configured for manual approval are debited and recorded as
/// `PendingApproval` without calling the provider.
pub async fn place_order(
    store: &dyn LedgerStore,
    provider: &dyn SmmProvider,
    config: &Config,
    user_id: Uuid,
    request: PlaceOrderRequest,
) -> Result<PlacedOrder, AppError> {
    let link = request.link.trim().to_string();
    if link.is_empty() {
        return Err(AppError::InvalidRequest("link is required".into()));
    }
    if request.quantity <= 0 {
        return Err(AppError::InvalidRequest("quantity must be positive".into()));
    }

    let pricing_config = config
        .pricing()
        .map_err(|e| AppError::Config(e.to_string()))?;
    let service = provider
        .find_service(request.service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Service {}", request.service_id)))?;

    if request.quantity < service.min || request.quantity > service.max {
        return Err(AppError::InvalidRequest(format!(
            "quantity must be between {} and {}",
            service.min, service.max
        )));
    }
    let charge_paise = pricing::quote(service.rate, request.quantity, &pricing_config)
        .ok_or_else(|| AppError::InvalidRequest("order total is out of range".into()))?;
    if charge_paise <= 0 {
        return Err(AppError::InvalidRequest(
            "order total rounds to zero; increase the quantity".into(),
        ));
    }

    let balance_after_debit = store.debit_balance(user_id, charge_paise).await?;
    tracing::info!(%user_id, service_id = service.id, charge_paise, "wallet debited for order");

    let (status, provider_order_id) = if config.is_manual_service(service.id) {
        (OrderStatus::PendingApproval, None)
    } else {
        match provider.add_order(service.id, &link, request.quantity).await {
            Ok(id) => (OrderStatus::Processing, Some(id)),
            Err(e) => {
                tracing::warn!(%user_id, service_id = service.id, error = %e, "provider refused order");
                compensate(store, user_id, charge_paise, &format!("provider error: {e}")).await;
                return Err(e.into());
            }
        }
    };

    let new_order = NewOrder {
        user_id,
        service_id: service.id,
        link,
        quantity: request.quantity,
        charge_paise,
        status,
        provider_order_id: provider_order_id.clone(),
    };

    match store.record_order(new_order).await {
        Ok(order) => {
            tracing::info!(order_id = %order.id, status = ?order.status, "order recorded");
            Ok(PlacedOrder {
                order,
                new_balance_paise: balance_after_debit,
            })
        }
        Err(e) if provider_order_id.is_none() => {
            // Nothing was placed upstream, so the charge goes back.
            compensate(store, user_id, charge_paise, &format!("order not recorded: {e}")).await;
            Err(e.into())
        }
        Err(e) => {
            tracing::error!(
                %user_id,
                provider_order_id = provider_order_id.as_deref().unwrap_or_default(),
                charge_paise,
                error = %e,
                "order placed upstream but not recorded"
            );
            Err(e.into())
        }
    }
}

/// Durably record a refund, then apply it.
///
/// Failures are logged, never returned: the caller is already reporting the
/// error that made the refund necessary. A compensation left pending can be
/// replayed by an admin.
pub async fn compensate(
    store: &dyn LedgerStore,
    user_id: Uuid,
    amount_paise: i64,
    reason: &str,
) -> Option<Compensation> {
    let pending = match store
        .open_compensation(NewCompensation {
            user_id,
            amount_paise,
            reason: reason.to_string(),
        })
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%user_id, amount_paise, error = %e, "could not record compensation");
            return None;
        }
    };

    match store.apply_compensation(pending.id).await {
        Ok((applied, new_balance_paise)) => {
            tracing::info!(
                %user_id,
                compensation_id = %applied.id,
                amount_paise,
                new_balance_paise,
                "order charge refunded"
            );
            Some(applied)
        }
        Err(e) => {
            tracing::error!(
                %user_id,
                compensation_id = %pending.id,
                amount_paise,
                error = %e,
                "compensation left pending"
            );
            Some(pending)
        }
    }
}

/// Relay an order status query to the provider.
///
/// `order` may be the local order id or the provider's id. The caller must
/// own the order unless they are an admin. Whatever `action` the client
/// sent, only `status` is ever asked upstream.
pub async fn relay_status(
    store: &dyn LedgerStore,
    provider: &dyn SmmProvider,
    caller: Uuid,
    is_admin: bool,
    query: &OrderStatusQuery,
) -> Result<Value, AppError> {
    let reference = query.order.trim();
    if reference.is_empty() {
        return Err(AppError::InvalidRequest("order is required".into()));
    }
    if let Some(action) = query.action.as_deref().filter(|a| *a != "status") {
        tracing::warn!(%caller, action, "status relay ignoring client action");
    }

    let order = match Uuid::parse_str(reference) {
        Ok(id) => store.get_order(id).await?,
        Err(_) => store.order_by_provider_id(reference).await?,
    }
    .ok_or_else(|| AppError::NotFound("Order".into()))?;

    if order.user_id != caller && !is_admin {
        return Err(AppError::NotFound("Order".into()));
    }
    let provider_order_id = order
        .provider_order_id
        .ok_or_else(|| AppError::Conflict("order has not been placed with the provider yet".into()))?;

    Ok(provider.order_status(&provider_order_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::compensation::{CompensationFilter, CompensationStatus};
    use crate::models::deposit::SmsWebhookPayload;
    use crate::models::funding::SubmitFundingRequest;
    use crate::models::order::OrderFilter;
    use crate::models::transaction::EntryKind;
    use crate::models::user::{NewUser, Role, User};
    use crate::services::provider::{ProviderError, ProviderService};
    use crate::services::reconciliation;
    use crate::store::{Fault, MemoryStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    /// Catalog: service 1 at 2.00 USD/1000 (with defaults: 270 INR per 1000),
    /// service 5 at 0.001 USD/1000.
    #[derive(Default)]
    struct ScriptedProvider {
        fail_with: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SmmProvider for ScriptedProvider {
        async fn services(&self) -> Result<Vec<ProviderService>, ProviderError> {
            Ok(vec![ProviderService {
                id: 1,
                name: "Followers".into(),
                category: None,
                rate: Decimal::from_str("2.00").unwrap(),
                min: 10,
                max: 10_000,
            }, ProviderService {
                id: 5,
                name: "Views".into(),
                category: None,
                rate: Decimal::from_str("0.001").unwrap(),
                min: 1,
                max: 1_000_000,
            }])
        }

        async fn add_order(
            &self,
            service_id: i64,
            _link: &str,
            _quantity: i64,
        ) -> Result<String, ProviderError> {
            let placed = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(format!("add:{service_id}"));
                calls.iter().filter(|c| c.starts_with("add:")).count()
            };
            match &self.fail_with {
                Some(message) => Err(ProviderError::Api(message.clone())),
                None => Ok(format!("{}", 9000 + placed)),
            }
        }

        async fn order_status(&self, provider_order_id: &str) -> Result<Value, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("status:{provider_order_id}"));
            Ok(serde_json::json!({ "status": "In progress", "order": provider_order_id }))
        }
    }

    fn config(manual: &[i64]) -> Config {
        let mut pairs = Vec::new();
        if !manual.is_empty() {
            let list: Vec<String> = manual.iter().map(i64::to_string).collect();
            pairs.push(("MANUAL_APPROVAL_SERVICES".to_string(), list.join(",")));
        }
        Config::from_pairs(pairs).unwrap()
    }

    async fn funded_user(store: &MemoryStore, balance_paise: i64) -> User {
        let user = store
            .create_user(
                NewUser {
                    display_name: "buyer".into(),
                    role: Role::User,
                },
                "hash-buyer",
            )
            .await
            .unwrap();
        store.seed_balance(user.id, balance_paise).await.unwrap();
        user
    }

    fn order(quantity: i64) -> PlaceOrderRequest {
        PlaceOrderRequest {
            user_id: None,
            service_id: 1,
            link: "https://instagram.com/p/abc".into(),
            quantity,
        }
    }

    async fn balance(store: &MemoryStore, user: &User) -> i64 {
        store.get_user(user.id).await.unwrap().unwrap().balance_paise
    }

    #[tokio::test]
    async fn order_priced_at_zero_is_rejected_before_debit() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::default();
        let user = funded_user(&store, 5_000).await;
        let request = PlaceOrderRequest {
            service_id: 5,
            ..order(10)
        };

        let err = place_order(&store, &provider, &config(&[]), user.id, request)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(provider.calls.lock().unwrap().is_empty());
        assert_eq!(balance(&store, &user).await, 5_000);
        assert!(store.ledger_for_user(user.id).await.unwrap().is_empty());
        let orders = store.list_orders(OrderFilter::default()).await.unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debit_and_funding_credit_lose_no_update() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::default());
        let config = Arc::new(config(&[]));
        let user = funded_user(&store, 5_000).await;

        for round in 0..20_i64 {
            let utr = format!("{}", 600_000_000_000 + round);
            reconciliation::submit_funding(
                store.as_ref(),
                user.id,
                SubmitFundingRequest {
                    utr: utr.clone(),
                    amount: Decimal::from(100),
                    method: None,
                },
            )
            .await
            .unwrap();

            let buy = {
                let (store, provider, config) =
                    (Arc::clone(&store), Arc::clone(&provider), Arc::clone(&config));
                let user_id = user.id;
                tokio::spawn(async move {
                    place_order(store.as_ref(), provider.as_ref(), &config, user_id, order(100)).await
                })
            };
            let fund = {
                let store = Arc::clone(&store);
                let payload = SmsWebhookPayload {
                    message: Some(format!("Rs.100 credited to your account, UPI Ref {utr}")),
                    ..Default::default()
                };
                tokio::spawn(async move { reconciliation::ingest_sms(store.as_ref(), &payload).await })
            };
            let (buy, fund) = tokio::join!(buy, fund);
            buy.unwrap().unwrap();
            assert!(fund.unwrap().unwrap().matched);
        }

        // 20 credits of 100.00 and 20 orders of 27.00 on top of 50.00.
        assert_eq!(balance(&store, &user).await, 5_000 + 20 * 10_000 - 20 * 2_700);
        let ledger = store.ledger_for_user(user.id).await.unwrap();
        let debits = ledger.iter().filter(|e| e.kind == EntryKind::Debit).count();
        let credits = ledger.iter().filter(|e| e.kind == EntryKind::Credit).count();
        assert_eq!((debits, credits), (20, 20));
    }

    #[tokio::test]
    async fn successful_order_debits_and_records() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::default();
        let user = funded_user(&store, 100_000).await;

        let placed = place_order(&store, &provider, &config(&[]), user.id, order(1000))
            .await
            .unwrap();

        assert_eq!(placed.order.charge_paise, 27_000);
        assert_eq!(placed.order.status, OrderStatus::Processing);
        assert_eq!(placed.order.provider_order_id.as_deref(), Some("9001"));
        assert_eq!(placed.new_balance_paise, 73_000);
        assert_eq!(balance(&store, &user).await, 73_000);

        let ledger = store.ledger_for_user(user.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].kind, EntryKind::Debit);
    }

    #[tokio::test]
    async fn insufficient_balance_changes_nothing() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::default();
        let user = funded_user(&store, 1_000).await;

        let err = place_order(&store, &provider, &config(&[]), user.id, order(1000))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(balance(&store, &user).await, 1_000);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_refunds_in_full() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider {
            fail_with: Some("Not enough funds on balance".into()),
            ..Default::default()
        };
        let user = funded_user(&store, 200_000).await;

        let err = place_order(&store, &provider, &config(&[]), user.id, order(1000))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Provider(ref m) if m == "Not enough funds on balance"));
        assert_eq!(balance(&store, &user).await, 200_000);
        let orders = store.list_orders(OrderFilter::default()).await.unwrap();
        assert!(orders.is_empty());
        let compensations = store
            .list_compensations(CompensationFilter::default())
            .await
            .unwrap();
        assert_eq!(compensations.len(), 1);
        assert_eq!(compensations[0].status, CompensationStatus::Applied);
    }

    #[tokio::test]
    async fn failed_refund_stays_pending_for_replay() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider {
            fail_with: Some("timeout".into()),
            ..Default::default()
        };
        let user = funded_user(&store, 200_000).await;
        store.inject(Fault::CompensationApply).await;

        place_order(&store, &provider, &config(&[]), user.id, order(1000))
            .await
            .unwrap_err();

        assert_eq!(balance(&store, &user).await, 173_000);
        let pending = store
            .list_compensations(CompensationFilter {
                status: Some(CompensationStatus::Pending),
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount_paise, 27_000);
    }

    #[tokio::test]
    async fn manual_services_wait_for_approval() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::default();
        let user = funded_user(&store, 100_000).await;

        let placed = place_order(&store, &provider, &config(&[1]), user.id, order(100))
            .await
            .unwrap();

        assert_eq!(placed.order.status, OrderStatus::PendingApproval);
        assert!(placed.order.provider_order_id.is_none());
        assert_eq!(balance(&store, &user).await, 100_000 - 2_700);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quantity_outside_limits_is_rejected() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::default();
        let user = funded_user(&store, 100_000).await;

        let err = place_order(&store, &provider, &config(&[]), user.id, order(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let mut unknown = order(100);
        unknown.service_id = 77;
        let err = place_order(&store, &provider, &config(&[]), user.id, unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(balance(&store, &user).await, 100_000);
    }

    #[tokio::test]
    async fn status_relay_forces_status_and_checks_owner() {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::default();
        let user = funded_user(&store, 100_000).await;
        let placed = place_order(&store, &provider, &config(&[]), user.id, order(100))
            .await
            .unwrap();

        let query = OrderStatusQuery {
            order: placed.order.id.to_string(),
            action: Some("add".into()),
        };
        let status = relay_status(&store, &provider, user.id, false, &query)
            .await
            .unwrap();
        assert_eq!(status["status"], "In progress");
        assert_eq!(
            provider.calls.lock().unwrap().last().map(String::as_str),
            Some("status:9001")
        );

        let by_provider_id = OrderStatusQuery {
            order: "9001".into(),
            action: None,
        };
        let err = relay_status(&store, &provider, Uuid::new_v4(), false, &by_provider_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        relay_status(&store, &provider, Uuid::new_v4(), true, &by_provider_id)
            .await
            .unwrap();
    }
}
