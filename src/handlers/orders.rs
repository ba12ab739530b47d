//! Order HTTP handlers.
//!
//! - POST /api/v1/orders - price, pay for and place an order
//! - GET /api/v1/orders - the caller's orders
//! - GET /api/v1/orders/{id} - one of the caller's orders
//! - GET|POST /api/v1/orders/status - provider status relay

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::order::{
        OrderFilter, OrderResponse, OrderStatusQuery, PlaceOrderRequest, PlaceOrderResponse,
    },
    money::from_paise,
    services::order_service,
    state::AppState,
};

/// Place an order.
///
/// # Endpoint
///
/// `POST /api/v1/orders`
///
/// # Request Body
///
/// ```json
/// { "serviceId": 1021, "link": "https://instagram.com/p/abc", "quantity": 1000 }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**:
///   `{"success": true, "orderId": "23501", "status": "processing", "charge": 270.0, "newBalance": 730.0}`
/// - **Error (404)**: unknown service
/// - **Error (422)**: insufficient balance, nothing debited
/// - **Error (500)**: provider API not configured
/// - **Error (502)**: provider refused the order; the charge was refunded
pub async fn place_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>, AppError> {
    let user_id = auth.acting_user(request.user_id)?;
    let placed = order_service::place_order(
        state.store.as_ref(),
        state.provider.as_ref(),
        &state.config,
        user_id,
        request,
    )
    .await?;

    let order_id = placed
        .order
        .provider_order_id
        .clone()
        .unwrap_or_else(|| placed.order.id.to_string());

    Ok(Json(PlaceOrderResponse {
        success: true,
        order_id,
        status: placed.order.status,
        charge: from_paise(placed.order.charge_paise),
        new_balance: from_paise(placed.new_balance_paise),
    }))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let filter = OrderFilter {
        user_id: Some(auth.user_id),
        ..filter
    };
    let orders = state.store.list_orders(filter).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// Orders of other users are reported as not found.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .store
        .get_order(id)
        .await?
        .filter(|o| o.user_id == auth.user_id || auth.is_admin())
        .ok_or_else(|| AppError::NotFound("Order".into()))?;
    Ok(Json(order.into()))
}

/// Status relay, query string form: `GET /api/v1/orders/status?order=23501`.
pub async fn order_status_query(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<OrderStatusQuery>,
) -> Result<Json<Value>, AppError> {
    relay(&state, &auth, &query).await
}

/// Status relay, JSON body form: `{"order": "23501"}`.
pub async fn order_status_body(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(query): Json<OrderStatusQuery>,
) -> Result<Json<Value>, AppError> {
    relay(&state, &auth, &query).await
}

async fn relay(
    state: &AppState,
    auth: &AuthContext,
    query: &OrderStatusQuery,
) -> Result<Json<Value>, AppError> {
    let status = order_service::relay_status(
        state.store.as_ref(),
        state.provider.as_ref(),
        auth.user_id,
        auth.is_admin(),
        query,
    )
    .await?;
    Ok(Json(status))
}
