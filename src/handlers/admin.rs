//! Admin HTTP handlers.
//!
//! Every handler starts with `auth.require_admin()`; the routes sit behind
//! the same API key middleware as user routes.
//!
//! - GET /api/v1/admin/funding-requests
//! - POST /api/v1/admin/funding-requests/{id}/approve
//! - POST /api/v1/admin/funding-requests/{id}/reject
//! - GET /api/v1/admin/orders
//! - POST /api/v1/admin/orders/{id}/approve
//! - POST /api/v1/admin/orders/{id}/reject
//! - GET /api/v1/admin/compensations
//! - POST /api/v1/admin/compensations/{id}/replay
//! - POST /api/v1/admin/users

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        compensation::{CompensationFilter, CompensationResponse},
        funding::{ApproveFundingRequest, FundingFilter, FundingRequestResponse},
        order::{OrderFilter, OrderResponse},
        user::{CreateUserRequest, CreatedUserResponse},
    },
    money::from_paise,
    services::admin_service,
    state::AppState,
};

/// A record together with the affected user's balance after the change.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithBalance<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
}

impl<T> WithBalance<T> {
    fn new(record: impl Into<T>, new_balance_paise: i64) -> Self {
        Self {
            record: record.into(),
            new_balance: from_paise(new_balance_paise),
        }
    }
}

pub async fn list_funding_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<FundingFilter>,
) -> Result<Json<Vec<FundingRequestResponse>>, AppError> {
    auth.require_admin()?;
    let records = state.store.list_funding_requests(filter).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Approve a funding request by hand.
///
/// # Request Body (optional)
///
/// ```json
/// { "amount": 495 }
/// ```
///
/// # Response
///
/// - **200**: the completed request with the user's new balance
/// - **404**: unknown request
/// - **409**: request not pending, or its UTR was already used
pub async fn approve_funding_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveFundingRequest>>,
) -> Result<Json<WithBalance<FundingRequestResponse>>, AppError> {
    auth.require_admin()?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let done = admin_service::approve_funding(state.store.as_ref(), auth.user_id, id, body).await?;
    Ok(Json(WithBalance::new(done.request, done.new_balance_paise)))
}

pub async fn reject_funding_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<FundingRequestResponse>, AppError> {
    auth.require_admin()?;
    let rejected = admin_service::reject_funding(state.store.as_ref(), auth.user_id, id).await?;
    Ok(Json(rejected.into()))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    auth.require_admin()?;
    let orders = state.store.list_orders(filter).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// Place a held order upstream. A provider failure (502) leaves it held.
pub async fn approve_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    auth.require_admin()?;
    let order = admin_service::approve_order(
        state.store.as_ref(),
        state.provider.as_ref(),
        auth.user_id,
        id,
    )
    .await?;
    Ok(Json(order.into()))
}

/// Cancel a held order and refund its charge.
pub async fn reject_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<WithBalance<OrderResponse>>, AppError> {
    auth.require_admin()?;
    let (order, new_balance) =
        admin_service::reject_order(state.store.as_ref(), auth.user_id, id).await?;
    Ok(Json(WithBalance::new(order, new_balance)))
}

/// `?status=pending` lists refunds that still need a replay.
pub async fn list_compensations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<CompensationFilter>,
) -> Result<Json<Vec<CompensationResponse>>, AppError> {
    auth.require_admin()?;
    let records = state.store.list_compensations(filter).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn replay_compensation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<WithBalance<CompensationResponse>>, AppError> {
    auth.require_admin()?;
    let (applied, new_balance) =
        admin_service::replay_compensation(state.store.as_ref(), auth.user_id, id).await?;
    Ok(Json(WithBalance::new(applied, new_balance)))
}

/// Provision a user.
///
/// # Request Body
///
/// ```json
/// { "displayName": "Priya", "role": "user" }
/// ```
///
/// # Response (201 Created)
///
/// Contains `apiKey`. It is not stored and cannot be shown again.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), AppError> {
    auth.require_admin()?;
    let created = admin_service::create_user(state.store.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
