//! Wallet views for the authenticated user.
//!
//! - GET /api/v1/me - balance and role
//! - GET /api/v1/ledger - credit and debit records, newest first

use axum::{Extension, Json, extract::State};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{transaction::LedgerTransactionResponse, user::BalanceResponse},
    state::AppState,
};

/// Current balance of the caller.
///
/// ```json
/// {
///   "userId": "550e8400-e29b-41d4-a716-446655440000",
///   "displayName": "Priya",
///   "role": "user",
///   "balance": 1250.5,
///   "updatedAt": "2025-12-20T10:00:00Z"
/// }
/// ```
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<BalanceResponse>, AppError> {
    let user = state
        .store
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".into()))?;
    Ok(Json(user.into()))
}

pub async fn ledger(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<LedgerTransactionResponse>>, AppError> {
    let entries = state.store.ledger_for_user(auth.user_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
