//! Admin-only operations: manual funding decisions, approval of held
//! orders, compensation replay and user provisioning.
//!
//! Callers check `AuthContext::require_admin` before reaching this module.

use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::hash_api_key;
use crate::models::compensation::Compensation;
use crate::models::deposit::DepositClaim;
use crate::models::funding::{ApproveFundingRequest, FundingRequest, FundingStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::user::{CreateUserRequest, CreatedUserResponse, NewUser, Role};
use crate::money::to_paise;
use crate::services::provider::SmmProvider;
use crate::store::{CompletedFunding, FundingCompletion, LedgerStore, StoreError};

pub const METHOD_ADMIN: &str = "admin_manual";

/// Approve a pending funding request without waiting for a match.
///
/// Credits the override amount if one is given, else the unused deposit's
/// amount, else the requested amount. When no SMS arrived for the UTR a
/// deposit is recorded as already used, so a late SMS cannot credit the
/// UTR a second time.
pub async fn approve_funding(
    store: &dyn LedgerStore,
    admin_id: Uuid,
    request_id: Uuid,
    body: ApproveFundingRequest,
) -> Result<CompletedFunding, AppError> {
    let request = store
        .get_funding_request(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Funding request".into()))?;
    if request.status != FundingStatus::Pending {
        return Err(AppError::Conflict(
            "only pending funding requests can be approved".into(),
        ));
    }

    let override_paise = match body.amount {
        Some(amount) => Some(
            to_paise(amount)
                .filter(|p| *p > 0)
                .ok_or_else(|| AppError::InvalidRequest("amount must be positive".into()))?,
        ),
        None => None,
    };
    let deposit = store.get_deposit(&request.utr).await?;
    if deposit.as_ref().is_some_and(|d| d.is_used) {
        return Err(AppError::Conflict(format!(
            "deposit for UTR {} has already been used",
            request.utr
        )));
    }
    let credit_paise = override_paise
        .or(deposit.map(|d| d.amount_paise))
        .unwrap_or(request.amount_paise);

    let completed = store
        .complete_funding(FundingCompletion {
            request_id: request.id,
            user_id: request.user_id,
            utr: request.utr.clone(),
            credit_paise,
            method: METHOD_ADMIN.to_string(),
            deposit: DepositClaim::CreateIfMissing {
                amount_paise: credit_paise,
                original_message: format!("approved manually by admin {admin_id}"),
            },
        })
        .await?;

    tracing::info!(
        %admin_id,
        request_id = %request.id,
        user_id = %request.user_id,
        credit_paise,
        "funding request approved manually"
    );
    Ok(completed)
}

pub async fn reject_funding(
    store: &dyn LedgerStore,
    admin_id: Uuid,
    request_id: Uuid,
) -> Result<FundingRequest, AppError> {
    let rejected = store.reject_funding_request(request_id).await?;
    tracing::info!(%admin_id, %request_id, "funding request rejected");
    Ok(rejected)
}

/// Place a held order with the provider.
///
/// The order is claimed (`PendingApproval -> Approving`) before the provider
/// is called, so a second approval of the same order is a conflict and never
/// reaches the panel. A provider failure releases the claim and leaves the
/// order pending; rejecting it refunds.
pub async fn approve_order(
    store: &dyn LedgerStore,
    provider: &dyn SmmProvider,
    admin_id: Uuid,
    order_id: Uuid,
) -> Result<Order, AppError> {
    let order = store
        .transition_order(order_id, OrderStatus::PendingApproval, OrderStatus::Approving)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                AppError::Conflict("order is not pending approval".into())
            }
            other => other.into(),
        })?;

    let provider_order_id = match provider
        .add_order(order.service_id, &order.link, order.quantity)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(%order_id, error = %e, "provider refused approved order");
            if let Err(release) = store
                .transition_order(order_id, OrderStatus::Approving, OrderStatus::PendingApproval)
                .await
            {
                tracing::error!(%order_id, error = %release, "could not release approval claim");
            }
            return Err(e.into());
        }
    };

    let placed = store.mark_order_placed(order.id, &provider_order_id).await?;
    tracing::info!(%admin_id, %order_id, %provider_order_id, "held order placed");
    Ok(placed)
}

/// Refund a held order. Returns the order and the owner's new balance in paise.
pub async fn reject_order(
    store: &dyn LedgerStore,
    admin_id: Uuid,
    order_id: Uuid,
) -> Result<(Order, i64), AppError> {
    let (order, new_balance) = store.refund_order(order_id).await?;
    tracing::info!(
        %admin_id,
        %order_id,
        user_id = %order.user_id,
        refunded_paise = order.charge_paise,
        "held order rejected and refunded"
    );
    Ok((order, new_balance))
}

/// Apply a compensation that was left pending. Applying twice is a conflict.
pub async fn replay_compensation(
    store: &dyn LedgerStore,
    admin_id: Uuid,
    compensation_id: Uuid,
) -> Result<(Compensation, i64), AppError> {
    let (applied, new_balance) = store.apply_compensation(compensation_id).await?;
    tracing::info!(
        %admin_id,
        %compensation_id,
        user_id = %applied.user_id,
        amount_paise = applied.amount_paise,
        "compensation replayed"
    );
    Ok((applied, new_balance))
}

/// 64 hex characters (32 random bytes).
fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Create a user and its first API key. The key is only returned here.
pub async fn create_user(
    store: &dyn LedgerStore,
    request: CreateUserRequest,
) -> Result<CreatedUserResponse, AppError> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::InvalidRequest("displayName is required".into()));
    }

    let api_key = generate_api_key();
    let user = store
        .create_user(
            NewUser {
                display_name: display_name.to_string(),
                role: request.role,
            },
            &hash_api_key(&api_key),
        )
        .await?;
    tracing::info!(user_id = %user.id, role = ?user.role, "user provisioned");

    Ok(CreatedUserResponse {
        user_id: user.id,
        display_name: user.display_name,
        role: user.role,
        api_key,
    })
}

/// Make sure an admin owning `api_key` exists. Used at startup.
pub async fn ensure_admin(store: &dyn LedgerStore, api_key: &str) -> Result<Uuid, AppError> {
    let key_hash = hash_api_key(api_key);
    if let Some(user) = store.user_by_key_hash(&key_hash).await? {
        if user.role != Role::Admin {
            return Err(AppError::Config(
                "BOOTSTRAP_ADMIN_KEY belongs to a non-admin user".into(),
            ));
        }
        return Ok(user.id);
    }
    let user = store
        .create_user(
            NewUser {
                display_name: "admin".into(),
                role: Role::Admin,
            },
            &key_hash,
        )
        .await?;
    tracing::info!(user_id = %user.id, "bootstrap admin created");
    Ok(user.id)
}
