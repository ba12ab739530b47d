//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and resolve it to a user through the store
//! 3. Inject an [`AuthContext`] into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! Handlers take the context explicitly; there is no ambient notion of
//! "current user" or admin mode anywhere else.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{error::AppError, models::user::Role, state::AppState};

/// Who is making the request.
///
/// Inserted into the request's extension map and extracted by route
/// handlers with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.user_id, "non-admin attempted an admin action");
            Err(AppError::Forbidden("admin role required".into()))
        }
    }

    /// The user a request acts on.
    ///
    /// Bodies may name a `userId`; only admins may name someone other than
    /// themselves.
    pub fn acting_user(&self, requested: Option<Uuid>) -> Result<Uuid, AppError> {
        match requested {
            None => Ok(self.user_id),
            Some(id) if id == self.user_id || self.is_admin() => Ok(id),
            Some(id) => {
                tracing::warn!(caller = %self.user_id, target = %id, "cross-user request refused");
                Err(AppError::Forbidden("cannot act on behalf of another user".into()))
            }
        }
    }
}

/// SHA-256 of an API key, hex encoded. Only this hash is ever stored.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// API key authentication middleware function.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer 5f2c...e91a
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated (calls the next handler)
/// - `Err(AppError::InvalidApiKey)` otherwise (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            tracing::warn!(path = %request.uri().path(), "missing bearer token");
            AppError::InvalidApiKey
        })?;

    let key_hash = hash_api_key(api_key);

    let user = state
        .store
        .user_by_key_hash(&key_hash)
        .await?
        .ok_or_else(|| {
            tracing::warn!(path = %request.uri().path(), "unknown API key");
            AppError::InvalidApiKey
        })?;

    request.extensions_mut().insert(AuthContext {
        user_id: user.id,
        display_name: user.display_name,
        role: user.role,
    });

    Ok(next.run(request).await)
}
