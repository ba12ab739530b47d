//! User data models and API request/response types.
//!
//! This module defines:
//! - `User`: Database entity holding the wallet balance
//! - `Role`: Whether a user may act on behalf of others
//! - `CreateUserRequest` / `CreatedUserResponse`: admin provisioning
//! - `BalanceResponse`: Response body for `GET /api/v1/me`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_paise;

/// Access level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Each user:
/// - Owns exactly one wallet (`balance_paise`)
/// - Authenticates through one or more rows in `api_keys`
///
/// # Balance Storage
///
/// The balance is stored in paise (1/100 rupee) and must be >= 0
/// (enforced by a database CHECK constraint). It is only ever changed by
/// atomic increments or checked decrements inside a store transaction.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub balance_paise: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub display_name: String,
    pub role: Role,
}

/// Request body for `POST /api/v1/admin/users`.
///
/// ```json
/// { "displayName": "Asha", "role": "user" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub display_name: String,

    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

/// Response for a freshly provisioned user.
///
/// The plain API key is only ever shown here; the store keeps its SHA-256 hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub api_key: String,
}

/// Response body for `GET /api/v1/me`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for BalanceResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name,
            role: user.role,
            balance: from_paise(user.balance_paise),
            updated_at: user.updated_at,
        }
    }
}
