//! Pending refunds for orders the provider refused.
//!
//! A compensation row is written before the refund is attempted, so a refund
//! that fails (or a crash in between) leaves a durable record an admin can
//! replay.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_paise;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompensationStatus {
    Pending,
    Applied,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Compensation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_paise: i64,
    pub reason: String,
    pub status: CompensationStatus,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewCompensation {
    pub user_id: Uuid,
    pub amount_paise: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CompensationFilter {
    pub status: Option<CompensationStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub reason: String,
    pub status: CompensationStatus,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl From<Compensation> for CompensationResponse {
    fn from(c: Compensation) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            amount: from_paise(c.amount_paise),
            reason: c.reason,
            status: c.status,
            created_at: c.created_at,
            applied_at: c.applied_at,
        }
    }
}
