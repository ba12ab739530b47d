//! Funding request models.
//!
//! A funding request is a user's declaration "I paid amount X with bank
//! reference UTR". It stays `Pending` until a bank deposit with the same
//! UTR is matched against it, or an admin decides it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_paise;

/// Lifecycle of a funding request.
///
/// `Pending -> Completed` happens exactly once per UTR system-wide.
/// `Rejected -> Pending` happens when the owner resubmits the same UTR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FundingStatus {
    Pending,
    Completed,
    Rejected,
}

/// Represents a funding request record from the database.
///
/// # Database Table
///
/// Maps to the `funding_requests` table. A partial unique index on
/// `utr WHERE status = 'completed'` guarantees that a bank reference can
/// complete at most one request.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FundingRequest {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Bank reference, trimmed. Nominally 12 digits but not validated.
    pub utr: String,

    /// Amount the user claims to have paid, in paise
    pub amount_paise: i64,

    pub status: FundingStatus,

    /// Provenance tag, e.g. `upi_manual`, `sms_auto_match`, `admin_approval`
    pub method: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

/// Data needed to submit (or resubmit) a funding request.
#[derive(Debug, Clone)]
pub struct NewFundingRequest {
    pub user_id: Uuid,
    pub utr: String,
    pub amount_paise: i64,
    pub method: String,
}

/// Filter for listing funding requests. `None` means "any".
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<FundingStatus>,
}

/// Request body for `POST /api/v1/funding-requests`.
///
/// ```json
/// { "utr": "412345678901", "amount": 500 }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFundingRequest {
    pub utr: String,
    pub amount: Decimal,
    #[serde(default)]
    pub method: Option<String>,
}

/// Request body for `POST /api/v1/payments/verify`.
///
/// `userId` defaults to the caller. The stored request amount is what gets
/// compared against the deposit; `amount` is accepted for compatibility.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub utr: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// Response body for `POST /api/v1/payments/verify`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub credited: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub new_balance: Option<Decimal>,
}

/// Request body for `POST /api/v1/admin/funding-requests/{id}/approve`.
///
/// `amount` overrides the credited amount; by default the deposit amount
/// (when an SMS arrived) or the requested amount is credited.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveFundingRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRequestResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub utr: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub status: FundingStatus,
    pub method: String,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl From<FundingRequest> for FundingRequestResponse {
    fn from(request: FundingRequest) -> Self {
        Self {
            id: request.id,
            user_id: request.user_id,
            utr: request.utr,
            amount: from_paise(request.amount_paise),
            status: request.status,
            method: request.method,
            created_at: request.created_at,
            approved_at: request.approved_at,
            rejected_at: request.rejected_at,
        }
    }
}
