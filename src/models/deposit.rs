//! Bank deposit events derived from inbound SMS notifications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bank-side credit, keyed by its UTR.
///
/// # Database Table
///
/// Maps to the `bank_deposits` table, primary key `utr`. Repeated SMS
/// deliveries for the same UTR merge into the same row; `is_used` goes
/// from `false` to `true` once and is never reset.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DepositEvent {
    pub utr: String,
    pub amount_paise: i64,
    pub original_message: Option<String>,
    pub verified_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
}

/// A deposit as reported by one webhook delivery.
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub utr: String,
    pub amount_paise: i64,
    pub original_message: Option<String>,
}

/// How `complete_funding` treats the deposit row for the UTR.
#[derive(Debug, Clone)]
pub enum DepositClaim {
    /// The deposit must already exist and be unused (automatic matching).
    MustExist,
    /// Consume an unused deposit if one exists, otherwise record one that is
    /// used from the start (admin approval without an SMS).
    CreateIfMissing {
        amount_paise: i64,
        original_message: String,
    },
}

/// Body accepted by `POST /api/v1/webhooks/sms`.
///
/// Forwarder apps disagree on the name of the text field, so `message`,
/// `sms` and `text` are all accepted.
///
/// ```json
/// { "message": "Rs.500 credited to a/c XX12, UPI Ref 412345678901", "secret": "..." }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SmsWebhookPayload {
    #[serde(default)]
    pub utr: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sms: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl SmsWebhookPayload {
    /// First non-blank SMS body among `message`, `sms` and `text`.
    pub fn raw_text(&self) -> Option<&str> {
        [&self.message, &self.sms, &self.text]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .find(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDeposit {
    pub utr: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Response for every accepted webhook delivery, matched or not.
#[derive(Debug, Serialize)]
pub struct SmsWebhookResponse {
    pub success: bool,
    pub matched: bool,
    pub extracted: Option<ExtractedDeposit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
