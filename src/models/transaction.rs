//! Ledger transaction records.
//!
//! These rows are an audit trail written in the same store transaction as
//! the balance change they describe. They are never used to compute the
//! balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_paise;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
}

/// Represents a ledger transaction record from the database.
///
/// # Database Table
///
/// Maps to the `ledger_transactions` table. `reference` is the UTR for
/// funding credits and the local order id for order debits and refunds.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,

    /// Always positive; the direction is given by `kind`
    pub amount_paise: i64,

    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response returned for ledger listings.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "770e8400-e29b-41d4-a716-446655440002",
///   "kind": "debit",
///   "amount": 300.0,
///   "reference": "5b0c...",
///   "description": "order for service 1021",
///   "createdAt": "2025-12-21T16:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransactionResponse {
    pub id: Uuid,
    pub kind: EntryKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerTransaction> for LedgerTransactionResponse {
    fn from(entry: LedgerTransaction) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind,
            amount: from_paise(entry.amount_paise),
            reference: entry.reference,
            description: entry.description,
            created_at: entry.created_at,
        }
    }
}
