//! Order models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::from_paise;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed upstream, waiting for the provider to start
    Pending,
    /// Placed upstream and in progress
    Processing,
    Completed,
    /// Charge returned to the wallet
    CanceledRefunded,
    /// Debited locally, waiting for an admin before going upstream
    PendingApproval,
    /// Claimed by an admin approval that is talking to the provider
    Approving,
}

/// Represents an order record from the database.
///
/// # Database Table
///
/// Maps to the `orders` table. Every order has exactly one `debit` row in
/// `ledger_transactions` (reference = order id) and, if refunded, one
/// `credit` row with the same reference.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: i64,
    pub link: String,
    pub quantity: i64,
    pub charge_paise: i64,
    pub status: OrderStatus,

    /// Order id returned by the provider; absent while pending approval
    pub provider_order_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to persist an order after its charge was debited.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub service_id: i64,
    pub link: String,
    pub quantity: i64,
    pub charge_paise: i64,
    pub status: OrderStatus,
    pub provider_order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

/// Request body for `POST /api/v1/orders`.
///
/// ```json
/// {
///   "serviceId": 1021,
///   "link": "https://instagram.com/p/abc",
///   "quantity": 1000
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub service_id: i64,
    pub link: String,
    pub quantity: i64,
}

/// Response body for a placed order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub success: bool,
    /// Provider order id, or the local id while the order awaits approval
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub charge: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
}

/// Query or body for the order status relay.
///
/// `action` is accepted but never forwarded: the relay always asks the
/// provider for `status`.
#[derive(Debug, Deserialize)]
pub struct OrderStatusQuery {
    pub order: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: i64,
    pub link: String,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub charge: Decimal,
    pub status: OrderStatus,
    pub provider_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            service_id: order.service_id,
            link: order.link,
            quantity: order.quantity,
            charge: from_paise(order.charge_paise),
            status: order.status,
            provider_order_id: order.provider_order_id,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}
