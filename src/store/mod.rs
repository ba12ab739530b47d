//! Persistence for users, funding requests, bank deposits, orders and the ledger.
//!
//! Every method that touches more than one record is atomic: the backend
//! runs it as one serializable unit that either commits completely or
//! leaves every record as it was. Callers never compose atomic sections
//! out of smaller calls.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    compensation::{Compensation, CompensationFilter, NewCompensation},
    deposit::{DepositClaim, DepositEvent, NewDeposit},
    funding::{FundingFilter, FundingRequest, NewFundingRequest},
    order::{NewOrder, Order, OrderFilter, OrderStatus},
    transaction::LedgerTransaction,
    user::{NewUser, User},
};

pub mod memory;
pub mod postgres;

pub use memory::{Fault, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A concurrent writer won, or the operation repeats a finished one.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Balances are in paise.
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: i64, available: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything `complete_funding` needs to settle one funding request.
#[derive(Debug, Clone)]
pub struct FundingCompletion {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub utr: String,
    /// Amount added to the balance, in paise
    pub credit_paise: i64,
    /// Provenance tag written to the request
    pub method: String,
    pub deposit: DepositClaim,
}

/// State after a successful `complete_funding`.
#[derive(Debug, Clone)]
pub struct CompletedFunding {
    pub request: FundingRequest,
    pub deposit: DepositEvent,
    pub new_balance_paise: i64,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    // ---- users -------------------------------------------------------

    /// Insert a user together with the hash of its first API key.
    async fn create_user(&self, user: NewUser, key_hash: &str) -> Result<User, StoreError>;

    /// Resolve an active API key hash to its user.
    async fn user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>, StoreError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    // ---- deposits ----------------------------------------------------

    /// Create or merge the deposit for `deposit.utr`.
    ///
    /// An existing `is_used = true` (and its `used_by`, `used_at`) is never
    /// reset; the amount of a used deposit is never changed.
    async fn upsert_deposit(&self, deposit: NewDeposit) -> Result<DepositEvent, StoreError>;

    async fn get_deposit(&self, utr: &str) -> Result<Option<DepositEvent>, StoreError>;

    // ---- funding requests --------------------------------------------

    /// Submit a funding request.
    ///
    /// Fails with `Conflict` when the UTR already completed a request.
    /// Revives the same user's pending or rejected request for the UTR
    /// (new amount, new timestamp, status pending) instead of inserting.
    async fn submit_funding_request(
        &self,
        request: NewFundingRequest,
    ) -> Result<FundingRequest, StoreError>;

    async fn get_funding_request(&self, id: Uuid) -> Result<Option<FundingRequest>, StoreError>;

    async fn completed_funding_for_utr(
        &self,
        utr: &str,
    ) -> Result<Option<FundingRequest>, StoreError>;

    /// Oldest pending request for the UTR, optionally restricted to one user.
    async fn pending_funding_for_utr(
        &self,
        utr: &str,
        user_id: Option<Uuid>,
    ) -> Result<Option<FundingRequest>, StoreError>;

    /// Newest first.
    async fn list_funding_requests(
        &self,
        filter: FundingFilter,
    ) -> Result<Vec<FundingRequest>, StoreError>;

    /// Pending -> rejected.
    async fn reject_funding_request(&self, id: Uuid) -> Result<FundingRequest, StoreError>;

    /// Pending -> completed without touching any balance.
    ///
    /// Only valid when the request's deposit is already used by the same
    /// user, which the store re-checks.
    async fn mark_funding_completed(
        &self,
        id: Uuid,
        method: &str,
    ) -> Result<FundingRequest, StoreError>;

    /// Atomically consume the deposit, complete the request, credit the
    /// balance and write a credit ledger record.
    async fn complete_funding(
        &self,
        completion: FundingCompletion,
    ) -> Result<CompletedFunding, StoreError>;

    // ---- balance and orders -------------------------------------------

    /// Check-then-decrement; returns the new balance in paise.
    async fn debit_balance(&self, user_id: Uuid, amount_paise: i64) -> Result<i64, StoreError>;

    /// Insert an order and its debit ledger record.
    async fn record_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn order_by_provider_id(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// Move an order from `from` to `to` if, and only if, it is still in
    /// `from`. Conflict otherwise.
    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, StoreError>;

    /// Approving -> processing, with the provider's order id.
    async fn mark_order_placed(
        &self,
        id: Uuid,
        provider_order_id: &str,
    ) -> Result<Order, StoreError>;

    /// Pending approval -> canceled-refunded, crediting the charge back and
    /// writing a credit ledger record. Returns the order and new balance.
    async fn refund_order(&self, id: Uuid) -> Result<(Order, i64), StoreError>;

    // ---- compensations -----------------------------------------------

    async fn open_compensation(
        &self,
        compensation: NewCompensation,
    ) -> Result<Compensation, StoreError>;

    /// Credit a pending compensation and mark it applied. Applying twice is a conflict.
    async fn apply_compensation(&self, id: Uuid) -> Result<(Compensation, i64), StoreError>;

    async fn list_compensations(
        &self,
        filter: CompensationFilter,
    ) -> Result<Vec<Compensation>, StoreError>;

    // ---- ledger ------------------------------------------------------

    /// Newest first.
    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError>;
}

pub fn memory() -> Arc<dyn LedgerStore> {
    Arc::new(MemoryStore::default())
}

pub fn postgres(pool: crate::db::DbPool) -> Arc<dyn LedgerStore> {
    Arc::new(PgStore::new(pool))
}
