//! In-memory `LedgerStore`.
//!
//! All tables live behind one async mutex, so every method is a single
//! critical section and therefore serializable. Methods that change more
//! than one record stage their changes on copies and only write them back
//! once every step has succeeded.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CompletedFunding, FundingCompletion, LedgerStore, StoreError};
use crate::models::{
    api_key::ApiKey,
    compensation::{Compensation, CompensationFilter, CompensationStatus, NewCompensation},
    deposit::{DepositClaim, DepositEvent, NewDeposit},
    funding::{FundingFilter, FundingRequest, FundingStatus, NewFundingRequest},
    order::{NewOrder, Order, OrderFilter, OrderStatus},
    transaction::{EntryKind, LedgerTransaction},
    user::{NewUser, User},
};

/// Failures the memory store can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `complete_funding` fails after the deposit was marked used and before
    /// the balance is credited.
    FundingCredit,
    /// `apply_compensation` fails before crediting.
    CompensationApply,
    /// Every call fails as if the store were unreachable.
    Offline,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    api_keys: HashMap<String, ApiKey>,
    deposits: HashMap<String, DepositEvent>,
    funding: HashMap<Uuid, FundingRequest>,
    orders: HashMap<Uuid, Order>,
    ledger: Vec<LedgerTransaction>,
    compensations: HashMap<Uuid, Compensation>,
    faults: HashSet<Fault>,
}

impl Inner {
    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.faults.contains(&Fault::Offline) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        if fault != Fault::Offline && self.faults.contains(&fault) {
            return Err(StoreError::Unavailable(format!("injected fault: {fault:?}")));
        }
        Ok(())
    }

    fn online(&self) -> Result<(), StoreError> {
        self.check(Fault::Offline)
    }

    fn utr_completed(&self, utr: &str) -> bool {
        self.funding
            .values()
            .any(|r| r.utr == utr && r.status == FundingStatus::Completed)
    }

    fn user(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }

    fn ledger_entry(
        user_id: Uuid,
        kind: EntryKind,
        amount_paise: i64,
        reference: String,
        description: String,
    ) -> LedgerTransaction {
        LedgerTransaction {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount_paise,
            reference,
            description: Some(description),
            created_at: Utc::now(),
        }
    }
}

fn credit(user: &mut User, amount_paise: i64) -> Result<i64, StoreError> {
    user.balance_paise = user
        .balance_paise
        .checked_add(amount_paise)
        .ok_or_else(|| StoreError::Conflict("balance overflow".to_string()))?;
    user.updated_at = Utc::now();
    Ok(user.balance_paise)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inject(&self, fault: Fault) {
        self.inner.lock().await.faults.insert(fault);
    }

    pub async fn clear_faults(&self) {
        self.inner.lock().await.faults.clear();
    }

    /// Overwrite a balance directly. Fixture setup only.
    pub async fn seed_balance(&self, user_id: Uuid, balance_paise: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?;
        user.balance_paise = balance_paise;
        Ok(())
    }

    /// Insert a deposit row as-is, bypassing merge rules. Fixture setup only.
    pub async fn seed_deposit(&self, deposit: DepositEvent) {
        let mut inner = self.inner.lock().await;
        inner.deposits.insert(deposit.utr.clone(), deposit);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.lock().await.online()
    }

    async fn create_user(&self, user: NewUser, key_hash: &str) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        if inner.api_keys.contains_key(key_hash) {
            return Err(StoreError::Conflict("API key already registered".to_string()));
        }
        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            display_name: user.display_name,
            role: user.role,
            balance_paise: 0,
            created_at: now,
            updated_at: now,
        };
        inner.api_keys.insert(
            key_hash.to_string(),
            ApiKey {
                id: Uuid::new_v4(),
                user_id: record.id,
                key_hash: key_hash.to_string(),
                label: "default".to_string(),
                created_at: now,
                is_active: true,
            },
        );
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner
            .api_keys
            .get(key_hash)
            .filter(|key| key.is_active)
            .and_then(|key| inner.users.get(&key.user_id).cloned()))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn upsert_deposit(&self, deposit: NewDeposit) -> Result<DepositEvent, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let now = Utc::now();
        let record = inner
            .deposits
            .entry(deposit.utr.clone())
            .and_modify(|existing| {
                if !existing.is_used {
                    existing.amount_paise = deposit.amount_paise;
                }
                if deposit.original_message.is_some() {
                    existing.original_message = deposit.original_message.clone();
                }
                existing.verified_at = now;
            })
            .or_insert_with(|| DepositEvent {
                utr: deposit.utr.clone(),
                amount_paise: deposit.amount_paise,
                original_message: deposit.original_message.clone(),
                verified_at: now,
                is_used: false,
                used_by: None,
                used_at: None,
            });
        Ok(record.clone())
    }

    async fn get_deposit(&self, utr: &str) -> Result<Option<DepositEvent>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner.deposits.get(utr).cloned())
    }

    async fn submit_funding_request(
        &self,
        request: NewFundingRequest,
    ) -> Result<FundingRequest, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        if inner.utr_completed(&request.utr) {
            return Err(StoreError::Conflict(format!(
                "UTR {} has already been used",
                request.utr
            )));
        }
        inner.user(request.user_id)?;
        let now = Utc::now();

        let revivable = inner
            .funding
            .values()
            .filter(|r| {
                r.user_id == request.user_id
                    && r.utr == request.utr
                    && matches!(r.status, FundingStatus::Pending | FundingStatus::Rejected)
            })
            .max_by_key(|r| r.created_at)
            .map(|r| r.id);

        let record = match revivable.and_then(|id| inner.funding.get_mut(&id)) {
            Some(existing) => {
                existing.amount_paise = request.amount_paise;
                existing.status = FundingStatus::Pending;
                existing.method = request.method;
                existing.created_at = now;
                existing.updated_at = now;
                existing.rejected_at = None;
                existing.clone()
            }
            None => {
                let record = FundingRequest {
                    id: Uuid::new_v4(),
                    user_id: request.user_id,
                    utr: request.utr,
                    amount_paise: request.amount_paise,
                    status: FundingStatus::Pending,
                    method: request.method,
                    created_at: now,
                    updated_at: now,
                    approved_at: None,
                    rejected_at: None,
                };
                inner.funding.insert(record.id, record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn get_funding_request(&self, id: Uuid) -> Result<Option<FundingRequest>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner.funding.get(&id).cloned())
    }

    async fn completed_funding_for_utr(
        &self,
        utr: &str,
    ) -> Result<Option<FundingRequest>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner
            .funding
            .values()
            .find(|r| r.utr == utr && r.status == FundingStatus::Completed)
            .cloned())
    }

    async fn pending_funding_for_utr(
        &self,
        utr: &str,
        user_id: Option<Uuid>,
    ) -> Result<Option<FundingRequest>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner
            .funding
            .values()
            .filter(|r| r.utr == utr && r.status == FundingStatus::Pending)
            .filter(|r| user_id.is_none_or(|id| r.user_id == id))
            .min_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn list_funding_requests(
        &self,
        filter: FundingFilter,
    ) -> Result<Vec<FundingRequest>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        let mut out: Vec<FundingRequest> = inner
            .funding
            .values()
            .filter(|r| filter.user_id.is_none_or(|id| r.user_id == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn reject_funding_request(&self, id: Uuid) -> Result<FundingRequest, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let request = inner
            .funding
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Funding request".to_string()))?;
        if request.status != FundingStatus::Pending {
            return Err(StoreError::Conflict(
                "only pending funding requests can be rejected".to_string(),
            ));
        }
        let now = Utc::now();
        request.status = FundingStatus::Rejected;
        request.rejected_at = Some(now);
        request.updated_at = now;
        Ok(request.clone())
    }

    async fn mark_funding_completed(
        &self,
        id: Uuid,
        method: &str,
    ) -> Result<FundingRequest, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let mut request = inner
            .funding
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Funding request".to_string()))?;
        if request.status != FundingStatus::Pending {
            return Err(StoreError::Conflict(
                "funding request is no longer pending".to_string(),
            ));
        }
        if inner.utr_completed(&request.utr) {
            return Err(StoreError::Conflict(
                "UTR already completed a funding request".to_string(),
            ));
        }
        let used_by_owner = inner
            .deposits
            .get(&request.utr)
            .is_some_and(|d| d.is_used && d.used_by == Some(request.user_id));
        if !used_by_owner {
            return Err(StoreError::Conflict(
                "deposit is not credited to this user".to_string(),
            ));
        }
        let now = Utc::now();
        request.status = FundingStatus::Completed;
        request.method = method.to_string();
        request.approved_at = Some(now);
        request.updated_at = now;
        inner.funding.insert(request.id, request.clone());
        Ok(request)
    }

    async fn complete_funding(
        &self,
        completion: FundingCompletion,
    ) -> Result<CompletedFunding, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let now = Utc::now();

        let mut request = inner
            .funding
            .get(&completion.request_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Funding request".to_string()))?;
        if request.status != FundingStatus::Pending {
            return Err(StoreError::Conflict(
                "funding request is no longer pending".to_string(),
            ));
        }
        if request.user_id != completion.user_id || request.utr != completion.utr {
            return Err(StoreError::Conflict(
                "funding request does not belong to this user and UTR".to_string(),
            ));
        }
        if inner.utr_completed(&completion.utr) {
            return Err(StoreError::Conflict(
                "UTR already completed a funding request".to_string(),
            ));
        }

        let mut deposit = match (inner.deposits.get(&completion.utr), &completion.deposit) {
            (Some(existing), _) => existing.clone(),
            (None, DepositClaim::MustExist) => {
                return Err(StoreError::NotFound("Deposit".to_string()));
            }
            (
                None,
                DepositClaim::CreateIfMissing {
                    amount_paise,
                    original_message,
                },
            ) => DepositEvent {
                utr: completion.utr.clone(),
                amount_paise: *amount_paise,
                original_message: Some(original_message.clone()),
                verified_at: now,
                is_used: false,
                used_by: None,
                used_at: None,
            },
        };
        if deposit.is_used {
            return Err(StoreError::Conflict("deposit already used".to_string()));
        }
        deposit.is_used = true;
        deposit.used_by = Some(completion.user_id);
        deposit.used_at = Some(now);

        request.status = FundingStatus::Completed;
        request.method = completion.method.clone();
        request.approved_at = Some(now);
        request.updated_at = now;

        let mut user = inner.user(completion.user_id)?;
        inner.check(Fault::FundingCredit)?;
        let new_balance_paise = credit(&mut user, completion.credit_paise)?;

        let entry = Inner::ledger_entry(
            user.id,
            EntryKind::Credit,
            completion.credit_paise,
            completion.utr.clone(),
            format!("wallet funding via {}", completion.method),
        );

        inner.deposits.insert(deposit.utr.clone(), deposit.clone());
        inner.funding.insert(request.id, request.clone());
        inner.users.insert(user.id, user);
        inner.ledger.push(entry);

        Ok(CompletedFunding {
            request,
            deposit,
            new_balance_paise,
        })
    }

    async fn debit_balance(&self, user_id: Uuid, amount_paise: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?;
        if user.balance_paise < amount_paise {
            return Err(StoreError::InsufficientBalance {
                needed: amount_paise,
                available: user.balance_paise,
            });
        }
        user.balance_paise -= amount_paise;
        user.updated_at = Utc::now();
        Ok(user.balance_paise)
    }

    async fn record_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        inner.user(order.user_id)?;
        if let Some(provider_id) = order.provider_order_id.as_deref() {
            if inner
                .orders
                .values()
                .any(|o| o.provider_order_id.as_deref() == Some(provider_id))
            {
                return Err(StoreError::Conflict(format!(
                    "provider order {provider_id} already recorded"
                )));
            }
        }
        let now = Utc::now();
        let record = Order {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            service_id: order.service_id,
            link: order.link,
            quantity: order.quantity,
            charge_paise: order.charge_paise,
            status: order.status,
            provider_order_id: order.provider_order_id,
            created_at: now,
            updated_at: now,
        };
        let entry = Inner::ledger_entry(
            record.user_id,
            EntryKind::Debit,
            record.charge_paise,
            record.id.to_string(),
            format!("order for service {}", record.service_id),
        );
        inner.orders.insert(record.id, record.clone());
        inner.ledger.push(entry);
        Ok(record)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn order_by_provider_id(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner
            .orders
            .values()
            .find(|o| o.provider_order_id.as_deref() == Some(provider_order_id))
            .cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        let mut out: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| filter.user_id.is_none_or(|id| o.user_id == id))
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Order".to_string()))?;
        if order.status != from {
            return Err(StoreError::Conflict(format!(
                "order is {:?}, expected {:?}",
                order.status, from
            )));
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn mark_order_placed(
        &self,
        id: Uuid,
        provider_order_id: &str,
    ) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Order".to_string()))?;
        if order.status != OrderStatus::Approving {
            return Err(StoreError::Conflict(
                "order is not being approved".to_string(),
            ));
        }
        order.status = OrderStatus::Processing;
        order.provider_order_id = Some(provider_order_id.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn refund_order(&self, id: Uuid) -> Result<(Order, i64), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let mut order = inner
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Order".to_string()))?;
        if order.status != OrderStatus::PendingApproval {
            return Err(StoreError::Conflict(
                "only orders pending approval can be refunded".to_string(),
            ));
        }
        let mut user = inner.user(order.user_id)?;
        let new_balance = credit(&mut user, order.charge_paise)?;
        order.status = OrderStatus::CanceledRefunded;
        order.updated_at = Utc::now();

        let entry = Inner::ledger_entry(
            user.id,
            EntryKind::Credit,
            order.charge_paise,
            order.id.to_string(),
            "refund for rejected order".to_string(),
        );
        inner.users.insert(user.id, user);
        inner.orders.insert(order.id, order.clone());
        inner.ledger.push(entry);
        Ok((order, new_balance))
    }

    async fn open_compensation(
        &self,
        compensation: NewCompensation,
    ) -> Result<Compensation, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let record = Compensation {
            id: Uuid::new_v4(),
            user_id: compensation.user_id,
            amount_paise: compensation.amount_paise,
            reason: compensation.reason,
            status: CompensationStatus::Pending,
            created_at: Utc::now(),
            applied_at: None,
        };
        inner.compensations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn apply_compensation(&self, id: Uuid) -> Result<(Compensation, i64), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.online()?;
        let mut compensation = inner
            .compensations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Compensation".to_string()))?;
        if compensation.status != CompensationStatus::Pending {
            return Err(StoreError::Conflict(
                "compensation already applied".to_string(),
            ));
        }
        inner.check(Fault::CompensationApply)?;
        let mut user = inner.user(compensation.user_id)?;
        let new_balance = credit(&mut user, compensation.amount_paise)?;
        compensation.status = CompensationStatus::Applied;
        compensation.applied_at = Some(Utc::now());

        inner.users.insert(user.id, user);
        inner.compensations.insert(compensation.id, compensation.clone());
        Ok((compensation, new_balance))
    }

    async fn list_compensations(
        &self,
        filter: CompensationFilter,
    ) -> Result<Vec<Compensation>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        let mut out: Vec<Compensation> = inner
            .compensations
            .values()
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        inner.online()?;
        Ok(inner
            .ledger
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }
}
