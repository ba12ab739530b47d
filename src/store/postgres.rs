//! PostgreSQL `LedgerStore`.
//!
//! Multi-record mutations run in `SERIALIZABLE` transactions and lock the
//! rows they read with `FOR UPDATE`. A transaction that loses a
//! serialization race is retried a few times before surfacing as a
//! conflict. Dropping a `sqlx::Transaction` without committing rolls it
//! back, so every early return below leaves the database untouched.

use std::future::Future;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{CompletedFunding, FundingCompletion, LedgerStore, StoreError};
use crate::db::DbPool;
use crate::models::{
    compensation::{Compensation, CompensationFilter, CompensationStatus, NewCompensation},
    deposit::{DepositClaim, DepositEvent, NewDeposit},
    funding::{FundingFilter, FundingRequest, FundingStatus, NewFundingRequest},
    order::{NewOrder, Order, OrderFilter, OrderStatus},
    transaction::{EntryKind, LedgerTransaction},
    user::{NewUser, User},
};

/// Attempts per serializable transaction before giving up with a conflict.
const MAX_ATTEMPTS: u32 = 3;

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn begin_serializable(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn try_submit_funding_request(
        &self,
        request: &NewFundingRequest,
    ) -> Result<FundingRequest, StoreError> {
        let mut tx = self.begin_serializable().await?;

        let completed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM funding_requests WHERE utr = $1 AND status = 'completed')",
        )
        .bind(&request.utr)
        .fetch_one(&mut *tx)
        .await?;
        if completed {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!(
                "UTR {} has already been used",
                request.utr
            )));
        }

        let revivable: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM funding_requests
            WHERE user_id = $1 AND utr = $2 AND status IN ('pending', 'rejected')
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(request.user_id)
        .bind(&request.utr)
        .fetch_optional(&mut *tx)
        .await?;

        let record = match revivable {
            Some(id) => {
                sqlx::query_as::<_, FundingRequest>(
                    r#"
                    UPDATE funding_requests
                    SET amount_paise = $1,
                        method = $2,
                        status = 'pending',
                        rejected_at = NULL,
                        created_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $3
                    RETURNING *
                    "#,
                )
                .bind(request.amount_paise)
                .bind(&request.method)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, FundingRequest>(
                    r#"
                    INSERT INTO funding_requests (user_id, utr, amount_paise, method, status)
                    VALUES ($1, $2, $3, $4, 'pending')
                    RETURNING *
                    "#,
                )
                .bind(request.user_id)
                .bind(&request.utr)
                .bind(request.amount_paise)
                .bind(&request.method)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(record)
    }

    async fn try_mark_funding_completed(
        &self,
        id: Uuid,
        method: &str,
    ) -> Result<FundingRequest, StoreError> {
        let mut tx = self.begin_serializable().await?;

        let request = sqlx::query_as::<_, FundingRequest>(
            "SELECT * FROM funding_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("Funding request".to_string()))?;
        if request.status != FundingStatus::Pending {
            return Err(StoreError::Conflict(
                "funding request is no longer pending".to_string(),
            ));
        }

        let deposit = sqlx::query_as::<_, DepositEvent>(
            "SELECT * FROM bank_deposits WHERE utr = $1 FOR UPDATE",
        )
        .bind(&request.utr)
        .fetch_optional(&mut *tx)
        .await?;
        let used_by_owner = deposit
            .as_ref()
            .is_some_and(|d| d.is_used && d.used_by == Some(request.user_id));
        if !used_by_owner {
            return Err(StoreError::Conflict(
                "deposit is not credited to this user".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, FundingRequest>(
            r#"
            UPDATE funding_requests
            SET status = 'completed', method = $1, approved_at = NOW(), updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(method)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn try_complete_funding(
        &self,
        completion: &FundingCompletion,
    ) -> Result<CompletedFunding, StoreError> {
        let mut tx = self.begin_serializable().await?;

        let request = sqlx::query_as::<_, FundingRequest>(
            "SELECT * FROM funding_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(completion.request_id)
        .fetch_optional(&mut *tx)
        .await?
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

        let completed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM funding_requests WHERE utr = $1 AND status = 'completed')",
        )
        .bind(&completion.utr)
        .fetch_one(&mut *tx)
        .await?;
        if completed {
            return Err(StoreError::Conflict(
                "UTR already completed a funding request".to_string(),
            ));
        }

        // Lock the deposit row; the is_used flag is the double-credit gate.
        let existing = sqlx::query_as::<_, DepositEvent>(
            "SELECT * FROM bank_deposits WHERE utr = $1 FOR UPDATE",
        )
        .bind(&completion.utr)
        .fetch_optional(&mut *tx)
        .await?;
        let deposit = match (existing, &completion.deposit) {
            (Some(deposit), _) => deposit,
            (None, DepositClaim::MustExist) => {
                return Err(StoreError::NotFound("Deposit".to_string()));
            }
            (
                None,
                DepositClaim::CreateIfMissing {
                    amount_paise,
                    original_message,
                },
            ) => {
                sqlx::query_as::<_, DepositEvent>(
                    r#"
                    INSERT INTO bank_deposits (utr, amount_paise, original_message, verified_at)
                    VALUES ($1, $2, $3, NOW())
                    RETURNING *
                    "#,
                )
                .bind(&completion.utr)
                .bind(amount_paise)
                .bind(original_message)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        if deposit.is_used {
            return Err(StoreError::Conflict("deposit already used".to_string()));
        }

        let deposit = sqlx::query_as::<_, DepositEvent>(
            r#"
            UPDATE bank_deposits
            SET is_used = true, used_by = $1, used_at = NOW()
            WHERE utr = $2 AND is_used = false
            RETURNING *
            "#,
        )
        .bind(completion.user_id)
        .bind(&completion.utr)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::Conflict("deposit already used".to_string()))?;

        let request = sqlx::query_as::<_, FundingRequest>(
            r#"
            UPDATE funding_requests
            SET status = 'completed', method = $1, approved_at = NOW(), updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(&completion.method)
        .bind(completion.request_id)
        .fetch_one(&mut *tx)
        .await?;

        let new_balance_paise: i64 = sqlx::query_scalar(
            r#"
            UPDATE users
            SET balance_paise = balance_paise + $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING balance_paise
            "#,
        )
        .bind(completion.credit_paise)
        .bind(completion.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        insert_ledger_entry(
            &mut tx,
            completion.user_id,
            EntryKind::Credit,
            completion.credit_paise,
            &completion.utr,
            &format!("wallet funding via {}", completion.method),
        )
        .await?;

        tx.commit().await?;

        Ok(CompletedFunding {
            request,
            deposit,
            new_balance_paise,
        })
    }

    async fn try_refund_order(&self, id: Uuid) -> Result<(Order, i64), StoreError> {
        let mut tx = self.begin_serializable().await?;

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound("Order".to_string()))?;
        if order.status != OrderStatus::PendingApproval {
            return Err(StoreError::Conflict(
                "only orders pending approval can be refunded".to_string(),
            ));
        }

        let new_balance: i64 = sqlx::query_scalar(
            r#"
            UPDATE users
            SET balance_paise = balance_paise + $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING balance_paise
            "#,
        )
        .bind(order.charge_paise)
        .bind(order.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'canceled_refunded', updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        insert_ledger_entry(
            &mut tx,
            order.user_id,
            EntryKind::Credit,
            order.charge_paise,
            &order.id.to_string(),
            "refund for rejected order",
        )
        .await?;

        tx.commit().await?;
        Ok((order, new_balance))
    }

    async fn try_apply_compensation(&self, id: Uuid) -> Result<(Compensation, i64), StoreError> {
        let mut tx = self.begin_serializable().await?;

        let compensation = sqlx::query_as::<_, Compensation>(
            "SELECT * FROM compensations WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("Compensation".to_string()))?;
        if compensation.status != CompensationStatus::Pending {
            return Err(StoreError::Conflict(
                "compensation already applied".to_string(),
            ));
        }

        let new_balance: i64 = sqlx::query_scalar(
            r#"
            UPDATE users
            SET balance_paise = balance_paise + $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING balance_paise
            "#,
        )
        .bind(compensation.amount_paise)
        .bind(compensation.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        let compensation = sqlx::query_as::<_, Compensation>(
            r#"
            UPDATE compensations
            SET status = 'applied', applied_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((compensation, new_balance))
    }
}

async fn insert_ledger_entry(
    tx: &mut Transaction<'static, Postgres>,
    user_id: Uuid,
    kind: EntryKind,
    amount_paise: i64,
    reference: &str,
    description: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO ledger_transactions (user_id, kind, amount_paise, reference, description)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(amount_paise)
    .bind(reference)
    .bind(description)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

/// Serialization failure or deadlock: safe to run the whole transaction again.
fn is_retryable(err: &sqlx::Error) -> bool {
    matches!(sqlstate(err).as_deref(), Some("40001") | Some("40P01"))
}

/// Turn constraint violations into domain errors.
fn classify(err: StoreError) -> StoreError {
    match err {
        StoreError::Database(e) => match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("duplicate record: {}", db.message()))
            }
            Some(db) if db.is_foreign_key_violation() => {
                StoreError::NotFound("Referenced user".to_string())
            }
            Some(db) if db.is_check_violation() => {
                StoreError::Conflict(format!("constraint violated: {}", db.message()))
            }
            _ => StoreError::Database(e),
        },
        other => other,
    }
}

/// Run `op` until it commits, retrying serialization failures.
async fn with_retry<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(StoreError::Database(e)) if is_retryable(&e) => {
                if attempt >= MAX_ATTEMPTS {
                    tracing::warn!(op = op_name, attempt, "giving up after serialization conflicts");
                    return Err(StoreError::Conflict(
                        "concurrent update, please retry".to_string(),
                    ));
                }
                tracing::debug!(op = op_name, attempt, error = %e, "serialization conflict, retrying");
                attempt += 1;
            }
            other => return other.map_err(classify),
        }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser, key_hash: &str) -> Result<User, StoreError> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let record = sqlx::query_as::<_, User>(
                "INSERT INTO users (display_name, role) VALUES ($1, $2) RETURNING *",
            )
            .bind(&user.display_name)
            .bind(user.role)
            .fetch_one(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO api_keys (user_id, key_hash, label) VALUES ($1, $2, 'default')")
                .bind(record.id)
                .bind(key_hash)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, StoreError>(record)
        }
        .await;
        result.map_err(classify)
    }

    async fn user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN api_keys k ON k.user_id = u.id
            WHERE k.key_hash = $1 AND k.is_active = true
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn upsert_deposit(&self, deposit: NewDeposit) -> Result<DepositEvent, StoreError> {
        // Field-level merge: is_used, used_by and used_at are never written here.
        let record = sqlx::query_as::<_, DepositEvent>(
            r#"
            INSERT INTO bank_deposits (utr, amount_paise, original_message, verified_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (utr) DO UPDATE SET
                amount_paise = CASE
                    WHEN bank_deposits.is_used THEN bank_deposits.amount_paise
                    ELSE EXCLUDED.amount_paise
                END,
                original_message = COALESCE(EXCLUDED.original_message, bank_deposits.original_message),
                verified_at = EXCLUDED.verified_at
            RETURNING *
            "#,
        )
        .bind(&deposit.utr)
        .bind(deposit.amount_paise)
        .bind(&deposit.original_message)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get_deposit(&self, utr: &str) -> Result<Option<DepositEvent>, StoreError> {
        let record = sqlx::query_as::<_, DepositEvent>("SELECT * FROM bank_deposits WHERE utr = $1")
            .bind(utr)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn submit_funding_request(
        &self,
        request: NewFundingRequest,
    ) -> Result<FundingRequest, StoreError> {
        with_retry("submit_funding_request", || {
            self.try_submit_funding_request(&request)
        })
        .await
    }

    async fn get_funding_request(&self, id: Uuid) -> Result<Option<FundingRequest>, StoreError> {
        let record =
            sqlx::query_as::<_, FundingRequest>("SELECT * FROM funding_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    async fn completed_funding_for_utr(
        &self,
        utr: &str,
    ) -> Result<Option<FundingRequest>, StoreError> {
        let record = sqlx::query_as::<_, FundingRequest>(
            "SELECT * FROM funding_requests WHERE utr = $1 AND status = 'completed'",
        )
        .bind(utr)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn pending_funding_for_utr(
        &self,
        utr: &str,
        user_id: Option<Uuid>,
    ) -> Result<Option<FundingRequest>, StoreError> {
        let record = sqlx::query_as::<_, FundingRequest>(
            r#"
            SELECT * FROM funding_requests
            WHERE utr = $1
              AND status = 'pending'
              AND ($2::uuid IS NULL OR user_id = $2)
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(utr)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_funding_requests(
        &self,
        filter: FundingFilter,
    ) -> Result<Vec<FundingRequest>, StoreError> {
        let records = sqlx::query_as::<_, FundingRequest>(
            r#"
            SELECT * FROM funding_requests
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn reject_funding_request(&self, id: Uuid) -> Result<FundingRequest, StoreError> {
        let updated = sqlx::query_as::<_, FundingRequest>(
            r#"
            UPDATE funding_requests
            SET status = 'rejected', rejected_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match updated {
            Some(record) => Ok(record),
            None => match self.get_funding_request(id).await? {
                Some(_) => Err(StoreError::Conflict(
                    "only pending funding requests can be rejected".to_string(),
                )),
                None => Err(StoreError::NotFound("Funding request".to_string())),
            },
        }
    }

    async fn mark_funding_completed(
        &self,
        id: Uuid,
        method: &str,
    ) -> Result<FundingRequest, StoreError> {
        with_retry("mark_funding_completed", || {
            self.try_mark_funding_completed(id, method)
        })
        .await
    }

    async fn complete_funding(
        &self,
        completion: FundingCompletion,
    ) -> Result<CompletedFunding, StoreError> {
        with_retry("complete_funding", || self.try_complete_funding(&completion)).await
    }

    async fn debit_balance(&self, user_id: Uuid, amount_paise: i64) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so a concurrent credit or debit waits for us
        let balance: i64 =
            sqlx::query_scalar("SELECT balance_paise FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        if balance < amount_paise {
            tx.rollback().await?;
            return Err(StoreError::InsufficientBalance {
                needed: amount_paise,
                available: balance,
            });
        }

        let new_balance: i64 = sqlx::query_scalar(
            r#"
            UPDATE users
            SET balance_paise = balance_paise - $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING balance_paise
            "#,
        )
        .bind(amount_paise)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(new_balance)
    }

    async fn record_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let result = async {
            let mut tx = self.pool.begin().await?;
            let record = sqlx::query_as::<_, Order>(
                r#"
                INSERT INTO orders (
                    user_id,
                    service_id,
                    link,
                    quantity,
                    charge_paise,
                    status,
                    provider_order_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(order.user_id)
            .bind(order.service_id)
            .bind(&order.link)
            .bind(order.quantity)
            .bind(order.charge_paise)
            .bind(order.status)
            .bind(&order.provider_order_id)
            .fetch_one(&mut *tx)
            .await?;

            insert_ledger_entry(
                &mut tx,
                record.user_id,
                EntryKind::Debit,
                record.charge_paise,
                &record.id.to_string(),
                &format!("order for service {}", record.service_id),
            )
            .await?;

            tx.commit().await?;
            Ok::<_, StoreError>(record)
        }
        .await;
        result.map_err(classify)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn order_by_provider_id(
        &self,
        provider_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE provider_order_id = $1")
            .bind(provider_order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, StoreError> {
        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(to)
        .bind(id)
        .bind(from)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(StoreError::Database(e)))?;
        match updated {
            Some(order) => Ok(order),
            None => match self.get_order(id).await? {
                Some(order) => Err(StoreError::Conflict(format!(
                    "order is {:?}, expected {:?}",
                    order.status, from
                ))),
                None => Err(StoreError::NotFound("Order".to_string())),
            },
        }
    }

    async fn mark_order_placed(
        &self,
        id: Uuid,
        provider_order_id: &str,
    ) -> Result<Order, StoreError> {
        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'processing', provider_order_id = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'approving'
            RETURNING *
            "#,
        )
        .bind(provider_order_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(StoreError::Database(e)))?;
        match updated {
            Some(order) => Ok(order),
            None => match self.get_order(id).await? {
                Some(_) => Err(StoreError::Conflict(
                    "order is not being approved".to_string(),
                )),
                None => Err(StoreError::NotFound("Order".to_string())),
            },
        }
    }

    async fn refund_order(&self, id: Uuid) -> Result<(Order, i64), StoreError> {
        with_retry("refund_order", || self.try_refund_order(id)).await
    }

    async fn open_compensation(
        &self,
        compensation: NewCompensation,
    ) -> Result<Compensation, StoreError> {
        let record = sqlx::query_as::<_, Compensation>(
            r#"
            INSERT INTO compensations (user_id, amount_paise, reason, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(compensation.user_id)
        .bind(compensation.amount_paise)
        .bind(&compensation.reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn apply_compensation(&self, id: Uuid) -> Result<(Compensation, i64), StoreError> {
        with_retry("apply_compensation", || self.try_apply_compensation(id)).await
    }

    async fn list_compensations(
        &self,
        filter: CompensationFilter,
    ) -> Result<Vec<Compensation>, StoreError> {
        let records = sqlx::query_as::<_, Compensation>(
            r#"
            SELECT * FROM compensations
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError> {
        let entries = sqlx::query_as::<_, LedgerTransaction>(
            "SELECT * FROM ledger_transactions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
