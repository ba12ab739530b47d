//! Matching bank deposits to funding requests.
//!
//! Two entry points share one matching routine:
//!
//! - [`ingest_sms`] runs for every webhook delivery. It records the deposit
//!   and tries to settle whichever pending request carries the same UTR.
//! - [`verify_payment`] runs when a user asks to re-check their own
//!   request, and additionally repairs requests whose deposit was already
//!   credited to them.
//!
//! The cheap checks (UTR already completed, no pending request, amount
//! outside tolerance) run first and produce a [`MatchOutcome`]. Only a
//! request that passes them reaches `LedgerStore::complete_funding`, which
//! consumes the deposit, completes the request and credits the balance as
//! one atomic unit.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::deposit::{
    DepositClaim, DepositEvent, ExtractedDeposit, NewDeposit, SmsWebhookPayload,
    SmsWebhookResponse,
};
use crate::models::funding::{
    FundingRequest, NewFundingRequest, SubmitFundingRequest, VerifyPaymentRequest,
};
use crate::money::{from_paise, to_paise, within_tolerance};
use crate::services::sms_parser;
use crate::store::{FundingCompletion, LedgerStore, StoreError};

pub const METHOD_WEBHOOK: &str = "auto_sms_webhook";
pub const METHOD_VERIFY: &str = "auto_verify";
pub const METHOD_SELF_HEAL: &str = "auto_verify_repaired";
pub const DEFAULT_SUBMIT_METHOD: &str = "upi_manual";

/// Result of one matching attempt. Everything except `Matched` and
/// `Repaired` leaves every record untouched.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Deposit consumed, request completed, balance credited.
    Matched {
        request: FundingRequest,
        credited_paise: i64,
        new_balance_paise: i64,
    },
    /// The deposit was already credited to the requester; only the request
    /// status was brought up to date.
    Repaired { request: FundingRequest },
    /// Some request already completed with this UTR.
    AlreadyCompleted { request: FundingRequest },
    NoPendingRequest,
    /// No SMS has been received for the UTR yet.
    DepositNotReceived,
    /// The deposit was credited to a different user.
    UsedByOther,
    AmountMismatch {
        requested_paise: i64,
        deposited_paise: i64,
    },
    /// A concurrent writer settled the deposit or request first.
    Contended(String),
}

impl MatchOutcome {
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Matched { .. } | Self::Repaired { .. })
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Matched { credited_paise, .. } => {
                format!("Payment verified, {} credited", from_paise(*credited_paise))
            }
            Self::Repaired { .. } => "Payment was already credited to your wallet".to_string(),
            Self::AlreadyCompleted { .. } => {
                "This UTR has already been used for a completed payment".to_string()
            }
            Self::NoPendingRequest => "No pending funding request found for this UTR".to_string(),
            Self::DepositNotReceived => {
                "Payment not received yet. Try again once the bank SMS arrives".to_string()
            }
            Self::UsedByOther => "This UTR has already been claimed".to_string(),
            Self::AmountMismatch {
                requested_paise,
                deposited_paise,
            } => format!(
                "Amount mismatch: requested {}, received {}",
                from_paise(*requested_paise),
                from_paise(*deposited_paise)
            ),
            Self::Contended(detail) => format!("Payment could not be matched: {detail}"),
        }
    }
}

/// Tolerance check and atomic settlement of one pending request.
async fn settle(
    store: &dyn LedgerStore,
    request: FundingRequest,
    deposit: &DepositEvent,
    method: &str,
) -> Result<MatchOutcome, AppError> {
    if !within_tolerance(request.amount_paise, deposit.amount_paise) {
        return Ok(MatchOutcome::AmountMismatch {
            requested_paise: request.amount_paise,
            deposited_paise: deposit.amount_paise,
        });
    }

    let completion = FundingCompletion {
        request_id: request.id,
        user_id: request.user_id,
        utr: deposit.utr.clone(),
        credit_paise: deposit.amount_paise,
        method: method.to_string(),
        deposit: DepositClaim::MustExist,
    };

    match store.complete_funding(completion).await {
        Ok(done) => {
            tracing::info!(
                user_id = %done.request.user_id,
                utr = %done.request.utr,
                credited_paise = deposit.amount_paise,
                method,
                "funding request completed"
            );
            Ok(MatchOutcome::Matched {
                request: done.request,
                credited_paise: deposit.amount_paise,
                new_balance_paise: done.new_balance_paise,
            })
        }
        Err(StoreError::Conflict(detail)) => {
            tracing::warn!(utr = %deposit.utr, %detail, "funding settlement lost a race");
            Ok(MatchOutcome::Contended(detail))
        }
        Err(e) => Err(e.into()),
    }
}

/// Match a recorded deposit against the oldest pending request for its UTR.
pub async fn match_deposit(
    store: &dyn LedgerStore,
    deposit: &DepositEvent,
) -> Result<MatchOutcome, AppError> {
    if let Some(request) = store.completed_funding_for_utr(&deposit.utr).await? {
        return Ok(MatchOutcome::AlreadyCompleted { request });
    }
    let Some(request) = store.pending_funding_for_utr(&deposit.utr, None).await? else {
        return Ok(MatchOutcome::NoPendingRequest);
    };
    if deposit.is_used {
        return Ok(MatchOutcome::UsedByOther);
    }
    settle(store, request, deposit, METHOD_WEBHOOK).await
}

/// Handle one SMS webhook delivery after its secret has been checked.
///
/// Explicit `utr` and `amount` take precedence over the SMS text. Text
/// that does not parse as a credit is acknowledged and ignored; a body with
/// neither fields nor text is a validation error.
pub async fn ingest_sms(
    store: &dyn LedgerStore,
    payload: &SmsWebhookPayload,
) -> Result<SmsWebhookResponse, AppError> {
    let raw_text = payload.raw_text();
    let explicit_utr = payload
        .utr
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    let (utr, amount_paise) = match (explicit_utr, payload.amount) {
        (Some(utr), Some(amount)) => {
            let paise = to_paise(amount)
                .filter(|p| *p > 0)
                .ok_or_else(|| AppError::InvalidRequest("amount must be positive".into()))?;
            (utr.to_string(), paise)
        }
        _ => {
            let Some(text) = raw_text else {
                return Err(AppError::InvalidRequest(
                    "provide utr and amount, or the SMS text".into(),
                ));
            };
            match sms_parser::parse(text) {
                Some(parsed) => (parsed.utr, parsed.amount_paise),
                None => {
                    tracing::debug!("webhook SMS is not a recognisable credit, ignoring");
                    return Ok(SmsWebhookResponse {
                        success: true,
                        matched: false,
                        extracted: None,
                        reason: Some("message ignored".into()),
                    });
                }
            }
        }
    };

    let deposit = store
        .upsert_deposit(NewDeposit {
            utr: utr.clone(),
            amount_paise,
            original_message: raw_text.map(str::to_string),
        })
        .await?;
    tracing::info!(utr = %deposit.utr, amount_paise = deposit.amount_paise, "deposit recorded");

    let outcome = match_deposit(store, &deposit).await?;
    let matched = matches!(outcome, MatchOutcome::Matched { .. });

    Ok(SmsWebhookResponse {
        success: true,
        matched,
        extracted: Some(ExtractedDeposit {
            utr,
            amount: from_paise(amount_paise),
        }),
        reason: (!matched).then(|| outcome.reason()),
    })
}

/// Re-check one of the caller's own funding requests.
///
/// The pending request is looked up for `user_id` only, so a user can
/// neither trigger nor probe another user's request.
pub async fn verify_payment(
    store: &dyn LedgerStore,
    user_id: Uuid,
    request: &VerifyPaymentRequest,
) -> Result<MatchOutcome, AppError> {
    let utr = request.utr.trim();
    if utr.is_empty() {
        return Err(AppError::InvalidRequest("utr is required".into()));
    }
    if request.amount.is_some_and(|amount| amount <= Decimal::ZERO) {
        return Err(AppError::InvalidRequest("amount must be positive".into()));
    }

    if let Some(completed) = store.completed_funding_for_utr(utr).await? {
        return Ok(MatchOutcome::AlreadyCompleted { request: completed });
    }
    let Some(pending) = store.pending_funding_for_utr(utr, Some(user_id)).await? else {
        return Ok(MatchOutcome::NoPendingRequest);
    };
    let Some(deposit) = store.get_deposit(utr).await? else {
        return Ok(MatchOutcome::DepositNotReceived);
    };

    if deposit.is_used {
        if deposit.used_by != Some(user_id) {
            return Ok(MatchOutcome::UsedByOther);
        }
        return match store.mark_funding_completed(pending.id, METHOD_SELF_HEAL).await {
            Ok(repaired) => {
                tracing::info!(%user_id, utr, "funding request repaired from used deposit");
                Ok(MatchOutcome::Repaired { request: repaired })
            }
            // The matcher completed the request between our reads and this write.
            Err(StoreError::Conflict(detail)) => {
                match store.completed_funding_for_utr(utr).await? {
                    Some(completed) => Ok(MatchOutcome::AlreadyCompleted { request: completed }),
                    None => Ok(MatchOutcome::Contended(detail)),
                }
            }
            Err(e) => Err(e.into()),
        };
    }

    settle(store, pending, &deposit, METHOD_VERIFY).await
}

/// Record (or correct) a funding request. Never credits anything.
pub async fn submit_funding(
    store: &dyn LedgerStore,
    user_id: Uuid,
    request: SubmitFundingRequest,
) -> Result<FundingRequest, AppError> {
    let utr = request.utr.trim();
    if utr.is_empty() {
        return Err(AppError::InvalidRequest("utr is required".into()));
    }
    let amount_paise = to_paise(request.amount)
        .filter(|p| *p > 0)
        .ok_or_else(|| AppError::InvalidRequest("amount must be positive".into()))?;
    let method = request
        .method
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_SUBMIT_METHOD.to_string());

    let record = store
        .submit_funding_request(NewFundingRequest {
            user_id,
            utr: utr.to_string(),
            amount_paise,
            method,
        })
        .await?;
    tracing::info!(%user_id, utr, amount_paise, "funding request submitted");
    Ok(record)
}
