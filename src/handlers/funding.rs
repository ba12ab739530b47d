//! Funding request and payment verification handlers.
//!
//! - POST /api/v1/funding-requests - declare a UPI transfer
//! - GET /api/v1/funding-requests - the caller's requests
//! - POST /api/v1/payments/verify - re-check a request against received SMS

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::funding::{
        FundingFilter, FundingRequestResponse, SubmitFundingRequest, VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    money::from_paise,
    services::reconciliation::{self, MatchOutcome},
    state::AppState,
};

/// Submit (or correct) a funding request.
///
/// # Endpoint
///
/// `POST /api/v1/funding-requests`
///
/// # Request Body
///
/// ```json
/// { "utr": "412345678901", "amount": 500 }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the pending request
/// - **Error (400)**: empty UTR or non-positive amount
/// - **Error (409)**: the UTR already completed a request
///
/// Submitting never credits the wallet; the SMS webhook or
/// `POST /api/v1/payments/verify` does.
pub async fn submit_funding_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SubmitFundingRequest>,
) -> Result<(StatusCode, Json<FundingRequestResponse>), AppError> {
    let record =
        reconciliation::submit_funding(state.store.as_ref(), auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// The caller's funding requests, newest first. `?status=pending` filters.
pub async fn list_funding_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<FundingFilter>,
) -> Result<Json<Vec<FundingRequestResponse>>, AppError> {
    let filter = FundingFilter {
        user_id: Some(auth.user_id),
        ..filter
    };
    let records = state.store.list_funding_requests(filter).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Verify a payment.
///
/// # Endpoint
///
/// `POST /api/v1/payments/verify`
///
/// # Request Body
///
/// ```json
/// { "utr": "412345678901", "amount": 500 }
/// ```
///
/// `userId` may be given; only admins may name another user.
///
/// # Response
///
/// | Outcome                           | Status | `success` |
/// |-----------------------------------|--------|-----------|
/// | credited now                      | 200    | true      |
/// | already credited to the caller    | 200    | true      |
/// | SMS not received yet              | 200    | false     |
/// | no pending request for the caller | 404    | false     |
/// | UTR used by someone else          | 400    | false     |
/// | amount outside tolerance          | 400    | false     |
/// | concurrent settlement won         | 409    | false     |
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<(StatusCode, Json<VerifyPaymentResponse>), AppError> {
    let user_id = auth.acting_user(request.user_id)?;
    let outcome = reconciliation::verify_payment(state.store.as_ref(), user_id, &request).await?;

    let message = outcome.reason();
    let (status, success, credited, new_balance) = match outcome {
        MatchOutcome::Matched {
            credited_paise,
            new_balance_paise,
            ..
        } => (
            StatusCode::OK,
            true,
            Some(from_paise(credited_paise)),
            Some(from_paise(new_balance_paise)),
        ),
        MatchOutcome::Repaired { .. } => (StatusCode::OK, true, None, None),
        MatchOutcome::AlreadyCompleted { request } if request.user_id == user_id => {
            return Ok((
                StatusCode::OK,
                Json(VerifyPaymentResponse {
                    success: true,
                    message: "Payment already verified".into(),
                    credited: None,
                    new_balance: None,
                }),
            ));
        }
        MatchOutcome::AlreadyCompleted { .. }
        | MatchOutcome::UsedByOther
        | MatchOutcome::AmountMismatch { .. } => (StatusCode::BAD_REQUEST, false, None, None),
        MatchOutcome::DepositNotReceived => (StatusCode::OK, false, None, None),
        MatchOutcome::NoPendingRequest => (StatusCode::NOT_FOUND, false, None, None),
        MatchOutcome::Contended(_) => (StatusCode::CONFLICT, false, None, None),
    };

    Ok((
        status,
        Json(VerifyPaymentResponse {
            success,
            message,
            credited,
            new_balance,
        }),
    ))
}
