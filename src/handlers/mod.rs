//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, auth context)
//! 2. Delegates to a service or the store
//! 3. Returns HTTP response (JSON, status code)

/// Admin-only endpoints
pub mod admin;
/// Funding requests and payment verification
pub mod funding;
/// Service health
pub mod health;
/// Order placement and status relay
pub mod orders;
/// Balance and ledger views
pub mod wallet;
/// Inbound SMS webhook
pub mod webhooks;
