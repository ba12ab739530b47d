//! Data models representing database entities and API bodies.

/// API key authentication model
pub mod api_key;
pub mod compensation;
pub mod deposit;
pub mod funding;
pub mod order;
/// Ledger audit records
pub mod transaction;
/// Wallet owners
pub mod user;
