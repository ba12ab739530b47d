//! Wallet, payment reconciliation and order placement for an SMM reseller
//! storefront.
//!
//! Users fund a wallet with UPI transfers. The bank's credit SMS is
//! forwarded to a webhook, parsed, and matched against the user's funding
//! request; orders are paid from the wallet and placed with an upstream SMM
//! panel, with the charge refunded if the panel refuses.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod money;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use routes::build_router;
pub use state::AppState;
