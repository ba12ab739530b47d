//! Business logic services.
//!
//! Services contain the core logic separated from HTTP handlers. They take
//! the store and provider as trait objects, validate input, and return
//! `AppError` for anything the caller should see as a failure.

pub mod admin_service;
pub mod order_service;
pub mod pricing;
pub mod provider;
pub mod reconciliation;
pub mod sms_parser;
pub mod webhook_service;
