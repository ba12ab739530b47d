//! Request middleware.
//!
//! Only bearer-key authentication lives here. The SMS webhook is
//! authenticated inside its handler because it needs the raw body.

pub mod auth;
