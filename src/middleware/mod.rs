//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Short-circuit requests (reject unknown API keys)

/// API key authentication middleware
pub mod auth;
