//! Data models.
//!
//! This module contains the records owned by the gateway context and the
//! shapes the REST surface renders.

/// Whitelisted API keys
pub mod api_key;
/// Runtime gateway settings
pub mod gateway_config;
/// Success/error response elements
pub mod response;
/// Config and full-state read models
pub mod snapshot;
