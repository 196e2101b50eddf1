//! Gateway state and the logic that mutates it.
//!
//! Services hold the configuration rules separated from the HTTP handlers.
//! Everything hangs off [`gateway::Gateway`]; each module below adds one
//! group of operations to it.

pub mod change_token;
pub mod config_service;
pub mod credentials;
pub mod firmware;
pub mod gateway;
pub mod persistence;
pub mod rf_state;
pub mod scheduler;
