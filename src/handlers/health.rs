//! Health check endpoint for service monitoring.

use crate::services::gateway::SharedGateway;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
///
/// Returns service status, uptime and where the update orchestrator stands.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,

    /// Seconds since the gateway started
    pub uptime_secs: u64,

    /// Radio firmware version, `0x00000000` until discovered
    pub firmware: String,

    /// Update orchestrator phase
    pub update: &'static str,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "uptime_secs": 42,
///   "firmware": "0x26580700",
///   "update": "uptodate",
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
pub async fn health_check(State(gateway): State<SharedGateway>) -> Json<HealthResponse> {
    let gateway = gateway.lock();

    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: gateway.uptime().as_secs(),
        firmware: gateway.firmware_version_label(),
        update: gateway.updates.phase().as_str(),
        timestamp: Utc::now(),
    })
}
