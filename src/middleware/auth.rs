//! API key authentication middleware.
//!
//! Protected routes carry the key as the second path segment
//! (`/api/<key>/...`). This middleware intercepts every such request to:
//! 1. Extract the key from the path
//! 2. Verify it is on the whitelist (recording its last use)
//! 3. Inject authentication context into the request
//! 4. Reject unknown keys with error type 1, HTTP 403

use crate::{error::ApiError, services::gateway::SharedGateway};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Authentication context attached to authenticated requests.
///
/// Inserted into the request's extension map; handlers extract it with
/// `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The whitelisted key the request was made with
    pub api_key: String,
}

/// Second path segment, if present and non-empty.
fn api_key_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .nth(1)
        .filter(|segment| !segment.is_empty())
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Take `<key>` from `/api/<key>/...`
/// 2. Look it up in the whitelist, updating its last-use timestamp
/// 3. If found: inject `AuthContext` into request, call next handler
/// 4. If not found: return `[{"error": {"type": 1, ...}}]` with 403
pub async fn auth_middleware(
    State(gateway): State<SharedGateway>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = api_key_segment(request.uri().path())
        .ok_or_else(|| ApiError::Forbidden {
            address: "/".to_string(),
        })?
        .to_string();

    // the lock is released before the handler runs
    gateway.lock().authenticate(&api_key).inspect_err(|_| {
        tracing::debug!(api_key = %api_key, "rejected unknown api key");
    })?;

    request.extensions_mut().insert(AuthContext { api_key });

    Ok(next.run(request).await)
}
