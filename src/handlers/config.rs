//! Configuration HTTP handlers.
//!
//! This module implements the config-related API endpoints:
//! - GET /api/{key} - Full state (lights, groups, config, schedules)
//! - GET /api/{key}/config - Config snapshot
//! - PUT /api/{key}/config - Apply a batch of settings

use crate::{
    error::ApiError,
    handlers::{conditional_response, if_none_match, parse_object, with_token},
    middleware::auth::AuthContext,
    models::response::to_items,
    services::gateway::{Gateway, SharedGateway},
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};

/// Get the full gateway state.
///
/// # Endpoint
///
/// `GET /api/{key}`
///
/// # Response
///
/// - **200 OK**: `{"lights": {}, "groups": {}, "config": {...}, "schedules": {}}`
///   with the current change token as `ETag`
/// - **304 Not Modified**: `If-None-Match` carried the current token
pub async fn get_full_state(
    State(gateway): State<SharedGateway>,
    headers: HeaderMap,
) -> Response {
    let read = gateway
        .lock()
        .read_conditional(if_none_match(&headers), Gateway::full_state);
    conditional_response(read)
}

/// Get the config snapshot.
///
/// # Endpoint
///
/// `GET /api/{key}/config`
///
/// The RF state is reconciled before the token is compared, so a radio
/// that changed since the last read always yields a fresh body.
pub async fn get_config(State(gateway): State<SharedGateway>, headers: HeaderMap) -> Response {
    let read = gateway
        .lock()
        .read_conditional(if_none_match(&headers), Gateway::config_snapshot);
    conditional_response(read)
}

/// Apply a batch of settings.
///
/// # Endpoint
///
/// `PUT /api/{key}/config`
///
/// # Request Body
///
/// ```json
/// { "name": "Living room", "permitjoin": 60, "unlock": 0 }
/// ```
///
/// Unrecognized fields are ignored.
///
/// # Response
///
/// One array element per recognized field, in a fixed field order:
///
/// ```json
/// [
///   { "success": { "/config/name": "Living room" } },
///   { "error": { "type": 7, "address": "/config/permitjoin", "description": "..." } }
/// ]
/// ```
///
/// - **200 OK**: at least one field succeeded, or no field was recognized
/// - **400 Bad Request**: every recognized field failed, or the body is not
///   a non-empty JSON object (single `InvalidJson` element)
pub async fn modify_config(
    State(gateway): State<SharedGateway>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let fields = parse_object(&body, "")?;

    let mut gateway = gateway.lock();
    let result = gateway.apply_config_batch(&fields)?;

    tracing::debug!(
        api_key = %auth.api_key,
        fields = result.outcomes.len(),
        changed = result.changed,
        "config batch applied"
    );

    let status = if result.all_failed() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok(with_token(
        status,
        gateway.change_token(),
        Json(to_items(&result.outcomes)),
    ))
}
