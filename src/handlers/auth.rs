//! API key issuance and admin password endpoints.
//!
//! - POST /api - Issue an API key (link button or admin credentials)
//! - PUT /api/{key}/config/password - Change the admin secret
//! - DELETE /api/config/password - Reset the admin secret (shortly after boot only)

use crate::{
    error::{ApiError, echo_value},
    handlers::{parse_object, with_token},
    middleware::auth::AuthContext,
    models::response::{FieldOutcome, to_items},
    services::gateway::SharedGateway,
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};

const PASSWORD_PATH: &str = "/config/password";

/// Issue a new API key.
///
/// # Endpoint
///
/// `POST /api`
///
/// # Authentication
///
/// None by key. The request succeeds while the unlock window is open, or
/// when it carries `Authorization: Basic base64(<admin user>:<secret>)`.
///
/// # Request Body
///
/// ```json
/// {
///   "devicetype": "my-app",
///   "username": "0123456789"  // optional, at least 10 characters
/// }
/// ```
///
/// # Response
///
/// ```json
/// [{ "success": { "username": "A1B2C3D4E5" } }]
/// ```
///
/// A key that is already whitelisted is echoed back without change.
pub async fn create_api_key(
    State(gateway): State<SharedGateway>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut gateway = gateway.lock();

    let preauthorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| gateway.credentials.verify_basic(value));

    // locked gateways reject before the body is looked at
    gateway.ensure_may_issue_key(preauthorized)?;

    let request = parse_object(&body, "/")?;
    let device_label = match request.get("devicetype") {
        Some(Value::String(label)) => label.as_str(),
        Some(other) => {
            return Err(ApiError::InvalidValue {
                address: "/".to_string(),
                parameter: "devicetype".to_string(),
                value: echo_value(other),
            });
        }
        None => {
            return Err(ApiError::MissingParameter {
                address: "/".to_string(),
            });
        }
    };

    let issued = gateway.issue_api_key(device_label, request.get("username"), preauthorized)?;

    Ok(with_token(
        StatusCode::OK,
        gateway.change_token(),
        Json(json!([{ "success": { "username": issued.key } }])),
    ))
}

/// Change the admin secret.
///
/// # Endpoint
///
/// `PUT /api/{key}/config/password`
///
/// # Request Body
///
/// ```json
/// { "username": "delight", "oldhash": "...", "newhash": "..." }
/// ```
///
/// All three parameters are required. Hashes are the client-side hashes of
/// the secrets; the gateway hashes them once more before comparing.
pub async fn change_password(
    State(gateway): State<SharedGateway>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_object(&body, PASSWORD_PATH)?;

    let (Some(username), Some(old_hash), Some(new_hash)) = (
        request.get("username"),
        request.get("oldhash"),
        request.get("newhash"),
    ) else {
        return Err(ApiError::MissingParameter {
            address: PASSWORD_PATH.to_string(),
        });
    };

    let mut gateway = gateway.lock();
    gateway
        .change_admin_password(username, old_hash, new_hash)
        .inspect_err(|err| {
            tracing::warn!(api_key = %auth.api_key, error = %err, "admin password change rejected");
        })?;

    Ok(with_token(
        StatusCode::OK,
        gateway.change_token(),
        Json(to_items(&[FieldOutcome::success(PASSWORD_PATH, "changed")])),
    ))
}

/// Reset the admin secret to its default.
///
/// # Endpoint
///
/// `DELETE /api/config/password`
///
/// Needs no API key; only accepted during the first ten minutes of uptime.
pub async fn reset_password(State(gateway): State<SharedGateway>) -> Result<Response, ApiError> {
    let mut gateway = gateway.lock();
    gateway.reset_admin_password()?;

    Ok(with_token(
        StatusCode::OK,
        gateway.change_token(),
        Json(to_items(&[FieldOutcome::success(PASSWORD_PATH, "reset")])),
    ))
}
