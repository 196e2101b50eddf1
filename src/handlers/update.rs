//! Update trigger endpoints.
//!
//! Both answer with success on every platform; whether an update was really
//! scheduled is only visible through `/health` and the eventual restart.

use crate::{
    error::ApiError,
    handlers::with_token,
    middleware::auth::AuthContext,
    models::response::{FieldOutcome, to_items},
    services::gateway::SharedGateway,
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::Response};

/// `POST /api/{key}/config/update`
///
/// ```json
/// [{ "success": { "/config/update": "2.5.0" } }]
/// ```
pub async fn update_software(
    State(gateway): State<SharedGateway>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    let mut gateway = gateway.lock();
    let version = gateway.trigger_software_update();
    tracing::info!(api_key = %auth.api_key, version = %version, "software update requested");

    with_token(
        StatusCode::OK,
        gateway.change_token(),
        Json(to_items(&[FieldOutcome::success("/config/update", version)])),
    )
}

/// `POST /api/{key}/config/updatefirmware`
///
/// # Errors
///
/// 500 with error type 901 if the flashing script could not be written.
pub async fn update_firmware(
    State(gateway): State<SharedGateway>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let mut gateway = gateway.lock();
    let version = gateway.trigger_firmware_update()?;
    tracing::info!(api_key = %auth.api_key, version = %version, "firmware update requested");

    Ok(with_token(
        StatusCode::OK,
        gateway.change_token(),
        Json(to_items(&[FieldOutcome::success(
            "/config/updatefirmware",
            version,
        )])),
    ))
}
