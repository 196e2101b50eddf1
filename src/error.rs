//! Error types and HTTP error response handling.
//!
//! Every error the REST surface can report is an [`ApiError`]. An error
//! becomes one element of the JSON response array:
//!
//! ```json
//! [{ "error": { "type": 7, "address": "/config/name", "description": "invalid value, ..." } }]
//! ```
//!
//! Batch endpoints collect several of these next to success elements; the
//! other endpoints abort with exactly one.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

pub const ERR_UNAUTHORIZED_USER: u16 = 1;
pub const ERR_INVALID_JSON: u16 = 2;
pub const ERR_MISSING_PARAMETER: u16 = 5;
pub const ERR_INVALID_VALUE: u16 = 7;
pub const ERR_LINK_BUTTON_NOT_PRESSED: u16 = 101;
pub const ERR_DEVICE_OFF: u16 = 201;
pub const ERR_INTERNAL_ERROR: u16 = 901;

/// Application-wide error type.
///
/// Each variant maps to a numeric error type, an address (the JSON pointer
/// of the offending resource or parameter) and an HTTP status code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Body could not be parsed, or parsed to an empty object.
    #[error("body contains invalid JSON")]
    InvalidJson { address: String },

    /// A required body parameter is absent.
    #[error("missing parameters in body")]
    MissingParameter { address: String },

    /// A parameter has the wrong type or is out of range.
    ///
    /// The offending value is echoed back to the caller.
    #[error("invalid value, {value}, for parameter, {parameter}")]
    InvalidValue {
        address: String,
        parameter: String,
        value: String,
    },

    /// No unlock window is open and the caller is not pre-authorized.
    #[error("link button not pressed")]
    LinkButtonNotPressed,

    /// Credentials did not match.
    #[error("{description}")]
    Unauthorized { address: String, description: String },

    /// Unknown API key or an operation outside its allowed window.
    #[error("unauthorized user")]
    Forbidden { address: String },

    /// The radio refused the requested network state.
    #[error("Error, {parameter}, is not modifiable. Device is set to off.")]
    DeviceOff { address: String, parameter: String },

    /// An exclusive radio operation (touchlink) is in progress. Reported as an
    /// internal error carrying the bridge-busy code 208.
    #[error("Internal error, 208")]
    BridgeBusy { address: String },

    #[error("Internal error, {description}")]
    Internal { address: String, description: String },
}

impl ApiError {
    /// Builds an `InvalidValue` for `/config/<parameter>`.
    pub fn invalid_config_value(parameter: &str, value: &Value) -> Self {
        ApiError::InvalidValue {
            address: format!("/config/{parameter}"),
            parameter: parameter.to_string(),
            value: echo_value(value),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ApiError::InvalidJson { .. } => ERR_INVALID_JSON,
            ApiError::MissingParameter { .. } => ERR_MISSING_PARAMETER,
            ApiError::InvalidValue { .. } => ERR_INVALID_VALUE,
            ApiError::LinkButtonNotPressed => ERR_LINK_BUTTON_NOT_PRESSED,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. } => ERR_UNAUTHORIZED_USER,
            ApiError::DeviceOff { .. } => ERR_DEVICE_OFF,
            ApiError::BridgeBusy { .. } | ApiError::Internal { .. } => ERR_INTERNAL_ERROR,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            ApiError::LinkButtonNotPressed => "",
            ApiError::InvalidJson { address }
            | ApiError::MissingParameter { address }
            | ApiError::InvalidValue { address, .. }
            | ApiError::Unauthorized { address, .. }
            | ApiError::Forbidden { address }
            | ApiError::DeviceOff { address, .. }
            | ApiError::BridgeBusy { address }
            | ApiError::Internal { address, .. } => address,
        }
    }

    /// HTTP status used when this error aborts a whole request.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::LinkButtonNotPressed | ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The `{"error": {...}}` array element for this error.
    pub fn to_item(&self) -> Value {
        json!({
            "error": {
                "type": self.code(),
                "address": self.address(),
                "description": self.to_string()
            }
        })
    }
}

/// Renders a JSON value the way error descriptions quote it: strings bare,
/// everything else as JSON text.
pub fn echo_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Convert ApiError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, ApiError>`
/// and have errors automatically converted to a single-element error array.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(Value::Array(vec![self.to_item()]))).into_response()
    }
}
