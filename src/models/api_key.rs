//! API Key model for authentication.
//!
//! API keys (the "username" of the REST API) authenticate every client of
//! the gateway. They are issued by `POST /api` while the gateway is unlocked
//! and are kept in the whitelist for the lifetime of the installation.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Minimum length of a caller-supplied key.
pub const MIN_API_KEY_LEN: usize = 10;

/// Local-time text format used for the whitelist dates.
const WHITELIST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Represents one whitelisted API key.
///
/// # Persistence
///
/// Stored in the auth partition of the state store. The key itself is kept
/// in clear text: it is the capability clients present on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Opaque token presented as the second path segment (`/api/<key>/...`)
    pub key: String,

    /// Free-form label the client sent as `devicetype`
    pub device_label: String,

    /// Timestamp when this API key was issued
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent authenticated request with this key
    pub last_used_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn new(key: String, device_label: String, now: DateTime<Utc>) -> Self {
        Self {
            key,
            device_label,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// One whitelist entry as exposed in the config snapshot.
///
/// The key is not part of the entry; it is the map key of the whitelist.
#[derive(Debug, Serialize)]
pub struct WhitelistEntry {
    #[serde(rename = "last use date")]
    pub last_use_date: String,

    #[serde(rename = "create date")]
    pub create_date: String,

    pub name: String,
}

impl From<&ApiKey> for WhitelistEntry {
    fn from(key: &ApiKey) -> Self {
        Self {
            last_use_date: format_local(key.last_used_at),
            create_date: format_local(key.created_at),
            name: key.device_label.clone(),
        }
    }
}

/// Formats a timestamp in gateway-local time without offset.
pub fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format(WHITELIST_DATE_FORMAT)
        .to_string()
}
