//! Credential store and authorization gate.
//!
//! This module handles:
//! - The API key whitelist and key issuance (`POST /api`)
//! - The unlock window ("link button") that permits issuance
//! - Admin password change and the uptime-gated reset
//!
//! # Password Storage
//!
//! Clients never send the admin secret itself but a client-side hash of it.
//! The gateway stores an HMAC-SHA256 of that hash, keyed with the
//! configured password key, so the stored value cannot be replayed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use crate::db::Partition;
use crate::error::{ApiError, echo_value};
use crate::models::api_key::{ApiKey, MIN_API_KEY_LEN};
use crate::models::gateway_config::MAX_UNLOCK_SECONDS;
use crate::services::gateway::{Gateway, GatewayOptions};
use crate::services::persistence::SaveDelay;
use crate::services::scheduler::TimerKey;

type HmacSha256 = Hmac<Sha256>;

/// Admin password reset is only accepted this long after startup.
pub const PASSWORD_RESET_WINDOW: Duration = Duration::from_secs(600);

const PASSWORD_ADDRESS: &str = "/config/password";

/// Admin credentials and the API key whitelist.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    key: String,
    default_username: String,
    default_secret: String,
    stored_username: Option<String>,
    stored_hash: Option<String>,
    api_keys: Vec<ApiKey>,
}

impl CredentialStore {
    pub fn new(
        options: &GatewayOptions,
        stored_username: Option<String>,
        stored_hash: Option<String>,
        api_keys: Vec<ApiKey>,
    ) -> Self {
        Self {
            key: options.password_key.clone(),
            default_username: options.admin_username.clone(),
            default_secret: options.default_admin_secret.clone(),
            stored_username,
            stored_hash,
            api_keys,
        }
    }

    pub fn api_keys(&self) -> &[ApiKey] {
        &self.api_keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k.key == key)
    }

    pub fn admin_username(&self) -> &str {
        self.stored_username
            .as_deref()
            .unwrap_or(&self.default_username)
    }

    pub fn stored_username(&self) -> Option<&str> {
        self.stored_username.as_deref()
    }

    pub fn stored_password_hash(&self) -> Option<&str> {
        self.stored_hash.as_deref()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC key length is valid")
    }

    /// Keyed hash of a client-hashed secret, hex encoded.
    pub fn hash_secret(&self, client_hash: &str) -> String {
        let mut mac = self.mac();
        mac.update(client_hash.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks a client-hashed secret against the stored (or default) hash
    /// in constant time.
    pub fn verify_secret(&self, client_hash: &str) -> bool {
        let expected = match &self.stored_hash {
            Some(stored) => match hex::decode(stored) {
                Ok(bytes) => bytes,
                Err(_) => return false,
            },
            None => {
                let mut mac = self.mac();
                mac.update(self.default_secret.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };

        let mut mac = self.mac();
        mac.update(client_hash.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn set_password(&mut self, client_hash: &str) {
        self.stored_username = Some(self.admin_username().to_string());
        self.stored_hash = Some(self.hash_secret(client_hash));
    }

    /// Forgets stored credentials; the defaults apply again.
    fn reset(&mut self) {
        self.stored_username = None;
        self.stored_hash = None;
    }

    /// Checks an `Authorization: Basic` value carrying `username:secret`.
    pub fn verify_basic(&self, header: &str) -> bool {
        let Some(encoded) = header.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((username, secret)) => {
                username == self.admin_username() && self.verify_secret(secret)
            }
            None => false,
        }
    }

    fn touch(&mut self, key: &str) -> bool {
        match self.api_keys.iter_mut().find(|k| k.key == key) {
            Some(record) => {
                record.last_used_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

/// Result of a key issuance request.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedKey {
    pub key: String,

    /// False when the key was already whitelisted and simply echoed back
    pub created: bool,
}

/// Five random bytes as ten uppercase hex digits.
///
/// Collisions with existing keys are not retried; a colliding key is echoed
/// back like an already whitelisted one.
fn generate_api_key() -> String {
    let bytes: [u8; 5] = rand::random();
    hex::encode_upper(bytes)
}

impl Gateway {
    /// Fails unless the unlock window is open or the caller is pre-authorized.
    pub fn ensure_may_issue_key(&self, preauthorized: bool) -> Result<(), ApiError> {
        if self.settings.link_button || preauthorized {
            Ok(())
        } else {
            Err(ApiError::LinkButtonNotPressed)
        }
    }

    /// Issues (or echoes) an API key.
    ///
    /// # Errors
    ///
    /// - `LinkButtonNotPressed`: gateway locked and caller not pre-authorized
    /// - `InvalidValue`: supplied key is not a string of at least 10 characters
    pub fn issue_api_key(
        &mut self,
        device_label: &str,
        requested_key: Option<&Value>,
        preauthorized: bool,
    ) -> Result<IssuedKey, ApiError> {
        self.ensure_may_issue_key(preauthorized)?;

        let key = match requested_key {
            Some(Value::String(key)) if key.chars().count() >= MIN_API_KEY_LEN => key.clone(),
            Some(other) => {
                return Err(ApiError::InvalidValue {
                    address: "/".to_string(),
                    parameter: "username".to_string(),
                    value: echo_value(other),
                });
            }
            None => generate_api_key(),
        };

        if self.credentials.contains(&key) {
            tracing::info!(api_key = %key, device = %device_label, "api key already exists");
            return Ok(IssuedKey {
                key,
                created: false,
            });
        }

        self.credentials.api_keys.push(ApiKey::new(
            key.clone(),
            device_label.to_string(),
            Utc::now(),
        ));
        self.queue_save(Partition::Auth, SaveDelay::Short);
        self.token.bump();
        tracing::info!(api_key = %key, device = %device_label, "created api key");

        Ok(IssuedKey { key, created: true })
    }

    /// Looks up the key of an incoming request and records its use.
    pub fn authenticate(&mut self, key: &str) -> Result<(), ApiError> {
        if self.credentials.touch(key) {
            Ok(())
        } else {
            Err(ApiError::Forbidden {
                address: "/".to_string(),
            })
        }
    }

    /// Opens the unlock window for `seconds`, or closes it for 0, and bumps
    /// the change token.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `seconds` exceeds the longest allowed window.
    pub fn unlock(&mut self, seconds: u64) -> Result<(), ApiError> {
        if seconds > MAX_UNLOCK_SECONDS {
            return Err(ApiError::invalid_config_value("unlock", &Value::from(seconds)));
        }
        self.timers.cancel(TimerKey::Relock);

        if seconds > 0 {
            self.settings.link_button = true;
            let now = self.uptime();
            self.timers
                .schedule_once(TimerKey::Relock, now, Duration::from_secs(seconds));
            tracing::info!(seconds, "gateway unlocked");
        } else {
            self.settings.link_button = false;
        }
        self.token.bump();
        Ok(())
    }

    /// Relock timer: closes the unlock window.
    pub(crate) fn relock(&mut self) {
        if self.settings.link_button {
            self.settings.link_button = false;
            self.token.bump();
            tracing::info!("gateway locked");
        }
    }

    /// Replaces the admin secret.
    ///
    /// # Errors
    ///
    /// - `Unauthorized`: wrong username, or `old_hash` does not match
    /// - `InvalidValue`: a hash is empty or not a string
    pub fn change_admin_password(
        &mut self,
        username: &Value,
        old_hash: &Value,
        new_hash: &Value,
    ) -> Result<(), ApiError> {
        if username.as_str() != Some(self.credentials.admin_username()) {
            return Err(ApiError::Unauthorized {
                address: PASSWORD_ADDRESS.to_string(),
                description: format!(
                    "invalid value, {} for parameter, username",
                    echo_value(username)
                ),
            });
        }

        let old_hash = non_empty_hash(old_hash, "oldhash")?;
        let new_hash = non_empty_hash(new_hash, "newhash")?;

        if !self.credentials.verify_secret(old_hash) {
            return Err(ApiError::Unauthorized {
                address: PASSWORD_ADDRESS.to_string(),
                description: format!("invalid value, {old_hash} for parameter, oldhash"),
            });
        }

        self.credentials.set_password(new_hash);
        self.queue_save(Partition::Config, SaveDelay::Short);
        tracing::info!("admin password changed");
        Ok(())
    }

    /// Restores the default admin credentials.
    ///
    /// Only allowed within [`PASSWORD_RESET_WINDOW`] after startup, which
    /// requires physical access to power-cycle the gateway.
    pub fn reset_admin_password(&mut self) -> Result<(), ApiError> {
        if self.uptime() > PASSWORD_RESET_WINDOW {
            tracing::warn!("admin password reset refused, uptime window elapsed");
            return Err(ApiError::Forbidden {
                address: PASSWORD_ADDRESS.to_string(),
            });
        }

        self.credentials.reset();
        self.queue_save(Partition::Config, SaveDelay::Short);
        tracing::info!("admin password reset to defaults");
        Ok(())
    }
}

fn non_empty_hash<'a>(value: &'a Value, parameter: &str) -> Result<&'a str, ApiError> {
    match value.as_str() {
        Some(hash) if !hash.is_empty() => Ok(hash),
        _ => Err(ApiError::InvalidValue {
            address: PASSWORD_ADDRESS.to_string(),
            parameter: parameter.to_string(),
            value: echo_value(value),
        }),
    }
}
