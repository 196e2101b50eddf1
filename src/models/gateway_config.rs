//! Gateway settings model.
//!
//! `GatewayConfig` is the flat record of runtime settings owned by the
//! gateway context. It is loaded from the config partition at startup and
//! only ever overwritten, never deleted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_GATEWAY_NAME: &str = "Gateway";

/// Longest accepted gateway name, in characters.
pub const MAX_NAME_LEN: usize = 16;

/// Upper bound for `groupdelay`, in milliseconds.
pub const MAX_GROUP_SEND_DELAY: u64 = 5000;

/// Upper bound for `unlock`, in seconds.
pub const MAX_UNLOCK_SECONDS: u64 = 600;

/// Announce interval applied when discovery is switched on, in minutes.
pub const ANNOUNCE_INTERVAL_MINUTES: u32 = 45;

/// Version of the running build.
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release channel the supervisor pulls software updates from.
///
/// Unrecognized persisted values load as `Unknown`; requests can never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateChannel {
    #[default]
    Stable,
    Alpha,
    Beta,
    #[serde(other)]
    Unknown,
}

impl UpdateChannel {
    /// Parses a channel name as accepted from clients.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "stable" => Some(UpdateChannel::Stable),
            "alpha" => Some(UpdateChannel::Alpha),
            "beta" => Some(UpdateChannel::Beta),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateChannel::Stable => "stable",
            UpdateChannel::Alpha => "alpha",
            UpdateChannel::Beta => "beta",
            UpdateChannel::Unknown => "unknown",
        }
    }
}

/// Runtime settings of the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub name: String,
    pub uuid: Uuid,
    pub http_port: u16,
    pub update_channel: UpdateChannel,

    /// Software version the supervisor would install; equals
    /// [`SOFTWARE_VERSION`] while no newer build was discovered.
    pub sw_update_version: String,

    /// Radio firmware as `0x%08x`, `0x00000000` while unknown
    pub fw_version: String,

    /// Firmware version an update would flash
    pub fw_update_version: String,
    pub fw_need_update: bool,

    /// Permit-join window in seconds
    pub permit_join: u8,

    /// Delay between group commands in milliseconds
    pub group_delay: u64,
    pub otau_active: bool,

    /// Internet discovery announce interval in minutes, 0 disables it
    pub announce_interval: u32,
    pub announce_url: String,

    /// Reported radio connection state
    pub rf_connected: bool,

    /// Persisted connection state the gateway should restore
    pub rf_connected_expected: bool,

    /// Unlock window open, new API keys may be issued
    pub link_button: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_GATEWAY_NAME.to_string(),
            uuid: Uuid::new_v4(),
            http_port: 80,
            update_channel: UpdateChannel::Stable,
            sw_update_version: SOFTWARE_VERSION.to_string(),
            fw_version: format_firmware_version(0),
            fw_update_version: format_firmware_version(0),
            fw_need_update: false,
            permit_join: 0,
            group_delay: 0,
            otau_active: false,
            announce_interval: ANNOUNCE_INTERVAL_MINUTES,
            announce_url: String::new(),
            rf_connected: false,
            rf_connected_expected: false,
            link_button: false,
        }
    }
}

/// Renders a firmware word as `0x%08x`.
pub fn format_firmware_version(version: u32) -> String {
    format!("0x{version:08x}")
}
