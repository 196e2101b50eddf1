//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Hardware family the gateway runs on.
///
/// Software and firmware updates are only carried out on `Arm` boards; on
/// every other platform the update triggers answer with success but do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Arm,
    Other,
}

impl Platform {
    /// Platform of the running binary.
    pub fn detect() -> Self {
        if cfg!(any(target_arch = "arm", target_arch = "aarch64")) {
            Platform::Arm
        } else {
            Platform::Other
        }
    }

    pub fn supports_updates(self) -> bool {
        self == Platform::Arm
    }
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8080
/// - `DATA_DIR` (optional): directory holding `auth.json` and `config.json`
/// - `FIRMWARE_DIR` (optional): directory with radio firmware images
/// - `UPDATE_SCRIPT_PATH` (optional): where the firmware flashing script is written
/// - `FLASHER_COMMAND` (optional): flashing tool invoked by that script
/// - `AUTO_CONNECT` (optional): set when started by the autostart environment
/// - `PLATFORM` (optional): `arm` or `other`, detected when unset
/// - `ADMIN_USERNAME`, `DEFAULT_ADMIN_SECRET`, `PASSWORD_KEY` (optional): admin credentials
/// - `SHORT_SAVE_DELAY_SECS`, `LONG_SAVE_DELAY_SECS` (optional): persistence debounce
/// - `RADIO_FIRMWARE_VERSION`, `RADIO_IN_NETWORK` (optional): simulated radio state
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_firmware_dir")]
    pub firmware_dir: PathBuf,

    #[serde(default = "default_update_script_path")]
    pub update_script_path: PathBuf,

    #[serde(default = "default_flasher_command")]
    pub flasher_command: String,

    #[serde(default)]
    pub auto_connect: bool,

    pub platform: Option<Platform>,

    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    #[serde(default = "default_admin_secret")]
    pub default_admin_secret: String,

    #[serde(default = "default_password_key")]
    pub password_key: String,

    #[serde(default = "default_short_save_delay")]
    pub short_save_delay_secs: u64,

    #[serde(default = "default_long_save_delay")]
    pub long_save_delay_secs: u64,

    /// Firmware word reported by the simulated radio, as hex (`0x1a050500`).
    pub radio_firmware_version: Option<String>,

    #[serde(default = "default_in_network")]
    pub radio_in_network: bool,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_firmware_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("raspbee_firmware")
}

fn default_update_script_path() -> PathBuf {
    PathBuf::from("/var/tmp/gateway-update-firmware.sh")
}

fn default_flasher_command() -> String {
    "GCFFlasher".to_string()
}

fn default_admin_username() -> String {
    "delight".to_string()
}

fn default_admin_secret() -> String {
    "delight".to_string()
}

fn default_password_key() -> String {
    "gw-admin-8282jdkmskwiu29291".to_string()
}

fn default_short_save_delay() -> u64 {
    5
}

fn default_long_save_delay() -> u64 {
    15 * 60
}

fn default_in_network() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variable values cannot be parsed into expected types.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: data_dir -> DATA_DIR
        envy::from_env::<Config>()
    }

    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::detect)
    }

    pub fn short_save_delay(&self) -> Duration {
        Duration::from_secs(self.short_save_delay_secs)
    }

    pub fn long_save_delay(&self) -> Duration {
        Duration::from_secs(self.long_save_delay_secs)
    }

    /// Parses `RADIO_FIRMWARE_VERSION`; unparseable values read as unknown (0).
    pub fn radio_firmware_word(&self) -> u32 {
        self.radio_firmware_version
            .as_deref()
            .map(|raw| raw.trim_start_matches("0x").trim_start_matches("0X"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) fn test_config(data_dir: PathBuf) -> Config {
    Config {
        server_port: default_port(),
        firmware_dir: data_dir.join("firmware"),
        update_script_path: data_dir.join("update-firmware.sh"),
        data_dir,
        flasher_command: default_flasher_command(),
        auto_connect: false,
        platform: Some(Platform::Arm),
        admin_username: default_admin_username(),
        default_admin_secret: default_admin_secret(),
        password_key: default_password_key(),
        short_save_delay_secs: default_short_save_delay(),
        long_save_delay_secs: default_long_save_delay(),
        radio_firmware_version: None,
        radio_in_network: true,
    }
}
