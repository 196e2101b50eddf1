//! The gateway context.
//!
//! [`Gateway`] owns every piece of mutable configuration state together with
//! the host capabilities it needs. The binary keeps exactly one instance
//! behind a mutex; request handlers and the timer loop take turns on it, so
//! no two operations ever interleave.
//!
//! The components (authorization gate, config mutation engine, RF-state
//! reconciler, update orchestrator, persistence queue) are `impl Gateway`
//! blocks in their own modules.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{Config, Platform};
use crate::db::{ConfigTable, Partition, PersistedState, StateStore, StoreError};
use crate::host::inventory::Inventory;
use crate::host::network;
use crate::host::radio::RadioNetwork;
use crate::host::supervisor::Supervisor;
use crate::models::api_key::{WhitelistEntry, format_local};
use crate::models::gateway_config::{GatewayConfig, SOFTWARE_VERSION, format_firmware_version};
use crate::models::snapshot::{ConfigSnapshot, FullState, SwUpdate};
use crate::services::change_token::ChangeToken;
use crate::services::credentials::CredentialStore;
use crate::services::firmware::UpdateOrchestrator;
use crate::services::persistence::SaveDelay;
use crate::services::scheduler::{Clock, Scheduler, TimerKey};

/// Gateway shared between handlers and the timer loop.
pub type SharedGateway = Arc<Mutex<Gateway>>;

/// Period of the RF-state reconciliation tick.
pub const RF_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Settings the gateway takes from the process configuration.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub http_port: u16,
    pub platform: Platform,
    pub auto_connect: bool,
    pub firmware_dir: PathBuf,
    pub update_script_path: PathBuf,
    pub flasher_command: String,
    pub short_save_delay: Duration,
    pub long_save_delay: Duration,
    pub admin_username: String,
    pub default_admin_secret: String,
    pub password_key: String,
}

impl From<&Config> for GatewayOptions {
    fn from(config: &Config) -> Self {
        Self {
            http_port: config.server_port,
            platform: config.platform(),
            auto_connect: config.auto_connect,
            firmware_dir: config.firmware_dir.clone(),
            update_script_path: config.update_script_path.clone(),
            flasher_command: config.flasher_command.clone(),
            short_save_delay: config.short_save_delay(),
            long_save_delay: config.long_save_delay(),
            admin_username: config.admin_username.clone(),
            default_admin_secret: config.default_admin_secret.clone(),
            password_key: config.password_key.clone(),
        }
    }
}

/// Capabilities provided by the host process.
pub struct Host {
    pub radio: Box<dyn RadioNetwork>,
    pub supervisor: Box<dyn Supervisor>,
    pub store: Box<dyn StateStore>,
    pub inventory: Box<dyn Inventory>,
    pub clock: Arc<dyn Clock>,
}

/// Outcome of a read guarded by `If-None-Match`.
#[derive(Debug)]
pub enum ConditionalRead<T> {
    NotModified { token: String },
    Fresh { body: T, token: String },
}

pub struct Gateway {
    pub(crate) settings: GatewayConfig,
    pub(crate) credentials: CredentialStore,
    pub(crate) token: ChangeToken,
    pub(crate) timers: Scheduler,
    pub(crate) updates: UpdateOrchestrator,
    pub(crate) options: GatewayOptions,
    pub(crate) radio: Box<dyn RadioNetwork>,
    pub(crate) supervisor: Box<dyn Supervisor>,
    pub(crate) store: Box<dyn StateStore>,
    inventory: Box<dyn Inventory>,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    /// Builds the gateway from persisted state.
    ///
    /// A config partition without a stored identifier gets a fresh one, which
    /// is queued for saving.
    pub fn load(options: GatewayOptions, host: Host) -> Result<Self, StoreError> {
        let persisted = host.store.load()?;
        let table = persisted.config;

        let mut settings = GatewayConfig {
            name: table.name.clone(),
            uuid: table.uuid.unwrap_or_else(Uuid::new_v4),
            http_port: options.http_port,
            update_channel: table.update_channel,
            group_delay: table.group_delay,
            otau_active: table.otau_active,
            announce_interval: table.announce_interval,
            rf_connected_expected: table.rf_connected_expected,
            ..GatewayConfig::default()
        };
        if let Some(fw_version) = &table.fw_version {
            settings.fw_version = fw_version.clone();
            settings.fw_update_version = fw_version.clone();
        }

        let credentials = CredentialStore::new(
            &options,
            table.admin_username.clone(),
            table.admin_password_hash.clone(),
            persisted.auth.api_keys,
        );

        let mut gateway = Self {
            settings,
            credentials,
            token: ChangeToken::new(),
            timers: Scheduler::default(),
            updates: UpdateOrchestrator::default(),
            options,
            radio: host.radio,
            supervisor: host.supervisor,
            store: host.store,
            inventory: host.inventory,
            clock: host.clock,
        };

        if table.uuid.is_none() {
            gateway.queue_save(Partition::Config, SaveDelay::Short);
        }

        tracing::info!(
            name = %gateway.settings.name,
            api_keys = gateway.credentials.api_keys().len(),
            "gateway state loaded"
        );
        Ok(gateway)
    }

    /// Arms the periodic work: firmware discovery and RF-state checks.
    pub fn start(&mut self) {
        self.start_firmware_discovery();
        self.reconcile_rf_state();
        let now = self.uptime();
        self.timers.schedule_once(TimerKey::RfCheck, now, RF_CHECK_INTERVAL);
    }

    /// Runs every timer that is due.
    pub fn tick(&mut self) {
        let now = self.uptime();
        for key in self.timers.take_due(now) {
            match key {
                TimerKey::Persist(partition) => self.flush(partition),
                TimerKey::Relock => self.relock(),
                TimerKey::FirmwarePoll => self.poll_firmware_version(),
                TimerKey::RfCheck => {
                    self.reconcile_rf_state();
                    self.timers
                        .schedule_once(TimerKey::RfCheck, now, RF_CHECK_INTERVAL);
                }
                TimerKey::UpdateExit => self.fire_update_exit(),
            }
        }
    }

    pub fn uptime(&self) -> Duration {
        self.clock.uptime()
    }

    /// Current change token, quoted for use as an ETag.
    pub fn change_token(&self) -> &str {
        self.token.current()
    }

    pub fn settings(&self) -> &GatewayConfig {
        &self.settings
    }

    /// Everything that is written to the state store.
    pub fn persisted_state(&self) -> PersistedState {
        let mut state = PersistedState::default();
        state.auth.api_keys = self.credentials.api_keys().to_vec();
        state.config = ConfigTable {
            name: self.settings.name.clone(),
            uuid: Some(self.settings.uuid),
            update_channel: self.settings.update_channel,
            group_delay: self.settings.group_delay,
            otau_active: self.settings.otau_active,
            announce_interval: self.settings.announce_interval,
            rf_connected_expected: self.settings.rf_connected_expected,
            fw_version: Some(self.settings.fw_version.clone()),
            admin_username: self.credentials.stored_username().map(str::to_string),
            admin_password_hash: self.credentials.stored_password_hash().map(str::to_string),
        };
        state
    }

    /// Reconciles the RF state, then answers with `build` unless the caller
    /// already holds the current token.
    pub fn read_conditional<T>(
        &mut self,
        if_none_match: Option<&str>,
        build: impl FnOnce(&Self) -> T,
    ) -> ConditionalRead<T> {
        self.reconcile_rf_state();

        let token = self.change_token().to_string();
        if if_none_match.is_some_and(|tag| self.token.matches(tag)) {
            return ConditionalRead::NotModified { token };
        }
        ConditionalRead::Fresh {
            body: build(self),
            token,
        }
    }

    pub fn config_snapshot(&self) -> ConfigSnapshot {
        let iface = network::primary_interface();
        let settings = &self.settings;

        let otaustate = if self.radio.otau_busy() {
            "busy"
        } else if settings.otau_active {
            "idle"
        } else {
            "off"
        };

        ConfigSnapshot {
            name: settings.name.clone(),
            uuid: settings.uuid.to_string(),
            ipaddress: iface.ip,
            netmask: iface.netmask,
            mac: iface.mac,
            port: settings.http_port,
            dhcp: true,
            gateway: "192.168.178.1".to_string(),
            proxyaddress: String::new(),
            proxyport: 0,
            utc: format_local(chrono::Utc::now()),
            whitelist: self
                .credentials
                .api_keys()
                .iter()
                .map(|key| (key.key.clone(), WhitelistEntry::from(key)))
                .collect(),
            swversion: SOFTWARE_VERSION.to_string(),
            fwversion: settings.fw_version.clone(),
            fwneedupdate: settings.fw_need_update,
            announceurl: settings.announce_url.clone(),
            announceinterval: settings.announce_interval,
            rfconnected: settings.rf_connected,
            permitjoin: settings.permit_join,
            otauactive: settings.otau_active,
            otaustate,
            groupdelay: settings.group_delay,
            discovery: settings.announce_interval > 0,
            updatechannel: settings.update_channel.as_str().to_string(),
            swupdate: SwUpdate {
                version: settings.sw_update_version.clone(),
                updatestate: 0,
                url: String::new(),
                text: String::new(),
                notify: false,
            },
            linkbutton: settings.link_button,
            portalservices: false,
        }
    }

    pub fn full_state(&self) -> FullState {
        FullState {
            lights: self.inventory.lights(),
            groups: self.inventory.groups(),
            config: self.config_snapshot(),
            schedules: self.inventory.schedules(),
        }
    }

    /// Firmware version currently known to the orchestrator.
    pub fn firmware_version_label(&self) -> String {
        self.updates
            .firmware_version()
            .map(format_firmware_version)
            .unwrap_or_else(|| self.settings.fw_version.clone())
    }
}
