//! Persistent state store.
//!
//! The gateway state is split into two partitions that are saved
//! independently:
//! - `Auth`: the API key whitelist
//! - `Config`: gateway settings and admin credentials
//!
//! [`JsonFileStore`] keeps each partition in its own JSON file. Writes go to a
//! temporary file first and are renamed into place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::api_key::ApiKey;
use crate::models::gateway_config::{
    ANNOUNCE_INTERVAL_MINUTES, DEFAULT_GATEWAY_NAME, UpdateChannel,
};

/// Independently saved slice of the gateway state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Auth,
    Config,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Auth, Partition::Config];

    fn file_name(self) -> &'static str {
        match self {
            Partition::Auth => "auth.json",
            Partition::Config => "config.json",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of the auth partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthTable {
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

/// Contents of the config partition.
///
/// Every field has a default so older or partial files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigTable {
    pub name: String,
    pub uuid: Option<Uuid>,
    pub update_channel: UpdateChannel,
    pub group_delay: u64,
    pub otau_active: bool,
    pub announce_interval: u32,
    pub rf_connected_expected: bool,
    pub fw_version: Option<String>,

    /// Absent after a password reset; the defaults apply then.
    pub admin_username: Option<String>,
    pub admin_password_hash: Option<String>,
}

impl Default for ConfigTable {
    fn default() -> Self {
        Self {
            name: DEFAULT_GATEWAY_NAME.to_string(),
            uuid: None,
            update_channel: UpdateChannel::Stable,
            group_delay: 0,
            otau_active: false,
            announce_interval: ANNOUNCE_INTERVAL_MINUTES,
            rf_connected_expected: false,
            fw_version: None,
            admin_username: None,
            admin_password_hash: None,
        }
    }
}

/// Everything the gateway persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub auth: AuthTable,
    pub config: ConfigTable,
}

/// Persistence collaborator.
///
/// `save` writes only the named partition of `state`.
pub trait StateStore: Send {
    fn load(&self) -> Result<PersistedState, StoreError>;

    fn save(&mut self, partition: Partition, state: &PersistedState) -> Result<(), StoreError>;
}

/// JSON files under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Opens (and creates, if needed) the data directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, partition: Partition) -> PathBuf {
        self.dir.join(partition.file_name())
    }

    fn read<T: for<'de> Deserialize<'de> + Default>(
        &self,
        partition: Partition,
    ) -> Result<T, StoreError> {
        let path = self.path(partition);
        if !path.exists() {
            return Ok(T::default());
        }
        let raw = fs::read(&path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(PersistedState {
            auth: self.read(Partition::Auth)?,
            config: self.read(Partition::Config)?,
        })
    }

    fn save(&mut self, partition: Partition, state: &PersistedState) -> Result<(), StoreError> {
        let encoded = match partition {
            Partition::Auth => serde_json::to_vec_pretty(&state.auth)?,
            Partition::Config => serde_json::to_vec_pretty(&state.config)?,
        };

        let path = self.path(partition);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory store that records every write.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: std::sync::Arc<parking_lot::Mutex<MemoryStoreInner>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MemoryStoreInner {
    state: PersistedState,
    writes: Vec<Partition>,
    failing: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::default();
        store.inner.lock().state = state;
        store
    }

    pub fn writes(&self) -> Vec<Partition> {
        self.inner.lock().writes.clone()
    }

    pub fn state(&self) -> PersistedState {
        self.inner.lock().state.clone()
    }

    /// Makes every following save fail with an I/O error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

#[cfg(test)]
impl StateStore for MemoryStore {
    fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(self.inner.lock().state.clone())
    }

    fn save(&mut self, partition: Partition, state: &PersistedState) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        match partition {
            Partition::Auth => inner.state.auth = state.auth.clone(),
            Partition::Config => inner.state.config = state.config.clone(),
        }
        inner.writes.push(partition);
        Ok(())
    }
}
