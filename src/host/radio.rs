//! Radio network collaborator.
//!
//! Calls are synchronous, non-blocking queries. Failures surface as sentinel
//! values (firmware word `0`) or as a [`RadioError`], never as panics.

use parking_lot::Mutex;
use std::sync::Arc;

/// Firmware word reported while the radio has not answered yet.
pub const FIRMWARE_UNKNOWN: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("radio device is off")]
    DeviceOff,
}

/// Narrow status and control interface of the radio network stack.
pub trait RadioNetwork: Send {
    /// Firmware word of the attached radio, [`FIRMWARE_UNKNOWN`] if not known yet.
    fn firmware_version(&self) -> u32;

    fn is_in_network(&self) -> bool;

    /// Requests a network join (`true`) or leave (`false`).
    fn set_network_state(&mut self, in_network: bool) -> Result<(), RadioError>;

    /// True while the exclusive touchlink mode runs.
    fn touchlink_active(&self) -> bool;

    /// Opens the join window for `seconds`, 0 closes it.
    fn set_permit_join(&mut self, seconds: u8);

    fn otau_busy(&self) -> bool;
}

/// Observable state of a [`SimulatedRadio`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioStatus {
    pub firmware_version: u32,
    pub in_network: bool,
    pub touchlink_active: bool,
    pub permit_join: u8,
    pub otau_busy: bool,
    pub powered_off: bool,
}

/// In-process radio used when no radio stack is linked.
///
/// Clones share one status, so a handle kept outside the gateway can steer
/// the radio the gateway sees.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRadio {
    status: Arc<Mutex<RadioStatus>>,
}

impl SimulatedRadio {
    pub fn new(status: RadioStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn status(&self) -> RadioStatus {
        self.status.lock().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut RadioStatus)) {
        f(&mut self.status.lock());
    }
}

impl RadioNetwork for SimulatedRadio {
    fn firmware_version(&self) -> u32 {
        self.status.lock().firmware_version
    }

    fn is_in_network(&self) -> bool {
        self.status.lock().in_network
    }

    fn set_network_state(&mut self, in_network: bool) -> Result<(), RadioError> {
        let mut status = self.status.lock();
        if status.powered_off {
            return Err(RadioError::DeviceOff);
        }
        status.in_network = in_network;
        Ok(())
    }

    fn touchlink_active(&self) -> bool {
        self.status.lock().touchlink_active
    }

    fn set_permit_join(&mut self, seconds: u8) {
        self.status.lock().permit_join = seconds;
    }

    fn otau_busy(&self) -> bool {
        self.status.lock().otau_busy
    }
}
