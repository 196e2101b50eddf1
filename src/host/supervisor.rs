//! Restart requests.
//!
//! Updates are carried out by an external supervisor that restarts the
//! gateway process. The core signals what it wants through the exit code.

use crate::models::gateway_config::UpdateChannel;

/// Why the gateway asks to be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Install the latest software from a release channel
    SoftwareUpdate(UpdateChannel),
    /// Flash the radio firmware with the generated helper script
    FirmwareUpdate,
}

impl RestartReason {
    /// Process exit code the supervisor recognizes. An unknown channel has
    /// none, the supervisor would not know what to install.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            RestartReason::SoftwareUpdate(UpdateChannel::Stable) => Some(40),
            RestartReason::SoftwareUpdate(UpdateChannel::Beta) => Some(42),
            RestartReason::SoftwareUpdate(UpdateChannel::Alpha) => Some(43),
            RestartReason::SoftwareUpdate(UpdateChannel::Unknown) => None,
            RestartReason::FirmwareUpdate => Some(44),
        }
    }
}

/// Capability to hand control to the supervisor.
pub trait Supervisor: Send {
    fn request_restart(&mut self, reason: RestartReason);
}

/// Terminates the process with the reason's exit code.
#[derive(Debug, Default)]
pub struct ProcessSupervisor;

impl Supervisor for ProcessSupervisor {
    fn request_restart(&mut self, reason: RestartReason) {
        let Some(code) = reason.exit_code() else {
            tracing::error!(?reason, "no exit code for restart reason, staying up");
            return;
        };
        tracing::info!(?reason, code, "handing over to supervisor");
        std::process::exit(code);
    }
}

/// Records requests instead of exiting.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingSupervisor {
    requests: std::sync::Arc<parking_lot::Mutex<Vec<RestartReason>>>,
}

#[cfg(test)]
impl RecordingSupervisor {
    pub fn requests(&self) -> Vec<RestartReason> {
        self.requests.lock().clone()
    }
}

#[cfg(test)]
impl Supervisor for RecordingSupervisor {
    fn request_restart(&mut self, reason: RestartReason) {
        self.requests.lock().push(reason);
    }
}
