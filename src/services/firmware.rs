//! Firmware and software update orchestrator.
//!
//! # Firmware discovery
//!
//! The radio may not answer right after startup, so its firmware version is
//! polled once per second until it is known. A RaspBee radio (identified by
//! the platform byte of the firmware word) running firmware older than
//! [`MIN_RPI_FIRMWARE_VERSION`] is flagged for update, provided the matching
//! image exists in the firmware directory.
//!
//! If the version is still unknown after a minute and the gateway runs under
//! the autostart environment, a RaspBee is assumed and the image check runs
//! without a version.
//!
//! # Update triggers
//!
//! Updates are performed by the supervisor after this process exits with a
//! designated code. Both triggers save state synchronously and schedule the
//! exit five seconds later.
//!
//! Outside the supported platform both triggers answer with success and do
//! nothing. Callers cannot tell "update scheduled" from "not supported" by
//! the response.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::Partition;
use crate::error::ApiError;
use crate::host::radio::FIRMWARE_UNKNOWN;
use crate::host::supervisor::RestartReason;
use crate::models::gateway_config::{SOFTWARE_VERSION, UpdateChannel, format_firmware_version};
use crate::services::gateway::Gateway;
use crate::services::persistence::SaveDelay;
use crate::services::scheduler::TimerKey;

pub const FIRMWARE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Unknown firmware after this much uptime triggers the RaspBee assumption.
pub const ASSUME_RASPBEE_AFTER: Duration = Duration::from_secs(60);

pub const UPDATE_EXIT_DELAY: Duration = Duration::from_secs(5);

pub const FW_PLATFORM_MASK: u32 = 0x0000_FF00;
pub const FW_PLATFORM_RPI: u32 = 0x0000_0500;
pub const MIN_RPI_FIRMWARE_VERSION: u32 = 0x1A05_0500;

/// Where the orchestrator stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Unknown,
    /// Firmware version not reported yet, poll timer armed
    Polling,
    UpToDate,
    UpdateAvailable,
    /// Exit scheduled; terminal for this process
    UpdateTriggered,
}

impl UpdatePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdatePhase::Unknown => "unknown",
            UpdatePhase::Polling => "polling",
            UpdatePhase::UpToDate => "uptodate",
            UpdatePhase::UpdateAvailable => "updateavailable",
            UpdatePhase::UpdateTriggered => "updatetriggered",
        }
    }
}

#[derive(Debug, Default)]
pub struct UpdateOrchestrator {
    phase: UpdatePhase,
    firmware_version: Option<u32>,
    pending_exit: Option<RestartReason>,
}

impl UpdateOrchestrator {
    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn firmware_version(&self) -> Option<u32> {
        self.firmware_version
    }
}

impl Gateway {
    /// Unknown -> Polling.
    pub(crate) fn start_firmware_discovery(&mut self) {
        if self.updates.phase != UpdatePhase::Unknown {
            return;
        }
        self.updates.phase = UpdatePhase::Polling;
        let now = self.uptime();
        self.timers
            .schedule_once(TimerKey::FirmwarePoll, now, FIRMWARE_POLL_INTERVAL);
    }

    /// Poll timer: queries the radio and re-arms itself while the version
    /// is unknown.
    pub(crate) fn poll_firmware_version(&mut self) {
        if self.updates.firmware_version.is_some() || self.update_in_progress() {
            return;
        }

        let version = self.radio.firmware_version();
        if version != FIRMWARE_UNKNOWN {
            self.on_firmware_version(version);
            return;
        }

        let now = self.uptime();
        self.timers
            .schedule_once(TimerKey::FirmwarePoll, now, FIRMWARE_POLL_INTERVAL);

        if !self.settings.fw_need_update && now >= ASSUME_RASPBEE_AFTER && self.options.auto_connect
        {
            self.check_min_firmware_file();
            if self.settings.fw_need_update {
                self.updates.phase = UpdatePhase::UpdateAvailable;
                self.token.bump();
                tracing::info!(
                    firmware = %self.settings.fw_update_version,
                    "no firmware reported, assuming an outdated RaspBee"
                );
            }
        }
    }

    /// Records a reported firmware version and decides whether it needs an update.
    fn on_firmware_version(&mut self, version: u32) {
        let label = format_firmware_version(version);
        self.updates.firmware_version = Some(version);
        self.settings.fw_version = label.clone();
        self.settings.fw_update_version = label;
        self.settings.fw_need_update = false;

        if version & FW_PLATFORM_MASK == FW_PLATFORM_RPI && version < MIN_RPI_FIRMWARE_VERSION {
            tracing::info!(firmware = %self.settings.fw_version, "firmware shall be updated");
            self.check_min_firmware_file();
        }

        self.updates.phase = if self.settings.fw_need_update {
            UpdatePhase::UpdateAvailable
        } else {
            UpdatePhase::UpToDate
        };
        self.token.bump();
        self.queue_save(Partition::Config, SaveDelay::Short);
        tracing::info!(
            firmware = %self.settings.fw_version,
            phase = self.updates.phase.as_str(),
            "firmware version discovered"
        );
    }

    fn firmware_image_path(&self, version: &str) -> PathBuf {
        self.options
            .firmware_dir
            .join(format!("deCONZ_Rpi_{version}.bin.GCF"))
    }

    /// Flags an update if the minimum-version image is present.
    fn check_min_firmware_file(&mut self) {
        if !self.options.platform.supports_updates() {
            return;
        }

        let target = format_firmware_version(MIN_RPI_FIRMWARE_VERSION);
        let path = self.firmware_image_path(&target);

        if path.exists() {
            self.settings.fw_update_version = target;
            self.settings.fw_need_update = true;
        } else {
            tracing::error!(path = %path.display(), "firmware update image not found");
            self.settings.fw_update_version = self.settings.fw_version.clone();
        }
    }

    fn update_in_progress(&self) -> bool {
        self.updates.phase == UpdatePhase::UpdateTriggered
    }

    /// `POST /api/<key>/config/update`.
    ///
    /// Answers with the version the supervisor would install. An exit is
    /// only scheduled on a supported platform when a newer build was
    /// discovered for the configured channel.
    pub fn trigger_software_update(&mut self) -> String {
        let version = self.settings.sw_update_version.clone();

        if !self.options.platform.supports_updates() || self.update_in_progress() {
            return version;
        }
        if version == SOFTWARE_VERSION {
            return version;
        }
        if self.settings.update_channel == UpdateChannel::Unknown {
            tracing::error!("can't trigger update for unknown update channel");
            return version;
        }

        self.save_now();
        self.schedule_update_exit(RestartReason::SoftwareUpdate(self.settings.update_channel));
        tracing::info!(
            version = %version,
            channel = self.settings.update_channel.as_str(),
            "software update scheduled"
        );
        version
    }

    /// `POST /api/<key>/config/updatefirmware`.
    ///
    /// Answers with the firmware version that would be flashed. Proceeds only
    /// on a supported platform while an update is flagged.
    ///
    /// # Errors
    ///
    /// `Internal` if the flashing script cannot be written.
    pub fn trigger_firmware_update(&mut self) -> Result<String, ApiError> {
        let version = self.settings.fw_update_version.clone();

        if !self.options.platform.supports_updates()
            || self.update_in_progress()
            || !self.settings.fw_need_update
        {
            return Ok(version);
        }

        self.write_update_script(&version).map_err(|err| {
            tracing::error!(
                path = %self.options.update_script_path.display(),
                error = %err,
                "could not write firmware update script"
            );
            ApiError::Internal {
                address: "/config/updatefirmware".to_string(),
                description: "could not prepare firmware update".to_string(),
            }
        })?;

        self.save_now();
        self.schedule_update_exit(RestartReason::FirmwareUpdate);
        tracing::info!(version = %version, "firmware update scheduled");
        Ok(version)
    }

    fn schedule_update_exit(&mut self, reason: RestartReason) {
        self.updates.phase = UpdatePhase::UpdateTriggered;
        self.updates.pending_exit = Some(reason);
        self.timers.cancel(TimerKey::FirmwarePoll);
        let now = self.uptime();
        self.timers
            .schedule_once(TimerKey::UpdateExit, now, UPDATE_EXIT_DELAY);
        self.token.bump();
    }

    /// Exit timer: hands over to the supervisor.
    pub(crate) fn fire_update_exit(&mut self) {
        let Some(reason) = self.updates.pending_exit.take() else {
            return;
        };

        if reason == RestartReason::FirmwareUpdate && !self.settings.fw_need_update {
            tracing::info!("firmware update no longer needed");
            return;
        }

        self.supervisor.request_restart(reason);
    }

    /// Writes the script the supervisor runs to flash the radio. It refuses
    /// to flash if the image went missing in the meantime.
    fn write_update_script(&self, version: &str) -> std::io::Result<()> {
        let image = self.firmware_image_path(version);
        let script = format!(
            "#!/bin/bash\n\
             if [ ! -e \"{image}\" ]; then\n    \
                 exit 1\n\
             fi\n\
             sudo {flasher} -f \"{image}\"\n",
            image = image.display(),
            flasher = self.options.flasher_command,
        );

        let path = &self.options.update_script_path;
        if path.exists() {
            fs::remove_file(path)?;
        }
        fs::write(path, script)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use crate::services::gateway::testing::{Harness, harness, harness_with};

    const OLD_RPI_FIRMWARE: u32 = 0x1A00_0500;

    fn install_min_image(h: &Harness) {
        let dir = &h.gateway.options.firmware_dir;
        fs::create_dir_all(dir).unwrap();
        let image = dir.join(format!(
            "deCONZ_Rpi_{}.bin.GCF",
            format_firmware_version(MIN_RPI_FIRMWARE_VERSION)
        ));
        fs::write(image, b"GCF").unwrap();
    }

    #[test]
    fn unknown_version_keeps_polling() {
        let mut h = harness();
        h.gateway.start();
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::Polling);

        h.run_for(3);
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::Polling);
        assert_eq!(h.gateway.updates.firmware_version(), None);
        assert!(h.gateway.timers.is_pending(TimerKey::FirmwarePoll));
    }

    #[test]
    fn real_version_resolves_once_and_stops_polling() {
        let mut h = harness();
        h.gateway.start();
        h.run_for(2);

        h.radio.update(|s| s.firmware_version = 0x2620_0700);
        let token = h.gateway.change_token().to_string();
        h.run_for(1);

        assert!(h.gateway.updates.firmware_version().is_some());
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpToDate);
        assert_eq!(h.gateway.settings.fw_version, "0x26200700");
        assert!(!h.gateway.timers.is_pending(TimerKey::FirmwarePoll));
        assert_ne!(h.gateway.change_token(), token);

        let token = h.gateway.change_token().to_string();
        h.radio.update(|s| s.firmware_version = 0x2700_0700);
        h.gateway.poll_firmware_version();
        h.run_for(5);
        assert_eq!(h.gateway.settings.fw_version, "0x26200700");
        assert_eq!(h.gateway.change_token(), token);
    }

    #[test]
    fn old_raspbee_firmware_with_image_needs_update() {
        let mut h = harness_with(|_, radio| radio.firmware_version = OLD_RPI_FIRMWARE);
        install_min_image(&h);
        h.gateway.start();
        h.run_for(1);

        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpdateAvailable);
        assert!(h.gateway.settings.fw_need_update);
        assert_eq!(
            h.gateway.settings.fw_update_version,
            format_firmware_version(MIN_RPI_FIRMWARE_VERSION)
        );
    }

    #[test]
    fn old_raspbee_firmware_without_image_stays_current() {
        let mut h = harness_with(|_, radio| radio.firmware_version = OLD_RPI_FIRMWARE);
        h.gateway.start();
        h.run_for(1);

        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpToDate);
        assert!(!h.gateway.settings.fw_need_update);
        assert_eq!(h.gateway.settings.fw_update_version, h.gateway.settings.fw_version);
    }

    #[test]
    fn other_platform_byte_is_never_flagged() {
        let mut h = harness_with(|_, radio| radio.firmware_version = 0x1A00_0700);
        install_min_image(&h);
        h.gateway.start();
        h.run_for(1);

        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpToDate);
    }

    #[test]
    fn auto_connect_assumes_raspbee_after_a_minute() {
        let mut h = harness_with(|options, _| options.auto_connect = true);
        install_min_image(&h);
        h.gateway.start();

        h.run_for(59);
        assert!(!h.gateway.settings.fw_need_update);

        let token = h.gateway.change_token().to_string();
        h.run_for(1);
        assert!(h.gateway.settings.fw_need_update);
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpdateAvailable);
        assert_eq!(h.gateway.updates.firmware_version(), None);
        assert!(h.gateway.timers.is_pending(TimerKey::FirmwarePoll));
        assert_ne!(h.gateway.change_token(), token);
    }

    #[test]
    fn assumed_raspbee_still_picks_up_a_late_version() {
        let mut h = harness_with(|options, _| options.auto_connect = true);
        install_min_image(&h);
        h.gateway.start();
        h.run_for(61);
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpdateAvailable);

        h.radio.update(|s| s.firmware_version = 0x2620_0700);
        h.run_for(1);

        assert_eq!(h.gateway.updates.firmware_version(), Some(0x2620_0700));
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpToDate);
        assert!(!h.gateway.settings.fw_need_update);
        assert!(!h.gateway.timers.is_pending(TimerKey::FirmwarePoll));
    }

    #[test]
    fn assumed_raspbee_can_be_flashed() {
        let mut h = harness_with(|options, _| options.auto_connect = true);
        install_min_image(&h);
        h.gateway.start();
        h.run_for(60);

        let version = h.gateway.trigger_firmware_update().unwrap();
        assert_eq!(version, format_firmware_version(MIN_RPI_FIRMWARE_VERSION));
        assert!(!h.gateway.timers.is_pending(TimerKey::FirmwarePoll));
        h.run_for(5);
        assert_eq!(h.supervisor.requests(), [RestartReason::FirmwareUpdate]);
    }

    #[test]
    fn without_auto_connect_nothing_is_assumed() {
        let mut h = harness();
        install_min_image(&h);
        h.gateway.start();
        h.run_for(90);

        assert!(!h.gateway.settings.fw_need_update);
    }

    #[test]
    fn software_update_exits_with_channel_code() {
        let mut h = harness();
        h.gateway.settings.update_channel = UpdateChannel::Beta;
        h.gateway.settings.sw_update_version = "9.0.0".into();

        assert_eq!(h.gateway.trigger_software_update(), "9.0.0");
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpdateTriggered);
        assert!(!h.store.writes().is_empty());

        h.run_for(4);
        assert!(h.supervisor.requests().is_empty());
        h.run_for(1);
        assert_eq!(
            h.supervisor.requests(),
            [RestartReason::SoftwareUpdate(UpdateChannel::Beta)]
        );
    }

    #[test]
    fn unknown_channel_refuses_software_update() {
        let mut h = harness();
        h.gateway.settings.update_channel = UpdateChannel::Unknown;
        h.gateway.settings.sw_update_version = "9.0.0".into();
        let token = h.gateway.change_token().to_string();

        assert_eq!(h.gateway.trigger_software_update(), "9.0.0");
        assert_ne!(h.gateway.updates.phase(), UpdatePhase::UpdateTriggered);
        assert!(!h.gateway.timers.is_pending(TimerKey::UpdateExit));
        assert_eq!(h.gateway.change_token(), token);

        h.run_for(6);
        assert!(h.supervisor.requests().is_empty());
    }

    #[test]
    fn software_update_without_newer_build_does_nothing() {
        let mut h = harness();
        assert_eq!(h.gateway.trigger_software_update(), SOFTWARE_VERSION);
        assert!(!h.gateway.timers.is_pending(TimerKey::UpdateExit));
    }

    #[test]
    fn second_trigger_does_not_schedule_again() {
        let mut h = harness();
        h.gateway.settings.sw_update_version = "9.0.0".into();
        h.gateway.trigger_software_update();
        h.run_for(2);

        h.gateway.trigger_software_update();
        assert_eq!(
            h.gateway.timers.deadline(TimerKey::UpdateExit),
            Some(UPDATE_EXIT_DELAY)
        );
        h.run_for(10);
        assert_eq!(h.supervisor.requests().len(), 1);
    }

    #[test]
    fn unsupported_platform_reports_success_without_action() {
        let mut h = harness_with(|options, radio| {
            options.platform = Platform::Other;
            radio.firmware_version = OLD_RPI_FIRMWARE;
        });
        h.gateway.settings.sw_update_version = "9.0.0".into();
        h.gateway.settings.fw_need_update = true;

        assert_eq!(h.gateway.trigger_software_update(), "9.0.0");
        assert!(h.gateway.trigger_firmware_update().is_ok());
        h.run_for(10);

        assert!(h.supervisor.requests().is_empty());
        assert!(!h.gateway.options.update_script_path.exists());
    }

    #[test]
    fn firmware_update_writes_script_and_exits() {
        let mut h = harness_with(|_, radio| radio.firmware_version = OLD_RPI_FIRMWARE);
        install_min_image(&h);
        h.gateway.start();
        h.run_for(1);

        let version = h.gateway.trigger_firmware_update().unwrap();
        assert_eq!(version, format_firmware_version(MIN_RPI_FIRMWARE_VERSION));

        let script = fs::read_to_string(&h.gateway.options.update_script_path).unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("exit 1"));
        assert!(script.contains(&format!("GCFFlasher -f \"{}", h.gateway.options.firmware_dir.display())));

        h.run_for(5);
        assert_eq!(h.supervisor.requests(), [RestartReason::FirmwareUpdate]);
    }

    #[test]
    fn firmware_update_requires_flagged_update() {
        let mut h = harness_with(|_, radio| radio.firmware_version = 0x2620_0500);
        h.gateway.start();
        h.run_for(1);

        assert!(h.gateway.trigger_firmware_update().is_ok());
        h.run_for(10);
        assert!(h.supervisor.requests().is_empty());
    }

    #[test]
    fn unwritable_script_is_an_internal_error() {
        let mut h = harness_with(|options, radio| {
            options.update_script_path = PathBuf::from("/nonexistent-dir/update.sh");
            radio.firmware_version = OLD_RPI_FIRMWARE;
        });
        install_min_image(&h);
        h.gateway.start();
        h.run_for(1);

        let err = h.gateway.trigger_firmware_update().unwrap_err();
        assert!(matches!(err, ApiError::Internal { .. }));
        assert_eq!(h.gateway.updates.phase(), UpdatePhase::UpdateAvailable);
    }
}
