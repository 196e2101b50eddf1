//! Config mutation engine - `PUT /api/<key>/config`.
//!
//! A batch is a JSON object of named settings. Every recognized field is
//! validated and applied on its own and yields exactly one outcome; a bad
//! field never stops its siblings. Unrecognized fields are ignored.
//!
//! # Change Token
//!
//! The change token is bumped at most once per batch, after all fields were
//! processed, and only if at least one field changed observable state. Bumps
//! made by the operations a field delegates to are merged into that one.

use serde_json::{Map, Value};

use crate::db::Partition;
use crate::error::ApiError;
use crate::models::gateway_config::{
    ANNOUNCE_INTERVAL_MINUTES, DEFAULT_GATEWAY_NAME, MAX_GROUP_SEND_DELAY, MAX_NAME_LEN,
    MAX_UNLOCK_SECONDS, SOFTWARE_VERSION, UpdateChannel,
};
use crate::models::response::FieldOutcome;
use crate::services::gateway::Gateway;
use crate::services::persistence::SaveDelay;

/// Fields understood by the batch, in processing order.
const FIELDS: [&str; 8] = [
    "name",
    "rfconnected",
    "updatechannel",
    "permitjoin",
    "groupdelay",
    "otauactive",
    "discovery",
    "unlock",
];

/// Outcome of a config batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// One outcome per recognized field
    pub outcomes: Vec<FieldOutcome>,

    /// Whether observable state changed (and the token was bumped)
    pub changed: bool,
}

impl BatchResult {
    /// True when there were recognized fields and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && !self.outcomes.iter().any(FieldOutcome::is_success)
    }
}

/// Accepts non-negative whole numbers, also when sent as `30.0`.
fn whole_number(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64)
            .map(|n| n as u64)
    })
}

fn bounded(value: &Value, field: &str, max: u64) -> Result<u64, ApiError> {
    whole_number(value)
        .filter(|n| *n <= max)
        .ok_or_else(|| ApiError::invalid_config_value(field, value))
}

fn boolean(value: &Value, field: &str) -> Result<bool, ApiError> {
    value
        .as_bool()
        .ok_or_else(|| ApiError::invalid_config_value(field, value))
}

impl Gateway {
    /// Applies a batch of settings.
    ///
    /// # Errors
    ///
    /// `InvalidJson` if the batch is empty; all other failures are reported
    /// per field inside the result.
    pub fn apply_config_batch(&mut self, fields: &Map<String, Value>) -> Result<BatchResult, ApiError> {
        if fields.is_empty() {
            return Err(ApiError::InvalidJson {
                address: String::new(),
            });
        }

        let mut changed = false;
        let mut outcomes = Vec::new();
        self.token.hold();

        for field in FIELDS {
            let Some(value) = fields.get(field) else {
                continue;
            };

            let applied = match field {
                "name" => self.set_name(value, &mut changed),
                "rfconnected" => self.set_rf_connected(value, &mut changed),
                "updatechannel" => self.set_update_channel(value, &mut changed),
                "permitjoin" => self.set_permit_join(value, &mut changed),
                "groupdelay" => self.set_group_delay(value, &mut changed),
                "otauactive" => self.set_otau_active(value, &mut changed),
                "discovery" => self.set_discovery(value, &mut changed),
                _ => self.set_unlock(value, &mut changed),
            };

            outcomes.push(match applied {
                Ok(applied) => FieldOutcome::success(format!("/config/{field}"), applied),
                Err(err) => {
                    tracing::debug!(field, error = %err, "config field rejected");
                    FieldOutcome::Failure(err)
                }
            });
        }

        if changed {
            self.token.bump();
        }
        self.token.release();

        Ok(BatchResult { outcomes, changed })
    }

    fn set_name(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let name = value
            .as_str()
            .filter(|name| name.chars().count() <= MAX_NAME_LEN)
            .ok_or_else(|| ApiError::invalid_config_value("name", value))?;

        let name = if name.is_empty() {
            DEFAULT_GATEWAY_NAME
        } else {
            name
        };

        if self.settings.name != name {
            self.settings.name = name.to_string();
            self.queue_save(Partition::Config, SaveDelay::Short);
            *changed = true;
        }
        Ok(Value::from(self.settings.name.clone()))
    }

    /// The radio is asked first; state only changes if it accepts.
    fn set_rf_connected(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let connected = boolean(value, "rfconnected")?;

        if self.radio.touchlink_active() {
            return Err(ApiError::BridgeBusy {
                address: "/config/rfconnected".to_string(),
            });
        }

        if let Err(err) = self.radio.set_network_state(connected) {
            tracing::warn!(connected, error = %err, "radio refused network state change");
            return Err(ApiError::DeviceOff {
                address: "/config/rfconnected".to_string(),
                parameter: "rfconnected".to_string(),
            });
        }

        if self.settings.rf_connected != connected {
            self.settings.rf_connected = connected;
            *changed = true;
        }
        if self.settings.rf_connected_expected != connected {
            self.settings.rf_connected_expected = connected;
            self.queue_save(Partition::Config, SaveDelay::Long);
        }
        Ok(Value::from(connected))
    }

    fn set_update_channel(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let channel = value
            .as_str()
            .and_then(UpdateChannel::parse)
            .ok_or_else(|| ApiError::invalid_config_value("updatechannel", value))?;

        if self.settings.update_channel != channel {
            self.settings.update_channel = channel;
            // rediscovered for the new channel
            self.settings.sw_update_version = SOFTWARE_VERSION.to_string();
            self.queue_save(Partition::Config, SaveDelay::Short);
            *changed = true;
        }
        Ok(Value::from(channel.as_str()))
    }

    fn set_permit_join(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let seconds = bounded(value, "permitjoin", u8::MAX.into())? as u8;

        if self.settings.permit_join != seconds {
            *changed = true;
        }
        self.settings.permit_join = seconds;
        self.radio.set_permit_join(seconds);
        Ok(Value::from(seconds))
    }

    fn set_group_delay(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let milliseconds = bounded(value, "groupdelay", MAX_GROUP_SEND_DELAY)?;

        if self.settings.group_delay != milliseconds {
            self.settings.group_delay = milliseconds;
            self.queue_save(Partition::Config, SaveDelay::Short);
            *changed = true;
        }
        Ok(Value::from(milliseconds))
    }

    fn set_otau_active(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let active = boolean(value, "otauactive")?;

        if self.settings.otau_active != active {
            self.settings.otau_active = active;
            self.queue_save(Partition::Config, SaveDelay::Short);
            *changed = true;
        }
        Ok(Value::from(active))
    }

    /// Change is detected on the resulting interval, not on the flag.
    fn set_discovery(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let discovery = boolean(value, "discovery")?;
        let interval = if discovery {
            ANNOUNCE_INTERVAL_MINUTES
        } else {
            0
        };

        if self.settings.announce_interval != interval {
            self.settings.announce_interval = interval;
            self.queue_save(Partition::Config, SaveDelay::Short);
            *changed = true;
        }
        Ok(Value::from(discovery))
    }

    /// Every accepted unlock counts as a change, even if the window state
    /// stays the same.
    fn set_unlock(&mut self, value: &Value, changed: &mut bool) -> Result<Value, ApiError> {
        let seconds = bounded(value, "unlock", MAX_UNLOCK_SECONDS)?;

        self.unlock(seconds)?;
        *changed = true;
        Ok(Value::from(seconds))
    }
}
