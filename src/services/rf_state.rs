//! RF-state reconciler.
//!
//! Mirrors the radio's "in network" flag into the reported `rfconnected`
//! setting. While touchlink runs the gateway always reports connected,
//! because touchlink needs the radio link up.

use crate::db::Partition;
use crate::services::gateway::Gateway;
use crate::services::persistence::SaveDelay;

impl Gateway {
    /// Runs on every config read and on the periodic RF check.
    pub fn reconcile_rf_state(&mut self) {
        let connected = self.radio.touchlink_active() || self.radio.is_in_network();

        if connected != self.settings.rf_connected {
            self.settings.rf_connected = connected;
            self.token.bump();
            tracing::info!(connected, "radio connection state changed");
        }

        // one-way latch; only an explicit request clears it
        if self.settings.rf_connected && !self.settings.rf_connected_expected {
            self.settings.rf_connected_expected = true;
            self.queue_save(Partition::Config, SaveDelay::Long);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Partition;
    use crate::services::gateway::RF_CHECK_INTERVAL;
    use crate::services::gateway::testing::{harness, harness_with};
    use crate::services::scheduler::TimerKey;

    #[test]
    fn mirrors_radio_state_and_bumps_on_transition() {
        let mut h = harness_with(|_, radio| radio.in_network = false);
        let token = h.gateway.change_token().to_string();

        h.gateway.reconcile_rf_state();
        assert!(!h.gateway.settings.rf_connected);
        assert_eq!(h.gateway.change_token(), token);

        h.radio.update(|s| s.in_network = true);
        h.gateway.reconcile_rf_state();
        assert!(h.gateway.settings.rf_connected);
        assert_ne!(h.gateway.change_token(), token);

        let token = h.gateway.change_token().to_string();
        h.gateway.reconcile_rf_state();
        assert_eq!(h.gateway.change_token(), token);
    }

    #[test]
    fn touchlink_forces_connected() {
        let mut h = harness_with(|_, radio| {
            radio.in_network = false;
            radio.touchlink_active = true;
        });

        h.gateway.reconcile_rf_state();
        assert!(h.gateway.settings.rf_connected);

        h.radio.update(|s| s.touchlink_active = false);
        h.gateway.reconcile_rf_state();
        assert!(!h.gateway.settings.rf_connected);
    }

    #[test]
    fn expectation_latches_on_and_is_not_downgraded() {
        let mut h = harness();
        h.gateway.save_now();

        h.gateway.reconcile_rf_state();
        assert!(h.gateway.settings.rf_connected_expected);
        assert!(h.gateway.timers.is_pending(TimerKey::Persist(Partition::Config)));

        h.radio.update(|s| s.in_network = false);
        h.gateway.reconcile_rf_state();
        assert!(!h.gateway.settings.rf_connected);
        assert!(h.gateway.settings.rf_connected_expected);
    }

    #[test]
    fn periodic_check_picks_up_radio_changes() {
        let mut h = harness_with(|_, radio| radio.in_network = false);
        h.gateway.start();
        assert!(!h.gateway.settings.rf_connected);

        h.radio.update(|s| s.in_network = true);
        h.run_for(RF_CHECK_INTERVAL.as_secs());
        assert!(h.gateway.settings.rf_connected);
        assert!(h.gateway.timers.is_pending(TimerKey::RfCheck));
    }
}
