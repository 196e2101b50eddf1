//! Debounced persistence queue.
//!
//! Saving is requested per partition with a short or long delay. Requests
//! for a partition that already has a pending save restart its timer, so a
//! burst of changes ends in one write. A long-delay request never postpones
//! a save that is already pending.

use crate::db::Partition;
use crate::services::gateway::Gateway;
use crate::services::scheduler::TimerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDelay {
    Short,
    Long,
}

impl Gateway {
    /// Schedules a write of `partition`.
    pub fn queue_save(&mut self, partition: Partition, delay: SaveDelay) {
        let key = TimerKey::Persist(partition);
        if delay == SaveDelay::Long && self.timers.is_pending(key) {
            return;
        }

        let delay = match delay {
            SaveDelay::Short => self.options.short_save_delay,
            SaveDelay::Long => self.options.long_save_delay,
        };
        let now = self.uptime();
        self.timers.schedule_once(key, now, delay);
    }

    /// Writes one partition now. Failures are logged, never retried here.
    pub(crate) fn flush(&mut self, partition: Partition) {
        let state = self.persisted_state();
        match self.store.save(partition, &state) {
            Ok(()) => tracing::debug!(?partition, "state saved"),
            Err(err) => tracing::error!(?partition, error = %err, "saving state failed"),
        }
    }

    /// Writes every partition synchronously and drops pending saves.
    pub fn save_now(&mut self) {
        for partition in Partition::ALL {
            self.timers.cancel(TimerKey::Persist(partition));
            self.flush(partition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::testing::harness;
    use std::time::Duration;

    #[test]
    fn repeated_requests_coalesce_into_one_write() {
        let mut h = harness();
        h.gateway.save_now();
        let baseline = h.store.writes().len();

        h.gateway.queue_save(Partition::Auth, SaveDelay::Short);
        h.run_for(3);
        h.gateway.queue_save(Partition::Auth, SaveDelay::Short);
        h.run_for(3);
        assert_eq!(h.store.writes().len(), baseline);

        h.run_for(2);
        assert_eq!(h.store.writes()[baseline..], [Partition::Auth]);
    }

    #[test]
    fn partitions_are_debounced_independently() {
        let mut h = harness();
        h.gateway.save_now();
        let baseline = h.store.writes().len();

        h.gateway.queue_save(Partition::Auth, SaveDelay::Short);
        h.gateway.queue_save(Partition::Config, SaveDelay::Short);
        h.run_for(5);

        let mut written = h.store.writes()[baseline..].to_vec();
        written.sort();
        assert_eq!(written, [Partition::Auth, Partition::Config]);
    }

    #[test]
    fn long_delay_does_not_postpone_pending_save() {
        let mut h = harness();
        h.gateway.save_now();

        h.gateway.queue_save(Partition::Config, SaveDelay::Short);
        h.gateway.queue_save(Partition::Config, SaveDelay::Long);
        assert_eq!(
            h.gateway.timers.deadline(TimerKey::Persist(Partition::Config)),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn long_delay_waits_for_the_long_window() {
        let mut h = harness();
        h.gateway.save_now();
        let baseline = h.store.writes().len();

        h.gateway.queue_save(Partition::Config, SaveDelay::Long);
        h.run_for(60);
        assert_eq!(h.store.writes().len(), baseline);

        h.clock.advance(Duration::from_secs(15 * 60));
        h.gateway.tick();
        assert_eq!(h.store.writes()[baseline..], [Partition::Config]);
    }

    #[test]
    fn failed_save_is_logged_and_retried_on_the_next_request() {
        let mut h = harness();
        h.store.set_failing(true);

        h.gateway.queue_save(Partition::Config, SaveDelay::Short);
        h.run_for(5);
        assert!(h.store.writes().is_empty());
        assert!(!h.gateway.timers.is_pending(TimerKey::Persist(Partition::Config)));

        h.gateway.save_now();
        assert!(h.store.writes().is_empty());

        h.store.set_failing(false);
        h.gateway.settings.name = "Cellar".into();
        h.gateway.queue_save(Partition::Config, SaveDelay::Short);
        assert!(h.gateway.timers.is_pending(TimerKey::Persist(Partition::Config)));
        h.run_for(5);

        assert_eq!(h.store.writes(), [Partition::Config]);
        assert_eq!(h.store.state().config.name, "Cellar");
    }

    #[test]
    fn save_now_writes_everything_and_clears_pending() {
        let mut h = harness();
        h.gateway.queue_save(Partition::Auth, SaveDelay::Short);

        h.gateway.save_now();
        assert!(!h.gateway.timers.is_pending(TimerKey::Persist(Partition::Auth)));
        assert!(!h.gateway.timers.is_pending(TimerKey::Persist(Partition::Config)));
        assert_eq!(h.store.writes(), [Partition::Auth, Partition::Config]);
    }
}
