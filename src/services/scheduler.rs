//! One-shot timers keyed by purpose.
//!
//! The gateway owns a single [`Scheduler`]. Each [`TimerKey`] has at most one
//! pending deadline: scheduling a key again replaces its deadline instead of
//! stacking a second timer. Deadlines are measured as process uptime read
//! from a [`Clock`], so tests can drive time by hand.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::db::Partition;

/// Source of process uptime.
pub trait Clock: Send + Sync {
    fn uptime(&self) -> Duration;
}

/// Uptime measured from construction.
#[derive(Debug)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Clock advanced explicitly by tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: std::sync::Arc<parking_lot::Mutex<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, uptime: Duration) {
        *self.now.lock() = uptime;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn uptime(&self) -> Duration {
        *self.now.lock()
    }
}

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Write a state partition
    Persist(Partition),
    /// Close the unlock window
    Relock,
    /// Ask the radio for its firmware version
    FirmwarePoll,
    /// Reconcile the reported radio connection state
    RfCheck,
    /// Hand over to the supervisor for an update
    UpdateExit,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: HashMap<TimerKey, Duration>,
}

impl Scheduler {
    /// Arms `key` to fire `delay` after `now`, replacing any pending deadline.
    /// Deadlines saturate at `Duration::MAX`.
    pub fn schedule_once(&mut self, key: TimerKey, now: Duration, delay: Duration) {
        self.pending.insert(key, now.saturating_add(delay));
    }

    /// Stops `key`; returns whether it was pending.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.pending.remove(&key).is_some()
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn deadline(&self, key: TimerKey) -> Option<Duration> {
        self.pending.get(&key).copied()
    }

    /// Removes and returns every key whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Duration) -> Vec<TimerKey> {
        let mut due: Vec<(Duration, TimerKey)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, *key))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);

        for (_, key) in &due {
            self.pending.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn rescheduling_replaces_the_deadline() {
        let mut timers = Scheduler::default();
        timers.schedule_once(TimerKey::Relock, secs(0), secs(5));
        timers.schedule_once(TimerKey::Relock, secs(3), secs(5));

        assert!(timers.take_due(secs(5)).is_empty());
        assert_eq!(timers.take_due(secs(8)), vec![TimerKey::Relock]);
        assert!(!timers.is_pending(TimerKey::Relock));
    }

    #[test]
    fn due_keys_come_out_in_deadline_order() {
        let mut timers = Scheduler::default();
        timers.schedule_once(TimerKey::FirmwarePoll, secs(0), secs(3));
        timers.schedule_once(TimerKey::Persist(Partition::Auth), secs(0), secs(1));
        timers.schedule_once(TimerKey::UpdateExit, secs(0), secs(10));

        assert_eq!(
            timers.take_due(secs(4)),
            vec![TimerKey::Persist(Partition::Auth), TimerKey::FirmwarePoll]
        );
        assert!(timers.is_pending(TimerKey::UpdateExit));
    }

    #[test]
    fn huge_delays_saturate_instead_of_overflowing() {
        let mut timers = Scheduler::default();
        timers.schedule_once(TimerKey::RfCheck, secs(10), Duration::MAX);

        assert_eq!(timers.deadline(TimerKey::RfCheck), Some(Duration::MAX));
        assert!(timers.take_due(secs(1_000_000)).is_empty());
        assert!(timers.is_pending(TimerKey::RfCheck));
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut timers = Scheduler::default();
        timers.schedule_once(TimerKey::Relock, secs(0), secs(1));

        assert!(timers.cancel(TimerKey::Relock));
        assert!(!timers.cancel(TimerKey::Relock));
        assert!(timers.take_due(secs(60)).is_empty());
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::default();
        assert_eq!(clock.uptime(), Duration::ZERO);
        clock.advance(secs(2));
        clock.advance(secs(3));
        assert_eq!(clock.uptime(), secs(5));
        clock.set(secs(601));
        assert_eq!(clock.uptime(), secs(601));
    }
}
