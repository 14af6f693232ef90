//! Periodic tick handle for the speed ramp.
//!
//! The timer does not sleep or spawn anything. It only tracks when the next
//! tick is due; the controller loop waits on [`TickTimer::deadline`] and calls
//! [`TickTimer::fire`] when it elapses. Killing the timer is dropping it.

use std::time::{Duration, Instant};

/// A resumable, killable periodic deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct TickTimer {
    interval: Duration,
    /// `None` while stopped
    next_due: Option<Instant>,
}

impl TickTimer {
    /// Start a timer whose first tick is one full interval after `now`.
    pub fn start(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: Some(now + interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next tick is due, or `None` while stopped.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Suspend ticking without losing the handle.
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Resume with zero delay: the next tick is due immediately, later ticks
    /// follow the interval again.
    pub fn resume(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    /// Count a tick that ran outside the timer at `now`, so the next timed
    /// tick comes one full interval later.
    pub fn restart_period(&mut self, now: Instant) {
        if self.is_running() {
            self.next_due = Some(now + self.interval);
        }
    }

    /// Change the period. A running timer is re-armed from `now`.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.restart_period(now);
    }

    /// Consume the pending tick if it is due at `now`.
    ///
    /// Returns true when the caller should run a tick.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if due <= now => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}
