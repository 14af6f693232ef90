//! Speed ramp engine.
//!
//! This module contains the state machine that moves playback speed towards
//! the active cap while a hold or toggle is in effect, and back down to normal
//! speed otherwise. It owns the tick timer: the timer exists exactly while a
//! ramp is in progress.

use crate::config::Config;
use crate::host::{sanitize_speed, Feedback, PlaybackHost};
use crate::timer::TickTimer;
use std::time::{Duration, Instant};
use tracing::debug;

/// Normal playback speed, the floor of every ramp.
pub const UNIT_SPEED: f64 = 1.0;

/// Ramp flags shared by the input classifier and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampState {
    /// Ramp up requested (key held or toggle on)
    pub speedup: bool,
    /// Ramp down forced; wins over `speedup`
    pub no_speedup: bool,
    /// Ticks leave speed alone (between key down and the first repeat)
    pub freeze: bool,
    /// Persistent toggle mode active
    pub toggle_state: bool,
    /// Speed feedback uses the toggled variant
    pub toggle_display: bool,
    /// A tap ramps speed back down
    pub jumps_reset_speed: bool,
    /// The current hold has ticked at least once
    pub repeated: bool,
}

impl Default for RampState {
    fn default() -> Self {
        Self {
            speedup: false,
            no_speedup: false,
            freeze: false,
            toggle_state: false,
            toggle_display: false,
            jumps_reset_speed: true,
            repeated: false,
        }
    }
}

impl RampState {
    /// Whether ticks should move speed up.
    pub fn accelerating(&self) -> bool {
        self.speedup && !self.no_speedup
    }

    /// Whether the toggle keeps the timer alive at normal speed.
    ///
    /// `slowdown` re-enables `jumps_reset_speed` without clearing
    /// `toggle_state`, which releases the hold.
    pub fn held_by_toggle(&self) -> bool {
        self.toggle_state && !self.jumps_reset_speed
    }

    /// Return the hold/toggle bookkeeping to idle after a ramp finishes.
    fn settle(&mut self) {
        self.repeated = false;
        self.jumps_reset_speed = true;
        self.toggle_display = false;
        self.toggle_state = false;
    }
}

/// Engine parameters derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct RampSettings {
    pub speed_increase: f64,
    pub speed_decrease: f64,
    pub interval: Duration,
    pub speed_cap: f64,
    /// Equal to `speed_cap` when the subtitle cap is disabled
    pub subs_speed_cap: f64,
    pub multiply_modifier: bool,
    pub subs_lookahead: bool,
    pub show_speed: bool,
    pub show_speed_toggled: bool,
}

impl From<&Config> for RampSettings {
    fn from(config: &Config) -> Self {
        Self {
            speed_increase: config.speed_increase,
            speed_decrease: config.speed_decrease,
            interval: config.tick_interval(),
            speed_cap: config.speed_cap,
            subs_speed_cap: config.subs_cap(),
            multiply_modifier: config.multiply_modifier,
            subs_lookahead: config.subs_lookahead,
            show_speed: config.show_speed,
            show_speed_toggled: config.show_speed_toggled,
        }
    }
}

impl RampSettings {
    fn subs_cap_distinct(&self) -> bool {
        self.subs_speed_cap != self.speed_cap
    }

    fn step_up(&self, speed: f64) -> f64 {
        if self.multiply_modifier {
            speed + speed * self.speed_increase
        } else {
            speed + self.speed_increase
        }
    }

    fn step_down(&self, speed: f64) -> f64 {
        if self.multiply_modifier {
            speed - speed * self.speed_decrease
        } else {
            speed - self.speed_decrease
        }
    }

    /// Seconds of wall time needed to decelerate from `speed` to the
    /// subtitle cap.
    fn correction_time(&self, speed: f64) -> f64 {
        if speed <= self.subs_speed_cap {
            return 0.0;
        }
        let ticks = if self.multiply_modifier {
            (self.subs_speed_cap / speed).ln() / (1.0 - self.speed_decrease).ln()
        } else {
            (speed - self.subs_speed_cap) / self.speed_decrease
        };
        ticks.ceil() * self.interval.as_secs_f64()
    }
}

/// Cap override engaged by the subtitle lookahead.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForcedCapLatch {
    forced_speed_cap: f64,
    use_forced_speed_cap: bool,
}

impl ForcedCapLatch {
    pub fn engage(&mut self, cap: f64) {
        self.forced_speed_cap = cap;
        self.use_forced_speed_cap = true;
    }

    pub fn release(&mut self) {
        self.use_forced_speed_cap = false;
    }

    /// The latched cap, if engaged.
    pub fn cap(&self) -> Option<f64> {
        self.use_forced_speed_cap.then_some(self.forced_speed_cap)
    }
}

/// What happened to the timer during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTransition {
    Unchanged,
    Started,
    Killed,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub previous: f64,
    pub speed: f64,
    pub cap: f64,
    pub timer: TimerTransition,
}

/// Periodic speed ramp state machine.
pub struct SpeedRampEngine {
    settings: RampSettings,
    timer: Option<TickTimer>,
    latch: ForcedCapLatch,
    /// Host playback is paused; a live timer is kept stopped
    suspended: bool,
}

impl SpeedRampEngine {
    pub fn new(settings: RampSettings) -> Self {
        Self {
            settings,
            timer: None,
            latch: ForcedCapLatch::default(),
            suspended: false,
        }
    }

    /// Whether a ramp is in progress (the timer exists).
    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    /// When the next timed tick is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.as_ref().and_then(TickTimer::deadline)
    }

    /// Consume a due timer tick. Returns true when `tick` should run.
    pub fn fire_timer(&mut self, now: Instant) -> bool {
        self.timer.as_mut().is_some_and(|timer| timer.fire(now))
    }

    /// Push the next timed tick one full interval past a tick that ran
    /// outside the timer.
    pub fn restart_period(&mut self, now: Instant) {
        if let Some(timer) = self.timer.as_mut() {
            timer.restart_period(now);
        }
    }

    /// Stop ticking while the host is paused; resume with zero delay after.
    pub fn set_suspended(&mut self, suspended: bool, now: Instant) {
        if self.suspended == suspended {
            return;
        }
        self.suspended = suspended;
        if let Some(timer) = self.timer.as_mut() {
            if suspended {
                timer.stop();
            } else {
                timer.resume(now);
            }
        }
    }

    /// Apply new settings. A live timer picks up the new interval.
    pub fn reconfigure(&mut self, settings: RampSettings, now: Instant) {
        if settings.interval != self.settings.interval {
            if let Some(timer) = self.timer.as_mut() {
                timer.set_interval(settings.interval, now);
                if self.suspended {
                    timer.stop();
                }
            }
        }
        self.settings = settings;
        self.latch.release();
    }

    /// Destroy the timer and return the flags to idle.
    pub fn kill(&mut self, state: &mut RampState) {
        if self.timer.take().is_some() {
            debug!("Ramp timer killed");
        }
        self.latch.release();
        state.settle();
    }

    /// Cap in effect right now, without running the lookahead.
    pub async fn current_cap<H: PlaybackHost>(&self, host: &mut H) -> f64 {
        let subtitle = self.settings.subs_cap_distinct() && host.has_subtitle().await;
        self.cap_for(subtitle)
    }

    fn cap_for(&self, subtitle: bool) -> f64 {
        if let Some(cap) = self.latch.cap() {
            cap
        } else if subtitle {
            self.settings.subs_speed_cap
        } else {
            self.settings.speed_cap
        }
    }

    /// Release the latch once speed settles, then run the lookahead test.
    async fn update_latch<H: PlaybackHost>(
        &mut self,
        state: &RampState,
        speed: f64,
        subtitle: bool,
        host: &mut H,
    ) {
        let settings = &self.settings;
        let distinct = settings.subs_cap_distinct();

        if self.latch.cap().is_some()
            && (speed == settings.subs_speed_cap || (speed == UNIT_SPEED && distinct))
        {
            debug!(speed, "Forced subtitle cap released");
            self.latch.release();
        }

        if !settings.subs_lookahead
            || !distinct
            || subtitle
            || self.latch.cap().is_some()
            || !state.accelerating()
            || speed <= settings.subs_speed_cap
        {
            return;
        }

        let window = settings.correction_time(speed) * speed;
        if let Some(offset) = host.next_subtitle_offset().await {
            if offset <= window {
                debug!(offset, window, "Next subtitle within reach, forcing subtitle cap");
                self.latch.engage(settings.subs_speed_cap);
            }
        }
    }

    /// Run one ramp step against the host.
    pub async fn tick<H: PlaybackHost>(
        &mut self,
        state: &mut RampState,
        host: &mut H,
        now: Instant,
    ) -> TickReport {
        let previous = sanitize_speed(host.speed().await);
        let subtitle = self.settings.subs_cap_distinct() && host.has_subtitle().await;

        self.update_latch(state, previous, subtitle, host).await;
        let cap = self.cap_for(subtitle);

        let speed = if state.freeze {
            previous
        } else if state.accelerating() && previous <= cap {
            self.settings.step_up(previous).min(cap)
        } else {
            self.settings.step_down(previous).max(UNIT_SPEED)
        };

        if speed != previous {
            host.set_speed(speed).await;
            let show = if state.toggle_display {
                self.settings.show_speed_toggled
            } else {
                self.settings.show_speed
            };
            if show {
                host.show_feedback(Feedback::Speed(speed), state.toggle_display)
                    .await;
            }
        }

        let mut timer = TimerTransition::Unchanged;
        if speed == UNIT_SPEED && cap != UNIT_SPEED {
            if self.timer.is_some() && !state.held_by_toggle() {
                self.kill(state);
                timer = TimerTransition::Killed;
            }
        } else if self.timer.is_none() && (speed != UNIT_SPEED || state.held_by_toggle()) {
            let mut handle = TickTimer::start(self.settings.interval, now);
            if self.suspended {
                handle.stop();
            }
            debug!(interval = ?handle.interval(), "Ramp timer started");
            self.timer = Some(handle);
            timer = TimerTransition::Started;
        }

        TickReport {
            previous,
            speed,
            cap,
            timer,
        }
    }
}
