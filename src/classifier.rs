//! Input event classifier.
//!
//! Turns key transitions and the speedup/slowdown/toggle commands into
//! [`RampState`] changes. A tap seeks; a hold hands control to the ramp engine.

use crate::config::Config;
use crate::host::{sanitize_speed, Feedback, PlaybackHost};
use crate::ramp::{RampState, SpeedRampEngine, UNIT_SPEED};
use std::time::Instant;
use tracing::debug;

/// Raw key transitions delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Down,
    /// Key still held past the host's auto-repeat delay
    Repeat,
    Up,
    /// Tap recognized by the host without a down/up pair
    Press,
}

impl KeyEvent {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "down" => Some(KeyEvent::Down),
            "repeat" => Some(KeyEvent::Repeat),
            "up" => Some(KeyEvent::Up),
            "press" => Some(KeyEvent::Press),
            _ => None,
        }
    }
}

/// Zero-argument commands bound to their own keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampCommand {
    Speedup,
    Slowdown,
    Toggle,
}

impl RampCommand {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "speedup" => Some(RampCommand::Speedup),
            "slowdown" => Some(RampCommand::Slowdown),
            "toggle" => Some(RampCommand::Toggle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub seek_distance: f64,
    pub show_seek: bool,
}

impl From<&Config> for ClassifierSettings {
    fn from(config: &Config) -> Self {
        Self {
            seek_distance: config.seek_distance,
            show_seek: config.show_seek,
        }
    }
}

pub struct InputClassifier {
    settings: ClassifierSettings,
}

impl InputClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    pub fn reconfigure(&mut self, settings: ClassifierSettings) {
        self.settings = settings;
    }

    /// Apply a key transition.
    pub async fn handle<H: PlaybackHost>(
        &self,
        event: KeyEvent,
        state: &mut RampState,
        engine: &mut SpeedRampEngine,
        host: &mut H,
        now: Instant,
    ) {
        match event {
            KeyEvent::Down => self.down(state, engine, host, now).await,
            KeyEvent::Repeat => self.repeat(state, engine, host, now).await,
            KeyEvent::Up => self.up(state, engine, host).await,
            KeyEvent::Press => self.press(state, host).await,
        }
        debug!(?event, ?state, active = engine.is_active(), "Key event handled");
    }

    /// Apply one of the speedup/slowdown/toggle commands.
    pub async fn command<H: PlaybackHost>(
        &self,
        command: RampCommand,
        state: &mut RampState,
        engine: &mut SpeedRampEngine,
        host: &mut H,
        now: Instant,
    ) {
        match command {
            RampCommand::Speedup => self.speedup(state, engine, host, now).await,
            RampCommand::Slowdown => self.slowdown(state),
            RampCommand::Toggle => {
                if (state.repeated || !state.jumps_reset_speed) && state.speedup {
                    self.slowdown(state);
                } else {
                    self.speedup(state, engine, host, now).await;
                }
            }
        }
        debug!(?command, ?state, active = engine.is_active(), "Command handled");
    }

    async fn down<H: PlaybackHost>(
        &self,
        state: &mut RampState,
        engine: &mut SpeedRampEngine,
        host: &mut H,
        now: Instant,
    ) {
        // Without a seek there is nothing to disambiguate: fast-forward at once
        if self.settings.seek_distance == 0.0 {
            self.repeat(state, engine, host, now).await;
            return;
        }

        let was_repeating = state.repeated;
        state.repeated = false;
        state.speedup = true;
        state.freeze = true;
        state.toggle_display = false;

        if self.settings.show_seek && !was_repeating {
            host.show_feedback(Feedback::Seek, false).await;
        }
    }

    async fn repeat<H: PlaybackHost>(
        &self,
        state: &mut RampState,
        engine: &mut SpeedRampEngine,
        host: &mut H,
        now: Instant,
    ) {
        state.freeze = false;
        state.speedup = true;
        state.no_speedup = false;

        if !state.repeated {
            engine.tick(state, host, now).await;
            engine.restart_period(now);
        }
        state.repeated = true;
    }

    async fn up<H: PlaybackHost>(
        &self,
        state: &mut RampState,
        engine: &mut SpeedRampEngine,
        host: &mut H,
    ) {
        if !state.repeated {
            self.jump(state, host).await;
            // A tap never confirmed the hold, so a pending ramp-down resumes
            state.freeze = false;
        }

        if state.jumps_reset_speed && !state.toggle_state {
            state.no_speedup = true;
        }

        if state.toggle_state {
            state.toggle_display = state.toggle_state;
            if state.jumps_reset_speed {
                state.speedup = false;
            }
        }

        if engine.is_active() && !state.held_by_toggle() {
            let speed = sanitize_speed(host.speed().await);
            let cap = engine.current_cap(host).await;
            if speed == UNIT_SPEED && cap != UNIT_SPEED {
                engine.kill(state);
            }
        }
    }

    async fn press<H: PlaybackHost>(&self, state: &mut RampState, host: &mut H) {
        self.jump(state, host).await;
        if state.jumps_reset_speed && !state.toggle_state {
            state.speedup = false;
        }
    }

    /// The discrete seek of a tap.
    async fn jump<H: PlaybackHost>(&self, state: &RampState, host: &mut H) {
        if self.settings.seek_distance == 0.0 {
            return;
        }
        host.seek(self.settings.seek_distance).await;
        if self.settings.show_seek {
            host.show_feedback(Feedback::Seek, state.toggle_display)
                .await;
        }
    }

    async fn speedup<H: PlaybackHost>(
        &self,
        state: &mut RampState,
        engine: &mut SpeedRampEngine,
        host: &mut H,
        now: Instant,
    ) {
        state.no_speedup = false;
        state.speedup = true;
        state.jumps_reset_speed = false;
        state.toggle_display = true;
        state.toggle_state = true;
        self.repeat(state, engine, host, now).await;
    }

    fn slowdown(&self, state: &mut RampState) {
        state.jumps_reset_speed = true;
        state.no_speedup = true;
        state.repeated = false;
        state.freeze = false;
    }
}
