//! Controller actor.
//!
//! One task owns the ramp state, the engine, the classifier and the host, and
//! serializes everything that touches them: host events, timer ticks and
//! shutdown. Nothing else mutates [`RampState`].

use crate::classifier::{ClassifierSettings, InputClassifier, KeyEvent, RampCommand};
use crate::config::{Config, ConfigManager};
use crate::host::PlaybackHost;
use crate::ramp::{RampSettings, RampState, SpeedRampEngine, TimerTransition, UNIT_SPEED};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Events the host adapter delivers to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Key(KeyEvent),
    Command(RampCommand),
    /// Runtime option change, value in its textual form
    SetOption { key: String, value: String },
    Paused(bool),
    /// The player is quitting
    Shutdown,
}

/// Why [`Controller::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The daemon was asked to stop
    Shutdown,
    /// The player quit or the connection closed
    HostClosed,
}

pub struct Controller<H: PlaybackHost> {
    host: H,
    state: RampState,
    engine: SpeedRampEngine,
    classifier: InputClassifier,
    config_manager: Arc<ConfigManager>,
}

impl<H: PlaybackHost> Controller<H> {
    pub fn new(mut host: H, config_manager: Arc<ConfigManager>) -> Self {
        let config = config_manager.get();
        host.apply_config(&config);
        Self {
            host,
            state: RampState::default(),
            engine: SpeedRampEngine::new(RampSettings::from(&config)),
            classifier: InputClassifier::new(ClassifierSettings::from(&config)),
            config_manager,
        }
    }

    /// Serve host events and timer ticks until shutdown or until the host
    /// goes away.
    pub async fn run(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<HostEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let deadline = self.engine.deadline();
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Controller shutting down");
                    self.restore_speed().await;
                    return SessionEnd::Shutdown;
                }
                event = events.recv() => match event {
                    Some(HostEvent::Shutdown) => {
                        info!("mpv is shutting down");
                        return SessionEnd::HostClosed;
                    }
                    Some(event) => self.dispatch(event, Instant::now()).await,
                    None => {
                        warn!("mpv connection closed");
                        return SessionEnd::HostClosed;
                    }
                },
                _ = sleep_until(deadline) => {
                    self.on_timer(Instant::now()).await;
                }
            }
        }
    }

    /// Apply a single host event.
    pub async fn dispatch(&mut self, event: HostEvent, now: Instant) {
        match event {
            HostEvent::Key(key) => {
                self.classifier
                    .handle(key, &mut self.state, &mut self.engine, &mut self.host, now)
                    .await
            }
            HostEvent::Command(command) => {
                self.classifier
                    .command(command, &mut self.state, &mut self.engine, &mut self.host, now)
                    .await
            }
            HostEvent::SetOption { key, value } => self.set_option(&key, &value, now),
            HostEvent::Paused(paused) => {
                debug!(paused, "Playback pause changed");
                self.engine.set_suspended(paused, now);
            }
            HostEvent::Shutdown => {}
        }
    }

    /// Run the timed tick if it is due.
    pub async fn on_timer(&mut self, now: Instant) {
        if self.engine.fire_timer(now) {
            let report = self
                .engine
                .tick(&mut self.state, &mut self.host, now)
                .await;
            if report.speed != report.previous || report.timer != TimerTransition::Unchanged {
                debug!(
                    from = report.previous,
                    to = report.speed,
                    cap = report.cap,
                    timer = ?report.timer,
                    "Ramp tick"
                );
            }
        }
    }

    fn set_option(&mut self, key: &str, value: &str, now: Instant) {
        match self.config_manager.set_option(key, value) {
            Ok(config) => {
                info!("Option {} set to {} via script message", key, value);
                self.apply_config(&config, now);
            }
            Err(e) => warn!("Rejected option {}={}: {}", key, value, e),
        }
    }

    fn apply_config(&mut self, config: &Config, now: Instant) {
        self.engine.reconfigure(RampSettings::from(config), now);
        self.classifier
            .reconfigure(ClassifierSettings::from(config));
        self.host.apply_config(config);
    }

    /// Leave the player at normal speed if a ramp is cut short.
    async fn restore_speed(&mut self) {
        if self.engine.is_active() {
            self.engine.kill(&mut self.state);
            self.host.set_speed(UNIT_SPEED).await;
            info!("Playback speed restored to {}", UNIT_SPEED);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::FakeHost;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn controller() -> (Controller<FakeHost>, TempDir) {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::load_or_default(&dir.path().join("config.json")).unwrap();
        (Controller::new(FakeHost::new(), Arc::new(manager)), dir)
    }

    #[tokio::test]
    async fn test_dispatch_hold_and_timer_ticks() {
        let (mut controller, _dir) = controller();
        let now = Instant::now();

        controller.dispatch(HostEvent::Key(KeyEvent::Down), now).await;
        controller.dispatch(HostEvent::Key(KeyEvent::Repeat), now).await;
        assert_eq!(controller.host.speed, 1.1);

        let due = now + Duration::from_millis(50);
        controller.on_timer(now + Duration::from_millis(10)).await;
        assert_eq!(controller.host.speed_writes.len(), 1);
        controller.on_timer(due).await;
        assert_eq!(controller.host.speed_writes.len(), 2);
    }

    #[tokio::test]
    async fn test_set_option_reconfigures_and_persists() {
        let (mut controller, dir) = controller();
        let now = Instant::now();
        controller.dispatch(HostEvent::Key(KeyEvent::Down), now).await;
        controller.dispatch(HostEvent::Key(KeyEvent::Repeat), now).await;

        controller
            .dispatch(
                HostEvent::SetOption {
                    key: "speed_interval".to_string(),
                    value: "0.2".to_string(),
                },
                now,
            )
            .await;

        assert_eq!(controller.engine.deadline(), Some(now + Duration::from_millis(200)));

        let reloaded = ConfigManager::load_or_default(&dir.path().join("config.json")).unwrap();
        assert_eq!(reloaded.get().speed_interval, 0.2);
    }

    #[tokio::test]
    async fn test_set_option_seek_distance_reaches_classifier() {
        let (mut controller, _dir) = controller();
        let now = Instant::now();

        controller
            .dispatch(
                HostEvent::SetOption {
                    key: "seek_distance".to_string(),
                    value: "10".to_string(),
                },
                now,
            )
            .await;
        controller.dispatch(HostEvent::Key(KeyEvent::Press), now).await;

        assert_eq!(controller.host.seeks, vec![10.0]);
    }

    #[tokio::test]
    async fn test_rejected_option_keeps_config() {
        let (mut controller, dir) = controller();

        controller
            .dispatch(
                HostEvent::SetOption {
                    key: "speed_cap".to_string(),
                    value: "0.5".to_string(),
                },
                Instant::now(),
            )
            .await;

        assert_eq!(controller.config_manager.get().speed_cap, 2.0);
        assert!(!dir.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn test_pause_suspends_timer() {
        let (mut controller, _dir) = controller();
        let now = Instant::now();
        controller.dispatch(HostEvent::Key(KeyEvent::Down), now).await;
        controller.dispatch(HostEvent::Key(KeyEvent::Repeat), now).await;

        controller.dispatch(HostEvent::Paused(true), now).await;
        assert!(controller.engine.is_active());
        assert_eq!(controller.engine.deadline(), None);
        controller.on_timer(now + Duration::from_secs(5)).await;
        assert_eq!(controller.host.speed, 1.1);

        let later = now + Duration::from_secs(10);
        controller.dispatch(HostEvent::Paused(false), later).await;
        assert_eq!(controller.engine.deadline(), Some(later));
        controller.on_timer(later).await;
        assert_eq!(controller.host.speed_writes.len(), 2);
    }

    #[tokio::test]
    async fn test_run_ends_when_host_closes() {
        let (mut controller, _dir) = controller();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        events_tx.send(HostEvent::Key(KeyEvent::Down)).unwrap();
        events_tx.send(HostEvent::Key(KeyEvent::Repeat)).unwrap();
        drop(events_tx);

        let end = controller.run(&mut events_rx, &mut shutdown_rx).await;

        assert_eq!(end, SessionEnd::HostClosed);
        assert!(controller.state.repeated);
        assert!(controller.host.speed >= 1.1);
    }

    #[tokio::test]
    async fn test_run_stops_on_player_shutdown_event() {
        let (mut controller, _dir) = controller();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        events_tx.send(HostEvent::Shutdown).unwrap();

        let end = controller.run(&mut events_rx, &mut shutdown_rx).await;
        assert_eq!(end, SessionEnd::HostClosed);
        drop(events_tx);
    }

    #[tokio::test]
    async fn test_shutdown_restores_normal_speed() {
        let (mut controller, _dir) = controller();
        let now = Instant::now();
        controller.dispatch(HostEvent::Key(KeyEvent::Down), now).await;
        controller.dispatch(HostEvent::Key(KeyEvent::Repeat), now).await;

        let (_events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let end = controller.run(&mut events_rx, &mut shutdown_rx).await;

        assert_eq!(end, SessionEnd::Shutdown);
        assert_eq!(controller.host.speed, 1.0);
        assert!(!controller.engine.is_active());
    }
}
