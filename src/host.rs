//! Capabilities the ramp core needs from the media player.
//!
//! The core never talks to mpv directly. Everything it reads or changes goes
//! through [`PlaybackHost`], which the mpv IPC adapter implements and tests
//! replace with a recording fake.

use crate::config::Config;

/// Visual feedback requested by the core. The host decides how to render it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feedback {
    /// A seek happened or a seek gesture started.
    Seek,
    /// Playback speed changed to the given value.
    Speed(f64),
}

/// Playback state accessor/mutator consumed by the classifier and the engine.
///
/// Reads never fail: an adapter that cannot reach the player returns the
/// neutral value (speed 1.0, no subtitle, no next subtitle).
#[allow(async_fn_in_trait)]
pub trait PlaybackHost {
    /// Current playback speed.
    async fn speed(&mut self) -> f64;

    async fn set_speed(&mut self, speed: f64);

    /// Whether a subtitle line is currently on screen.
    async fn has_subtitle(&mut self) -> bool;

    /// Seconds of media time until the next subtitle line, measured from the
    /// current position. `None` when there is no upcoming line.
    async fn next_subtitle_offset(&mut self) -> Option<f64>;

    /// Relative seek by `delta` seconds.
    async fn seek(&mut self, delta: f64);

    async fn show_feedback(&mut self, feedback: Feedback, toggled: bool);

    /// Pick up host-side settings (feedback style) after a config change.
    fn apply_config(&mut self, _config: &Config) {}
}

/// Treat absent, non-finite or non-positive speed readings as normal speed.
pub fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

#[cfg(test)]
pub mod testing {
    use super::{Feedback, PlaybackHost};

    /// In-memory host that records every side effect.
    #[derive(Debug, Clone)]
    pub struct FakeHost {
        pub speed: f64,
        pub subtitle: bool,
        pub next_subtitle: Option<f64>,
        pub speed_writes: Vec<f64>,
        pub seeks: Vec<f64>,
        pub feedback: Vec<(Feedback, bool)>,
        pub offset_queries: usize,
    }

    impl FakeHost {
        pub fn new() -> Self {
            Self {
                speed: 1.0,
                subtitle: false,
                next_subtitle: None,
                speed_writes: Vec::new(),
                seeks: Vec::new(),
                feedback: Vec::new(),
                offset_queries: 0,
            }
        }
    }

    impl PlaybackHost for FakeHost {
        async fn speed(&mut self) -> f64 {
            self.speed
        }

        async fn set_speed(&mut self, speed: f64) {
            self.speed = speed;
            self.speed_writes.push(speed);
        }

        async fn has_subtitle(&mut self) -> bool {
            self.subtitle
        }

        async fn next_subtitle_offset(&mut self) -> Option<f64> {
            self.offset_queries += 1;
            self.next_subtitle
        }

        async fn seek(&mut self, delta: f64) {
            self.seeks.push(delta);
        }

        async fn show_feedback(&mut self, feedback: Feedback, toggled: bool) {
            self.feedback.push((feedback, toggled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_speed_defaults() {
        assert_eq!(sanitize_speed(0.0), 1.0);
        assert_eq!(sanitize_speed(-2.0), 1.0);
        assert_eq!(sanitize_speed(f64::NAN), 1.0);
        assert_eq!(sanitize_speed(f64::INFINITY), 1.0);
        assert_eq!(sanitize_speed(1.5), 1.5);
    }

    proptest! {
        #[test]
        fn prop_sanitized_speed_is_positive(speed in any::<f64>()) {
            let s = sanitize_speed(speed);
            prop_assert!(s.is_finite() && s > 0.0);
        }
    }
}
