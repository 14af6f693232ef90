//! Rendering of ramp feedback as mpv commands.

use crate::config::FeedbackStyle;
use crate::host::Feedback;
use serde_json::{json, Value};

/// How long speed OSD text stays on screen, in milliseconds.
const SPEED_TEXT_DURATION_MS: u64 = 1000;

/// Translate a feedback request into the mpv commands that display it.
pub fn render(style: FeedbackStyle, feedback: Feedback, toggled: bool) -> Vec<Value> {
    match (style, feedback) {
        (FeedbackStyle::Osd, Feedback::Seek) => vec![json!(["show-progress"])],
        (FeedbackStyle::Osd, Feedback::Speed(speed)) => {
            vec![json!(["show-text", speed_label(speed, toggled), SPEED_TEXT_DURATION_MS])]
        }
        (FeedbackStyle::Uosc, Feedback::Seek) => vec![uosc_flash("timeline")],
        (FeedbackStyle::Uosc, Feedback::Speed(_)) if toggled => {
            vec![uosc_flash("timeline,speed")]
        }
        (FeedbackStyle::Uosc, Feedback::Speed(_)) => vec![uosc_flash("speed")],
    }
}

fn speed_label(speed: f64, toggled: bool) -> String {
    if toggled {
        format!(">> {:.2}x [toggled]", speed)
    } else {
        format!(">> {:.2}x", speed)
    }
}

fn uosc_flash(elements: &str) -> Value {
    json!(["script-message-to", "uosc", "flash-elements", elements])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osd_seek_shows_progress() {
        let commands = render(FeedbackStyle::Osd, Feedback::Seek, false);
        assert_eq!(commands, vec![json!(["show-progress"])]);
    }

    #[test]
    fn test_osd_speed_text() {
        let commands = render(FeedbackStyle::Osd, Feedback::Speed(1.5), false);
        assert_eq!(commands, vec![json!(["show-text", ">> 1.50x", 1000])]);

        let commands = render(FeedbackStyle::Osd, Feedback::Speed(2.0), true);
        assert_eq!(commands[0][1], ">> 2.00x [toggled]");
    }

    #[test]
    fn test_uosc_flash_elements() {
        assert_eq!(
            render(FeedbackStyle::Uosc, Feedback::Seek, false),
            vec![json!(["script-message-to", "uosc", "flash-elements", "timeline"])]
        );
        assert_eq!(
            render(FeedbackStyle::Uosc, Feedback::Speed(1.2), false)[0][3],
            "speed"
        );
        assert_eq!(
            render(FeedbackStyle::Uosc, Feedback::Speed(1.2), true)[0][3],
            "timeline,speed"
        );
    }
}
