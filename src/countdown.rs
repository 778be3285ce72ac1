//! Countdown face: the text, font, position and color of the remaining time.
//!
//! Rounds longer than an hour are shown as `H:MM:SS` in the narrow font so
//! seven characters fit on the matrix. Everything else is `MM:SS` in the
//! default font. Overtime is shown with a leading `-`, and placeholders take
//! over once the overtime no longer fits.
//!
//! Before a round starts the end time lies more than a full round ahead. The
//! face then counts down to the start in green instead.

use crate::font::{DEFAULT_FONT, NARROW_FONT};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};

pub const HOUR: i64 = 3600;

/// Overtime from which `H:MM:SS` no longer fits
const LONG_OVERTIME_LIMIT: i64 = 10 * HOUR;

/// Color of the time left until a round starts
pub const PRESTART_COLOR: Rgb888 = Rgb888::GREEN;

/// Pick the countdown color for `remaining` seconds.
///
/// Red wins over yellow when both thresholds apply.
pub fn threshold_color(remaining: i64, yellow: i64, red: i64) -> Rgb888 {
    if remaining <= red {
        Rgb888::RED
    } else if remaining <= yellow {
        Rgb888::YELLOW
    } else {
        Rgb888::WHITE
    }
}

/// Whether `remaining` seconds still lie before the start of the round.
///
/// A round of an hour or less that has just started shows its full length,
/// so that instant already counts as pre-start.
pub fn before_start(remaining: i64, timer_length: i64) -> bool {
    remaining > timer_length || (remaining == timer_length && timer_length <= HOUR)
}

/// Format `remaining` seconds, with hours (`H:MM:SS`) or without (`MM:SS`).
pub fn format_remaining(remaining: i64, with_hours: bool) -> String {
    let sign = if remaining < 0 { "-" } else { "" };
    let abs = remaining.unsigned_abs();
    let (h, m, s) = (abs / 3600, abs % 3600 / 60, abs % 60);

    if with_hours {
        if remaining <= -LONG_OVERTIME_LIMIT {
            "-X:XX:XX".to_string()
        } else {
            format!("{sign}{h}:{m:02}:{s:02}")
        }
    } else if remaining <= -HOUR {
        "-XX:XX".to_string()
    } else {
        format!("{sign}{m:02}:{s:02}")
    }
}

/// Everything needed to draw one countdown frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountdownFace {
    pub text: String,
    pub font: &'static str,
    pub color: Rgb888,
    pub x: i32,
    pub y: i32,
}

impl CountdownFace {
    pub fn new(remaining: i64, timer_length: i64, yellow: i64, red: i64) -> Self {
        let (shown, color, with_hours) =
            if remaining > red && remaining > yellow && before_start(remaining, timer_length) {
                let to_start = remaining - timer_length;
                let with_hours = to_start >= HOUR || timer_length > HOUR;
                (to_start, PRESTART_COLOR, with_hours)
            } else {
                let color = threshold_color(remaining, yellow, red);
                (remaining, color, timer_length > HOUR)
            };

        let negative = shown < 0;
        let (font, x, y) = if with_hours {
            (NARROW_FONT, if negative { -1 } else { 3 }, 1)
        } else {
            (DEFAULT_FONT, if negative { 0 } else { 5 }, 0)
        };
        Self {
            text: format_remaining(shown, with_hours),
            font,
            color,
            x,
            y,
        }
    }
}
