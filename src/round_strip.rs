//! Round progress strip on the bottom row of the grid.
//!
//! Short events get one dash per round. Events with at least half as many
//! rounds as the grid is wide get one pixel per round, with a blank pixel on
//! each side of the current round so it stands apart from its neighbours.
//! Events longer than the grid show only the first 32 rounds. There is no
//! marker for the hidden ones, which is a known limitation of a 32 pixel row.

use crate::framebuffer::{DisplayError, FrameBuffer, WIDTH};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};

/// Row the strip is drawn on
pub const STRIP_ROW: i32 = 7;

pub const ACTIVE_COLOR: Rgb888 = Rgb888::new(78, 159, 229);
pub const INACTIVE_COLOR: Rgb888 = Rgb888::new(15, 15, 15);

/// Left offset for the dash layout, tuned by eye per round count so the
/// dashes sit centered on the physical matrix.
fn dash_offset(total: i32) -> i32 {
    match total {
        3 | 5 | 14 => 2,
        7 | 9 | 13 => 3,
        12 => 4,
        11 => 5,
        _ => 1,
    }
}

fn round_color(index: i32, round: i32) -> Rgb888 {
    if index == round - 1 {
        ACTIVE_COLOR
    } else {
        INACTIVE_COLOR
    }
}

/// Draw the strip for `round` (1-based) out of `total` rounds.
pub fn render<S>(fb: &mut FrameBuffer<S>, round: i32, total: i32) -> Result<(), DisplayError> {
    fb.hline(0, STRIP_ROW, WIDTH, Rgb888::BLACK)?;
    if total <= 0 {
        return Ok(());
    }

    if total < WIDTH / 2 {
        let dash = WIDTH / total;
        let offset = dash_offset(total);
        for r in 0..total {
            fb.draw_line(
                r * dash + offset,
                STRIP_ROW,
                (r + 1) * dash + offset - 2,
                STRIP_ROW,
                round_color(r, round),
            )?;
        }
    } else {
        let shown = total.min(WIDTH);
        let padded = shown <= WIDTH - 2;
        let mut start = (WIDTH - (shown + if padded { 2 } else { 0 })) / 2;
        for r in 0..shown {
            if total <= WIDTH - 2 && (r == round - 1 || r == round) {
                start += 1;
            }
            fb.set_pixel(start + r, STRIP_ROW, round_color(r, round))?;
        }
    }
    Ok(())
}
