//! # Terminal Rendering
//!
//! A stand-in for the LED matrix when running on a desktop. Every frame the
//! clock pushes is read back from serpentine strip order into rows and
//! printed to a terminal, either as truecolor blocks or as plain ASCII.
//!
//! ## Modes
//! - **Ansi**: two `█` per LED in the LED's 24-bit color, redrawn in place
//! - **Ascii**: `#` for a lit LED, `.` for a dark one, one frame after another

use crate::framebuffer::{serpentine_index, LedStrip, HEIGHT, NUM_LEDS, WIDTH};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalMode {
    Ansi,
    Ascii,
}

/// Read a physical frame back into logical rows.
fn rows(leds: &[Rgb888; NUM_LEDS]) -> impl Iterator<Item = Vec<Rgb888>> + '_ {
    (0..HEIGHT).map(move |y| {
        (0..WIDTH)
            .filter_map(|x| serpentine_index(x, y).ok())
            .map(|i| leds[i])
            .collect()
    })
}

/// Render a frame as `#`/`.` rows, one line per matrix row.
pub fn draw_ascii(leds: &[Rgb888; NUM_LEDS]) -> String {
    let mut out = String::with_capacity(NUM_LEDS + HEIGHT as usize);
    for row in rows(leds) {
        out.extend(
            row.iter()
                .map(|&c| if c == Rgb888::BLACK { '.' } else { '#' }),
        );
        out.push('\n');
    }
    out
}

/// Render a frame as ANSI truecolor blocks.
pub fn draw_ansi(leds: &[Rgb888; NUM_LEDS]) -> String {
    let mut out = String::new();
    for row in rows(leds) {
        for c in row {
            out.push_str(&format!("\x1b[38;2;{};{};{}m██", c.r(), c.g(), c.b()));
        }
        out.push_str("\x1b[0m\n");
    }
    out
}

/// LED strip that prints every frame to a writer.
pub struct TerminalStrip<W> {
    out: W,
    mode: TerminalMode,
    frames: usize,
}

impl<W: Write> TerminalStrip<W> {
    pub fn new(out: W, mode: TerminalMode) -> Self {
        Self {
            out,
            mode,
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LedStrip for TerminalStrip<W> {
    fn write(&mut self, leds: &[Rgb888; NUM_LEDS]) -> io::Result<()> {
        match self.mode {
            TerminalMode::Ansi => {
                if self.frames > 0 {
                    // back over the previous frame
                    write!(self.out, "\x1b[{HEIGHT}A")?;
                }
                self.out.write_all(draw_ansi(leds).as_bytes())?;
            }
            TerminalMode::Ascii => {
                self.out.write_all(draw_ascii(leds).as_bytes())?;
                writeln!(self.out)?;
            }
        }
        self.frames += 1;
        self.out.flush()
    }
}
