//! # Serpentine LED Framebuffer
//!
//! This module owns the 32×8 pixel grid of the clock and every drawing
//! primitive the rest of the crate uses. The physical LED matrix is a single
//! WS2812 strip folded into rows, so the hardware order of the 256 LEDs is a
//! *serpentine*: even rows run left to right, odd rows run right to left.
//!
//! ## Addressing
//!
//! All callers work in logical `(x, y)` coordinates with the origin in the top
//! left corner. [`serpentine_index`] is the only place that knows about the
//! wiring:
//!
//! ```text
//! y = 0:   0  1  2 ... 31
//! y = 1:  63 62 61 ... 32
//! y = 2:  64 65 66 ... 95
//! ```
//!
//! ## Staging and flushing
//!
//! Every primitive only touches the in-memory buffer. [`FrameBuffer::show`] is
//! the single operation that writes to the [`LedStrip`], and it always writes
//! the complete frame in one call. Renderers can therefore clear, draw text and
//! draw the round strip without the user ever seeing a half-drawn frame.
//!
//! ## Bounds
//!
//! Primitives fail with [`DisplayError::OutOfBounds`] instead of clipping.
//! Off-grid coordinates are a programming error in this crate; the glyph
//! renderer does its own clipping before it reaches this layer.

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Size};
use std::io;
use thiserror::Error;

/// Grid width in pixels
pub const WIDTH: i32 = 32;
/// Grid height in pixels
pub const HEIGHT: i32 = 8;
/// Number of LEDs on the strip
pub const NUM_LEDS: usize = (WIDTH * HEIGHT) as usize;

/// Errors raised by the framebuffer and its hardware boundary.
#[derive(Error, Debug)]
pub enum DisplayError {
    /// A primitive tried to read or write a pixel outside the grid
    #[error("pixel ({x}, {y}) is outside the {}x{} grid", WIDTH, HEIGHT)]
    OutOfBounds { x: i32, y: i32 },

    /// Writing the frame to the LED strip failed
    #[error("LED output: {0}")]
    Output(#[from] io::Error),
}

/// Hardware write primitive for the LED strip.
///
/// Implementations receive the frame in physical strip order and must push
/// all of it in one go.
pub trait LedStrip {
    fn write(&mut self, leds: &[Rgb888; NUM_LEDS]) -> io::Result<()>;
}

/// A strip that records every frame it is sent. Handy for tests and for
/// headless runs.
impl LedStrip for Vec<[Rgb888; NUM_LEDS]> {
    fn write(&mut self, leds: &[Rgb888; NUM_LEDS]) -> io::Result<()> {
        self.push(*leds);
        Ok(())
    }
}

/// Map a logical coordinate to its position on the serpentine strip.
pub fn serpentine_index(x: i32, y: i32) -> Result<usize, DisplayError> {
    if !(0..WIDTH).contains(&x) || !(0..HEIGHT).contains(&y) {
        return Err(DisplayError::OutOfBounds { x, y });
    }
    let index = if y % 2 == 1 {
        (y + 1) * WIDTH - 1 - x
    } else {
        x + y * WIDTH
    };
    Ok(index as usize)
}

/// The 32×8 pixel surface plus the strip it is flushed to.
pub struct FrameBuffer<S> {
    leds: [Rgb888; NUM_LEDS],
    strip: S,
}

impl<S: LedStrip> FrameBuffer<S> {
    /// Create an all-black framebuffer. Nothing is written to the strip
    /// until the first [`show`](Self::show).
    pub fn new(strip: S) -> Self {
        Self {
            leds: [Rgb888::BLACK; NUM_LEDS],
            strip,
        }
    }

    /// Push the whole staged frame to the hardware.
    pub fn show(&mut self) -> Result<(), DisplayError> {
        self.strip.write(&self.leds)?;
        Ok(())
    }

    pub fn strip(&self) -> &S {
        &self.strip
    }

    pub fn strip_mut(&mut self) -> &mut S {
        &mut self.strip
    }
}

impl<S> FrameBuffer<S> {
    /// Staged frame in physical strip order
    pub fn leds(&self) -> &[Rgb888; NUM_LEDS] {
        &self.leds
    }

    pub fn fill(&mut self, color: Rgb888) {
        self.leds.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(Rgb888::BLACK);
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888) -> Result<(), DisplayError> {
        let index = serpentine_index(x, y)?;
        self.leds[index] = color;
        Ok(())
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Result<Rgb888, DisplayError> {
        Ok(self.leds[serpentine_index(x, y)?])
    }

    /// Horizontal run of `width` pixels starting at `(x, y)`
    pub fn hline(&mut self, x: i32, y: i32, width: i32, color: Rgb888) -> Result<(), DisplayError> {
        for px in x..x + width {
            self.set_pixel(px, y, color)?;
        }
        Ok(())
    }

    /// Vertical run of `height` pixels starting at `(x, y)`
    pub fn vline(&mut self, x: i32, y: i32, height: i32, color: Rgb888) -> Result<(), DisplayError> {
        for py in y..y + height {
            self.set_pixel(x, py, color)?;
        }
        Ok(())
    }

    /// Draw a line with the integer Bresenham algorithm, both endpoints
    /// included.
    ///
    /// The endpoints are put in a canonical order first, so swapping them
    /// always lights the same pixels.
    pub fn draw_line(
        &mut self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: Rgb888,
    ) -> Result<(), DisplayError> {
        let ((mut x, mut y), (x_end, y_end)) = if (x1, y1) <= (x2, y2) {
            ((x1, y1), (x2, y2))
        } else {
            ((x2, y2), (x1, y1))
        };

        let dx = (x_end - x).abs();
        let dy = -(y_end - y).abs();
        let sx = if x < x_end { 1 } else { -1 };
        let sy = if y < y_end { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.set_pixel(x, y, color)?;
            if x == x_end && y == y_end {
                return Ok(());
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Draw a `width` × `height` rectangle with its top left corner at
    /// `(x, y)`.
    ///
    /// A rectangle that reaches past the grid fails with
    /// [`DisplayError::OutOfBounds`] once the first off-grid pixel is hit.
    /// It is not clipped, and pixels drawn before that point stay drawn.
    pub fn draw_rect(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        color: Rgb888,
        filled: bool,
    ) -> Result<(), DisplayError> {
        if width <= 0 || height <= 0 {
            return Ok(());
        }
        if filled {
            for py in y..y + height {
                self.hline(x, py, width, color)?;
            }
        } else {
            self.hline(x, y, width, color)?;
            self.hline(x, y + height - 1, width, color)?;
            self.vline(x, y, height, color)?;
            self.vline(x + width - 1, y, height, color)?;
        }
        Ok(())
    }

    /// Shift the frame contents by `(dx, dy)`.
    ///
    /// Destination `(x, y)` takes the pixel at `(x - dx, y - dy)`. Pixels are
    /// moved in place, walking from the far edge inward for positive shifts
    /// so no source is overwritten before it is read. Destinations whose
    /// source lies outside the grid become black.
    pub fn scroll(&mut self, dx: i32, dy: i32) {
        for i in 0..WIDTH {
            let x = if dx >= 0 { WIDTH - 1 - i } else { i };
            for j in 0..HEIGHT {
                let y = if dy >= 0 { HEIGHT - 1 - j } else { j };
                let color = self.get_pixel(x - dx, y - dy).unwrap_or(Rgb888::BLACK);
                if let Ok(index) = serpentine_index(x, y) {
                    self.leds[index] = color;
                }
            }
        }
    }
}

impl<S> OriginDimensions for FrameBuffer<S> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

/// embedded-graphics drawing support. Unlike the native primitives this
/// clips, as the `DrawTarget` contract requires.
impl<S> DrawTarget for FrameBuffer<S> {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Ok(index) = serpentine_index(point.x, point.y) {
                self.leds[index] = color;
            }
        }
        Ok(())
    }
}
