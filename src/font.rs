//! # Bitmap Fonts
//!
//! Fonts live on disk as small column-bitmap files and are read glyph by glyph
//! while text is drawn. Nothing is decoded into memory ahead of time: the
//! clock's target hardware has very little RAM, so a render seeks straight to
//! the bytes of the glyph it needs.
//!
//! ## File format
//!
//! ```text
//! offset 0      glyph cell width  (u8)
//! offset 1      glyph cell height (u8)
//! offset 2..    one byte per column, `width` columns per character,
//!               characters stored in code order starting at FIRST_CODE
//! ```
//!
//! Bit *i* of a column byte lights row *i* of the glyph. The highest supported
//! character code follows from the file size; characters past it are skipped
//! (zero width, nothing drawn) rather than drawn as blanks.
//!
//! ## Lifetime
//!
//! A [`GlyphFont`] owns an open file handle. [`FontLibrary`] opens the font at
//! the start of a glyph or text render and drops it at the end, so no handle
//! outlives a frame.

use crate::framebuffer::{DisplayError, FrameBuffer, HEIGHT, WIDTH};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use log::warn;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Character code of the first glyph stored in a font file
pub const FIRST_CODE: u32 = 0;

/// Size of the width/height header
const HEADER_LEN: u64 = 2;

/// Font used when a style does not name one
pub const DEFAULT_FONT: &str = "f4x6";
/// Narrow 3×5 font, fits `H:MM:SS` on the grid
pub const NARROW_FONT: &str = "f3x5";
/// Tall 5×8 font for the round number
pub const LARGE_FONT: &str = "f5x8";

#[derive(Error, Debug)]
pub enum FontError {
    /// The font file does not exist
    #[error("font resource not found: {}", path.display())]
    ResourceNotFound { path: PathBuf },

    /// The header declares a zero-width glyph cell
    #[error("malformed font {}", path.display())]
    Malformed { path: PathBuf },

    #[error("font IO: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Surface(#[from] DisplayError),
}

/// Per-call text options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    /// Font name, resolved to `<font_dir>/<font>.bin`
    pub font: &'static str,
    pub color: Rgb888,
    /// Ignore the x coordinate and center the text horizontally
    pub centered: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: DEFAULT_FONT,
            color: Rgb888::WHITE,
            centered: false,
        }
    }
}

impl TextStyle {
    pub fn font(mut self, font: &'static str) -> Self {
        self.font = font;
        self
    }

    pub fn color(mut self, color: Rgb888) -> Self {
        self.color = color;
        self
    }

    pub fn centered(mut self) -> Self {
        self.centered = true;
        self
    }
}

/// An open font file.
#[derive(Debug)]
pub struct GlyphFont {
    file: File,
    width: u8,
    height: u8,
    glyph_count: u64,
}

impl GlyphFont {
    /// Open a font file and read its header.
    pub fn open(path: &Path) -> Result<Self, FontError> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FontError::ResourceNotFound {
                path: path.to_path_buf(),
            },
            _ => FontError::Io(e),
        })?;
        let size = file.metadata()?.len();

        let mut header = [0u8; 2];
        file.read_exact(&mut header)?;
        let [width, height] = header;
        if width == 0 {
            return Err(FontError::Malformed {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            file,
            width,
            height,
            glyph_count: size.saturating_sub(HEADER_LEN) / u64::from(width),
        })
    }

    pub fn glyph_width(&self) -> i32 {
        i32::from(self.width)
    }

    pub fn glyph_height(&self) -> i32 {
        i32::from(self.height)
    }

    /// Highest character code with a glyph, `None` for a font with no glyphs
    pub fn last_supported_code(&self) -> Option<u32> {
        let last = u32::try_from(self.glyph_count.checked_sub(1)?).ok()?;
        last.checked_add(FIRST_CODE)
    }

    pub fn is_supported(&self, ch: char) -> bool {
        u32::from(ch)
            .checked_sub(FIRST_CODE)
            .is_some_and(|index| u64::from(index) < self.glyph_count)
    }

    /// Width in pixels of `text`, with one blank column between glyphs.
    /// Unsupported characters take no space.
    pub fn text_width(&self, text: &str) -> i32 {
        let glyphs = text.chars().filter(|&ch| self.is_supported(ch)).count() as i32;
        (glyphs * (self.glyph_width() + 1) - 1).max(0)
    }

    /// Draw one glyph with its top left corner at `(x, y)`.
    ///
    /// Columns and rows that fall outside the surface are clipped. Returns the
    /// glyph width, or 0 when the character is not in the font.
    pub fn render_glyph<S>(
        &mut self,
        fb: &mut FrameBuffer<S>,
        ch: char,
        x: i32,
        y: i32,
        color: Rgb888,
    ) -> Result<i32, FontError> {
        if !self.is_supported(ch) {
            return Ok(0);
        }

        let first_col = (-x).max(0);
        let last_col = (WIDTH - x).min(self.glyph_width());
        let first_row = (-y).max(0);
        let last_row = (HEIGHT - y).min(self.glyph_height());
        if first_col >= last_col || first_row >= last_row {
            return Ok(self.glyph_width());
        }

        let offset = HEADER_LEN
            + u64::from(u32::from(ch) - FIRST_CODE) * u64::from(self.width)
            + first_col as u64;
        let mut columns = vec![0u8; (last_col - first_col) as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut columns)?;

        for (col, bits) in (first_col..last_col).zip(columns) {
            for row in first_row..last_row {
                if bits.checked_shr(row as u32).unwrap_or(0) & 1 == 1 {
                    fb.set_pixel(x + col, y + row, color)?;
                }
            }
        }
        Ok(self.glyph_width())
    }
}

/// Resolves font names to files in one directory and renders text with them.
#[derive(Clone, Debug)]
pub struct FontLibrary {
    dir: PathBuf,
}

impl FontLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.bin"))
    }

    pub fn open(&self, name: &str) -> Result<GlyphFont, FontError> {
        GlyphFont::open(&self.path(name))
    }

    /// Width of `text` in the style's font, 0 if the font cannot be opened
    pub fn text_width(&self, text: &str, style: &TextStyle) -> i32 {
        match self.open(style.font) {
            Ok(font) => font.text_width(text),
            Err(e) => {
                warn!("Cannot measure text in font {}: {}", style.font, e);
                0
            }
        }
    }

    /// Draw a single character. A missing font renders nothing and reports
    /// zero width.
    pub fn render_glyph<S>(
        &self,
        fb: &mut FrameBuffer<S>,
        ch: char,
        x: i32,
        y: i32,
        style: &TextStyle,
    ) -> i32 {
        let result = self
            .open(style.font)
            .and_then(|mut font| font.render_glyph(fb, ch, x, y, style.color));
        result.unwrap_or_else(|e| {
            warn!("Cannot render {:?} in font {}: {}", ch, style.font, e);
            0
        })
    }

    /// Lay out `text` left to right starting at `(x, y)`.
    ///
    /// The cursor moves by the glyph width plus one blank column, and does not
    /// move at all for characters the font lacks. Returns the number of
    /// columns the drawn text spans.
    pub fn render_text<S>(
        &self,
        fb: &mut FrameBuffer<S>,
        text: &str,
        x: i32,
        y: i32,
        style: &TextStyle,
    ) -> i32 {
        let mut font = match self.open(style.font) {
            Ok(font) => font,
            Err(e) => {
                warn!("Cannot render {:?} in font {}: {}", text, style.font, e);
                return 0;
            }
        };

        let start = if style.centered {
            (WIDTH - font.text_width(text)).div_euclid(2)
        } else {
            x
        };

        let mut cursor = start;
        for ch in text.chars() {
            match font.render_glyph(fb, ch, cursor, y, style.color) {
                Ok(0) => {}
                Ok(width) => cursor += width + 1,
                Err(e) => warn!("Cannot render {:?} in font {}: {}", ch, style.font, e),
            }
        }
        (cursor - start - 1).max(0)
    }
}
