//! # Display Module
//!
//! Drawing collaborator interface and the waveform renderer.
//!
//! This module handles:
//! - The [`Display`] primitive set (pixel, line, rect, scroll, text)
//! - The fixed RGB565 [`Color`] palette
//! - An in-memory [`FrameBuffer`] for headless runs and tests
//! - The scrolling waveform sink ([`renderer`])

pub mod renderer;

/// Screen width of the reference panel, in pixels.
pub const SCREEN_WIDTH: i32 = 320;

/// Screen height of the reference panel, in pixels.
pub const SCREEN_HEIGHT: i32 = 240;

/// Fixed palette, RGB565.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    White,
    Gray,
    Green,
    Cyan,
    Red,
    Yellow,
}

impl Color {
    /// RGB565 value.
    #[must_use]
    pub fn rgb565(self) -> u16 {
        match self {
            Color::Black => 0x0000,
            Color::White => 0xFFFF,
            Color::Gray => 0x7BEF,
            Color::Green => 0x07E0,
            Color::Cyan => 0x07FF,
            Color::Red => 0xF800,
            Color::Yellow => 0xFFE0,
        }
    }
}

/// Display collaborator. Callers pass pre-clamped coordinates; drawing
/// outside the panel is clipped.
pub trait Display {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn draw_pixel(&mut self, x: i32, y: i32, color: Color);
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color);
    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color);
    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color);
    /// Shifts the whole panel left by `dx` pixels (right if negative).
    fn scroll(&mut self, dx: i32);
    /// Prints `text` with its top-left corner at `(x, y)`.
    fn print_at(&mut self, x: i32, y: i32, text: &str, color: Color);
}

/// Text item placed by [`Display::print_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub color: Color,
}

/// In-memory panel.
///
/// Pixels are stored as [`Color`]. Text is kept as positioned items since
/// glyph rendering belongs to the panel driver; a fill over an item's anchor
/// erases it.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: i32,
    height: i32,
    pixels: Vec<Color>,
    texts: Vec<TextItem>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(SCREEN_WIDTH, SCREEN_HEIGHT)
    }
}

impl FrameBuffer {
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            pixels: vec![Color::Black; (width * height) as usize],
            texts: Vec::new(),
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    /// Color at `(x, y)`, `None` outside the panel.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Rows of column `x` that are not black.
    #[must_use]
    pub fn lit_rows(&self, x: i32, y_range: std::ops::Range<i32>) -> Vec<(i32, Color)> {
        y_range
            .filter_map(|y| match self.pixel(x, y) {
                Some(Color::Black) | None => None,
                Some(color) => Some((y, color)),
            })
            .collect()
    }

    /// Text items currently on screen.
    #[must_use]
    pub fn texts(&self) -> &[TextItem] {
        &self.texts
    }

    /// Text printed at exactly `(x, y)`, if any.
    #[must_use]
    pub fn text_at(&self, x: i32, y: i32) -> Option<&str> {
        self.texts
            .iter()
            .find(|t| t.x == x && t.y == y)
            .map(|t| t.text.as_str())
    }
}

impl Display for FrameBuffer {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn draw_pixel(&mut self, x: i32, y: i32, color: Color) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color;
        }
    }

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        // Bresenham
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.draw_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
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

    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color) {
        if w <= 0 || h <= 0 {
            return;
        }
        let (x1, y1) = (x + w - 1, y + h - 1);
        self.draw_line(x, y, x1, y, color);
        self.draw_line(x, y1, x1, y1, color);
        self.draw_line(x, y, x, y1, color);
        self.draw_line(x1, y, x1, y1, color);
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color) {
        for py in y..y + h {
            for px in x..x + w {
                self.draw_pixel(px, py, color);
            }
        }
        self.texts
            .retain(|t| !(t.x >= x && t.x < x + w && t.y >= y && t.y < y + h));
    }

    fn scroll(&mut self, dx: i32) {
        if dx == 0 {
            return;
        }
        let width = self.width;
        for row in self.pixels.chunks_mut(width as usize) {
            let shift = dx.unsigned_abs().min(width as u32) as usize;
            if dx > 0 {
                row.rotate_left(shift);
                row[width as usize - shift..].fill(Color::Black);
            } else {
                row.rotate_right(shift);
                row[..shift].fill(Color::Black);
            }
        }
        for text in &mut self.texts {
            text.x -= dx;
        }
        self.texts.retain(|t| t.x >= 0 && t.x < width);
    }

    fn print_at(&mut self, x: i32, y: i32, text: &str, color: Color) {
        self.texts.retain(|t| !(t.x == x && t.y == y));
        self.texts.push(TextItem {
            x,
            y,
            text: text.to_string(),
            color,
        });
    }
}
