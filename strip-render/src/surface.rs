use serde::{Deserialize, Serialize};

/// Width of a distribution strip on the statistics page.
pub const DEFAULT_WIDTH: u32 = 415;
pub const DEFAULT_HEIGHT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::grey(255);
    pub const BLACK: Rgba = Rgba::grey(0);
    /// Blue used for simplification markers.
    pub const MARKER: Rgba = Rgba::rgb(105, 105, 185);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn grey(level: u8) -> Self {
        Self::rgb(level, level, level)
    }

    /// CSS colour string for canvas fill styles.
    pub fn css(&self) -> String {
        if self.a == 255 {
            format!("rgb({},{},{})", self.r, self.g, self.b)
        } else {
            format!(
                "rgba({},{},{},{:.3})",
                self.r,
                self.g,
                self.b,
                self.a as f64 / 255.0
            )
        }
    }
}

/// Anything a strip can be painted onto.
pub trait StripSurface {
    /// `(width, height)` in pixels.
    fn size(&self) -> (u32, u32);
    fn clear(&mut self, color: Rgba);
    /// Fill `[x0, x1) x [y0, y1)`. Implementations clip to their bounds.
    fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgba);
}

/// RGBA pixel buffer mirroring a canvas, row-major, 4 bytes per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Default for PixelSurface {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw bytes, ready for `ImageData`.
    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some(Rgba {
            r: self.pixels[i],
            g: self.pixels[i + 1],
            b: self.pixels[i + 2],
            a: self.pixels[i + 3],
        })
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

impl StripSurface for PixelSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    }

    fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgba) {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        for y in y0..y1 {
            let start = self.offset(x0, y);
            let end = self.offset(x1, y);
            for px in self.pixels[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
            }
        }
    }
}
