use serde::{Deserialize, Serialize};

use crate::color::Rgba;

/// Number of channels per pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// A floating point RGBA raster, stored row-major.
///
/// R, G and B live in `[0, 255]`, alpha is normalized to `[0, 1]`. Color
/// channels may leave their range while effects are doing math; they are
/// clamped when the buffer is converted to bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// `height * width * 4` floats.
    pub data: Vec<f32>,
}

impl PixelBuffer {
    /// Create a fully transparent black buffer.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; width * height * CHANNELS],
            width,
            height,
        }
    }

    /// Create a buffer filled with a single color.
    pub fn filled(width: usize, height: usize, color: Rgba) -> Self {
        let pixel = color.to_array();
        let mut data = Vec::with_capacity(width * height * CHANNELS);
        for _ in 0..width * height {
            data.extend_from_slice(&pixel);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build a buffer from 8-bit RGBA bytes, normalizing alpha to `[0, 1]`.
    pub fn from_rgba8(width: usize, height: usize, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != width * height * CHANNELS {
            return None;
        }
        let data = bytes
            .chunks_exact(CHANNELS)
            .flat_map(|p| {
                [
                    p[0] as f32,
                    p[1] as f32,
                    p[2] as f32,
                    p[3] as f32 / 255.0,
                ]
            })
            .collect();
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether the buffer holds no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    fn offset(&self, x: usize, y: usize) -> usize {
        (y * self.width + x) * CHANNELS
    }

    /// Get the pixel at `(x, y)`. Returns None if out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let o = self.offset(x, y);
        Some([
            self.data[o],
            self.data[o + 1],
            self.data[o + 2],
            self.data[o + 3],
        ])
    }

    /// Set the pixel at `(x, y)`. No-op if out of bounds.
    pub fn set(&mut self, x: usize, y: usize, px: [f32; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let o = self.offset(x, y);
        self.data[o..o + CHANNELS].copy_from_slice(&px);
    }

    /// Reset every channel of every pixel to zero.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Row `y` as a slice of `width * 4` floats.
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.width * CHANNELS;
        &self.data[start..start + self.width * CHANNELS]
    }

    /// Mutable row `y`.
    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let start = y * self.width * CHANNELS;
        let len = self.width * CHANNELS;
        &mut self.data[start..start + len]
    }

    /// Copy the rectangle `rect` out of the buffer, row-major.
    pub fn read_block(&self, rect: BlockRect) -> Vec<f32> {
        let mut out = Vec::with_capacity(rect.area() * CHANNELS);
        for y in rect.y0..rect.y1 {
            let row = self.row(y);
            out.extend_from_slice(&row[rect.x0 * CHANNELS..rect.x1 * CHANNELS]);
        }
        out
    }

    /// Write a block previously produced by [`read_block`](Self::read_block)
    /// into `rect`. The block must hold exactly `rect.area()` pixels.
    pub fn write_block(&mut self, rect: BlockRect, block: &[f32]) {
        let stride = rect.width() * CHANNELS;
        if stride == 0 || block.len() != stride * rect.height() {
            return;
        }
        for (i, y) in (rect.y0..rect.y1).enumerate() {
            let row = self.row_mut(y);
            row[rect.x0 * CHANNELS..rect.x1 * CHANNELS]
                .copy_from_slice(&block[i * stride..(i + 1) * stride]);
        }
    }

    /// Clamp every channel into its legal range (RGB `[0,255]`, A `[0,1]`).
    pub fn clamp_in_place(&mut self) {
        for px in self.data.chunks_exact_mut(CHANNELS) {
            px[0] = px[0].clamp(0.0, 255.0);
            px[1] = px[1].clamp(0.0, 255.0);
            px[2] = px[2].clamp(0.0, 255.0);
            px[3] = px[3].clamp(0.0, 1.0);
        }
    }

    /// Convert to 8-bit RGBA, clamping color and writing alpha as coverage.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(CHANNELS) {
            out.push(channel_to_u8(px[0]));
            out.push(channel_to_u8(px[1]));
            out.push(channel_to_u8(px[2]));
            out.push(channel_to_u8(px[3] * 255.0));
        }
        out
    }

    /// Convert to packed 8-bit RGB triples, dropping alpha.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixel_count() * 3);
        self.write_rgb8(&mut out);
        out
    }

    /// Append packed RGB triples to `out` (used to reuse an encoder scratch buffer).
    pub fn write_rgb8(&self, out: &mut Vec<u8>) {
        for px in self.data.chunks_exact(CHANNELS) {
            out.push(channel_to_u8(px[0]));
            out.push(channel_to_u8(px[1]));
            out.push(channel_to_u8(px[2]));
        }
    }
}

fn channel_to_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.clamp(0.0, 255.0) as u8
}

/// A half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl BlockRect {
    pub fn new(x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}
