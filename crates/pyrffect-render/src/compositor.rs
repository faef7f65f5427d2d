//! The shared canvas every layer pastes onto once per frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pyrffect_core::{FrameSink, PixelBuffer, PyrffectError, PyrffectResult, CHANNELS};

/// How an overlay is fused onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Alpha-over: `dst * (1 - a) + src * a`, result alpha forced to 1.
    #[default]
    Linear,
    /// The overlay replaces the canvas verbatim, alpha included.
    Flat,
}

impl FusionMode {
    /// Fuse one row segment of `src` onto `dst`. Both hold whole pixels.
    pub fn fuse(self, dst: &mut [f32], src: &[f32]) {
        match self {
            FusionMode::Linear => {
                for (d, s) in dst.chunks_exact_mut(CHANNELS).zip(src.chunks_exact(CHANNELS)) {
                    let a = s[3];
                    let keep = 1.0 - a;
                    d[0] = d[0] * keep + s[0] * a;
                    d[1] = d[1] * keep + s[1] * a;
                    d[2] = d[2] * keep + s[2] * a;
                    d[3] = 1.0;
                }
            }
            FusionMode::Flat => dst.copy_from_slice(src),
        }
    }
}

impl FromStr for FusionMode {
    type Err = PyrffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(FusionMode::Linear),
            "flat" => Ok(FusionMode::Flat),
            other => Err(PyrffectError::config(format!(
                "no corresponding fusion mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionMode::Linear => write!(f, "linear"),
            FusionMode::Flat => write!(f, "flat"),
        }
    }
}

/// Destination rectangle of the next paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasteTarget {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
}

/// RGBA canvas plus the rectangle prepared for the next paste.
#[derive(Debug, Clone)]
pub struct Compositor {
    canvas: PixelBuffer,
    fusion: FusionMode,
    target: Option<PasteTarget>,
}

impl Compositor {
    pub fn new(width: usize, height: usize, fusion: FusionMode) -> Self {
        Self {
            canvas: PixelBuffer::new(width, height),
            fusion,
            target: None,
        }
    }

    pub fn width(&self) -> usize {
        self.canvas.width
    }

    pub fn height(&self) -> usize {
        self.canvas.height
    }

    pub fn fusion_mode(&self) -> FusionMode {
        self.fusion
    }

    pub fn canvas(&self) -> &PixelBuffer {
        &self.canvas
    }

    /// Prepare the next paste at `(x, y)`; a missing size means the whole canvas.
    pub fn set_coords(&mut self, x: i32, y: i32, width: Option<usize>, height: Option<usize>) {
        self.prepare(
            (x, y),
            (
                width.unwrap_or(self.canvas.width),
                height.unwrap_or(self.canvas.height),
            ),
        );
    }

    pub fn prepare(&mut self, pos: (i32, i32), size: (usize, usize)) {
        self.target = Some(PasteTarget {
            x: pos.0,
            y: pos.1,
            width: size.0,
            height: size.1,
        });
    }

    pub fn prepared(&self) -> Option<PasteTarget> {
        self.target
    }

    /// Fuse `overlay` onto the prepared rectangle, clipped to the canvas and
    /// to the rectangle's size. The rectangle is consumed by the paste.
    pub fn paste_on(&mut self, overlay: &PixelBuffer) -> PyrffectResult<()> {
        let target = self
            .target
            .take()
            .ok_or_else(|| PyrffectError::state("no coordinates were prepared for this paste"))?;

        let w = overlay.width.min(target.width) as i64;
        let h = overlay.height.min(target.height) as i64;
        let (dx, dy) = (target.x as i64, target.y as i64);
        let (cw, ch) = (self.canvas.width as i64, self.canvas.height as i64);

        let start_x = (-dx).max(0);
        let start_y = (-dy).max(0);
        let end_x = w.min(cw - dx);
        let end_y = h.min(ch - dy);
        if start_x >= end_x || start_y >= end_y {
            tracing::warn!(
                "paste of {}x{} at ({}, {}) falls outside the {}x{} canvas",
                overlay.width,
                overlay.height,
                dx,
                dy,
                cw,
                ch
            );
            return Ok(());
        }

        let len = (end_x - start_x) as usize * CHANNELS;
        for sy in start_y..end_y {
            let src_start = (sy as usize * overlay.width + start_x as usize) * CHANNELS;
            let src = &overlay.data[src_start..src_start + len];
            let dst_start =
                ((dy + sy) as usize * self.canvas.width + (dx + start_x) as usize) * CHANNELS;
            let dst = &mut self.canvas.data[dst_start..dst_start + len];
            self.fusion.fuse(dst, src);
        }
        Ok(())
    }

    /// Zero the whole canvas.
    pub fn reset(&mut self) {
        self.canvas.clear();
    }

    /// Clamp the canvas and hand it to `sink` as frame `index`.
    pub fn save(&mut self, index: u64, sink: &mut dyn FrameSink) -> PyrffectResult<()> {
        self.canvas.clamp_in_place();
        sink.write_frame(index, &self.canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrffect_core::{MemorySink, Rgba};

    #[test]
    fn test_paste_without_target_is_state_error() {
        let mut comp = Compositor::new(4, 4, FusionMode::Linear);
        let err = comp.paste_on(&PixelBuffer::new(2, 2)).unwrap_err();
        assert!(matches!(err, PyrffectError::State(_)));
    }

    #[test]
    fn test_target_is_consumed_by_paste() {
        let mut comp = Compositor::new(4, 4, FusionMode::Linear);
        comp.set_coords(0, 0, None, None);
        assert_eq!(comp.prepared().map(|t| (t.width, t.height)), Some((4, 4)));
        comp.paste_on(&PixelBuffer::new(2, 2)).unwrap();
        assert!(comp.prepared().is_none());
        assert!(comp.paste_on(&PixelBuffer::new(2, 2)).is_err());
    }

    #[test]
    fn test_opaque_overlay_replaces_destination() {
        let mut comp = Compositor::new(3, 3, FusionMode::Linear);
        comp.set_coords(0, 0, None, None);
        comp.paste_on(&PixelBuffer::filled(3, 3, Rgba::new(10.0, 200.0, 30.0, 0.7)))
            .unwrap();
        comp.set_coords(0, 0, None, None);
        comp.paste_on(&PixelBuffer::filled(3, 3, Rgba::BLUE)).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(comp.canvas().get(x, y), Some([0.0, 0.0, 255.0, 1.0]));
            }
        }
    }

    #[test]
    fn test_linear_blend_forces_alpha() {
        let mut comp = Compositor::new(1, 1, FusionMode::Linear);
        comp.set_coords(0, 0, None, None);
        comp.paste_on(&PixelBuffer::filled(1, 1, Rgba::new(200.0, 100.0, 0.0, 0.5)))
            .unwrap();
        assert_eq!(comp.canvas().get(0, 0), Some([100.0, 50.0, 0.0, 1.0]));
    }

    #[test]
    fn test_flat_mode_copies_verbatim() {
        let mut comp = Compositor::new(2, 1, FusionMode::Flat);
        comp.set_coords(0, 0, None, None);
        comp.paste_on(&PixelBuffer::filled(2, 1, Rgba::new(1.0, 2.0, 3.0, 0.25)))
            .unwrap();
        assert_eq!(comp.canvas().get(1, 0), Some([1.0, 2.0, 3.0, 0.25]));
    }

    #[test]
    fn test_paste_clipped_to_canvas_and_target() {
        let mut comp = Compositor::new(4, 4, FusionMode::Linear);
        comp.prepare((2, -1), (1, 10));
        comp.paste_on(&PixelBuffer::filled(3, 3, Rgba::RED)).unwrap();
        // Width clipped to the 1-pixel target, first row above the canvas dropped.
        assert_eq!(comp.canvas().get(2, 0), Some([255.0, 0.0, 0.0, 1.0]));
        assert_eq!(comp.canvas().get(2, 1), Some([255.0, 0.0, 0.0, 1.0]));
        assert_eq!(comp.canvas().get(2, 2), Some([0.0; 4]));
        assert_eq!(comp.canvas().get(3, 0), Some([0.0; 4]));

        comp.prepare((10, 10), (4, 4));
        comp.paste_on(&PixelBuffer::filled(3, 3, Rgba::RED)).unwrap();
    }

    #[test]
    fn test_save_and_reset() {
        let mut comp = Compositor::new(2, 2, FusionMode::Flat);
        comp.set_coords(0, 0, None, None);
        comp.paste_on(&PixelBuffer::filled(2, 2, Rgba::new(300.0, 0.0, 0.0, 1.0)))
            .unwrap();
        let mut sink = MemorySink::new();
        comp.save(0, &mut sink).unwrap();
        assert_eq!(sink.frames[0].get(0, 0), Some([255.0, 0.0, 0.0, 1.0]));
        comp.reset();
        assert!(comp.canvas().data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fusion_mode_parse() {
        assert_eq!("linear".parse::<FusionMode>().unwrap(), FusionMode::Linear);
        assert_eq!(" Flat ".parse::<FusionMode>().unwrap(), FusionMode::Flat);
        assert!("multiply".parse::<FusionMode>().is_err());
        assert_eq!(FusionMode::default().to_string(), "linear");
    }
}
