//! Independently animated raster sources.

mod firework;
mod flat;
mod image_layer;

use std::path::Path;

use pyrffect_core::{PixelBuffer, PyrffectError, PyrffectResult, SimClock};

use crate::compositor::Compositor;
use crate::effects::{apply_all, SharedEffect};

pub use firework::{Firework, FireworkParams, Phase, LAUNCH_TIME_PROP, RAY_COUNT};
pub use flat::FlatLayer;
pub use image_layer::ImageLayer;

/// Where a layer sends the buffer it computed this tick.
pub enum LayerOutput<'a> {
    /// Write a still image.
    File(&'a Path),
    /// Fuse onto the canvas at the rectangle the orchestrator prepared.
    Compositor(&'a mut Compositor),
}

/// A renderable layer.
///
/// Lifecycle: constructed, optionally sized through [`set_dim`](Layer::set_dim),
/// [`reset`](Layer::reset) once before the first frame, then
/// [`compute`](Layer::compute) every tick.
pub trait Layer {
    /// Short tag used in logs and scene files.
    fn kind(&self) -> &'static str;

    /// Integer offset on the canvas.
    fn coords(&self) -> (i32, i32);

    /// Current size, once known.
    fn size(&self) -> Option<(usize, usize)>;

    /// Whether this layer takes its size from the canvas.
    fn needs_dimensions(&self) -> bool {
        false
    }

    /// Receive the canvas size.
    fn set_dim(&mut self, _width: usize, _height: usize) {}

    /// Clear all time-dependent state.
    fn reset(&mut self) {}

    fn add_effect(&mut self, effect: SharedEffect);

    /// Advance one tick and emit the result to `output`.
    fn compute(&mut self, clock: &SimClock, output: LayerOutput<'_>) -> PyrffectResult<()>;
}

/// State every layer kind carries: offset, working buffer and effects.
#[derive(Default)]
pub struct LayerCore {
    pub coords: (i32, i32),
    pub out_buffer: Option<PixelBuffer>,
    pub effects: Vec<SharedEffect>,
}

impl LayerCore {
    pub fn new(coords: (i32, i32)) -> Self {
        Self {
            coords,
            out_buffer: None,
            effects: Vec::new(),
        }
    }

    pub fn size(&self) -> Option<(usize, usize)> {
        self.out_buffer.as_ref().map(|b| (b.width, b.height))
    }

    /// Run the attached effects over the working buffer.
    pub fn apply_effects(&mut self) -> PyrffectResult<()> {
        if let Some(buffer) = self.out_buffer.as_mut() {
            apply_all(&self.effects, buffer, self.coords)?;
        }
        Ok(())
    }

    /// Hand the working buffer to `output`.
    pub fn emit(&self, kind: &str, output: LayerOutput<'_>) -> PyrffectResult<()> {
        let buffer = self.out_buffer.as_ref().ok_or_else(|| {
            PyrffectError::state(format!("{} layer has no buffer to emit", kind))
        })?;
        match output {
            LayerOutput::File(path) => pyrffect_encode::save_png(path, buffer),
            LayerOutput::Compositor(compositor) => compositor.paste_on(buffer),
        }
    }
}
