use std::path::Path;

use pyrffect_core::{PixelBuffer, PyrffectError, PyrffectResult, SimClock};

use super::{Layer, LayerCore, LayerOutput};
use crate::effects::SharedEffect;
use crate::image_io::load_image;

/// A static picture, re-run through its effects every tick.
#[derive(Default)]
pub struct ImageLayer {
    core: LayerCore,
    buffer: Option<PixelBuffer>,
}

impl ImageLayer {
    /// A layer with no picture yet; [`open`](Self::open) must be called before computing.
    pub fn new(coords: (i32, i32)) -> Self {
        Self {
            core: LayerCore::new(coords),
            buffer: None,
        }
    }

    pub fn from_file(path: &Path, coords: (i32, i32)) -> PyrffectResult<Self> {
        let mut layer = Self::new(coords);
        layer.open(path)?;
        Ok(layer)
    }

    pub fn from_buffer(buffer: PixelBuffer, coords: (i32, i32)) -> Self {
        let mut layer = Self::new(coords);
        layer.set_source(buffer);
        layer
    }

    /// Load the source picture from disk.
    pub fn open(&mut self, path: &Path) -> PyrffectResult<()> {
        let buffer = load_image(path)?;
        tracing::debug!(
            "loaded {} ({}x{})",
            path.display(),
            buffer.width,
            buffer.height
        );
        self.set_source(buffer);
        Ok(())
    }

    pub fn set_source(&mut self, buffer: PixelBuffer) {
        self.core.out_buffer = Some(buffer.clone());
        self.buffer = Some(buffer);
    }
}

impl Layer for ImageLayer {
    fn kind(&self) -> &'static str {
        "image"
    }

    fn coords(&self) -> (i32, i32) {
        self.core.coords
    }

    fn size(&self) -> Option<(usize, usize)> {
        self.buffer.as_ref().map(|b| (b.width, b.height))
    }

    fn add_effect(&mut self, effect: SharedEffect) {
        self.core.effects.push(effect);
    }

    fn compute(&mut self, _clock: &SimClock, output: LayerOutput<'_>) -> PyrffectResult<()> {
        let source = self
            .buffer
            .as_ref()
            .ok_or_else(|| PyrffectError::state("image layer computed before a picture was opened"))?;
        match self.core.out_buffer.as_mut() {
            Some(out) => out.data.copy_from_slice(&source.data),
            None => self.core.out_buffer = Some(source.clone()),
        }
        self.core.apply_effects()?;
        self.core.emit(self.kind(), output)
    }
}
