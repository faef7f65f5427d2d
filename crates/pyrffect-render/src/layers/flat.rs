use pyrffect_core::{PixelBuffer, PyrffectError, PyrffectResult, Rgba, SimClock};

use super::{Layer, LayerCore, LayerOutput};
use crate::effects::SharedEffect;

/// A solid fill. Without a fixed size it follows the canvas size.
pub struct FlatLayer {
    core: LayerCore,
    color: Rgba,
    listen_size: bool,
}

impl FlatLayer {
    pub fn new(color: Rgba, size: Option<(usize, usize)>, coords: (i32, i32)) -> Self {
        let mut core = LayerCore::new(coords);
        core.out_buffer = size.map(|(w, h)| PixelBuffer::filled(w, h, color));
        Self {
            core,
            color,
            listen_size: size.is_none(),
        }
    }

    /// A layer that covers the whole canvas.
    pub fn canvas_filling(color: Rgba) -> Self {
        Self::new(color, None, (0, 0))
    }

    pub fn color(&self) -> Rgba {
        self.color
    }
}

impl Layer for FlatLayer {
    fn kind(&self) -> &'static str {
        "flat"
    }

    fn coords(&self) -> (i32, i32) {
        self.core.coords
    }

    fn size(&self) -> Option<(usize, usize)> {
        self.core.size()
    }

    fn needs_dimensions(&self) -> bool {
        self.listen_size
    }

    fn set_dim(&mut self, width: usize, height: usize) {
        self.core.out_buffer = Some(PixelBuffer::filled(width, height, self.color));
    }

    fn add_effect(&mut self, effect: SharedEffect) {
        self.core.effects.push(effect);
    }

    fn compute(&mut self, _clock: &SimClock, output: LayerOutput<'_>) -> PyrffectResult<()> {
        let buffer = self.core.out_buffer.as_mut().ok_or_else(|| {
            PyrffectError::state("flat surface was never given a size to be displayed")
        })?;
        if !self.core.effects.is_empty() {
            *buffer = PixelBuffer::filled(buffer.width, buffer.height, self.color);
            self.core.apply_effects()?;
        }
        self.core.emit(self.kind(), output)
    }
}
