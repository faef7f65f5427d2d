//! Owns the layers, the canvas and the frame loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use pyrffect_core::{FrameSink, PyrffectError, PyrffectResult, SimClock};

use crate::compositor::{Compositor, FusionMode};
use crate::effects::SharedEffect;
use crate::layers::{Layer, LayerOutput};

/// Explicit paste rectangle for a layer. Missing sizes mean the canvas size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: Option<usize>,
    pub height: Option<usize>,
}

/// Outcome of [`Orchestrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_written: u64,
    pub interrupted: bool,
}

struct LayerEntry {
    order: i64,
    layer: Box<dyn Layer>,
    placement: Option<Placement>,
}

/// Drives every layer through the shared clock and hands composited frames
/// to a sink.
pub struct Orchestrator {
    clock: SimClock,
    fusion: FusionMode,
    dims: Option<(usize, usize)>,
    layers: BTreeMap<usize, LayerEntry>,
    next_index: usize,
    named_effects: HashMap<String, SharedEffect>,
    compositor: Option<Compositor>,
}

impl Orchestrator {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            fusion: FusionMode::default(),
            dims: None,
            layers: BTreeMap::new(),
            next_index: 0,
            named_effects: HashMap::new(),
            compositor: None,
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn set_fusion_mode(&mut self, fusion: FusionMode) {
        self.fusion = fusion;
    }

    pub fn fusion_mode(&self) -> FusionMode {
        self.fusion
    }

    pub fn dims(&self) -> Option<(usize, usize)> {
        self.dims
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Canvas of the last run.
    pub fn compositor(&self) -> Option<&Compositor> {
        self.compositor.as_ref()
    }

    /// Fix the canvas size and broadcast it to every layer that follows it.
    pub fn set_dim(&mut self, width: usize, height: usize) {
        self.dims = Some((width, height));
        for entry in self.layers.values_mut() {
            if entry.layer.needs_dimensions() {
                entry.layer.set_dim(width, height);
            }
        }
    }

    /// Register a layer and return its index. Without an explicit `order`
    /// the index itself is the order key.
    pub fn add_layer(
        &mut self,
        mut layer: Box<dyn Layer>,
        order: Option<i64>,
        placement: Option<Placement>,
    ) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        if let Some((w, h)) = self.dims {
            if layer.needs_dimensions() {
                layer.set_dim(w, h);
            }
        }
        tracing::debug!("layer {} ({}) added", index, layer.kind());
        self.layers.insert(
            index,
            LayerEntry {
                order: order.unwrap_or(index as i64),
                layer,
                placement,
            },
        );
        index
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(&index).map(|e| e.layer.as_ref())
    }

    /// Attach `effect` to the layer at `index`.
    pub fn add_effect(&mut self, index: usize, effect: SharedEffect) -> PyrffectResult<()> {
        let entry = self.layers.get_mut(&index).ok_or_else(|| {
            PyrffectError::state(format!("no layer at index {} to attach an effect to", index))
        })?;
        entry.layer.add_effect(effect);
        Ok(())
    }

    pub fn add_named_effect(&mut self, name: &str, effect: SharedEffect) -> PyrffectResult<()> {
        if self.named_effects.contains_key(name) {
            return Err(PyrffectError::config(format!(
                "an effect named '{}' already exists",
                name
            )));
        }
        self.named_effects.insert(name.to_string(), effect);
        Ok(())
    }

    /// A new handle to a registered effect.
    pub fn named_effect(&self, name: &str) -> PyrffectResult<SharedEffect> {
        self.named_effects
            .get(name)
            .cloned()
            .ok_or_else(|| PyrffectError::config(format!("no effect named '{}'", name)))
    }

    /// Layer indices by ascending order key; equal keys keep insertion order.
    pub fn paste_order(&self) -> Vec<usize> {
        let mut entries: Vec<(usize, i64)> =
            self.layers.iter().map(|(i, e)| (*i, e.order)).collect();
        entries.sort_by_key(|(_, order)| *order);
        entries.into_iter().map(|(i, _)| i).collect()
    }

    /// Render `total_frames` frames into `sink`.
    ///
    /// `cancel` is polled before every frame. Frames already written stay
    /// written, and `sink.finish()` runs however the loop ends. A sink that
    /// fails to close after an interrupted run does not hide the summary.
    pub fn run(
        &mut self,
        total_frames: u64,
        sink: &mut dyn FrameSink,
        cancel: &AtomicBool,
    ) -> PyrffectResult<RunSummary> {
        let result = self.run_frames(total_frames, sink, cancel);
        let finished = sink.finish();
        match (result, finished) {
            (Ok(summary), Err(e)) if summary.interrupted => {
                tracing::warn!(
                    "output not closed cleanly after interrupt ({} frames written): {}",
                    summary.frames_written,
                    e
                );
                Ok(summary)
            }
            (result, finished) => {
                let summary = result?;
                finished?;
                Ok(summary)
            }
        }
    }

    fn run_frames(
        &mut self,
        total_frames: u64,
        sink: &mut dyn FrameSink,
        cancel: &AtomicBool,
    ) -> PyrffectResult<RunSummary> {
        let (width, height) = self
            .dims
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or_else(|| PyrffectError::config("canvas size is unknown or empty"))?;

        for entry in self.layers.values_mut() {
            entry.layer.reset();
        }
        let order = self.paste_order();
        tracing::info!(
            "rendering {} frames of {}x{} at {} with {} layers",
            total_frames,
            width,
            height,
            self.clock,
            order.len()
        );

        let compositor = self
            .compositor
            .insert(Compositor::new(width, height, self.fusion));
        let mut frames_written = 0;
        for frame in 0..total_frames {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!("interrupted after {} frames", frames_written);
                return Ok(RunSummary {
                    frames_written,
                    interrupted: true,
                });
            }

            for index in &order {
                let Some(entry) = self.layers.get_mut(index) else {
                    continue;
                };
                let (x, y, w, h) = match entry.placement {
                    Some(p) => (p.x, p.y, p.width, p.height),
                    None => {
                        let (x, y) = entry.layer.coords();
                        (x, y, None, None)
                    }
                };
                compositor.set_coords(x, y, w, h);
                entry
                    .layer
                    .compute(&self.clock, LayerOutput::Compositor(&mut *compositor))?;
            }

            compositor.save(frame, sink)?;
            compositor.reset();
            frames_written += 1;
            tracing::debug!("frame {}/{} written", frame + 1, total_frames);
        }

        tracing::info!("render finished: {} frames", frames_written);
        Ok(RunSummary {
            frames_written,
            interrupted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{shared, LightEffect};
    use crate::layers::FlatLayer;
    use pyrffect_core::{MemorySink, PixelBuffer, Rgba};

    fn flat(color: Rgba) -> Box<dyn Layer> {
        Box::new(FlatLayer::canvas_filling(color))
    }

    #[test]
    fn test_stable_paste_order() {
        let mut orch = Orchestrator::new(SimClock::default());
        for order in [2, 2, 1, 3] {
            orch.add_layer(flat(Rgba::RED), Some(order), None);
        }
        assert_eq!(orch.paste_order(), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_default_order_is_insertion_order() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_layer(flat(Rgba::RED), None, None);
        orch.add_layer(flat(Rgba::RED), None, None);
        orch.add_layer(flat(Rgba::RED), Some(-1), None);
        assert_eq!(orch.paste_order(), vec![2, 0, 1]);
    }

    #[test]
    fn test_size_broadcast_reaches_late_layers() {
        let mut orch = Orchestrator::new(SimClock::default());
        let early = orch.add_layer(flat(Rgba::RED), None, None);
        orch.set_dim(6, 4);
        let late = orch.add_layer(flat(Rgba::BLUE), None, None);
        assert_eq!(orch.layer(early).and_then(|l| l.size()), Some((6, 4)));
        assert_eq!(orch.layer(late).and_then(|l| l.size()), Some((6, 4)));
    }

    #[test]
    fn test_effect_on_missing_layer_is_state_error() {
        let mut orch = Orchestrator::new(SimClock::default());
        let err = orch
            .add_effect(3, shared(LightEffect::default()))
            .unwrap_err();
        assert!(matches!(err, PyrffectError::State(_)));
    }

    #[test]
    fn test_named_effects() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_named_effect("glow", shared(LightEffect::default()))
            .unwrap();
        assert!(orch
            .add_named_effect("glow", shared(LightEffect::default()))
            .is_err());
        assert!(orch.named_effect("glow").is_ok());
        assert!(matches!(
            orch.named_effect("nope"),
            Err(PyrffectError::Configuration(_))
        ));
    }

    #[test]
    fn test_run_without_canvas_size_fails_but_finishes_sink() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_layer(flat(Rgba::RED), None, None);
        let mut sink = MemorySink::new();
        assert!(orch.run(3, &mut sink, &AtomicBool::new(false)).is_err());
        assert!(sink.finished);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_run_composites_in_order() {
        let mut orch = Orchestrator::new(SimClock::new(10).unwrap());
        orch.add_layer(flat(Rgba::RED), Some(1), None);
        orch.add_layer(
            Box::new(FlatLayer::new(Rgba::BLUE, Some((2, 2)), (1, 1))),
            Some(2),
            None,
        );
        orch.set_dim(4, 4);

        let mut sink = MemorySink::new();
        let summary = orch.run(2, &mut sink, &AtomicBool::new(false)).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                frames_written: 2,
                interrupted: false
            }
        );
        assert!(sink.finished);
        let frame = &sink.frames[1];
        assert_eq!(frame.get(0, 0), Some([255.0, 0.0, 0.0, 1.0]));
        assert_eq!(frame.get(2, 2), Some([0.0, 0.0, 255.0, 1.0]));
        assert_eq!(frame.get(3, 3), Some([255.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_placement_overrides_layer_coords() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_layer(
            Box::new(FlatLayer::new(Rgba::GREEN, Some((3, 3)), (0, 0))),
            None,
            Some(Placement {
                x: 2,
                y: 2,
                width: Some(1),
                height: None,
            }),
        );
        orch.set_dim(4, 4);
        let mut sink = MemorySink::new();
        orch.run(1, &mut sink, &AtomicBool::new(false)).unwrap();
        let frame = &sink.frames[0];
        assert_eq!(frame.get(2, 2), Some([0.0, 255.0, 0.0, 1.0]));
        assert_eq!(frame.get(3, 2), Some([0.0; 4]));
        assert_eq!(frame.get(0, 0), Some([0.0; 4]));
    }

    #[test]
    fn test_cancelled_before_first_frame() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_layer(flat(Rgba::RED), None, None);
        orch.set_dim(2, 2);
        let mut sink = MemorySink::new();
        let summary = orch.run(5, &mut sink, &AtomicBool::new(true)).unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.frames_written, 0);
        assert!(sink.finished);
    }

    /// Cancels after `after` frames and fails to close, like an encoder
    /// that was signalled along with the renderer.
    struct BrokenOnClose {
        after: u64,
        cancel: std::sync::Arc<AtomicBool>,
        frames: u64,
    }

    impl FrameSink for BrokenOnClose {
        fn write_frame(&mut self, _index: u64, _frame: &PixelBuffer) -> PyrffectResult<()> {
            self.frames += 1;
            if self.frames >= self.after {
                self.cancel.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn finish(&mut self) -> PyrffectResult<()> {
            Err(PyrffectError::encode("ffmpeg exited with exit status: 255"))
        }
    }

    #[test]
    fn test_interrupted_run_survives_failed_finish() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_layer(flat(Rgba::RED), None, None);
        orch.set_dim(2, 2);
        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let mut sink = BrokenOnClose {
            after: 3,
            cancel: std::sync::Arc::clone(&cancel),
            frames: 0,
        };
        let summary = orch.run(10, &mut sink, &cancel).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                frames_written: 3,
                interrupted: true
            }
        );
    }

    #[test]
    fn test_failed_finish_after_complete_run_is_an_error() {
        let mut orch = Orchestrator::new(SimClock::default());
        orch.add_layer(flat(Rgba::RED), None, None);
        orch.set_dim(2, 2);
        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let mut sink = BrokenOnClose {
            after: u64::MAX,
            cancel: std::sync::Arc::clone(&cancel),
            frames: 0,
        };
        let err = orch.run(2, &mut sink, &cancel).unwrap_err();
        assert!(matches!(err, PyrffectError::Encode { .. }));
    }
}
