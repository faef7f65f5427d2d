//! Builds a runnable [`Orchestrator`] from a parsed [`SceneConfig`].

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use pyrffect_core::{
    Attrs, EffectSpec, LayerSpec, PyrffectError, PyrffectResult, Rgba, SceneConfig, SimClock,
};

use crate::compositor::FusionMode;
use crate::effects::{shared, LightEffect, PixelMove, SharedEffect};
use crate::layers::{Firework, FlatLayer, ImageLayer, Layer};
use crate::orchestrator::Orchestrator;

/// A scene ready to render.
pub struct Scene {
    pub orchestrator: Orchestrator,
    pub total_frames: u64,
    pub width: usize,
    pub height: usize,
    pub fps: u32,
    pub output: PathBuf,
    pub frames_dir: Option<PathBuf>,
    pub frame_pattern: String,
}

/// Turns layer and effect descriptions into live objects.
///
/// Layers are built first, so a `named` effect may refer to a firework
/// declared later in the file.
pub struct SceneBuilder {
    config: SceneConfig,
    base_dir: PathBuf,
    parallel: bool,
}

impl SceneBuilder {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            base_dir: PathBuf::from("."),
            parallel: false,
        }
    }

    /// Load a scene file; image paths resolve relative to its directory.
    pub fn from_path(path: &Path) -> PyrffectResult<Self> {
        let config = SceneConfig::load(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(config).with_base_dir(base_dir))
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Run every pixel-move effect on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SceneConfig {
        &mut self.config
    }

    pub fn build(self) -> PyrffectResult<Scene> {
        let canvas = &self.config.canvas;
        let clock = SimClock::new(canvas.framerate)?;
        let fusion: FusionMode = canvas.fusion_mode.parse()?;
        let mut orchestrator = Orchestrator::new(clock);
        orchestrator.set_fusion_mode(fusion);

        let mut indices = Vec::with_capacity(self.config.layers.len());
        let mut extent = (0usize, 0usize);
        for (i, spec) in self.config.layers.iter().enumerate() {
            let attrs = spec.attrs();
            let coords = (
                attrs.parse_or("x", 0i32)?,
                attrs.parse_or("y", 0i32)?,
            );
            let order = attrs.parse::<i64>("order")?;
            let (layer, named) = self.build_layer(spec, &attrs, coords, i)?;

            if !layer.needs_dimensions() {
                if let Some((w, h)) = layer.size() {
                    extent.0 = extent.0.max((coords.0.max(0) as usize) + w);
                    extent.1 = extent.1.max((coords.1.max(0) as usize) + h);
                }
            }
            let index = orchestrator.add_layer(layer, order, None);
            if let Some((name, effect)) = named {
                orchestrator.add_named_effect(&name, effect)?;
            }
            indices.push(index);
        }

        for ((i, spec), index) in self.config.layers.iter().enumerate().zip(&indices) {
            for (j, effect) in spec.effects.iter().enumerate() {
                let effect = self.build_effect(effect, &orchestrator, i, j)?;
                orchestrator.add_effect(*index, effect)?;
            }
        }

        let width = canvas.width.unwrap_or(extent.0);
        let height = canvas.height.unwrap_or(extent.1);
        if width == 0 || height == 0 {
            return Err(PyrffectError::config(format!(
                "canvas size {}x{} is empty; give width/height or a fixed-size layer",
                width, height
            )));
        }
        orchestrator.set_dim(width, height);

        let total_frames = clock.frame_count(canvas.duration);
        tracing::info!(
            "scene built: {} layers, {}x{}, {} frames at {}",
            orchestrator.layer_count(),
            width,
            height,
            total_frames,
            clock
        );
        Ok(Scene {
            orchestrator,
            total_frames,
            width,
            height,
            fps: canvas.framerate,
            output: canvas.output.clone(),
            frames_dir: canvas.frames_dir.clone(),
            frame_pattern: canvas.frame_pattern.clone(),
        })
    }

    fn rng(&self, layer: usize, slot: usize) -> StdRng {
        match self.config.canvas.seed {
            Some(seed) => StdRng::seed_from_u64(mix_seed(seed, layer, slot)),
            None => StdRng::from_os_rng(),
        }
    }

    #[allow(clippy::type_complexity)]
    fn build_layer(
        &self,
        spec: &LayerSpec,
        attrs: &Attrs<'_>,
        coords: (i32, i32),
        index: usize,
    ) -> PyrffectResult<(Box<dyn Layer>, Option<(String, SharedEffect)>)> {
        match spec.kind.as_str() {
            "image" | "calc" => {
                let src = self.base_dir.join(attrs.require("src")?);
                Ok((Box::new(ImageLayer::from_file(&src, coords)?), None))
            }
            "flat" => {
                let color = attrs.color("color")?.unwrap_or(Rgba::BLACK);
                let size = match (attrs.parse::<usize>("width")?, attrs.parse::<usize>("height")?) {
                    (Some(w), Some(h)) => Some((w, h)),
                    (None, None) => None,
                    _ => {
                        return Err(PyrffectError::config(
                            "flat: width and height must be given together",
                        ))
                    }
                };
                Ok((Box::new(FlatLayer::new(color, size, coords)), None))
            }
            "firework" => {
                let firework = Firework::from_attrs(attrs, coords, self.rng(index, 0))?;
                let named = attrs
                    .get("name_effect")
                    .map(|name| (name.to_string(), firework.light_effect()));
                Ok((Box::new(firework), named))
            }
            other => Err(PyrffectError::config(format!(
                "no corresponding layer kind '{}'",
                other
            ))),
        }
    }

    fn build_effect(
        &self,
        spec: &EffectSpec,
        orchestrator: &Orchestrator,
        layer: usize,
        slot: usize,
    ) -> PyrffectResult<SharedEffect> {
        let attrs = spec.attrs();
        match spec.kind.as_str() {
            "light" => Ok(shared(LightEffect::from_attrs(&attrs)?)),
            "pixel" => {
                let effect = PixelMove::from_attrs(&attrs, self.rng(layer, slot + 1))?;
                let parallel = self.parallel || effect.is_parallel();
                Ok(shared(effect.with_parallel(parallel)))
            }
            "named" => orchestrator.named_effect(attrs.require("name")?),
            other => Err(PyrffectError::config(format!(
                "no corresponding effect kind '{}'",
                other
            ))),
        }
    }
}

/// SplitMix64 over the scene seed and the object's position.
fn mix_seed(seed: u64, layer: usize, slot: usize) -> u64 {
    let mut z = seed
        ^ (layer as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (slot as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrffect_core::CanvasConfig;

    fn scene(layers: Vec<LayerSpec>) -> SceneConfig {
        SceneConfig {
            canvas: CanvasConfig {
                framerate: 10,
                duration: 0.5,
                seed: Some(7),
                ..CanvasConfig::default()
            },
            layers,
        }
    }

    #[test]
    fn test_canvas_inferred_from_fixed_layers() {
        let config = scene(vec![
            LayerSpec::new("flat")
                .with("color", "255,0,0,1")
                .with("width", "10")
                .with("height", "4")
                .with("x", "3"),
            LayerSpec::new("flat")
                .with("width", "2")
                .with("height", "2")
                .with("y", "9"),
            LayerSpec::new("flat"),
        ]);
        let built = SceneBuilder::new(config).build().unwrap();
        assert_eq!((built.width, built.height), (13, 11));
        assert_eq!(built.total_frames, 5);
        assert_eq!(
            built.orchestrator.layer(2).and_then(|l| l.size()),
            Some((13, 11))
        );
    }

    #[test]
    fn test_explicit_canvas_wins() {
        let mut config = scene(vec![LayerSpec::new("flat")
            .with("width", "100")
            .with("height", "100")]);
        config.canvas.width = Some(20);
        config.canvas.height = Some(30);
        let built = SceneBuilder::new(config).build().unwrap();
        assert_eq!((built.width, built.height), (20, 30));
    }

    #[test]
    fn test_empty_canvas_rejected() {
        let config = scene(vec![LayerSpec::new("flat")]);
        assert!(matches!(
            SceneBuilder::new(config).build(),
            Err(PyrffectError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_kinds_rejected() {
        let config = scene(vec![LayerSpec::new("sprite")]);
        let err = SceneBuilder::new(config).build().err().unwrap();
        assert!(err.to_string().contains("sprite"));

        let config = scene(vec![LayerSpec::new("flat")
            .with("width", "2")
            .with("height", "2")
            .with_effect(EffectSpec::new("blur"))]);
        let err = SceneBuilder::new(config).build().err().unwrap();
        assert!(err.to_string().contains("blur"));
    }

    #[test]
    fn test_named_effect_may_precede_its_firework() {
        let mut config = scene(vec![
            LayerSpec::new("flat").with_effect(EffectSpec::new("named").with("name", "boom")),
            LayerSpec::new("firework")
                .with("colors", "all")
                .with("x_stat", "5,15")
                .with("y_stat", "2,6,20")
                .with("pause", "0.1,0.2")
                .with("duration", "0.5,1")
                .with("intensity", "0.5,1")
                .with("name_effect", "boom"),
        ]);
        config.canvas.width = Some(20);
        config.canvas.height = Some(20);
        let built = SceneBuilder::new(config).build().unwrap();
        assert!(built.orchestrator.named_effect("boom").is_ok());
    }

    #[test]
    fn test_unknown_named_effect() {
        let config = scene(vec![LayerSpec::new("flat")
            .with("width", "2")
            .with("height", "2")
            .with_effect(EffectSpec::new("named").with("name", "ghost"))]);
        assert!(matches!(
            SceneBuilder::new(config).build(),
            Err(PyrffectError::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_fusion_mode() {
        let mut config = scene(vec![LayerSpec::new("flat")
            .with("width", "2")
            .with("height", "2")]);
        config.canvas.fusion_mode = "screen".to_string();
        assert!(SceneBuilder::new(config).build().is_err());
    }

    #[test]
    fn test_mix_seed_separates_slots() {
        assert_ne!(mix_seed(1, 0, 0), mix_seed(1, 0, 1));
        assert_ne!(mix_seed(1, 0, 0), mix_seed(1, 1, 0));
        assert_eq!(mix_seed(1, 2, 3), mix_seed(1, 2, 3));
    }
}
