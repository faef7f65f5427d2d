//! Scene description handed over by the scene parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::attrs::Attrs;
use crate::error::{PyrffectError, PyrffectResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Inferred from fixed-size layers when absent.
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub framerate: u32,
    /// Seconds of animation.
    pub duration: f64,
    pub output: PathBuf,
    pub fusion_mode: String, // "linear" | "flat"
    pub seed: Option<u64>,
    /// When set, frames are written as numbered images instead of a video.
    pub frames_dir: Option<PathBuf>,
    pub frame_pattern: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            framerate: 60,
            duration: 10.0,
            output: PathBuf::from("res.mp4"),
            fusion_mode: "linear".to_string(),
            seed: None,
            frames_dir: None,
            frame_pattern: "img{}.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EffectSpec {
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl EffectSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attrs(&self) -> Attrs<'_> {
        Attrs::new(&self.kind, &self.attrs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LayerSpec {
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

impl LayerSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_effect(mut self, effect: EffectSpec) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn attrs(&self) -> Attrs<'_> {
        Attrs::new(&self.kind, &self.attrs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

impl SceneConfig {
    /// Load a scene from disk: TOML for `.toml` files, JSON otherwise.
    pub fn load(path: &Path) -> PyrffectResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let scene = if is_toml {
            Self::from_toml(&contents)?
        } else {
            Self::from_json(&contents)?
        };
        tracing::debug!(
            "loaded scene {} with {} layers",
            path.display(),
            scene.layers.len()
        );
        Ok(scene)
    }

    pub fn from_toml(contents: &str) -> PyrffectResult<Self> {
        toml::from_str(contents).map_err(|e| PyrffectError::Toml(e.to_string()))
    }

    pub fn from_json(contents: &str) -> PyrffectResult<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_toml(&self) -> PyrffectResult<String> {
        toml::to_string_pretty(self).map_err(|e| PyrffectError::Toml(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> PyrffectResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
