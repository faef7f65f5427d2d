//! # pyrffect-render
//!
//! The Pyrffect rendering engine. Layers compute a buffer every tick, run
//! it through their effects and paste it onto a shared canvas; the
//! orchestrator streams the canvas to a frame sink.

pub mod compositor;
pub mod effects;
pub mod image_io;
pub mod layers;
pub mod orchestrator;
pub mod scene;

pub use compositor::{Compositor, FusionMode, PasteTarget};
pub use effects::{shared, Effect, LightEffect, PixelMove, SharedEffect};
pub use layers::{Firework, FireworkParams, FlatLayer, ImageLayer, Layer, LayerOutput, Phase};
pub use orchestrator::{Orchestrator, Placement, RunSummary};
pub use scene::{Scene, SceneBuilder};
