//! # pyrffect-core
//!
//! Core types shared by every Pyrffect crate: the pixel buffer and color
//! models, the curve library that drives all procedural motion, the
//! simulation clock, the scene description and the frame-sink seam.

pub mod attrs;
pub mod color;
pub mod config;
pub mod curve;
pub mod error;
pub mod frame;
pub mod hash;
pub mod sink;
pub mod time;

pub use attrs::Attrs;
pub use color::{rgb_to_tsv, tsv_to_rgb, Rgba, Tsv};
pub use config::{CanvasConfig, EffectSpec, LayerSpec, SceneConfig};
pub use curve::Curve;
pub use error::{PyrffectError, PyrffectResult};
pub use frame::{BlockRect, PixelBuffer, CHANNELS};
pub use hash::{ContentHash, HashSink};
pub use sink::{FrameSink, MemorySink};
pub use time::SimClock;
