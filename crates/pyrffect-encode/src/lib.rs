//! # pyrffect-encode
//!
//! Turns composited canvases into files: single PNG stills, numbered
//! image sequences, or a raw RGB stream piped into FFmpeg.

pub mod ffmpeg;
pub mod sequence;
pub mod still;

use std::path::Path;

use pyrffect_core::{FrameSink, PyrffectResult};

pub use ffmpeg::{FfmpegSink, RawVideoSpec, VideoCodec};
pub use sequence::ImageSequenceSink;
pub use still::save_png;

/// Pick the sink for a run: numbered PNGs when `frames_dir` is given,
/// otherwise an FFmpeg process writing `output`.
pub fn open_sink(
    output: &Path,
    frames_dir: Option<&Path>,
    frame_pattern: &str,
    width: usize,
    height: usize,
    fps: u32,
) -> PyrffectResult<Box<dyn FrameSink>> {
    match frames_dir {
        Some(dir) => Ok(Box::new(ImageSequenceSink::new(dir, frame_pattern)?)),
        None => {
            let spec = RawVideoSpec::new(output, width, height, fps)?;
            Ok(Box::new(FfmpegSink::spawn(spec)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_video_extension_fails_before_spawning() {
        let Err(err) = open_sink(Path::new("out.gif"), None, "img{}.png", 16, 16, 24) else {
            panic!("a gif output should not open an ffmpeg sink");
        };
        assert!(matches!(err, pyrffect_core::PyrffectError::Encode { .. }));
        assert!(err.to_string().contains(".gif"), "{}", err);
    }

    #[test]
    fn test_frames_dir_wins_over_video_output() {
        let dir = std::env::temp_dir().join("pyrffect_open_sink_seq");
        let sink = open_sink(Path::new("out.gif"), Some(&dir), "img{}.png", 16, 16, 24);
        assert!(sink.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
