use std::path::{Path, PathBuf};

use pyrffect_core::{FrameSink, PixelBuffer, PyrffectError, PyrffectResult};

use crate::still::save_png;

/// Writes every frame as its own PNG, named from a `{}` pattern.
#[derive(Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    pattern: String,
    written: u64,
}

impl ImageSequenceSink {
    /// Create the sink, making `dir` if needed. `pattern` must contain `{}`,
    /// which is replaced by the frame index.
    pub fn new(dir: &Path, pattern: &str) -> PyrffectResult<Self> {
        if !pattern.contains("{}") {
            return Err(PyrffectError::config(format!(
                "frame pattern '{}' has no '{{}}' placeholder for the frame index",
                pattern
            )));
        }
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
            written: 0,
        })
    }

    /// Path the frame with `index` is written to.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(self.pattern.replacen("{}", &index.to_string(), 1))
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, index: u64, frame: &PixelBuffer) -> PyrffectResult<()> {
        let path = self.frame_path(index);
        save_png(&path, frame)?;
        self.written += 1;
        tracing::debug!("wrote {}", path.display());
        Ok(())
    }

    fn finish(&mut self) -> PyrffectResult<()> {
        tracing::info!(
            "wrote {} frames to {}",
            self.written,
            self.dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrffect_core::Rgba;

    #[test]
    fn test_pattern_requires_placeholder() {
        let dir = std::env::temp_dir().join("pyrffect_seq_bad_pattern");
        assert!(ImageSequenceSink::new(&dir, "frame.png").is_err());
    }

    #[test]
    fn test_frames_are_numbered() {
        let dir = std::env::temp_dir().join("pyrffect_seq_numbered");
        let mut sink = ImageSequenceSink::new(&dir, "img{}.png").unwrap();
        assert_eq!(sink.frame_path(12), dir.join("img12.png"));

        let frame = PixelBuffer::filled(4, 4, Rgba::BLUE);
        sink.write_frame(0, &frame).unwrap();
        sink.write_frame(1, &frame).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 2);
        assert!(dir.join("img0.png").exists());
        assert!(dir.join("img1.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
