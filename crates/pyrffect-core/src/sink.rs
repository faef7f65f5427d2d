use crate::error::PyrffectResult;
use crate::frame::PixelBuffer;

/// Destination for rendered canvas frames.
///
/// The orchestrator calls [`write_frame`](FrameSink::write_frame) once per
/// frame in order and [`finish`](FrameSink::finish) exactly once, whether
/// the run completed, failed or was interrupted.
pub trait FrameSink {
    fn write_frame(&mut self, index: u64, frame: &PixelBuffer) -> PyrffectResult<()>;

    fn finish(&mut self) -> PyrffectResult<()> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, index: u64, frame: &PixelBuffer) -> PyrffectResult<()> {
        (**self).write_frame(index, frame)
    }

    fn finish(&mut self) -> PyrffectResult<()> {
        (**self).finish()
    }
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<PixelBuffer>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, _index: u64, frame: &PixelBuffer) -> PyrffectResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> PyrffectResult<()> {
        self.finished = true;
        Ok(())
    }
}
