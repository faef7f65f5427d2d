use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use pyrffect_core::{FrameSink, PixelBuffer, PyrffectError, PyrffectResult};

/// Video codec selected from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCodec {
    pub name: &'static str,
    pub pix_fmt: Option<&'static str>,
}

impl VideoCodec {
    /// Map an output extension to the codec FFmpeg should use.
    pub fn for_extension(ext: &str) -> Option<Self> {
        let codec = match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mkv" | "mov" => VideoCodec {
                name: "libx264",
                pix_fmt: Some("yuv420p"),
            },
            "webm" => VideoCodec {
                name: "libvpx-vp9",
                pix_fmt: Some("yuv420p"),
            },
            "avi" => VideoCodec {
                name: "mpeg4",
                pix_fmt: None,
            },
            _ => return None,
        };
        Some(codec)
    }
}

/// Everything FFmpeg is told about the raw stream before the first byte.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideoSpec {
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    pub fps: u32,
    pub codec: VideoCodec,
}

impl RawVideoSpec {
    pub fn new(output: &Path, width: usize, height: usize, fps: u32) -> PyrffectResult<Self> {
        let ext = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let codec = VideoCodec::for_extension(ext).ok_or_else(|| {
            PyrffectError::encode(format!(
                "no video codec known for output extension '.{}' ({})",
                ext,
                output.display()
            ))
        })?;
        if width == 0 || height == 0 {
            return Err(PyrffectError::encode(format!(
                "cannot encode {}x{} video with {}",
                width, height, codec.name
            )));
        }
        if fps == 0 {
            return Err(PyrffectError::encode("cannot encode video at 0 fps"));
        }
        Ok(Self {
            output: output.to_path_buf(),
            width,
            height,
            fps,
            codec,
        })
    }

    /// Bytes of one `rgb24` frame.
    pub fn frame_bytes(&self) -> usize {
        self.width * self.height * 3
    }

    /// FFmpeg arguments reading `rgb24` frames from stdin.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-r".into(),
            self.fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-c:v".into(),
            self.codec.name.into(),
        ];
        if let Some(pix_fmt) = self.codec.pix_fmt {
            args.push("-pix_fmt".into());
            args.push(pix_fmt.into());
        }
        args.push(self.output.display().to_string());
        args
    }

    /// A frame whose size differs from the declared one would desync the stream.
    pub fn check_frame(&self, index: u64, frame: &PixelBuffer) -> PyrffectResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(PyrffectError::encode(format!(
                "frame {} is {}x{} but the {} stream was declared {}x{}",
                index, frame.width, frame.height, self.codec.name, self.width, self.height
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let ext = self
            .output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        format!("{} for '.{}'", self.codec.name, ext)
    }
}

/// Streams frames into an FFmpeg child process as raw `rgb24` video.
///
/// The pipe is closed and the process awaited by [`FrameSink::finish`];
/// dropping an unfinished sink does the same so an interrupted run still
/// leaves a playable file behind.
pub struct FfmpegSink {
    spec: RawVideoSpec,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    scratch: Vec<u8>,
    frames_written: u64,
}

impl FfmpegSink {
    /// Start FFmpeg for `spec`.
    pub fn spawn(spec: RawVideoSpec) -> PyrffectResult<Self> {
        if let Some(parent) = spec.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut command = Command::new("ffmpeg");
        command
            .args(spec.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // Own process group: Ctrl-C reaches only the renderer, which closes the stream.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| {
            PyrffectError::encode_with_detail(
                format!("failed to start ffmpeg ({})", spec.describe()),
                e.to_string(),
            )
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PyrffectError::encode("failed to open ffmpeg stdin"))?;
        let stderr = child.stderr.take().map(drain_stderr).transpose()?;

        tracing::info!(
            "ffmpeg started: {} {}x{} @ {}fps -> {}",
            spec.codec.name,
            spec.width,
            spec.height,
            spec.fps,
            spec.output.display()
        );

        Ok(Self {
            scratch: Vec::with_capacity(spec.frame_bytes()),
            spec,
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            frames_written: 0,
        })
    }

    pub fn spec(&self) -> &RawVideoSpec {
        &self.spec
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close stdin, wait for FFmpeg and collect whatever it wrote to stderr.
    fn close(&mut self) -> PyrffectResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().map_err(|e| {
            PyrffectError::encode_with_detail(
                format!("ffmpeg process error ({})", self.spec.describe()),
                e.to_string(),
            )
        })?;

        let stderr = match self.stderr.take().map(JoinHandle::join) {
            Some(Ok(text)) => text,
            Some(Err(_)) => {
                tracing::warn!("ffmpeg stderr reader panicked");
                String::new()
            }
            None => String::new(),
        };

        if !status.success() {
            return Err(PyrffectError::encode_with_detail(
                format!("ffmpeg exited with {} ({})", status, self.spec.describe()),
                stderr,
            ));
        }
        Ok(())
    }
}

/// Read FFmpeg's stderr on its own thread until the pipe closes.
fn drain_stderr(mut pipe: ChildStderr) -> PyrffectResult<JoinHandle<String>> {
    let handle = std::thread::Builder::new()
        .name("pyrffect-ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut text = String::new();
            if let Err(e) = pipe.read_to_string(&mut text) {
                tracing::warn!("failed to read ffmpeg stderr: {}", e);
            }
            text
        })?;
    Ok(handle)
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, index: u64, frame: &PixelBuffer) -> PyrffectResult<()> {
        self.spec.check_frame(index, frame)?;
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            PyrffectError::state(format!("frame {} written after ffmpeg was closed", index))
        })?;

        self.scratch.clear();
        frame.write_rgb8(&mut self.scratch);

        if let Err(e) = stdin.write_all(&self.scratch) {
            // The real cause is in ffmpeg's stderr, not in the broken pipe.
            let message = format!(
                "failed to write frame {} to ffmpeg ({}): {}",
                index,
                self.spec.describe(),
                e
            );
            return Err(match self.close() {
                Err(PyrffectError::Encode {
                    detail: Some(detail),
                    ..
                }) => PyrffectError::encode_with_detail(message, detail),
                _ => PyrffectError::encode(message),
            });
        }

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> PyrffectResult<()> {
        if let Some(stdin) = self.stdin.as_mut() {
            stdin.flush()?;
        }
        self.close()?;
        tracing::info!(
            "encoded {} frames to {}",
            self.frames_written,
            self.spec.output.display()
        );
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("ffmpeg did not shut down cleanly: {}", e);
            }
        }
    }
}
