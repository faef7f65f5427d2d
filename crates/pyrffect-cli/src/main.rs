use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pyrffect_core::HashSink;
use pyrffect_render::{RunSummary, SceneBuilder};

#[derive(Parser)]
#[command(
    name = "pyrffect",
    version,
    about = "Pyrffect: layered procedural animation renderer",
    long_about = "Pyrffect renders scenes of stacked layers (pictures, flat fills, fireworks)\nwith per-layer effects into a video file or a numbered image sequence."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene file
    Render {
        /// Path to the scene (.toml or .json)
        #[arg()]
        scene: PathBuf,

        /// Frames per second (overrides the scene)
        #[arg(short, long)]
        framerate: Option<u32>,

        /// Duration in seconds (overrides the scene)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Output video path; the extension picks the codec
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write numbered PNG frames into this directory instead of a video
        #[arg(long)]
        frames_dir: Option<PathBuf>,

        /// Seed for every random draw (overrides the scene)
        #[arg(long)]
        seed: Option<u64>,

        /// Run pixel-move effects on all cores
        #[arg(long)]
        parallel: bool,
    },

    /// Build a scene without encoding it
    Check {
        /// Path to the scene (.toml or .json)
        #[arg()]
        scene: PathBuf,

        /// Render in memory and print the content hash of all frames
        #[arg(long)]
        hash: bool,

        /// Number of frames to hash (default: the whole scene)
        #[arg(long, requires = "hash")]
        frames: Option<u64>,

        /// Seed for every random draw (overrides the scene)
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// How a command ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Complete,
    Interrupted,
    NothingRendered,
}

impl Outcome {
    fn from_summary(summary: &RunSummary) -> Self {
        if summary.frames_written == 0 {
            Outcome::NothingRendered
        } else if summary.interrupted {
            Outcome::Interrupted
        } else {
            Outcome::Complete
        }
    }

    fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Complete => ExitCode::SUCCESS,
            Outcome::Interrupted => ExitCode::from(1),
            Outcome::NothingRendered => ExitCode::from(2),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render {
            scene,
            framerate,
            duration,
            output,
            frames_dir,
            seed,
            parallel,
        } => cmd_render(scene, framerate, duration, output, frames_dir, seed, parallel),
        Commands::Check {
            scene,
            hash,
            frames,
            seed,
        } => cmd_check(scene, hash, frames, seed),
    };

    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("error: {:#}", e);
            Outcome::NothingRendered.exit_code()
        }
    }
}

fn load_scene(scene: &Path, seed: Option<u64>) -> Result<SceneBuilder> {
    let mut builder = SceneBuilder::from_path(scene)
        .with_context(|| format!("failed to load scene: {}", scene.display()))?;
    if let Some(seed) = seed {
        builder.config_mut().canvas.seed = Some(seed);
    }
    Ok(builder)
}

fn cmd_render(
    scene: PathBuf,
    framerate: Option<u32>,
    duration: Option<f64>,
    output: Option<PathBuf>,
    frames_dir: Option<PathBuf>,
    seed: Option<u64>,
    parallel: bool,
) -> Result<Outcome> {
    let start = Instant::now();

    let mut builder = load_scene(&scene, seed)?.with_parallel(parallel);
    let canvas = &mut builder.config_mut().canvas;
    if let Some(framerate) = framerate {
        canvas.framerate = framerate;
    }
    if let Some(duration) = duration {
        canvas.duration = duration;
    }
    if let Some(output) = output {
        canvas.output = output;
    }
    if frames_dir.is_some() {
        canvas.frames_dir = frames_dir;
    }

    let mut built = builder
        .build()
        .with_context(|| format!("failed to build scene: {}", scene.display()))?;
    let target = built
        .frames_dir
        .clone()
        .unwrap_or_else(|| built.output.clone());

    println!("Pyrffect render");
    println!("   Scene:      {}", scene.display());
    println!("   Canvas:     {}x{} @ {}fps", built.width, built.height, built.fps);
    println!("   Frames:     {}", built.total_frames);
    println!("   Output:     {}", target.display());

    let mut sink = pyrffect_encode::open_sink(
        &built.output,
        built.frames_dir.as_deref(),
        &built.frame_pattern,
        built.width,
        built.height,
        built.fps,
    )
    .with_context(|| format!("failed to open output: {}", target.display()))?;

    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&cancel))?;

    let summary = built
        .orchestrator
        .run(built.total_frames, sink.as_mut(), &cancel)
        .context("render failed")?;

    let elapsed = start.elapsed();
    let outcome = Outcome::from_summary(&summary);
    match outcome {
        Outcome::Complete => println!(
            "   Done:       {} frames in {:.2}s",
            summary.frames_written,
            elapsed.as_secs_f64()
        ),
        Outcome::Interrupted => println!(
            "   Interrupted after {} of {} frames ({:.2}s); written frames kept",
            summary.frames_written,
            built.total_frames,
            elapsed.as_secs_f64()
        ),
        Outcome::NothingRendered => println!("   No frame was rendered"),
    }
    Ok(outcome)
}

fn cmd_check(scene: PathBuf, hash: bool, frames: Option<u64>, seed: Option<u64>) -> Result<Outcome> {
    let mut built = load_scene(&scene, seed)?
        .build()
        .with_context(|| format!("failed to build scene: {}", scene.display()))?;

    println!("Checking {}", scene.display());
    println!("   Layers:     {}", built.orchestrator.layer_count());
    println!("   Canvas:     {}x{} @ {}fps", built.width, built.height, built.fps);
    println!("   Frames:     {}", built.total_frames);

    if !hash {
        println!("   OK");
        return Ok(Outcome::Complete);
    }

    let count = frames.unwrap_or(built.total_frames);
    let mut sink = HashSink::new();
    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&cancel))?;
    let summary = built
        .orchestrator
        .run(count, &mut sink, &cancel)
        .context("render failed")?;

    println!("   Hash:       {}", sink.digest());
    Ok(Outcome::from_summary(&summary))
}

/// Flip `cancel` on Ctrl-C. The signal is awaited on its own thread so the
/// frame loop stays synchronous.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize signal runtime")?;
    std::thread::Builder::new()
        .name("pyrffect-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, stopping after the current frame");
                    cancel.store(true, Ordering::SeqCst);
                }
            });
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_summary() {
        let summary = |frames_written, interrupted| RunSummary {
            frames_written,
            interrupted,
        };
        assert_eq!(Outcome::from_summary(&summary(10, false)), Outcome::Complete);
        assert_eq!(Outcome::from_summary(&summary(3, true)), Outcome::Interrupted);
        assert_eq!(
            Outcome::from_summary(&summary(0, true)),
            Outcome::NothingRendered
        );
        assert_eq!(
            Outcome::from_summary(&summary(0, false)),
            Outcome::NothingRendered
        );
    }

    #[test]
    fn test_cli_parses_render_flags() {
        let cli = Cli::try_parse_from([
            "pyrffect",
            "render",
            "scene.toml",
            "-f",
            "30",
            "-d",
            "2.5",
            "--frames-dir",
            "out",
            "--seed",
            "4",
            "--parallel",
        ])
        .unwrap();
        match cli.command {
            Commands::Render {
                framerate,
                duration,
                frames_dir,
                seed,
                parallel,
                ..
            } => {
                assert_eq!(framerate, Some(30));
                assert_eq!(duration, Some(2.5));
                assert_eq!(frames_dir, Some(PathBuf::from("out")));
                assert_eq!(seed, Some(4));
                assert!(parallel);
            }
            Commands::Check { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn test_frames_requires_hash() {
        assert!(Cli::try_parse_from(["pyrffect", "check", "s.toml", "--frames", "3"]).is_err());
        assert!(
            Cli::try_parse_from(["pyrffect", "check", "s.toml", "--hash", "--frames", "3"]).is_ok()
        );
    }
}
