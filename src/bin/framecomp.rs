use std::{
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use env_logger::Env;
use framecomp::{
    CompOptions, Comparison, FrameSource, NamedClip, OperationType, PictureTypeFilter,
    ProgressCallback, ProgressInfo, ToolPaths, VideoClip, Writer,
    timecode::{self, FrameRate},
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framecomp compare --clip source=src.mkv --clip encode=enc.mkv --samples 20 --diff\n  framecomp compare --clip src=a.mkv --clip enc=b.mkv --picture-types B --frames 100,00:12:03.5 --upload\n  framecomp probe encode.mkv --json\n  framecomp completions zsh > _framecomp";

#[derive(Debug, Parser)]
#[command(
    name = "framecomp",
    version,
    about = "Extract matching frames from video clips, diff them and upload them to slow.pics",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging, including FFmpeg warnings.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show progress bars instead of a status line.
    #[arg(long, global = true)]
    progress: bool,

    /// Path to the ffmpeg binary used by the ffmpeg writer.
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Path to the ImageMagick 7 binary used for diffs.
    #[arg(long, global = true, default_value = "magick")]
    magick: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sample frames from clips and build a comparison.
    #[command(
        about = "Build a frame comparison",
        after_help = "Examples:\n  framecomp compare --clip source=src.mkv --clip encode=enc.mkv\n  framecomp compare --clip a=a.mkv --clip b=b.mkv --writer ffmpeg --diff --upload --collection-name \"Ep 01\""
    )]
    Compare {
        /// A clip as NAME=PATH (or just PATH, named after the file). Repeat per clip.
        #[arg(long = "clip", required = true, value_parser = parse_clip_arg)]
        clips: Vec<(String, PathBuf)>,

        /// Comparison root directory; must not exist.
        #[arg(long, default_value = framecomp::DEFAULT_OUTPUT_PATH)]
        out: PathBuf,

        /// Number of random frames.
        #[arg(long, default_value_t = framecomp::DEFAULT_SAMPLE_COUNT)]
        samples: u64,

        /// Extra frames as frame numbers or timestamps (HH:MM:SS.fff).
        #[arg(long, value_delimiter = ',', value_parser = parse_frame_ref)]
        frames: Vec<FrameRef>,

        /// Only sample frames of these picture types in every clip (e.g. I,P).
        #[arg(long, value_delimiter = ',')]
        picture_types: Vec<String>,

        /// Convert with BT.709 coefficients regardless of the source tags.
        #[arg(long)]
        force_bt709: bool,

        /// Extraction backend: image | pattern | ffmpeg.
        #[arg(long, default_value = "image", value_parser = parse_writer)]
        writer: Writer,

        /// Diff the two clips with `magick compare`.
        #[arg(long)]
        diff: bool,

        /// Upload the comparison to slow.pics.
        #[arg(long)]
        upload: bool,

        /// Collection name on slow.pics.
        #[arg(long, default_value = "")]
        collection_name: String,

        /// Keep the uploaded collection unlisted.
        #[arg(long)]
        private: bool,

        /// Seed for reproducible frame selection.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print frame count, dimensions and frame rate of a video.
    #[command(
        about = "Inspect a video file",
        after_help = "Examples:\n  framecomp probe encode.mkv\n  framecomp probe encode.mkv --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// An extra frame as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameRef {
    Number(u64),
    Timestamp(Duration),
}

impl FrameRef {
    fn resolve(self, rate: FrameRate) -> u64 {
        match self {
            FrameRef::Number(frame) => frame,
            FrameRef::Timestamp(timestamp) => timecode::duration_to_frame(timestamp, rate),
        }
    }
}

fn parse_clip_arg(value: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = match value.split_once('=') {
        Some((name, path)) => (name.trim().to_string(), PathBuf::from(path.trim())),
        None => {
            let path = PathBuf::from(value.trim());
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .ok_or_else(|| format!("cannot derive a clip name from {value:?}"))?;
            (name, path)
        }
    };

    if name.is_empty() {
        return Err(format!("clip name is empty in {value:?}"));
    }
    if path.as_os_str().is_empty() {
        return Err(format!("clip path is empty in {value:?}"));
    }
    Ok((name, path))
}

fn parse_frame_ref(value: &str) -> Result<FrameRef, String> {
    let trimmed = value.trim();
    if trimmed.contains(':') {
        return timecode::parse_timestamp(trimmed)
            .map(FrameRef::Timestamp)
            .map_err(|error| error.to_string());
    }
    trimmed
        .parse::<u64>()
        .map(FrameRef::Number)
        .map_err(|_| format!("invalid frame {value:?} (expected a frame number or HH:MM:SS.fff)"))
}

fn parse_writer(value: &str) -> Result<Writer, String> {
    value.parse::<Writer>().map_err(|error| error.to_string())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "framecomp=debug" } else { "framecomp=info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
    framecomp::match_log_filter(log::max_level());
}

/// Renders one indicatif bar per clip and operation.
struct BarProgress {
    current: Mutex<Option<(String, ProgressBar)>>,
}

impl BarProgress {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    fn label(info: &ProgressInfo) -> String {
        match (&info.operation, &info.clip) {
            (OperationType::FrameExtraction, Some(clip)) => format!("extracting {clip}"),
            (OperationType::Diffing, _) => "diffing".to_string(),
            _ => "working".to_string(),
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let label = Self::label(info);

        let reuse = matches!(current.as_ref(), Some((key, _)) if *key == label);
        if !reuse {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            let bar = ProgressBar::new(info.total.unwrap_or(0));
            if let Ok(style) = ProgressStyle::with_template(
                "{msg:>20.cyan.bold} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            ) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.set_message(label.clone());
            *current = Some((label, bar));
        }

        if let Some((_, bar)) = current.as_ref() {
            bar.set_position(info.current);
            if info.total.is_some_and(|total| info.current >= total) {
                bar.finish();
            }
        }
    }
}

/// Prints a single `current/total ~ pct%` status line.
struct LineProgress;

impl ProgressCallback for LineProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let (Some(total), Some(percentage)) = (info.total, info.percentage) else {
            return;
        };
        let action = match info.operation {
            OperationType::Diffing => "Diffing image",
            _ => "Extracting image",
        };
        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r{action}: {}/{total} ~ {percentage:.0}%",
            info.current
        );
        if info.current >= total {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

fn status(label: &str, message: impl std::fmt::Display) {
    println!("{} {message}", label.green().bold());
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Compare {
            clips,
            out,
            samples,
            frames,
            picture_types,
            force_bt709,
            writer,
            diff,
            upload,
            collection_name,
            private,
            seed,
        } => {
            let mut named = Vec::with_capacity(clips.len());
            for (name, path) in clips {
                let clip = VideoClip::open(&path)?;
                named.push(NamedClip::new(name, clip)?);
            }

            let rate = named
                .first()
                .map(|clip| clip.source().frame_rate())
                .ok_or("at least one --clip is required")?;
            let extra_frames: Vec<u64> = frames.into_iter().map(|frame| frame.resolve(rate)).collect();

            let progress: Arc<dyn ProgressCallback> = if cli.global.progress {
                Arc::new(BarProgress::new())
            } else {
                Arc::new(LineProgress)
            };

            let mut options = CompOptions::new()
                .with_output_path(&out)
                .with_sample_count(samples)
                .with_extra_frames(extra_frames)
                .with_force_bt709(force_bt709)
                .with_writer(writer)
                .with_diff(diff)
                .with_upload(upload)
                .with_collection_name(collection_name)
                .with_public(!private)
                .with_progress(progress)
                .with_tool_paths(ToolPaths {
                    ffmpeg: cli.global.ffmpeg.clone(),
                    magick: cli.global.magick.clone(),
                });
            if !picture_types.is_empty() {
                options = options.with_picture_types(PictureTypeFilter::parse(&picture_types)?);
            }
            if let Some(seed) = seed {
                options = options.with_seed(seed);
            }

            let report = Comparison::new(named)?.run(&options)?;

            status(
                "selected",
                format!(
                    "{} frames: {:?}",
                    report.selection.len(),
                    report.selection.frames()
                ),
            );
            for images in &report.images {
                status(
                    "extracted",
                    format!("{} images of {}", images.paths.len(), images.name),
                );
            }
            if let Some(diffs) = &report.diffs {
                status("diffed", format!("{} frame pairs", diffs.paths.len()));
            }
            if let Some(url) = &report.url {
                status("uploaded", url);
            }
            if let Some(shortcut) = &report.shortcut {
                status("saved", shortcut.display());
            }
            status("done", out.display());
        }
        Commands::Probe { input, json } => {
            let clip = VideoClip::open(&input)?;
            let (width, height) = clip.dimensions();
            let rate = clip.frame_rate();
            let duration = timecode::frame_to_duration(clip.frame_count(), rate);

            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "frame_count": clip.frame_count(),
                    "width": width,
                    "height": height,
                    "frame_rate": rate.to_string(),
                    "fps": rate.as_f64(),
                    "duration_seconds": duration.as_secs_f64(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {}", input.display());
                println!("Frames: {}", clip.frame_count());
                println!("Video: {width}x{height} @ {rate} ({:.3} fps)", rate.as_f64());
                println!("Duration: {}", timecode::format_timestamp(duration, 3)?);
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framecomp", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
