//! FFmpeg console verbosity.
//!
//! Decoding through `ffmpeg-next` makes the FFmpeg libraries print their own
//! warnings to stderr, independently of the [`log`] facade. Frame sampling
//! opens and seeks the same files many times, so those messages pile up
//! quickly. [`set_ffmpeg_log_level`] tunes them directly, and
//! [`match_log_filter`] keeps them in step with the Rust-side log level.
//!
//! # Example
//!
//! ```no_run
//! use framecomp::FfmpegLogLevel;
//!
//! framecomp::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use ffmpeg_next::util::log::Level;
use log::LevelFilter;

/// How much the FFmpeg libraries print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Nothing at all.
    Quiet,
    /// Errors only.
    Error,
    /// Errors and warnings (FFmpeg's default).
    Warning,
    /// Informational messages such as stream summaries.
    Info,
    /// Decoder internals.
    Debug,
}

impl FfmpegLogLevel {
    fn as_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    /// The FFmpeg level matching a `log` filter. FFmpeg stays one step
    /// quieter than the crate's own logging, since its informational output
    /// is per stream and per seek.
    pub fn for_log_filter(filter: LevelFilter) -> Self {
        match filter {
            LevelFilter::Off => FfmpegLogLevel::Quiet,
            LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => FfmpegLogLevel::Error,
            LevelFilter::Debug => FfmpegLogLevel::Warning,
            LevelFilter::Trace => FfmpegLogLevel::Debug,
        }
    }
}

/// Set the FFmpeg libraries' console verbosity.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.as_ffmpeg_level());
}

/// Align FFmpeg's verbosity with `filter` (see
/// [`FfmpegLogLevel::for_log_filter`]).
pub fn match_log_filter(filter: LevelFilter) {
    set_ffmpeg_log_level(FfmpegLogLevel::for_log_filter(filter));
}
