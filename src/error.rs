//! Error types for the `framecomp` crate.
//!
//! [`ComparisonError`] is the single error type returned by every fallible
//! operation. Variants fall into four groups: rejected input (checked before
//! any side effect), exhausted frame searches, missing or failing external
//! tools, and upload transport failures. Ambient I/O, image and FFmpeg errors
//! are wrapped as-is.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framecomp` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComparisonError {
    /// No clips were supplied to a comparison.
    #[error("A comparison needs at least one clip")]
    NoClips,

    /// The clips of one comparison do not share a frame count.
    #[error("Clips must be equal length (got frame counts {lengths:?})")]
    ClipLengthMismatch {
        /// Frame count of every clip, in the order they were supplied.
        lengths: Vec<u64>,
    },

    /// Two clips were registered under the same name.
    #[error("Clip name {0:?} is used more than once")]
    DuplicateClipName(String),

    /// A clip name cannot be used as a directory name.
    #[error("Clip name {0:?} cannot be used as a directory name")]
    InvalidClipName(String),

    /// Diffing was requested with a number of clips other than two.
    #[error("Diffing needs exactly two clips (got {clip_count})")]
    DiffRequiresTwoClips {
        /// Number of clips in the comparison.
        clip_count: usize,
    },

    /// An output directory already exists.
    #[error("Output path {path} already exists")]
    OutputExists {
        /// The directory that was about to be created.
        path: PathBuf,
    },

    /// More random samples were requested than the clips have frames.
    #[error("Cannot sample {requested} frames from clips of {available} frames")]
    SampleCountTooLarge {
        /// Requested sample count.
        requested: u64,
        /// Common clip length.
        available: u64,
    },

    /// A requested frame number is outside the clip.
    #[error("Frame {frame_number} is out of range (clips have {total_frames} frames)")]
    FrameOutOfRange {
        /// The frame number that was requested.
        frame_number: u64,
        /// The total number of frames in the clips.
        total_frames: u64,
    },

    /// Sampling produced no frames at all.
    #[error("No frames were selected for extraction")]
    EmptySelection,

    /// A picture type string is not one FFmpeg reports.
    #[error("Unknown picture type {0:?}")]
    UnknownPictureType(String),

    /// A writer name is not one of the known backends.
    #[error("Unknown writer {0:?} (expected ffmpeg, pattern or image)")]
    UnknownWriter(String),

    /// Every frame of the clips was checked without satisfying the filter.
    #[error("There are not enough {picture_types} frames in these clips ({checked} frames checked)")]
    PictureTypesExhausted {
        /// The accepted picture types, formatted for display.
        picture_types: String,
        /// How many distinct frames were inspected.
        checked: u64,
    },

    /// The global attempt budget of the picture-type search ran out.
    #[error("Maximum of {limit} picture type attempts has been reached")]
    AttemptBudgetExceeded {
        /// The budget that was exceeded.
        limit: u64,
    },

    /// An external tool could not be started.
    #[error("External tool {tool:?} was not found")]
    ToolNotFound {
        /// Program name or path that was looked up.
        tool: String,
    },

    /// An external tool ran but reported failure.
    #[error("External command `{command}` failed ({status})")]
    ToolFailed {
        /// The command line, for display.
        command: String,
        /// Exit code or termination description.
        status: String,
    },

    /// A source directory does not hold one image per selected frame.
    #[error("Expected {expected} images for {source_name:?}, found {found}")]
    ImageCountMismatch {
        /// Name of the clip (or `diff`).
        source_name: String,
        /// Number of selected frames.
        expected: usize,
        /// Number of PNG files found on disk.
        found: usize,
    },

    /// The comparison service rejected or garbled the upload.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// An HTTP transport error while talking to the comparison service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A video file could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoClip::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for ComparisonError {
    fn from(error: FfmpegError) -> Self {
        ComparisonError::FfmpegError(error.to_string())
    }
}
