//! # framecomp
//!
//! Build visual comparisons of video encodes: sample the same frames from
//! several equal-length clips, write them as PNGs, optionally diff two of
//! them with ImageMagick, and upload the set to
//! [slow.pics](https://slow.pics).
//!
//! Clips are decoded with FFmpeg through the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate; anything
//! else implementing [`FrameSource`] works too.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framecomp::{CompOptions, NamedClip, VideoClip, make_comparison};
//!
//! let clips = vec![
//!     NamedClip::new("source", VideoClip::open("source.mkv")?)?,
//!     NamedClip::new("encode", VideoClip::open("encode.mkv")?)?,
//! ];
//!
//! let report = make_comparison(clips, &CompOptions::new().with_output_path("comps/ep01"))?;
//! println!("Extracted frames {:?}", report.selection.frames());
//! # Ok::<(), framecomp::ComparisonError>(())
//! ```
//!
//! ### Only compare B-frames, then diff and upload
//!
//! ```no_run
//! use framecomp::{CompOptions, NamedClip, PictureTypeFilter, VideoClip, Writer, make_comparison};
//!
//! let clips = vec![
//!     NamedClip::new("source", VideoClip::open("source.mkv")?)?,
//!     NamedClip::new("encode", VideoClip::open("encode.mkv")?)?,
//! ];
//! let options = CompOptions::new()
//!     .with_sample_count(20)
//!     .with_picture_types(PictureTypeFilter::parse(["B"])?)
//!     .with_writer(Writer::FfmpegPipe)
//!     .with_diff(true)
//!     .with_upload(true)
//!     .with_collection_name("Episode 01");
//!
//! let report = make_comparison(clips, &options)?;
//! println!("{}", report.url.unwrap_or_default());
//! # Ok::<(), framecomp::ComparisonError>(())
//! ```
//!
//! ## Output layout
//!
//! ```text
//! comps/
//! ├── source/source_0123.png
//! ├── encode/encode_0123.png
//! ├── diffs/diff_0123.png      (with diffing)
//! └── slow.pics.url            (with upload)
//! ```
//!
//! Frame numbers are zero-padded to the width of the largest selected
//! frame. The comparison root and every directory under it must not exist
//! beforehand.
//!
//! ## Requirements
//!
//! FFmpeg development libraries for decoding. The `ffmpeg` binary is needed
//! for [`Writer::FfmpegPipe`] and ImageMagick 7 (`magick`) for diffing.

pub mod clip;
pub mod comparison;
pub mod config;
pub mod diff;
pub mod error;
pub mod ffmpeg;
pub mod process;
pub mod progress;
pub mod selection;
pub mod timecode;
pub mod upload;
mod utilities;
pub mod video;
pub mod writer;

pub use clip::{
    ColourMatrix, FrameSource, NamedClip, PictureType, PictureTypeFilter, RgbConversion,
};
pub use comparison::{Comparison, ComparisonReport, make_comparison};
pub use config::{CompOptions, DEFAULT_OUTPUT_PATH, DEFAULT_SAMPLE_COUNT, ToolPaths};
pub use diff::DiffGenerator;
pub use error::ComparisonError;
pub use ffmpeg::{FfmpegLogLevel, match_log_filter, set_ffmpeg_log_level};
pub use process::{SystemRunner, ToolCommand, ToolRunner, ToolStatus};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use selection::{FrameSelection, MAX_ATTEMPTS_PER_SLOT, select_frames};
pub use timecode::FrameRate;
pub use upload::{ComparisonBatch, ComparisonHost, FormField, SlowPics};
pub use utilities::{digit_count, list_png_files, rgb_to_planar_gbr};
pub use video::VideoClip;
pub use writer::{
    ClipImages, ExtractionJob, FfmpegPipeWriter, FrameWriter, ImageSaveWriter, PatternWriter,
    Writer, diff_image_path, extracted_image_path,
};
