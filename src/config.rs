//! Comparison configuration.
//!
//! [`CompOptions`] is a builder carrying every knob of a comparison run:
//! where to write, how many frames to sample, which backend writes them and
//! whether to diff and upload the result. Defaults match a plain
//! `make_comparison(clips)` call.
//!
//! # Example
//!
//! ```
//! use framecomp::{CompOptions, PictureTypeFilter, Writer};
//!
//! let options = CompOptions::new()
//!     .with_output_path("comps/episode_01")
//!     .with_sample_count(20)
//!     .with_extra_frames([1200, 3400])
//!     .with_picture_types(PictureTypeFilter::parse(["I", "P"])?)
//!     .with_force_bt709(true)
//!     .with_writer(Writer::FfmpegPipe)
//!     .with_diff(true)
//!     .with_upload(true)
//!     .with_collection_name("Episode 01 - source vs encode")
//!     .with_public(false)
//!     .with_seed(7);
//! # Ok::<(), framecomp::ComparisonError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    clip::{ColourMatrix, PictureTypeFilter, RgbConversion},
    progress::{NoOpProgress, ProgressCallback},
    writer::Writer,
};

/// Default number of randomly sampled frames.
pub const DEFAULT_SAMPLE_COUNT: u64 = 15;

/// Default comparison root.
pub const DEFAULT_OUTPUT_PATH: &str = "comps";

/// Locations of the external programs a comparison may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// FFmpeg binary, used by [`Writer::FfmpegPipe`].
    pub ffmpeg: PathBuf,
    /// ImageMagick 7 binary, used for diffs (`magick compare`).
    pub magick: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            magick: PathBuf::from("magick"),
        }
    }
}

/// Settings for one comparison run.
#[derive(Clone)]
pub struct CompOptions {
    pub(crate) output_path: PathBuf,
    pub(crate) sample_count: u64,
    pub(crate) extra_frames: Vec<u64>,
    pub(crate) picture_types: Option<PictureTypeFilter>,
    pub(crate) conversion: RgbConversion,
    pub(crate) writer: Writer,
    pub(crate) diff: bool,
    pub(crate) upload: bool,
    pub(crate) collection_name: String,
    pub(crate) public: bool,
    pub(crate) seed: Option<u64>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
    pub(crate) tool_paths: ToolPaths,
}

impl Debug for CompOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CompOptions")
            .field("output_path", &self.output_path)
            .field("sample_count", &self.sample_count)
            .field("extra_frames", &self.extra_frames)
            .field("picture_types", &self.picture_types)
            .field("conversion", &self.conversion)
            .field("writer", &self.writer)
            .field("diff", &self.diff)
            .field("upload", &self.upload)
            .field("collection_name", &self.collection_name)
            .field("public", &self.public)
            .field("seed", &self.seed)
            .field("batch_size", &self.batch_size)
            .field("tool_paths", &self.tool_paths)
            .finish_non_exhaustive()
    }
}

impl Default for CompOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CompOptions {
    /// Create options with the default settings.
    ///
    /// Defaults: output `comps`, 15 samples, no extra frames, no picture
    /// type filter, matrix detected from the source, [`Writer::ImageSave`],
    /// no diff, no upload, unnamed public collection, OS-seeded randomness.
    pub fn new() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            sample_count: DEFAULT_SAMPLE_COUNT,
            extra_frames: Vec::new(),
            picture_types: None,
            conversion: RgbConversion::auto(),
            writer: Writer::default(),
            diff: false,
            upload: false,
            collection_name: String::new(),
            public: true,
            seed: None,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
            tool_paths: ToolPaths::default(),
        }
    }

    /// Set the comparison root. It must not exist yet.
    #[must_use]
    pub fn with_output_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = path.into();
        self
    }

    /// Set how many frames are picked at random.
    #[must_use]
    pub fn with_sample_count(mut self, count: u64) -> Self {
        self.sample_count = count;
        self
    }

    /// Frames always included in addition to the random samples.
    #[must_use]
    pub fn with_extra_frames<I: IntoIterator<Item = u64>>(mut self, frames: I) -> Self {
        self.extra_frames = frames.into_iter().collect();
        self
    }

    /// Only sample frames whose picture type passes `filter` in every clip.
    #[must_use]
    pub fn with_picture_types(mut self, filter: PictureTypeFilter) -> Self {
        self.picture_types = Some(filter);
        self
    }

    /// Force BT.709 coefficients for the RGB conversion instead of
    /// detecting the matrix from the source.
    #[must_use]
    pub fn with_force_bt709(mut self, force: bool) -> Self {
        self.conversion = if force {
            RgbConversion::forced(ColourMatrix::Bt709)
        } else {
            RgbConversion::auto()
        };
        self
    }

    /// Set the full RGB conversion settings.
    #[must_use]
    pub fn with_conversion(mut self, conversion: RgbConversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Choose the extraction backend.
    #[must_use]
    pub fn with_writer(mut self, writer: Writer) -> Self {
        self.writer = writer;
        self
    }

    /// Produce diff images between the two clips.
    #[must_use]
    pub fn with_diff(mut self, diff: bool) -> Self {
        self.diff = diff;
        self
    }

    /// Upload the result to slow.pics.
    #[must_use]
    pub fn with_upload(mut self, upload: bool) -> Self {
        self.upload = upload;
        self
    }

    /// Collection name shown on slow.pics.
    #[must_use]
    pub fn with_collection_name<S: Into<String>>(mut self, name: S) -> Self {
        self.collection_name = name.into();
        self
    }

    /// Whether the uploaded collection is listed publicly.
    #[must_use]
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Seed the frame sampler for reproducible selections.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Fire the progress callback every `size` items (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Override where `ffmpeg` and `magick` are found.
    #[must_use]
    pub fn with_tool_paths(mut self, paths: ToolPaths) -> Self {
        self.tool_paths = paths;
        self
    }

    /// The comparison root.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Number of random samples.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// The configured extraction backend.
    pub fn writer(&self) -> Writer {
        self.writer
    }
}
