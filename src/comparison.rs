//! End-to-end comparison runs.
//!
//! [`Comparison`] owns a validated set of clips and drives a run: sample
//! frames, write them per clip, then optionally diff and upload. Every
//! precondition is checked before the first file is written.

use std::{
    collections::HashSet,
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    clip::NamedClip,
    config::CompOptions,
    diff::{DIFF_DIRECTORY, DIFF_SOURCE_NAME, DiffGenerator},
    error::ComparisonError,
    process::{SystemRunner, ToolRunner},
    progress::{OperationType, ProgressTracker},
    selection::{FrameSelection, common_length, select_frames},
    upload::{ComparisonBatch, ComparisonHost, SlowPics, write_shortcut},
    utilities::create_exclusive_dir,
    writer::{ClipImages, ExtractionJob},
};

/// What a comparison run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonReport {
    /// The sampled frames.
    pub selection: FrameSelection,
    /// Extracted images per clip, in clip order.
    pub images: Vec<ClipImages>,
    /// Diff images, if diffing was requested.
    pub diffs: Option<ClipImages>,
    /// Comparison URL, if the set was uploaded.
    pub url: Option<String>,
    /// Shortcut file pointing at [`url`](ComparisonReport::url).
    pub shortcut: Option<PathBuf>,
}

/// A set of equal-length, uniquely named clips ready to be compared.
///
/// # Example
///
/// ```no_run
/// use framecomp::{CompOptions, Comparison, NamedClip, VideoClip};
///
/// let clips = vec![
///     NamedClip::new("source", VideoClip::open("source.mkv")?)?,
///     NamedClip::new("encode", VideoClip::open("encode.mkv")?)?,
/// ];
/// let options = CompOptions::new().with_diff(true).with_upload(true);
///
/// let report = Comparison::new(clips)?.run(&options)?;
/// if let Some(url) = report.url {
///     println!("{url}");
/// }
/// # Ok::<(), framecomp::ComparisonError>(())
/// ```
pub struct Comparison {
    clips: Vec<NamedClip>,
    runner: Box<dyn ToolRunner>,
    host: Option<Box<dyn ComparisonHost>>,
}

impl Debug for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Comparison")
            .field("clips", &self.clips)
            .field("custom_host", &self.host.is_some())
            .finish_non_exhaustive()
    }
}

impl Comparison {
    /// Validate `clips` for comparison.
    ///
    /// # Errors
    ///
    /// - [`ComparisonError::NoClips`] for an empty list;
    /// - [`ComparisonError::DuplicateClipName`] if two clips share a name;
    /// - [`ComparisonError::ClipLengthMismatch`] if frame counts differ.
    pub fn new(clips: Vec<NamedClip>) -> Result<Self, ComparisonError> {
        let mut names = HashSet::new();
        for clip in &clips {
            if !names.insert(clip.name()) {
                return Err(ComparisonError::DuplicateClipName(clip.name().to_string()));
            }
        }
        common_length(&clips)?;

        Ok(Self {
            clips,
            runner: Box::new(SystemRunner),
            host: None,
        })
    }

    /// Run external tools through `runner` instead of real processes.
    #[must_use]
    pub fn with_runner<R: ToolRunner + 'static>(mut self, runner: R) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Upload to `host` instead of slow.pics.
    #[must_use]
    pub fn with_host<H: ComparisonHost + 'static>(mut self, host: H) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    /// The clips, in the order they were given.
    pub fn clips(&self) -> &[NamedClip] {
        &self.clips
    }

    /// Run the comparison with a generator seeded from `options` (or from
    /// the operating system when no seed is set).
    ///
    /// # Errors
    ///
    /// See [`run_with_rng`](Comparison::run_with_rng).
    pub fn run(&mut self, options: &CompOptions) -> Result<ComparisonReport, ComparisonError> {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.run_with_rng(options, &mut rng)
    }

    /// Run the comparison drawing frames from `rng`.
    ///
    /// # Errors
    ///
    /// Input is rejected before anything is written:
    /// [`ComparisonError::DiffRequiresTwoClips`],
    /// [`ComparisonError::OutputExists`] and every selection error of
    /// [`select_frames`]. Later failures come from extraction, the diff
    /// tool or the upload, and leave what was already written in place.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &mut self,
        options: &CompOptions,
        rng: &mut R,
    ) -> Result<ComparisonReport, ComparisonError> {
        if options.diff && self.clips.len() != 2 {
            return Err(ComparisonError::DiffRequiresTwoClips {
                clip_count: self.clips.len(),
            });
        }

        let root = options.output_path.as_path();
        if root.exists() {
            return Err(ComparisonError::OutputExists {
                path: root.to_path_buf(),
            });
        }

        log::info!(
            "Sampling {} frames from {} clips",
            options.sample_count,
            self.clips.len()
        );
        let selection = select_frames(
            &mut self.clips,
            options.sample_count,
            &options.extra_frames,
            options.picture_types.as_ref(),
            rng,
        )?;

        create_exclusive_dir(root)?;

        let images = self.extract(options, &selection)?;

        let diffs = if options.diff {
            Some(self.diff(options, &selection)?)
        } else {
            None
        };

        let (url, shortcut) = if options.upload {
            let (url, shortcut) = self.upload(options, &selection, diffs.is_some())?;
            (Some(url), Some(shortcut))
        } else {
            (None, None)
        };

        Ok(ComparisonReport {
            selection,
            images,
            diffs,
            url,
            shortcut,
        })
    }

    fn extract(
        &mut self,
        options: &CompOptions,
        selection: &FrameSelection,
    ) -> Result<Vec<ClipImages>, ComparisonError> {
        let root = options.output_path.as_path();
        let writer = options.writer.strategy(&options.tool_paths);
        let mut images = Vec::with_capacity(self.clips.len());

        for clip in &mut self.clips {
            let output_dir = root.join(clip.name());
            create_exclusive_dir(&output_dir)?;

            log::info!(
                "Extracting {} frames of {} with the {} writer",
                selection.len(),
                clip.name(),
                options.writer
            );

            let mut tracker = ProgressTracker::new(
                options.progress.clone(),
                OperationType::FrameExtraction,
                Some(selection.len() as u64),
                options.batch_size,
            )
            .for_clip(clip.name());

            let job = ExtractionJob {
                frames: selection.frames(),
                output_dir: &output_dir,
                pad_width: selection.pad_width(),
                conversion: &options.conversion,
            };
            let paths = writer.write_frames(clip, &job, self.runner.as_ref(), &mut |frame| {
                tracker.advance(Some(frame))
            })?;

            images.push(ClipImages::new(clip.name(), paths));
        }

        Ok(images)
    }

    fn diff(
        &self,
        options: &CompOptions,
        selection: &FrameSelection,
    ) -> Result<ClipImages, ComparisonError> {
        let root = options.output_path.as_path();
        let first = self.read_back(0, options)?;
        let second = self.read_back(1, options)?;

        let mut tracker = ProgressTracker::new(
            options.progress.clone(),
            OperationType::Diffing,
            Some(selection.len() as u64),
            options.batch_size,
        );

        let paths = DiffGenerator::new(&options.tool_paths.magick).generate(
            self.runner.as_ref(),
            &first,
            &second,
            selection,
            &root.join(DIFF_DIRECTORY),
            &mut |frame| tracker.advance(Some(frame)),
        )?;

        Ok(ClipImages::new(DIFF_SOURCE_NAME, paths))
    }

    fn upload(
        &self,
        options: &CompOptions,
        selection: &FrameSelection,
        with_diffs: bool,
    ) -> Result<(String, PathBuf), ComparisonError> {
        let root = options.output_path.as_path();

        let mut sources = (0..self.clips.len())
            .map(|index| self.read_back(index, options))
            .collect::<Result<Vec<_>, _>>()?;
        if with_diffs {
            sources.push(ClipImages::from_directory(
                DIFF_SOURCE_NAME,
                &root.join(DIFF_DIRECTORY),
            )?);
        }

        let batch = ComparisonBatch::from_sources(
            &sources,
            selection.frames(),
            &options.collection_name,
            options.public,
        )?;

        let default_host;
        let host: &dyn ComparisonHost = match &self.host {
            Some(host) => host.as_ref(),
            None => {
                default_host = SlowPics::new()?;
                &default_host
            }
        };

        log::info!("Uploading {} sources", sources.len());
        let id = host.submit(&batch)?;
        let url = host.comparison_url(&id);
        log::info!("Comparison URL: {url}");

        let shortcut = write_shortcut(root, &url)?;
        log::info!("URL file written to {}", shortcut.display());

        Ok((url, shortcut))
    }

    /// Images of clip `index` as found on disk.
    fn read_back(&self, index: usize, options: &CompOptions) -> Result<ClipImages, ComparisonError> {
        let name = self.clips[index].name();
        ClipImages::from_directory(name, &options.output_path.join(name))
    }
}

/// Compare `clips` with `options`, running real tools and uploading to
/// slow.pics when asked.
///
/// # Errors
///
/// See [`Comparison::new`] and [`Comparison::run_with_rng`].
pub fn make_comparison(
    clips: Vec<NamedClip>,
    options: &CompOptions,
) -> Result<ComparisonReport, ComparisonError> {
    Comparison::new(clips)?.run(options)
}
