//! Pixel diffs between two clips.
//!
//! Uses ImageMagick 7's `magick compare` once per frame pair. The tool is
//! probed before anything is created, the `diffs` directory must not exist
//! yet, and all comparisons are started before any of them is awaited.

use std::path::{Path, PathBuf};

use crate::{
    error::ComparisonError,
    process::{ToolCommand, ToolRunner},
    selection::FrameSelection,
    utilities::create_exclusive_dir,
    writer::{ClipImages, image_file_name},
};

/// Name of the diff directory under the comparison root.
pub const DIFF_DIRECTORY: &str = "diffs";

/// Source label of diff images in an upload.
pub const DIFF_SOURCE_NAME: &str = "diff";

/// `compare` exits with 1 when the images differ, which is the expected
/// outcome here.
const ACCEPTED_EXIT_CODES: [i32; 2] = [0, 1];

/// Builds and runs `magick compare` commands.
#[derive(Debug, Clone)]
pub struct DiffGenerator {
    magick: PathBuf,
}

impl DiffGenerator {
    /// A generator running the given `magick` binary.
    pub fn new<P: Into<PathBuf>>(magick: P) -> Self {
        Self {
            magick: magick.into(),
        }
    }

    /// `magick compare` with no operands, used to check the tool exists.
    pub fn probe_command(&self) -> ToolCommand {
        ToolCommand::new(&self.magick).arg("compare")
    }

    /// `magick compare {first} {second} {output}`.
    pub fn compare_command(&self, first: &Path, second: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.magick)
            .arg("compare")
            .path_arg(first)
            .path_arg(second)
            .path_arg(output)
    }

    /// Write `diff_{frame}.png` for every frame into `output_dir`.
    ///
    /// `first` and `second` hold one image per selected frame, in the
    /// same order. `on_finished` is called once per completed pair.
    ///
    /// # Errors
    ///
    /// - [`ComparisonError::ImageCountMismatch`] if an image list does not
    ///   match the selection;
    /// - [`ComparisonError::ToolNotFound`] if `magick` cannot be started,
    ///   before `output_dir` is created;
    /// - [`ComparisonError::OutputExists`] if `output_dir` already exists;
    /// - the first failing comparison, in frame order, once all of them
    ///   have finished.
    pub fn generate(
        &self,
        runner: &dyn ToolRunner,
        first: &ClipImages,
        second: &ClipImages,
        selection: &FrameSelection,
        output_dir: &Path,
        on_finished: &mut dyn FnMut(u64),
    ) -> Result<Vec<PathBuf>, ComparisonError> {
        let frames = selection.frames();
        first.expect_count(frames.len())?;
        second.expect_count(frames.len())?;

        runner.probe(&self.probe_command())?;
        create_exclusive_dir(output_dir)?;

        let pad_width = selection.pad_width();
        let outputs: Vec<PathBuf> = frames
            .iter()
            .map(|&frame| output_dir.join(image_file_name(DIFF_SOURCE_NAME, frame, pad_width)))
            .collect();
        let commands: Vec<ToolCommand> = first
            .paths
            .iter()
            .zip(&second.paths)
            .zip(&outputs)
            .map(|((a, b), output)| self.compare_command(a, b, output))
            .collect();

        log::info!("Diffing {} frame pairs", commands.len());

        let results = runner.run_batch(&commands);
        let mut first_failure = None;
        for ((result, command), &frame) in results.into_iter().zip(&commands).zip(frames) {
            let checked = result.and_then(|status| status.accept(command, &ACCEPTED_EXIT_CODES));
            match checked {
                Ok(_) => on_finished(frame),
                Err(error) => {
                    log::warn!("Diff of frame {frame} failed: {error}");
                    first_failure.get_or_insert(error);
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(outputs),
        }
    }
}
