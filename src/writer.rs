//! Frame extraction backends.
//!
//! A [`Writer`] names one of three interchangeable ways of turning selected
//! frames into PNG files. All of them write
//! `{root}/{clip}/{clip}_{frame:0pad}.png` and produce the same pictures;
//! they differ in how much work happens per frame:
//!
//! - [`Writer::FfmpegPipe`] streams every frame as planar GBR into a single
//!   `ffmpeg` process that writes all the files;
//! - [`Writer::PatternWrite`] expands a printf-style file pattern and
//!   encodes each frame on its own;
//! - [`Writer::ImageSave`] hands each frame to [`image`] directly.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use image::{
    ExtendedColorType, ImageEncoder, ImageFormat, RgbImage,
    codecs::png::{CompressionType, FilterType, PngEncoder},
};

use crate::{
    clip::{NamedClip, RgbConversion},
    config::ToolPaths,
    error::ComparisonError,
    process::{ToolCommand, ToolRunner},
    utilities::{list_png_files, rgb_to_planar_gbr},
};

/// Extraction backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Writer {
    /// One `ffmpeg` process fed raw frames over its standard input.
    FfmpegPipe,
    /// Per-frame PNG encoding to a `{clip}_%0Nd.png` pattern.
    PatternWrite,
    /// Per-frame saving through the `image` crate.
    #[default]
    ImageSave,
}

impl Writer {
    /// Every backend, in declaration order.
    pub const ALL: [Writer; 3] = [Writer::FfmpegPipe, Writer::PatternWrite, Writer::ImageSave];

    /// Canonical name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Writer::FfmpegPipe => "ffmpeg",
            Writer::PatternWrite => "pattern",
            Writer::ImageSave => "image",
        }
    }

    /// Build the extraction strategy for this backend.
    pub fn strategy(self, tools: &ToolPaths) -> Box<dyn FrameWriter> {
        match self {
            Writer::FfmpegPipe => Box::new(FfmpegPipeWriter {
                ffmpeg: tools.ffmpeg.clone(),
            }),
            Writer::PatternWrite => Box::new(PatternWriter),
            Writer::ImageSave => Box::new(ImageSaveWriter),
        }
    }
}

impl Display for Writer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Writer {
    type Err = ComparisonError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" | "pipe" => Ok(Writer::FfmpegPipe),
            "pattern" | "imwri" => Ok(Writer::PatternWrite),
            "image" | "opencv" => Ok(Writer::ImageSave),
            _ => Err(ComparisonError::UnknownWriter(value.to_string())),
        }
    }
}

/// What to extract for one clip.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionJob<'a> {
    /// Selected frames, ascending.
    pub frames: &'a [u64],
    /// The clip's directory, already created.
    pub output_dir: &'a Path,
    /// Zero-padding width of frame numbers in file names.
    pub pad_width: usize,
    /// RGB conversion applied before writing.
    pub conversion: &'a RgbConversion,
}

/// One extraction backend.
pub trait FrameWriter {
    /// Write one PNG per selected frame of `clip` into `job.output_dir`.
    ///
    /// `on_written` is called with each frame number once it has been
    /// handed off. Returns the image paths in frame order.
    ///
    /// # Errors
    ///
    /// Decoding, encoding and I/O errors, or
    /// [`ComparisonError::ToolFailed`] if an external writer fails.
    fn write_frames(
        &self,
        clip: &mut NamedClip,
        job: &ExtractionJob<'_>,
        runner: &dyn ToolRunner,
        on_written: &mut dyn FnMut(u64),
    ) -> Result<Vec<PathBuf>, ComparisonError>;
}

/// The PNG files of one comparison source, in frame order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipImages {
    /// Clip name, or `diff` for diff images.
    pub name: String,
    /// One image per selected frame.
    pub paths: Vec<PathBuf>,
}

impl ClipImages {
    /// Pair a source name with its images.
    pub fn new<S: Into<String>>(name: S, paths: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            paths,
        }
    }

    /// Read back every `*.png` in `directory`, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed.
    pub fn from_directory<S: Into<String>>(name: S, directory: &Path) -> Result<Self, ComparisonError> {
        Ok(Self::new(name, list_png_files(directory)?))
    }

    /// Fail unless there is exactly one image per selected frame.
    pub(crate) fn expect_count(&self, expected: usize) -> Result<(), ComparisonError> {
        if self.paths.len() != expected {
            return Err(ComparisonError::ImageCountMismatch {
                source_name: self.name.clone(),
                expected,
                found: self.paths.len(),
            });
        }
        Ok(())
    }
}

/// `{prefix}_{frame:0pad}.png`.
pub fn image_file_name(prefix: &str, frame_number: u64, pad_width: usize) -> String {
    format!("{prefix}_{frame_number:0pad_width$}.png")
}

/// Where frame `frame_number` of `clip_name` is extracted to.
pub fn extracted_image_path(
    root: &Path,
    clip_name: &str,
    frame_number: u64,
    pad_width: usize,
) -> PathBuf {
    root.join(clip_name)
        .join(image_file_name(clip_name, frame_number, pad_width))
}

/// Where the diff image for `frame_number` is written.
pub fn diff_image_path(root: &Path, frame_number: u64, pad_width: usize) -> PathBuf {
    root.join(crate::diff::DIFF_DIRECTORY)
        .join(image_file_name(crate::diff::DIFF_SOURCE_NAME, frame_number, pad_width))
}

/// Streams frames into a single `ffmpeg` process.
///
/// Frames are sent as a 1 fps raw `gbrp` stream; output `i` is cut from
/// second `i` of that stream.
#[derive(Debug, Clone)]
pub struct FfmpegPipeWriter {
    ffmpeg: PathBuf,
}

impl FfmpegPipeWriter {
    /// A writer running the given `ffmpeg` binary.
    pub fn new<P: Into<PathBuf>>(ffmpeg: P) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// The full `ffmpeg` invocation writing `outputs` from a
    /// `width`×`height` stream.
    ///
    /// The image2 muxer reads output names as sequence patterns, so any
    /// `%` in an output path is passed as `%%`.
    pub fn command(&self, width: u32, height: u32, outputs: &[PathBuf]) -> ToolCommand {
        let mut command = ToolCommand::new(&self.ffmpeg).args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-video_size",
            format!("{width}x{height}").as_str(),
            "-pixel_format",
            "gbrp",
            "-framerate",
            "1",
            "-i",
            "pipe:",
        ]);
        for (index, output) in outputs.iter().enumerate() {
            command = command
                .args(["-pred", "mixed", "-ss", index.to_string().as_str(), "-t", "1"])
                .arg(escape_percent(&output.display().to_string()));
        }
        command
    }
}

impl FrameWriter for FfmpegPipeWriter {
    fn write_frames(
        &self,
        clip: &mut NamedClip,
        job: &ExtractionJob<'_>,
        runner: &dyn ToolRunner,
        on_written: &mut dyn FnMut(u64),
    ) -> Result<Vec<PathBuf>, ComparisonError> {
        let outputs: Vec<PathBuf> = job
            .frames
            .iter()
            .map(|&frame| {
                job.output_dir
                    .join(image_file_name(clip.name(), frame, job.pad_width))
            })
            .collect();

        let (width, height) = clip.source().dimensions();
        let command = self.command(width, height, &outputs);

        let source = clip.source_mut();
        let status = runner.run_piped(&command, &mut |stdin: &mut dyn Write| {
            source.for_each_frame(job.frames, job.conversion, &mut |frame_number, image| {
                stdin.write_all(&rgb_to_planar_gbr(&image))?;
                on_written(frame_number);
                Ok(())
            })
        })?;
        status.accept(&command, &[0])?;

        Ok(outputs)
    }
}

/// Writes each frame to a `%0Nd` file pattern with its own PNG encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternWriter;

impl PatternWriter {
    /// The file pattern used for `clip_name`, e.g. `source_%04d.png`.
    ///
    /// A `%` in the clip name is escaped, so the only directive is the
    /// frame number.
    pub fn pattern(clip_name: &str, pad_width: usize) -> String {
        format!("{}_%0{pad_width}d.png", escape_percent(clip_name))
    }
}

impl FrameWriter for PatternWriter {
    fn write_frames(
        &self,
        clip: &mut NamedClip,
        job: &ExtractionJob<'_>,
        _runner: &dyn ToolRunner,
        on_written: &mut dyn FnMut(u64),
    ) -> Result<Vec<PathBuf>, ComparisonError> {
        let pattern = Self::pattern(clip.name(), job.pad_width);
        let mut written = Vec::with_capacity(job.frames.len());

        clip.source_mut()
            .for_each_frame(job.frames, job.conversion, &mut |frame_number, image| {
                let path = job
                    .output_dir
                    .join(expand_frame_pattern(&pattern, frame_number));
                encode_png(&image, &path)?;
                written.push(path);
                on_written(frame_number);
                Ok(())
            })?;

        Ok(written)
    }
}

/// Saves each frame through [`RgbImage::save_with_format`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSaveWriter;

impl FrameWriter for ImageSaveWriter {
    fn write_frames(
        &self,
        clip: &mut NamedClip,
        job: &ExtractionJob<'_>,
        _runner: &dyn ToolRunner,
        on_written: &mut dyn FnMut(u64),
    ) -> Result<Vec<PathBuf>, ComparisonError> {
        let name = clip.name().to_string();
        let mut written = Vec::with_capacity(job.frames.len());

        clip.source_mut()
            .for_each_frame(job.frames, job.conversion, &mut |frame_number, image| {
                let path = job
                    .output_dir
                    .join(image_file_name(&name, frame_number, job.pad_width));
                image.save_with_format(&path, ImageFormat::Png)?;
                written.push(path);
                on_written(frame_number);
                Ok(())
            })?;

        Ok(written)
    }
}

fn encode_png(image: &RgbImage, path: &Path) -> Result<(), ComparisonError> {
    let file = BufWriter::new(File::create(path)?);
    let encoder = PngEncoder::new_with_quality(file, CompressionType::Default, FilterType::Adaptive);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(())
}

/// Double every `%` so printf-style consumers read it literally.
fn escape_percent(text: &str) -> String {
    text.replace('%', "%%")
}

/// Replace the first `%d` / `%0Nd` directive of `pattern` with `frame_number`.
///
/// `%%` is a literal percent sign. A pattern without a directive is
/// returned unchanged.
pub(crate) fn expand_frame_pattern(pattern: &str, frame_number: u64) -> String {
    let mut expanded = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;

    while let Some(start) = rest.find('%') {
        expanded.push_str(&rest[..start]);
        let directive = &rest[start + 1..];

        if let Some(after) = directive.strip_prefix('%') {
            expanded.push('%');
            rest = after;
            continue;
        }

        let digits = directive
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(directive.len());
        if directive[digits..].starts_with('d') {
            let spec = &directive[..digits];
            let width: usize = spec.parse().unwrap_or(0);
            if spec.starts_with('0') {
                expanded.push_str(&format!("{frame_number:0width$}"));
            } else {
                expanded.push_str(&format!("{frame_number:width$}"));
            }
            expanded.push_str(&directive[digits + 1..].replace("%%", "%"));
            return expanded;
        }

        expanded.push('%');
        rest = directive;
    }

    expanded.push_str(rest);
    expanded
}
