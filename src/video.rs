//! FFmpeg-backed clips.
//!
//! [`VideoClip`] opens a video file with `ffmpeg-next` and implements
//! [`FrameSource`] on top of it: the frame count and rate come from the
//! container, picture types and pixels from decoding. Frames are converted
//! to RGB24 with swscale using bicubic scaling and error-diffusion
//! dithering, with the YUV matrix either forced or read from the frame.

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    os::raw::c_int,
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{context::Context as CodecContext, decoder::Video as VideoDecoder},
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::color::Range as ColorRange,
};
use image::RgbImage;

use crate::{
    clip::{ColourMatrix, FrameSource, PictureType, RgbConversion},
    error::ComparisonError,
    timecode::FrameRate,
    utilities::frame_to_rgb_buffer,
};

/// Targets closer than this to the last decoded frame are reached by
/// decoding forward instead of seeking.
const SEQUENTIAL_DECODE_WINDOW: u64 = 48;

/// FFmpeg's internal time base for container-level seeking (microseconds).
const AV_TIME_BASE: f64 = 1_000_000.0;

/// A video file opened as a [`FrameSource`].
///
/// # Example
///
/// ```no_run
/// use framecomp::{FrameSource, VideoClip};
///
/// let mut clip = VideoClip::open("source.mkv")?;
/// println!("{} frames at {}", clip.frame_count(), clip.frame_rate());
/// println!("frame 0 is {}", clip.picture_type(0)?);
/// # Ok::<(), framecomp::ComparisonError>(())
/// ```
pub struct VideoClip {
    input_context: Input,
    video_stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    frame_rate: FrameRate,
    frame_count: u64,
    width: u32,
    height: u32,
    file_path: PathBuf,
    picture_types: HashMap<u64, PictureType>,
}

impl Debug for VideoClip {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoClip")
            .field("file_path", &self.file_path)
            .field("video_stream_index", &self.video_stream_index)
            .field("frame_rate", &self.frame_rate)
            .field("frame_count", &self.frame_count)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl VideoClip {
    /// Open the best video stream of a file.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::FileOpen`] if FFmpeg cannot open the file
    /// or create a decoder, and [`ComparisonError::NoVideoStream`] if it has
    /// no video.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ComparisonError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();

        log::debug!("Opening video file: {}", file_path.display());

        ffmpeg_next::init().map_err(|error| ComparisonError::FileOpen {
            path: file_path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| ComparisonError::FileOpen {
                path: file_path.clone(),
                reason: error.to_string(),
            })?;

        let (video_stream_index, time_base, start_pts, frame_rate, stream_frames, stream_duration) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or(ComparisonError::NoVideoStream)?;

            let average = stream.avg_frame_rate();
            let rate = if average.numerator() > 0 && average.denominator() > 0 {
                average
            } else {
                stream.rate()
            };
            let frame_rate = if rate.numerator() > 0 && rate.denominator() > 0 {
                FrameRate::new(rate.numerator() as u32, rate.denominator() as u32)
            } else {
                return Err(ComparisonError::FileOpen {
                    path: file_path.clone(),
                    reason: "video stream has no usable frame rate".to_string(),
                });
            };

            let start_pts = match stream.start_time() {
                pts if pts == ffmpeg_sys_next::AV_NOPTS_VALUE => 0,
                pts => pts,
            };

            (
                stream.index(),
                stream.time_base(),
                start_pts,
                frame_rate,
                stream.frames(),
                stream.duration(),
            )
        };

        let (width, height) = {
            let stream = input_context
                .stream(video_stream_index)
                .ok_or(ComparisonError::NoVideoStream)?;
            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|error| ComparisonError::FileOpen {
                    path: file_path.clone(),
                    reason: format!("Failed to create video decoder: {error}"),
                })?;
            (decoder.width(), decoder.height())
        };

        // Prefer the container's frame count; fall back to duration × rate.
        let frame_count = if stream_frames > 0 {
            stream_frames as u64
        } else {
            let seconds = if stream_duration > 0 {
                stream_duration as f64 * f64::from(time_base.numerator())
                    / f64::from(time_base.denominator().max(1))
            } else {
                input_context.duration().max(0) as f64 / AV_TIME_BASE
            };
            (seconds * frame_rate.as_f64()).round() as u64
        };

        log::debug!(
            "Opened {}: {width}x{height}, {frame_count} frames at {frame_rate}",
            file_path.display()
        );

        Ok(Self {
            input_context,
            video_stream_index,
            time_base,
            start_pts,
            frame_rate,
            frame_count,
            width,
            height,
            file_path,
            picture_types: HashMap::new(),
        })
    }

    /// Path the clip was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn new_decoder(&self) -> Result<VideoDecoder, ComparisonError> {
        let stream = self
            .input_context
            .stream(self.video_stream_index)
            .ok_or(ComparisonError::NoVideoStream)?;
        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        Ok(decoder_context.decoder().video()?)
    }

    fn check_range(&self, frame_number: u64) -> Result<(), ComparisonError> {
        if frame_number >= self.frame_count {
            return Err(ComparisonError::FrameOutOfRange {
                frame_number,
                total_frames: self.frame_count,
            });
        }
        Ok(())
    }

    /// Read the next packet of the video stream, `None` at end of file.
    fn next_video_packet(&mut self) -> Result<Option<Packet>, ComparisonError> {
        let mut packet = Packet::empty();
        loop {
            match packet.read(&mut self.input_context) {
                Ok(()) if packet.stream() == self.video_stream_index => return Ok(Some(packet)),
                Ok(()) => continue,
                Err(FfmpegError::Eof) => return Ok(None),
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn seek_to_frame(&mut self, frame_number: u64) -> Result<(), ComparisonError> {
        let position = (frame_number as f64 / self.frame_rate.as_f64() * AV_TIME_BASE) as i64;
        self.input_context.seek(position, ..position)?;
        Ok(())
    }

    /// Decode `targets` (ascending, unique) and pass each decoded frame to
    /// `handler` together with its target number.
    ///
    /// Nearby targets are decoded sequentially; distant ones are sought to.
    /// If a seek lands past a target, the first frame after it stands in.
    fn decode_targets(
        &mut self,
        targets: &[u64],
        handler: &mut dyn FnMut(u64, &VideoFrame) -> Result<(), ComparisonError>,
    ) -> Result<(), ComparisonError> {
        if targets.is_empty() {
            return Ok(());
        }

        let mut decoder = self.new_decoder()?;
        let mut decoded_frame = VideoFrame::empty();
        let mut position: Option<u64> = None;
        let mut flushed = false;

        for &target in targets {
            self.check_range(target)?;

            let needs_seek = match position {
                None => true,
                Some(current) => target <= current || target > current + SEQUENTIAL_DECODE_WINDOW,
            };
            if needs_seek {
                self.seek_to_frame(target)?;
                decoder.flush();
                position = None;
                flushed = false;
            }

            loop {
                if decoder.receive_frame(&mut decoded_frame).is_ok() {
                    let timestamp = decoded_frame
                        .timestamp()
                        .or(decoded_frame.pts())
                        .unwrap_or(self.start_pts);
                    let current = pts_to_frame_number(
                        timestamp - self.start_pts,
                        self.time_base,
                        self.frame_rate,
                    );
                    position = Some(current);

                    if current >= target {
                        if current != target {
                            log::debug!("Frame {target} not decodable exactly, using {current}");
                        }
                        handler(target, &decoded_frame)?;
                        break;
                    }
                    continue;
                }

                if flushed {
                    return Err(ComparisonError::VideoDecodeError(format!(
                        "Could not locate frame {target} in {}",
                        self.file_path.display()
                    )));
                }

                match self.next_video_packet()? {
                    Some(packet) => decoder.send_packet(&packet)?,
                    None => {
                        decoder.send_eof()?;
                        flushed = true;
                    }
                }
            }
        }

        Ok(())
    }
}

impl FrameSource for VideoClip {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn picture_type(&mut self, frame_number: u64) -> Result<PictureType, ComparisonError> {
        self.check_range(frame_number)?;
        if let Some(&cached) = self.picture_types.get(&frame_number) {
            return Ok(cached);
        }

        let mut picture_type = PictureType::Unknown;
        self.decode_targets(&[frame_number], &mut |_, frame| {
            picture_type = frame.kind().into();
            Ok(())
        })?;

        self.picture_types.insert(frame_number, picture_type);
        Ok(picture_type)
    }

    fn for_each_frame(
        &mut self,
        frame_numbers: &[u64],
        conversion: &RgbConversion,
        callback: &mut dyn FnMut(u64, RgbImage) -> Result<(), ComparisonError>,
    ) -> Result<(), ComparisonError> {
        let (width, height) = (self.width, self.height);
        let mut scaler: Option<ScalingContext> = None;
        let mut rgb_frame = VideoFrame::empty();
        let mut picture_types = Vec::with_capacity(frame_numbers.len());

        self.decode_targets(frame_numbers, &mut |frame_number, decoded_frame| {
            picture_types.push((frame_number, PictureType::from(decoded_frame.kind())));

            let context = match scaler.as_mut() {
                Some(context) => context,
                None => scaler.insert(build_scaler(decoded_frame, width, height, conversion)?),
            };
            context.run(decoded_frame, &mut rgb_frame)?;

            let buffer = frame_to_rgb_buffer(&rgb_frame, width, height);
            let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
                ComparisonError::VideoDecodeError(
                    "Failed to construct RGB image from decoded frame data".to_string(),
                )
            })?;
            callback(frame_number, image)
        })?;

        self.picture_types.extend(picture_types);
        Ok(())
    }
}

/// Create an RGB24 converter for frames shaped like `frame`.
fn build_scaler(
    frame: &VideoFrame,
    width: u32,
    height: u32,
    conversion: &RgbConversion,
) -> Result<ScalingContext, ComparisonError> {
    let mut scaler = ScalingContext::get(
        frame.format(),
        frame.width(),
        frame.height(),
        Pixel::RGB24,
        width,
        height,
        ScalingFlags::BICUBIC | ScalingFlags::ERROR_DIFFUSION | ScalingFlags::ACCURATE_RND,
    )?;

    let matrix = conversion
        .matrix
        .or_else(|| ColourMatrix::from_ffmpeg_space(frame.color_space()))
        .unwrap_or_else(|| ColourMatrix::guess_from_height(frame.height()));
    let source_full_range = c_int::from(frame.color_range() == ColorRange::JPEG);

    log::debug!("Converting to RGB24 with {matrix:?} coefficients");

    // SAFETY: the scaler owns a valid SwsContext for its whole lifetime and
    // sws_getCoefficients returns a pointer into a static table.
    let status = unsafe {
        let coefficients = ffmpeg_sys_next::sws_getCoefficients(matrix.swscale_colorspace());
        ffmpeg_sys_next::sws_setColorspaceDetails(
            scaler.as_mut_ptr(),
            coefficients,
            source_full_range,
            coefficients,
            1,
            0,
            1 << 16,
            1 << 16,
        )
    };
    if status < 0 {
        log::warn!("swscale rejected {matrix:?} coefficients, using its defaults");
    }

    Ok(scaler)
}

/// Rescale a stream timestamp (relative to the stream start) to a frame
/// number, rounding to the nearest frame.
fn pts_to_frame_number(relative_pts: i64, time_base: Rational, frame_rate: FrameRate) -> u64 {
    let seconds = relative_pts as f64 * f64::from(time_base.numerator())
        / f64::from(time_base.denominator().max(1));
    (seconds * frame_rate.as_f64()).round().max(0.0) as u64
}
