//! Internal utility functions.
//!
//! Pixel-buffer reshaping, zero-padding helpers and directory handling
//! shared by the writers, the diff generator and the uploader.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use ffmpeg_next::frame::Video as VideoFrame;
use image::RgbImage;

use crate::error::ComparisonError;

/// Copy pixel data from an RGB24 FFmpeg frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
/// The padding is stripped so the result can go straight to
/// [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        return data[..row_bytes * (height as usize)].to_vec();
    }

    let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
    for row in 0..(height as usize) {
        let row_start = row * stride;
        buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    buffer
}

/// Reorder a packed RGB image into planar G, B, R (FFmpeg's `gbrp`).
pub fn rgb_to_planar_gbr(image: &RgbImage) -> Vec<u8> {
    let plane_size = (image.width() as usize) * (image.height() as usize);
    let mut planes = vec![0_u8; plane_size * 3];
    let (green, rest) = planes.split_at_mut(plane_size);
    let (blue, red) = rest.split_at_mut(plane_size);

    for (index, pixel) in image.pixels().enumerate() {
        let [r, g, b] = pixel.0;
        green[index] = g;
        blue[index] = b;
        red[index] = r;
    }
    planes
}

/// Number of decimal digits in `value` (`0` has one digit).
pub fn digit_count(value: u64) -> usize {
    value.checked_ilog10().map_or(1, |log| log as usize + 1)
}

/// Create `path` (and missing parents), failing if `path` itself exists.
///
/// Output directories double as guards against re-running into a previous
/// result set: nothing is written unless the directory is new.
pub(crate) fn create_exclusive_dir(path: &Path) -> Result<(), ComparisonError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::AlreadyExists => {
            Err(ComparisonError::OutputExists {
                path: path.to_path_buf(),
            })
        }
        Err(error) => Err(error.into()),
    }
}

/// All `*.png` files directly inside `directory`, sorted by file name.
///
/// With zero-padded names this is frame order.
pub fn list_png_files(directory: &Path) -> Result<Vec<PathBuf>, ComparisonError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}
