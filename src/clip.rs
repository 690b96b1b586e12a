//! Clip abstraction shared by sampling and extraction.
//!
//! A comparison works on [`NamedClip`]s: a user-chosen name paired with a
//! [`FrameSource`]. The sampler only needs the frame count and per-frame
//! [`PictureType`]; the writers additionally pull RGB frames through
//! [`FrameSource::for_each_frame`]. [`VideoClip`](crate::VideoClip) is the
//! FFmpeg-backed implementation; tests use in-memory sources.

use std::{
    collections::BTreeSet,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use image::RgbImage;

use crate::{error::ComparisonError, timecode::FrameRate};

/// Per-frame coding type as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PictureType {
    /// Intra-coded frame.
    I,
    /// Predicted frame.
    P,
    /// Bi-directionally predicted frame.
    B,
    /// S(GMC)-VOP (MPEG-4).
    S,
    /// Switching intra frame.
    SI,
    /// Switching predicted frame.
    SP,
    /// BI type.
    BI,
    /// The decoder did not report a type.
    Unknown,
}

impl PictureType {
    /// The conventional one- or two-letter tag.
    pub fn as_str(self) -> &'static str {
        match self {
            PictureType::I => "I",
            PictureType::P => "P",
            PictureType::B => "B",
            PictureType::S => "S",
            PictureType::SI => "SI",
            PictureType::SP => "SP",
            PictureType::BI => "BI",
            PictureType::Unknown => "?",
        }
    }
}

impl Display for PictureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for PictureType {
    type Err = ComparisonError;

    /// Parse a tag case-insensitively (`"i"` and `"I"` are the same type).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "I" => Ok(PictureType::I),
            "P" => Ok(PictureType::P),
            "B" => Ok(PictureType::B),
            "S" => Ok(PictureType::S),
            "SI" => Ok(PictureType::SI),
            "SP" => Ok(PictureType::SP),
            "BI" => Ok(PictureType::BI),
            _ => Err(ComparisonError::UnknownPictureType(value.to_string())),
        }
    }
}

impl From<ffmpeg_next::util::picture::Type> for PictureType {
    fn from(kind: ffmpeg_next::util::picture::Type) -> Self {
        use ffmpeg_next::util::picture::Type;

        match kind {
            Type::I => PictureType::I,
            Type::P => PictureType::P,
            Type::B => PictureType::B,
            Type::S => PictureType::S,
            Type::SI => PictureType::SI,
            Type::SP => PictureType::SP,
            Type::BI => PictureType::BI,
            Type::None => PictureType::Unknown,
        }
    }
}

/// The set of picture types a sampled frame may have.
///
/// A candidate frame is accepted only when every clip's frame at that index
/// has one of these types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureTypeFilter {
    accepted: BTreeSet<PictureType>,
}

impl PictureTypeFilter {
    /// Build a filter from already-parsed types.
    pub fn new<I: IntoIterator<Item = PictureType>>(types: I) -> Self {
        Self {
            accepted: types.into_iter().collect(),
        }
    }

    /// Parse a filter from tags such as `["i", "P"]`.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::UnknownPictureType`] for an unrecognised tag.
    pub fn parse<I, S>(tags: I) -> Result<Self, ComparisonError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted = tags
            .into_iter()
            .map(|tag| tag.as_ref().parse::<PictureType>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { accepted })
    }

    /// Whether `picture_type` is accepted.
    pub fn accepts(&self, picture_type: PictureType) -> bool {
        self.accepted.contains(&picture_type)
    }

    /// `true` if no type is accepted.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

impl Display for PictureTypeFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let tags: Vec<&str> = self.accepted.iter().map(|kind| kind.as_str()).collect();
        write!(f, "[{}]", tags.join(", "))
    }
}

/// YUV → RGB matrix coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourMatrix {
    /// ITU-R BT.601 (also BT.470BG and SMPTE 170M).
    Bt601,
    /// ITU-R BT.709.
    Bt709,
    /// SMPTE 240M.
    Smpte240m,
    /// FCC 73.682.
    Fcc,
    /// ITU-R BT.2020 non-constant luminance.
    Bt2020,
}

impl ColourMatrix {
    /// Matrix FFmpeg tags a frame with, if it maps to a supported one.
    pub(crate) fn from_ffmpeg_space(space: ffmpeg_next::util::color::Space) -> Option<Self> {
        use ffmpeg_next::util::color::Space;

        match space {
            Space::BT709 => Some(ColourMatrix::Bt709),
            Space::BT470BG | Space::SMPTE170M => Some(ColourMatrix::Bt601),
            Space::SMPTE240M => Some(ColourMatrix::Smpte240m),
            Space::FCC => Some(ColourMatrix::Fcc),
            Space::BT2020NCL | Space::BT2020CL => Some(ColourMatrix::Bt2020),
            _ => None,
        }
    }

    /// Fallback for untagged sources: HD and larger are assumed BT.709.
    pub(crate) fn guess_from_height(height: u32) -> Self {
        if height >= 720 {
            ColourMatrix::Bt709
        } else {
            ColourMatrix::Bt601
        }
    }

    /// The `SWS_CS_*` constant understood by `sws_getCoefficients`.
    pub(crate) fn swscale_colorspace(self) -> i32 {
        match self {
            ColourMatrix::Bt709 => 1,
            ColourMatrix::Fcc => 4,
            ColourMatrix::Bt601 => 5,
            ColourMatrix::Smpte240m => 7,
            ColourMatrix::Bt2020 => 9,
        }
    }
}

/// How frames are converted to 8-bit RGB before they are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RgbConversion {
    /// Forced matrix. `None` detects it from each frame's colour tags.
    pub matrix: Option<ColourMatrix>,
}

impl RgbConversion {
    /// Detect the matrix from the source.
    pub fn auto() -> Self {
        Self { matrix: None }
    }

    /// Always convert with `matrix`.
    pub fn forced(matrix: ColourMatrix) -> Self {
        Self {
            matrix: Some(matrix),
        }
    }
}

/// A frame-bearing clip that can be sampled and extracted.
///
/// Frame numbers are 0-indexed. Implementations decode lazily; methods take
/// `&mut self` so they can keep demuxer and decoder state between calls.
pub trait FrameSource {
    /// Total number of frames.
    fn frame_count(&self) -> u64;

    /// Output dimensions `(width, height)` of converted frames.
    fn dimensions(&self) -> (u32, u32);

    /// Nominal frame rate, used to turn timecodes into frame numbers.
    fn frame_rate(&self) -> FrameRate;

    /// Coding type of frame `frame_number`.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::FrameOutOfRange`] for frames past the end, or
    /// a decode error.
    fn picture_type(&mut self, frame_number: u64) -> Result<PictureType, ComparisonError>;

    /// Decode `frame_numbers` (ascending, unique) and hand each one to
    /// `callback` as packed 8-bit RGB.
    ///
    /// Processing stops at the first error from decoding or the callback.
    fn for_each_frame(
        &mut self,
        frame_numbers: &[u64],
        conversion: &RgbConversion,
        callback: &mut dyn FnMut(u64, RgbImage) -> Result<(), ComparisonError>,
    ) -> Result<(), ComparisonError>;
}

/// A [`FrameSource`] registered under a user-chosen name.
///
/// The name becomes the clip's output directory, its file-name prefix and
/// its label on the comparison site.
pub struct NamedClip {
    name: String,
    source: Box<dyn FrameSource>,
}

impl Debug for NamedClip {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("NamedClip")
            .field("name", &self.name)
            .field("frame_count", &self.source.frame_count())
            .field("dimensions", &self.source.dimensions())
            .finish_non_exhaustive()
    }
}

impl NamedClip {
    /// Pair a name with a source.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::InvalidClipName`] if the name is empty,
    /// `.`/`..`, or contains a path separator.
    pub fn new<S, F>(name: S, source: F) -> Result<Self, ComparisonError>
    where
        S: Into<String>,
        F: FrameSource + 'static,
    {
        Self::from_boxed(name, Box::new(source))
    }

    /// Like [`new`](NamedClip::new) for an already boxed source.
    ///
    /// # Errors
    ///
    /// See [`new`](NamedClip::new).
    pub fn from_boxed<S: Into<String>>(
        name: S,
        source: Box<dyn FrameSource>,
    ) -> Result<Self, ComparisonError> {
        let name = name.into();
        let unusable = name.trim().is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\']);
        if unusable {
            return Err(ComparisonError::InvalidClipName(name));
        }
        Ok(Self { name, source })
    }

    /// The clip's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared access to the underlying source.
    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    /// Mutable access to the underlying source.
    pub fn source_mut(&mut self) -> &mut dyn FrameSource {
        self.source.as_mut()
    }

    /// Shorthand for `source().frame_count()`.
    pub fn frame_count(&self) -> u64 {
        self.source.frame_count()
    }
}
