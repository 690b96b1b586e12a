//! Random frame sampling.
//!
//! [`select_frames`] picks the frames every clip of a comparison is
//! extracted at. Without a picture-type filter it draws distinct frames
//! uniformly. With a filter it searches for frames whose picture type is
//! accepted in *every* clip, one result slot at a time:
//!
//! - candidates come from a pool of never-checked frames, so a frame that
//!   failed once is never decoded again, even by a later slot;
//! - a slot gives up after more than 50 failed candidates and is left out
//!   of the result;
//! - more than `50 × count` failures in total abort the search, as does
//!   running out of unchecked frames.
//!
//! Extra frames requested by the caller are merged into the result.

use std::collections::{BTreeSet, HashMap};

use rand::Rng;

use crate::{
    clip::{NamedClip, PictureTypeFilter},
    error::ComparisonError,
    utilities::digit_count,
};

/// Failed candidates one slot may see before it is abandoned.
pub const MAX_ATTEMPTS_PER_SLOT: u64 = 50;

/// The frames chosen for a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSelection {
    frames: Vec<u64>,
    max_frame: u64,
}

impl FrameSelection {
    /// Build a selection from arbitrary frame numbers.
    ///
    /// Duplicates are removed and the frames sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ComparisonError::EmptySelection`] if `frames` is empty.
    pub fn from_frames<I: IntoIterator<Item = u64>>(frames: I) -> Result<Self, ComparisonError> {
        let frames: Vec<u64> = frames.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let max_frame = *frames.last().ok_or(ComparisonError::EmptySelection)?;
        Ok(Self { frames, max_frame })
    }

    /// Selected frame numbers, ascending and unique.
    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    /// The largest selected frame number.
    pub fn max_frame(&self) -> u64 {
        self.max_frame
    }

    /// Number of selected frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; a selection holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Zero-padding width for file names: the digit count of
    /// [`max_frame`](FrameSelection::max_frame).
    pub fn pad_width(&self) -> usize {
        digit_count(self.max_frame)
    }
}

/// Choose the frames to compare.
///
/// `count` random frames are drawn from `[0, L)` where `L` is the shared
/// clip length, then `extra_frames` are added.
///
/// # Errors
///
/// Fails before drawing anything with:
/// - [`ComparisonError::NoClips`] or [`ComparisonError::ClipLengthMismatch`]
///   for an unusable clip set;
/// - [`ComparisonError::FrameOutOfRange`] for an extra frame past the end;
/// - [`ComparisonError::SampleCountTooLarge`] if unfiltered sampling asks
///   for more frames than exist.
///
/// With a filter the search can fail with
/// [`ComparisonError::PictureTypesExhausted`] or
/// [`ComparisonError::AttemptBudgetExceeded`]. A selection that ends up
/// empty is [`ComparisonError::EmptySelection`].
///
/// # Example
///
/// ```no_run
/// use framecomp::{NamedClip, PictureTypeFilter, VideoClip, select_frames};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut clips = vec![
///     NamedClip::new("source", VideoClip::open("source.mkv")?)?,
///     NamedClip::new("encode", VideoClip::open("encode.mkv")?)?,
/// ];
/// let filter = PictureTypeFilter::parse(["B"])?;
/// let mut rng = StdRng::seed_from_u64(42);
///
/// let selection = select_frames(&mut clips, 10, &[0], Some(&filter), &mut rng)?;
/// println!("frames: {:?}", selection.frames());
/// # Ok::<(), framecomp::ComparisonError>(())
/// ```
pub fn select_frames<R: Rng + ?Sized>(
    clips: &mut [NamedClip],
    count: u64,
    extra_frames: &[u64],
    filter: Option<&PictureTypeFilter>,
    rng: &mut R,
) -> Result<FrameSelection, ComparisonError> {
    let total_frames = common_length(clips)?;

    if let Some(&frame_number) = extra_frames.iter().find(|&&frame| frame >= total_frames) {
        return Err(ComparisonError::FrameOutOfRange {
            frame_number,
            total_frames,
        });
    }

    let mut frames: BTreeSet<u64> = match filter {
        None => sample_unconstrained(total_frames, count, rng)?,
        Some(filter) => sample_constrained(clips, total_frames, count, filter, rng)?,
    };
    frames.extend(extra_frames.iter().copied());

    let selection = FrameSelection::from_frames(frames)?;
    log::info!(
        "Selected {} frames (max frame {})",
        selection.len(),
        selection.max_frame()
    );
    Ok(selection)
}

/// The frame count shared by every clip.
pub(crate) fn common_length(clips: &[NamedClip]) -> Result<u64, ComparisonError> {
    let lengths: Vec<u64> = clips.iter().map(NamedClip::frame_count).collect();
    let first = *lengths.first().ok_or(ComparisonError::NoClips)?;
    if lengths.iter().any(|&length| length != first) {
        return Err(ComparisonError::ClipLengthMismatch { lengths });
    }
    Ok(first)
}

fn sample_unconstrained<R: Rng + ?Sized>(
    total_frames: u64,
    count: u64,
    rng: &mut R,
) -> Result<BTreeSet<u64>, ComparisonError> {
    if count > total_frames {
        return Err(ComparisonError::SampleCountTooLarge {
            requested: count,
            available: total_frames,
        });
    }

    log::debug!("Drawing {count} of {total_frames} frames without a picture type filter");

    Ok(rand::seq::index::sample(rng, total_frames as usize, count as usize)
        .into_iter()
        .map(|index| index as u64)
        .collect())
}

fn sample_constrained<R: Rng + ?Sized>(
    clips: &mut [NamedClip],
    total_frames: u64,
    count: u64,
    filter: &PictureTypeFilter,
    rng: &mut R,
) -> Result<BTreeSet<u64>, ComparisonError> {
    let exhausted = |checked| ComparisonError::PictureTypesExhausted {
        picture_types: filter.to_string(),
        checked,
    };

    let mut samples = BTreeSet::new();
    if count == 0 {
        return Ok(samples);
    }
    if filter.is_empty() {
        return Err(exhausted(0));
    }

    log::debug!("Drawing {count} of {total_frames} frames with picture types {filter}");

    let mut pool = UncheckedPool::new(total_frames);
    let mut budget = AttemptBudget::new(MAX_ATTEMPTS_PER_SLOT * count);
    let mut matches_everywhere = |frame_number: u64| -> Result<bool, ComparisonError> {
        for clip in clips.iter_mut() {
            if !filter.accepts(clip.source_mut().picture_type(frame_number)?) {
                return Ok(false);
            }
        }
        Ok(true)
    };

    for slot in 0..count {
        match search_slot(&mut pool, &mut budget, rng, &mut matches_everywhere)? {
            SlotOutcome::Accepted(frame_number) => {
                log::debug!("Slot {slot}: accepted frame {frame_number}");
                samples.insert(frame_number);
            }
            SlotOutcome::Abandoned => {
                log::warn!(
                    "{MAX_ATTEMPTS_PER_SLOT} attempts were made for sample {slot} and no match \
                     was found for {filter}; skipping it"
                );
            }
            SlotOutcome::PoolExhausted => return Err(exhausted(pool.checked())),
            SlotOutcome::BudgetExceeded => {
                return Err(ComparisonError::AttemptBudgetExceeded {
                    limit: budget.limit,
                });
            }
        }
    }

    Ok(samples)
}

/// Result of searching for one sample slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOutcome {
    Accepted(u64),
    /// The slot exceeded its own attempt cap.
    Abandoned,
    /// Every frame has been checked.
    PoolExhausted,
    /// The session-wide failure budget ran out.
    BudgetExceeded,
}

/// Session-wide failed-candidate counter.
#[derive(Debug)]
struct AttemptBudget {
    failures: u64,
    limit: u64,
}

impl AttemptBudget {
    fn new(limit: u64) -> Self {
        Self { failures: 0, limit }
    }

    /// Record a failure; `false` once the budget is exceeded.
    fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures <= self.limit
    }
}

/// Draw candidates for one slot until `accept` passes one or a limit trips.
///
/// Every drawn frame leaves the pool whether or not it is accepted.
fn search_slot<R: Rng + ?Sized>(
    pool: &mut UncheckedPool,
    budget: &mut AttemptBudget,
    rng: &mut R,
    accept: &mut dyn FnMut(u64) -> Result<bool, ComparisonError>,
) -> Result<SlotOutcome, ComparisonError> {
    let mut slot_failures = 0;
    loop {
        let Some(candidate) = pool.draw(rng) else {
            return Ok(SlotOutcome::PoolExhausted);
        };
        if accept(candidate)? {
            return Ok(SlotOutcome::Accepted(candidate));
        }

        slot_failures += 1;
        if !budget.record_failure() {
            return Ok(SlotOutcome::BudgetExceeded);
        }
        if slot_failures > MAX_ATTEMPTS_PER_SLOT {
            return Ok(SlotOutcome::Abandoned);
        }
    }
}

/// Frames `[0, len)` not drawn yet, as a lazily shuffled permutation.
///
/// Positions `[0, drawn)` of a virtual array hold the drawn frames; only
/// positions that were swapped are stored.
#[derive(Debug)]
struct UncheckedPool {
    len: u64,
    drawn: u64,
    swapped: HashMap<u64, u64>,
}

impl UncheckedPool {
    fn new(len: u64) -> Self {
        Self {
            len,
            drawn: 0,
            swapped: HashMap::new(),
        }
    }

    /// Number of frames drawn so far.
    fn checked(&self) -> u64 {
        self.drawn
    }

    /// A uniformly random unchecked frame, or `None` when all were drawn.
    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<u64> {
        if self.drawn >= self.len {
            return None;
        }
        let position = rng.random_range(self.drawn..self.len);
        let chosen = self.swapped.get(&position).copied().unwrap_or(position);
        let head = self.swapped.remove(&self.drawn).unwrap_or(self.drawn);
        if position != self.drawn {
            self.swapped.insert(position, head);
        }
        self.drawn += 1;
        Some(chosen)
    }
}
