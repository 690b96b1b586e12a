//! Progress reporting.
//!
//! Frame extraction and diffing report through a [`ProgressCallback`]
//! attached to [`CompOptions`](crate::CompOptions). The default discards
//! every update; the `framecomp` binary renders them as progress bars.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use framecomp::{CompOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let (Some(total), Some(pct)) = (info.total, info.percentage) {
//!             print!("\rExtracting image: {}/{total} ~ {pct:.0}%", info.current);
//!         }
//!     }
//! }
//!
//! let options = CompOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of work currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Writing the selected frames of one clip.
    FrameExtraction,
    /// Producing diff images.
    Diffing,
}

/// A snapshot of progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// Name of the clip being extracted, if any.
    pub clip: Option<String>,
    /// How many items have been processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The frame number most recently processed.
    pub current_frame: Option<u64>,
}

/// Receives progress updates.
///
/// Callbacks observe but cannot halt the operation.
pub trait ProgressCallback: Send + Sync {
    /// Called after each unit of work (every `batch_size` units).
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing for one operation and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    clip: Option<String>,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            clip: None,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Label reports with the clip being processed.
    pub(crate) fn for_clip(mut self, name: &str) -> Self {
        self.clip = Some(name.to_string());
        self
    }

    /// Record one completed item and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, frame_number: Option<u64>) {
        self.current += 1;
        self.items_since_last_report += 1;

        let last_item = self.total.is_some_and(|total| self.current >= total);
        if self.items_since_last_report >= self.batch_size || last_item {
            self.report(frame_number);
            self.items_since_last_report = 0;
        }
    }

    fn report(&self, frame_number: Option<u64>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|total| {
                let remaining = total.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            clip: self.clip.clone(),
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame_number,
        };

        self.callback.on_progress(&info);
    }
}
