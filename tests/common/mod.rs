//! In-memory clips and recording tool runners shared by the integration
//! tests. Nothing here decodes video or spawns processes.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use framecomp::{
    ComparisonBatch, ComparisonError, ComparisonHost, FrameSource, NamedClip, PictureType,
    RgbConversion, ToolCommand, ToolRunner, ToolStatus, process::StdinFeed, timecode::FrameRate,
};
use image::{Rgb, RgbImage};

// ── SyntheticClip ──────────────────────────────────────────────────

/// A clip of solid-colour frames with scripted picture types.
pub struct SyntheticClip {
    frame_count: u64,
    width: u32,
    height: u32,
    default_type: PictureType,
    picture_types: HashMap<u64, PictureType>,
    scripted_lookups: VecDeque<PictureType>,
    type_lookups: Arc<AtomicU64>,
}

impl SyntheticClip {
    pub fn new(frame_count: u64) -> Self {
        Self {
            frame_count,
            width: 8,
            height: 4,
            default_type: PictureType::P,
            picture_types: HashMap::new(),
            scripted_lookups: VecDeque::new(),
            type_lookups: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Every frame not set explicitly has `picture_type`.
    pub fn with_default_type(mut self, picture_type: PictureType) -> Self {
        self.default_type = picture_type;
        self
    }

    pub fn with_types<I: IntoIterator<Item = u64>>(
        mut self,
        frames: I,
        picture_type: PictureType,
    ) -> Self {
        for frame in frames {
            self.picture_types.insert(frame, picture_type);
        }
        self
    }

    /// The next lookups answer with `picture_types` in order, whatever the
    /// frame. Each answer sticks to the frame it was given for.
    pub fn with_lookup_script<I: IntoIterator<Item = PictureType>>(mut self, picture_types: I) -> Self {
        self.scripted_lookups.extend(picture_types);
        self
    }

    /// Shared counter of `picture_type` calls.
    pub fn lookup_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.type_lookups)
    }

    pub fn named(self, name: &str) -> NamedClip {
        NamedClip::new(name, self).unwrap()
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
}

impl FrameSource for SyntheticClip {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> FrameRate {
        FrameRate::new(24, 1)
    }

    fn picture_type(&mut self, frame_number: u64) -> Result<PictureType, ComparisonError> {
        self.check_range(frame_number)?;
        self.type_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(picture_type) = self.scripted_lookups.pop_front() {
            self.picture_types.insert(frame_number, picture_type);
            return Ok(picture_type);
        }
        Ok(self
            .picture_types
            .get(&frame_number)
            .copied()
            .unwrap_or(self.default_type))
    }

    fn for_each_frame(
        &mut self,
        frame_numbers: &[u64],
        _conversion: &RgbConversion,
        callback: &mut dyn FnMut(u64, RgbImage) -> Result<(), ComparisonError>,
    ) -> Result<(), ComparisonError> {
        for &frame_number in frame_numbers {
            self.check_range(frame_number)?;
            let shade = (frame_number % 256) as u8;
            let image = RgbImage::from_pixel(self.width, self.height, Rgb([shade, 64, 255 - shade]));
            callback(frame_number, image)?;
        }
        Ok(())
    }
}

// ── FakeRunner ─────────────────────────────────────────────────────

#[derive(Default)]
struct RunnerState {
    commands: Vec<ToolCommand>,
    piped_bytes: Vec<usize>,
    exit_codes: VecDeque<i32>,
    missing: bool,
}

/// Records commands instead of running them.
///
/// `magick compare a b out` and piped `ffmpeg` runs create their `.png`
/// outputs so later stages find files on disk. Clones share state.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command fails to start with `ToolNotFound`.
    pub fn missing_tools() -> Self {
        let runner = Self::default();
        runner.state.lock().unwrap().missing = true;
        runner
    }

    /// Exit codes returned by the next commands, in order; then 0.
    pub fn with_exit_codes<I: IntoIterator<Item = i32>>(self, codes: I) -> Self {
        self.state.lock().unwrap().exit_codes.extend(codes);
        self
    }

    pub fn commands(&self) -> Vec<ToolCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Bytes written to stdin by each piped run.
    pub fn piped_bytes(&self) -> Vec<usize> {
        self.state.lock().unwrap().piped_bytes.clone()
    }

    fn record(&self, command: &ToolCommand) -> Result<ToolStatus, ComparisonError> {
        let mut state = self.state.lock().unwrap();
        if state.missing {
            return Err(ComparisonError::ToolNotFound {
                tool: command.program.clone(),
            });
        }
        state.commands.push(command.clone());
        let code = state.exit_codes.pop_front().unwrap_or(0);
        Ok(ToolStatus::exited(code))
    }
}

fn write_placeholder_png(path: &Path) {
    RgbImage::from_pixel(2, 2, Rgb([128, 128, 128]))
        .save(path)
        .unwrap();
}

impl ToolRunner for FakeRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolStatus, ComparisonError> {
        let status = self.record(command)?;
        if command.args.len() == 4 && command.args[0] == "compare" {
            write_placeholder_png(Path::new(&command.args[3]));
        }
        Ok(status)
    }

    fn run_piped(
        &self,
        command: &ToolCommand,
        feed: &mut StdinFeed<'_>,
    ) -> Result<ToolStatus, ComparisonError> {
        let status = self.record(command)?;

        let mut stdin = Vec::new();
        feed(&mut stdin)?;
        self.state.lock().unwrap().piped_bytes.push(stdin.len());

        // image2 reads `%%` in an output name as a literal `%`.
        for output in command.args.iter().filter(|arg| arg.ends_with(".png")) {
            write_placeholder_png(Path::new(&output.replace("%%", "%")));
        }
        Ok(status)
    }
}

// ── FakeHost ───────────────────────────────────────────────────────

/// Accepts every upload and keeps the last batch.
#[derive(Clone, Default)]
pub struct FakeHost {
    batches: Arc<Mutex<Vec<ComparisonBatch>>>,
}

impl FakeHost {
    pub fn batches(&self) -> Vec<ComparisonBatch> {
        self.batches.lock().unwrap().clone()
    }
}

impl ComparisonHost for FakeHost {
    fn submit(&self, batch: &ComparisonBatch) -> Result<String, ComparisonError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok("TeStId42".to_string())
    }

    fn comparison_url(&self, id: &str) -> String {
        format!("https://slow.pics/c/{id}")
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// File names of `paths`, for readable assertions.
pub fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}
