//! Extraction backend tests.

mod common;

use std::path::{Path, PathBuf};

use common::{FakeRunner, SyntheticClip, file_names};
use framecomp::{
    ComparisonError, ExtractionJob, FfmpegPipeWriter, FrameWriter, ImageSaveWriter,
    PatternWriter, RgbConversion, Writer, diff_image_path, extracted_image_path,
};

fn job<'a>(frames: &'a [u64], output_dir: &'a Path, conversion: &'a RgbConversion) -> ExtractionJob<'a> {
    ExtractionJob {
        frames,
        output_dir,
        pad_width: framecomp::digit_count(*frames.last().unwrap()),
        conversion,
    }
}

// ── Paths ──────────────────────────────────────────────────────────

#[test]
fn image_paths_are_zero_padded() {
    let root = Path::new("comps");
    assert_eq!(
        extracted_image_path(root, "encode", 42, 5),
        PathBuf::from("comps/encode/encode_00042.png")
    );
    assert_eq!(
        diff_image_path(root, 7, 3),
        PathBuf::from("comps/diffs/diff_007.png")
    );
}

#[test]
fn percent_signs_in_clip_names_reach_the_deterministic_paths() {
    let temp = tempfile::tempdir().unwrap();
    let conversion = RgbConversion::auto();
    let frames = [5, 40];
    let name = "x264%d";
    let output_dir = temp.path().join(name);
    std::fs::create_dir(&output_dir).unwrap();
    let expected: Vec<PathBuf> = frames
        .iter()
        .map(|&frame| extracted_image_path(temp.path(), name, frame, 2))
        .collect();

    let writers: [&dyn FrameWriter; 3] = [
        &FfmpegPipeWriter::new("ffmpeg"),
        &PatternWriter,
        &ImageSaveWriter,
    ];
    for writer in writers {
        let runner = FakeRunner::new();
        let mut clip = SyntheticClip::new(50).named(name);
        let paths = writer
            .write_frames(&mut clip, &job(&frames, &output_dir, &conversion), &runner, &mut |_| {})
            .unwrap();

        assert_eq!(paths, expected);
        assert!(expected.iter().all(|path| path.is_file()));
        for path in &expected {
            std::fs::remove_file(path).unwrap();
        }
    }
    assert_eq!(file_names(&expected), ["x264%d_05.png", "x264%d_40.png"]);
}

// ── FfmpegPipeWriter ───────────────────────────────────────────────

#[test]
fn ffmpeg_command_cuts_one_second_per_frame() {
    let writer = FfmpegPipeWriter::new("/opt/ffmpeg/bin/ffmpeg");
    let outputs = [PathBuf::from("out/a_05.png"), PathBuf::from("out/a_19.png")];
    let command = writer.command(1920, 1080, &outputs);

    assert_eq!(command.program, "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(
        command.args,
        [
            "-hide_banner", "-loglevel", "error", "-f", "rawvideo", "-video_size", "1920x1080",
            "-pixel_format", "gbrp", "-framerate", "1", "-i", "pipe:", "-pred", "mixed", "-ss",
            "0", "-t", "1", "out/a_05.png", "-pred", "mixed", "-ss", "1", "-t", "1",
            "out/a_19.png",
        ]
    );
}

#[test]
fn ffmpeg_outputs_with_percent_signs_are_escaped() {
    let temp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let mut clip = SyntheticClip::new(30).named("crf%05d");
    let conversion = RgbConversion::auto();

    FfmpegPipeWriter::new("ffmpeg")
        .write_frames(&mut clip, &job(&[5], temp.path(), &conversion), &runner, &mut |_| {})
        .unwrap();

    let command = &runner.commands()[0];
    let expected = format!("{}/crf%%05d_5.png", temp.path().display().to_string().replace('%', "%%"));
    assert_eq!(command.args.last(), Some(&expected));
    assert!(temp.path().join("crf%05d_5.png").is_file());
}

#[test]
fn ffmpeg_writer_feeds_planar_frames() {
    let temp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let mut clip = SyntheticClip::new(30).with_dimensions(6, 2).named("a");
    let conversion = RgbConversion::auto();
    let frames = [2, 11, 29];

    let mut written = Vec::new();
    let paths = FfmpegPipeWriter::new("ffmpeg")
        .write_frames(
            &mut clip,
            &job(&frames, temp.path(), &conversion),
            &runner,
            &mut |frame| written.push(frame),
        )
        .unwrap();

    assert_eq!(written, frames);
    assert_eq!(file_names(&paths), ["a_02.png", "a_11.png", "a_29.png"]);
    assert_eq!(runner.piped_bytes(), vec![6 * 2 * 3 * 3]);
}

#[test]
fn ffmpeg_writer_reports_a_failing_exit() {
    let temp = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new().with_exit_codes([1]);
    let mut clip = SyntheticClip::new(30).named("a");
    let conversion = RgbConversion::auto();

    let result = FfmpegPipeWriter::new("ffmpeg").write_frames(
        &mut clip,
        &job(&[4], temp.path(), &conversion),
        &runner,
        &mut |_| {},
    );
    assert!(matches!(result, Err(ComparisonError::ToolFailed { .. })));
}

#[test]
fn ffmpeg_writer_without_ffmpeg_is_tool_not_found() {
    let temp = tempfile::tempdir().unwrap();
    let mut clip = SyntheticClip::new(30).named("a");
    let conversion = RgbConversion::auto();

    let result = FfmpegPipeWriter::new("ffmpeg").write_frames(
        &mut clip,
        &job(&[4], temp.path(), &conversion),
        &FakeRunner::missing_tools(),
        &mut |_| {},
    );
    assert!(matches!(result, Err(ComparisonError::ToolNotFound { tool }) if tool == "ffmpeg"));
}

// ── In-process writers ─────────────────────────────────────────────

#[test]
fn in_process_writers_produce_identical_images() {
    let temp = tempfile::tempdir().unwrap();
    let conversion = RgbConversion::auto();
    let frames = [0, 9, 10];
    let pattern_dir = temp.path().join("pattern");
    let image_dir = temp.path().join("image");
    std::fs::create_dir(&pattern_dir).unwrap();
    std::fs::create_dir(&image_dir).unwrap();

    let mut clip = SyntheticClip::new(20).named("clip");
    let pattern_paths = PatternWriter
        .write_frames(&mut clip, &job(&frames, &pattern_dir, &conversion), &FakeRunner::new(), &mut |_| {})
        .unwrap();
    let image_paths = ImageSaveWriter
        .write_frames(&mut clip, &job(&frames, &image_dir, &conversion), &FakeRunner::new(), &mut |_| {})
        .unwrap();

    assert_eq!(file_names(&pattern_paths), ["clip_00.png", "clip_09.png", "clip_10.png"]);
    assert_eq!(file_names(&pattern_paths), file_names(&image_paths));
    for (a, b) in pattern_paths.iter().zip(&image_paths) {
        let a = image::open(a).unwrap().to_rgb8();
        let b = image::open(b).unwrap().to_rgb8();
        assert_eq!(a, b);
    }
}

#[test]
fn decode_errors_stop_extraction() {
    let temp = tempfile::tempdir().unwrap();
    let conversion = RgbConversion::auto();
    let mut clip = SyntheticClip::new(5).named("clip");

    let result = ImageSaveWriter.write_frames(
        &mut clip,
        &job(&[1, 7], temp.path(), &conversion),
        &FakeRunner::new(),
        &mut |_| {},
    );
    assert!(matches!(
        result,
        Err(ComparisonError::FrameOutOfRange { frame_number: 7, .. })
    ));
    assert!(temp.path().join("clip_1.png").is_file());
}

#[test]
fn every_writer_has_a_strategy() {
    let tools = framecomp::ToolPaths::default();
    for writer in Writer::ALL {
        let _strategy = writer.strategy(&tools);
    }
    assert_eq!(Writer::default(), Writer::ImageSave);
    assert_eq!(PatternWriter::pattern("src", 3), "src_%03d.png");
}
