//! End-to-end comparison runs with synthetic clips, a recording tool runner
//! and an in-memory upload host.

mod common;

use std::fs;

use common::{FakeHost, FakeRunner, SyntheticClip, file_names};
use framecomp::{CompOptions, Comparison, ComparisonError, NamedClip, Writer, upload::shortcut_contents};

fn two_clips(length: u64) -> Vec<NamedClip> {
    vec![
        SyntheticClip::new(length).named("source"),
        SyntheticClip::new(length).named("encode"),
    ]
}

// ── Validation ─────────────────────────────────────────────────────

#[test]
fn duplicate_clip_names_are_rejected() {
    let clips = vec![
        SyntheticClip::new(10).named("encode"),
        SyntheticClip::new(10).named("encode"),
    ];
    assert!(matches!(
        Comparison::new(clips),
        Err(ComparisonError::DuplicateClipName(name)) if name == "encode"
    ));
}

#[test]
fn unequal_clips_are_rejected_up_front() {
    let clips = vec![
        SyntheticClip::new(10).named("source"),
        SyntheticClip::new(11).named("encode"),
    ];
    assert!(matches!(
        Comparison::new(clips),
        Err(ComparisonError::ClipLengthMismatch { .. })
    ));
}

#[test]
fn clip_names_must_be_directory_names() {
    for name in ["", "..", "a/b"] {
        assert!(matches!(
            NamedClip::new(name, SyntheticClip::new(10)),
            Err(ComparisonError::InvalidClipName(_))
        ));
    }
}

#[test]
fn diffing_three_clips_fails_before_anything_is_written() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let clips = vec![
        SyntheticClip::new(100).named("a"),
        SyntheticClip::new(100).named("b"),
        SyntheticClip::new(100).named("c"),
    ];
    let runner = FakeRunner::new();
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(5)
        .with_diff(true)
        .with_seed(1);

    let result = Comparison::new(clips)
        .unwrap()
        .with_runner(runner.clone())
        .run(&options);

    assert!(matches!(
        result,
        Err(ComparisonError::DiffRequiresTwoClips { clip_count: 3 })
    ));
    assert!(!root.exists());
    assert!(runner.commands().is_empty());
}

#[test]
fn existing_output_root_fails_before_extraction() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    fs::create_dir(&root).unwrap();

    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(5)
        .with_seed(1);
    let result = Comparison::new(two_clips(100)).unwrap().run(&options);

    assert!(matches!(result, Err(ComparisonError::OutputExists { path }) if path == root));
    assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
}

#[test]
fn selection_errors_leave_no_output_behind() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(20)
        .with_seed(1);

    let result = Comparison::new(two_clips(10)).unwrap().run(&options);

    assert!(matches!(result, Err(ComparisonError::SampleCountTooLarge { .. })));
    assert!(!root.exists());
}

// ── Extraction ─────────────────────────────────────────────────────

#[test]
fn plain_run_writes_one_padded_png_per_frame_and_clip() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(5)
        .with_seed(42);

    let report = Comparison::new(two_clips(100)).unwrap().run(&options).unwrap();

    assert_eq!(report.selection.len(), 5);
    assert!(report.diffs.is_none());
    assert!(report.url.is_none());
    assert!(!root.join("slow.pics.url").exists());

    let width = report.selection.pad_width();
    assert!(width <= 2);
    for (images, name) in report.images.iter().zip(["source", "encode"]) {
        assert_eq!(images.name, name);
        let expected: Vec<String> = report
            .selection
            .frames()
            .iter()
            .map(|frame| format!("{name}_{frame:0width$}.png"))
            .collect();
        assert_eq!(file_names(&images.paths), expected);

        let on_disk = framecomp::list_png_files(&root.join(name)).unwrap();
        assert_eq!(on_disk, images.paths);
    }
}

#[test]
fn pattern_writer_produces_the_same_layout() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(0)
        .with_extra_frames([3, 250])
        .with_writer(Writer::PatternWrite);

    let report = Comparison::new(two_clips(300)).unwrap().run(&options).unwrap();

    assert_eq!(
        file_names(&report.images[0].paths),
        ["source_003.png", "source_250.png"]
    );
    let decoded = image::open(&report.images[1].paths[1]).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (8, 4));
    assert_eq!(decoded.get_pixel(0, 0).0, [250, 64, 5]);
}

#[test]
fn ffmpeg_writer_pipes_every_selected_frame() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let runner = FakeRunner::new();
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(4)
        .with_writer(Writer::FfmpegPipe)
        .with_seed(9);

    let clips = vec![
        SyntheticClip::new(60).with_dimensions(16, 10).named("source"),
        SyntheticClip::new(60).with_dimensions(16, 10).named("encode"),
    ];
    let report = Comparison::new(clips)
        .unwrap()
        .with_runner(runner.clone())
        .run(&options)
        .unwrap();

    assert_eq!(runner.commands().len(), 2);
    assert_eq!(runner.piped_bytes(), vec![16 * 10 * 3 * 4, 16 * 10 * 3 * 4]);
    for images in &report.images {
        assert_eq!(images.paths.len(), 4);
        assert!(images.paths.iter().all(|path| path.is_file()));
    }
}

// ── Diff and upload ────────────────────────────────────────────────

#[test]
fn diff_and_upload_build_the_full_batch() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let runner = FakeRunner::new().with_exit_codes([0, 1, 0, 1, 1, 0]);
    let host = FakeHost::default();
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(5)
        .with_diff(true)
        .with_upload(true)
        .with_collection_name("Episode 01")
        .with_public(false)
        .with_seed(3);

    let report = Comparison::new(two_clips(100))
        .unwrap()
        .with_runner(runner.clone())
        .with_host(host.clone())
        .run(&options)
        .unwrap();

    let frames = report.selection.frames().to_vec();
    let diffs = report.diffs.as_ref().unwrap();
    assert_eq!(diffs.paths.len(), frames.len());
    assert!(diffs.paths.iter().all(|path| path.starts_with(root.join("diffs"))));

    let commands = runner.commands();
    assert_eq!(commands[0].args, ["compare"]);
    assert_eq!(commands.len(), 1 + frames.len());

    let batches = host.batches();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.file_count(), 3 * frames.len());
    assert_eq!(batch.text("collectionName"), Some("Episode 01"));
    assert_eq!(batch.text("public"), Some("false"));
    assert_eq!(batch.text("optimizeImages"), Some("true"));
    assert_eq!(batch.text("comparisons[0].images[2].name"), Some("diff"));

    let url = report.url.as_deref().unwrap();
    assert_eq!(url, "https://slow.pics/c/TeStId42");
    let shortcut = report.shortcut.as_ref().unwrap();
    assert_eq!(shortcut, &root.join("slow.pics.url"));
    assert_eq!(fs::read_to_string(shortcut).unwrap(), shortcut_contents(url));
}

#[test]
fn failed_diff_stops_before_upload() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("comps");
    let runner = FakeRunner::new().with_exit_codes([0, 0, 2]);
    let host = FakeHost::default();
    let options = CompOptions::new()
        .with_output_path(&root)
        .with_sample_count(3)
        .with_diff(true)
        .with_upload(true)
        .with_seed(3);

    let result = Comparison::new(two_clips(100))
        .unwrap()
        .with_runner(runner)
        .with_host(host.clone())
        .run(&options);

    assert!(matches!(result, Err(ComparisonError::ToolFailed { .. })));
    assert!(host.batches().is_empty());
    assert!(root.join("source").is_dir());
}
