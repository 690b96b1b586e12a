//! Diff generation against a recording tool runner.

mod common;

use std::{
    fs,
    path::{Path, PathBuf},
};

use common::{FakeRunner, file_names};
use framecomp::{ClipImages, ComparisonError, DiffGenerator, FrameSelection};

fn images(root: &Path, name: &str, frames: &[u64]) -> ClipImages {
    let paths = frames
        .iter()
        .map(|frame| root.join(name).join(format!("{name}_{frame:02}.png")))
        .collect();
    ClipImages::new(name, paths)
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: PathBuf,
    selection: FrameSelection,
    first: ClipImages,
    second: ClipImages,
}

fn fixture() -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().to_path_buf();
    let frames = [3, 14, 15];
    Fixture {
        selection: FrameSelection::from_frames(frames).unwrap(),
        first: images(&root, "source", &frames),
        second: images(&root, "encode", &frames),
        root,
        _temp: temp,
    }
}

#[test]
fn compare_commands_pair_images_by_position() {
    let fixture = fixture();
    let runner = FakeRunner::new();
    let output_dir = fixture.root.join("diffs");
    let mut finished = Vec::new();

    let outputs = DiffGenerator::new("magick")
        .generate(
            &runner,
            &fixture.first,
            &fixture.second,
            &fixture.selection,
            &output_dir,
            &mut |frame| finished.push(frame),
        )
        .unwrap();

    assert_eq!(file_names(&outputs), ["diff_03.png", "diff_14.png", "diff_15.png"]);
    assert_eq!(finished, [3, 14, 15]);

    let commands = runner.commands();
    assert_eq!(commands.len(), 4);
    assert_eq!(commands[0].program, "magick");
    assert_eq!(commands[0].args, ["compare"]);
    for (index, command) in commands[1..].iter().enumerate() {
        let expected = DiffGenerator::new("magick").compare_command(
            &fixture.first.paths[index],
            &fixture.second.paths[index],
            &outputs[index],
        );
        assert_eq!(*command, expected);
    }
}

#[test]
fn differing_images_are_not_a_failure() {
    let fixture = fixture();
    let runner = FakeRunner::new().with_exit_codes([1, 1, 1, 1]);

    let result = DiffGenerator::new("magick").generate(
        &runner,
        &fixture.first,
        &fixture.second,
        &fixture.selection,
        &fixture.root.join("diffs"),
        &mut |_| {},
    );
    assert_eq!(result.unwrap().len(), 3);
}

#[test]
fn compare_errors_surface_after_every_pair_ran() {
    let fixture = fixture();
    let runner = FakeRunner::new().with_exit_codes([0, 2, 0, 0]);
    let mut finished = Vec::new();

    let result = DiffGenerator::new("magick").generate(
        &runner,
        &fixture.first,
        &fixture.second,
        &fixture.selection,
        &fixture.root.join("diffs"),
        &mut |frame| finished.push(frame),
    );

    match result {
        Err(ComparisonError::ToolFailed { command, status }) => {
            assert!(command.contains("source_03.png"));
            assert_eq!(status, "exit code 2");
        }
        other => panic!("expected ToolFailed, got {other:?}"),
    }
    assert_eq!(runner.commands().len(), 4);
    assert_eq!(finished, [14, 15]);
}

#[test]
fn missing_magick_fails_before_creating_the_directory() {
    let fixture = fixture();
    let output_dir = fixture.root.join("diffs");

    let result = DiffGenerator::new("magick").generate(
        &FakeRunner::missing_tools(),
        &fixture.first,
        &fixture.second,
        &fixture.selection,
        &output_dir,
        &mut |_| {},
    );

    assert!(matches!(result, Err(ComparisonError::ToolNotFound { tool }) if tool == "magick"));
    assert!(!output_dir.exists());
}

#[test]
fn existing_diff_directory_is_rejected() {
    let fixture = fixture();
    let output_dir = fixture.root.join("diffs");
    fs::create_dir(&output_dir).unwrap();
    let runner = FakeRunner::new();

    let result = DiffGenerator::new("magick").generate(
        &runner,
        &fixture.first,
        &fixture.second,
        &fixture.selection,
        &output_dir,
        &mut |_| {},
    );

    assert!(matches!(result, Err(ComparisonError::OutputExists { .. })));
    assert_eq!(runner.commands().len(), 1);
}

#[test]
fn image_lists_must_match_the_selection() {
    let fixture = fixture();
    let short = ClipImages::new("encode", fixture.second.paths[..2].to_vec());

    let result = DiffGenerator::new("magick").generate(
        &FakeRunner::new(),
        &fixture.first,
        &short,
        &fixture.selection,
        &fixture.root.join("diffs"),
        &mut |_| {},
    );

    assert!(matches!(
        result,
        Err(ComparisonError::ImageCountMismatch { expected: 3, found: 2, .. })
    ));
}
