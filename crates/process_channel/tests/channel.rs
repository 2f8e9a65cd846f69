#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use process_channel::{
    run_batch, stream_lines, ChannelError, ChannelOptions, CommandSpec, Completion, StderrMode,
};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

fn quick_options() -> ChannelOptions {
    ChannelOptions::default()
        .with_timeout(Duration::from_secs(10))
        .with_grace_period(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(10))
}

fn collect_stream(spec: &CommandSpec, options: &ChannelOptions, cancel: &AtomicBool) -> (Vec<String>, Completion) {
    let mut lines = Vec::new();
    let completion = stream_lines(spec, options, cancel, &mut |line| lines.push(line.to_string()))
        .expect("stream should run");
    (lines, completion)
}

fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("{body}\n")).expect("write script");
    path
}

#[test]
fn streams_lines_in_order_and_reports_exit_status() {
    let cancel = AtomicBool::new(false);
    let (lines, completion) = collect_stream(&sh("printf 'a\\nb\\nc'"), &quick_options(), &cancel);

    assert_eq!(lines, vec!["a\n", "b\n", "c"]);
    assert!(matches!(completion, Completion::Exited(status) if status.success()));
}

#[test]
fn stdin_is_closed_immediately() {
    let cancel = AtomicBool::new(false);
    let (lines, completion) = collect_stream(
        &sh("if read line; then echo got-input; else echo eof; fi"),
        &quick_options(),
        &cancel,
    );

    assert_eq!(lines, vec!["eof\n"]);
    assert!(completion.exit_status().is_some());
}

#[test]
fn stderr_is_discarded_unless_merged() {
    let cancel = AtomicBool::new(false);
    let script = "echo out; echo err 1>&2";

    let (discarded, _) = collect_stream(&sh(script), &quick_options(), &cancel);
    assert_eq!(discarded, vec!["out\n"]);

    let (mut merged, _) = collect_stream(
        &sh(script).stderr(StderrMode::Merge),
        &quick_options(),
        &cancel,
    );
    merged.sort();
    assert_eq!(merged, vec!["err\n", "out\n"]);
}

#[test]
fn timeout_keeps_lines_delivered_before_the_cutoff() {
    let cancel = AtomicBool::new(false);
    let options = quick_options().with_timeout(Duration::from_millis(400));
    let started = Instant::now();

    let (lines, completion) = collect_stream(&sh("echo first; exec sleep 5"), &options, &cancel);

    assert_eq!(completion, Completion::TimedOut);
    assert_eq!(lines, vec!["first\n"]);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn cancel_flag_stops_a_running_stream() {
    let cancel = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&cancel);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        trigger.store(true, Ordering::Release);
    });

    let started = Instant::now();
    let (lines, completion) =
        collect_stream(&sh("echo partial; exec sleep 5"), &quick_options(), &cancel);
    handle.join().expect("trigger thread");

    assert_eq!(completion, Completion::Cancelled);
    assert_eq!(lines, vec!["partial\n"]);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn pre_raised_cancel_never_spawns() {
    let cancel = AtomicBool::new(true);
    let (lines, completion) = collect_stream(
        &CommandSpec::new("/definitely/not/a/real/binary"),
        &quick_options(),
        &cancel,
    );
    assert!(lines.is_empty());
    assert_eq!(completion, Completion::Cancelled);
}

#[test]
fn missing_binary_is_a_launch_failure() {
    let cancel = AtomicBool::new(false);
    let error = stream_lines(
        &CommandSpec::new("/definitely/not/a/real/binary"),
        &quick_options(),
        &cancel,
        &mut |_| {},
    )
    .expect_err("launch must fail");

    assert!(matches!(error, ChannelError::Launch { .. }));
    assert_eq!(error.program(), "/definitely/not/a/real/binary");
}

#[test]
fn batch_collects_full_output() {
    let cancel = AtomicBool::new(false);
    let output = run_batch(&sh("echo one; echo two"), &quick_options(), &cancel)
        .expect("batch should run");

    assert_eq!(output.text, "one\ntwo\n");
    assert!(output.success());
}

#[test]
fn batch_reports_failing_exit_status() {
    let cancel = AtomicBool::new(false);
    let output = run_batch(&sh("echo oops; exit 3"), &quick_options(), &cancel)
        .expect("batch should run");

    assert_eq!(output.text, "oops\n");
    assert!(!output.success());
    assert_eq!(output.completion.exit_status().and_then(|s| s.code()), Some(3));
}

#[test]
fn batch_timeout_returns_buffered_output() {
    let cancel = AtomicBool::new(false);
    let options = quick_options().with_timeout(Duration::from_millis(400));

    let output = run_batch(&sh("echo partial; exec sleep 5"), &options, &cancel)
        .expect("batch should run");

    assert_eq!(output.completion, Completion::TimedOut);
    assert_eq!(output.text, "partial\n");
}

#[test]
fn batch_merges_stderr_after_stdout() {
    let cancel = AtomicBool::new(false);
    let output = run_batch(
        &sh("echo err 1>&2; echo out").stderr(StderrMode::Merge),
        &quick_options(),
        &cancel,
    )
    .expect("batch should run");

    assert_eq!(output.text, "out\nerr\n");
}

#[test]
fn process_ignoring_terminate_is_killed_after_grace_period() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        &dir,
        "stubborn.sh",
        "trap '' TERM\necho ready\nwhile true; do sleep 0.05; done",
    );
    let cancel = AtomicBool::new(false);
    let options = quick_options()
        .with_timeout(Duration::from_millis(300))
        .with_grace_period(Duration::from_millis(200));
    let started = Instant::now();

    let (lines, completion) = collect_stream(&CommandSpec::new("sh").arg(&script), &options, &cancel);

    assert_eq!(completion, Completion::TimedOut);
    assert_eq!(lines, vec!["ready\n"]);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn script_arguments_reach_the_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(&dir, "echo_args.sh", "for arg in \"$@\"; do echo \"[$arg]\"; done");
    let cancel = AtomicBool::new(false);

    let output = run_batch(
        &CommandSpec::new("sh")
            .arg(&script)
            .args(["-p", "System: S\n\nUser: Q"]),
        &quick_options(),
        &cancel,
    )
    .expect("batch should run");

    assert_eq!(output.text, "[-p]\n[System: S\n\nUser: Q]\n");
}
