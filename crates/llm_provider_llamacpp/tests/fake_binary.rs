#![cfg(unix)]

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use llm_provider::{
    cancel_signal, GenerationError, GenerationRequest, GenerationStatus, Generator, Message,
};
use llm_provider_llamacpp::{LlamaCppConfig, LlamaCppGenerator};
use pretty_assertions::assert_eq;
use reasoner::{NullSink, ReasoningController, ReasoningRequest, ReasoningSettings, Strategy};

const ECHO_LLAMA: &str = r#"#!/bin/sh
prompt=""
while [ $# -gt 0 ]; do
  case "$1" in
    -p) prompt="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "llama_model_loader: loaded meta data with 24 key-value pairs"
printf '%s' "$prompt"
echo " <think>2 plus 2</think>The answer is 4."
echo "llama_perf_context_print: total time = 10 ms"
"#;

const ARGS_LLAMA: &str = r#"#!/bin/sh
for arg in "$@"; do echo "[$arg]"; done
"#;

const SLOW_LLAMA: &str = r#"#!/bin/sh
echo "Assistant: partial"
exec sleep 5
"#;

const FAILING_LLAMA: &str = r#"#!/bin/sh
echo "error: unable to load model" 1>&2
exit 1
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

// Every test reaches this before spawning, so no fork can inherit a
// half-written script and fail with ETXTBSY.
fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        for (name, body) in [
            ("echo-llama", ECHO_LLAMA),
            ("args-llama", ARGS_LLAMA),
            ("slow-llama", SLOW_LLAMA),
            ("failing-llama", FAILING_LLAMA),
        ] {
            install_script(&root, name, body);
        }
        Fixture { _dir: dir, root }
    })
}

fn install_script(root: &Path, name: &str, body: &str) {
    let path = root.join(name);
    let mut file = File::create(&path).expect("create script");
    file.write_all(body.as_bytes()).expect("write script");
    file.sync_all().expect("sync script");
    drop(file);
    let mut permissions = fs::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod");
}

fn generator(script: &str) -> LlamaCppGenerator {
    let config = LlamaCppConfig::new(fixture().root.join(script), "/models/tiny.gguf")
        .with_timeout(Duration::from_secs(10))
        .with_grace_period(Duration::from_millis(200));
    LlamaCppGenerator::new(config).expect("valid config")
}

fn request(stream: bool) -> GenerationRequest {
    GenerationRequest::new(vec![Message::system("S"), Message::user("What is 2+2?")])
        .with_stream(stream)
}

fn run(generator: &LlamaCppGenerator, req: &GenerationRequest) -> (String, GenerationStatus) {
    let cancel = cancel_signal();
    let mut text = String::new();
    let status = generator
        .generate(req, &cancel, &mut |chunk| text.push_str(chunk))
        .expect("generation should succeed");
    (text, status)
}

#[test]
fn streaming_forwards_echoed_prompt_and_completion() {
    let (text, status) = run(&generator("echo-llama"), &request(true));

    assert_eq!(status, GenerationStatus::Completed);
    assert_eq!(
        text,
        "llama_model_loader: loaded meta data with 24 key-value pairs\n\
         System: S\n\nUser: What is 2+2?\n\nAssistant: <think>2 plus 2</think>The answer is 4.\n\
         llama_perf_context_print: total time = 10 ms\n"
    );
}

#[test]
fn batch_mode_emits_the_same_text() {
    let generator = generator("echo-llama");
    let (streamed, _) = run(&generator, &request(true));
    let (batched, status) = run(&generator, &request(false));

    assert_eq!(status, GenerationStatus::Completed);
    assert_eq!(batched, streamed);
}

#[test]
fn prompt_and_sampling_settings_reach_the_binary() {
    let req = request(true).with_temperature(0.5).with_max_tokens(64);
    let (text, _) = run(&generator("args-llama"), &req);

    assert_eq!(
        text,
        "[-m]\n[/models/tiny.gguf]\n[-p]\n[System: S\n\nUser: What is 2+2?\n\nAssistant:]\n\
         [-n]\n[64]\n[--temp]\n[0.5]\n[-ngl]\n[0]\n[-e]\n"
    );
}

#[test]
fn timeout_returns_partial_output_with_status() {
    let config = LlamaCppConfig::new(fixture().root.join("slow-llama"), "/models/tiny.gguf")
        .with_timeout(Duration::from_millis(400))
        .with_grace_period(Duration::from_millis(200));
    let generator = LlamaCppGenerator::new(config).expect("valid config");
    let started = Instant::now();

    let (text, status) = run(&generator, &request(true));

    assert_eq!(status, GenerationStatus::TimedOut);
    assert_eq!(text, "Assistant: partial\n");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn cancel_stops_generation() {
    let generator = generator("slow-llama");
    let cancel = cancel_signal();
    let trigger = cancel.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        trigger.store(true, Ordering::Release);
    });

    let mut text = String::new();
    let status = generator
        .generate(&request(true), &cancel, &mut |chunk| text.push_str(chunk))
        .expect("cancel is not an error");
    handle.join().expect("trigger thread");

    assert_eq!(status, GenerationStatus::Cancelled);
    assert_eq!(text, "Assistant: partial\n");
}

#[test]
fn silent_failure_is_a_protocol_error() {
    let cancel = cancel_signal();
    let error = generator("failing-llama")
        .generate(&request(true), &cancel, &mut |_| {})
        .expect_err("exit 1 with no output must fail");

    assert!(matches!(error, GenerationError::Protocol(message) if message.contains("no output")));
}

#[test]
fn merged_stderr_surfaces_the_failure_text() {
    let config = LlamaCppConfig::new(fixture().root.join("failing-llama"), "/models/tiny.gguf")
        .with_merged_stderr(true);
    let (text, status) = run(&LlamaCppGenerator::new(config).expect("valid config"), &request(true));

    assert_eq!(status, GenerationStatus::Completed);
    assert_eq!(text, "error: unable to load model\n");
}

#[test]
fn missing_binary_is_a_launch_failure() {
    let _ = fixture();
    let generator = LlamaCppGenerator::new(LlamaCppConfig::new(
        "/definitely/not/llama-cli",
        "/models/tiny.gguf",
    ))
    .expect("valid config");
    let cancel = cancel_signal();

    let error = generator
        .generate(&request(true), &cancel, &mut |_| {})
        .expect_err("launch must fail");

    assert!(matches!(error, GenerationError::ProcessLaunchFailure { .. }));
}

fn echo_controller() -> ReasoningController {
    ReasoningController::new(
        Arc::new(generator("echo-llama")),
        ReasoningSettings::default().with_system_prompt("S"),
    )
    .expect("valid settings")
}

#[test]
fn follow_up_question_answers_without_echoed_history() {
    let history = vec![Message::user("hi"), Message::assistant("Hello!")];

    let result = echo_controller()
        .single(
            &ReasoningRequest::new("What is 2+2?").with_history(&history),
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("single shot succeeds");

    assert_eq!(result.final_answer, "The answer is 4.");
    assert_eq!(result.thinking, "2 plus 2");
    assert!(!result.used_fallback);
}

#[test]
fn verification_rounds_read_only_the_completion() {
    let result = echo_controller()
        .run(
            Strategy::Verify { max_iterations: 2 },
            &ReasoningRequest::new("What is 2+2?").with_temperature(0.5),
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("verify succeeds");

    assert_eq!(result.final_answer, "The answer is 4.");
    assert_eq!(result.iterations, 2);
    assert_eq!(result.status, GenerationStatus::Completed);
}
