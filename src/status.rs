//! `orin status`: resolved settings plus a generator probe.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use reasoner::{NullSink, ReasoningController, ReasoningError, ReasoningRequest, ReasoningResult};

use crate::config::{BackendKind, OrinConfig};
use crate::interrupt::InterruptGuard;
use crate::terminal::Style;

pub const PROBE_QUESTION: &str = "Hello";
pub const PROBE_TEMPERATURE: f32 = 0.1;

#[must_use]
pub fn render_config(config: &OrinConfig, source: Option<&Path>) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Config:       {}",
        source.map_or_else(|| "built-in defaults".to_string(), |path| path.display().to_string())
    ));
    lines.push(format!("Backend:      {}", config.backend.as_str()));
    match config.backend {
        BackendKind::LlamaCpp => {
            lines.push(format!("Binary:       {}", config.llamacpp.binary_path.display()));
            lines.push(format!("Model:        {}", config.llamacpp.model_path.display()));
            lines.push(format!(
                "Context:      {}",
                config
                    .llamacpp
                    .context_size
                    .map_or_else(|| "model default".to_string(), |size| size.to_string())
            ));
            lines.push(format!("GPU layers:   {}", config.llamacpp.gpu_layers));
        }
        BackendKind::Ollama => {
            lines.push(format!("Server:       {}", config.ollama.base_url));
            lines.push(format!("Model:        {}", config.ollama.model));
            lines.push(format!("Endpoint:     {}", config.ollama.endpoint));
        }
        BackendKind::Mock => lines.push("Model:        echo".to_string()),
    }
    lines.push(format!("Temperature:  {}", config.generation.temperature));
    lines.push(format!("Max tokens:   {}", config.generation.max_tokens));
    lines.push(format!("Streaming:    {}", config.generation.stream));
    lines.push(format!(
        "Voting:       {} samples at temperature {}",
        config.reasoning.vote_samples, config.reasoning.vote_temperature
    ));
    lines.push(format!(
        "Verify:       up to {} rounds, temperature x{}",
        config.reasoning.max_verify_iterations, config.reasoning.verify_temperature_factor
    ));
    lines.push(format!("Session logs: {}", config.session_dir.display()));
    lines.join("\n")
}

/// Sends a tiny request and reports how long it took.
pub fn probe(
    controller: &ReasoningController,
    interrupt: &InterruptGuard,
) -> Result<(ReasoningResult, Duration), ReasoningError> {
    let started = Instant::now();
    let request = ReasoningRequest::new(PROBE_QUESTION).with_temperature(PROBE_TEMPERATURE);
    let result = controller.single(&request, interrupt.cancel(), &mut NullSink)?;
    Ok((result, started.elapsed()))
}

/// Prints settings and probe results. A failed probe is reported, not
/// returned as an error.
pub fn run_status(
    config: &OrinConfig,
    source: Option<&Path>,
    controller: Result<&ReasoningController, String>,
    interrupt: &InterruptGuard,
    style: &Style,
    out: &mut dyn Write,
) -> Result<bool> {
    writeln!(out, "{}", style.header("Orin status"))?;
    writeln!(out, "{}", render_config(config, source))?;

    let controller = match controller {
        Ok(controller) => controller,
        Err(reason) => {
            writeln!(out, "{}", style.error(&format!("Generator: unavailable ({reason})")))?;
            return Ok(false);
        }
    };
    let profile = controller.profile();
    writeln!(out, "Generator:    {} ({})", profile.generator_id, profile.model_id)?;

    match probe(controller, interrupt) {
        Ok((result, elapsed)) if result.is_complete() && !result.final_answer.is_empty() => {
            let line = format!("Probe:        ok in {:.1}s", elapsed.as_secs_f64());
            writeln!(out, "{}", style.success(&line))?;
            Ok(true)
        }
        Ok((result, _)) => {
            let line = format!(
                "Probe:        no answer (status {})",
                result.status.as_str()
            );
            writeln!(out, "{}", style.warning(&line))?;
            Ok(false)
        }
        Err(error) => {
            writeln!(out, "{}", style.error(&format!("Probe:        failed: {error}")))?;
            Ok(false)
        }
    }
}
