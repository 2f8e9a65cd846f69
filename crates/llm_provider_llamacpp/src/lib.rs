//! `Generator` backed by a llama.cpp-style command-line binary.
//!
//! The prompt is passed as a command-line argument and the binary's stdout is
//! forwarded line by line. The binary echoes the prompt and prints runtime
//! diagnostics, so the profile advertises [`OutputShape::EchoedPrompt`].

use std::path::PathBuf;
use std::time::Duration;

use llm_provider::{
    build_prompt, CancelSignal, GenerationError, GenerationRequest, GenerationStatus, Generator,
    GeneratorInitError, GeneratorProfile, OutputShape,
};
use process_channel::{
    run_batch, stream_lines, ChannelError, ChannelOptions, CommandSpec, Completion, StderrMode,
};
use tracing::{debug, warn};

/// Stable generator identifier used by backend selection.
pub const LLAMACPP_GENERATOR_ID: &str = "llamacpp";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Process and model settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlamaCppConfig {
    pub binary_path: PathBuf,
    pub model_path: PathBuf,
    pub context_size: Option<u32>,
    pub thread_count: Option<u32>,
    pub batch_size: Option<u32>,
    pub use_memory_map: bool,
    pub gpu_layers: u32,
    pub timeout: Duration,
    pub grace_period: Duration,
    pub merge_stderr: bool,
}

impl LlamaCppConfig {
    #[must_use]
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            context_size: None,
            thread_count: None,
            batch_size: None,
            use_memory_map: true,
            gpu_layers: 0,
            timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            merge_stderr: false,
        }
    }

    #[must_use]
    pub fn with_context_size(mut self, context_size: u32) -> Self {
        self.context_size = Some(context_size);
        self
    }

    #[must_use]
    pub fn with_thread_count(mut self, thread_count: u32) -> Self {
        self.thread_count = Some(thread_count);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn with_memory_map(mut self, use_memory_map: bool) -> Self {
        self.use_memory_map = use_memory_map;
        self
    }

    #[must_use]
    pub fn with_gpu_layers(mut self, gpu_layers: u32) -> Self {
        self.gpu_layers = gpu_layers;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[must_use]
    pub fn with_merged_stderr(mut self, merge_stderr: bool) -> Self {
        self.merge_stderr = merge_stderr;
        self
    }

    fn channel_options(&self) -> ChannelOptions {
        ChannelOptions::default()
            .with_timeout(self.timeout)
            .with_grace_period(self.grace_period)
    }
}

/// Builds the full argument vector for one call.
#[must_use]
pub fn build_args(config: &LlamaCppConfig, prompt: &str, req: &GenerationRequest) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        config.model_path.display().to_string(),
        "-p".to_string(),
        prompt.to_string(),
        "-n".to_string(),
        req.max_tokens.to_string(),
        "--temp".to_string(),
        req.temperature.to_string(),
        "-ngl".to_string(),
        config.gpu_layers.to_string(),
        "-e".to_string(),
    ];
    if let Some(context_size) = config.context_size {
        args.extend(["-c".to_string(), context_size.to_string()]);
    }
    if let Some(thread_count) = config.thread_count {
        args.extend(["-t".to_string(), thread_count.to_string()]);
    }
    if let Some(batch_size) = config.batch_size {
        args.extend(["-b".to_string(), batch_size.to_string()]);
    }
    if !config.use_memory_map {
        args.push("--no-mmap".to_string());
    }
    args
}

pub struct LlamaCppGenerator {
    config: LlamaCppConfig,
    model_id: String,
}

impl LlamaCppGenerator {
    pub fn new(config: LlamaCppConfig) -> Result<Self, GeneratorInitError> {
        if config.binary_path.as_os_str().is_empty() {
            return Err(GeneratorInitError::new("llama.cpp binary path is empty"));
        }
        if config.model_path.as_os_str().is_empty() {
            return Err(GeneratorInitError::new("llama.cpp model path is empty"));
        }
        if config.timeout.is_zero() {
            return Err(GeneratorInitError::new("llama.cpp timeout must be positive"));
        }

        let model_id = config
            .model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.model_path.display().to_string());

        Ok(Self { config, model_id })
    }

    #[must_use]
    pub fn config(&self) -> &LlamaCppConfig {
        &self.config
    }

    fn command_spec(&self, req: &GenerationRequest) -> Result<CommandSpec, GenerationError> {
        let prompt = build_prompt(&req.messages)?;
        let stderr = if self.config.merge_stderr {
            StderrMode::Merge
        } else {
            StderrMode::Discard
        };
        Ok(CommandSpec::new(&self.config.binary_path)
            .args(build_args(&self.config, &prompt, req))
            .stderr(stderr))
    }
}

impl Generator for LlamaCppGenerator {
    fn profile(&self) -> GeneratorProfile {
        GeneratorProfile {
            generator_id: LLAMACPP_GENERATOR_ID.to_string(),
            model_id: self.model_id.clone(),
            output_shape: OutputShape::EchoedPrompt,
        }
    }

    fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(&str),
    ) -> Result<GenerationStatus, GenerationError> {
        req.validate()?;
        let spec = self.command_spec(req)?;
        let options = self.config.channel_options();
        debug!(
            model = %self.model_id,
            stream = req.stream,
            temperature = req.temperature,
            max_tokens = req.max_tokens,
            "starting llama.cpp generation"
        );

        let mut emitted = 0usize;
        let completion = if req.stream {
            stream_lines(&spec, &options, cancel, &mut |line| {
                emitted += line.len();
                emit(line);
            })
            .map_err(map_channel_error)?
        } else {
            let output = run_batch(&spec, &options, cancel).map_err(map_channel_error)?;
            for line in output.text.split_inclusive('\n') {
                emitted += line.len();
                emit(line);
            }
            output.completion
        };

        match completion {
            Completion::Exited(status) if status.success() => Ok(GenerationStatus::Completed),
            Completion::Exited(status) if emitted == 0 => Err(GenerationError::Protocol(format!(
                "llama.cpp exited with {status} and produced no output"
            ))),
            Completion::Exited(status) => {
                warn!(%status, bytes = emitted, "llama.cpp exited unsuccessfully after producing output");
                Ok(GenerationStatus::Completed)
            }
            Completion::TimedOut => Ok(GenerationStatus::TimedOut),
            Completion::Cancelled => Ok(GenerationStatus::Cancelled),
        }
    }
}

fn map_channel_error(error: ChannelError) -> GenerationError {
    match error {
        ChannelError::Launch { program, source } => GenerationError::launch(program, source),
        other => GenerationError::Transport(other.to_string()),
    }
}
