use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reasoner::ThinkingMode;

use crate::config::{BackendKind, OrinConfig};

#[derive(Debug, Parser)]
#[command(name = "orin")]
#[command(version, about = "Local reasoning assistant for llama.cpp and Ollama models")]
pub struct Cli {
    /// Path to a JSON config file (defaults to $ORIN_CONFIG, then ./orin.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Generator backend, overriding the config file
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Debug-level diagnostics on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer one question and exit
    Query(QueryArgs),

    /// Start a conversation
    #[command(alias = "chat")]
    Interactive(InteractiveArgs),

    /// Show the resolved configuration and probe the generator
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Method {
    #[default]
    Single,
    Vote,
    Verify,
}

impl Method {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Vote => "vote",
            Self::Verify => "verify",
        }
    }
}

/// Flags shared by one-shot and interactive runs.
#[derive(Debug, Clone, Default, Args)]
pub struct GenerationArgs {
    /// Sampling temperature
    #[arg(long, short = 't')]
    pub temperature: Option<f32>,

    /// Maximum tokens per generation
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Wait for the full output instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// When to display the model's reasoning
    #[arg(long, value_parser = parse_thinking_mode, default_value = "auto")]
    pub show_thinking: ThinkingMode,
}

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// The question to answer
    pub question: String,

    /// Reasoning strategy
    #[arg(long, short = 'm', value_enum, default_value_t = Method::Single)]
    pub method: Method,

    /// Samples for `--method vote`
    #[arg(long, short = 'n')]
    pub samples: Option<usize>,

    /// Verification rounds for `--method verify`
    #[arg(long)]
    pub max_iterations: Option<usize>,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct InteractiveArgs {
    #[command(flatten)]
    pub generation: GenerationArgs,
}

fn parse_thinking_mode(value: &str) -> Result<ThinkingMode, String> {
    ThinkingMode::parse(value)
        .ok_or_else(|| format!("expected auto, always or never, got '{value}'"))
}

impl Cli {
    /// Applies flags that override file and environment settings.
    pub fn apply_overrides(&self, config: &mut OrinConfig) {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        let generation = match &self.command {
            Command::Query(args) => {
                if let Some(samples) = args.samples {
                    config.reasoning.vote_samples = samples;
                }
                if let Some(max_iterations) = args.max_iterations {
                    config.reasoning.max_verify_iterations = max_iterations;
                }
                Some(&args.generation)
            }
            Command::Interactive(args) => Some(&args.generation),
            Command::Status => None,
        };
        if let Some(generation) = generation {
            generation.apply(config);
        }
    }
}

impl GenerationArgs {
    fn apply(&self, config: &mut OrinConfig) {
        if let Some(temperature) = self.temperature {
            config.generation.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.generation.max_tokens = max_tokens;
        }
        if self.no_stream {
            config.generation.stream = false;
        }
    }
}
