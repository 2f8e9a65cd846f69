use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use llm_provider::{GenerationStatus, Generator};
use reasoner::{ReasoningController, ReasoningError, ReasoningSettings};
use session_log::{session_dir, SessionLogWriter};
use tracing::info;

use crate::backend::generator_from_config;
use crate::cli::{Cli, Command};
use crate::config::OrinConfig;
use crate::interrupt::{install_interrupt_handler, INTERRUPTED_EXIT_CODE};
use crate::logging::init_logging;
use crate::query::QueryRunner;
use crate::repl::{EditorInput, Repl};
use crate::session::ConversationSession;
use crate::status::run_status;
use crate::terminal::{stderr_is_terminal, Style};

#[must_use]
pub fn reasoning_settings(config: &OrinConfig) -> ReasoningSettings {
    ReasoningSettings::default()
        .with_system_prompt(&config.system_prompt)
        .with_max_tokens(config.generation.max_tokens)
        .with_stream(config.generation.stream)
        .with_verify_temperature_factor(config.reasoning.verify_temperature_factor)
}

pub fn build_controller(
    config: &OrinConfig,
    generator: Arc<dyn Generator>,
) -> Result<ReasoningController, ReasoningError> {
    ReasoningController::new(generator, reasoning_settings(config))
}

fn log_writer(config: &OrinConfig) -> Result<SessionLogWriter> {
    let cwd = std::env::current_dir().context("reading the current directory")?;
    Ok(SessionLogWriter::new(session_dir(&cwd, Some(config.session_dir.as_path()))))
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    let loaded = OrinConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let mut config = loaded.config;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;
    init_logging(&config.logging.level, config.logging.file.as_deref(), cli.verbose)?;
    info!(
        source = ?loaded.source,
        backend = config.backend.as_str(),
        "configuration loaded"
    );

    let style = Style::detect();
    let spinner = stderr_is_terminal();
    let interrupt = install_interrupt_handler().context("installing signal handlers")?;
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Command::Status => {
            let controller = generator_from_config(&config)
                .map_err(|error| error.to_string())
                .and_then(|generator| {
                    build_controller(&config, generator).map_err(|error| error.to_string())
                });
            run_status(
                &config,
                loaded.source.as_deref(),
                controller.as_ref().map_err(|reason| reason.clone()),
                &interrupt,
                &style,
                &mut stdout,
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Query(args) => {
            let generator =
                generator_from_config(&config).context("creating the generator backend")?;
            let controller = build_controller(&config, generator)?;
            let outcome = QueryRunner::new(&controller, &config, &interrupt, log_writer(&config)?)
                .with_style(style)
                .with_spinner(spinner)
                .run(args, &mut stdout)?;
            if let Some(path) = &outcome.log_path {
                info!(path = %path.display(), "query log written");
            }
            Ok(match outcome.status() {
                GenerationStatus::Completed => ExitCode::SUCCESS,
                GenerationStatus::TimedOut => ExitCode::FAILURE,
                GenerationStatus::Cancelled => ExitCode::from(INTERRUPTED_EXIT_CODE as u8),
            })
        }
        Command::Interactive(args) => {
            let generator =
                generator_from_config(&config).context("creating the generator backend")?;
            let controller = build_controller(&config, generator)?;
            let session =
                ConversationSession::new(&config.system_prompt, args.generation.show_thinking);
            let mut input = EditorInput::new().context("initializing line editor")?;
            Repl::new(&controller, &config, &interrupt, session, log_writer(&config)?)
                .with_style(style)
                .with_spinner(spinner)
                .run(&mut input, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
