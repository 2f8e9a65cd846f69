//! One-shot question answering.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use llm_provider::GenerationStatus;
use reasoner::{ReasoningController, ReasoningRequest, ReasoningResult, Strategy};
use session_log::{QueryRecord, SessionLogWriter};
use time::OffsetDateTime;
use tracing::warn;

use crate::cli::{Method, QueryArgs};
use crate::config::OrinConfig;
use crate::display::{final_answer_block, TerminalSink};
use crate::interrupt::InterruptGuard;
use crate::terminal::Style;

/// Result of a one-shot query, with the log file written for it.
#[derive(Debug)]
pub struct QueryOutcome {
    pub result: ReasoningResult,
    pub log_path: Option<PathBuf>,
}

impl QueryOutcome {
    #[must_use]
    pub fn status(&self) -> GenerationStatus {
        self.result.status
    }
}

#[must_use]
pub fn strategy_for(method: Method, config: &OrinConfig) -> Strategy {
    match method {
        Method::Single => Strategy::Single,
        Method::Vote => Strategy::Vote {
            samples: config.reasoning.vote_samples,
        },
        Method::Verify => Strategy::Verify {
            max_iterations: config.reasoning.max_verify_iterations,
        },
    }
}

/// Voting samples at the configured vote temperature unless one was given
/// on the command line.
#[must_use]
pub fn temperature_for(method: Method, args: &QueryArgs, config: &OrinConfig) -> f32 {
    match (method, args.generation.temperature) {
        (Method::Vote, None) => config.reasoning.vote_temperature,
        _ => config.generation.temperature,
    }
}

pub struct QueryRunner<'a> {
    controller: &'a ReasoningController,
    config: &'a OrinConfig,
    interrupt: &'a InterruptGuard,
    log_writer: SessionLogWriter,
    style: Style,
    spinner: bool,
}

impl<'a> QueryRunner<'a> {
    pub fn new(
        controller: &'a ReasoningController,
        config: &'a OrinConfig,
        interrupt: &'a InterruptGuard,
        log_writer: SessionLogWriter,
    ) -> Self {
        Self {
            controller,
            config,
            interrupt,
            log_writer,
            style: Style::plain(),
            spinner: false,
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn with_spinner(mut self, spinner: bool) -> Self {
        self.spinner = spinner;
        self
    }

    pub fn run(&self, args: &QueryArgs, out: &mut dyn Write) -> Result<QueryOutcome> {
        let question = args.question.trim();
        let strategy = strategy_for(args.method, self.config);
        let request = ReasoningRequest::new(question)
            .with_temperature(temperature_for(args.method, args, self.config))
            .with_show_thinking(args.generation.show_thinking.resolve(question));

        let (outcome, printed_answer) = {
            let mut sink = TerminalSink::new(&mut *out, self.style).with_spinner(self.spinner);
            let outcome = self
                .controller
                .run(strategy, &request, self.interrupt.cancel(), &mut sink);
            sink.finish();
            (outcome, sink.printed_answer())
        };
        let result =
            outcome.with_context(|| format!("{} query failed", args.method.as_str()))?;

        if let Some(block) = final_answer_block(&strategy, &result, printed_answer, &self.style) {
            writeln!(out, "{block}")?;
        }

        let record = QueryRecord {
            timestamp: OffsetDateTime::now_utc(),
            mode: args.method.as_str().to_string(),
            question: question.to_string(),
            status: result.status,
            samples: result.samples.clone().unwrap_or_default(),
            final_answer: result.final_answer.clone(),
        };
        let log_path = match self.log_writer.write_query(&record) {
            Ok(path) => Some(path),
            Err(error) => {
                warn!(error = %error, "failed to write query log");
                None
            }
        };

        Ok(QueryOutcome { result, log_path })
    }
}
