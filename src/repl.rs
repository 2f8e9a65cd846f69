//! Interactive conversation loop.

use std::collections::VecDeque;
use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use llm_provider::{GenerationStatus, Role};
use reasoner::{ReasoningController, ReasoningRequest, Strategy};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use session_log::SessionLogWriter;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::config::OrinConfig;
use crate::display::{final_answer_block, TerminalSink};
use crate::interrupt::InterruptGuard;
use crate::session::{ConversationSession, ReasoningMode, INTERRUPTED_MARKER};
use crate::terminal::Style;

const STATS_EVERY: usize = 5;
const TOKENS_PER_WORD: f64 = 1.3;

/// One read from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    Interrupted,
    Eof,
}

pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent>;
}

/// Line editing with history, backed by rustyline.
pub struct EditorInput {
    editor: DefaultEditor,
}

impl EditorInput {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(LineEvent::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(LineEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(LineEvent::Eof),
            Err(error) => Err(error.into()),
        }
    }
}

/// Replays fixed lines, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    events: VecDeque<LineEvent>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: lines
                .into_iter()
                .map(|line| LineEvent::Line(line.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, event: LineEvent) {
        self.events.push_back(event);
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, _prompt: &str) -> Result<LineEvent> {
        Ok(self.events.pop_front().unwrap_or(LineEvent::Eof))
    }
}

/// What the user entered at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Command(SlashCommand),
    Message(String),
    Empty,
    Eof,
}

/// Reads one message. A first line starting with `/` is a command;
/// otherwise lines are collected until an empty line or end of input.
pub fn read_message(source: &mut dyn LineSource, style: &Style) -> Result<UserInput> {
    let first = match source.read_line(&style.prompt())? {
        LineEvent::Line(line) => line,
        LineEvent::Interrupted => return Ok(UserInput::Empty),
        LineEvent::Eof => return Ok(UserInput::Eof),
    };
    if first.trim().is_empty() {
        return Ok(UserInput::Empty);
    }
    if let Some(command) = parse_slash_command(&first) {
        return Ok(UserInput::Command(command));
    }

    let mut lines = vec![first];
    let continuation = style.continuation_prompt();
    loop {
        match source.read_line(&continuation)? {
            LineEvent::Line(line) if line.trim().is_empty() => break,
            LineEvent::Line(line) => lines.push(line),
            LineEvent::Interrupted => return Ok(UserInput::Empty),
            LineEvent::Eof => break,
        }
    }
    Ok(UserInput::Message(lines.join("\n").trim().to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Repl<'a> {
    controller: &'a ReasoningController,
    config: &'a OrinConfig,
    interrupt: &'a InterruptGuard,
    session: ConversationSession,
    log_writer: SessionLogWriter,
    style: Style,
    spinner: bool,
    last_raw: Option<String>,
}

impl<'a> Repl<'a> {
    pub fn new(
        controller: &'a ReasoningController,
        config: &'a OrinConfig,
        interrupt: &'a InterruptGuard,
        session: ConversationSession,
        log_writer: SessionLogWriter,
    ) -> Self {
        Self {
            controller,
            config,
            interrupt,
            session,
            log_writer,
            style: Style::plain(),
            spinner: false,
            last_raw: None,
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

    #[must_use]
    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn run(&mut self, input: &mut dyn LineSource, out: &mut dyn Write) -> Result<()> {
        let profile = self.controller.profile();
        writeln!(
            out,
            "{}",
            self.style.header(&format!(
                "Orin ({} / {}). Type /help for commands, /exit to leave.",
                profile.generator_id, profile.model_id
            ))
        )?;

        loop {
            let flow = match read_message(input, &self.style)? {
                UserInput::Eof => Flow::Exit,
                UserInput::Empty => Flow::Continue,
                UserInput::Command(command) => self.handle_command(command, out)?,
                UserInput::Message(question) => {
                    self.ask(&question, out)?;
                    let asked = self.session.total_questions();
                    if asked > 0 && asked % STATS_EVERY == 0 {
                        self.print_stats(out)?;
                    }
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                break;
            }
        }

        self.save_transcript(out)?;
        writeln!(out, "Goodbye.")?;
        Ok(())
    }

    fn handle_command(&mut self, command: SlashCommand, out: &mut dyn Write) -> Result<Flow> {
        match command {
            SlashCommand::Help => writeln!(out, "{HELP_TEXT}")?,
            SlashCommand::Clear => {
                self.session.clear();
                writeln!(out, "{}", self.style.status("Conversation cleared."))?;
            }
            SlashCommand::New => {
                self.save_transcript(out)?;
                self.session.reset();
                self.last_raw = None;
                writeln!(out, "{}", self.style.status("Started a new session."))?;
            }
            SlashCommand::Thinking => {
                self.session.thinking_mode = self.session.thinking_mode.next();
                let line = format!("Thinking display: {}", self.session.thinking_mode);
                writeln!(out, "{}", self.style.status(&line))?;
            }
            SlashCommand::Interleaved => {
                self.session.reasoning_mode = match self.session.reasoning_mode {
                    ReasoningMode::Verify => ReasoningMode::Standard,
                    _ => ReasoningMode::Verify,
                };
                let state = if self.session.reasoning_mode == ReasoningMode::Verify {
                    "on"
                } else {
                    "off"
                };
                writeln!(out, "{}", self.style.status(&format!("Verify-refine: {state}")))?;
            }
            SlashCommand::Vote(Some(samples)) => {
                self.session.queue_vote(samples);
                let line = format!("Next question will vote over {samples} samples.");
                writeln!(out, "{}", self.style.status(&line))?;
            }
            SlashCommand::Vote(None) => {
                let line = if self.session.reasoning_mode == ReasoningMode::Vote {
                    self.session.reasoning_mode = ReasoningMode::Standard;
                    "Vote mode: off".to_string()
                } else {
                    self.session.reasoning_mode = ReasoningMode::Vote;
                    format!(
                        "Vote mode: on ({} samples)",
                        self.config.reasoning.vote_samples
                    )
                };
                writeln!(out, "{}", self.style.status(&line))?;
            }
            SlashCommand::Stats => self.print_stats(out)?,
            SlashCommand::Debug => match &self.last_raw {
                Some(raw) => {
                    writeln!(out, "{}", self.style.header("Raw output of last generation:"))?;
                    writeln!(out, "{raw}")?;
                }
                None => writeln!(out, "{}", self.style.status("No generation yet."))?,
            },
            SlashCommand::Exit => return Ok(Flow::Exit),
            SlashCommand::Unknown(name) => {
                let line = format!("Unknown command {name}. Type /help for commands.");
                writeln!(out, "{}", self.style.warning(&line))?;
            }
            SlashCommand::InvalidArgument { command, argument } => {
                let line =
                    format!("Invalid argument '{argument}' for {command}; expected a positive number.");
                writeln!(out, "{}", self.style.warning(&line))?;
            }
        }
        Ok(Flow::Continue)
    }

    fn ask(&mut self, question: &str, out: &mut dyn Write) -> Result<()> {
        let reasoning = &self.config.reasoning;
        let strategy = self
            .session
            .next_strategy(reasoning.vote_samples, reasoning.max_verify_iterations);
        let temperature = match strategy {
            Strategy::Vote { .. } => reasoning.vote_temperature,
            _ => self.config.generation.temperature,
        };
        let show_thinking = self.session.thinking_mode.resolve(question);
        let history = self.session.history().to_vec();
        self.session.append(Role::User, question);

        let request = ReasoningRequest::new(question)
            .with_history(&history)
            .with_temperature(temperature)
            .with_show_thinking(show_thinking);

        self.interrupt.reset();
        let started = Instant::now();
        let (outcome, printed_answer) = {
            let mut sink = TerminalSink::new(&mut *out, self.style).with_spinner(self.spinner);
            let outcome =
                self.controller
                    .run(strategy, &request, self.interrupt.cancel(), &mut sink);
            sink.finish();
            (outcome, sink.printed_answer())
        };
        let elapsed = started.elapsed();
        self.interrupt.reset();

        let result = match outcome {
            Ok(result) => result,
            Err(error) => {
                warn!(error = %error, strategy = strategy.name(), "question failed");
                self.session.discard_last_user();
                writeln!(out, "{}", self.style.error(&format!("error: {error}")))?;
                return Ok(());
            }
        };
        self.last_raw = Some(result.raw_output.clone());

        if let Some(block) = final_answer_block(&strategy, &result, printed_answer, &self.style) {
            writeln!(out, "{block}")?;
        }

        let answer = result.final_answer.trim();
        match result.status {
            GenerationStatus::Cancelled if answer.is_empty() => {
                self.session.discard_last_user();
            }
            GenerationStatus::Cancelled => {
                self.session
                    .append(Role::Assistant, format!("{answer}\n{INTERRUPTED_MARKER}"));
            }
            _ if answer.is_empty() => {
                self.session.discard_last_user();
                writeln!(out, "{}", self.style.warning("No answer was produced."))?;
            }
            _ => self.session.append(Role::Assistant, answer),
        }

        info!(
            strategy = strategy.name(),
            status = result.status.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "question answered"
        );
        writeln!(out, "{}", self.style.status(&timing_line(answer, elapsed)))?;
        Ok(())
    }

    fn print_stats(&self, out: &mut dyn Write) -> Result<()> {
        let line = self.session.stats_line(OffsetDateTime::now_utc());
        writeln!(out, "{}", self.style.status(&line))?;
        Ok(())
    }

    fn save_transcript(&self, out: &mut dyn Write) -> Result<()> {
        if self.session.history().is_empty() {
            return Ok(());
        }
        let transcript = self.session.transcript(OffsetDateTime::now_utc());
        match self.log_writer.write_transcript(&transcript) {
            Ok(path) => {
                let line = format!("Session saved to {}", path.display());
                writeln!(out, "{}", self.style.status(&line))?;
            }
            Err(error) => {
                warn!(error = %error, "failed to save session transcript");
                let line = format!("Could not save session: {error}");
                writeln!(out, "{}", self.style.warning(&line))?;
            }
        }
        Ok(())
    }
}

/// `[elapsed, ~tokens/s]` with tokens estimated from the word count.
#[must_use]
pub fn timing_line(answer: &str, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    let words = answer.split_whitespace().count() as f64;
    let rate = if seconds > 0.0 {
        words * TOKENS_PER_WORD / seconds
    } else {
        0.0
    };
    format!("[{seconds:.1}s, ~{rate:.1} tok/s]")
}
