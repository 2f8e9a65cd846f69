use std::io::Write;

use llm_provider::GenerationStatus;
use reasoner::{DecodedSegment, DisplaySink, ReasoningResult, RunPhase, SegmentKind, Strategy};

use crate::spinner::{Spinner, DEFAULT_MESSAGE};
use crate::terminal::Style;

/// Streams decoded segments to the terminal.
///
/// Answer text is printed as it arrives. Thinking text is printed dimmed;
/// the controller only forwards it when thinking is visible. A spinner runs
/// from the start of each generation until its first visible segment.
pub struct TerminalSink<'a> {
    out: &'a mut dyn Write,
    style: Style,
    spinner_enabled: bool,
    spinner: Option<Spinner>,
    in_thinking: bool,
    line_open: bool,
    printed_answer: bool,
}

impl<'a> TerminalSink<'a> {
    pub fn new(out: &'a mut dyn Write, style: Style) -> Self {
        Self {
            out,
            style,
            spinner_enabled: false,
            spinner: None,
            in_thinking: false,
            line_open: false,
            printed_answer: false,
        }
    }

    #[must_use]
    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.spinner_enabled = enabled;
        self
    }

    /// Whether any answer text reached the terminal.
    #[must_use]
    pub fn printed_answer(&self) -> bool {
        self.printed_answer
    }

    /// Stops the spinner and closes any open styled span. Safe to call after
    /// a run that ended in an error.
    pub fn finish(&mut self) {
        self.stop_spinner();
        self.close_thinking();
        self.end_line();
        let _ = self.out.flush();
    }

    fn stop_spinner(&mut self) {
        if let Some(mut spinner) = self.spinner.take() {
            spinner.stop();
        }
    }

    fn close_thinking(&mut self) {
        if self.in_thinking {
            let _ = write!(self.out, "{}", self.style.reset());
            self.in_thinking = false;
        }
    }

    fn end_line(&mut self) {
        if self.line_open {
            let _ = writeln!(self.out);
            self.line_open = false;
        }
    }

    fn write_text(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        self.line_open = !text.ends_with('\n');
    }
}

impl DisplaySink for TerminalSink<'_> {
    fn begin_run(&mut self, phase: &RunPhase) {
        if *phase != RunPhase::Answer {
            self.end_line();
            let _ = writeln!(self.out, "{}", self.style.header(&format!("[{}]", phase.label())));
        }
        let _ = self.out.flush();
        if self.spinner_enabled && self.spinner.is_none() {
            self.spinner = Some(Spinner::start(DEFAULT_MESSAGE));
        }
    }

    fn segment(&mut self, segment: &DecodedSegment) {
        if segment.text.is_empty() {
            return;
        }
        self.stop_spinner();
        match segment.kind {
            SegmentKind::Thinking => {
                if !self.in_thinking {
                    let _ = write!(self.out, "{}", self.style.open_thinking());
                    self.in_thinking = true;
                }
                self.write_text(&segment.text);
            }
            SegmentKind::Answer => {
                if self.in_thinking {
                    self.close_thinking();
                    self.end_line();
                }
                self.write_text(&segment.text);
                self.printed_answer = true;
            }
        }
        let _ = self.out.flush();
    }

    fn end_run(&mut self, _phase: &RunPhase, status: GenerationStatus) {
        self.stop_spinner();
        self.close_thinking();
        self.end_line();
        match status {
            GenerationStatus::Completed => {}
            GenerationStatus::TimedOut => {
                let _ = writeln!(self.out, "{}", self.style.warning("[timed out]"));
            }
            GenerationStatus::Cancelled => {
                let _ = writeln!(self.out, "{}", self.style.warning("[interrupted]"));
            }
        }
        let _ = self.out.flush();
    }
}

/// Text to print after a run, when the streamed output alone does not show
/// the final answer.
#[must_use]
pub fn final_answer_block(
    strategy: &Strategy,
    result: &ReasoningResult,
    printed_answer: bool,
    style: &Style,
) -> Option<String> {
    let answer = result.final_answer.trim();
    if answer.is_empty() {
        return None;
    }
    let heading = match (strategy, &result.vote) {
        (Strategy::Vote { .. }, Some(vote)) => {
            let mut heading = format!("Final answer ({}/{} votes)", vote.count, vote.total);
            if result.excluded > 0 {
                heading.push_str(&format!(", {} excluded", result.excluded));
            }
            heading
        }
        (Strategy::Verify { .. }, _) if result.iterations > 0 => format!(
            "Final answer after {} verification round{}",
            result.iterations,
            if result.iterations == 1 { "" } else { "s" }
        ),
        _ if printed_answer => return None,
        _ => return Some(answer.to_string()),
    };
    Some(format!("{}\n{answer}", style.header(&format!("{heading}:"))))
}
