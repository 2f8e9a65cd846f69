use std::sync::atomic::Ordering;
use std::sync::Arc;

use llm_provider::{
    build_prompt, CancelSignal, GenerationError, GenerationRequest, GenerationStatus, Generator,
    GeneratorProfile, Message, Role, DEFAULT_MAX_TOKENS,
};
use tracing::{debug, info, warn};

use crate::decoder::{DecodedResponse, DecodedSegment, DecoderConfig, SegmentKind, StreamDecoder};
use crate::error::ReasoningError;
use crate::sink::{DisplaySink, RunPhase};
use crate::vote::{tally_votes, Vote};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Orin, a helpful AI assistant. \
Be concise, clear, and accurate. Think step-by-step for complex questions.";
pub const DEFAULT_VERIFY_TEMPERATURE_FACTOR: f32 = 0.8;

/// Follow-up turn asking the generator to check its previous answer.
pub const VERIFY_PROMPT: &str = "Check your previous answer for mistakes. \
If it is correct and complete, reply with the single word VERIFIED. \
Otherwise reply with the complete corrected answer.";

const VERIFIED_TOKEN: &str = "verified";

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub stream: bool,
    /// Multiplier applied to the request temperature for verification rounds.
    pub verify_temperature_factor: f32,
    /// Overrides the decoder derived from the generator's output shape.
    pub decoder: Option<DecoderConfig>,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
            verify_temperature_factor: DEFAULT_VERIFY_TEMPERATURE_FACTOR,
            decoder: None,
        }
    }
}

impl ReasoningSettings {
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    #[must_use]
    pub fn with_verify_temperature_factor(mut self, factor: f32) -> Self {
        self.verify_temperature_factor = factor;
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn validate(&self) -> Result<(), ReasoningError> {
        if self.max_tokens == 0 {
            return Err(ReasoningError::InvalidSettings(
                "max_tokens must be positive".to_string(),
            ));
        }
        let factor = self.verify_temperature_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ReasoningError::InvalidSettings(format!(
                "verify_temperature_factor must be in (0, 1], got {factor}"
            )));
        }
        Ok(())
    }
}

/// One question put to the controller.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub question: &'a str,
    /// Prior turns, oldest first. System turns are ignored; the controller
    /// supplies its own system prompt.
    pub history: &'a [Message],
    pub temperature: f32,
    pub show_thinking: bool,
}

impl<'a> ReasoningRequest<'a> {
    #[must_use]
    pub fn new(question: &'a str) -> Self {
        Self {
            question,
            history: &[],
            temperature: llm_provider::DEFAULT_TEMPERATURE,
            show_thinking: false,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: &'a [Message]) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_show_thinking(mut self, show_thinking: bool) -> Self {
        self.show_thinking = show_thinking;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Single,
    Vote { samples: usize },
    Verify { max_iterations: usize },
}

impl Strategy {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Vote { .. } => "vote",
            Self::Verify { .. } => "verify",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningResult {
    pub final_answer: String,
    /// Untrimmed answers of the voting runs that completed, in run order.
    pub samples: Option<Vec<String>>,
    pub vote: Option<Vote>,
    pub status: GenerationStatus,
    /// Generation calls for voting; verification rounds for verify-refine.
    pub iterations: usize,
    /// Voting runs dropped from the tally.
    pub excluded: usize,
    pub used_fallback: bool,
    pub malformed: bool,
    /// Filtered raw output of the last generation call.
    pub raw_output: String,
    pub thinking: String,
}

impl ReasoningResult {
    fn from_decoded(decoded: &DecodedResponse, status: GenerationStatus) -> Self {
        Self {
            final_answer: decoded.text().to_string(),
            samples: None,
            vote: None,
            status,
            iterations: 1,
            excluded: 0,
            used_fallback: decoded.used_fallback,
            malformed: decoded.malformed,
            raw_output: decoded.raw.clone(),
            thinking: decoded.thinking.clone(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

#[derive(Debug)]
struct RunOutcome {
    status: GenerationStatus,
    decoded: DecodedResponse,
}

/// Drives reasoning strategies over a single generator.
pub struct ReasoningController {
    generator: Arc<dyn Generator>,
    settings: ReasoningSettings,
    decoder: DecoderConfig,
}

impl ReasoningController {
    pub fn new(
        generator: Arc<dyn Generator>,
        settings: ReasoningSettings,
    ) -> Result<Self, ReasoningError> {
        settings.validate()?;
        let decoder = settings
            .decoder
            .clone()
            .unwrap_or_else(|| DecoderConfig::for_shape(generator.profile().output_shape));
        Ok(Self {
            generator,
            settings,
            decoder,
        })
    }

    #[must_use]
    pub fn profile(&self) -> GeneratorProfile {
        self.generator.profile()
    }

    #[must_use]
    pub fn settings(&self) -> &ReasoningSettings {
        &self.settings
    }

    pub fn run(
        &self,
        strategy: Strategy,
        request: &ReasoningRequest<'_>,
        cancel: &CancelSignal,
        sink: &mut dyn DisplaySink,
    ) -> Result<ReasoningResult, ReasoningError> {
        match strategy {
            Strategy::Single => self.single(request, cancel, sink),
            Strategy::Vote { samples } => self.vote(request, samples, cancel, sink),
            Strategy::Verify { max_iterations } => {
                self.verify(request, max_iterations, cancel, sink)
            }
        }
    }

    /// One generation call; the decoded answer is the result.
    pub fn single(
        &self,
        request: &ReasoningRequest<'_>,
        cancel: &CancelSignal,
        sink: &mut dyn DisplaySink,
    ) -> Result<ReasoningResult, ReasoningError> {
        info!(strategy = "single", temperature = request.temperature, "starting strategy");
        let outcome = self.run_once(
            self.base_messages(request),
            request.temperature,
            request.show_thinking,
            RunPhase::Answer,
            cancel,
            sink,
        )?;
        let result = ReasoningResult::from_decoded(&outcome.decoded, outcome.status);
        info!(
            strategy = "single",
            status = result.status.as_str(),
            answer_len = result.final_answer.len(),
            fallback = result.used_fallback,
            "strategy finished"
        );
        Ok(result)
    }

    /// Independent sequential runs; the most frequent trimmed answer wins.
    pub fn vote(
        &self,
        request: &ReasoningRequest<'_>,
        samples: usize,
        cancel: &CancelSignal,
        sink: &mut dyn DisplaySink,
    ) -> Result<ReasoningResult, ReasoningError> {
        if samples == 0 {
            return Err(ReasoningError::InvalidSettings(
                "vote needs at least one sample".to_string(),
            ));
        }
        info!(
            strategy = "vote",
            samples,
            temperature = request.temperature,
            "starting strategy"
        );

        let messages = self.base_messages(request);
        let mut answers = Vec::with_capacity(samples);
        let mut excluded = 0;
        let mut attempted = 0;
        let mut malformed = false;
        let mut last: Option<DecodedResponse> = None;
        let mut status = GenerationStatus::Completed;

        for index in 1..=samples {
            if cancel.load(Ordering::Acquire) {
                status = GenerationStatus::Cancelled;
                break;
            }
            attempted += 1;
            debug!(index, total = samples, "running vote sample");
            let phase = RunPhase::Sample {
                index,
                total: samples,
            };
            match self.run_once(
                messages.clone(),
                request.temperature,
                request.show_thinking,
                phase,
                cancel,
                sink,
            ) {
                Ok(outcome) => match outcome.status {
                    GenerationStatus::Completed => {
                        malformed |= outcome.decoded.malformed;
                        answers.push(outcome.decoded.answer.clone());
                        last = Some(outcome.decoded);
                    }
                    GenerationStatus::Cancelled => {
                        status = GenerationStatus::Cancelled;
                        if answers.is_empty() {
                            last = Some(outcome.decoded);
                        }
                        break;
                    }
                    GenerationStatus::TimedOut => {
                        warn!(index, "vote sample timed out; excluded from tally");
                        excluded += 1;
                    }
                },
                Err(error) if ReasoningError::is_excludable(&error) => {
                    warn!(index, error = %error, "vote sample failed; excluded from tally");
                    excluded += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }

        let Some(vote) = tally_votes(answers.as_slice()) else {
            if status != GenerationStatus::Cancelled {
                return Err(ReasoningError::NoUsableSamples { attempted });
            }
            info!(strategy = "vote", attempted, "cancelled before any sample completed");
            let partial = last.unwrap_or_default();
            let mut result = ReasoningResult::from_decoded(&partial, status);
            result.samples = Some(Vec::new());
            result.iterations = attempted;
            result.excluded = excluded;
            return Ok(result);
        };

        info!(
            strategy = "vote",
            status = status.as_str(),
            votes = vote.count,
            total = vote.total,
            excluded,
            answer_len = vote.answer.len(),
            "strategy finished"
        );

        let last = last.unwrap_or_default();
        Ok(ReasoningResult {
            final_answer: vote.answer.clone(),
            samples: Some(answers),
            vote: Some(vote),
            status,
            iterations: attempted,
            excluded,
            used_fallback: last.used_fallback,
            malformed,
            raw_output: last.raw,
            thinking: last.thinking,
        })
    }

    /// An initial answer followed by up to `max_iterations` verification rounds.
    ///
    /// Thinking is never forwarded to the sink for this strategy.
    pub fn verify(
        &self,
        request: &ReasoningRequest<'_>,
        max_iterations: usize,
        cancel: &CancelSignal,
        sink: &mut dyn DisplaySink,
    ) -> Result<ReasoningResult, ReasoningError> {
        info!(
            strategy = "verify",
            max_iterations,
            temperature = request.temperature,
            "starting strategy"
        );
        let messages = self.base_messages(request);
        let initial = self.run_once(
            messages.clone(),
            request.temperature,
            false,
            RunPhase::Initial,
            cancel,
            sink,
        )?;

        let mut result = ReasoningResult::from_decoded(&initial.decoded, initial.status);
        result.iterations = 0;
        if !initial.status.is_complete() {
            info!(
                strategy = "verify",
                status = initial.status.as_str(),
                "initial answer incomplete; skipping verification"
            );
            return Ok(result);
        }

        let temperature = request.temperature * self.settings.verify_temperature_factor;
        let mut verified = false;

        for round in 1..=max_iterations {
            if cancel.load(Ordering::Acquire) {
                result.status = GenerationStatus::Cancelled;
                break;
            }
            result.iterations = round;
            debug!(round, max = max_iterations, temperature, "running verification round");

            let mut round_messages = messages.clone();
            round_messages.push(Message::assistant(result.final_answer.clone()));
            round_messages.push(Message::user(VERIFY_PROMPT));

            let phase = RunPhase::Verify {
                round,
                max: max_iterations,
            };
            let outcome =
                match self.run_once(round_messages, temperature, false, phase, cancel, sink) {
                    Ok(outcome) => outcome,
                    Err(error) if ReasoningError::is_excludable(&error) => {
                        warn!(round, error = %error, "verification round failed; keeping current answer");
                        break;
                    }
                    Err(error) => return Err(error.into()),
                };

            result.raw_output = outcome.decoded.raw.clone();
            result.malformed |= outcome.decoded.malformed;
            if !outcome.status.is_complete() {
                result.status = outcome.status;
                break;
            }

            let reply = outcome.decoded.text();
            if is_verified(reply) {
                verified = true;
                break;
            }
            if reply.is_empty() {
                debug!(round, "empty verification reply; keeping current answer");
                continue;
            }
            result.final_answer = reply.to_string();
            result.used_fallback = outcome.decoded.used_fallback;
        }

        info!(
            strategy = "verify",
            status = result.status.as_str(),
            rounds = result.iterations,
            verified,
            answer_len = result.final_answer.len(),
            "strategy finished"
        );
        Ok(result)
    }

    fn base_messages(&self, request: &ReasoningRequest<'_>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if !self.settings.system_prompt.trim().is_empty() {
            messages.push(Message::system(self.settings.system_prompt.clone()));
        }
        messages.extend(
            request
                .history
                .iter()
                .filter(|message| message.role != Role::System)
                .cloned(),
        );
        messages.push(Message::user(request.question));
        messages
    }

    /// An echoing generator repeats every earlier turn, so gating moves to the
    /// marker that closes this request's prompt.
    fn decoder_for(&self, request: &GenerationRequest) -> Result<DecoderConfig, GenerationError> {
        if self.decoder.start_marker.is_none() {
            return Ok(self.decoder.clone());
        }
        let prompt = build_prompt(&request.messages)?;
        Ok(self.decoder.clone().for_echoed_prompt(&prompt))
    }

    fn run_once(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        show_thinking: bool,
        phase: RunPhase,
        cancel: &CancelSignal,
        sink: &mut dyn DisplaySink,
    ) -> Result<RunOutcome, GenerationError> {
        let request = GenerationRequest::new(messages)
            .with_temperature(temperature)
            .with_max_tokens(self.settings.max_tokens)
            .with_stream(self.settings.stream)
            .with_show_thinking(show_thinking);

        let mut decoder = StreamDecoder::new(self.decoder_for(&request)?);
        sink.begin_run(&phase);
        let status = self.generator.generate(&request, cancel, &mut |chunk| {
            forward(sink, decoder.feed(chunk), show_thinking);
        })?;
        forward(sink, decoder.flush(), show_thinking);
        sink.end_run(&phase, status);

        let decoded = decoder.finish();
        debug!(
            phase = %phase.label(),
            status = status.as_str(),
            raw_len = decoded.raw.len(),
            answer_len = decoded.answer.len(),
            "generation finished"
        );
        Ok(RunOutcome { status, decoded })
    }
}

fn forward(sink: &mut dyn DisplaySink, segments: Vec<DecodedSegment>, show_thinking: bool) {
    for segment in segments {
        if segment.kind == SegmentKind::Answer || show_thinking {
            sink.segment(&segment);
        }
    }
}

fn is_verified(reply: &str) -> bool {
    reply.to_lowercase().contains(VERIFIED_TOKEN)
}
