use crate::decoder::DecodedSegment;
use llm_provider::GenerationStatus;

/// Which generation a run belongs to within a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Answer,
    Sample { index: usize, total: usize },
    Initial,
    Verify { round: usize, max: usize },
}

impl RunPhase {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Answer => "answer".to_string(),
            Self::Sample { index, total } => format!("sample {index}/{total}"),
            Self::Initial => "initial answer".to_string(),
            Self::Verify { round, max } => format!("verification {round}/{max}"),
        }
    }
}

/// Receives decoded output as it is produced.
///
/// Only display is routed here; what the controller accumulates never
/// depends on what a sink does with a segment.
pub trait DisplaySink {
    fn begin_run(&mut self, _phase: &RunPhase) {}

    fn segment(&mut self, segment: &DecodedSegment);

    fn end_run(&mut self, _phase: &RunPhase, _status: GenerationStatus) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn segment(&mut self, _segment: &DecodedSegment) {}
}

/// Buffers forwarded segments, for tests and non-interactive callers.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub phases: Vec<RunPhase>,
    pub segments: Vec<DecodedSegment>,
}

impl DisplaySink for CollectingSink {
    fn begin_run(&mut self, phase: &RunPhase) {
        self.phases.push(*phase);
    }

    fn segment(&mut self, segment: &DecodedSegment) {
        self.segments.push(segment.clone());
    }
}
