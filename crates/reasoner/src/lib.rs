//! Decoding and reasoning strategies on top of a [`llm_provider::Generator`].
//!
//! [`StreamDecoder`] turns raw generator chunks into thinking and answer
//! segments. [`ReasoningController`] runs single-shot, voting and
//! verify-refine strategies over it, forwarding live segments to a
//! [`DisplaySink`].

mod controller;
mod decoder;
mod error;
mod sink;
mod thinking;
mod vote;

pub use controller::{
    ReasoningController, ReasoningRequest, ReasoningResult, ReasoningSettings, Strategy,
    DEFAULT_SYSTEM_PROMPT, DEFAULT_VERIFY_TEMPERATURE_FACTOR, VERIFY_PROMPT,
};
pub use decoder::{
    DecodedResponse, DecodedSegment, DecoderConfig, SegmentKind, StreamDecoder,
    DEFAULT_CLOSE_TAG, DEFAULT_NOISE_PREFIXES, DEFAULT_OPEN_TAG,
};
pub use error::ReasoningError;
pub use sink::{CollectingSink, DisplaySink, NullSink, RunPhase};
pub use thinking::{should_show_thinking, ThinkingMode};
pub use vote::{tally_votes, Vote};
