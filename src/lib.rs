//! Orin: a local reasoning assistant.
//!
//! The binary wires configuration, logging and a generator backend into the
//! [`reasoner`] controller, then runs one of three commands: a one-shot
//! query, the interactive loop, or a status probe.

pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod interrupt;
pub mod logging;
pub mod query;
pub mod repl;
pub mod session;
pub mod spinner;
pub mod status;
pub mod terminal;

pub use config::{BackendKind, ConfigError, OrinConfig};
pub use session::{ConversationSession, ReasoningMode};
