use std::fmt::Write as _;

use llm_provider::{GenerationStatus, Message};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SessionLogError;

const RULE_WIDTH: usize = 60;

/// One answered question, as written by `orin query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub timestamp: OffsetDateTime,
    pub mode: String,
    pub question: String,
    pub status: GenerationStatus,
    /// Voting samples in run order; empty for other modes.
    pub samples: Vec<String>,
    pub final_answer: String,
}

impl QueryRecord {
    pub fn render(&self) -> Result<String, SessionLogError> {
        let mut out = String::new();
        let _ = writeln!(out, "# Orin Query Session");
        let _ = writeln!(out, "Timestamp: {}", self.timestamp.format(&Rfc3339)?);
        let _ = writeln!(out, "Mode: {}", self.mode);
        let _ = writeln!(out, "Question: {}", self.question);
        let _ = writeln!(out, "Status: {}", self.status.as_str());
        out.push('\n');

        for (index, sample) in self.samples.iter().enumerate() {
            let _ = writeln!(out, "## Sample {}", index + 1);
            let _ = writeln!(out, "{}", sample.trim_end());
            out.push('\n');
        }

        let _ = writeln!(out, "## Final Answer");
        let _ = writeln!(out, "{}", self.final_answer.trim_end());
        Ok(out)
    }
}

/// A whole interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
    pub questions: usize,
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn render(&self) -> Result<String, SessionLogError> {
        let mut out = String::new();
        let _ = writeln!(out, "# Orin REPL Session");
        let _ = writeln!(out, "Timestamp: {}", self.started_at.format(&Rfc3339)?);
        let _ = writeln!(out, "Duration: {}", format_duration(self.ended_at - self.started_at));
        let _ = writeln!(out, "Messages: {}", self.messages.len());
        let _ = writeln!(out, "Questions: {}", self.questions);

        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        for message in &self.messages {
            out.push('\n');
            let _ = writeln!(out, "{heavy}");
            let _ = writeln!(out, "{}:", message.role.label());
            let _ = writeln!(out, "{light}");
            let _ = writeln!(out, "{}", message.content.trim_end());
        }
        Ok(out)
    }
}

fn format_duration(duration: time::Duration) -> String {
    let total = duration.whole_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
