//! Conversation state for the interactive loop.

use llm_provider::{Message, Role};
use reasoner::{Strategy, ThinkingMode};
use session_log::Transcript;
use time::OffsetDateTime;

pub const INTERRUPTED_MARKER: &str = "[interrupted]";

/// Strategy used for ordinary questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningMode {
    #[default]
    Standard,
    Verify,
    Vote,
}

impl ReasoningMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Verify => "verify-refine",
            Self::Vote => "vote",
        }
    }
}

/// Ordered history plus the settings that shape the next question.
///
/// The reasoning controller only ever reads a snapshot of the history; this
/// type is the single writer.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    messages: Vec<Message>,
    system_prompt: String,
    pub thinking_mode: ThinkingMode,
    pub reasoning_mode: ReasoningMode,
    pending_vote: Option<usize>,
    started_at: OffsetDateTime,
    total_questions: usize,
}

impl ConversationSession {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, thinking_mode: ThinkingMode) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: system_prompt.into(),
            thinking_mode,
            reasoning_mode: ReasoningMode::default(),
            pending_vote: None,
            started_at: OffsetDateTime::now_utc(),
            total_questions: 0,
        }
    }

    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        if role == Role::User {
            self.total_questions += 1;
        }
        self.messages.push(Message::new(role, content));
    }

    /// Drops the trailing user turn after a failed question.
    pub fn discard_last_user(&mut self) -> Option<Message> {
        if self.messages.last().is_some_and(|message| message.role == Role::User) {
            self.total_questions = self.total_questions.saturating_sub(1);
            return self.messages.pop();
        }
        None
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Starts over: empty history, new start time, counters zeroed. Modes
    /// are kept.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.pending_vote = None;
        self.total_questions = 0;
        self.started_at = OffsetDateTime::now_utc();
    }

    /// The system prompt followed by the whole history.
    #[must_use]
    pub fn messages_for_generation(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(self.messages.iter().cloned());
        messages
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    #[must_use]
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn queue_vote(&mut self, samples: usize) {
        self.pending_vote = Some(samples);
    }

    #[must_use]
    pub fn pending_vote(&self) -> Option<usize> {
        self.pending_vote
    }

    /// Strategy for the next question. A queued one-off vote is consumed.
    pub fn next_strategy(&mut self, vote_samples: usize, verify_iterations: usize) -> Strategy {
        if let Some(samples) = self.pending_vote.take() {
            return Strategy::Vote { samples };
        }
        match self.reasoning_mode {
            ReasoningMode::Standard => Strategy::Single,
            ReasoningMode::Verify => Strategy::Verify {
                max_iterations: verify_iterations,
            },
            ReasoningMode::Vote => Strategy::Vote {
                samples: vote_samples,
            },
        }
    }

    #[must_use]
    pub fn stats_line(&self, now: OffsetDateTime) -> String {
        let elapsed = (now - self.started_at).whole_seconds().max(0);
        format!(
            "Session: {} questions, {} messages, {}m {}s, thinking {}, mode {}",
            self.total_questions,
            self.messages.len(),
            elapsed / 60,
            elapsed % 60,
            self.thinking_mode,
            self.reasoning_mode.as_str(),
        )
    }

    #[must_use]
    pub fn transcript(&self, ended_at: OffsetDateTime) -> Transcript {
        Transcript {
            started_at: self.started_at,
            ended_at,
            questions: self.total_questions,
            messages: self.messages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn session() -> ConversationSession {
        ConversationSession::new("Be brief.", ThinkingMode::Auto)
    }

    #[test]
    fn generation_messages_start_with_the_system_prompt() {
        let mut session = session();
        session.append(Role::User, "hi");
        session.append(Role::Assistant, "Hello!");

        let messages = session.messages_for_generation();
        assert_eq!(messages[0], Message::system("Be brief."));
        assert_eq!(&messages[1..], session.history());
        assert_eq!(session.total_questions(), 1);
    }

    #[test]
    fn failed_question_is_popped_and_uncounted() {
        let mut session = session();
        session.append(Role::User, "first");
        session.append(Role::Assistant, "answer");
        session.append(Role::User, "second");

        assert_eq!(session.discard_last_user(), Some(Message::user("second")));
        assert_eq!(session.discard_last_user(), None);
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.total_questions(), 1);
    }

    #[test]
    fn queued_vote_applies_once() {
        let mut session = session();
        session.queue_vote(5);
        assert_eq!(session.next_strategy(3, 2), Strategy::Vote { samples: 5 });
        assert_eq!(session.next_strategy(3, 2), Strategy::Single);

        session.reasoning_mode = ReasoningMode::Verify;
        assert_eq!(
            session.next_strategy(3, 2),
            Strategy::Verify { max_iterations: 2 }
        );
    }

    #[test]
    fn stats_line_reports_counts_and_modes() {
        let mut session = session();
        session.append(Role::User, "q");
        let later = session.started_at() + Duration::seconds(75);
        assert_eq!(
            session.stats_line(later),
            "Session: 1 questions, 1 messages, 1m 15s, thinking auto, mode standard"
        );
    }

    #[test]
    fn reset_keeps_modes() {
        let mut session = session();
        session.thinking_mode = ThinkingMode::Never;
        session.append(Role::User, "q");
        session.queue_vote(3);
        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.pending_vote(), None);
        assert_eq!(session.thinking_mode, ThinkingMode::Never);
    }
}
