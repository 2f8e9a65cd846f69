use std::fmt;

/// When thinking segments reach the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkingMode {
    #[default]
    Auto,
    Always,
    Never,
}

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "ok", "okay", "bye", "goodbye", "yes", "no",
    "cool", "nice", "great", "sure",
];

const CUE_WORDS: &[&str] = &[
    "what", "why", "how", "explain", "compare", "analyze", "describe", "calculate", "prove",
    "solve", "design", "write", "derive",
];

const LONG_QUESTION_WORDS: usize = 8;

impl ThinkingMode {
    /// The mode after this one in the `/thinking` cycle.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Auto => Self::Always,
            Self::Always => Self::Never,
            Self::Never => Self::Auto,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "always" | "on" => Some(Self::Always),
            "never" | "off" => Some(Self::Never),
            _ => None,
        }
    }

    /// Whether thinking should be shown for `question` under this mode.
    #[must_use]
    pub fn resolve(self, question: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => should_show_thinking(question),
        }
    }
}

impl fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic for `auto`: show reasoning for questions that warrant it.
#[must_use]
pub fn should_show_thinking(question: &str) -> bool {
    let normalized = question
        .trim()
        .to_lowercase()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_string();

    if normalized.is_empty() || GREETINGS.contains(&normalized.as_str()) {
        return false;
    }

    let words: Vec<&str> = normalized
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect();

    if words.len() >= LONG_QUESTION_WORDS {
        return true;
    }
    words.iter().any(|word| CUE_WORDS.contains(word))
}
