#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    New,
    Thinking,
    Interleaved,
    Vote(Option<usize>),
    Stats,
    Debug,
    Exit,
    Unknown(String),
    InvalidArgument { command: String, argument: String },
}

pub const HELP_TEXT: &str = "\
Commands:
  /help          Show this help
  /clear         Forget the conversation so far
  /new           Save the transcript and start a new session
  /thinking      Cycle thinking display: auto, always, never
  /interleaved   Toggle verify-refine mode
  /vote [N]      Vote over N samples for the next question, or toggle vote mode
  /stats         Show session statistics
  /debug         Show the raw output of the last generation
  /exit, /quit   Leave

End a message with an empty line. Ctrl-C interrupts a running answer.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or(trimmed).to_ascii_lowercase();
    let argument = parts.next();

    let parsed = match command.as_str() {
        "/help" | "/?" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/new" => SlashCommand::New,
        "/thinking" => SlashCommand::Thinking,
        "/interleaved" => SlashCommand::Interleaved,
        "/vote" => match argument {
            None => SlashCommand::Vote(None),
            Some(value) => match value.parse::<usize>() {
                Ok(samples) if samples > 0 => SlashCommand::Vote(Some(samples)),
                _ => SlashCommand::InvalidArgument {
                    command,
                    argument: value.to_string(),
                },
            },
        },
        "/stats" => SlashCommand::Stats,
        "/debug" => SlashCommand::Debug,
        "/exit" | "/quit" => SlashCommand::Exit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
