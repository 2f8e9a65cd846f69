use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// What happens to the child's standard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    #[default]
    Discard,
    /// Stderr lines are delivered on the same channel as stdout lines.
    Merge,
}

/// Program, arguments, and stream wiring for one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<OsString>,
    stderr: StderrMode,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stderr: StderrMode::Discard,
            current_dir: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn stderr(mut self, mode: StderrMode) -> Self {
        self.stderr = mode;
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    #[must_use]
    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    #[must_use]
    pub fn stderr_mode(&self) -> StderrMode {
        self.stderr
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(match self.stderr {
                StderrMode::Discard => Stdio::null(),
                StderrMode::Merge => Stdio::piped(),
            });
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}
