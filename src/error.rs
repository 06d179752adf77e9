use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between reading a line and the job settling.
///
/// None of these terminate the shell: the dispatcher prints them as
/// `yash: <message>` and goes back to the prompt.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("syntax error: expected filename after '{operator}'")]
    MissingRedirectTarget { operator: &'static str },

    #[error("syntax error: missing command")]
    EmptyCommand,

    #[error("syntax error: only one '|' per line is supported")]
    PipelineTooLong,

    #[error("too many arguments (limit is {limit})")]
    TooManyTokens { limit: usize },

    #[error("syntax error: input line is not valid UTF-8")]
    InvalidUtf8,

    #[error("line too long (limit is {limit} bytes)")]
    LineTooLong { limit: usize },

    #[error("{name}: cannot be combined with pipes or redirection")]
    BuiltinNotCombinable { name: &'static str },

    #[error("{name}: too many arguments")]
    BuiltinArguments { name: &'static str },

    #[error("{}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("command not found: {program}")]
    CommandNotFound { program: String },

    #[error("{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{builtin}: no current job")]
    NoCurrentJob { builtin: &'static str },

    #[error("{builtin}: {arg}: invalid job id")]
    InvalidJobId { builtin: &'static str, arg: String },

    #[error("{builtin}: %{id}: no such job")]
    NoSuchJob { builtin: &'static str, id: usize },

    #[error("{builtin}: %{id}: job has terminated")]
    JobFinished { builtin: &'static str, id: usize },

    #[error("bg: %{id}: job already in background")]
    JobNotStopped { id: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    /// Shell-style status for a failure that kept a command from running.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::CommandNotFound { .. } => 127,
            ShellError::Spawn { .. } => 126,
            ShellError::MissingRedirectTarget { .. }
            | ShellError::EmptyCommand
            | ShellError::PipelineTooLong
            | ShellError::TooManyTokens { .. }
            | ShellError::InvalidUtf8
            | ShellError::LineTooLong { .. }
            | ShellError::BuiltinNotCombinable { .. }
            | ShellError::BuiltinArguments { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
