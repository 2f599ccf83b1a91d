use crate::command::CommandType;
use thiserror::Error;

/// Errors reported by the interpreter. None of them terminate the shell;
/// the failing command gets a non-zero result and the loop continues.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("pipe failed: {0}")]
    Pipe(#[source] nix::Error),

    #[error("signal setup failed: {0}")]
    Signal(#[source] nix::Error),

    #[error("terminal control failed: {0}")]
    Terminal(#[source] nix::Error),

    #[error("cd: {0}")]
    Cd(String),

    #[error("{0}: argument contains a NUL byte")]
    NulByte(String),

    #[error("{0}: built-in cannot be used in a pipeline")]
    BuiltinInPipeline(String),

    #[error("unsupported command type: {0}")]
    Unsupported(CommandType),

    #[error("line editor: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
