//! Error types for vsh

use thiserror::Error;
use vsh_sdk::FsError;

/// Result type alias for vsh operations
pub type ShellResult<T> = Result<T, ShellError>;

/// Failures that stop a command or a parse.
///
/// None of these escape [`Shell::exec`](crate::Shell::exec): parse errors
/// become exit status 2 and everything else is converted to
/// `<name>: <message>` with status 1 at the dispatch boundary.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Grammar-level failure
    #[error("{0}")]
    Syntax(String),

    /// Filesystem operation failed
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Bad option or operand
    #[error("{0}")]
    InvalidArgument(String),

    /// Anything else a command wants to report
    #[error("{0}")]
    Runtime(String),
}

impl ShellError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Exit status used when this error reaches the dispatch boundary.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Syntax(_) => 2,
            Self::Fs(_) | Self::InvalidArgument(_) | Self::Runtime(_) => 1,
        }
    }
}
