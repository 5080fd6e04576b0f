use thiserror::Error;

/// Failure of a filesystem operation.
///
/// Every variant carries the offending path (or a reason when no single path
/// applies). `Display` renders the conventional shell wording so commands can
/// prefix it with their own name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("{0}: No such file or directory")]
    NotFound(String),

    #[error("{0}: File exists")]
    AlreadyExists(String),

    #[error("{0}: Not a directory")]
    NotDirectory(String),

    #[error("{0}: Is a directory")]
    IsDirectory(String),

    #[error("{0}: Directory not empty")]
    DirectoryNotEmpty(String),

    #[error("{0}: Permission denied")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FsError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_directory_error(&self) -> bool {
        matches!(self, Self::IsDirectory(_))
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// The path or reason the error was raised with.
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::NotFound(s)
            | Self::AlreadyExists(s)
            | Self::NotDirectory(s)
            | Self::IsDirectory(s)
            | Self::DirectoryNotEmpty(s)
            | Self::PermissionDenied(s)
            | Self::InvalidArgument(s)
            | Self::Internal(s) => s,
        }
    }

    /// The message without the subject, e.g. `No such file or directory`.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::NotFound(_) => "No such file or directory".to_string(),
            Self::AlreadyExists(_) => "File exists".to_string(),
            Self::NotDirectory(_) => "Not a directory".to_string(),
            Self::IsDirectory(_) => "Is a directory".to_string(),
            Self::DirectoryNotEmpty(_) => "Directory not empty".to_string(),
            Self::PermissionDenied(_) => "Permission denied".to_string(),
            Self::InvalidArgument(s) => format!("invalid argument: {s}"),
            Self::Internal(s) => format!("internal error: {s}"),
        }
    }

    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    #[must_use]
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    #[must_use]
    pub fn not_directory(path: impl Into<String>) -> Self {
        Self::NotDirectory(path.into())
    }

    #[must_use]
    pub fn is_directory(path: impl Into<String>) -> Self {
        Self::IsDirectory(path.into())
    }

    #[must_use]
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    #[must_use]
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

pub type FsResult<T> = Result<T, FsError>;
