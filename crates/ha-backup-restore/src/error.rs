//! Error types for backup restore
//!
//! Every error exposes an `error_type` name. The name is written to the
//! restore result file and matches the exception class names the supervisor
//! already understands (`ValueError`, `KeyError`, `IsADirectoryError`, ...).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for restore operations
pub type BackupResult<T> = Result<T, RestoreError>;

/// Errors that can be recorded in the restore result file
pub trait ErrorType: std::fmt::Display {
    /// Class name reported as `error_type` in the result file
    fn error_type(&self) -> &'static str;
}

/// Errors reading the restore instruction file
///
/// These are not fatal: the instruction is discarded and startup continues.
#[derive(Debug, Error)]
pub enum InstructionError {
    /// The instruction file exists but could not be read
    #[error("{source}: '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The instruction file is not valid JSON
    #[error("{0}")]
    Json(#[source] serde_json::Error),

    /// A required key is missing
    #[error("'{key}'")]
    MissingKey { key: &'static str },

    /// A key is present but holds the wrong kind of value
    #[error("invalid restore instruction: {reason}")]
    InvalidValue { reason: String },
}

impl ErrorType for InstructionError {
    fn error_type(&self) -> &'static str {
        match self {
            Self::Read { source, .. } => io_error_type(source),
            Self::Json(_) => "JSONDecodeError",
            Self::MissingKey { .. } => "KeyError",
            Self::InvalidValue { .. } => "ValueError",
        }
    }
}

/// Fatal errors during a restore attempt
#[derive(Debug, Error)]
pub enum RestoreError {
    /// The archive named by the instruction does not exist
    #[error("Backup file {} does not exist", path.display())]
    BackupNotFound { path: PathBuf },

    /// The backup was made by a newer Home Assistant
    #[error("You need at least Home Assistant version {required} to restore this backup")]
    UnsupportedVersion { required: String },

    /// A version string could not be parsed
    #[error("invalid Home Assistant version '{version}'")]
    InvalidVersion { version: String },

    /// The outer archive lacks an expected member
    #[error("backup file {} has no member {member}", path.display())]
    MissingMember { path: PathBuf, member: String },

    /// The backup descriptor is not valid JSON or misses fields
    #[error("invalid backup descriptor in {}: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The archive stream is corrupt, truncated or could not be decrypted
    #[error("failed to read backup file {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Filesystem error in the configuration directory
    #[error("{source}: '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RestoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }
}

impl ErrorType for RestoreError {
    fn error_type(&self) -> &'static str {
        match self {
            Self::BackupNotFound { .. }
            | Self::UnsupportedVersion { .. }
            | Self::InvalidVersion { .. } => "ValueError",
            Self::MissingMember { .. } => "FileNotFoundError",
            Self::Descriptor { .. } => "JSONDecodeError",
            Self::Archive { .. } => "ReadError",
            Self::Io { source, .. } => io_error_type(source),
        }
    }
}

fn io_error_type(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::NotFound => "FileNotFoundError",
        io::ErrorKind::PermissionDenied => "PermissionError",
        io::ErrorKind::AlreadyExists => "FileExistsError",
        io::ErrorKind::IsADirectory => "IsADirectoryError",
        io::ErrorKind::NotADirectory => "NotADirectoryError",
        _ => "OSError",
    }
}
