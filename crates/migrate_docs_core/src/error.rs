use std::io;
use std::path::{Path, PathBuf};

pub type Result<T, E = MigrateError> = std::result::Result<T, E>;

/// Failure taxonomy of a migration run. Each variant maps to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("{0}")]
    Validation(String),

    #[error("source directory not found: {}", display(.path))]
    NotFound { path: PathBuf },

    #[error("conflict: target already exists: {}", display(.path))]
    ConflictAbort { path: PathBuf },

    #[error("{}: {source}", display(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {}: {source}", display(.path))]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid config {}: {message}", display(.path))]
    Config { path: PathBuf, message: String },
}

impl MigrateError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::NotFound { .. } | Self::Config { .. } => 1,
            Self::ConflictAbort { .. } => 2,
            Self::Io { .. } | Self::Walk { .. } => 3,
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
