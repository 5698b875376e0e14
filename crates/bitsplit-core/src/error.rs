use std::path::PathBuf;

use thiserror::Error;

pub type BitsplitResult<T> = Result<T, BitsplitError>;

/// Coarse classification of a [`BitsplitError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidKey,
    MalformedInput,
    AuthenticationFailure,
    SnapshotFailure,
    TransformFailure,
    RollbackFailure,
    NotLocked,
    KeyNotFound,
    KeyNotFoundAnywhere,
    DirectoryNotFound,
    Refused,
    Config,
    Io,
}

#[derive(Debug, Error)]
pub enum BitsplitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailure,

    #[error("snapshot of {target} failed: {source}")]
    SnapshotFailure {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed for {path}: {source}")]
    TransformFailure {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: Box<BitsplitError>,
    },

    #[error(
        "rollback failed while {stage}; original files are preserved in {snapshot} \
         (restore manually). Original error: {original}. Rollback error: {source}"
    )]
    RollbackFailure {
        stage: &'static str,
        snapshot: PathBuf,
        original: Box<BitsplitError>,
        #[source]
        source: std::io::Error,
    },

    #[error("directory {0} is not locked (no lock marker)")]
    NotLocked(PathBuf),

    #[error("key file {0} not found at this location")]
    KeyNotFound(PathBuf),

    #[error("key {digest} not found in any key store (searched: {})", display_paths(.searched))]
    KeyNotFoundAnywhere {
        digest: String,
        searched: Vec<PathBuf>,
    },

    #[error("can't find directory {0}")]
    DirectoryNotFound(PathBuf),

    #[error("refused: {0}")]
    Refused(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BitsplitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            Self::SnapshotFailure { .. } => ErrorKind::SnapshotFailure,
            Self::TransformFailure { .. } => ErrorKind::TransformFailure,
            Self::RollbackFailure { .. } => ErrorKind::RollbackFailure,
            Self::NotLocked(_) => ErrorKind::NotLocked,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::KeyNotFoundAnywhere { .. } => ErrorKind::KeyNotFoundAnywhere,
            Self::DirectoryNotFound(_) => ErrorKind::DirectoryNotFound,
            Self::Refused(_) => ErrorKind::Refused,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Only a missing key lets the caller move on to another key store.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    /// Follow `TransformFailure` wrappers down to the error that started it.
    pub fn root_cause(&self) -> &BitsplitError {
        match self {
            Self::TransformFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wrap an error raised while working on `path`.
    pub fn transform(stage: &'static str, path: impl Into<PathBuf>, source: BitsplitError) -> Self {
        Self::TransformFailure {
            stage,
            path: path.into(),
            source: Box::new(source),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
