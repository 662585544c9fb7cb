//! Error taxonomy for the integrity and lifecycle core.
//!
//! Every variant carries the context needed to diagnose a failure without
//! re-running the command: the offending path, both digests, or the violated
//! engine bound. Nothing here is retried; the caller decides what to do.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse classification used by callers and the CLI exit code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    ManifestMissing,
    ManifestCorrupt,
    VersionFormat,
    EngineIncompatible,
    IntegrityViolation,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config_error",
            ErrorKind::ManifestMissing => "manifest_missing",
            ErrorKind::ManifestCorrupt => "manifest_corrupt",
            ErrorKind::VersionFormat => "version_format_error",
            ErrorKind::EngineIncompatible => "engine_incompatible",
            ErrorKind::IntegrityViolation => "integrity_violation",
            ErrorKind::Io => "io_error",
        };
        f.write_str(s)
    }
}

/// Which side of the compatibility window was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineBound {
    Min,
    Max,
}

impl fmt::Display for EngineBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineBound::Min => f.write_str("min_engine"),
            EngineBound::Max => f.write_str("max_engine"),
        }
    }
}

/// A snapshot entry that rotation could not remove.
#[derive(Debug)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.source)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}{}", fmt_path(.path))]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Manifest not found: {}", .path.display())]
    ManifestMissing { path: PathBuf },

    #[error("Manifest unparsable at {}: {reason}", .path.display())]
    ManifestCorrupt { path: PathBuf, reason: String },

    #[error("Invalid semantic version for {field}: '{value}' ({reason})")]
    VersionFormat {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Engine {engine} violates {bound} {limit}")]
    EngineIncompatible {
        engine: String,
        bound: EngineBound,
        limit: String,
    },

    #[error("Integrity violation: {path} (expected {expected}, got {actual})")]
    IntegrityViolation {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid exclusion pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to remove {} snapshot entries: {}", .failures.len(), join_failures(.failures))]
    SnapshotCleanup { failures: Vec<CleanupFailure> },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Config { .. } | CoreError::InvalidPattern { .. } => ErrorKind::Config,
            CoreError::ManifestMissing { .. } => ErrorKind::ManifestMissing,
            CoreError::ManifestCorrupt { .. } => ErrorKind::ManifestCorrupt,
            CoreError::VersionFormat { .. } => ErrorKind::VersionFormat,
            CoreError::EngineIncompatible { .. } => ErrorKind::EngineIncompatible,
            CoreError::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            CoreError::Io { .. } | CoreError::SnapshotCleanup { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        CoreError::Config {
            message: message.into(),
            path: None,
        }
    }

    pub(crate) fn config_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        CoreError::Config {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" ({})", p.display()),
        None => String::new(),
    }
}

fn join_failures(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = CoreError::InvalidPattern {
            pattern: "[".into(),
            reason: "unclosed".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = CoreError::SnapshotCleanup { failures: vec![] };
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_integrity_message_names_path_and_digests() {
        let err = CoreError::IntegrityViolation {
            path: "roles/web.yml".into(),
            expected: "sha256:aa".into(),
            actual: "sha256:bb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("roles/web.yml"));
        assert!(msg.contains("sha256:aa"));
        assert!(msg.contains("sha256:bb"));
    }

    #[test]
    fn test_engine_message_names_bound() {
        let err = CoreError::EngineIncompatible {
            engine: "0.9.0".into(),
            bound: EngineBound::Min,
            limit: "1.0.0".into(),
        };
        assert_eq!(err.to_string(), "Engine 0.9.0 violates min_engine 1.0.0");
    }

    #[test]
    fn test_cleanup_message_lists_every_entry() {
        let err = CoreError::SnapshotCleanup {
            failures: vec![
                CleanupFailure {
                    path: PathBuf::from("snapshots/a"),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                },
                CleanupFailure {
                    path: PathBuf::from("snapshots/b"),
                    source: io::Error::new(io::ErrorKind::Other, "busy"),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to remove 2 snapshot entries"));
        assert!(msg.contains("snapshots/a: denied"));
        assert!(msg.contains("snapshots/b: busy"));
    }
}
