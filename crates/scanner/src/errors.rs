//! Error types for container scanning and metadata extraction

use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

/// Failures while enumerating or reading container entries
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("IO error while reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error while reading {path}: {source}")]
    Zip {
        path: String,
        #[source]
        source: ZipError,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    /// The owning container was closed before the operation ran
    #[error("container {path} is closed")]
    Closed { path: String },

    #[error("{path:?} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("container path must not be empty")]
    EmptyPath,
}

/// A compiled unit whose bytes do not form a valid class file
#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("malformed descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("malformed annotation: {0}")]
    InvalidAnnotation(String),
}

/// One loader context that could not produce the requested unit
#[derive(Debug)]
pub struct LoadAttempt {
    pub loader: String,
    pub reason: String,
}

/// A unit that could not be resolved from its entry.
///
/// Resolution errors are per-entry: scans skip the entry and continue.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{name} could not be resolved by any loader: {}", format_attempts(.attempts))]
    Unresolved {
        name: String,
        attempts: Vec<LoadAttempt>,
    },

    #[error("{path} is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("{path} is not a resolvable unit path")]
    InvalidPath { path: String },
}

fn format_attempts(attempts: &[LoadAttempt]) -> String {
    if attempts.is_empty() {
        return "no loaders configured".to_string();
    }
    attempts
        .iter()
        .map(|attempt| format!("[{}] {}", attempt.loader, attempt.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Scan configuration could not be read
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scan configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
