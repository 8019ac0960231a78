//! Error types for Hoard
//!
//! All modules use `HoardResult<T>` as their return type.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for Hoard operations
pub type HoardResult<T> = Result<T, HoardError>;

/// Coarse classification used by batch callers to decide skip vs abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing configuration, never retried
    Config,
    /// Cache entry or manifest failed verification
    Integrity,
    /// Network or storage failure during a transfer
    Transfer,
    /// Operation refused to overwrite existing content
    Policy,
    /// Source path or remote object does not exist
    NotFound,
    /// Local filesystem failure
    Io,
    /// Anything else
    Internal,
}

/// All errors that can occur in Hoard
#[derive(Error, Debug)]
pub enum HoardError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't find remote section '{0}' in config")]
    RemoteNotFound(String),

    #[error("Wrong cloud type '{0}' specified")]
    UnknownCloudType(String),

    #[error("Can't find cloud section '[{0}]' in config")]
    CloudSectionMissing(String),

    #[error("Unsupported scheme '{scheme}' in '{url}'")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("Unknown format of url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Remote '{location}' is not usable: {reason}")]
    RemoteUnreachable { location: String, reason: String },

    #[error("Unknown cache type '{0}'")]
    UnknownLinkType(String),

    // Integrity errors
    #[error("Corrupted cache file for {0}")]
    CorruptedCache(String),

    #[error("Failed to load directory manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Malformed checksum '{0}'")]
    InvalidChecksum(String),

    #[error("Manifest entry '{0}' escapes its directory")]
    UnsafeRelpath(String),

    #[error("Integrity tag mismatch copying {location}: expected {expected}, got {actual}")]
    EtagMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    // Transfer errors
    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: opendal::Error,
    },

    #[error("{failed} of {total} items failed to {operation}")]
    BatchFailed {
        operation: &'static str,
        failed: usize,
        total: usize,
    },

    // Policy errors
    #[error("Data '{0}' exists and differs from the cache; use force to overwrite")]
    WouldOverwrite(PathBuf),

    // Not-found errors
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Cache '{0}' not found")]
    CacheMissing(String),

    #[error("Remote object not found: {0}")]
    RemoteMissing(String),

    // Filesystem errors
    #[error("Symlink loop detected at {0}")]
    SymlinkLoop(PathBuf),

    #[error("Path is not a file or directory: {0}")]
    NotFileOrDir(PathBuf),

    #[error("No cache type could link {path}: {tried}")]
    LinkFailed { path: PathBuf, tried: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl HoardError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an IO error for `path`, reporting a vanished path as not-found
    pub fn io_at(path: &Path, context: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::PathNotFound(path.to_path_buf());
        }
        Self::io(format!("{} {}", context.into(), path.display()), source)
    }

    /// Create a storage backend error with context
    pub fn storage(context: impl Into<String>, source: opendal::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Classify the error for skip/abort decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigInvalid { .. }
            | Self::ConfigDirCreate { .. }
            | Self::RemoteNotFound(_)
            | Self::UnknownCloudType(_)
            | Self::CloudSectionMissing(_)
            | Self::UnsupportedScheme { .. }
            | Self::InvalidUrl { .. }
            | Self::RemoteUnreachable { .. }
            | Self::UnknownLinkType(_)
            | Self::TomlParse(_)
            | Self::TomlSerialize(_) => ErrorKind::Config,

            Self::CorruptedCache(_)
            | Self::ManifestInvalid { .. }
            | Self::InvalidChecksum(_)
            | Self::UnsafeRelpath(_)
            | Self::EtagMismatch { .. }
            | Self::Json(_) => ErrorKind::Integrity,

            Self::Storage { source, .. } if source.kind() == opendal::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Storage { .. } | Self::BatchFailed { .. } => ErrorKind::Transfer,

            Self::WouldOverwrite(_) => ErrorKind::Policy,

            Self::PathNotFound(_) | Self::CacheMissing(_) | Self::RemoteMissing(_) => {
                ErrorKind::NotFound
            }
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }

            Self::SymlinkLoop(_)
            | Self::NotFileOrDir(_)
            | Self::LinkFailed { .. }
            | Self::Io { .. } => ErrorKind::Io,

            Self::Internal(_) | Self::User(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { source, .. } => source.is_temporary(),
            _ => false,
        }
    }

    /// Whether a batch operation may skip this item and keep going
    pub fn is_skippable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Integrity | ErrorKind::Transfer
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RemoteNotFound(_) => Some("Add a [remote.<name>] section with a url"),
            Self::UnsupportedScheme { .. } => {
                Some("Supported schemes: s3, gs, azure, hdfs, ssh, memory, or a local path")
            }
            Self::WouldOverwrite(_) => Some("Re-run with --force to discard local changes"),
            Self::CacheMissing(_) => Some("Run: hoard pull"),
            Self::LinkFailed { .. } => Some("Add \"copy\" to the [cache] type list"),
            _ => None,
        }
    }
}
