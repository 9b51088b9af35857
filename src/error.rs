//! Error types for the resource cache and its pipelines.
//!
//! Every error is `Clone` so that a single failed load can be handed to
//! every caller that was waiting on it.

use thiserror::Error;

use crate::key::ResourceKey;

/// Image decoding failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unreadable file: {0}")]
    Unreadable(String),
    #[error("unsupported image encoding: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt image data: {0}")]
    Corrupt(String),
}

/// Shader compilation failure.
///
/// `diagnostics` holds the compiler output as produced, annotated with
/// `path:line:column` locations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{diagnostics}")]
pub struct CompileError {
    pub diagnostics: String,
}

impl CompileError {
    pub fn new(diagnostics: impl Into<String>) -> Self {
        Self {
            diagnostics: diagnostics.into(),
        }
    }
}

/// GPU object creation rejected by the device adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("invalid resource description: {0}")]
    InvalidDescription(String),
    #[error("input layout does not match shader signature: {0}")]
    InputSignatureMismatch(String),
    #[error("operation not permitted by resource usage: {0}")]
    InvalidUsage(String),
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("GPU device lost")]
    DeviceLost,
    #[error("internal device error: {0}")]
    Internal(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failure to read raw asset bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

impl SourceError {
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(path.to_string())
        } else {
            SourceError::Io {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors returned by [`ResourceCache`](crate::ResourceCache) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("failed to decode '{key}': {source}")]
    Decode {
        key: ResourceKey,
        source: DecodeError,
    },
    #[error("failed to compile '{key}':\n{source}")]
    Compile {
        key: ResourceKey,
        source: CompileError,
    },
    #[error("device rejected '{key}': {source}")]
    Device {
        key: ResourceKey,
        source: DeviceError,
    },
    #[error("resource '{0}' not found")]
    NotFound(ResourceKey),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("resource '{0}' has been released")]
    Released(ResourceKey),
    #[error("timed out waiting for '{0}' to finish loading")]
    Timeout(ResourceKey),
    #[error("loading '{0}' panicked")]
    LoadPanicked(ResourceKey),
}

impl CacheError {
    /// The key the failure is attributed to, if any.
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            Self::Decode { key, .. } | Self::Compile { key, .. } | Self::Device { key, .. } => {
                Some(key)
            }
            Self::NotFound(key)
            | Self::Released(key)
            | Self::Timeout(key)
            | Self::LoadPanicked(key) => Some(key),
            Self::InvalidArgument(_) => None,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
