// Licensed under the Apache-2.0 license

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while packaging firmware images. None of them are
/// recoverable; callers abort the build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid size format: {0:?}")]
    InvalidSizeFormat(String),
    #[error("malformed partition table row {line}: {reason}")]
    MalformedPartitionRow { line: usize, reason: String },
    #[error("partition {0:?} not found in partition table")]
    PartitionNotFound(String),
    #[error("filesystem image encoding failed: {reason}")]
    Encode { reason: String },
    #[error("invalid semantic version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },
    #[error("firmware version {version:?} is {len} bytes; at most {max} bytes fit in the header")]
    VersionTooLong {
        version: String,
        len: usize,
        max: usize,
    },
    #[error("{what} does not exist: {}", .path.display())]
    MissingInput { what: &'static str, path: PathBuf },
    #[error("{what} is {len} bytes; payload sizes must fit in 32 bits")]
    PayloadTooLarge { what: &'static str, len: usize },
    #[error("invalid OTA image: {0}")]
    InvalidImage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub(crate) fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    /// Wraps an I/O error with a description of what was being done.
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
