//! Error types for the explore dataset core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while resolving, promoting or querying a dataset.
///
/// Only some of these ever reach the caller of
/// [`DatasetController::open`](crate::DatasetController::open); see
/// [`CoreError::is_fatal`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] explore_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The VERSION file could not be parsed or written.
    #[error("version config error: {0}")]
    VersionConfig(#[from] serde_json::Error),

    /// The bundled seed could not be copied. No dataset can be produced.
    #[error("bundled seed unavailable at {path}: {message}")]
    SeedUnavailable {
        /// Where the seed was expected.
        path: PathBuf,
        /// Why the copy failed.
        message: String,
    },

    /// The engine could not open the streamed staged update.
    #[error("staged update is not a valid dataset image: {message}")]
    StagedCorrupt {
        /// Description of the failure.
        message: String,
    },

    /// Invalid dataset image or directory format.
    #[error("invalid dataset format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Checksum mismatch in a dataset image.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the image footer.
        expected: u32,
        /// Checksum computed over the image.
        actual: u32,
    },

    /// The dataset identity string is not usable as a file name.
    #[error("invalid dataset identity: {name:?}")]
    InvalidIdentity {
        /// The rejected identity.
        name: String,
    },

    /// The handle or connection has been closed.
    #[error("dataset is closed")]
    DatasetClosed,

    /// The handle was superseded by a forced rebuild.
    #[error("stale dataset handle: generation {handle} superseded by {current}")]
    StaleHandle {
        /// Generation of the handle the query was issued on.
        handle: u64,
        /// Generation of the currently active handle.
        current: u64,
    },

    /// Another process holds the data directory lock.
    #[error("data directory locked: another process has exclusive access")]
    DirectoryLocked,

    /// The blocking open task could not be joined.
    #[error("background open failed: {message}")]
    Background {
        /// Description of the join failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a seed unavailable error.
    pub fn seed_unavailable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SeedUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a staged corrupt error.
    pub fn staged_corrupt(message: impl Into<String>) -> Self {
        Self::StagedCorrupt {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid identity error.
    pub fn invalid_identity(name: impl Into<String>) -> Self {
        Self::InvalidIdentity { name: name.into() }
    }

    /// Returns true if this error means no usable dataset could be produced
    /// for the current open attempt.
    ///
    /// Deletion failures are recovered inside the controller and never
    /// surface, so everything that does reach a caller of `open()` is fatal
    /// for that attempt. Query errors on a handle are not.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::DatasetClosed | Self::StaleHandle { .. } | Self::Codec { .. }
        )
    }
}
