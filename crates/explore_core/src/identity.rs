//! Dataset identities.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Identity of the bundled seed dataset.
pub const DEFAULT_IDENTITY: &str = "base";

/// Prefix of identities derived from an update's embedded timestamp.
pub const IDENTITY_PREFIX: &str = "base_";

/// File extension of dataset files.
pub const DATASET_EXTENSION: &str = "db";

/// Name of the dataset currently designated as active.
///
/// Either [`DEFAULT_IDENTITY`] or `base_<timestampMillis>`. The identity also
/// names the dataset file: `<name>.db` inside the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetIdentity(String);

impl DatasetIdentity {
    /// Creates an identity from a persisted string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` for empty names and names that could escape
    /// the data directory.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(CoreError::invalid_identity(name));
        }
        Ok(Self(name))
    }

    /// The compiled-in identity of the bundled seed.
    #[must_use]
    pub fn seed() -> Self {
        Self(DEFAULT_IDENTITY.to_string())
    }

    /// Derives the identity of an update from its embedded timestamp.
    #[must_use]
    pub fn from_timestamp(timestamp_millis: i64) -> Self {
        Self(format!("{IDENTITY_PREFIX}{timestamp_millis}"))
    }

    /// Returns the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the dataset file name for this identity.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{DATASET_EXTENSION}", self.0)
    }

    /// Returns true for the bundled seed identity.
    #[must_use]
    pub fn is_seed(&self) -> bool {
        self.0 == DEFAULT_IDENTITY
    }

    /// Returns the timestamp embedded in an update identity.
    #[must_use]
    pub fn timestamp(&self) -> Option<i64> {
        self.0.strip_prefix(IDENTITY_PREFIX)?.parse().ok()
    }
}

impl Default for DatasetIdentity {
    fn default() -> Self {
        Self::seed()
    }
}

impl fmt::Display for DatasetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatasetIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
