//! Persisted active-identity configuration.

use crate::dir::DatasetDir;
use crate::error::CoreResult;
use crate::identity::DatasetIdentity;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::debug;

/// Key under which the active identity is stored.
pub const ACTIVE_IDENTITY_KEY: &str = "explore_database_name";

/// Persisted holder of the active dataset identity.
///
/// Implementations do not check that the named file exists on disk; keeping
/// the identity and the dataset file in sync is the controller's job.
pub trait VersionConfig: Send + Sync {
    /// Returns the persisted identity, or the seed identity if none is set.
    fn active_identity(&self) -> CoreResult<DatasetIdentity>;

    /// Persists `identity` as the active one and returns it.
    fn set_active_identity(&self, identity: DatasetIdentity) -> CoreResult<DatasetIdentity>;

    /// Persists `new` only if the current identity equals `expected`.
    ///
    /// Returns whether the value was replaced.
    fn compare_and_set(&self, expected: &DatasetIdentity, new: DatasetIdentity)
        -> CoreResult<bool>;
}

/// [`VersionConfig`] backed by the data directory's VERSION file.
///
/// The file is a flat JSON object so other string settings can live next to
/// the active identity; unknown keys are preserved on write.
#[derive(Debug)]
pub struct FileVersionConfig {
    dir: Arc<DatasetDir>,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileVersionConfig {
    /// Loads the VERSION file of `dir`. A missing or empty file is an empty
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(dir: Arc<DatasetDir>) -> CoreResult<Self> {
        let path = dir.version_path();
        let values = match fs::read(&path) {
            Ok(data) if data.is_empty() => BTreeMap::new(),
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir,
            values: Mutex::new(values),
        })
    }

    fn read_identity(values: &BTreeMap<String, String>) -> CoreResult<DatasetIdentity> {
        match values.get(ACTIVE_IDENTITY_KEY) {
            Some(name) => DatasetIdentity::new(name.clone()),
            None => Ok(DatasetIdentity::seed()),
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(values)?;
        self.dir.write_version_file(&data)
    }
}

impl VersionConfig for FileVersionConfig {
    fn active_identity(&self) -> CoreResult<DatasetIdentity> {
        Self::read_identity(&self.values.lock())
    }

    fn set_active_identity(&self, identity: DatasetIdentity) -> CoreResult<DatasetIdentity> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        next.insert(ACTIVE_IDENTITY_KEY.to_string(), identity.as_str().to_string());
        self.persist(&next)?;
        *values = next;
        debug!(identity = %identity, "active identity persisted");
        Ok(identity)
    }

    fn compare_and_set(
        &self,
        expected: &DatasetIdentity,
        new: DatasetIdentity,
    ) -> CoreResult<bool> {
        let mut values = self.values.lock();
        if &Self::read_identity(&values)? != expected {
            return Ok(false);
        }
        let mut next = values.clone();
        next.insert(ACTIVE_IDENTITY_KEY.to_string(), new.as_str().to_string());
        self.persist(&next)?;
        *values = next;
        Ok(true)
    }
}

/// In-memory [`VersionConfig`] for tests and embedders that persist the
/// identity elsewhere.
#[derive(Debug, Default)]
pub struct MemoryVersionConfig {
    value: RwLock<Option<DatasetIdentity>>,
}

impl MemoryVersionConfig {
    /// Creates an empty configuration (reads return the seed identity).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration holding `identity`.
    #[must_use]
    pub fn with_identity(identity: DatasetIdentity) -> Self {
        Self {
            value: RwLock::new(Some(identity)),
        }
    }
}

impl VersionConfig for MemoryVersionConfig {
    fn active_identity(&self) -> CoreResult<DatasetIdentity> {
        Ok(self.value.read().clone().unwrap_or_default())
    }

    fn set_active_identity(&self, identity: DatasetIdentity) -> CoreResult<DatasetIdentity> {
        *self.value.write() = Some(identity.clone());
        Ok(identity)
    }

    fn compare_and_set(
        &self,
        expected: &DatasetIdentity,
        new: DatasetIdentity,
    ) -> CoreResult<bool> {
        let mut value = self.value.write();
        if value.clone().unwrap_or_default() != *expected {
            return Ok(false);
        }
        *value = Some(new);
        Ok(true)
    }
}
