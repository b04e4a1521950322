//! Dataset handles and post-open validation.

use crate::engine::EngineConnection;
use crate::error::{CoreError, CoreResult};
use crate::identity::DatasetIdentity;
use crate::record::{CashPoint, Collection, Merchant, Record};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Lifecycle state of a [`DatasetHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// The engine connection is being opened.
    Opening,
    /// Rows are being counted.
    Validating,
    /// Serving queries.
    Active,
    /// Open or validation failed; never handed to callers.
    Failed,
    /// Superseded by a forced rebuild or explicitly closed.
    Closed,
}

/// Where the dataset behind a handle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOrigin {
    /// The active identity's file already existed.
    Existing,
    /// Promoted from a downloaded staged update.
    StagedUpdate,
    /// Promoted from the bundled seed on first run.
    Seed,
}

impl DatasetOrigin {
    /// Whether the dataset content came through the staged-update location.
    #[must_use]
    pub fn is_promotion(self) -> bool {
        matches!(self, Self::StagedUpdate | Self::Seed)
    }
}

/// Row counts observed right after open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    /// Rows in the `merchant` collection.
    pub merchant_count: u64,
    /// Rows in the `atm` collection.
    pub cash_point_count: u64,
}

impl ValidationResult {
    /// Counts both collections on `connection`.
    pub fn compute(connection: &dyn EngineConnection) -> CoreResult<Self> {
        Ok(Self {
            merchant_count: connection.count(Collection::Merchant)?,
            cash_point_count: connection.count(Collection::Atm)?,
        })
    }

    /// True when both collections have rows; only then is an update
    /// finalized.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.merchant_count > 0 && self.cash_point_count > 0
    }
}

/// The opened, queryable dataset.
///
/// Handles are produced by [`DatasetController`](crate::DatasetController)
/// and shared as `Arc<DatasetHandle>`. Each carries the generation it was
/// built for; once the controller moves to a newer generation every query
/// on the old handle fails with [`CoreError::StaleHandle`].
pub struct DatasetHandle {
    identity: DatasetIdentity,
    origin: DatasetOrigin,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    connection: Box<dyn EngineConnection>,
    state: RwLock<HandleState>,
    validation: RwLock<Option<ValidationResult>>,
}

impl DatasetHandle {
    pub(crate) fn new(
        identity: DatasetIdentity,
        origin: DatasetOrigin,
        generation: u64,
        current_generation: Arc<AtomicU64>,
        connection: Box<dyn EngineConnection>,
    ) -> Self {
        Self {
            identity,
            origin,
            generation,
            current_generation,
            connection,
            state: RwLock::new(HandleState::Opening),
            validation: RwLock::new(None),
        }
    }

    /// Identity of the dataset.
    #[must_use]
    pub fn identity(&self) -> &DatasetIdentity {
        &self.identity
    }

    /// Where the dataset came from.
    #[must_use]
    pub fn origin(&self) -> DatasetOrigin {
        self.origin
    }

    /// Generation this handle was built for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        *self.state.read()
    }

    /// Counts observed during open, if validation ran.
    #[must_use]
    pub fn validation(&self) -> Option<ValidationResult> {
        *self.validation.read()
    }

    /// Whether this handle is still the controller's active one.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.state() == HandleState::Active
            && self.current_generation.load(Ordering::Acquire) == self.generation
    }

    /// Forces the engine to create or copy the dataset file now.
    pub fn ensure_materialized(&self) -> CoreResult<()> {
        self.connection.ensure_materialized()
    }

    pub(crate) fn validate(&self) -> CoreResult<ValidationResult> {
        self.set_state(HandleState::Validating);
        let result = ValidationResult::compute(self.connection.as_ref())?;
        *self.validation.write() = Some(result);
        Ok(result)
    }

    pub(crate) fn set_state(&self, state: HandleState) {
        *self.state.write() = state;
    }

    /// Marks the handle failed and releases the connection.
    pub(crate) fn fail(&self) {
        self.set_state(HandleState::Failed);
        if let Err(e) = self.connection.close() {
            warn!(identity = %self.identity, error = %e, "error closing failed dataset handle");
        }
    }

    fn ensure_queryable(&self) -> CoreResult<()> {
        match self.state() {
            HandleState::Active => {}
            _ => return Err(CoreError::DatasetClosed),
        }
        let current = self.current_generation.load(Ordering::Acquire);
        if current != self.generation {
            return Err(CoreError::StaleHandle {
                handle: self.generation,
                current,
            });
        }
        Ok(())
    }

    /// Number of rows in `collection`.
    pub fn count(&self, collection: Collection) -> CoreResult<u64> {
        self.ensure_queryable()?;
        self.connection.count(collection)
    }

    /// All merchants.
    pub fn merchants(&self) -> CoreResult<Vec<Merchant>> {
        self.ensure_queryable()?;
        Ok(self
            .connection
            .scan(Collection::Merchant)?
            .into_iter()
            .filter_map(|record| match record {
                Record::Merchant(m) => Some(m),
                Record::Atm(_) => None,
            })
            .collect())
    }

    /// All cash points.
    pub fn cash_points(&self) -> CoreResult<Vec<CashPoint>> {
        self.ensure_queryable()?;
        Ok(self
            .connection
            .scan(Collection::Atm)?
            .into_iter()
            .filter_map(|record| match record {
                Record::Atm(a) => Some(a),
                Record::Merchant(_) => None,
            })
            .collect())
    }

    /// Rows of `collection` whose name contains `query`, ignoring case.
    pub fn search(&self, collection: Collection, query: &str) -> CoreResult<Vec<Record>> {
        self.ensure_queryable()?;
        let needle = query.to_lowercase();
        Ok(self
            .connection
            .scan(collection)?
            .into_iter()
            .filter(|record| record.name().to_lowercase().contains(&needle))
            .collect())
    }

    /// Closes the handle and releases the engine connection. Idempotent.
    ///
    /// Only the controller closes handles; callers drop their `Arc` instead.
    pub(crate) fn close(&self) -> CoreResult<()> {
        self.set_state(HandleState::Closed);
        self.connection.close()
    }
}

impl fmt::Debug for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetHandle")
            .field("identity", &self.identity)
            .field("origin", &self.origin)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("validation", &self.validation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ImageEngine, StorageEngine};
    use crate::image::encode_image;
    use tempfile::tempdir;

    fn active_handle(dir: &std::path::Path, epoch: &Arc<AtomicU64>) -> DatasetHandle {
        let path = dir.join("base.db");
        let records: Vec<Record> = vec![
            Merchant {
                id: 1,
                name: "Green Grocer".into(),
                ..Merchant::default()
            }
            .into(),
            Merchant {
                id: 2,
                name: "Blue Bottle".into(),
                ..Merchant::default()
            }
            .into(),
            CashPoint {
                id: 1,
                name: "Mall ATM".into(),
                ..CashPoint::default()
            }
            .into(),
        ];
        std::fs::write(&path, encode_image(1, &records).unwrap()).unwrap();

        let conn = ImageEngine::new().open(&path).unwrap();
        let handle = DatasetHandle::new(
            DatasetIdentity::seed(),
            DatasetOrigin::Existing,
            epoch.load(Ordering::Acquire),
            Arc::clone(epoch),
            conn,
        );
        handle.validate().unwrap();
        handle.set_state(HandleState::Active);
        handle
    }

    #[test]
    fn validation_result_completeness() {
        let full = ValidationResult {
            merchant_count: 120,
            cash_point_count: 34,
        };
        let no_atms = ValidationResult {
            merchant_count: 120,
            cash_point_count: 0,
        };
        assert!(full.is_complete());
        assert!(!no_atms.is_complete());
    }

    #[test]
    fn validate_records_counts() {
        let temp = tempdir().unwrap();
        let epoch = Arc::new(AtomicU64::new(1));
        let handle = active_handle(temp.path(), &epoch);

        assert_eq!(
            handle.validation(),
            Some(ValidationResult {
                merchant_count: 2,
                cash_point_count: 1
            })
        );
        assert!(handle.is_current());
    }

    #[test]
    fn queries_on_active_handle() {
        let temp = tempdir().unwrap();
        let epoch = Arc::new(AtomicU64::new(1));
        let handle = active_handle(temp.path(), &epoch);

        assert_eq!(handle.merchants().unwrap().len(), 2);
        assert_eq!(handle.cash_points().unwrap()[0].name, "Mall ATM");

        let hits = handle.search(Collection::Merchant, "bLUE").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name(), "Blue Bottle");
    }

    #[test]
    fn superseded_generation_is_stale() {
        let temp = tempdir().unwrap();
        let epoch = Arc::new(AtomicU64::new(1));
        let handle = active_handle(temp.path(), &epoch);

        epoch.store(2, Ordering::Release);

        assert!(!handle.is_current());
        assert!(matches!(
            handle.count(Collection::Merchant),
            Err(CoreError::StaleHandle {
                handle: 1,
                current: 2
            })
        ));
    }

    #[test]
    fn closed_handle_rejects_queries() {
        let temp = tempdir().unwrap();
        let epoch = Arc::new(AtomicU64::new(1));
        let handle = active_handle(temp.path(), &epoch);

        handle.close().unwrap();
        handle.close().unwrap();
        assert_eq!(handle.state(), HandleState::Closed);
        assert!(matches!(handle.merchants(), Err(CoreError::DatasetClosed)));
    }

    #[test]
    fn failed_handle_releases_connection() {
        let temp = tempdir().unwrap();
        let epoch = Arc::new(AtomicU64::new(1));
        let handle = active_handle(temp.path(), &epoch);

        handle.fail();
        // A second release is harmless.
        handle.fail();

        assert_eq!(handle.state(), HandleState::Failed);
        assert!(!handle.is_current());
        assert!(!handle.connection.is_open());
        assert!(matches!(handle.count(Collection::Atm), Err(CoreError::DatasetClosed)));
    }
}
