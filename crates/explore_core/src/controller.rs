//! Dataset update and swap controller.

use crate::config::Config;
use crate::dir::DatasetDir;
use crate::engine::{ImageEngine, StorageEngine};
use crate::error::CoreResult;
use crate::handle::{DatasetHandle, DatasetOrigin, HandleState};
use crate::identity::DatasetIdentity;
use crate::update_source::{FsUpdateSource, UpdateSource};
use crate::version::{FileVersionConfig, VersionConfig};
use explore_storage::CopyOptions;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decides which dataset to serve and promotes staged updates.
///
/// On each build the controller reconciles three sources of truth: the
/// active identity persisted by [`VersionConfig`], the dataset file that
/// identity names, and an optional staged update offered by
/// [`UpdateSource`]. The outcome is a single validated [`DatasetHandle`]
/// cached as the active instance until [`force_update`](Self::force_update)
/// or [`close`](Self::close).
///
/// # Opening
///
/// ```rust,ignore
/// use explore_core::{Config, DatasetController};
/// use std::path::Path;
///
/// let controller = DatasetController::open_dir(
///     Path::new("explore"),
///     Config::default().seed_path("assets/explore.db"),
/// )?;
///
/// let dataset = controller.open()?;
/// println!("{} merchants", dataset.merchants()?.len());
/// ```
///
/// # Concurrency
///
/// The cache is guarded by a mutex held for the whole build, so concurrent
/// first access builds exactly one handle. Building performs blocking file
/// I/O; with the `async` feature, [`open_async`](Self::open_async) moves it
/// onto tokio's blocking pool.
pub struct DatasetController {
    /// Directory holding the dataset files.
    root: PathBuf,
    /// Persisted active identity.
    version: Arc<dyn VersionConfig>,
    /// Staged updates and the bundled seed.
    source: Arc<dyn UpdateSource>,
    /// Engine datasets are opened against.
    engine: Arc<dyn StorageEngine>,
    /// The cached active handle.
    active: Mutex<Option<Arc<DatasetHandle>>>,
    /// Generation of the handle that may serve queries.
    generation: Arc<AtomicU64>,
}

impl DatasetController {
    /// Creates a controller over explicit collaborators.
    ///
    /// Dataset files live in `root`, named after their identity.
    pub fn new(
        root: impl Into<PathBuf>,
        version: Arc<dyn VersionConfig>,
        source: Arc<dyn UpdateSource>,
        engine: Arc<dyn StorageEngine>,
    ) -> Self {
        Self {
            root: root.into(),
            version,
            source,
            engine,
            active: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a controller over a data directory with the file-backed
    /// collaborators.
    ///
    /// Nothing is opened yet; the first [`open`](Self::open) runs the
    /// protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the directory lock (`DirectoryLocked`)
    /// - The VERSION file cannot be parsed
    pub fn open_dir(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = Arc::new(DatasetDir::open(
            path,
            config.create_if_missing,
            config.lock_directory,
        )?);
        let version = FileVersionConfig::load(Arc::clone(&dir))?;
        let source = FsUpdateSource::new(Arc::clone(&dir), config.seed_path.clone());
        let engine = ImageEngine::with_copy_options(
            CopyOptions::default()
                .chunk_size(config.copy_chunk_size)
                .timeout(config.copy_timeout),
        );

        Ok(Self::new(
            dir.path(),
            Arc::new(version),
            Arc::new(source),
            Arc::new(engine),
        ))
    }

    /// Directory holding the dataset files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generation a newly built handle would carry.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the active dataset, building it if none is cached or the
    /// cached handle is no longer current.
    ///
    /// # Errors
    ///
    /// Returns `SeedUnavailable` if this is the first run and the bundled
    /// seed cannot be copied, `StagedCorrupt` if a staged update is not a
    /// valid image, or the underlying error if the active file cannot be
    /// opened. Failed deletions are logged and never returned.
    pub fn open(&self) -> CoreResult<Arc<DatasetHandle>> {
        let mut active = self.active.lock();
        if let Some(handle) = active.as_ref().filter(|handle| handle.is_current()) {
            return Ok(Arc::clone(handle));
        }

        if let Some(dead) = active.take() {
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            warn!(
                identity = %dead.identity(),
                state = ?dead.state(),
                generation,
                "cached dataset handle is no longer active, rebuilding"
            );
            if let Err(e) = dead.close() {
                warn!(error = %e, "error closing dead dataset handle");
            }
        }

        let handle = self.build()?;
        *active = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Closes the cached handle, if any, and re-runs the full protocol.
    ///
    /// The old handle's generation is retired before it is closed, so
    /// queries still running against it fail with `StaleHandle` or
    /// `DatasetClosed` instead of reading released resources.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open). On error no handle is cached; the next
    /// call to `open` tries again.
    pub fn force_update(&self) -> CoreResult<Arc<DatasetHandle>> {
        let mut active = self.active.lock();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(old) = active.take() {
            info!(
                identity = %old.identity(),
                generation,
                "closing superseded dataset handle"
            );
            if let Err(e) = old.close() {
                warn!(error = %e, "error closing superseded dataset handle");
            }
        }

        let handle = self.build()?;
        *active = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Returns the cached handle without building one.
    ///
    /// Blocks while another thread is building.
    #[must_use]
    pub fn active(&self) -> Option<Arc<DatasetHandle>> {
        self.active.lock().clone()
    }

    /// Closes and forgets the cached handle.
    pub fn close(&self) -> CoreResult<()> {
        let mut active = self.active.lock();
        if let Some(handle) = active.take() {
            self.generation.fetch_add(1, Ordering::AcqRel);
            handle.close()?;
            debug!(identity = %handle.identity(), "dataset controller closed");
        }
        Ok(())
    }

    fn dataset_path(&self, identity: &DatasetIdentity) -> PathBuf {
        self.root.join(identity.file_name())
    }

    fn build(&self) -> CoreResult<Arc<DatasetHandle>> {
        let current = self.version.active_identity()?;
        let current_path = self.dataset_path(&current);
        let mut staged = self.source.has_staged_update();

        let first_run = !staged && !current_path.exists();
        if first_run {
            info!(identity = %current, "no dataset on disk, preloading bundled seed");
            self.source
                .preload_seed_into(&self.source.staged_update_path())?;
            staged = true;
        }

        // Deletes the staged file on every exit path from here on.
        let _cleanup = StagedCleanup {
            source: self.source.as_ref(),
            armed: staged,
        };

        let (identity, origin) = if first_run {
            let seed = DatasetIdentity::seed();
            if current != seed && !self.version.compare_and_set(&current, seed.clone())? {
                warn!(expected = %current, "active identity changed while reseeding");
                self.version.set_active_identity(seed.clone())?;
            }
            (seed, DatasetOrigin::Seed)
        } else if staged {
            let timestamp = self.source.staged_update_timestamp()?;
            self.source.delete_file(&current_path);
            let next = self
                .version
                .set_active_identity(DatasetIdentity::from_timestamp(timestamp))?;
            info!(from = %current, to = %next, "promoting staged update");
            (next, DatasetOrigin::StagedUpdate)
        } else {
            (current, DatasetOrigin::Existing)
        };

        let path = self.dataset_path(&identity);
        let existed = path.exists();
        let connection = if staged {
            let stream = self.source.open_staged_update_stream()?;
            self.engine.open_from_stream(&path, stream)?
        } else {
            self.engine.open(&path)?
        };

        let handle = Arc::new(DatasetHandle::new(
            identity,
            origin,
            self.generation.load(Ordering::Acquire),
            Arc::clone(&self.generation),
            connection,
        ));

        // Streamed content replaces whatever was on disk, so it is fresh too.
        let fresh = staged || !existed;
        if let Err(e) = self.activate(&handle, fresh) {
            warn!(identity = %handle.identity(), error = %e, "dataset open failed");
            handle.fail();
            return Err(e);
        }
        Ok(handle)
    }

    fn activate(&self, handle: &DatasetHandle, fresh: bool) -> CoreResult<()> {
        if fresh {
            handle.ensure_materialized()?;
        }

        let result = handle.validate()?;
        if handle.origin().is_promotion() {
            if result.is_complete() {
                self.source.finalize_update();
            } else {
                warn!(
                    identity = %handle.identity(),
                    merchants = result.merchant_count,
                    cash_points = result.cash_point_count,
                    "promoted dataset is incomplete, serving it anyway"
                );
            }
        }

        handle.set_state(HandleState::Active);
        info!(
            identity = %handle.identity(),
            origin = ?handle.origin(),
            generation = handle.generation(),
            merchants = result.merchant_count,
            cash_points = result.cash_point_count,
            "dataset active"
        );
        Ok(())
    }
}

#[cfg(feature = "async")]
impl DatasetController {
    /// Runs [`open`](Self::open) on tokio's blocking pool.
    pub async fn open_async(self: Arc<Self>) -> CoreResult<Arc<DatasetHandle>> {
        tokio::task::spawn_blocking(move || self.open())
            .await
            .map_err(|e| crate::error::CoreError::Background {
                message: e.to_string(),
            })?
    }

    /// Runs [`force_update`](Self::force_update) on tokio's blocking pool.
    pub async fn force_update_async(self: Arc<Self>) -> CoreResult<Arc<DatasetHandle>> {
        tokio::task::spawn_blocking(move || self.force_update())
            .await
            .map_err(|e| crate::error::CoreError::Background {
                message: e.to_string(),
            })?
    }
}

impl fmt::Debug for DatasetController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetController")
            .field("root", &self.root)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

struct StagedCleanup<'a> {
    source: &'a dyn UpdateSource,
    armed: bool,
}

impl Drop for StagedCleanup<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.source.delete_file(&self.source.staged_update_path());
        }
    }
}
