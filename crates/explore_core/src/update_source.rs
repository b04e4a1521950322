//! Staged updates and the bundled seed.
//!
//! The download job drops a replacement image at the staged-update location
//! and raises a pending indicator; the controller consumes it through
//! [`UpdateSource`]. [`FsUpdateSource`] is the file-system implementation
//! over a [`DatasetDir`].

use crate::dir::DatasetDir;
use crate::engine::ImageStream;
use crate::error::{CoreError, CoreResult};
use crate::image::read_header;
use explore_storage::FileBackend;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A staged update as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    /// Location of the staged image.
    pub path: PathBuf,
    /// Version timestamp embedded in the image.
    pub timestamp: i64,
}

/// Source of staged updates, consumed by the controller.
pub trait UpdateSource: Send + Sync {
    /// Location where staged updates (and the first-run seed copy) live.
    fn staged_update_path(&self) -> PathBuf;

    /// Whether a staged update is waiting.
    fn has_staged_update(&self) -> bool;

    /// Version timestamp embedded in the staged update.
    ///
    /// Only meaningful when [`has_staged_update`](Self::has_staged_update)
    /// is true.
    ///
    /// # Errors
    ///
    /// Returns `StagedCorrupt` if the version cannot be read.
    fn staged_update_timestamp(&self) -> CoreResult<i64>;

    /// Byte stream over the staged update.
    fn open_staged_update_stream(&self) -> CoreResult<ImageStream>;

    /// Copies the bundled seed to `target` (first run only).
    ///
    /// # Errors
    ///
    /// Returns `SeedUnavailable` if the seed cannot be copied.
    fn preload_seed_into(&self, target: &Path) -> CoreResult<()>;

    /// Best-effort delete. Failures are logged and reported as `false`.
    fn delete_file(&self, path: &Path) -> bool;

    /// Clears the externally visible "update pending" indicator.
    fn finalize_update(&self);
}

/// [`UpdateSource`] backed by the data directory.
#[derive(Debug, Clone)]
pub struct FsUpdateSource {
    dir: Arc<DatasetDir>,
    seed_path: Option<PathBuf>,
}

impl FsUpdateSource {
    /// Creates a source over `dir` with an optional bundled seed location.
    #[must_use]
    pub fn new(dir: Arc<DatasetDir>, seed_path: Option<PathBuf>) -> Self {
        Self { dir, seed_path }
    }

    /// Copies a downloaded image into the staged-update location and raises
    /// the pending indicator.
    ///
    /// This is the hand-off point for the download job; the controller picks
    /// the update up on its next `open()` or `force_update()`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `image` has no readable header, or an I/O
    /// error if the copy fails.
    pub fn stage_update(&self, image: &Path) -> CoreResult<StagedUpdate> {
        let header = read_header(&FileBackend::open_read_only(image)?)?;
        let staged = self.staged_update_path();

        copy_atomically(image, &staged)?;
        fs::write(self.dir.pending_marker_path(), header.timestamp.to_string())?;
        self.dir.sync_directory()?;

        info!(
            source = %image.display(),
            timestamp = header.timestamp,
            "explore dataset update staged"
        );
        Ok(StagedUpdate {
            path: staged,
            timestamp: header.timestamp,
        })
    }

    /// Whether the pending-update indicator is raised.
    #[must_use]
    pub fn is_update_pending(&self) -> bool {
        self.dir.pending_marker_path().exists()
    }
}

impl UpdateSource for FsUpdateSource {
    fn staged_update_path(&self) -> PathBuf {
        self.dir.staged_path()
    }

    fn has_staged_update(&self) -> bool {
        self.dir.staged_path().is_file()
    }

    fn staged_update_timestamp(&self) -> CoreResult<i64> {
        let path = self.dir.staged_path();
        let backend = FileBackend::open_read_only(&path)?;
        read_header(&backend)
            .map(|header| header.timestamp)
            .map_err(|e| CoreError::staged_corrupt(format!("{}: {e}", path.display())))
    }

    fn open_staged_update_stream(&self) -> CoreResult<ImageStream> {
        let file = File::open(self.dir.staged_path())?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn preload_seed_into(&self, target: &Path) -> CoreResult<()> {
        let Some(seed) = &self.seed_path else {
            return Err(CoreError::seed_unavailable(
                target,
                "no bundled seed configured",
            ));
        };

        copy_atomically(seed, target)
            .map_err(|e| CoreError::seed_unavailable(seed, e.to_string()))?;
        info!(seed = %seed.display(), target = %target.display(), "bundled seed preloaded");
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "nothing to delete");
                false
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unable to delete");
                false
            }
        }
    }

    fn finalize_update(&self) {
        match fs::remove_file(self.dir.pending_marker_path()) {
            Ok(()) => info!("explore dataset update finalized"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "unable to clear pending update indicator"),
        }
    }
}

/// Copies `from` to `to` via a sibling temp file and a rename, so a reader
/// never sees a half-written target.
fn copy_atomically(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = to.with_extension("partial");
    let result = fs::copy(from, &temp)
        .and_then(|_| File::open(&temp)?.sync_all())
        .and_then(|()| fs::rename(&temp, to));
    if result.is_err() {
        match fs::remove_file(&temp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %temp.display(), error = %e, "unable to remove partial copy"),
        }
    }
    result
}
