//! Storage engine seam and the image-file engine.
//!
//! The controller only needs four things from an engine: open a dataset
//! file, open one whose initial content is streamed from a staged update,
//! force the file into existence, and count rows. [`StorageEngine`] and
//! [`EngineConnection`] capture exactly that, so another engine can be
//! plugged in without touching the promotion protocol.
//!
//! [`ImageEngine`] behaves like prepackaged-database engines do: opening a
//! connection never touches the disk for a file that does not exist yet.
//! Creation and the streamed copy happen on first access, which is why the
//! controller calls [`EngineConnection::ensure_materialized`] before
//! validating a fresh file.

use crate::error::{CoreError, CoreResult};
use crate::image::{write_image, ImageIndex};
use crate::record::{Collection, Record};
use explore_storage::{copy_into, CopyOptions, FileBackend};
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Byte stream over a staged update.
pub type ImageStream = Box<dyn Read + Send>;

/// A storage engine that datasets can be opened against.
pub trait StorageEngine: Send + Sync {
    /// Opens the dataset at `path`. A missing file becomes an empty dataset
    /// once the connection is materialized.
    fn open(&self, path: &Path) -> CoreResult<Box<dyn EngineConnection>>;

    /// Opens the dataset at `path`, using `source` as its initial content.
    ///
    /// Any existing file at `path` is replaced. The copy may be deferred
    /// until the connection is first used.
    fn open_from_stream(
        &self,
        path: &Path,
        source: ImageStream,
    ) -> CoreResult<Box<dyn EngineConnection>>;
}

/// An open connection to one dataset file.
pub trait EngineConnection: Send + Sync {
    /// Path of the dataset file.
    fn path(&self) -> &Path;

    /// Forces deferred file creation or content copy to happen now.
    ///
    /// # Errors
    ///
    /// Returns `StagedCorrupt` if streamed content is not a valid image.
    fn ensure_materialized(&self) -> CoreResult<()>;

    /// Number of rows in `collection`.
    fn count(&self, collection: Collection) -> CoreResult<u64>;

    /// All rows of `collection`, in storage order.
    fn scan(&self, collection: Collection) -> CoreResult<Vec<Record>>;

    /// Releases the connection. Later calls fail with `DatasetClosed`.
    fn close(&self) -> CoreResult<()>;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

/// Engine storing each dataset as a single checksummed image file.
#[derive(Debug, Clone, Default)]
pub struct ImageEngine {
    copy: CopyOptions,
}

impl ImageEngine {
    /// Creates an engine with default copy options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine streaming staged updates with `copy`.
    #[must_use]
    pub fn with_copy_options(copy: CopyOptions) -> Self {
        Self { copy }
    }
}

impl StorageEngine for ImageEngine {
    fn open(&self, path: &Path) -> CoreResult<Box<dyn EngineConnection>> {
        let state = if path.exists() {
            debug!(path = %path.display(), "opening existing dataset");
            ConnState::Ready(Ready::load(path)?)
        } else {
            debug!(path = %path.display(), "dataset missing, creation deferred");
            ConnState::Deferred(Pending::Empty)
        };

        Ok(Box::new(ImageConnection {
            path: path.to_path_buf(),
            copy: self.copy,
            state: Mutex::new(state),
        }))
    }

    fn open_from_stream(
        &self,
        path: &Path,
        source: ImageStream,
    ) -> CoreResult<Box<dyn EngineConnection>> {
        debug!(path = %path.display(), "dataset will be created from stream");
        Ok(Box::new(ImageConnection {
            path: path.to_path_buf(),
            copy: self.copy,
            state: Mutex::new(ConnState::Deferred(Pending::Stream(source))),
        }))
    }
}

enum Pending {
    Empty,
    Stream(ImageStream),
}

struct Ready {
    backend: FileBackend,
    index: ImageIndex,
}

impl Ready {
    fn load(path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open_read_only(path)?;
        let index = ImageIndex::build(&backend)?;
        Ok(Self { backend, index })
    }

    /// Loads and decodes every row, for content that is about to be promoted.
    fn load_checked(path: &Path) -> CoreResult<Self> {
        let ready = Self::load(path)?;
        ready.index.check_records(&ready.backend)?;
        Ok(ready)
    }
}

enum ConnState {
    Deferred(Pending),
    Ready(Ready),
    Closed,
}

/// Connection returned by [`ImageEngine`].
pub struct ImageConnection {
    path: PathBuf,
    copy: CopyOptions,
    state: Mutex<ConnState>,
}

impl ImageConnection {
    fn materialize(&self, pending: Pending) -> CoreResult<Ready> {
        match pending {
            Pending::Empty => {
                let mut backend = FileBackend::create(&self.path)?;
                write_image(&mut backend, 0, &[])?;
                info!(path = %self.path.display(), "created empty dataset");
                drop(backend);
                Ready::load(&self.path)
            }
            Pending::Stream(mut source) => {
                let copied = {
                    let mut backend = FileBackend::create(&self.path)?;
                    copy_into(&mut backend, &mut source, self.copy)
                };
                let copied = match copied {
                    Ok(copied) => copied,
                    Err(e) => {
                        self.discard_partial_file();
                        return Err(e.into());
                    }
                };

                match Ready::load_checked(&self.path) {
                    Ok(ready) => {
                        info!(
                            path = %self.path.display(),
                            bytes = copied,
                            "dataset created from stream"
                        );
                        Ok(ready)
                    }
                    Err(e) => {
                        self.discard_partial_file();
                        Err(CoreError::staged_corrupt(e.to_string()))
                    }
                }
            }
        }
    }

    fn discard_partial_file(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "unable to remove partial dataset");
        }
    }

    fn with_ready<T>(&self, f: impl FnOnce(&Ready) -> CoreResult<T>) -> CoreResult<T> {
        let mut state = self.state.lock();
        if matches!(*state, ConnState::Deferred(_)) {
            // A failed materialization leaves the connection closed.
            if let ConnState::Deferred(pending) = std::mem::replace(&mut *state, ConnState::Closed)
            {
                *state = ConnState::Ready(self.materialize(pending)?);
            }
        }

        match &*state {
            ConnState::Ready(ready) => f(ready),
            _ => Err(CoreError::DatasetClosed),
        }
    }
}

impl EngineConnection for ImageConnection {
    fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_materialized(&self) -> CoreResult<()> {
        self.with_ready(|_| Ok(()))
    }

    fn count(&self, collection: Collection) -> CoreResult<u64> {
        self.with_ready(|ready| Ok(ready.index.count(collection)))
    }

    fn scan(&self, collection: Collection) -> CoreResult<Vec<Record>> {
        self.with_ready(|ready| {
            ready
                .index
                .entries(collection)
                .map(|entry| ready.index.read_record(&ready.backend, entry))
                .collect()
        })
    }

    fn close(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        if !matches!(*state, ConnState::Closed) {
            debug!(path = %self.path.display(), "dataset connection closed");
        }
        *state = ConnState::Closed;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !matches!(*self.state.lock(), ConnState::Closed)
    }
}

impl fmt::Debug for ImageConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            ConnState::Deferred(_) => "deferred",
            ConnState::Ready(_) => "ready",
            ConnState::Closed => "closed",
        };
        f.debug_struct("ImageConnection")
            .field("path", &self.path)
            .field("state", &state)
            .finish()
    }
}
