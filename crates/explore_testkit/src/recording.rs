//! Recording collaborators.
//!
//! Wrappers around an [`UpdateSource`] and a [`StorageEngine`] that delegate
//! to the real implementation and log every call, so tests can assert on
//! what the controller asked for and in which order.

use explore_core::{
    Collection, CoreResult, EngineConnection, ImageStream, Record, StorageEngine, UpdateSource,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A call made on a [`RecordingUpdateSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    /// `has_staged_update`
    HasStagedUpdate,
    /// `staged_update_timestamp`
    StagedTimestamp,
    /// `open_staged_update_stream`
    OpenStream,
    /// `preload_seed_into` with its target
    PreloadSeed(PathBuf),
    /// `delete_file` with its path
    Delete(PathBuf),
    /// `finalize_update`
    Finalize,
}

/// [`UpdateSource`] that records calls before delegating.
pub struct RecordingUpdateSource {
    inner: Arc<dyn UpdateSource>,
    calls: Mutex<Vec<SourceCall>>,
    preload_delay: Option<Duration>,
    fail_deletes: bool,
}

impl RecordingUpdateSource {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn UpdateSource>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            preload_delay: None,
            fail_deletes: false,
        }
    }

    /// Sleeps before each seed preload, widening race windows.
    #[must_use]
    pub fn with_preload_delay(mut self, delay: Duration) -> Self {
        self.preload_delay = Some(delay);
        self
    }

    /// Makes every `delete_file` fail without touching the disk.
    #[must_use]
    pub fn with_failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of seed preloads.
    pub fn preload_calls(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::PreloadSeed(_)))
    }

    /// Number of finalize calls.
    pub fn finalize_calls(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::Finalize))
    }

    /// Paths passed to `delete_file`, in order.
    pub fn deleted_paths(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SourceCall::Delete(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, f: impl Fn(&SourceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| f(call)).count()
    }

    fn record(&self, call: SourceCall) {
        self.calls.lock().push(call);
    }
}

impl UpdateSource for RecordingUpdateSource {
    fn staged_update_path(&self) -> PathBuf {
        self.inner.staged_update_path()
    }

    fn has_staged_update(&self) -> bool {
        self.record(SourceCall::HasStagedUpdate);
        self.inner.has_staged_update()
    }

    fn staged_update_timestamp(&self) -> CoreResult<i64> {
        self.record(SourceCall::StagedTimestamp);
        self.inner.staged_update_timestamp()
    }

    fn open_staged_update_stream(&self) -> CoreResult<ImageStream> {
        self.record(SourceCall::OpenStream);
        self.inner.open_staged_update_stream()
    }

    fn preload_seed_into(&self, target: &Path) -> CoreResult<()> {
        self.record(SourceCall::PreloadSeed(target.to_path_buf()));
        if let Some(delay) = self.preload_delay {
            thread::sleep(delay);
        }
        self.inner.preload_seed_into(target)
    }

    fn delete_file(&self, path: &Path) -> bool {
        self.record(SourceCall::Delete(path.to_path_buf()));
        if self.fail_deletes {
            return false;
        }
        self.inner.delete_file(path)
    }

    fn finalize_update(&self) {
        self.record(SourceCall::Finalize);
        self.inner.finalize_update();
    }
}

/// An event observed by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// `open` on a path
    Open(PathBuf),
    /// `open_from_stream` on a path
    OpenFromStream(PathBuf),
    /// `ensure_materialized` on a connection
    Materialize(PathBuf),
    /// `count` of a collection
    Count(Collection),
    /// `close` on a connection
    Close(PathBuf),
}

/// [`StorageEngine`] that records engine and connection events.
pub struct RecordingEngine {
    inner: Arc<dyn StorageEngine>,
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl RecordingEngine {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn StorageEngine>) -> Self {
        Self {
            inner,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All events so far, in order.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn wrap(&self, inner: Box<dyn EngineConnection>) -> Box<dyn EngineConnection> {
        Box::new(RecordingConnection {
            inner,
            events: Arc::clone(&self.events),
        })
    }
}

impl StorageEngine for RecordingEngine {
    fn open(&self, path: &Path) -> CoreResult<Box<dyn EngineConnection>> {
        self.events.lock().push(EngineEvent::Open(path.to_path_buf()));
        Ok(self.wrap(self.inner.open(path)?))
    }

    fn open_from_stream(
        &self,
        path: &Path,
        source: ImageStream,
    ) -> CoreResult<Box<dyn EngineConnection>> {
        self.events
            .lock()
            .push(EngineEvent::OpenFromStream(path.to_path_buf()));
        Ok(self.wrap(self.inner.open_from_stream(path, source)?))
    }
}

struct RecordingConnection {
    inner: Box<dyn EngineConnection>,
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EngineConnection for RecordingConnection {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn ensure_materialized(&self) -> CoreResult<()> {
        self.events
            .lock()
            .push(EngineEvent::Materialize(self.inner.path().to_path_buf()));
        self.inner.ensure_materialized()
    }

    fn count(&self, collection: Collection) -> CoreResult<u64> {
        self.events.lock().push(EngineEvent::Count(collection));
        self.inner.count(collection)
    }

    fn scan(&self, collection: Collection) -> CoreResult<Vec<Record>> {
        self.inner.scan(collection)
    }

    fn close(&self) -> CoreResult<()> {
        self.events
            .lock()
            .push(EngineEvent::Close(self.inner.path().to_path_buf()));
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}
