//! Controller integration harness.
//!
//! Wires a [`DatasetController`] to the file-backed collaborators with
//! recorders in between, over a [`TestEnv`].

use crate::fixtures::TestEnv;
use crate::recording::{RecordingEngine, RecordingUpdateSource};
use explore_core::{
    DatasetController, DatasetDir, DatasetIdentity, FileVersionConfig, FsUpdateSource,
    ImageEngine, VersionConfig,
};
use std::sync::Arc;

/// A controller with recording collaborators.
pub struct ControllerHarness {
    /// The controller under test.
    pub controller: Arc<DatasetController>,
    /// Recorded update source.
    pub source: Arc<RecordingUpdateSource>,
    /// Recorded engine.
    pub engine: Arc<RecordingEngine>,
    /// The persisted active identity.
    pub version: Arc<FileVersionConfig>,
    /// The environment (kept alive to prevent cleanup).
    pub env: TestEnv,
}

impl ControllerHarness {
    /// Creates a harness over `env`.
    pub fn new(env: TestEnv) -> Self {
        Self::with_source(env, |source| source)
    }

    /// Creates a harness over `env`, letting the caller configure the
    /// recording source.
    pub fn with_source(
        env: TestEnv,
        configure: impl FnOnce(RecordingUpdateSource) -> RecordingUpdateSource,
    ) -> Self {
        let dir = Arc::new(
            DatasetDir::open(&env.data_dir, true, false).expect("Failed to open data directory"),
        );
        let version = Arc::new(
            FileVersionConfig::load(Arc::clone(&dir)).expect("Failed to load VERSION file"),
        );
        let fs_source = FsUpdateSource::new(Arc::clone(&dir), Some(env.seed_path.clone()));
        let source = Arc::new(configure(RecordingUpdateSource::new(Arc::new(fs_source))));
        let engine = Arc::new(RecordingEngine::new(Arc::new(ImageEngine::new())));

        let controller = Arc::new(DatasetController::new(
            env.data_dir.clone(),
            Arc::clone(&version) as Arc<dyn VersionConfig>,
            Arc::clone(&source) as Arc<dyn explore_core::UpdateSource>,
            Arc::clone(&engine) as Arc<dyn explore_core::StorageEngine>,
        ));

        Self {
            controller,
            source,
            engine,
            version,
            env,
        }
    }

    /// The persisted active identity.
    pub fn active_identity(&self) -> DatasetIdentity {
        self.version
            .active_identity()
            .expect("Failed to read active identity")
    }

    /// Forgets everything the recorders have seen.
    pub fn clear_recordings(&self) {
        self.source.clear();
        self.engine.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_starts_empty() {
        let harness = ControllerHarness::new(TestEnv::with_seed(1, 1));
        assert!(harness.controller.active().is_none());
        assert!(harness.source.calls().is_empty());
        assert!(harness.engine.events().is_empty());
        assert!(harness.active_identity().is_seed());
    }
}
