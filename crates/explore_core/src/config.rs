//! Controller configuration.

use explore_storage::DEFAULT_CHUNK_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening a data directory and its controller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the bundled seed image copied on first run.
    pub seed_path: Option<PathBuf>,

    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to take the exclusive directory lock.
    pub lock_directory: bool,

    /// Upper bound for streaming a staged update into a dataset file.
    pub copy_timeout: Option<Duration>,

    /// Chunk size used while streaming a staged update.
    pub copy_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_path: None,
            create_if_missing: true,
            lock_directory: true,
            copy_timeout: Some(Duration::from_secs(60)),
            copy_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bundled seed location.
    #[must_use]
    pub fn seed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_path = Some(path.into());
        self
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to take the exclusive directory lock.
    #[must_use]
    pub const fn lock_directory(mut self, value: bool) -> Self {
        self.lock_directory = value;
        self
    }

    /// Sets the streaming copy timeout. `None` disables it.
    #[must_use]
    pub const fn copy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.copy_timeout = timeout;
        self
    }

    /// Sets the streaming copy chunk size.
    #[must_use]
    pub const fn copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.lock_directory);
        assert!(config.seed_path.is_none());
        assert_eq!(config.copy_chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .seed_path("/assets/explore.db")
            .create_if_missing(false)
            .copy_timeout(None)
            .copy_chunk_size(4096);

        assert_eq!(config.seed_path, Some(PathBuf::from("/assets/explore.db")));
        assert!(!config.create_if_missing);
        assert!(config.copy_timeout.is_none());
        assert_eq!(config.copy_chunk_size, 4096);
    }
}
