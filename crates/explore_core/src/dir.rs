//! Data directory management.
//!
//! This module handles the file system layout of the explore dataset:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                 # Advisory lock, one process per directory
//! ├─ VERSION              # Active identity (JSON key/value)
//! ├─ UPDATE_PENDING       # Present while a staged update awaits adoption
//! ├─ <identity>.db        # Dataset images
//! └─ staged/
//!    └─ explore-update.db # Staged update image
//! ```

use crate::error::{CoreError, CoreResult};
use crate::identity::{DatasetIdentity, DATASET_EXTENSION};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const VERSION_FILE: &str = "VERSION";
/// Temporary file for atomic VERSION writes.
const VERSION_TEMP: &str = "VERSION.tmp";
const PENDING_FILE: &str = "UPDATE_PENDING";
const STAGED_DIR: &str = "staged";
const STAGED_FILE: &str = "explore-update.db";

/// Owns the data directory layout and, optionally, its exclusive lock.
///
/// # Example
///
/// ```rust,ignore
/// use explore_core::DatasetDir;
/// use std::path::Path;
///
/// let dir = DatasetDir::open(Path::new("explore"), true, true)?;
/// println!("staged update: {:?}", dir.staged_path());
/// ```
#[derive(Debug)]
pub struct DatasetDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: Option<File>,
}

impl DatasetDir {
    /// Opens or creates a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - `lock` is set and another process holds the lock (`DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool, lock: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "data directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = if lock {
            let lock_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path.join(LOCK_FILE))?;

            if lock_file.try_lock_exclusive().is_err() {
                return Err(CoreError::DirectoryLocked);
            }
            Some(lock_file)
        } else {
            None
        };

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the dataset file for `identity`.
    #[must_use]
    pub fn dataset_path(&self, identity: &DatasetIdentity) -> PathBuf {
        self.path.join(identity.file_name())
    }

    /// Returns the path to the VERSION file.
    #[must_use]
    pub fn version_path(&self) -> PathBuf {
        self.path.join(VERSION_FILE)
    }

    /// Returns the path to the pending-update indicator.
    #[must_use]
    pub fn pending_marker_path(&self) -> PathBuf {
        self.path.join(PENDING_FILE)
    }

    /// Returns the staged-update location.
    #[must_use]
    pub fn staged_path(&self) -> PathBuf {
        self.path.join(STAGED_DIR).join(STAGED_FILE)
    }

    /// Lists dataset files in the directory, sorted by name.
    pub fn list_datasets(&self) -> CoreResult<Vec<PathBuf>> {
        let mut datasets = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == DATASET_EXTENSION) {
                datasets.push(path);
            }
        }
        datasets.sort();
        Ok(datasets)
    }

    /// Writes the VERSION file atomically.
    ///
    /// Uses write-then-rename for crash safety:
    /// 1. Write to temporary file
    /// 2. Sync temporary file to disk
    /// 3. Rename temporary file to VERSION
    /// 4. Fsync the directory so the rename is durable
    pub fn write_version_file(&self, data: &[u8]) -> CoreResult<()> {
        let temp_path = self.path.join(VERSION_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.version_path())?;
        self.sync_directory()?;

        Ok(())
    }

    /// Syncs the data directory so renames and deletions are durable.
    #[cfg(unix)]
    pub fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Syncs the data directory so renames and deletions are durable.
    #[cfg(not(unix))]
    pub fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directory handles cannot be fsynced
        Ok(())
    }
}
