//! Test fixtures and data directory helpers.
//!
//! Provides convenience functions for building dataset images and laying
//! out data directories in the states the controller has to handle.

use explore_core::{encode_image, CashPoint, DatasetIdentity, Merchant, Record};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Timestamp embedded in the default seed image.
pub const SEED_TIMESTAMP: i64 = 1_600_000_000_000;

/// Builds `merchants` merchant rows followed by `atms` cash-point rows.
pub fn sample_records(merchants: usize, atms: usize) -> Vec<Record> {
    let mut records: Vec<Record> = (0..merchants)
        .map(|i| {
            Record::from(Merchant {
                id: i as i64 + 1,
                name: format!("Merchant {}", i + 1),
                city: Some("Porto".to_string()),
                payment_method: Some("dash".to_string()),
                merchant_type: Some("physical".to_string()),
                active: true,
                ..Merchant::default()
            })
        })
        .collect();
    records.extend((0..atms).map(|i| {
        Record::from(CashPoint {
            id: i as i64 + 1,
            name: format!("Cash Point {}", i + 1),
            city: Some("Porto".to_string()),
            manufacturer: Some("genmega".to_string()),
            active: true,
            ..CashPoint::default()
        })
    }));
    records
}

/// Encodes an image with `merchants` and `atms` sample rows.
pub fn image_bytes(timestamp: i64, merchants: usize, atms: usize) -> Vec<u8> {
    encode_image(timestamp, &sample_records(merchants, atms)).expect("Failed to encode image")
}

/// A temporary data directory plus an optional bundled seed.
///
/// ```text
/// <temp>/
/// ├─ assets/explore.db   # bundled seed (if any)
/// └─ data/               # data directory handed to the controller
/// ```
pub struct TestEnv {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Bundled seed location. The file may be absent.
    pub seed_path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestEnv {
    /// Creates an environment with an empty data directory and no seed file.
    pub fn without_seed() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("data");
        let seed_path = temp_dir.path().join("assets").join("explore.db");
        fs::create_dir_all(&data_dir).expect("Failed to create data directory");

        Self {
            data_dir,
            seed_path,
            _temp_dir: temp_dir,
        }
    }

    /// Creates an environment whose seed holds `merchants` and `atms` rows.
    pub fn with_seed(merchants: usize, atms: usize) -> Self {
        let env = Self::without_seed();
        write_file(&env.seed_path, &image_bytes(SEED_TIMESTAMP, merchants, atms));
        env
    }

    /// Location of the staged update inside the data directory.
    pub fn staged_path(&self) -> PathBuf {
        self.data_dir.join("staged").join("explore-update.db")
    }

    /// Location of the pending-update indicator.
    pub fn pending_marker_path(&self) -> PathBuf {
        self.data_dir.join("UPDATE_PENDING")
    }

    /// Location of the dataset file for `identity`.
    pub fn dataset_path(&self, identity: &str) -> PathBuf {
        self.data_dir.join(format!("{identity}.db"))
    }

    /// Drops an update image into the staged location and raises the pending
    /// indicator, as the download job would.
    pub fn stage(&self, timestamp: i64, merchants: usize, atms: usize) {
        self.stage_bytes(&image_bytes(timestamp, merchants, atms));
    }

    /// Drops raw bytes into the staged location.
    pub fn stage_bytes(&self, bytes: &[u8]) {
        write_file(&self.staged_path(), bytes);
        write_file(&self.pending_marker_path(), b"pending");
    }

    /// Writes a dataset file for `identity` directly, bypassing promotion.
    pub fn write_dataset(&self, identity: &DatasetIdentity, merchants: usize, atms: usize) {
        let timestamp = identity.timestamp().unwrap_or(SEED_TIMESTAMP);
        write_file(
            &self.dataset_path(identity.as_str()),
            &image_bytes(timestamp, merchants, atms),
        );
    }
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(path, bytes).expect("Failed to write file");
}
