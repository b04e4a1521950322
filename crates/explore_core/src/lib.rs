//! # Explore Core
//!
//! Update and swap controller for the offline explore dataset.
//!
//! This crate provides:
//! - `DatasetController`, which decides on every cold start whether to serve
//!   the bundled seed, the active dataset or a staged replacement
//! - Promotion of staged updates with post-open validation
//! - `DatasetHandle`, the generation-guarded query surface
//! - The checksummed dataset image format and its storage engine
//! - File-backed `VersionConfig` and `UpdateSource` collaborators

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod controller;
mod dir;
mod engine;
mod error;
mod handle;
mod identity;
mod image;
mod record;
mod update_source;
mod version;

pub use config::Config;
pub use controller::DatasetController;
pub use dir::DatasetDir;
pub use engine::{EngineConnection, ImageConnection, ImageEngine, ImageStream, StorageEngine};
pub use error::{CoreError, CoreResult};
pub use handle::{DatasetHandle, DatasetOrigin, HandleState, ValidationResult};
pub use identity::{DatasetIdentity, DATASET_EXTENSION, DEFAULT_IDENTITY, IDENTITY_PREFIX};
pub use image::{
    compute_crc32, encode_image, read_header, write_image, ImageHeader, ImageIndex, IndexEntry,
    FOOTER_SIZE, HEADER_SIZE, IMAGE_MAGIC, IMAGE_VERSION,
};
pub use record::{CashPoint, Collection, Merchant, Record};
pub use update_source::{FsUpdateSource, StagedUpdate, UpdateSource};
pub use version::{FileVersionConfig, MemoryVersionConfig, VersionConfig, ACTIVE_IDENTITY_KEY};

/// Crate version, recorded by the CLI's `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
