//! # Explore Storage
//!
//! Byte-store backends for explore dataset files.
//!
//! Backends are **opaque byte stores**: they read, append and sync bytes and
//! never interpret them. The dataset image format, record encoding and the
//! promotion protocol all live in `explore_core`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral datasets
//! - [`FileBackend`] - For dataset files in the app's private storage
//!
//! [`copy_into`] streams a reader into any backend in bounded chunks, with an
//! optional deadline. It is how staged update images are materialized.
//!
//! ## Example
//!
//! ```rust
//! use explore_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod copy;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use copy::{copy_into, CopyOptions, DEFAULT_CHUNK_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
