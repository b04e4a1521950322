//! Bounded stream copy into a backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

/// Default chunk size for [`copy_into`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Options for [`copy_into`].
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    /// Bytes read from the source per iteration.
    pub chunk_size: usize,
    /// Wall-clock limit for the whole copy. `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: None,
        }
    }
}

impl CopyOptions {
    /// Sets the chunk size. Zero is treated as one byte.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Streams `reader` to the end of `backend` and syncs it.
///
/// The deadline is checked between chunks, so a single blocking read is not
/// interrupted; the copy fails with [`StorageError::TimedOut`] at the first
/// chunk boundary after the limit has passed. Returns the number of bytes
/// copied.
///
/// # Errors
///
/// Returns an error if reading, appending or syncing fails, or the deadline
/// passes.
pub fn copy_into(
    backend: &mut dyn StorageBackend,
    reader: &mut dyn Read,
    options: CopyOptions,
) -> StorageResult<u64> {
    let started = Instant::now();
    let mut buffer = vec![0u8; options.chunk_size.max(1)];
    let mut copied = 0u64;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        backend.append(&buffer[..read])?;
        copied += read as u64;

        if let Some(limit) = options.timeout {
            if started.elapsed() >= limit {
                return Err(StorageError::TimedOut { copied, limit });
            }
        }
    }

    backend.sync()?;
    Ok(copied)
}
