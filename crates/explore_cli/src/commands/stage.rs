//! Stage command implementation.

use explore_core::{DatasetDir, FsUpdateSource};
use std::path::Path;
use std::sync::Arc;

/// Runs the stage command.
///
/// Takes the directory lock, so it fails with `DirectoryLocked` while a
/// controller is running against the same directory.
pub fn run(path: &Path, image: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let dir = Arc::new(DatasetDir::open(path, true, true)?);
    let source = FsUpdateSource::new(dir, None);
    let staged = source.stage_update(image)?;

    println!("Staged {:?} as version {}", staged.path, staged.timestamp);
    println!("It will be promoted on the next open or update.");
    Ok(())
}
