//! Open and update command implementation.

use explore_core::{Config, DatasetController, DatasetHandle};
use serde::Serialize;
use std::path::Path;

/// Report on the dataset produced by the open protocol.
#[derive(Debug, Serialize)]
pub struct OpenReport {
    /// Active identity.
    pub identity: String,
    /// Where the dataset came from.
    pub origin: String,
    /// Handle generation.
    pub generation: u64,
    /// Merchants counted during validation.
    pub merchants: u64,
    /// Cash points counted during validation.
    pub atms: u64,
    /// Whether both collections had rows.
    pub complete: bool,
}

impl OpenReport {
    /// Builds a report from an active handle.
    pub fn from_handle(handle: &DatasetHandle) -> Self {
        let validation = handle.validation();
        Self {
            identity: handle.identity().to_string(),
            origin: format!("{:?}", handle.origin()),
            generation: handle.generation(),
            merchants: validation.map_or(0, |v| v.merchant_count),
            atms: validation.map_or(0, |v| v.cash_point_count),
            complete: validation.is_some_and(|v| v.is_complete()),
        }
    }
}

/// Runs the open (or, with `force`, update) command.
pub fn run(
    path: &Path,
    config: Config,
    force: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = DatasetController::open_dir(path, config)?;
    let handle = if force {
        controller.force_update()?
    } else {
        controller.open()?
    };
    let report = OpenReport::from_handle(&handle);
    controller.close()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Active dataset: {}", report.identity);
            println!("  Origin:     {}", report.origin);
            println!("  Generation: {}", report.generation);
            println!("  Merchants:  {}", report.merchants);
            println!("  ATMs:       {}", report.atms);
            if !report.complete {
                println!("  Warning: dataset is incomplete");
            }
        }
    }
    Ok(())
}
