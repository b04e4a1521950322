//! Inspect command implementation.

use super::CommandError;
use explore_core::{
    Collection, DatasetDir, FileVersionConfig, FsUpdateSource, ImageIndex, UpdateSource,
    VersionConfig,
};
use explore_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Image inspection result.
#[derive(Debug, Serialize)]
pub struct ImageSummary {
    /// Image path.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Embedded version timestamp.
    pub timestamp: i64,
    /// Number of merchants.
    pub merchants: u64,
    /// Number of cash points.
    pub atms: u64,
    /// Why the image could not be read, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct DirSummary {
    /// Directory path.
    pub path: String,
    /// Persisted active identity.
    pub active_identity: String,
    /// Whether the active identity's file exists.
    pub active_present: bool,
    /// Whether a staged update is waiting.
    pub update_staged: bool,
    /// Whether the pending-update indicator is raised.
    pub update_pending: bool,
    /// Staged update, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<ImageSummary>,
    /// Dataset files found in the directory.
    pub datasets: Vec<ImageSummary>,
}

/// Summarizes one image. Unreadable images are reported, not returned as
/// errors.
pub fn summarize(path: &Path) -> Result<ImageSummary, Box<dyn std::error::Error>> {
    let backend = FileBackend::open_read_only(path)?;
    let mut summary = ImageSummary {
        path: path.display().to_string(),
        size: backend.size()?,
        timestamp: 0,
        merchants: 0,
        atms: 0,
        error: None,
    };

    match ImageIndex::build(&backend) {
        Ok(index) => {
            summary.timestamp = index.header().timestamp;
            summary.merchants = index.count(Collection::Merchant);
            summary.atms = index.count(Collection::Atm);
        }
        Err(e) => summary.error = Some(e.to_string()),
    }
    Ok(summary)
}

/// Runs the inspect command on a single image.
pub fn run_image(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let summary = summarize(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            println!("Explore Image Inspection");
            println!("========================");
            println!();
            print_image(&summary, "");
        }
    }
    Ok(())
}

/// Runs the inspect command on a data directory.
///
/// The directory is opened without taking its lock so a running app is not
/// disturbed.
pub fn run_dir(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(CommandError::NoDataDir(path.to_path_buf()).into());
    }

    let dir = Arc::new(DatasetDir::open(path, false, false)?);
    let version = FileVersionConfig::load(Arc::clone(&dir))?;
    let source = FsUpdateSource::new(Arc::clone(&dir), None);
    let identity = version.active_identity()?;

    let staged = if source.has_staged_update() {
        Some(summarize(&source.staged_update_path())?)
    } else {
        None
    };
    let datasets = dir
        .list_datasets()?
        .iter()
        .map(|p| summarize(p))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = DirSummary {
        path: path.display().to_string(),
        active_present: dir.dataset_path(&identity).exists(),
        active_identity: identity.to_string(),
        update_staged: staged.is_some(),
        update_pending: source.is_update_pending(),
        staged,
        datasets,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_dir(&summary),
    }
    Ok(())
}

fn print_image(summary: &ImageSummary, indent: &str) {
    println!("{indent}Path:      {}", summary.path);
    println!("{indent}Size:      {}", format_size(summary.size));
    match &summary.error {
        Some(error) => println!("{indent}Error:     {error}"),
        None => {
            println!("{indent}Version:   {}", summary.timestamp);
            println!("{indent}Merchants: {}", summary.merchants);
            println!("{indent}ATMs:      {}", summary.atms);
        }
    }
}

fn print_dir(summary: &DirSummary) {
    println!("Explore Data Directory Inspection");
    println!("=================================");
    println!();
    println!("Path: {}", summary.path);
    println!();
    println!("Active:");
    println!("  Identity: {}", summary.active_identity);
    println!(
        "  File:     {}",
        if summary.active_present { "present" } else { "missing" }
    );
    println!();
    println!("Update:");
    println!("  Staged:   {}", summary.update_staged);
    println!("  Pending:  {}", summary.update_pending);
    if let Some(staged) = &summary.staged {
        print_image(staged, "  ");
    }

    if !summary.datasets.is_empty() {
        println!();
        println!("Datasets:");
        for dataset in &summary.datasets {
            print_image(dataset, "  ");
            println!();
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
