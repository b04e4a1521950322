//! Explore CLI
//!
//! Command-line tools for explore dataset images and data directories.
//!
//! # Commands
//!
//! - `pack` - Build a dataset image from JSON records
//! - `inspect` - Display image or data directory metadata
//! - `verify` - Verify image integrity
//! - `stage` - Stage a downloaded image as the next update
//! - `open` - Run the open protocol and report the active dataset
//! - `update` - Force re-evaluation, promoting any staged update
//! - `search` - Search the active dataset by name

mod commands;

use clap::{Parser, Subcommand};
use explore_core::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Explore dataset command-line tools.
#[derive(Parser)]
#[command(name = "explore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options for commands that run the open protocol.
#[derive(clap::Args)]
struct OpenArgs {
    /// Bundled seed image used on first run
    #[arg(short, long)]
    seed: Option<PathBuf>,

    /// Abort streaming a staged update after this many seconds (0 disables)
    #[arg(long, default_value = "60")]
    copy_timeout: u64,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,
}

impl OpenArgs {
    fn config(&self) -> Config {
        let timeout = (self.copy_timeout > 0).then(|| Duration::from_secs(self.copy_timeout));
        let config = Config::new().copy_timeout(timeout);
        match &self.seed {
            Some(seed) => config.seed_path(seed),
            None => config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a dataset image from a JSON file of merchants and atms
    Pack {
        /// JSON input with `merchants` and `atms` arrays
        input: PathBuf,

        /// Image file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Embedded version timestamp in milliseconds
        #[arg(short, long)]
        timestamp: i64,
    },

    /// Display image or data directory metadata
    Inspect {
        /// Inspect a single image instead of the data directory
        #[arg(long)]
        file: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify image integrity and decode every record
    Verify {
        /// Image file to verify
        file: PathBuf,
    },

    /// Stage a downloaded image as the next update
    Stage {
        /// Downloaded image
        file: PathBuf,
    },

    /// Open the active dataset and report it
    Open(OpenArgs),

    /// Force re-evaluation and report the resulting dataset
    Update(OpenArgs),

    /// Search the active dataset by name
    Search {
        /// Case-insensitive name fragment
        query: String,

        /// Collection to search (merchant, atm)
        #[arg(short, long, default_value = "merchant")]
        collection: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[command(flatten)]
        open: OpenArgs,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Pack {
            input,
            output,
            timestamp,
        } => {
            commands::pack::run(&input, &output, timestamp)?;
        }
        Commands::Inspect { file, format } => match file {
            Some(file) => commands::inspect::run_image(&file, &format)?,
            None => {
                let path = cli.path.ok_or("Data directory path required for inspect")?;
                commands::inspect::run_dir(&path, &format)?;
            }
        },
        Commands::Verify { file } => {
            commands::verify::run(&file)?;
        }
        Commands::Stage { file } => {
            let path = cli.path.ok_or("Data directory path required for stage")?;
            commands::stage::run(&path, &file)?;
        }
        Commands::Open(args) => {
            let path = cli.path.ok_or("Data directory path required for open")?;
            commands::open::run(&path, args.config(), false, &args.format)?;
        }
        Commands::Update(args) => {
            let path = cli.path.ok_or("Data directory path required for update")?;
            commands::open::run(&path, args.config(), true, &args.format)?;
        }
        Commands::Search {
            query,
            collection,
            limit,
            open,
        } => {
            let path = cli.path.ok_or("Data directory path required for search")?;
            commands::search::run(
                &path,
                open.config(),
                &collection,
                &query,
                limit,
                &open.format,
            )?;
        }
        Commands::Version => {
            println!("Explore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Explore Core v{}", explore_core::VERSION);
        }
    }

    Ok(())
}
