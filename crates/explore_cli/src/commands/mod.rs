//! CLI command implementations.

pub mod inspect;
pub mod open;
pub mod pack;
pub mod search;
pub mod stage;
pub mod verify;

use explore_core::Collection;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the commands themselves (as opposed to the libraries).
#[derive(Debug, Error)]
pub enum CommandError {
    /// The data directory does not exist.
    #[error("no data directory found at {0:?}")]
    NoDataDir(PathBuf),

    /// The collection name is not `merchant` or `atm`.
    #[error("unknown collection {0:?} (expected merchant or atm)")]
    UnknownCollection(String),

    /// Image verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),
}

/// Resolves a collection name given on the command line.
pub fn parse_collection(name: &str) -> Result<Collection, CommandError> {
    Collection::ALL
        .into_iter()
        .find(|c| c.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| CommandError::UnknownCollection(name.to_string()))
}
