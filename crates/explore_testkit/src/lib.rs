//! # Explore Testkit
//!
//! Test utilities for the explore dataset controller.
//!
//! This crate provides:
//! - Fixtures: temporary data directories, seed and update images
//! - Recording collaborators that log every call the controller makes
//! - A controller harness wiring the recorders together
//! - Property-based record generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use explore_testkit::prelude::*;
//!
//! #[test]
//! fn first_run_uses_seed() {
//!     let harness = ControllerHarness::new(TestEnv::with_seed(3, 2));
//!     harness.controller.open().unwrap();
//!     assert_eq!(harness.source.preload_calls(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use recording::*;
