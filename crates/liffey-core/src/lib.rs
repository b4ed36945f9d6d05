//! Core bundling engine: module graph construction, transform pipeline,
//! persistent cache, external-library linking, chunk splitting, output
//! emission and the watch-driven dev server.
//!
//! The CLI in `liffey-cli` is a thin wrapper over [`Bundler`] and
//! [`dev::run`].

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bundle;
pub mod cache;
pub mod chunks;
pub mod config;
pub mod dev;
pub mod emit;
pub mod error;
pub mod graph;
pub mod linker;
pub mod resolve;
pub mod scan;
pub mod transform;

pub use bundle::{diff, BuildDiff, BuildResult, Bundler, LibraryBuild};
pub use config::{BundlerConfig, CONFIG_FILE};
pub use error::{BuildError, BuildWarning, Diagnostics, Result};
