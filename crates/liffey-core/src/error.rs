//! Error taxonomy for the bundling engine.
//!
//! Per-module failures are collected into [`Diagnostics`] and reported
//! together at the end of a build; a build fails overall only when an
//! error sits on an entry chain. Degradable conditions (bad linker
//! manifest, corrupt cache record, watch backend failure, cycles) are
//! warnings, surfaced but never fatal.

use std::path::PathBuf;
use thiserror::Error;

/// A fatal (per-module or per-build) bundling error.
#[derive(Error, Debug)]
pub enum BuildError {
    /// An import request could not be resolved to a file or external entry.
    #[error("cannot resolve '{request}' from {importer}")]
    Resolution { importer: String, request: String },

    /// A transformer stage failed for one module.
    #[error("transform of {path} failed at stage '{stage}': {cause}")]
    Transform {
        path: PathBuf,
        stage: String,
        cause: String,
    },

    /// An invalid cache group definition, fatal at build start.
    #[error("invalid cache group '{group}': {reason}")]
    SplitConfig { group: String, reason: String },

    /// An entry point itself could not be read or resolved.
    #[error("entry '{name}' not found: {path}")]
    EntryNotFound { name: String, path: PathBuf },

    #[error("failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl BuildError {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// A non-fatal condition surfaced alongside build results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// Two or more modules import each other. Informational only.
    Cycle { path: PathBuf },
    /// The external manifest was missing or malformed; the linker is
    /// disabled for this build and requests resolve normally.
    ManifestDisabled { path: PathBuf, reason: String },
    /// A cache record failed its integrity check and was treated as a miss.
    CacheCorruption { key: String },
    /// The filesystem watch backend failed; dev server falls back to
    /// manual rebuild triggers.
    Watch { reason: String },
    /// A failure in a branch only reachable through dynamic imports,
    /// demoted from an error by configuration.
    DeadBranch { message: String },
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::Cycle { path } => {
                write!(f, "circular import through {}", path.display())
            }
            BuildWarning::ManifestDisabled { path, reason } => write!(
                f,
                "external manifest {} unusable ({reason}); linker disabled for this build",
                path.display()
            ),
            BuildWarning::CacheCorruption { key } => {
                write!(f, "cache record {key} failed integrity check; recomputing")
            }
            BuildWarning::Watch { reason } => {
                write!(f, "file watcher unavailable ({reason}); manual rebuild only")
            }
            BuildWarning::DeadBranch { message } => {
                write!(f, "error in dynamic-only branch: {message}")
            }
        }
    }
}

/// Collected per-build errors and warnings.
///
/// Errors are appended as they occur and reported together; the first
/// error never masks the rest.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<BuildError>,
    pub warnings: Vec<BuildWarning>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, err: BuildError) {
        self.errors.push(err);
    }

    pub fn warn(&mut self, warning: BuildWarning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_display() {
        let err = BuildError::Resolution {
            importer: "/src/a.js".to_string(),
            request: "./missing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("./missing"));
        assert!(msg.contains("/src/a.js"));
    }

    #[test]
    fn test_diagnostics_collects_all_errors() {
        let mut diags = Diagnostics::new();
        diags.error(BuildError::other("first"));
        diags.error(BuildError::other("second"));
        assert!(diags.has_errors());
        assert_eq!(diags.errors.len(), 2);
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let mut diags = Diagnostics::new();
        diags.warn(BuildWarning::Cycle {
            path: PathBuf::from("/src/a.js"),
        });
        assert!(!diags.has_errors());
        assert_eq!(diags.warnings.len(), 1);
    }
}
