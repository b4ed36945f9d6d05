//! External-library linking.
//!
//! A library build emits a standalone bundle plus a manifest mapping
//! request strings to stable external ids. Application builds load the
//! manifest and consult it before the resolver: a matching request
//! becomes an external edge and the module set behind it is never
//! scanned or transformed.
//!
//! A missing or malformed manifest never fails the build. The linker is
//! disabled with a warning and every request falls through to normal
//! resolution, which produces a larger but correct bundle.

use crate::error::BuildWarning;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One linked request in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEntry {
    /// Stable id within the library bundle.
    pub id: u32,
    /// Export names the library exposes for this request.
    #[serde(default)]
    pub exports: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    name: String,
    /// Content-hashed file name of the library bundle, for HTML emit.
    #[serde(default)]
    file: Option<String>,
    /// Request → entry. `BTreeMap` keeps the written manifest stable.
    content: BTreeMap<String, ExternalEntry>,
}

/// A loaded external-library manifest.
#[derive(Debug)]
pub struct ExternalManifest {
    /// Global variable name the library bundle registers under.
    name: String,
    file: Option<String>,
    content: BTreeMap<String, ExternalEntry>,
}

impl ExternalManifest {
    /// Start an empty manifest, used by library builds.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            file: None,
            content: BTreeMap::new(),
        }
    }

    /// Load a manifest from disk.
    ///
    /// # Errors
    /// Returns the [`BuildWarning::ManifestDisabled`] to surface; the
    /// caller continues without a linker.
    pub fn load(path: &Path) -> std::result::Result<Self, BuildWarning> {
        let disabled = |reason: String| BuildWarning::ManifestDisabled {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| disabled(e.to_string()))?;
        let file: ManifestFile =
            serde_json::from_slice(&bytes).map_err(|e| disabled(e.to_string()))?;
        if file.name.is_empty() {
            return Err(disabled("manifest has no library name".to_string()));
        }
        Ok(Self {
            name: file.name,
            file: file.file,
            content: file.content,
        })
    }

    /// The library's global registration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The library bundle's emitted file name, when known.
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Record the emitted bundle file name, set by library builds.
    pub fn set_file(&mut self, file: &str) {
        self.file = Some(file.to_string());
    }

    /// Look up a request. Exact string match only.
    #[must_use]
    pub fn lookup(&self, request: &str) -> Option<&ExternalEntry> {
        self.content.get(request)
    }

    /// Register a request under the next free id, returning the id.
    /// Re-registering an existing request returns its current id.
    pub fn register(&mut self, request: &str, exports: Vec<String>) -> u32 {
        if let Some(entry) = self.content.get(request) {
            return entry.id;
        }
        let id = self.content.len() as u32;
        self.content
            .insert(request.to_string(), ExternalEntry { id, exports });
        id
    }

    /// Number of linked requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Requests in manifest order, for the library bundle's module map.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ExternalEntry)> {
        self.content.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize to the on-disk manifest format.
    ///
    /// # Errors
    /// Returns an error when the file cannot be written.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let file = ManifestFile {
            name: self.name.clone(),
            file: self.file.clone(),
            content: self.content.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        if let Some(parent) = path.parent() {
            liffey_util::fs::ensure_dir(parent)?;
        }
        liffey_util::fs::atomic_write(path, &bytes)?;
        Ok(())
    }
}

/// Load the configured manifest, if any. The warning side means the
/// linker is disabled for this build.
pub fn load_configured(
    externals: Option<&PathBuf>,
) -> (Option<ExternalManifest>, Option<BuildWarning>) {
    match externals {
        None => (None, None),
        Some(path) => match ExternalManifest::load(path) {
            Ok(manifest) => {
                tracing::debug!(
                    library = %manifest.name(),
                    requests = manifest.len(),
                    "external manifest loaded"
                );
                (Some(manifest), None)
            }
            Err(warning) => (None, Some(warning)),
        },
    }
}
