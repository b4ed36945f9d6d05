//! Build configuration.
//!
//! Loaded from `liffey.config.json` in the project root. All knobs the
//! engine exposes live here: entries, transform rules, asset inlining,
//! cache, split groups, externals manifest and dev server options.
//!
//! ## Example
//!
//! ```json
//! {
//!   "entry": { "main": "src/index.js" },
//!   "rules": [
//!     { "test": "\\.js$", "loaders": [{ "loader": "script" }] },
//!     { "test": "\\.(le|c)ss$", "loaders": [{ "loader": "style" }] }
//!   ],
//!   "split": {
//!     "groups": [
//!       { "name": "vendors", "test": "node_modules", "priority": 10,
//!         "minSize": 0, "minChunks": 2, "chunks": "all" }
//!     ]
//!   }
//! }
//! ```

use crate::error::{BuildError, Result};
use crate::graph::ModuleKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The default config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "liffey.config.json";

/// One or more source paths for a named entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntryPaths {
    Single(String),
    Many(Vec<String>),
}

impl EntryPaths {
    /// The entry's paths in declaration order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        match self {
            EntryPaths::Single(p) => vec![p.as_str()],
            EntryPaths::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

/// A `{loader, options}` pair in a transform rule chain.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderSpec {
    /// Loader name (`script`, `style`, `asset`, `banner`).
    pub loader: String,
    /// Loader-specific options, hashed into the cache key.
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Selects a loader chain for modules whose path matches `test`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformRule {
    /// Regex over the module path.
    pub test: String,
    /// Ordered loader chain; order is preserved literally.
    pub loaders: Vec<LoaderSpec>,
}

/// Resolution options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Extensions tried, in order, when a request has none.
    pub extensions: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            extensions: [".js", ".mjs", ".json", ".css", ".less"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Binary-asset handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetOptions {
    /// Assets strictly below this byte size are inlined as data URIs;
    /// at or above it they are copied under a content-hashed name.
    pub inline_limit: u64,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            inline_limit: 10 * 1024,
        }
    }
}

/// Persistent transform cache options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheOptions {
    /// Cache directory, relative to the project root. `None` disables
    /// the persistent cache (the in-memory index still works).
    pub dir: Option<PathBuf>,
    /// Optional record-count bound; oldest records are pruned on open.
    pub max_records: Option<usize>,
}

/// Which chunk kinds a cache group may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkApplicability {
    /// Initial and async chunks alike.
    #[default]
    All,
    /// Only entry (initial) chunks.
    Initial,
    /// Only dynamic-import (async) chunks.
    Async,
}

/// A shared-chunk extraction rule.
///
/// Thresholds are signed here so invalid (negative) configuration is
/// representable and rejected by [`BundlerConfig::validate`] instead of
/// silently wrapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheGroupConfig {
    pub name: String,
    /// Regex over module paths.
    pub test: String,
    /// Higher priority wins when groups overlap.
    #[serde(default)]
    pub priority: i32,
    /// Minimum aggregate byte size of the candidate set.
    #[serde(default)]
    pub min_size: i64,
    /// Minimum number of distinct referencing chunks.
    #[serde(default = "default_min_chunks")]
    pub min_chunks: i64,
    #[serde(default)]
    pub chunks: ChunkApplicability,
}

fn default_min_chunks() -> i64 {
    1
}

/// Code-splitting options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    pub groups: Vec<CacheGroupConfig>,
}

/// Dev server options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevOptions {
    pub port: u16,
    pub host: String,
    /// Path to a JSON fixture table for request mocking.
    pub mocks: Option<PathBuf>,
    /// Watch events inside this window are merged into one rebuild.
    pub coalesce_ms: u64,
}

impl Default for DevOptions {
    fn default() -> Self {
        Self {
            port: 3003,
            host: "localhost".to_string(),
            mocks: None,
            coalesce_ms: 50,
        }
    }
}

/// Top-level bundler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerConfig {
    /// Entry name → source path(s). `BTreeMap` keeps iteration order
    /// deterministic across runs.
    pub entry: BTreeMap<String, EntryPaths>,
    /// Output directory, relative to the project root.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Public URL prefix for emitted assets.
    #[serde(default = "default_public_path")]
    pub public_path: String,
    #[serde(default)]
    pub resolve: ResolveOptions,
    #[serde(default)]
    pub rules: Vec<TransformRule>,
    #[serde(default)]
    pub assets: AssetOptions,
    #[serde(default)]
    pub cache: CacheOptions,
    #[serde(default)]
    pub split: SplitOptions,
    /// Path to an external-library manifest produced by a library build.
    #[serde(default)]
    pub externals: Option<PathBuf>,
    /// Treat errors in dynamic-only branches as fatal instead of warnings.
    #[serde(default)]
    pub fail_on_dead_branch: bool,
    #[serde(default)]
    pub dev: DevOptions,
    /// Project root; not part of the file, set when the config is loaded.
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_public_path() -> String {
    "/".to_string()
}

impl BundlerConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    /// Returns `ConfigRead`/`ConfigParse` for unreadable or malformed
    /// files and `SplitConfig` for invalid group definitions.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: BundlerConfig =
            serde_json::from_str(&content).map_err(|e| BuildError::ConfigParse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.root = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Validate thresholds and patterns. Fatal at build start.
    ///
    /// # Errors
    /// Returns `SplitConfig` for any invalid group.
    pub fn validate(&self) -> Result<()> {
        for group in &self.split.groups {
            // Chunk names are manifest keys; a group shadowing an entry
            // would silently drop one of the two chunks.
            if self.entry.contains_key(&group.name) {
                return Err(BuildError::SplitConfig {
                    group: group.name.clone(),
                    reason: format!("name collides with entry '{}'", group.name),
                });
            }
            if group.min_size < 0 {
                return Err(BuildError::SplitConfig {
                    group: group.name.clone(),
                    reason: format!("minSize must not be negative (got {})", group.min_size),
                });
            }
            if group.min_chunks < 1 {
                return Err(BuildError::SplitConfig {
                    group: group.name.clone(),
                    reason: format!("minChunks must be at least 1 (got {})", group.min_chunks),
                });
            }
            if regex_lite::Regex::new(&group.test).is_err() {
                return Err(BuildError::SplitConfig {
                    group: group.name.clone(),
                    reason: format!("invalid test pattern '{}'", group.test),
                });
            }
        }
        for rule in &self.rules {
            if regex_lite::Regex::new(&rule.test).is_err() {
                return Err(BuildError::other(format!(
                    "invalid rule test pattern '{}'",
                    rule.test
                )));
            }
        }
        Ok(())
    }

    /// Classify a module path by extension.
    #[must_use]
    pub fn kind_of(&self, path: &Path) -> ModuleKind {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" | "json" => ModuleKind::Script,
            "css" | "less" | "scss" | "sass" => ModuleKind::Style,
            _ => ModuleKind::Asset,
        }
    }

    /// Absolute output directory.
    #[must_use]
    pub fn out_dir_abs(&self) -> PathBuf {
        if self.out_dir.is_absolute() {
            self.out_dir.clone()
        } else {
            self.root.join(&self.out_dir)
        }
    }

    /// Absolute cache directory, if the persistent cache is enabled.
    #[must_use]
    pub fn cache_dir_abs(&self) -> Option<PathBuf> {
        self.cache.dir.as_ref().map(|d| {
            if d.is_absolute() {
                d.clone()
            } else {
                self.root.join(d)
            }
        })
    }

    /// Absolute path of the configured externals manifest, if any.
    #[must_use]
    pub fn externals_abs(&self) -> Option<PathBuf> {
        self.externals.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.root.join(p)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(json: &str) -> std::result::Result<BundlerConfig, BuildError> {
        let mut config: BundlerConfig =
            serde_json::from_str(json).map_err(|e| BuildError::other(e.to_string()))?;
        config.root = PathBuf::from("/project");
        config.validate().map(|()| config)
    }

    #[test]
    fn test_minimal_config() {
        let config = minimal(r#"{ "entry": { "main": "src/index.js" } }"#).unwrap();
        assert_eq!(config.entry.len(), 1);
        assert_eq!(config.out_dir, PathBuf::from("dist"));
        assert_eq!(config.dev.port, 3003);
        assert_eq!(config.assets.inline_limit, 10 * 1024);
    }

    #[test]
    fn test_entry_many_paths() {
        let config =
            minimal(r#"{ "entry": { "vendor": ["react", "react-dom"] } }"#).unwrap();
        let paths = config.entry["vendor"].paths();
        assert_eq!(paths, vec!["react", "react-dom"]);
    }

    #[test]
    fn test_negative_min_size_rejected() {
        let err = minimal(
            r#"{
                "entry": { "main": "src/index.js" },
                "split": { "groups": [
                    { "name": "bad", "test": "x", "minSize": -1, "minChunks": 1 }
                ] }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::SplitConfig { .. }));
    }

    #[test]
    fn test_zero_min_chunks_rejected() {
        let err = minimal(
            r#"{
                "entry": { "main": "src/index.js" },
                "split": { "groups": [
                    { "name": "bad", "test": "x", "minChunks": 0 }
                ] }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::SplitConfig { .. }));
    }

    #[test]
    fn test_group_named_like_entry_rejected() {
        let err = minimal(
            r#"{
                "entry": { "main": "src/index.js" },
                "split": { "groups": [
                    { "name": "main", "test": "node_modules" }
                ] }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::SplitConfig { .. }));
        assert!(err.to_string().contains("collides with entry"));
    }

    #[test]
    fn test_kind_classification() {
        let config = minimal(r#"{ "entry": { "main": "src/index.js" } }"#).unwrap();
        assert_eq!(config.kind_of(Path::new("a.js")), ModuleKind::Script);
        assert_eq!(config.kind_of(Path::new("a.less")), ModuleKind::Style);
        assert_eq!(config.kind_of(Path::new("a.png")), ModuleKind::Asset);
    }
}
