//! Request resolution.
//!
//! Maps an import request to a canonical file path. Relative requests
//! resolve against the importer's directory, absolute requests are used
//! as written, and bare specifiers are looked up under the project's
//! `node_modules`. Extensionless requests try the configured extension
//! list in order, then an `index` file inside a matching directory.
//!
//! External-library requests never reach this module; the linker is
//! consulted first during graph construction.

use crate::config::ResolveOptions;
use crate::error::{BuildError, Result};
use std::path::{Path, PathBuf};

/// Resolves request strings to canonical module paths.
#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl Resolver {
    #[must_use]
    pub fn new(root: &Path, options: &ResolveOptions) -> Self {
        Self {
            root: root.to_path_buf(),
            extensions: options.extensions.clone(),
        }
    }

    /// Resolve `request` as imported from the file at `importer`.
    ///
    /// # Errors
    /// Returns [`BuildError::Resolution`] when no candidate exists.
    pub fn resolve(&self, importer: &Path, request: &str) -> Result<PathBuf> {
        let base = if request.starts_with("./") || request.starts_with("../") {
            let dir = importer.parent().unwrap_or(&self.root);
            dir.join(request)
        } else if Path::new(request).is_absolute() {
            PathBuf::from(request)
        } else {
            // Bare specifier: package lookup under the project root.
            self.root.join("node_modules").join(request)
        };

        self.try_candidates(&base).ok_or_else(|| BuildError::Resolution {
            importer: importer.display().to_string(),
            request: request.to_string(),
        })
    }

    /// Resolve an entry path, which is relative to the project root.
    ///
    /// # Errors
    /// Returns [`BuildError::EntryNotFound`] when no candidate exists.
    pub fn resolve_entry(&self, name: &str, request: &str) -> Result<PathBuf> {
        let base = if Path::new(request).is_absolute() {
            PathBuf::from(request)
        } else {
            self.root.join(request)
        };
        self.try_candidates(&base)
            .ok_or_else(|| BuildError::EntryNotFound {
                name: name.to_string(),
                path: base,
            })
    }

    /// Try the path as written, then with each configured extension,
    /// then as a directory holding an `index` file.
    fn try_candidates(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return canonical(base);
        }
        for ext in &self.extensions {
            let mut candidate = base.as_os_str().to_owned();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                return canonical(&candidate);
            }
        }
        if base.is_dir() {
            for ext in &self.extensions {
                let candidate = base.join(format!("index{ext}"));
                if candidate.is_file() {
                    return canonical(&candidate);
                }
            }
        }
        None
    }
}

/// Canonicalize without Windows UNC prefixes.
fn canonical(path: &Path) -> Option<PathBuf> {
    dunce::canonicalize(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn resolver(root: &Path) -> Resolver {
        Resolver::new(root, &ResolveOptions::default())
    }

    #[test]
    fn test_resolve_relative_with_extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/math.js"), "export const add = 0;").unwrap();
        fs::write(dir.path().join("src/index.js"), "").unwrap();

        let r = resolver(dir.path());
        let resolved = r
            .resolve(&dir.path().join("src/index.js"), "./math")
            .unwrap();
        assert!(resolved.ends_with("src/math.js"));
    }

    #[test]
    fn test_resolve_prefers_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("style.less"), "").unwrap();
        fs::write(dir.path().join("main.js"), "").unwrap();

        let r = resolver(dir.path());
        let resolved = r
            .resolve(&dir.path().join("main.js"), "./style.less")
            .unwrap();
        assert!(resolved.ends_with("style.less"));
    }

    #[test]
    fn test_resolve_directory_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/index.js"), "").unwrap();
        fs::write(dir.path().join("main.js"), "").unwrap();

        let r = resolver(dir.path());
        let resolved = r.resolve(&dir.path().join("main.js"), "./lib").unwrap();
        assert!(resolved.ends_with("lib/index.js"));
    }

    #[test]
    fn test_resolve_bare_specifier_from_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/leftpad")).unwrap();
        fs::write(dir.path().join("node_modules/leftpad/index.js"), "").unwrap();
        fs::write(dir.path().join("main.js"), "").unwrap();

        let r = resolver(dir.path());
        let resolved = r.resolve(&dir.path().join("main.js"), "leftpad").unwrap();
        assert!(resolved.ends_with("node_modules/leftpad/index.js"));
    }

    #[test]
    fn test_unresolvable_request_reports_importer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "").unwrap();

        let r = resolver(dir.path());
        let err = r
            .resolve(&dir.path().join("main.js"), "./missing")
            .unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
        assert!(err.to_string().contains("./missing"));
        assert!(err.to_string().contains("main.js"));
    }

    #[test]
    fn test_missing_entry_is_entry_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path());
        let err = r.resolve_entry("main", "src/nope.js").unwrap_err();
        assert!(matches!(err, BuildError::EntryNotFound { .. }));
    }
}
