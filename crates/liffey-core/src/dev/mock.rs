//! Request mocking for the dev server.
//!
//! A fixture table maps URL paths to canned responses and is consulted
//! before static file serving, so an app under development can hit
//! `/api/...` routes without a backend. Keys ending in `/*` match by
//! prefix; exact keys win over prefix keys, and the longest prefix wins
//! among prefixes.
//!
//! ```json
//! {
//!   "/api/user": { "status": 200, "body": "{\"name\":\"sinead\"}" },
//!   "/api/*": { "status": 404, "body": "{\"error\":\"no fixture\"}" }
//! }
//! ```

use crate::error::{BuildError, Result};
use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use std::path::Path;

/// One canned response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// The loaded fixture table.
#[derive(Debug, Default)]
pub struct MockTable {
    exact: HashMap<String, MockResponse>,
    /// (prefix, response), longest prefix first.
    prefixes: Vec<(String, MockResponse)>,
}

impl MockTable {
    /// Load a fixture file.
    ///
    /// # Errors
    /// Returns config errors for an unreadable or malformed table; a
    /// broken mock file is a startup failure, not something to limp
    /// past silently.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let entries: std::collections::BTreeMap<String, MockResponse> =
            serde_json::from_str(&content).map_err(|e| BuildError::ConfigParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut table = MockTable::default();
        for (key, response) in entries {
            if let Some(prefix) = key.strip_suffix("/*") {
                table.prefixes.push((format!("{prefix}/"), response));
            } else {
                table.exact.insert(key, response);
            }
        }
        table
            .prefixes
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        Ok(table)
    }

    /// Find the fixture for a request path, if any.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&MockResponse> {
        if let Some(hit) = self.exact.get(path) {
            return Some(hit);
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, response)| response)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(json: &str) -> MockTable {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocks.json");
        std::fs::write(&path, json).unwrap();
        MockTable::load(&path).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let t = table(r#"{ "/api/user": { "body": "{\"id\":1}" } }"#);
        let hit = t.lookup("/api/user").unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.content_type, "application/json");
        assert_eq!(hit.body, "{\"id\":1}");
        assert!(t.lookup("/api/users").is_none());
    }

    #[test]
    fn test_exact_wins_over_prefix() {
        let t = table(
            r#"{
                "/api/user": { "body": "exact" },
                "/api/*": { "body": "prefix" }
            }"#,
        );
        assert_eq!(t.lookup("/api/user").unwrap().body, "exact");
        assert_eq!(t.lookup("/api/other").unwrap().body, "prefix");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let t = table(
            r#"{
                "/api/*": { "body": "broad" },
                "/api/v2/*": { "body": "narrow" }
            }"#,
        );
        assert_eq!(t.lookup("/api/v2/user").unwrap().body, "narrow");
        assert_eq!(t.lookup("/api/v1/user").unwrap().body, "broad");
    }

    #[test]
    fn test_custom_status_and_type() {
        let t = table(
            r#"{ "/teapot": { "status": 418, "contentType": "text/plain", "body": "short" } }"#,
        );
        let hit = t.lookup("/teapot").unwrap();
        assert_eq!(hit.status, 418);
        assert_eq!(hit.content_type, "text/plain");
    }

    #[test]
    fn test_malformed_table_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocks.json");
        std::fs::write(&path, "not json").unwrap();
        let err = MockTable::load(&path).unwrap_err();
        assert!(matches!(err, BuildError::ConfigParse { .. }));
    }
}
