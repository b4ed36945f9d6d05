//! Output emission.
//!
//! Renders each chunk to `<name>.<contentHash>.js`, copies emitted
//! assets, writes the chunk manifest and generates an `index.html` that
//! loads the library bundle (when linked), shared chunks and initial
//! chunks in that order. All writes are atomic; unchanged chunk content
//! keeps its hash and therefore its file name across builds.
//!
//! Chunk format: every module becomes a `__liffey.define(stableId, fn)`
//! registration behind a small runtime prelude that backs
//! `define`/`require` in the browser. The prelude is idempotent and
//! emitted into every chunk, so chunks may load in any order.

use crate::chunks::{Chunk, ChunkKind};
use crate::config::BundlerConfig;
use crate::error::Result;
use crate::graph::{EdgeTarget, ModuleGraph};
use liffey_util::hash::short_hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// File name of the chunk manifest inside the output directory.
pub const CHUNK_MANIFEST_FILE: &str = "chunk-manifest.json";

const RUNTIME_PRELUDE: &str = r#"var __liffey = window.__liffey = window.__liffey || (function () {
  var defs = {}, cache = {};
  return {
    define: function (id, fn) { defs[id] = fn; },
    require: function (id) {
      if (cache[id]) return cache[id].exports;
      var m = (cache[id] = { exports: {} });
      defs[id].call(m.exports, m, m.exports, __liffey.require);
      return m.exports;
    },
    external: function (lib, id) { return window[lib].get(id); }
  };
})();
"#;

/// One manifest entry: where a chunk landed and what it holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkManifestEntry {
    /// Emitted file name, content-hashed.
    pub file: String,
    /// `initial`, `async` or `shared`.
    pub kind: String,
    /// Stable ids of member modules.
    pub modules: Vec<String>,
}

/// Chunk name → entry, written as `chunk-manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkManifest {
    pub chunks: BTreeMap<String, ChunkManifestEntry>,
}

impl ChunkManifest {
    /// Entries present in `self` whose file differs from (or is absent
    /// in) `previous`. Drives dev-server update payloads.
    #[must_use]
    pub fn delta(&self, previous: &ChunkManifest) -> BTreeMap<String, ChunkManifestEntry> {
        self.chunks
            .iter()
            .filter(|(name, entry)| previous.chunks.get(*name) != Some(*entry))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }
}

/// Everything one emit pass produced.
#[derive(Debug)]
pub struct EmitResult {
    pub manifest: ChunkManifest,
    /// Absolute paths of all written files.
    pub files: Vec<PathBuf>,
}

fn kind_str(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Initial => "initial",
        ChunkKind::Async => "async",
        ChunkKind::Shared => "shared",
    }
}

/// Render a chunk's code. Exposed for the dev server, which sends the
/// same text over the update channel that emit writes to disk.
#[must_use]
pub fn render_chunk(graph: &ModuleGraph, chunk: &Chunk, library: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("\"use strict\";\n");
    // Every chunk carries the guarded prelude; shared chunks are loaded
    // ahead of the initial chunk that would otherwise define it.
    out.push_str(RUNTIME_PRELUDE);
    for &id in &chunk.modules {
        let Some(module) = graph.get(id) else { continue };
        let code = module.output.as_ref().map_or("", |o| o.code.as_str());
        let _ = writeln!(
            out,
            "__liffey.define(\"{}\", function (module, exports, require) {{",
            module.stable_id
        );
        // External edges resolve through the library global at runtime.
        for edge in &module.edges {
            if let EdgeTarget::External(ext_id) = edge.target {
                if let Some(lib) = library {
                    let _ = writeln!(
                        out,
                        "// external: {} -> __liffey.external(\"{lib}\", {ext_id})",
                        edge.request
                    );
                }
            }
        }
        out.push_str(code);
        if !code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("});\n");
    }
    if let Some(root) = chunk.entry {
        if chunk.kind == ChunkKind::Initial {
            if let Some(module) = graph.get(root) {
                let _ = writeln!(out, "__liffey.require(\"{}\");", module.stable_id);
            }
        }
    }
    out
}

/// Content-hashed output name for a rendered text.
#[must_use]
pub fn hashed_file_name(stem: &str, code: &str) -> String {
    format!("{stem}.{}.js", short_hash(code.as_bytes()))
}

/// Write chunks, assets, the chunk manifest and `index.html`.
///
/// # Errors
/// Returns the first IO error; partially written files are never left
/// visible thanks to atomic writes.
pub fn emit(
    config: &BundlerConfig,
    graph: &ModuleGraph,
    chunks: &[Chunk],
    library: Option<&str>,
    library_file: Option<&str>,
) -> Result<EmitResult> {
    let out_dir = config.out_dir_abs();
    liffey_util::fs::ensure_dir(&out_dir)?;

    let mut manifest = ChunkManifest::default();
    let mut files = Vec::new();

    for chunk in chunks {
        let code = render_chunk(graph, chunk, library);
        let file_name = hashed_file_name(&chunk.name, &code);
        let path = out_dir.join(&file_name);
        liffey_util::fs::atomic_write(&path, code.as_bytes())?;
        tracing::debug!(chunk = %chunk.name, file = %file_name, "chunk written");
        files.push(path);

        let modules = chunk
            .modules
            .iter()
            .filter_map(|&id| graph.get(id))
            .map(|m| m.stable_id.clone())
            .collect();
        manifest.chunks.insert(
            chunk.name.clone(),
            ChunkManifestEntry {
                file: file_name,
                kind: kind_str(chunk.kind).to_string(),
                modules,
            },
        );
    }

    // Asset sidecars, deduplicated by output name (identical content
    // hashes to an identical name).
    let mut written: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();
    for (_, module) in graph.iter() {
        let Some(asset) = module.output.as_ref().and_then(|o| o.emitted_asset.as_ref())
        else {
            continue;
        };
        if !written.insert(asset.file_name.clone()) {
            continue;
        }
        let path = out_dir.join(&asset.file_name);
        liffey_util::fs::atomic_write(&path, &asset.bytes)?;
        files.push(path);
    }

    let manifest_path = out_dir.join(CHUNK_MANIFEST_FILE);
    liffey_util::fs::atomic_write(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;
    files.push(manifest_path);

    let html = generate_index_html(config, &manifest, library_file);
    let html_path = out_dir.join("index.html");
    liffey_util::fs::atomic_write(&html_path, html.as_bytes())?;
    files.push(html_path);

    Ok(EmitResult { manifest, files })
}

/// Entry HTML referencing the library bundle, shared chunks and initial
/// chunks. Async chunks load on demand and are not referenced here.
#[must_use]
pub fn generate_index_html(
    config: &BundlerConfig,
    manifest: &ChunkManifest,
    library_file: Option<&str>,
) -> String {
    let mut scripts = String::new();
    let prefix = &config.public_path;
    if let Some(file) = library_file {
        let _ = writeln!(scripts, "    <script src=\"{prefix}{file}\"></script>");
    }
    for entry in manifest.chunks.values().filter(|e| e.kind == "shared") {
        let _ = writeln!(scripts, "    <script src=\"{prefix}{}\"></script>", entry.file);
    }
    for entry in manifest.chunks.values().filter(|e| e.kind == "initial") {
        let _ = writeln!(scripts, "    <script src=\"{prefix}{}\"></script>", entry.file);
    }

    format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\" />\n    \
         <title>liffey</title>\n  </head>\n  <body>\n    <div id=\"root\"></div>\n\
         {scripts}  </body>\n</html>\n"
    )
}
