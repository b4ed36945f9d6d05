//! Build orchestration.
//!
//! A build runs in phases: discover the module graph from the entries
//! (consulting the external manifest before the resolver), transform
//! every module in parallel through the cache, classify collected
//! errors against the entry chains, split into chunks and emit. Errors
//! are collected per module and reported together; the build fails only
//! when an error sits on a chain statically reachable from an entry.

use crate::cache::BuildCache;
use crate::chunks::{self, Chunk};
use crate::config::BundlerConfig;
use crate::emit::{self, ChunkManifest};
use crate::error::{BuildError, BuildWarning, Diagnostics, Result};
use crate::graph::{
    stable_module_id, DependencyEdge, EdgeTarget, Module, ModuleGraph, ModuleId,
};
use crate::linker::{self, ExternalManifest};
use crate::resolve::Resolver;
use crate::scan;
use crate::transform::TransformPipeline;
use liffey_util::hash::content_hash;
use rayon::prelude::*;
use rustc_hash::FxHashSet as HashSet;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The product of one build pass.
pub struct BuildResult {
    pub graph: ModuleGraph,
    pub chunks: Vec<Chunk>,
    pub manifest: ChunkManifest,
    pub diagnostics: Diagnostics,
    /// Files written to the output directory. Empty when the build
    /// failed (nothing is emitted on error).
    pub files: Vec<PathBuf>,
}

impl BuildResult {
    /// True when no entry-chain error was collected.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Stable ids and fresh code for modules that differ between builds.
#[derive(Debug, Default)]
pub struct BuildDiff {
    /// Stable ids of added, changed and removed modules.
    pub changed_module_ids: Vec<String>,
    /// Stable id → new transformed code, for added and changed modules.
    pub new_code: BTreeMap<String, String>,
}

/// Compare two builds module by module.
#[must_use]
pub fn diff(previous: &BuildResult, current: &BuildResult) -> BuildDiff {
    let mut prev_by_id: BTreeMap<&str, &Module> = BTreeMap::new();
    for (_, module) in previous.graph.iter() {
        prev_by_id.insert(module.stable_id.as_str(), module);
    }

    let mut out = BuildDiff::default();
    let mut seen: HashSet<&str> = HashSet::default();
    for (_, module) in current.graph.iter() {
        seen.insert(module.stable_id.as_str());
        let code = module.output.as_ref().map(|o| o.code.as_str()).unwrap_or("");
        let changed = match prev_by_id.get(module.stable_id.as_str()) {
            Some(prev) => {
                prev.content_hash != module.content_hash
                    || prev.output.as_ref().map(|o| o.code.as_str()) != Some(code)
            }
            None => true,
        };
        if changed {
            out.changed_module_ids.push(module.stable_id.clone());
            out.new_code
                .insert(module.stable_id.clone(), code.to_string());
        }
    }
    for id in prev_by_id.keys() {
        if !seen.contains(id) {
            out.changed_module_ids.push((*id).to_string());
        }
    }
    out.changed_module_ids.sort();
    out
}

/// Drives full and incremental builds for one loaded config.
pub struct Bundler {
    config: BundlerConfig,
    resolver: Resolver,
    pipeline: TransformPipeline,
    cache: BuildCache,
    externals: Option<ExternalManifest>,
    externals_warning: Option<BuildWarning>,
}

impl Bundler {
    /// Prepare a bundler: compile rules, open the cache and load the
    /// external manifest when configured.
    ///
    /// # Errors
    /// Returns config-level errors (invalid rules or groups). A broken
    /// external manifest is a warning, not an error.
    pub fn new(config: BundlerConfig) -> Result<Self> {
        config.validate()?;
        let resolver = Resolver::new(&config.root, &config.resolve);
        let pipeline = TransformPipeline::new(&config)?;
        let cache = BuildCache::open(config.cache_dir_abs(), config.cache.max_records);
        let (externals, externals_warning) = linker::load_configured(config.externals_abs().as_ref());
        Ok(Self {
            config,
            resolver,
            pipeline,
            cache,
            externals,
            externals_warning,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    /// Cache hits served so far, across builds.
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache.hit_count()
    }

    /// Run a full build: discover, transform, split, emit.
    ///
    /// # Errors
    /// Returns an error only for non-build failures (invalid split
    /// regex, output IO). Per-module failures land in the result's
    /// diagnostics instead.
    pub fn build(&self) -> Result<BuildResult> {
        let started = std::time::Instant::now();
        let mut diagnostics = Diagnostics::new();
        if let Some(warning) = self.externals_warning.clone() {
            diagnostics.warn(warning);
        }
        for warning in self.cache.drain_warnings() {
            diagnostics.warn(warning);
        }

        // (module attribution, error) pairs, classified after discovery.
        let mut module_errors: Vec<(Option<ModuleId>, BuildError)> = Vec::new();
        let (mut graph, raw) = self.discover(&mut module_errors);

        self.transform_all(&mut graph, &raw, &mut module_errors);

        // Errors off every entry chain are demotable to warnings.
        let reachable = graph.entry_reachable();
        for (id, error) in module_errors {
            let on_entry_chain = id.map_or(true, |id| reachable.contains(&id));
            if on_entry_chain || self.config.fail_on_dead_branch {
                diagnostics.error(error);
            } else {
                diagnostics.warn(BuildWarning::DeadBranch {
                    message: error.to_string(),
                });
            }
        }

        for id in graph.find_cycles() {
            if let Some(module) = graph.get(id) {
                diagnostics.warn(BuildWarning::Cycle {
                    path: module.path.clone(),
                });
            }
        }

        let chunks = chunks::split(&graph, &self.config.split)?;

        let (manifest, files) = if diagnostics.has_errors() {
            (ChunkManifest::default(), Vec::new())
        } else {
            let library = self.externals.as_ref().map(ExternalManifest::name);
            let library_file = self.externals.as_ref().and_then(ExternalManifest::file);
            let result = emit::emit(&self.config, &graph, &chunks, library, library_file)?;
            (result.manifest, result.files)
        };

        tracing::info!(
            modules = graph.len(),
            chunks = chunks.len(),
            errors = diagnostics.errors.len(),
            warnings = diagnostics.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );

        Ok(BuildResult {
            graph,
            chunks,
            manifest,
            diagnostics,
            files,
        })
    }

    /// Rebuild after file changes.
    ///
    /// The whole graph is re-resolved so renames and new imports are
    /// picked up; unchanged modules short-circuit through the cache, so
    /// the cost is dominated by the changed set.
    ///
    /// # Errors
    /// Same contract as [`Bundler::build`].
    pub fn rebuild(&self, previous: &BuildResult) -> Result<(BuildResult, BuildDiff)> {
        let current = self.build()?;
        let diff = diff(previous, &current);
        Ok((current, diff))
    }

    /// Build an external library and its manifest.
    ///
    /// The entry named `name` becomes a standalone bundle registering
    /// itself under the global `name`, and each of the entry's request
    /// strings is recorded in the manifest for application builds to
    /// link against.
    ///
    /// # Errors
    /// Library builds have no demotion policy: any error is fatal.
    pub fn build_library(&self, name: &str) -> Result<LibraryBuild> {
        let entry = self
            .config
            .entry
            .get(name)
            .ok_or_else(|| BuildError::EntryNotFound {
                name: name.to_string(),
                path: PathBuf::from("liffey.config.json#entry"),
            })?;

        let mut module_errors: Vec<(Option<ModuleId>, BuildError)> = Vec::new();
        let mut graph = ModuleGraph::new();
        let mut raw: Vec<Vec<u8>> = Vec::new();
        let mut scanned: HashSet<ModuleId> = HashSet::default();
        let mut manifest = ExternalManifest::new(name);
        let mut roots: Vec<(String, ModuleId)> = Vec::new();

        for request in entry.paths() {
            match self.resolver.resolve_entry(name, request) {
                Ok(path) => {
                    let id = self.discover_from(
                        &mut graph,
                        &mut raw,
                        path,
                        &mut scanned,
                        &mut module_errors,
                    );
                    if let Some(id) = id {
                        roots.push((request.to_string(), id));
                    }
                }
                Err(e) => module_errors.push((None, e)),
            }
        }

        self.transform_all(&mut graph, &raw, &mut module_errors);
        if let Some((_, error)) = module_errors.into_iter().next() {
            return Err(error);
        }

        for (request, _) in &roots {
            manifest.register(request, Vec::new());
        }

        let code = render_library(name, &graph, &roots);
        let file_name = format!("{name}.lib.{}.js", liffey_util::hash::short_hash(code.as_bytes()));
        let out_dir = self.config.out_dir_abs();
        liffey_util::fs::ensure_dir(&out_dir)?;
        liffey_util::fs::atomic_write(&out_dir.join(&file_name), code.as_bytes())?;

        manifest.set_file(&file_name);
        let manifest_path = out_dir.join(format!("{name}.manifest.json"));
        manifest.save(&manifest_path)?;

        tracing::info!(
            library = name,
            modules = graph.len(),
            file = %file_name,
            "library built"
        );
        Ok(LibraryBuild {
            bundle_file: file_name,
            manifest_path,
        })
    }

    /// Breadth-first discovery from the configured entries.
    fn discover(
        &self,
        errors: &mut Vec<(Option<ModuleId>, BuildError)>,
    ) -> (ModuleGraph, Vec<Vec<u8>>) {
        let mut graph = ModuleGraph::new();
        let mut raw: Vec<Vec<u8>> = Vec::new();
        let mut scanned: HashSet<ModuleId> = HashSet::default();

        for (name, entry) in &self.config.entry {
            let mut first: Option<ModuleId> = None;
            let mut extra: Vec<(String, ModuleId)> = Vec::new();
            for request in entry.paths() {
                match self.resolver.resolve_entry(name, request) {
                    Ok(path) => {
                        let Some(id) =
                            self.discover_from(&mut graph, &mut raw, path, &mut scanned, errors)
                        else {
                            continue;
                        };
                        if first.is_none() {
                            first = Some(id);
                        } else {
                            extra.push((request.to_string(), id));
                        }
                    }
                    Err(e) => errors.push((None, e)),
                }
            }
            if let Some(root) = first {
                // Extra entry paths hang off the first as static edges
                // so the entry chunk closes over all of them.
                if let Some(module) = graph.get_mut(root) {
                    for (request, id) in extra {
                        module.edges.push(DependencyEdge {
                            request,
                            target: EdgeTarget::Module(id),
                            is_dynamic: false,
                        });
                    }
                }
                graph.entries.push((name.clone(), root));
            }
        }

        (graph, raw)
    }

    /// Discover the subgraph rooted at `path`, returning its id. The
    /// `scanned` set is shared across entries so a module reached from
    /// two entries is scanned exactly once.
    fn discover_from(
        &self,
        graph: &mut ModuleGraph,
        raw: &mut Vec<Vec<u8>>,
        path: PathBuf,
        scanned: &mut HashSet<ModuleId>,
        errors: &mut Vec<(Option<ModuleId>, BuildError)>,
    ) -> Option<ModuleId> {
        let root = self.load_module(graph, raw, path, errors)?;
        let mut queue: Vec<ModuleId> = vec![root];

        while let Some(id) = queue.pop() {
            if !scanned.insert(id) {
                continue;
            }
            let (kind, source, importer) = {
                let module = graph.get(id)?;
                (
                    module.kind,
                    String::from_utf8_lossy(&raw[id]).into_owned(),
                    module.path.clone(),
                )
            };
            for found in scan::scan_module(kind, &source) {
                let target = if let Some(entry) = self
                    .externals
                    .as_ref()
                    .and_then(|m| m.lookup(&found.request))
                {
                    // Linked requests never reach the resolver.
                    EdgeTarget::External(entry.id)
                } else {
                    match self.resolver.resolve(&importer, &found.request) {
                        Ok(resolved) => {
                            let dep = match graph.id_by_path(&resolved) {
                                Some(existing) => existing,
                                None => {
                                    let Some(new_id) =
                                        self.load_module(graph, raw, resolved, errors)
                                    else {
                                        continue;
                                    };
                                    new_id
                                }
                            };
                            queue.push(dep);
                            EdgeTarget::Module(dep)
                        }
                        Err(e) => {
                            errors.push((Some(id), e));
                            continue;
                        }
                    }
                };
                if let Some(module) = graph.get_mut(id) {
                    module.edges.push(DependencyEdge {
                        request: found.request,
                        target,
                        is_dynamic: found.is_dynamic,
                    });
                }
            }
        }

        Some(root)
    }

    /// Read a file and add it to the graph as an untransformed module.
    fn load_module(
        &self,
        graph: &mut ModuleGraph,
        raw: &mut Vec<Vec<u8>>,
        path: PathBuf,
        errors: &mut Vec<(Option<ModuleId>, BuildError)>,
    ) -> Option<ModuleId> {
        if let Some(existing) = graph.id_by_path(&path) {
            return Some(existing);
        }
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                errors.push((None, BuildError::Io(e)));
                return None;
            }
        };
        let module = Module {
            stable_id: stable_module_id(&self.config.root, &path),
            kind: self.config.kind_of(&path),
            content_hash: content_hash(&bytes),
            output: None,
            edges: Vec::new(),
            path,
        };
        let id = graph.add(module);
        raw.push(bytes);
        debug_assert_eq!(raw.len(), graph.len());
        Some(id)
    }

    /// Transform every module in parallel, consulting the cache first.
    fn transform_all(
        &self,
        graph: &mut ModuleGraph,
        raw: &[Vec<u8>],
        errors: &mut Vec<(Option<ModuleId>, BuildError)>,
    ) {
        let jobs: Vec<(ModuleId, PathBuf, crate::graph::ModuleKind, String)> = graph
            .iter()
            .map(|(id, m)| (id, m.path.clone(), m.kind, m.content_hash.clone()))
            .collect();

        let results: Vec<(ModuleId, Result<crate::transform::TransformOutput>)> = jobs
            .into_par_iter()
            .map(|(id, path, kind, content_hash)| {
                let options_hash = self.pipeline.options_hash(&path, kind);
                let key = BuildCache::key(&path, &content_hash, &options_hash);
                if let Some(hit) = self.cache.get(&key) {
                    return (id, Ok(hit));
                }
                let output = self.pipeline.transform(&path, kind, &raw[id]);
                if let Ok(output) = &output {
                    if let Err(e) = self.cache.put(&key, output) {
                        tracing::warn!("cache write failed: {e}");
                    }
                }
                (id, output)
            })
            .collect();

        for (id, result) in results {
            match result {
                Ok(output) => {
                    if let Some(module) = graph.get_mut(id) {
                        module.output = Some(output);
                    }
                }
                Err(e) => errors.push((Some(id), e)),
            }
        }
    }
}

/// A finished library build.
#[derive(Debug)]
pub struct LibraryBuild {
    /// Content-hashed bundle file name inside the output directory.
    pub bundle_file: String,
    /// Absolute path of the written manifest.
    pub manifest_path: PathBuf,
}

/// Render a self-contained library bundle registering under `name`.
fn render_library(name: &str, graph: &ModuleGraph, roots: &[(String, ModuleId)]) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "var {name} = window[\"{name}\"] = (function () {{");
    out.push_str("  var defs = {}, cache = {}, ids = {};\n");
    out.push_str("  function define(id, fn) { defs[id] = fn; }\n");
    out.push_str("  function require(id) {\n");
    out.push_str("    if (cache[id]) return cache[id].exports;\n");
    out.push_str("    var m = (cache[id] = { exports: {} });\n");
    out.push_str("    defs[id].call(m.exports, m, m.exports, require);\n");
    out.push_str("    return m.exports;\n");
    out.push_str("  }\n");
    for (_, module) in graph.iter() {
        let code = module.output.as_ref().map_or("", |o| o.code.as_str());
        let _ = writeln!(
            out,
            "  define(\"{}\", function (module, exports, require) {{",
            module.stable_id
        );
        out.push_str(code);
        if !code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("  });\n");
    }
    for (index, (_, root)) in roots.iter().enumerate() {
        if let Some(module) = graph.get(*root) {
            let _ = writeln!(out, "  ids[{index}] = \"{}\";", module.stable_id);
        }
    }
    out.push_str("  return { get: function (i) { return require(ids[i]); } };\n})();\n");
    out
}
