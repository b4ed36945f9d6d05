//! Module dependency graph.
//!
//! Modules are stored in a dense arena indexed by [`ModuleId`]; edges
//! carry the original request string, the resolved target and whether
//! the reference was a dynamic import. Ids are assigned in discovery
//! order, which is deterministic for a fixed config (entries iterate in
//! name order, imports in source order), and every module also carries a
//! `stable_id` derived from its root-relative path for use in manifests
//! and update payloads.

use crate::transform::TransformOutput;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::path::{Path, PathBuf};

/// Dense index of a module within one build's graph.
pub type ModuleId = usize;

/// What a dependency edge points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    /// Another module in this graph.
    Module(ModuleId),
    /// An external-library reference, by manifest id.
    External(u32),
}

/// A directed reference from one module to another.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// The request string exactly as written in the source.
    pub request: String,
    pub target: EdgeTarget,
    /// Dynamic imports are lazy and open async chunk boundaries.
    pub is_dynamic: bool,
}

/// Coarse classification driving scanning and transform-rule defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Style,
    Asset,
}

/// A resolved source file participating in the build.
#[derive(Debug, Clone)]
pub struct Module {
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Short path-derived id, stable across builds.
    pub stable_id: String,
    pub kind: ModuleKind,
    /// BLAKE3 of the raw file bytes.
    pub content_hash: String,
    /// Set once the transform pipeline has run (or hit the cache).
    pub output: Option<TransformOutput>,
    /// Outgoing edges in source order.
    pub edges: Vec<DependencyEdge>,
}

impl Module {
    /// Byte size of the transformed output, used by split thresholds.
    #[must_use]
    pub fn output_size(&self) -> u64 {
        self.output.as_ref().map_or(0, |o| o.code.len() as u64)
    }

    /// Static (eager) module dependencies.
    pub fn static_deps(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.edges.iter().filter_map(|e| match e.target {
            EdgeTarget::Module(id) if !e.is_dynamic => Some(id),
            _ => None,
        })
    }

    /// Dynamic-import module dependencies (async boundaries).
    pub fn dynamic_deps(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.edges.iter().filter_map(|e| match e.target {
            EdgeTarget::Module(id) if e.is_dynamic => Some(id),
            _ => None,
        })
    }
}

/// Derive the stable id for a module path relative to the project root.
#[must_use]
pub fn stable_module_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let normalized = rel.to_string_lossy().replace('\\', "/");
    liffey_util::hash::short_hash(normalized.as_bytes())
}

/// The complete module set and edge list for one build.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    path_to_id: HashMap<PathBuf, ModuleId>,
    /// Entry name → root module id, in entry declaration order.
    pub entries: Vec<(String, ModuleId)>,
}

impl ModuleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning its id. The path must not already be present.
    pub fn add(&mut self, module: Module) -> ModuleId {
        debug_assert!(!self.path_to_id.contains_key(&module.path));
        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);
        id
    }

    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    #[must_use]
    pub fn id_by_path(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    /// Modules statically reachable from any entry root.
    ///
    /// Used to decide whether a collected error sits on an entry chain
    /// (fatal) or only in a dynamic branch (demotable).
    #[must_use]
    pub fn entry_reachable(&self) -> HashSet<ModuleId> {
        let mut reachable = HashSet::default();
        let mut stack: Vec<ModuleId> = self.entries.iter().map(|(_, id)| *id).collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(module) = self.get(id) {
                stack.extend(module.static_deps());
            }
        }
        reachable
    }

    /// Detect one representative module per static-import cycle.
    ///
    /// Cycles are permitted; this exists only to surface a warning. Uses
    /// an iterative three-color DFS so deep graphs cannot overflow the
    /// stack.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<ModuleId> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        let mut color = vec![Color::White; self.modules.len()];
        let mut cycle_heads = Vec::new();

        for root in 0..self.modules.len() {
            if color[root] != Color::White {
                continue;
            }
            // (node, next-child-index) frames
            let mut stack: Vec<(ModuleId, usize)> = vec![(root, 0)];
            color[root] = Color::Grey;
            while let Some(&(node, next)) = stack.last() {
                let deps: Vec<ModuleId> = self.modules[node].static_deps().collect();
                if next < deps.len() {
                    if let Some(frame) = stack.last_mut() {
                        frame.1 += 1;
                    }
                    let child = deps[next];
                    match color[child] {
                        Color::White => {
                            color[child] = Color::Grey;
                            stack.push((child, 0));
                        }
                        Color::Grey => cycle_heads.push(child),
                        Color::Black => {}
                    }
                } else {
                    color[node] = Color::Black;
                    stack.pop();
                }
            }
        }

        cycle_heads.sort_unstable();
        cycle_heads.dedup();
        cycle_heads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str, edges: Vec<DependencyEdge>) -> Module {
        Module {
            path: PathBuf::from(path),
            stable_id: stable_module_id(Path::new("/p"), Path::new(path)),
            kind: ModuleKind::Script,
            content_hash: String::new(),
            output: None,
            edges,
        }
    }

    fn edge(target: ModuleId, dynamic: bool) -> DependencyEdge {
        DependencyEdge {
            request: "./x".to_string(),
            target: EdgeTarget::Module(target),
            is_dynamic: dynamic,
        }
    }

    #[test]
    fn test_stable_id_is_path_derived() {
        let a = stable_module_id(Path::new("/p"), Path::new("/p/src/a.js"));
        let b = stable_module_id(Path::new("/p"), Path::new("/p/src/a.js"));
        let c = stable_module_id(Path::new("/p"), Path::new("/p/src/b.js"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = ModuleGraph::new();
        // a <-> b, placeholder edges patched after insertion
        let a = graph.add(module("/p/a.js", vec![]));
        let b = graph.add(module("/p/b.js", vec![edge(a, false)]));
        graph.get_mut(a).unwrap().edges.push(edge(b, false));
        graph.entries.push(("main".to_string(), a));

        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn test_entry_reachable_stops_at_dynamic() {
        let mut graph = ModuleGraph::new();
        let lazy = graph.add(module("/p/lazy.js", vec![]));
        let a = graph.add(module("/p/a.js", vec![edge(lazy, true)]));
        graph.entries.push(("main".to_string(), a));

        let reachable = graph.entry_reachable();
        assert!(reachable.contains(&a));
        assert!(!reachable.contains(&lazy));
    }
}
