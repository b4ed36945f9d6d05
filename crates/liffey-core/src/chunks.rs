//! Chunk assembly and shared-chunk extraction.
//!
//! One initial chunk per entry holds the entry's static closure, one
//! async chunk per distinct dynamic-import target holds that target's
//! static closure. A module may appear in several chunks at this stage;
//! deduplication is the cache groups' job.
//!
//! Groups are applied in priority order (highest first, name as the
//! tie-break). Each group collects matching modules not yet claimed by
//! an earlier group, counts how many eligible chunks reference each one,
//! and extracts those meeting the group's thresholds into a shared
//! chunk, removing them from the chunks they came from. The pass is
//! deterministic for a fixed graph and config.

use crate::config::{ChunkApplicability, SplitOptions};
use crate::error::Result;
use crate::graph::{ModuleGraph, ModuleId};
use regex_lite::Regex;
use rustc_hash::FxHashSet as HashSet;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Loaded eagerly for an entry.
    Initial,
    /// Loaded on demand through a dynamic import.
    Async,
    /// Extracted by a cache group, shared by other chunks.
    Shared,
}

/// A unit of emitted output.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: String,
    pub kind: ChunkKind,
    /// Member modules in ascending id order.
    pub modules: Vec<ModuleId>,
    /// Root module, for initial and async chunks.
    pub entry: Option<ModuleId>,
}

impl Chunk {
    fn eligible_for(&self, applicability: ChunkApplicability) -> bool {
        match applicability {
            ChunkApplicability::All => self.kind != ChunkKind::Shared,
            ChunkApplicability::Initial => self.kind == ChunkKind::Initial,
            ChunkApplicability::Async => self.kind == ChunkKind::Async,
        }
    }
}

/// Static closure from a root, in ascending id order.
fn static_closure(graph: &ModuleGraph, root: ModuleId) -> Vec<ModuleId> {
    let mut seen: HashSet<ModuleId> = HashSet::default();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(module) = graph.get(id) {
            stack.extend(module.static_deps());
        }
    }
    let mut members: Vec<ModuleId> = seen.into_iter().collect();
    members.sort_unstable();
    members
}

/// Assemble chunks and apply the configured cache groups.
///
/// # Errors
/// Returns an error for an invalid group regex; config validation
/// normally rejects these before a build starts.
pub fn split(graph: &ModuleGraph, options: &SplitOptions) -> Result<Vec<Chunk>> {
    let mut chunks: Vec<Chunk> = Vec::new();

    for (name, root) in &graph.entries {
        chunks.push(Chunk {
            name: name.clone(),
            kind: ChunkKind::Initial,
            modules: static_closure(graph, *root),
            entry: Some(*root),
        });
    }

    // Async chunks, one per distinct dynamic target, in discovery order.
    let mut async_targets: Vec<ModuleId> = Vec::new();
    let mut seen_targets: HashSet<ModuleId> = HashSet::default();
    for (_, module) in graph.iter() {
        for target in module.dynamic_deps() {
            if seen_targets.insert(target) {
                async_targets.push(target);
            }
        }
    }
    let mut used_names: HashSet<String> =
        chunks.iter().map(|c| c.name.clone()).collect();
    for target in async_targets {
        let name = async_chunk_name(graph, target, &mut used_names);
        chunks.push(Chunk {
            name,
            kind: ChunkKind::Async,
            modules: static_closure(graph, target),
            entry: Some(target),
        });
    }

    apply_groups(graph, options, &mut chunks)?;
    Ok(chunks)
}

fn async_chunk_name(
    graph: &ModuleGraph,
    target: ModuleId,
    used: &mut HashSet<String>,
) -> String {
    let stem = graph
        .get(target)
        .and_then(|m| m.path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| format!("async{target}"));
    let mut name = stem.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        name = format!("{stem}-{n}");
        n += 1;
    }
    name
}

fn apply_groups(
    graph: &ModuleGraph,
    options: &SplitOptions,
    chunks: &mut Vec<Chunk>,
) -> Result<()> {
    let mut groups = options.groups.clone();
    groups.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));

    let mut claimed: HashSet<ModuleId> = HashSet::default();

    for group in &groups {
        let test = Regex::new(&group.test).map_err(|e| {
            crate::error::BuildError::SplitConfig {
                group: group.name.clone(),
                reason: e.to_string(),
            }
        })?;

        // Module → referencing eligible chunks. BTreeMap keeps the
        // extracted member list in id order.
        let mut refs: BTreeMap<ModuleId, usize> = BTreeMap::new();
        for chunk in chunks.iter() {
            if !chunk.eligible_for(group.chunks) {
                continue;
            }
            for &id in &chunk.modules {
                if claimed.contains(&id) {
                    continue;
                }
                let Some(module) = graph.get(id) else { continue };
                let text = module.path.to_string_lossy().replace('\\', "/");
                if test.is_match(&text) {
                    *refs.entry(id).or_default() += 1;
                }
            }
        }

        let min_chunks = usize::try_from(group.min_chunks).unwrap_or(1);
        let members: Vec<ModuleId> = refs
            .into_iter()
            .filter(|&(_, count)| count >= min_chunks)
            .map(|(id, _)| id)
            .collect();
        if members.is_empty() {
            continue;
        }

        let total: u64 = members
            .iter()
            .filter_map(|&id| graph.get(id))
            .map(crate::graph::Module::output_size)
            .sum();
        let min_size = u64::try_from(group.min_size).unwrap_or(0);
        if total < min_size {
            tracing::debug!(
                group = %group.name,
                total,
                min_size,
                "cache group below size threshold"
            );
            continue;
        }

        let member_set: HashSet<ModuleId> = members.iter().copied().collect();
        for chunk in chunks.iter_mut() {
            if chunk.eligible_for(group.chunks) {
                chunk.modules.retain(|id| !member_set.contains(id));
            }
        }
        claimed.extend(&members);
        chunks.push(Chunk {
            name: group.name.clone(),
            kind: ChunkKind::Shared,
            modules: members,
            entry: None,
        });
    }

    Ok(())
}
