//! Call graph of a built profile.
//!
//! Nodes are function names. Edges go from a caller to every function
//! inlined into it and to every indirect call target recorded in its
//! profile. Synthetic prefetch targets are not calls and are left out.
//!
//! ```text
//! main ──▶ parse ──▶ helper
//!   │
//!   └────▶ on_event        (indirect call target)
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;

use crate::prefetch::PREFETCH_TARGET_PREFIX;
use crate::symbol_map::{FunctionProfile, SymbolMap};

// =============================================================================
// GRAPH
// =============================================================================

/// Caller -> callee edges of the profiled functions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
    /// Emitted top-level functions, hottest first
    roots: Vec<(String, u64)>,
}

impl CallGraph {
    #[must_use]
    pub fn from_symbol_map(symbol_map: &SymbolMap) -> Self {
        let mut graph = Self::default();
        for (name, profile) in symbol_map.profiles_to_emit() {
            graph.add_profile(name, profile);
            graph.roots.push((name.clone(), profile.total_count));
        }
        graph.roots.sort_by(|(a_name, a_total), (b_name, b_total)| {
            b_total.cmp(a_total).then_with(|| a_name.cmp(b_name))
        });
        graph
    }

    fn add_profile(&mut self, caller: &str, profile: &FunctionProfile) {
        let callees = self.edges.entry(caller.to_string()).or_default();
        for position in profile.positions.values() {
            callees.extend(
                position
                    .targets
                    .keys()
                    .filter(|target| !target.starts_with(PREFETCH_TARGET_PREFIX))
                    .cloned(),
            );
        }
        callees.extend(profile.callsites.keys().map(|(_, callee)| callee.clone()));

        for ((_, callee), inlined) in &profile.callsites {
            self.add_profile(callee, inlined);
        }
    }

    /// Direct callees of `node`, sorted by name
    pub fn callees<'g>(&'g self, node: &str) -> impl Iterator<Item = &'g str> + 'g {
        self.edges.get(node).into_iter().flatten().map(String::as_str)
    }

    /// Profiled top-level functions with their total counts, hottest first
    #[must_use]
    pub fn roots(&self) -> &[(String, u64)] {
        &self.roots
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Depth-first walk from `node`, calling `on_node` once per reachable node.
///
/// Nodes already in `visited` are skipped, so cycles terminate and a caller
/// can share one set across several walks.
pub fn dfs<'g>(
    graph: &'g CallGraph,
    node: &'g str,
    visited: &mut HashSet<&'g str>,
    on_node: &mut dyn FnMut(&'g str),
) {
    if !visited.insert(node) {
        return;
    }
    on_node(node);
    for callee in graph.callees(node) {
        dfs(graph, callee, visited, on_node);
    }
}

// =============================================================================
// DUMP
// =============================================================================

fn display_name(name: &str, demangle: bool) -> String {
    if demangle {
        format!("{:#}", rustc_demangle::demangle(name))
    } else {
        name.to_string()
    }
}

/// One line per root: `root (total): reachable functions in DFS order`
#[must_use]
pub fn render_dump(graph: &CallGraph, demangle: bool) -> String {
    let mut out = String::new();
    for (root, total) in graph.roots() {
        let mut visited = HashSet::new();
        let mut reached = Vec::new();
        dfs(graph, root, &mut visited, &mut |node| reached.push(display_name(node, demangle)));

        let _ = writeln!(out, "{} ({total}): {}", display_name(root, demangle), reached.join(" "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InlineFrame, ProfileCount, SymbolInfo};

    fn symbol_map() -> SymbolMap {
        let mut map = SymbolMap::new(vec![
            SymbolInfo::new("main", 0x1000, 0x100),
            SymbolInfo::new("worker", 0x2000, 0x100),
        ]);
        // helper inlined into parse inlined into main
        let inlined = [
            InlineFrame::new("helper", 100, 101),
            InlineFrame::new("parse", 50, 52),
            InlineFrame::new("main", 10, 14),
        ];
        map.add_count("main", &inlined, 10, false);
        let main_line = [InlineFrame::new("main", 10, 12)];
        map.add_count("main", &main_line, 1, false);
        map.add_indirect_call_target("main", &main_line, "worker", ProfileCount::Execution(1));
        map.add_indirect_call_target(
            "main",
            &main_line,
            "__prefetch_T0_0",
            ProfileCount::PrefetchDelta(8),
        );

        let worker_line = [InlineFrame::new("worker", 1, 2)];
        map.add_count("worker", &worker_line, 3, false);
        // Cycle back to main
        map.add_indirect_call_target("worker", &worker_line, "main", ProfileCount::Execution(3));
        map
    }

    #[test]
    fn test_graph_edges() {
        let graph = CallGraph::from_symbol_map(&symbol_map());
        let main: Vec<_> = graph.callees("main").collect();
        assert_eq!(main, vec!["parse", "worker"]);
        assert_eq!(graph.callees("parse").collect::<Vec<_>>(), vec!["helper"]);
        assert_eq!(graph.callees("unknown").count(), 0);
        assert_eq!(graph.roots()[0], ("main".to_string(), 11));
    }

    #[test]
    fn test_dfs_terminates_on_cycles() {
        let graph = CallGraph::from_symbol_map(&symbol_map());
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        dfs(&graph, "main", &mut visited, &mut |node| order.push(node));

        assert_eq!(order, vec!["main", "parse", "helper", "worker"]);
    }

    #[test]
    fn test_dfs_shared_visited_set() {
        let graph = CallGraph::from_symbol_map(&symbol_map());
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        dfs(&graph, "parse", &mut visited, &mut |node| order.push(node));
        dfs(&graph, "main", &mut visited, &mut |node| order.push(node));

        assert_eq!(order, vec!["parse", "helper", "main", "worker"]);
    }

    #[test]
    fn test_render_dump() {
        let graph = CallGraph::from_symbol_map(&symbol_map());
        let dump = render_dump(&graph, false);
        assert_eq!(
            dump,
            "main (11): main parse helper worker\nworker (3): worker main parse helper\n"
        );
    }

    #[test]
    fn test_render_dump_demangles() {
        let mut map = SymbolMap::new(vec![SymbolInfo::new("_ZN4test3run17h0123456789abcdefE", 0x1000, 0x10)]);
        map.add_count(
            "_ZN4test3run17h0123456789abcdefE",
            &[InlineFrame::new("_ZN4test3run17h0123456789abcdefE", 1, 1)],
            1,
            false,
        );
        let dump = render_dump(&CallGraph::from_symbol_map(&map), true);
        assert!(dump.starts_with("test::run (1)"), "{dump}");
    }
}
