//! Call graph types.
//!
//! Edges connect caller symbols to callees. A callee is either a
//! resolved symbol, an external name the program never defines, or a
//! `Dynamic` placeholder for reflective dispatch that cannot be resolved
//! statically. Cycles are legal and preserved as-is; every consumer must
//! be cycle-safe (the taint engine's visited-set contract).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::symbols::SymbolId;

/// Target of a call edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    /// Resolved to a symbol in the analyzed program
    Resolved(SymbolId),
    /// A name the program never defines (stdlib, third-party)
    External(String),
    /// Reflective/computed dispatch; an analysis blind spot, surfaced as
    /// an `unresolved-dynamic-call` finding, never silently dropped
    Dynamic(String),
}

/// A directed call edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    /// Calling symbol: a function, or the module symbol for module-scope
    /// statements
    pub caller: SymbolId,
    /// Call target
    pub callee: Callee,
    /// File containing the call site
    pub file: String,
    /// Line of the call site (1-indexed)
    pub line: usize,
    /// True when the target is invoked through a concurrency primitive
    /// (`threading.Thread(target=f)`, executor submission, task spawn)
    pub concurrent: bool,
}

/// Project-wide call graph.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CallGraph {
    /// All call edges
    pub edges: Vec<CallEdge>,
    /// Index: callee symbol -> edge indices (who calls this?)
    #[serde(skip)]
    callers: FxHashMap<SymbolId, Vec<usize>>,
    /// Index: caller symbol -> edge indices (what does this call?)
    #[serde(skip)]
    callees: FxHashMap<SymbolId, Vec<usize>>,
}

impl CallGraph {
    /// Create a call graph from edges and build the lookup indexes.
    #[must_use]
    pub fn from_edges(edges: Vec<CallEdge>) -> Self {
        let mut graph = Self {
            edges,
            callers: FxHashMap::default(),
            callees: FxHashMap::default(),
        };
        graph.build_indexes();
        graph
    }

    /// Rebuild the caller/callee indexes (call after deserialization).
    pub fn build_indexes(&mut self) {
        self.callers.clear();
        self.callees.clear();
        for (idx, edge) in self.edges.iter().enumerate() {
            self.callees.entry(edge.caller).or_default().push(idx);
            if let Callee::Resolved(target) = edge.callee {
                self.callers.entry(target).or_default().push(idx);
            }
        }
    }

    /// Edges calling into the given symbol.
    pub fn callers_of(&self, target: SymbolId) -> impl Iterator<Item = &CallEdge> {
        self.callers
            .get(&target)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Edges going out of the given symbol.
    pub fn callees_of(&self, caller: SymbolId) -> impl Iterator<Item = &CallEdge> {
        self.callees
            .get(&caller)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Number of distinct call sites targeting a symbol.
    #[must_use]
    pub fn call_site_count(&self, target: SymbolId) -> usize {
        self.callers.get(&target).map_or(0, Vec::len)
    }

    /// Whether a symbol is invoked through any concurrency primitive.
    #[must_use]
    pub fn is_concurrent(&self, target: SymbolId) -> bool {
        self.callers_of(target).any(|e| e.concurrent)
    }

    /// All dynamic (unresolvable) call edges.
    pub fn dynamic_edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.edges
            .iter()
            .filter(|e| matches!(e.callee, Callee::Dynamic(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(caller: u32, callee: Callee, line: usize) -> CallEdge {
        CallEdge {
            caller: SymbolId(caller),
            callee,
            file: "m.py".to_string(),
            line,
            concurrent: false,
        }
    }

    #[test]
    fn test_indexes_and_counts() {
        let graph = CallGraph::from_edges(vec![
            edge(0, Callee::Resolved(SymbolId(2)), 5),
            edge(1, Callee::Resolved(SymbolId(2)), 9),
            edge(0, Callee::External("print".to_string()), 6),
        ]);
        assert_eq!(graph.call_site_count(SymbolId(2)), 2);
        assert_eq!(graph.callees_of(SymbolId(0)).count(), 2);
        assert_eq!(graph.callers_of(SymbolId(2)).count(), 2);
    }

    #[test]
    fn test_cycles_are_representable() {
        // a -> b -> c -> a: legal input, no special handling.
        let graph = CallGraph::from_edges(vec![
            edge(0, Callee::Resolved(SymbolId(1)), 1),
            edge(1, Callee::Resolved(SymbolId(2)), 2),
            edge(2, Callee::Resolved(SymbolId(0)), 3),
        ]);
        assert_eq!(graph.call_site_count(SymbolId(0)), 1);
        assert_eq!(graph.call_site_count(SymbolId(1)), 1);
        assert_eq!(graph.call_site_count(SymbolId(2)), 1);
    }

    #[test]
    fn test_dynamic_edges_surface() {
        let graph = CallGraph::from_edges(vec![edge(
            0,
            Callee::Dynamic("importlib.import_module".to_string()),
            4,
        )]);
        assert_eq!(graph.dynamic_edges().count(), 1);
    }
}
