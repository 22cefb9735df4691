//! Graph-edge merge semantics.

use crate::rows::GraphEdge;

/// Merge `incoming` edges into `existing`.
///
/// An incoming edge replaces an existing one with the same
/// `(target, relation)` pair; otherwise it is appended. Existing edges are
/// never dropped.
pub fn merge_graph_edges(existing: Vec<GraphEdge>, incoming: Vec<GraphEdge>) -> Vec<GraphEdge> {
    let mut merged = existing;
    for edge in incoming {
        match merged
            .iter_mut()
            .find(|e| e.target == edge.target && e.relation == edge.relation)
        {
            Some(slot) => *slot = edge,
            None => merged.push(edge),
        }
    }
    merged
}
