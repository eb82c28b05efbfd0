//! Model-affinity node selection.
//!
//! This is the only built-in strategy and the default behind
//! [`Cluster::select_node`](super::Cluster::select_node). A cluster that wants
//! least-loaded or round-robin placement overrides `select_node` instead.

use super::NodeSnapshot;

/// Choose a node for `model`.
///
/// Among healthy nodes, prefer those that already have the model loaded and
/// take the one with the fewest requests in flight. If none has it, take the
/// one with the most free memory, since it will have to load the model. With
/// no model requested, the least busy healthy node wins. Ties go to the node
/// listed first.
pub fn select_by_affinity<'a>(
    nodes: &'a [NodeSnapshot],
    model: Option<&str>,
) -> Option<&'a NodeSnapshot> {
    let healthy = || nodes.iter().filter(|n| n.is_healthy());

    let Some(model) = model else {
        return healthy().min_by_key(|n| n.in_flight);
    };

    healthy()
        .filter(|n| n.has_model(model))
        .min_by_key(|n| n.in_flight)
        .or_else(|| healthy().min_by(|a, b| b.available_memory.total_cmp(&a.available_memory)))
}
