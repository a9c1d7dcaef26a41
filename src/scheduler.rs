// src/scheduler.rs
//
// §4.G Topological scheduler: Kahn's algorithm over a subgraph restricted to
// given nodes and forward edges. Ties are broken by insertion order of ready
// detection (stable FIFO) per spec, which is why this is hand-rolled over
// plain adjacency lists rather than `petgraph::algo::toposort` — petgraph's
// DFS-based toposort does not give that guarantee. Reachability queries
// elsewhere in the loop executors, where only set membership matters and not
// order, do use petgraph (see `loops::reachable_from`).

use std::collections::{BTreeSet, HashMap, VecDeque};

/// A minimal edge view: just the two endpoints, already filtered to forward
/// edges and to the node subset under consideration.
pub struct SchedEdge<'a> {
    pub source: &'a str,
    pub target: &'a str,
}

/// Returns the scheduled order. If the subgraph contains a cycle the
/// returned order simply omits the cyclic component (§4.G: "the scheduler
/// does not fail loudly" — the validator is the defense against cycles).
pub fn topological_order<'a>(nodes: &[&'a str], edges: &[SchedEdge<'a>]) -> Vec<&'a str> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let known: BTreeSet<&str> = nodes.iter().copied().collect();

    for edge in edges {
        if !known.contains(edge.source) || !known.contains(edge.target) {
            continue;
        }
        adjacency.entry(edge.source).or_default().push(edge.target);
        *indegree.entry(edge.target).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = VecDeque::new();
    for n in nodes {
        if indegree.get(n).copied().unwrap_or(0) == 0 {
            queue.push_back(n);
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        if let Some(targets) = adjacency.get(current) {
            for target in targets {
                let entry = indegree.get_mut(target).expect("indegree tracked for every node");
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_orders_source_before_target() {
        let nodes = vec!["a", "b"];
        let edges = vec![SchedEdge { source: "a", target: "b" }];
        assert_eq!(topological_order(&nodes, &edges), vec!["a", "b"]);
    }

    #[test]
    fn equal_readiness_preserves_input_order() {
        let nodes = vec!["x", "y", "z"];
        let edges = vec![];
        assert_eq!(topological_order(&nodes, &edges), vec!["x", "y", "z"]);
    }

    #[test]
    fn cycle_is_silently_omitted() {
        let nodes = vec!["a", "b"];
        let edges = vec![
            SchedEdge { source: "a", target: "b" },
            SchedEdge { source: "b", target: "a" },
        ];
        assert!(topological_order(&nodes, &edges).is_empty());
    }

    #[test]
    fn diamond_respects_all_forward_edges() {
        let nodes = vec!["a", "b", "c", "d"];
        let edges = vec![
            SchedEdge { source: "a", target: "b" },
            SchedEdge { source: "a", target: "c" },
            SchedEdge { source: "b", target: "d" },
            SchedEdge { source: "c", target: "d" },
        ];
        let order = topological_order(&nodes, &edges);
        let pos = |id: &str| order.iter().position(|n| *n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }
}
