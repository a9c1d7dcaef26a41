// src/loops/mod.rs
//
// §4.H Loop executors. Shared iteration-bound clamping and reachability
// helpers live here; each dialect gets its own submodule.
//
// Reachability uses `petgraph` (building the forward-edge subgraph and
// walking it with `petgraph::visit::Bfs`) since only set membership matters
// here, not order — unlike the top-level scheduler (§4.G), which needs a
// specific stable tie-break and is hand-rolled for that reason
// (`scheduler::topological_order`).

pub mod backedge;
pub mod container;
pub mod pair;

use crate::model::{Value, Workflow};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

pub const MAX_ITERATIONS: i64 = 10_000;

/// §4.H / §5: iteration counters are clamped to `[1, MAX_ITERATIONS]`, never
/// rejected. Missing or non-numeric `iterations` params default to 1.
pub fn clamp_iterations(raw: Option<&Value>) -> i64 {
    let n = match raw {
        Some(Value::Int(i)) => *i,
        Some(Value::Float(f)) => *f as i64,
        _ => 1,
    };
    n.clamp(1, MAX_ITERATIONS)
}

/// The outcome of running one loop to completion: the values to record as
/// the dispatch node's own outputs, the whole-loop wall time to report as
/// its duration, and the ids of any other top-level nodes this loop already
/// executed (so the driver's main walk skips them).
pub struct LoopOutcome {
    pub outputs: crate::model::PortValues,
    pub duration_ms: f64,
    pub consumed_ids: Vec<String>,
}

fn build_forward_graph<'a>(
    workflow: &'a Workflow,
) -> (DiGraph<&'a str, ()>, HashMap<&'a str, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut idx_of = HashMap::new();
    for n in &workflow.nodes {
        let idx = graph.add_node(n.id.as_str());
        idx_of.insert(n.id.as_str(), idx);
    }
    for e in workflow.forward_edges() {
        if let (Some(&s), Some(&t)) = (idx_of.get(e.source.as_str()), idx_of.get(e.target.as_str()))
        {
            graph.add_edge(s, t, ());
        }
    }
    (graph, idx_of)
}

/// H2: nodes reachable from `start_id` on forward edges, not expanding past
/// `end_id` (the end node is included in the result; §9 notes this does not
/// verify the end is actually reachable from the start).
pub fn reachable_bounded(workflow: &Workflow, start_id: &str, end_id: &str) -> HashSet<String> {
    let (graph, idx_of) = build_forward_graph(workflow);
    let mut body = HashSet::new();
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(start_id);
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(start_id);

    while let Some(current) = queue.pop_front() {
        if current == end_id {
            continue;
        }
        if let Some(&idx) = idx_of.get(current) {
            for neighbor in graph.neighbors(idx) {
                let nid = graph[neighbor];
                if seen.insert(nid) {
                    body.insert(nid.to_string());
                    queue.push_back(nid);
                }
            }
        }
    }
    body
}

/// H3: every node reachable from `origin_id` on forward edges, unbounded.
pub fn reachable_from(workflow: &Workflow, origin_id: &str) -> HashSet<String> {
    let (graph, idx_of) = build_forward_graph(workflow);
    let mut visited = HashSet::new();
    if let Some(&start_idx) = idx_of.get(origin_id) {
        let mut bfs = petgraph::visit::Bfs::new(&graph, start_idx);
        while let Some(nx) = bfs.next(&graph) {
            let id = graph[nx];
            if id != origin_id {
                visited.insert(id.to_string());
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: "t".to_string(),
            position: Default::default(),
            params: Default::default(),
            parent_id: None,
            muted: false,
        }
    }

    fn fwd(source: &str, target: &str) -> Edge {
        Edge {
            id: format!("{source}-{target}"),
            source: source.to_string(),
            source_port: "o".to_string(),
            target: target.to_string(),
            target_port: "i".to_string(),
            is_back_edge: false,
        }
    }

    #[test]
    fn iterations_clamp_to_bounds() {
        assert_eq!(clamp_iterations(Some(&Value::Int(0))), 1);
        assert_eq!(clamp_iterations(Some(&Value::Int(-5))), 1);
        assert_eq!(clamp_iterations(Some(&Value::Int(20_000))), MAX_ITERATIONS);
        assert_eq!(clamp_iterations(Some(&Value::Int(42))), 42);
        assert_eq!(clamp_iterations(None), 1);
    }

    #[test]
    fn bounded_reachability_stops_at_end() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("s"), node("a"), node("end"), node("past")],
            edges: vec![fwd("s", "a"), fwd("a", "end"), fwd("end", "past")],
        };
        let body = reachable_bounded(&wf, "s", "end");
        assert!(body.contains("a"));
        assert!(body.contains("end"));
        assert!(!body.contains("past"));
        assert!(!body.contains("s"));
    }

    #[test]
    fn unbounded_reachability_excludes_origin() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("loop"), node("a"), node("b")],
            edges: vec![fwd("loop", "a"), fwd("a", "b")],
        };
        let chain = reachable_from(&wf, "loop");
        assert!(chain.contains("a"));
        assert!(chain.contains("b"));
        assert!(!chain.contains("loop"));
    }
}
