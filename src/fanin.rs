// src/fanin.rs
//
// §4.F Input fan-in: collect upstream outputs onto a node's input ports.

use crate::model::{PortValues, Value, Workflow};
use std::collections::BTreeMap;

/// A minimal view of an edge's endpoints, used so the loop executors (§4.H)
/// can reuse this same accumulation logic over their own rewritten/filtered
/// edge lists instead of the whole workflow.
pub struct EdgeRef<'a> {
    pub source: &'a str,
    pub source_port: &'a str,
    pub target: &'a str,
    pub target_port: &'a str,
}

/// `outputs` is the node-outputs table (§3): node id -> its output-port map.
/// Only forward edges (`is_back_edge == false`) targeting `node_id`
/// contribute; callers that want loop feedback apply it separately (the
/// loop executors read back-edges themselves, §4.H).
pub fn collect_inputs(
    workflow: &Workflow,
    node_id: &str,
    outputs: &BTreeMap<String, PortValues>,
) -> PortValues {
    let edges = workflow.forward_edges().map(|e| EdgeRef {
        source: &e.source,
        source_port: &e.source_port,
        target: &e.target,
        target_port: &e.target_port,
    });
    collect_inputs_over(edges, node_id, outputs)
}

/// Same accumulation rule as `collect_inputs`, but over an arbitrary edge
/// list (a loop dialect's internal/rewritten edges) rather than the whole
/// workflow's forward edges.
pub fn collect_inputs_over<'a>(
    edges: impl Iterator<Item = EdgeRef<'a>>,
    node_id: &str,
    outputs: &BTreeMap<String, PortValues>,
) -> PortValues {
    let mut accumulated: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for edge in edges.filter(|e| e.target == node_id) {
        let Some(source_outputs) = outputs.get(edge.source) else {
            continue;
        };
        let Some(value) = source_outputs.get(edge.source_port) else {
            continue;
        };
        accumulated
            .entry(edge.target_port.to_string())
            .or_default()
            .push(value.clone());
    }

    accumulated
        .into_iter()
        .filter_map(|(port, values)| Value::stack(values).map(|v| (port, v)))
        .collect()
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

    fn edge(id: &str, source: &str, source_port: &str, target: &str, target_port: &str) -> Edge {
        Edge {
            id: id.to_string(),
            source: source.to_string(),
            source_port: source_port.to_string(),
            target: target.to_string(),
            target_port: target_port.to_string(),
            is_back_edge: false,
        }
    }

    #[test]
    fn single_contribution_is_unwrapped() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a"), node("b")],
            edges: vec![edge("e1", "a", "out", "b", "in")],
        };
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), {
            let mut m = BTreeMap::new();
            m.insert("out".to_string(), Value::Int(5));
            m
        });
        let inputs = collect_inputs(&wf, "b", &outputs);
        assert_eq!(inputs.get("in"), Some(&Value::Int(5)));
    }

    #[test]
    fn two_contributions_stack_in_edge_order() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a"), node("b"), node("s")],
            edges: vec![
                edge("e1", "a", "out", "s", "items"),
                edge("e2", "b", "out", "s", "items"),
            ],
        };
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), {
            let mut m = BTreeMap::new();
            m.insert("out".to_string(), Value::IntArray(vec![1, 2, 3]));
            m
        });
        outputs.insert("b".to_string(), {
            let mut m = BTreeMap::new();
            m.insert("out".to_string(), Value::IntArray(vec![4, 5, 6]));
            m
        });
        let inputs = collect_inputs(&wf, "s", &outputs);
        match inputs.get("items").unwrap() {
            Value::Sequence(v) => assert_eq!(v.len(), 2),
            other => panic!("expected stacked sequence, got {other:?}"),
        }
    }

    #[test]
    fn back_edges_are_excluded() {
        let mut e = edge("e1", "a", "out", "b", "in");
        e.is_back_edge = true;
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a"), node("b")],
            edges: vec![e],
        };
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), {
            let mut m = BTreeMap::new();
            m.insert("out".to_string(), Value::Int(1));
            m
        });
        let inputs = collect_inputs(&wf, "b", &outputs);
        assert!(inputs.is_empty());
    }
}
