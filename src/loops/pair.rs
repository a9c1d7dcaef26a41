// src/loops/pair.rs
//
// §4.H H2: start/end-pair loop (`loop_start` / `loop_end`, matched by a
// shared `pair_id` param). The body is every node reachable from the start
// node up to (and including) the end node on forward edges.

use super::{clamp_iterations, reachable_bounded, LoopOutcome};
use crate::error::ExecutionError;
use crate::events::EventSink;
use crate::exec_call;
use crate::fanin::{self, EdgeRef};
use crate::model::{Node, PortValues, Workflow};
use crate::registry::RegistrySnapshot;
use crate::scheduler::{self, SchedEdge};
use crate::structural;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

fn pair_id_of(node: &Node) -> Option<&str> {
    match node.params.get("pair_id") {
        Some(crate::model::Value::Str(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn find_end_for(workflow: &Workflow, start: &Node) -> Option<&Node> {
    let pid = pair_id_of(start)?;
    workflow
        .nodes
        .iter()
        .find(|n| n.node_type == structural::LOOP_END_TYPE && pair_id_of(n) == Some(pid))
}

/// Both halves of the pair are structural rename nodes, not registry
/// executors (§4.H: "publish the start's inputs at ports in_k as outputs on
/// ports out_k"; the end node mirrors this so its `out_k` can be mapped back
/// into the start's next `in_k` slots). A port not named `in_N` passes
/// through unchanged.
fn republish_in_to_out(values: &PortValues) -> PortValues {
    values
        .iter()
        .map(|(k, v)| {
            let renamed = k
                .strip_prefix("in_")
                .map(|n| format!("out_{n}"))
                .unwrap_or_else(|| k.clone());
            (renamed, v.clone())
        })
        .collect()
}

fn republish_out_to_in(values: &PortValues) -> PortValues {
    values
        .iter()
        .map(|(k, v)| {
            let renamed = k
                .strip_prefix("out_")
                .map(|n| format!("in_{n}"))
                .unwrap_or_else(|| k.clone());
            (renamed, v.clone())
        })
        .collect()
}

/// Runs the whole start/end pair. Called once, from the `loop_start` node's
/// dispatch slot; the matching `loop_end` id is added to `consumed_ids` so
/// the driver's main walk does not also try to execute it standalone.
pub async fn execute(
    workflow: &Workflow,
    registry: &RegistrySnapshot,
    sink: &Arc<dyn EventSink>,
    outputs: &mut BTreeMap<String, PortValues>,
    start_node: &Node,
) -> Result<LoopOutcome, ExecutionError> {
    let run_start = Instant::now();

    let Some(end_node) = find_end_for(workflow, start_node) else {
        return Err(ExecutionError::UnpairedLoop {
            node_id: start_node.id.clone(),
        });
    };

    let iterations = clamp_iterations(start_node.params.get("iterations"));

    let mut body_ids = reachable_bounded(workflow, &start_node.id, &end_node.id);
    body_ids.insert(end_node.id.clone());
    let body_nodes: Vec<&Node> = workflow
        .nodes
        .iter()
        .filter(|n| body_ids.contains(&n.id))
        .collect();

    let body_edges: Vec<&crate::model::Edge> = workflow
        .forward_edges()
        .filter(|e| body_ids.contains(&e.source) || e.source == start_node.id)
        .filter(|e| body_ids.contains(&e.target))
        .collect();

    let mut topo_ids: Vec<&str> = std::iter::once(start_node.id.as_str())
        .chain(body_nodes.iter().map(|n| n.id.as_str()))
        .collect();
    topo_ids.dedup();
    let topo_edges: Vec<SchedEdge> = body_edges
        .iter()
        .map(|e| SchedEdge {
            source: &e.source,
            target: &e.target,
        })
        .collect();
    let order = scheduler::topological_order(&topo_ids, &topo_edges);

    let mut slots: PortValues = fanin::collect_inputs(workflow, &start_node.id, outputs);

    let mut last_iteration_outputs: BTreeMap<String, PortValues> = BTreeMap::new();

    for _ in 0..iterations {
        let mut iter_outputs: BTreeMap<String, PortValues> = BTreeMap::new();
        iter_outputs.insert(start_node.id.clone(), republish_in_to_out(&slots));

        for node_id in &order {
            if *node_id == start_node.id {
                continue;
            }
            let edge_refs = body_edges.iter().map(|e| EdgeRef {
                source: &e.source,
                source_port: &e.source_port,
                target: &e.target,
                target_port: &e.target_port,
            });
            let inputs = fanin::collect_inputs_over(edge_refs, node_id, &iter_outputs);

            if *node_id == end_node.id {
                iter_outputs.insert((*node_id).to_string(), republish_in_to_out(&inputs));
                continue;
            }

            let node = body_nodes
                .iter()
                .find(|n| n.id == *node_id)
                .expect("body node in topo order");
            let (node_outputs, _duration) =
                exec_call::invoke(registry, sink, node, inputs).await?;
            iter_outputs.insert((*node_id).to_string(), node_outputs);
        }

        let end_outputs = iter_outputs.get(&end_node.id).cloned().unwrap_or_default();
        slots = republish_out_to_in(&end_outputs);
        last_iteration_outputs = iter_outputs;
    }

    // §4.H: downstream consumers outside the loop may read any body node's
    // output, not just the end node's — so the final iteration's full output
    // set is written back to the real outputs table.
    for (node_id, node_outputs) in &last_iteration_outputs {
        if node_id != &start_node.id {
            outputs.insert(node_id.clone(), node_outputs.clone());
        }
    }

    // Body nodes (including the end) are not parented to the start the way
    // H1's container children are, so they remain in the top-level walk.
    // The driver must mark all of them executed here or it would re-run
    // them standalone right after this call returns (§4.H, §4.I step 5e).
    Ok(LoopOutcome {
        outputs: slots,
        duration_ms: run_start.elapsed().as_secs_f64() * 1000.0,
        consumed_ids: body_ids.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn node(id: &str, ty: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: ty.to_string(),
            position: Default::default(),
            params: Default::default(),
            parent_id: None,
            muted: false,
        }
    }

    #[test]
    fn pair_id_reads_string_param() {
        let mut n = node("start", structural::LOOP_START_TYPE);
        n.params
            .insert("pair_id".to_string(), Value::Str("x".to_string()));
        assert_eq!(pair_id_of(&n), Some("x"));
    }

    #[test]
    fn unpaired_start_has_no_match() {
        let mut start = node("start", structural::LOOP_START_TYPE);
        start
            .params
            .insert("pair_id".to_string(), Value::Str("orphan".to_string()));
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![start.clone()],
            edges: vec![],
        };
        assert!(find_end_for(&wf, &start).is_none());
    }
}
