// src/loops/container.rs
//
// §4.H H1: container loop (parent/child embedding, `loop_group`).

use super::{clamp_iterations, LoopOutcome};
use crate::error::ExecutionError;
use crate::events::EventSink;
use crate::exec_call;
use crate::fanin::{self, EdgeRef};
use crate::model::{Node, PortValues, Workflow};
use crate::registry::RegistrySnapshot;
use crate::scheduler::{self, SchedEdge};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Id used for the virtual producer whose per-iteration outputs are the
/// current slot map, spliced in wherever an internal edge originates at the
/// group itself (§4.H: "synthesize a virtual 'loop input' producer").
const VIRTUAL_PRODUCER_ID: &str = "__loop_in__";

pub async fn execute(
    workflow: &Workflow,
    registry: &RegistrySnapshot,
    sink: &Arc<dyn EventSink>,
    outputs: &mut BTreeMap<String, PortValues>,
    group: &Node,
) -> Result<LoopOutcome, ExecutionError> {
    let start = Instant::now();
    let iterations = clamp_iterations(group.params.get("iterations"));

    let children: Vec<&Node> = workflow.children_of(&group.id).collect();
    let children_ids: HashSet<&str> = children.iter().map(|n| n.id.as_str()).collect();

    let mut slots: PortValues = fanin::collect_inputs(workflow, &group.id, outputs);

    if children.is_empty() {
        // §8 boundary: a container loop with zero children is a pass-through.
        return Ok(LoopOutcome {
            outputs: slots,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            consumed_ids: vec![],
        });
    }

    // Internal edges: group -> child (rewritten to the virtual producer) and
    // child -> child. Both endpoints must be inside the group (or be the
    // group itself as a producer) for an edge to count as internal.
    struct InternalEdge {
        source: String,
        source_port: String,
        target: String,
        target_port: String,
    }
    let internal_edges: Vec<InternalEdge> = workflow
        .forward_edges()
        .filter_map(|e| {
            let source_in_group = e.source == group.id;
            let source_is_child = children_ids.contains(e.source.as_str());
            let target_is_child = children_ids.contains(e.target.as_str());
            if !target_is_child {
                return None;
            }
            if source_in_group {
                Some(InternalEdge {
                    source: VIRTUAL_PRODUCER_ID.to_string(),
                    source_port: e.source_port.clone(),
                    target: e.target.clone(),
                    target_port: e.target_port.clone(),
                })
            } else if source_is_child {
                Some(InternalEdge {
                    source: e.source.clone(),
                    source_port: e.source_port.clone(),
                    target: e.target.clone(),
                    target_port: e.target_port.clone(),
                })
            } else {
                None
            }
        })
        .collect();

    // Maps a child's own input-port name to the group's slot name, built from
    // the entry edges (group -> child) before they were rewritten to the
    // virtual producer above. Harvesting the exit child's outputs needs this
    // indirection whenever the slot name and the child's port name differ
    // (e.g. slot `slot_1` feeding a node's `array` port).
    let feedback_map: BTreeMap<String, String> = internal_edges
        .iter()
        .filter(|e| e.source == VIRTUAL_PRODUCER_ID)
        .map(|e| (e.target_port.clone(), e.source_port.clone()))
        .collect();

    // The exit child has no outgoing internal edge to another child. Ties
    // are broken by smallest id (§9: the reference picks non-deterministically;
    // this implementation picks deterministically for reproducibility).
    let outgoing_child_ids: HashSet<&str> = internal_edges
        .iter()
        .filter(|e| children_ids.contains(e.source.as_str()))
        .map(|e| e.source.as_str())
        .collect();
    let mut exit_candidates: Vec<&str> = children_ids
        .iter()
        .copied()
        .filter(|id| !outgoing_child_ids.contains(id))
        .collect();
    exit_candidates.sort_unstable();
    let exit_child_id = exit_candidates
        .first()
        .copied()
        .unwrap_or_else(|| children[0].id.as_str())
        .to_string();

    let topo_node_ids: Vec<&str> = std::iter::once(VIRTUAL_PRODUCER_ID)
        .chain(children_ids.iter().copied())
        .collect();
    let topo_edges: Vec<SchedEdge> = internal_edges
        .iter()
        .map(|e| SchedEdge {
            source: &e.source,
            target: &e.target,
        })
        .collect();
    let order = scheduler::topological_order(&topo_node_ids, &topo_edges);

    for _ in 0..iterations {
        let mut iter_outputs: BTreeMap<String, PortValues> = BTreeMap::new();
        iter_outputs.insert(VIRTUAL_PRODUCER_ID.to_string(), slots.clone());

        for node_id in &order {
            if *node_id == VIRTUAL_PRODUCER_ID {
                continue;
            }
            let child = children.iter().find(|c| c.id == *node_id).expect("child in order");
            let edge_refs = internal_edges.iter().map(|e| EdgeRef {
                source: &e.source,
                source_port: &e.source_port,
                target: &e.target,
                target_port: &e.target_port,
            });
            let inputs = fanin::collect_inputs_over(edge_refs, node_id, &iter_outputs);
            let (child_outputs, _duration) =
                exec_call::invoke(registry, sink, child, inputs).await?;
            iter_outputs.insert((*node_id).to_string(), child_outputs);
        }

        let exit_outputs = iter_outputs.get(&exit_child_id).cloned().unwrap_or_default();
        for (child_port, slot_name) in &feedback_map {
            if let Some(value) = exit_outputs.get(child_port) {
                slots.insert(slot_name.clone(), value.clone());
            }
        }
    }

    Ok(LoopOutcome {
        outputs: slots,
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        consumed_ids: vec![],
    })
}
