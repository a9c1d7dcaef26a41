// src/loops/backedge.rs
//
// §4.H H3: back-edge loop (`loop_node`, n8n-style). A single node owns a
// `done_k`/`loop_k` pair of output ports; `loop_k` feeds a chain of
// downstream nodes that eventually feeds back into `feedback_k` on the same
// node via a back-edge (`is_back_edge == true`).

use super::{clamp_iterations, reachable_from, LoopOutcome};
use crate::error::ExecutionError;
use crate::events::EventSink;
use crate::exec_call;
use crate::fanin::{self, EdgeRef};
use crate::model::{Node, PortValues, Value, Workflow};
use crate::registry::RegistrySnapshot;
use crate::scheduler::{self, SchedEdge};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// The loop node itself is never dispatched through the registry — its
/// `loop_k`/`done_k` outputs are a republish of the current per-slot values
/// under `init_k` (first iteration) / `feedback_k` (every later iteration),
/// the same rename shape as H2's start/end pair. Only the chain nodes
/// downstream of `loop_k` are real registered executors.
fn slots_from_initial(initial: &PortValues) -> BTreeMap<String, Value> {
    initial
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("init_").map(|slot| (slot.to_string(), v.clone())))
        .collect()
}

fn publish(slots: &BTreeMap<String, Value>) -> PortValues {
    let mut out = PortValues::new();
    for (slot, value) in slots {
        out.insert(format!("loop_{slot}"), value.clone());
        out.insert(format!("done_{slot}"), value.clone());
    }
    out
}

pub async fn execute(
    workflow: &Workflow,
    registry: &RegistrySnapshot,
    sink: &Arc<dyn EventSink>,
    outputs: &mut BTreeMap<String, PortValues>,
    loop_node: &Node,
) -> Result<LoopOutcome, ExecutionError> {
    let run_start = Instant::now();
    let iterations = clamp_iterations(loop_node.params.get("iterations"));

    // The feedback chain: nodes reachable from the loop node's own `loop_*`
    // ports, stopping naturally once the back-edge returns to this node
    // (the back-edge itself is excluded from `reachable_from`'s forward walk).
    let chain_ids = reachable_from(workflow, &loop_node.id);
    let chain_nodes: Vec<&Node> = workflow
        .nodes
        .iter()
        .filter(|n| chain_ids.contains(&n.id))
        .collect();

    let forward_chain_edges: Vec<&crate::model::Edge> = workflow
        .forward_edges()
        .filter(|e| e.source == loop_node.id || chain_ids.contains(&e.source))
        .filter(|e| chain_ids.contains(&e.target))
        .collect();

    let back_edges_in: Vec<&crate::model::Edge> = workflow
        .back_edges()
        .filter(|e| e.target == loop_node.id)
        .collect();

    let mut topo_ids: Vec<&str> = std::iter::once(loop_node.id.as_str())
        .chain(chain_nodes.iter().map(|n| n.id.as_str()))
        .collect();
    topo_ids.dedup();
    let topo_edges: Vec<SchedEdge> = forward_chain_edges
        .iter()
        .map(|e| SchedEdge {
            source: &e.source,
            target: &e.target,
        })
        .collect();
    let order = scheduler::topological_order(&topo_ids, &topo_edges);

    let initial = fanin::collect_inputs(workflow, &loop_node.id, outputs);
    let mut slots: BTreeMap<String, Value> = slots_from_initial(&initial);
    let mut last_chain_outputs: BTreeMap<String, PortValues> = BTreeMap::new();

    for _ in 0..iterations {
        let mut iter_outputs: BTreeMap<String, PortValues> = BTreeMap::new();
        iter_outputs.insert(loop_node.id.clone(), publish(&slots));

        for node_id in &order {
            if *node_id == loop_node.id {
                continue;
            }
            let node = chain_nodes
                .iter()
                .find(|n| n.id == *node_id)
                .expect("chain node in topo order");
            let edge_refs = forward_chain_edges.iter().map(|e| EdgeRef {
                source: &e.source,
                source_port: &e.source_port,
                target: &e.target,
                target_port: &e.target_port,
            });
            let inputs = fanin::collect_inputs_over(edge_refs, node_id, &iter_outputs);
            let (node_outputs, _duration) =
                exec_call::invoke(registry, sink, node, inputs).await?;
            iter_outputs.insert((*node_id).to_string(), node_outputs);
        }

        // Close the loop: read the back-edges into the loop node's
        // `feedback_*` slots from whichever chain node produced them.
        for edge in &back_edges_in {
            let Some(slot) = edge.target_port.strip_prefix("feedback_") else {
                continue;
            };
            if let Some(source_outputs) = iter_outputs.get(&edge.source) {
                if let Some(value) = source_outputs.get(&edge.source_port) {
                    slots.insert(slot.to_string(), value.clone());
                }
            }
        }
        last_chain_outputs = iter_outputs;
    }

    for (node_id, node_outputs) in &last_chain_outputs {
        if node_id != &loop_node.id {
            outputs.insert(node_id.clone(), node_outputs.clone());
        }
    }

    Ok(LoopOutcome {
        outputs: publish(&slots),
        duration_ms: run_start.elapsed().as_secs_f64() * 1000.0,
        consumed_ids: chain_ids.into_iter().collect(),
    })
}
