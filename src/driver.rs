// src/driver.rs
//
// §4.I Main execution driver: walks the top-level subgraph in scheduled
// order, dispatching each node to either a loop dialect (§4.H) or the plain
// registry executor path, and emitting the full event sequence (§4.J).

use crate::error::ExecutionError;
use crate::events::{Event, EventSink};
use crate::exec_call;
use crate::fanin;
use crate::loops::{backedge, container, pair};
use crate::model::{PortValues, Workflow};
use crate::registry::RegistrySnapshot;
use crate::scheduler::{self, SchedEdge};
use crate::structural;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// The node-outputs table (§3) produced by a full run: every executed
/// node's id mapped to its recorded output ports.
pub type Outputs = BTreeMap<String, PortValues>;

/// Run `workflow` to completion against `registry`, reporting progress and
/// results on `sink`. Returns the final outputs table. Already-stored
/// outputs are never rolled back on failure (§4.I): a failing node's
/// upstream siblings' outputs remain in the table the caller gets back
/// via the `NodeError` event's partial state, even though the call overall
/// returns `Err`.
pub async fn execute(
    workflow: &Workflow,
    registry: &RegistrySnapshot,
    sink: &Arc<dyn EventSink>,
    breakpoints: &HashSet<String>,
) -> Result<Outputs, ExecutionError> {
    let run_start = Instant::now();

    let top_level: Vec<&crate::model::Node> = workflow.top_level_nodes().collect();
    let top_level_ids: Vec<&str> = top_level.iter().map(|n| n.id.as_str()).collect();
    let top_level_set: HashSet<&str> = top_level_ids.iter().copied().collect();

    let sched_edges: Vec<SchedEdge> = workflow
        .forward_edges()
        .filter(|e| top_level_set.contains(e.source.as_str()) && top_level_set.contains(e.target.as_str()))
        .map(|e| SchedEdge {
            source: &e.source,
            target: &e.target,
        })
        .collect();
    let order = scheduler::topological_order(&top_level_ids, &sched_edges);

    sink.emit(Event::Start {
        total_nodes: order.len(),
    })
    .await;

    let mut outputs: Outputs = BTreeMap::new();
    let mut already_executed: HashSet<String> = HashSet::new();
    let mut node_timings: BTreeMap<String, crate::events::NodeTiming> = BTreeMap::new();

    for node_id in &order {
        if already_executed.contains(*node_id) {
            continue;
        }
        let node = workflow.node(node_id).expect("scheduled node exists");

        let label = registry
            .spec(&node.node_type)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| node.node_type.clone());
        sink.emit(Event::NodeStart {
            node_id: node.id.clone(),
            node_label: label,
        })
        .await;

        let dispatch_start = Instant::now();

        // §4.I step b: computed up front for every node, even loop dialects
        // (which recompute their own fan-in internally), since both the
        // breakpoint and muted checks (steps c, d) need it before dispatch.
        let inputs = fanin::collect_inputs(workflow, &node.id, &outputs);

        if breakpoints.contains(node.id.as_str()) {
            sink.emit(Event::Breakpoint {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                inputs: crate::events::summarize_outputs(&inputs),
            })
            .await;
        }

        if node.muted {
            let duration_ms = dispatch_start.elapsed().as_secs_f64() * 1000.0;
            sink.emit(Event::NodeComplete {
                node_id: node.id.clone(),
                outputs: crate::events::summarize_outputs(&inputs),
                duration_ms,
            })
            .await;
            node_timings.insert(
                node.id.clone(),
                crate::events::NodeTiming {
                    node_type: node.node_type.clone(),
                    duration_ms,
                },
            );
            outputs.insert(node.id.clone(), inputs);
            already_executed.insert(node_id.to_string());
            continue;
        }

        let dispatch_result: Result<(PortValues, f64, Vec<String>), ExecutionError> =
            match node.node_type.as_str() {
                t if t == structural::CONTAINER_LOOP_TYPE => {
                    container::execute(workflow, registry, sink, &mut outputs, node)
                        .await
                        .map(|o| (o.outputs, o.duration_ms, o.consumed_ids))
                }
                t if t == structural::LOOP_START_TYPE => {
                    pair::execute(workflow, registry, sink, &mut outputs, node)
                        .await
                        .map(|o| (o.outputs, o.duration_ms, o.consumed_ids))
                }
                t if t == structural::LOOP_END_TYPE => {
                    // Dispatched only as part of its paired loop_start; if it
                    // shows up here unconsumed the pairing is broken.
                    Err(ExecutionError::UnpairedLoop {
                        node_id: node.id.clone(),
                    })
                }
                t if t == structural::BACKEDGE_LOOP_TYPE => {
                    backedge::execute(workflow, registry, sink, &mut outputs, node)
                        .await
                        .map(|o| (o.outputs, o.duration_ms, o.consumed_ids))
                }
                _ => exec_call::invoke(registry, sink, node, inputs)
                    .await
                    .map(|(outputs, duration_ms)| (outputs, duration_ms, vec![])),
            };

        match dispatch_result {
            Ok((node_outputs, duration_ms, consumed_ids)) => {
                sink.emit(Event::NodeComplete {
                    node_id: node.id.clone(),
                    outputs: crate::events::summarize_outputs(&node_outputs),
                    duration_ms,
                })
                .await;
                node_timings.insert(
                    node.id.clone(),
                    crate::events::NodeTiming {
                        node_type: node.node_type.clone(),
                        duration_ms,
                    },
                );
                outputs.insert(node.id.clone(), node_outputs);
                already_executed.insert(node_id.to_string());
                for id in consumed_ids {
                    already_executed.insert(id);
                }
            }
            Err(err) => {
                let duration_ms = dispatch_start.elapsed().as_secs_f64() * 1000.0;
                sink.emit(Event::NodeError {
                    node_id: node.id.clone(),
                    error: err.to_string(),
                    stack_trace: String::new(),
                    duration_ms,
                })
                .await;
                return Err(err);
            }
        }
    }

    let total_ms = run_start.elapsed().as_secs_f64() * 1000.0;
    let slowest_node = node_timings
        .iter()
        .max_by(|a, b| a.1.duration_ms.total_cmp(&b.1.duration_ms))
        .map(|(id, _)| id.clone());
    sink.emit(Event::ProfilerSummary {
        total_ms,
        node_timings,
        slowest_node,
    })
    .await;
    sink.emit(Event::Complete { total_ms }).await;

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::model::{Edge, Node, Value};
    use crate::registry::Registry;

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

    #[tokio::test]
    async fn linear_chain_produces_outputs_for_every_node() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "const"), node("b", "double")],
            edges: vec![Edge {
                id: "e1".into(),
                source: "a".into(),
                source_port: "out".into(),
                target: "b".into(),
                target_port: "in".into(),
                is_back_edge: false,
            }],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: "const".into(),
                label: "const".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![],
                outputs: vec![crate::model::PortSpec::new("out", "number")],
            },
            Some(Arc::new(|_: &crate::model::Params, _: &PortValues| {
                let mut m = PortValues::new();
                m.insert("out".to_string(), Value::Int(2));
                Ok(m)
            })),
        );
        reg.register(
            crate::model::NodeSpec {
                node_type: "double".into(),
                label: "double".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![crate::model::PortSpec::new("in", "number")],
                outputs: vec![crate::model::PortSpec::new("out", "number")],
            },
            Some(Arc::new(|_: &crate::model::Params, inputs: &PortValues| {
                let n = match inputs.get("in") {
                    Some(Value::Int(n)) => *n,
                    _ => 0,
                };
                let mut m = PortValues::new();
                m.insert("out".to_string(), Value::Int(n * 2));
                Ok(m)
            })),
        );

        let sink: Arc<dyn crate::events::EventSink> = Arc::new(NullSink);
        let outputs = execute(&wf, &reg.snapshot(), &sink, &HashSet::new()).await.unwrap();
        assert_eq!(outputs.get("a").unwrap().get("out"), Some(&Value::Int(2)));
        assert_eq!(outputs.get("b").unwrap().get("out"), Some(&Value::Int(4)));
    }

    #[tokio::test]
    async fn unavailable_node_type_fails_the_run() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "missing")],
            edges: vec![],
        };
        let reg = Registry::new();
        let sink: Arc<dyn crate::events::EventSink> = Arc::new(NullSink);
        let result = execute(&wf, &reg.snapshot(), &sink, &HashSet::new()).await;
        assert!(matches!(result, Err(ExecutionError::NodeUnavailable { .. })));
    }

    #[tokio::test]
    async fn muted_node_copies_inputs_to_outputs_without_invoking_its_executor() {
        let mut b = node("b", "missing");
        b.muted = true;
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "const"), b],
            edges: vec![Edge {
                id: "e1".into(),
                source: "a".into(),
                source_port: "out".into(),
                target: "b".into(),
                target_port: "in".into(),
                is_back_edge: false,
            }],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: "const".into(),
                label: "const".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![],
                outputs: vec![crate::model::PortSpec::new("out", "number")],
            },
            Some(Arc::new(|_: &crate::model::Params, _: &PortValues| {
                let mut m = PortValues::new();
                m.insert("out".to_string(), Value::Int(9));
                Ok(m)
            })),
        );
        // "missing" is never registered: if the driver invoked it, this
        // would fail with NodeUnavailable instead of copying through.
        let sink: Arc<dyn crate::events::EventSink> = Arc::new(NullSink);
        let outputs = execute(&wf, &reg.snapshot(), &sink, &HashSet::new()).await.unwrap();
        assert_eq!(outputs.get("b").unwrap().get("in"), Some(&Value::Int(9)));
    }

    #[tokio::test]
    async fn breakpoint_emits_event_without_pausing_execution() {
        use crate::events::Event;
        use tokio::sync::Mutex;

        struct RecordingSink(Mutex<Vec<String>>);
        #[async_trait::async_trait]
        impl EventSink for RecordingSink {
            async fn emit(&self, event: Event) {
                if let Event::Breakpoint { node_id, .. } = event {
                    self.0.lock().await.push(node_id);
                }
            }
        }

        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "const")],
            edges: vec![],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: "const".into(),
                label: "const".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![],
                outputs: vec![crate::model::PortSpec::new("out", "number")],
            },
            Some(Arc::new(|_: &crate::model::Params, _: &PortValues| {
                let mut m = PortValues::new();
                m.insert("out".to_string(), Value::Int(1));
                Ok(m)
            })),
        );
        let sink: Arc<dyn crate::events::EventSink> = Arc::new(RecordingSink(Mutex::new(vec![])));
        let mut breakpoints = HashSet::new();
        breakpoints.insert("a".to_string());
        let outputs = execute(&wf, &reg.snapshot(), &sink, &breakpoints).await.unwrap();
        assert_eq!(outputs.get("a").unwrap().get("out"), Some(&Value::Int(1)));
    }
}
