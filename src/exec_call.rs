// src/exec_call.rs
//
// Shared "invoke one registered executor" primitive used both by the
// top-level driver (§4.I) and by the three loop executors (§4.H) for their
// child/body/chain nodes. Establishes the scoped logger context (§5) around
// the call and turns any buffered log records into `log` events. Does NOT
// emit `node_start`/`node_complete`/`node_error` — those are the caller's
// responsibility, since loop-internal nodes are not individually reported
// (§4.H: "the whole loop is reported as the loop node's own duration").

use crate::error::ExecutionError;
use crate::events::{Event, EventSink};
use crate::logging;
use crate::model::{Node, PortValues};
use crate::registry::RegistrySnapshot;
use std::sync::Arc;
use std::time::Instant;

pub async fn invoke(
    registry: &RegistrySnapshot,
    sink: &Arc<dyn EventSink>,
    node: &Node,
    inputs: PortValues,
) -> Result<(PortValues, f64), ExecutionError> {
    let Some(executor) = registry.executor(&node.node_type).cloned() else {
        return Err(ExecutionError::NodeUnavailable {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            reason: "inactive or not installed".to_string(),
        });
    };

    let start = Instant::now();
    let (guard, buffer) = logging::enter(node.id.clone(), node.node_type.clone());
    let result = executor.call(&node.params, &inputs);
    drop(guard);
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let records: Vec<_> = {
        let mut buf = buffer.lock().expect("log buffer poisoned");
        buf.drain(..).collect()
    };
    for record in records {
        sink.emit(Event::Log {
            level: record.level,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            message: record.message,
            timestamp: record.timestamp,
        })
        .await;
    }

    result
        .map(|outputs| (outputs, duration_ms))
        .map_err(|err| ExecutionError::ExecutorFailed {
            node_id: node.id.clone(),
            message: err.to_string(),
        })
}
