// src/events.rs
//
// §4.J Event sink contract. The driver and the loop executors depend only
// on the `EventSink` trait, never on a concrete transport — the same
// decoupling the teacher draws between its driver code and `Transport`.

use crate::model::Value;
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One entry of `profiler_summary.node_timings`.
#[derive(Debug, Clone)]
pub struct NodeTiming {
    pub node_type: String,
    pub duration_ms: f64,
}

/// Every event the driver/loop executors can emit, matching the §4.J table
/// field-for-field.
#[derive(Debug, Clone)]
pub enum Event {
    Start {
        total_nodes: usize,
    },
    NodeStart {
        node_id: String,
        node_label: String,
    },
    NodeComplete {
        node_id: String,
        outputs: Json,
        duration_ms: f64,
    },
    NodeError {
        node_id: String,
        error: String,
        stack_trace: String,
        duration_ms: f64,
    },
    Log {
        level: LogLevel,
        node_id: String,
        node_type: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Breakpoint {
        node_id: String,
        node_type: String,
        inputs: Json,
    },
    ProfilerSummary {
        total_ms: f64,
        node_timings: BTreeMap<String, NodeTiming>,
        slowest_node: Option<String>,
    },
    Complete {
        total_ms: f64,
    },
}

/// Opaque callback surface: the driver only ever calls `emit`. Concrete
/// transports (stdout, a WebSocket fan-out) are out-of-scope collaborators
/// per §1.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// The default sink when a caller doesn't want events.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: Event) {}
}

/// A line-oriented sink for the CLI: one compact line per event.
pub struct StdoutSink;

#[async_trait]
impl EventSink for StdoutSink {
    async fn emit(&self, event: Event) {
        match event {
            Event::Start { total_nodes } => println!("start total_nodes={total_nodes}"),
            Event::NodeStart { node_id, node_label } => {
                println!("node_start {node_id} ({node_label})")
            }
            Event::NodeComplete {
                node_id,
                duration_ms,
                ..
            } => println!("node_complete {node_id} {duration_ms:.2}ms"),
            Event::NodeError {
                node_id, error, ..
            } => println!("node_error {node_id}: {error}"),
            Event::Log {
                level,
                node_id,
                message,
                ..
            } => println!("[{}] {node_id}: {message}", level.as_str()),
            Event::Breakpoint { node_id, .. } => println!("breakpoint {node_id}"),
            Event::ProfilerSummary {
                total_ms,
                slowest_node,
                ..
            } => println!(
                "profiler_summary total_ms={total_ms:.2} slowest={:?}",
                slowest_node
            ),
            Event::Complete { total_ms } => println!("complete total_ms={total_ms:.2}"),
        }
    }
}

/// Sequences at or under this length pass through verbatim (§6); longer
/// ones are replaced by the summarized shape below.
const PASSTHROUGH_LEN: usize = 8;
const SAMPLE_K: usize = 3;

fn float_to_json(f: f64) -> Json {
    if f.is_nan() {
        json!("nan")
    } else if f.is_infinite() {
        json!(if f > 0.0 { "inf" } else { "-inf" })
    } else {
        json!(f)
    }
}

fn stats(values: &[f64]) -> (Json, Json, Json) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (Json::Null, Json::Null, Json::Null);
    }
    let min = finite.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    (float_to_json(min), float_to_json(max), float_to_json(mean))
}

fn sample(values: &[Json], k: usize, from_end: bool) -> Vec<Json> {
    if values.len() <= k {
        return values.to_vec();
    }
    if from_end {
        values[values.len() - k..].to_vec()
    } else {
        values[..k].to_vec()
    }
}

fn summarize_numeric(type_tag: &str, dtype: &str, floats: &[f64]) -> Json {
    let as_json: Vec<Json> = floats.iter().map(|f| float_to_json(*f)).collect();
    let (min, max, mean) = stats(floats);
    json!({
        "type_tag": type_tag,
        "shape_or_length": floats.len(),
        "dtype": dtype,
        "sample_first_k": sample(&as_json, SAMPLE_K, false),
        "sample_last_k": sample(&as_json, SAMPLE_K, true),
        "min": min,
        "max": max,
        "mean": mean,
    })
}

/// §6 summarization contract. Scalars and short sequences pass through
/// unchanged; large payloads are replaced with the bounded summary shape.
/// Non-finite floats become the strings `"nan"`/`"inf"`/`"-inf"`.
pub fn summarize(value: &Value) -> Json {
    match value {
        Value::Int(i) => json!(i),
        Value::Float(f) => float_to_json(*f),
        Value::Str(s) => json!(s),
        Value::IntArray(v) if v.len() <= PASSTHROUGH_LEN => json!(v),
        Value::IntArray(v) => {
            let floats: Vec<f64> = v.iter().map(|x| *x as f64).collect();
            summarize_numeric("array-of-int", "int", &floats)
        }
        Value::FloatArray(v) if v.len() <= PASSTHROUGH_LEN => {
            Json::Array(v.iter().map(|f| float_to_json(*f)).collect())
        }
        Value::FloatArray(v) => summarize_numeric("array-of-float", "float", v),
        Value::Sequence(v) if v.len() <= PASSTHROUGH_LEN => {
            Json::Array(v.iter().map(summarize).collect())
        }
        Value::Sequence(v) => json!({
            "type_tag": "sequence",
            "shape_or_length": v.len(),
            "dtype": "mixed",
            "sample_first_k": v.iter().take(SAMPLE_K).map(summarize).collect::<Vec<_>>(),
            "sample_last_k": v.iter().rev().take(SAMPLE_K).map(summarize).collect::<Vec<_>>(),
            "min": Json::Null,
            "max": Json::Null,
            "mean": Json::Null,
        }),
        Value::Opaque(j) => j.clone(),
    }
}

pub fn summarize_outputs(outputs: &BTreeMap<String, Value>) -> Json {
    Json::Object(
        outputs
            .iter()
            .map(|(k, v)| (k.clone(), summarize(v)))
            .collect(),
    )
}
