// src/model.rs
//
// Pure data: the workflow graph (nodes, edges) and the node-spec/port-spec
// records that describe a registry entry. Nothing in this module executes
// anything; it is the shape shared by the DSL loader, the validator, the
// scheduler and the driver.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// A port value. The engine treats these as opaque almost everywhere; the
/// sum type exists so the summarization contract (events) and the
/// declarative executor wrapper (plugins) have something concrete to match
/// on instead of serde_json::Value's untyped nature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    /// Ordered sequence of values produced by multi-fan-in stacking (§4.F) or
    /// by a plugin's own composite output.
    Sequence(Vec<Value>),
    /// Anything else: maps, blobs, function handles. Opaque to the engine.
    Opaque(Json),
}

impl Value {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::IntArray(_) => "array-of-int",
            Value::FloatArray(_) => "array-of-float",
            Value::Sequence(_) => "sequence",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Stack N contributions per §4.F: a single contribution is returned
    /// unwrapped, N>1 becomes an ordered `Sequence`.
    pub fn stack(mut values: Vec<Value>) -> Option<Value> {
        if values.len() == 1 {
            values.pop()
        } else if values.is_empty() {
            None
        } else {
            Some(Value::Sequence(values))
        }
    }
}

pub type Params = BTreeMap<String, Value>;
pub type PortValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Default for Position {
    fn default() -> Self {
        Position { x: 0.0, y: 0.0 }
    }
}

/// §3 Node: a single vertex in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub muted: bool,
}

/// §3 Edge: a single typed arc from a producer port to a consumer port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
    #[serde(default)]
    pub is_back_edge: bool,
}

/// §3 Workflow: the whole definition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Workflow {
    #[serde(default = "default_workflow_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_workflow_name() -> String {
    "workflow".to_string()
}

impl Workflow {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn forward_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| !e.is_back_edge)
    }

    pub fn back_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.is_back_edge)
    }

    /// Top-level nodes: those with no `parent_id` (§4.I step 1, Glossary).
    pub fn top_level_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.parent_id.is_none())
    }

    pub fn children_of<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_deref() == Some(group_id))
    }
}

/// §3 Port Spec: one declared input or output port on a registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PortSpec {
    /// Port normalization per §4.B: a non-null default always makes the port
    /// non-required, regardless of an explicit `required` flag; otherwise the
    /// flag is honored (defaulting to required when neither is set, which is
    /// `required`'s own `Default` via `bool::default() == false` being
    /// overridden to `true` at construction time by callers that don't set
    /// either field explicitly — see `PortSpec::new`).
    pub fn is_required(&self) -> bool {
        self.default.is_none() && self.required
    }

    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        PortSpec {
            name: name.into(),
            type_tag: type_tag.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, type_tag: impl Into<String>, default: Value) -> Self {
        PortSpec {
            name: name.into(),
            type_tag: type_tag.into(),
            required: false,
            default: Some(default),
        }
    }
}

/// §3 Node Spec: a registry catalog entry. Order of `inputs` is significant
/// (§6 ordered-arg convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub inputs: Vec<PortSpec>,
    #[serde(default)]
    pub outputs: Vec<PortSpec>,
}

impl NodeSpec {
    pub fn input(&self, name: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_unwraps_single_contribution() {
        assert_eq!(Value::stack(vec![Value::Int(7)]), Some(Value::Int(7)));
    }

    #[test]
    fn stack_sequences_multiple_contributions() {
        let stacked = Value::stack(vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(stacked, Value::Sequence(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn stack_empty_is_none() {
        assert_eq!(Value::stack(vec![]), None);
    }

    #[test]
    fn port_default_overrides_required_flag() {
        let port = PortSpec {
            name: "x".into(),
            type_tag: "number".into(),
            required: true,
            default: Some(Value::Int(0)),
        };
        assert!(!port.is_required());
    }

    #[test]
    fn workflow_deserializes_minimal_yaml() {
        let yaml = "name: demo\nnodes: []\nedges: []\n";
        let wf: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(wf.name, "demo");
        assert!(wf.nodes.is_empty());
    }
}
