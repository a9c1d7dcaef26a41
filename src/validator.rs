// src/validator.rs
//
// §4.E Validator: static checks over a workflow. Never refuses to validate a
// malformed workflow — it reports issues as data and lets the caller decide.

use crate::model::Workflow;
use crate::registry::RegistrySnapshot;
use crate::structural::{self, BACKEDGE_LOOP_TYPE, CONTAINER_LOOP_TYPE, LOOP_END_TYPE, LOOP_START_TYPE};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub level: Level,
    pub node_id: Option<String>,
    pub message: String,
}

impl Issue {
    fn error(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Issue {
            level: Level::Error,
            node_id: Some(node_id.into()),
            message: message.into(),
        }
    }
    fn warning(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Issue {
            level: Level::Warning,
            node_id: Some(node_id.into()),
            message: message.into(),
        }
    }
    fn info(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Issue {
            level: Level::Info,
            node_id: Some(node_id.into()),
            message: message.into(),
        }
    }
}

pub fn validate(workflow: &Workflow, registry: &RegistrySnapshot) -> Vec<Issue> {
    let mut issues = Vec::new();

    check_unknown_types(workflow, registry, &mut issues);
    check_missing_required_inputs(workflow, registry, &mut issues);
    check_cycles(workflow, &mut issues);
    check_isolated_nodes(workflow, &mut issues);
    check_muted(workflow, &mut issues);
    check_loop_pairing(workflow, &mut issues);
    check_loop_feedback_presence(workflow, &mut issues);

    issues
}

// 1. Unknown node type. Only the legacy loop container is an engine-handled
// structural type with no registry entry at all (§4.E point 1); the
// start/end-pair and back-edge loop types are normal registry types and must
// resolve like any other node.
fn check_unknown_types(workflow: &Workflow, registry: &RegistrySnapshot, issues: &mut Vec<Issue>) {
    for node in &workflow.nodes {
        if node.node_type == CONTAINER_LOOP_TYPE {
            continue;
        }
        if !registry.has_spec(&node.node_type) {
            issues.push(Issue::error(
                &node.id,
                format!(
                    "node '{}' uses unknown type '{}'",
                    node.id, node.node_type
                ),
            ));
        }
    }
}

// 2. Missing required input. Incoming-port presence is evaluated over ALL
// edges (forward and back) touching the node, matching the reference
// behavior: a feedback back-edge targeting a non-reserved port still
// satisfies it (see SPEC_FULL.md §4.E / §9 and DESIGN.md).
fn check_missing_required_inputs(
    workflow: &Workflow,
    registry: &RegistrySnapshot,
    issues: &mut Vec<Issue>,
) {
    for node in &workflow.nodes {
        let Some(spec) = registry.spec(&node.node_type) else {
            continue;
        };
        let incoming_ports: HashSet<&str> = workflow
            .edges
            .iter()
            .filter(|e| e.target == node.id)
            .map(|e| e.target_port.as_str())
            .collect();
        let skip = structural::reserved_feedback_ports(&node.node_type);

        for port in &spec.inputs {
            if !port.is_required() {
                continue;
            }
            if skip.contains(&port.name.as_str()) {
                continue;
            }
            if !incoming_ports.contains(port.name.as_str()) {
                issues.push(Issue::error(
                    &node.id,
                    format!(
                        "node '{}' is missing required input '{}'",
                        node.id, port.name
                    ),
                ));
            }
        }
    }
}

// 3. Cycle: DFS 3-coloring over the top-level subgraph, forward edges only.
fn check_cycles(workflow: &Workflow, issues: &mut Vec<Issue>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let top_level: HashSet<&str> = workflow.top_level_nodes().map(|n| n.id.as_str()).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in workflow.forward_edges() {
        if top_level.contains(edge.source.as_str()) && top_level.contains(edge.target.as_str()) {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    let mut color: HashMap<&str, Color> = top_level.iter().map(|n| (*n, Color::White)).collect();
    let mut found_cycle = false;

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        color: &mut HashMap<&'a str, Color>,
        found_cycle: &mut bool,
    ) {
        if *found_cycle {
            return;
        }
        color.insert(node, Color::Gray);
        if let Some(neighbors) = adjacency.get(node) {
            for &next in neighbors {
                match color.get(next).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        *found_cycle = true;
                        return;
                    }
                    Color::White => visit(next, adjacency, color, found_cycle),
                    Color::Black => {}
                }
                if *found_cycle {
                    return;
                }
            }
        }
        color.insert(node, Color::Black);
    }

    let mut ids: Vec<&str> = top_level.iter().copied().collect();
    ids.sort_unstable();
    for id in ids {
        if color.get(id).copied() == Some(Color::White) {
            visit(id, &adjacency, &mut color, &mut found_cycle);
        }
        if found_cycle {
            break;
        }
    }

    if found_cycle {
        issues.push(Issue {
            level: Level::Error,
            node_id: None,
            message: "workflow contains a cycle among forward edges".to_string(),
        });
    }
}

// 4. Isolated node.
fn check_isolated_nodes(workflow: &Workflow, issues: &mut Vec<Issue>) {
    if workflow.nodes.len() <= 1 {
        return;
    }
    let mut incident: HashSet<&str> = HashSet::new();
    for edge in &workflow.edges {
        incident.insert(edge.source.as_str());
        incident.insert(edge.target.as_str());
    }
    for node in &workflow.nodes {
        if structural::is_structural_type(&node.node_type) {
            continue;
        }
        if !incident.contains(node.id.as_str()) {
            issues.push(Issue::warning(
                &node.id,
                format!("node '{}' has no incident edges", node.id),
            ));
        }
    }
}

// 5. Muted.
fn check_muted(workflow: &Workflow, issues: &mut Vec<Issue>) {
    for node in &workflow.nodes {
        if node.muted {
            issues.push(Issue::info(&node.id, format!("node '{}' is muted", node.id)));
        }
    }
}

fn pair_id_param(node: &crate::model::Node) -> Option<&str> {
    match node.params.get("pair_id") {
        Some(crate::model::Value::Str(s)) => Some(s.as_str()),
        _ => None,
    }
}

// 6. Loop pair.
fn check_loop_pairing(workflow: &Workflow, issues: &mut Vec<Issue>) {
    let starts: HashSet<&str> = workflow
        .nodes
        .iter()
        .filter(|n| n.node_type == LOOP_START_TYPE)
        .map(|n| n.id.as_str())
        .collect();
    let ends: Vec<&crate::model::Node> = workflow
        .nodes
        .iter()
        .filter(|n| n.node_type == LOOP_END_TYPE)
        .collect();

    let mut paired_starts: HashSet<&str> = HashSet::new();
    for end in &ends {
        match pair_id_param(end) {
            Some(start_id) if starts.contains(start_id) => {
                paired_starts.insert(start_id);
            }
            Some(start_id) => {
                issues.push(Issue::error(
                    &end.id,
                    format!(
                        "loop end '{}' names pair_id '{}' which is not a loop start node",
                        end.id, start_id
                    ),
                ));
            }
            None => {
                issues.push(Issue::error(
                    &end.id,
                    format!("loop end '{}' has no pair_id", end.id),
                ));
            }
        }
    }

    for start_id in &starts {
        if !paired_starts.contains(start_id) {
            issues.push(Issue::error(
                *start_id,
                format!("loop start '{}' has no matching loop end", start_id),
            ));
        }
    }
}

// 7. Loop-feedback presence.
fn check_loop_feedback_presence(workflow: &Workflow, issues: &mut Vec<Issue>) {
    let back_edge_targets: HashSet<&str> = workflow
        .back_edges()
        .map(|e| e.target.as_str())
        .collect();

    for node in &workflow.nodes {
        if node.node_type == BACKEDGE_LOOP_TYPE && !back_edge_targets.contains(node.id.as_str()) {
            issues.push(Issue::warning(
                &node.id,
                format!(
                    "loop node '{}' has no incoming back-edge; it will repeat constant data",
                    node.id
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node, Value};
    use crate::registry::Registry;

    fn node(id: &str, node_type: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: node_type.to_string(),
            position: Default::default(),
            params: Default::default(),
            parent_id: None,
            muted: false,
        }
    }

    #[test]
    fn empty_workflow_has_no_issues() {
        let wf = Workflow::default();
        let reg = Registry::new().snapshot();
        assert!(validate(&wf, &reg).is_empty());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "mystery")],
            edges: vec![],
        };
        let reg = Registry::new().snapshot();
        let issues = validate(&wf, &reg);
        assert!(issues.iter().any(|i| i.level == Level::Error));
    }

    #[test]
    fn loop_start_and_end_types_need_a_registry_entry() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("s", LOOP_START_TYPE), node("e", LOOP_END_TYPE)],
            edges: vec![],
        };
        let reg = Registry::new().snapshot();
        let issues = validate(&wf, &reg);
        assert_eq!(
            issues
                .iter()
                .filter(|i| i.level == Level::Error && i.message.contains("unknown type"))
                .count(),
            2
        );
    }

    #[test]
    fn loop_group_type_is_exempt_from_unknown_type_check() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("g", CONTAINER_LOOP_TYPE)],
            edges: vec![],
        };
        let reg = Registry::new().snapshot();
        let issues = validate(&wf, &reg);
        assert!(!issues.iter().any(|i| i.level == Level::Error));
    }

    #[test]
    fn cycle_among_top_level_nodes_is_detected() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "x"), node("b", "x")],
            edges: vec![
                Edge {
                    id: "e1".into(),
                    source: "a".into(),
                    source_port: "o".into(),
                    target: "b".into(),
                    target_port: "i".into(),
                    is_back_edge: false,
                },
                Edge {
                    id: "e2".into(),
                    source: "b".into(),
                    source_port: "o".into(),
                    target: "a".into(),
                    target_port: "i".into(),
                    is_back_edge: false,
                },
            ],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: "x".into(),
                label: "x".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![],
                outputs: vec![],
            },
            None,
        );
        let issues = validate(&wf, &reg.snapshot());
        assert!(issues
            .iter()
            .any(|i| i.level == Level::Error && i.message.contains("cycle")));
    }

    #[test]
    fn back_edge_satisfies_required_input() {
        let mut wf_node = node("ln", BACKEDGE_LOOP_TYPE);
        wf_node.params.insert("iterations".into(), Value::Int(1));
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![wf_node],
            edges: vec![],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: BACKEDGE_LOOP_TYPE.into(),
                label: "loop".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![crate::model::PortSpec::new("feedback_1", "number")],
                outputs: vec![],
            },
            None,
        );
        let issues = validate(&wf, &reg.snapshot());
        assert!(!issues
            .iter()
            .any(|i| i.level == Level::Error && i.message.contains("feedback_1")));
    }

    #[test]
    fn isolated_node_in_multi_node_workflow_warns() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("a", "x"), node("b", "x")],
            edges: vec![],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: "x".into(),
                label: "x".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![],
                outputs: vec![],
            },
            None,
        );
        let issues = validate(&wf, &reg.snapshot());
        assert_eq!(
            issues.iter().filter(|i| i.level == Level::Warning).count(),
            2
        );
    }

    #[test]
    fn unpaired_loop_start_is_an_error() {
        let wf = Workflow {
            name: "t".into(),
            nodes: vec![node("s1", LOOP_START_TYPE)],
            edges: vec![],
        };
        let reg = Registry::new();
        reg.register(
            crate::model::NodeSpec {
                node_type: LOOP_START_TYPE.into(),
                label: "start".into(),
                category: String::new(),
                description: String::new(),
                doc: String::new(),
                mode: String::new(),
                inputs: vec![],
                outputs: vec![],
            },
            None,
        );
        let issues = validate(&wf, &reg.snapshot());
        assert!(issues
            .iter()
            .any(|i| i.level == Level::Error && i.message.contains("no matching loop end")));
    }
}
