// src/builtin.rs
//
// A small built-in node pack mirroring the "sorting" and "tsp" plugin
// projects from the reference implementation's illustrative plugin set
// (generate_array/bubble_pass/measure_disorder, distance_matrix/greedy/
// evaluate). Registered through the same registration-function convention
// any discovered plugin would use (§4.C), just compiled into the crate so
// the end-to-end scenarios have something runnable to execute against.
//
// The teacher's own Cargo.toml notes it deliberately dropped `rand` in
// favor of `uuid` v4 as its randomness source; `generate_array` follows the
// same convention here rather than reaching for a dedicated RNG crate.

use crate::model::{NodeSpec, Params, PortSpec, PortValues, Value};
use crate::plugins::PluginRegistrar;
use crate::registry::NodeExecutor;
use crate::structural;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

fn optional_port(name: &str, type_tag: &str) -> PortSpec {
    PortSpec {
        name: name.to_string(),
        type_tag: type_tag.to_string(),
        required: false,
        default: None,
    }
}

pub fn register(reg: &dyn PluginRegistrar) {
    reg.register_node(
        NodeSpec {
            node_type: "generate_array".into(),
            label: "Generate Array".into(),
            category: "INPUT".into(),
            description: "Generate a random array of integers".into(),
            doc: "Creates an array of N random integers in [0, 10000). Starting input for a sorting workflow.".into(),
            mode: String::new(),
            inputs: vec![PortSpec::optional("size", "number", Value::Int(1000))],
            outputs: vec![PortSpec::new("array", "array-of-int")],
        },
        Some(Arc::new(generate_array) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: "bubble_pass".into(),
            label: "Bubble Pass".into(),
            category: "REPAIR".into(),
            description: "One pass of bubble sort".into(),
            doc: "Performs a single left-to-right bubble-sort pass, swapping adjacent out-of-order pairs.".into(),
            mode: String::new(),
            inputs: vec![PortSpec::new("array", "array-of-int")],
            outputs: vec![PortSpec::new("array", "array-of-int")],
        },
        Some(Arc::new(bubble_pass) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: "measure_disorder".into(),
            label: "Measure Disorder".into(),
            category: "EVALUATION".into(),
            description: "Count inversions and compute a sorted ratio".into(),
            doc: "Counts adjacent inversions and reports a score from 0.0 (random) to 1.0 (sorted).".into(),
            mode: String::new(),
            inputs: vec![PortSpec::new("array", "array-of-int")],
            outputs: vec![PortSpec::new("score", "number")],
        },
        Some(Arc::new(measure_disorder) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: "distance_matrix".into(),
            label: "Distance Matrix".into(),
            category: "COMPUTE".into(),
            description: "Compute a Euclidean distance matrix from points".into(),
            doc: "Takes N (x, y) points, outputs the N x N pairwise distance matrix as one row per point.".into(),
            mode: String::new(),
            inputs: vec![PortSpec::new("points", "sequence")],
            outputs: vec![PortSpec::new("dist_matrix", "sequence")],
        },
        Some(Arc::new(distance_matrix) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: "greedy".into(),
            label: "Greedy TSP".into(),
            category: "SOLVER".into(),
            description: "Nearest-neighbor greedy TSP solver".into(),
            doc: "Builds a tour using the nearest-neighbor heuristic starting from city 0.".into(),
            mode: String::new(),
            inputs: vec![PortSpec::new("dist_matrix", "sequence")],
            outputs: vec![
                PortSpec::new("tour", "array-of-int"),
                PortSpec::new("tour_length", "number"),
            ],
        },
        Some(Arc::new(greedy) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: "evaluate".into(),
            label: "Evaluate Tour".into(),
            category: "EVALUATION".into(),
            description: "Evaluate and summarize tour quality".into(),
            doc: "Computes tour length and average/longest/shortest edge statistics.".into(),
            mode: String::new(),
            inputs: vec![
                PortSpec::new("dist_matrix", "sequence"),
                PortSpec::new("tour", "array-of-int"),
            ],
            outputs: vec![
                PortSpec::new("tour_length", "number"),
                PortSpec::new("avg_edge", "number"),
                PortSpec::new("longest_edge", "number"),
                PortSpec::new("shortest_edge", "number"),
            ],
        },
        Some(Arc::new(evaluate) as Arc<dyn NodeExecutor>),
    );

    // Structural loop types. §4.E point 1: only loop_group is engine-handled
    // and exempt from needing a registry entry; loop_start/loop_end/loop_node
    // are normal registry types, matching the reference's own plugin node
    // definitions (each declares NODE_INFO with a pass-through `run` body
    // that the loop executors in `loops/` bypass entirely).
    reg.register_node(
        NodeSpec {
            node_type: structural::CONTAINER_LOOP_TYPE.into(),
            label: "Loop Group".into(),
            category: "CONTROL".into(),
            description: "Loops child nodes N times".into(),
            doc: "Container node that repeats its child nodes for N iterations. Wire data into a slot, then wire that same slot to the child node inside.".into(),
            mode: String::new(),
            inputs: vec![
                optional_port("slot_1", "array-of-int"),
                optional_port("slot_2", "array-of-int"),
                optional_port("slot_3", "array-of-int"),
                optional_port("slot_4", "number"),
            ],
            outputs: vec![
                optional_port("slot_1", "array-of-int"),
                optional_port("slot_2", "array-of-int"),
                optional_port("slot_3", "array-of-int"),
                optional_port("slot_4", "number"),
            ],
        },
        None,
    );

    reg.register_node(
        NodeSpec {
            node_type: structural::LOOP_START_TYPE.into(),
            label: "Loop Start".into(),
            category: "CONTROL".into(),
            description: "Start of a loop. Pair with Loop End.".into(),
            doc: "Marks the beginning of a start/end-pair loop. Data enters via in_1/in_2/in_3 and passes to the loop body via out_1/out_2/out_3.".into(),
            mode: String::new(),
            inputs: vec![
                PortSpec::new("in_1", "array-of-int"),
                optional_port("in_2", "array-of-int"),
                optional_port("in_3", "array-of-int"),
                PortSpec::optional("iterations", "number", Value::Int(10)),
            ],
            outputs: vec![
                PortSpec::new("out_1", "array-of-int"),
                PortSpec::new("out_2", "array-of-int"),
                PortSpec::new("out_3", "array-of-int"),
            ],
        },
        Some(Arc::new(loop_rename_passthrough) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: structural::LOOP_END_TYPE.into(),
            label: "Loop End".into(),
            category: "CONTROL".into(),
            description: "End of a loop. Pair with Loop Start.".into(),
            doc: "Marks the end of a start/end-pair loop, collecting results via in_1/in_2/in_3 and feeding them back to the paired Loop Start.".into(),
            mode: String::new(),
            inputs: vec![
                optional_port("in_1", "array-of-int"),
                optional_port("in_2", "array-of-int"),
                optional_port("in_3", "array-of-int"),
            ],
            outputs: vec![
                PortSpec::new("out_1", "array-of-int"),
                PortSpec::new("out_2", "array-of-int"),
                PortSpec::new("out_3", "array-of-int"),
            ],
        },
        Some(Arc::new(loop_rename_passthrough) as Arc<dyn NodeExecutor>),
    );

    reg.register_node(
        NodeSpec {
            node_type: structural::BACKEDGE_LOOP_TYPE.into(),
            label: "Loop".into(),
            category: "CONTROL".into(),
            description: "Loop with back-edge feedback (n8n style).".into(),
            doc: "Single loop control node. Initial data enters via init_1/init_2/init_3; each iteration publishes loop_1/loop_2/loop_3 to the processing chain, which feeds back via feedback_1/feedback_2/feedback_3. After all iterations, done_1/done_2/done_3 emit the final values downstream.".into(),
            mode: String::new(),
            inputs: vec![
                PortSpec::new("init_1", "array-of-int"),
                optional_port("init_2", "array-of-int"),
                optional_port("init_3", "array-of-int"),
                optional_port("feedback_1", "array-of-int"),
                optional_port("feedback_2", "array-of-int"),
                optional_port("feedback_3", "array-of-int"),
                PortSpec::optional("iterations", "number", Value::Int(10)),
            ],
            outputs: vec![
                PortSpec::new("loop_1", "array-of-int"),
                PortSpec::new("loop_2", "array-of-int"),
                PortSpec::new("loop_3", "array-of-int"),
                PortSpec::new("done_1", "array-of-int"),
                PortSpec::new("done_2", "array-of-int"),
                PortSpec::new("done_3", "array-of-int"),
            ],
        },
        Some(Arc::new(loop_rename_passthrough) as Arc<dyn NodeExecutor>),
    );
}

/// Registered so these structural types resolve in the registry like any
/// other (§4.E), but never actually invoked: the loop dialects in `loops/`
/// dispatch them structurally and republish ports directly instead of
/// calling through the executor map (`pair::republish_in_to_out`,
/// `backedge::publish`).
fn loop_rename_passthrough(_params: &Params, inputs: &PortValues) -> Result<PortValues> {
    Ok(inputs.clone())
}

fn int_param(params: &Params, name: &str, default: i64) -> i64 {
    match params.get(name) {
        Some(Value::Int(i)) => *i,
        Some(Value::Float(f)) => *f as i64,
        _ => default,
    }
}

fn int_array(inputs: &PortValues, name: &str) -> Result<Vec<i64>> {
    match inputs.get(name) {
        Some(Value::IntArray(v)) => Ok(v.clone()),
        Some(other) => Err(anyhow!("port '{name}' is not an array-of-int, got {}", other.type_tag())),
        None => Err(anyhow!("missing input port '{name}'")),
    }
}

fn points_array(inputs: &PortValues, name: &str) -> Result<Vec<(f64, f64)>> {
    match inputs.get(name) {
        Some(Value::Sequence(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::FloatArray(pair) if pair.len() == 2 => Ok((pair[0], pair[1])),
                other => Err(anyhow!("expected a 2-element point, got {:?}", other)),
            })
            .collect(),
        _ => Err(anyhow!("missing or malformed input port '{name}'")),
    }
}

fn matrix(inputs: &PortValues, name: &str) -> Result<Vec<Vec<f64>>> {
    match inputs.get(name) {
        Some(Value::Sequence(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::FloatArray(r) => Ok(r.clone()),
                other => Err(anyhow!("expected a matrix row, got {:?}", other)),
            })
            .collect(),
        _ => Err(anyhow!("missing or malformed input port '{name}'")),
    }
}

fn generate_array(params: &Params, _inputs: &PortValues) -> Result<PortValues> {
    let size = int_param(params, "size", 1000).max(0) as usize;
    let mut arr = Vec::with_capacity(size);
    while arr.len() < size {
        let bytes = uuid::Uuid::new_v4();
        for chunk in bytes.as_bytes().chunks(2) {
            if arr.len() >= size {
                break;
            }
            let word = u16::from_be_bytes([chunk[0], *chunk.get(1).unwrap_or(&0)]);
            arr.push((word % 10_000) as i64);
        }
    }
    crate::logging::info(format!("{} elements generated", arr.len()));

    let mut out = PortValues::new();
    out.insert("array".to_string(), Value::IntArray(arr));
    Ok(out)
}

fn bubble_pass(_params: &Params, inputs: &PortValues) -> Result<PortValues> {
    let mut arr = int_array(inputs, "array").context("bubble_pass")?;
    let mut swaps = 0;
    for i in 0..arr.len().saturating_sub(1) {
        if arr[i] > arr[i + 1] {
            arr.swap(i, i + 1);
            swaps += 1;
        }
    }
    crate::logging::info(format!("bubble pass: {swaps} swaps"));

    let mut out = PortValues::new();
    out.insert("array".to_string(), Value::IntArray(arr));
    Ok(out)
}

fn measure_disorder(_params: &Params, inputs: &PortValues) -> Result<PortValues> {
    let arr = int_array(inputs, "array").context("measure_disorder")?;
    let n = arr.len();
    let inversions = (0..n.saturating_sub(1))
        .filter(|&i| arr[i] > arr[i + 1])
        .count();
    let score = 1.0 - (inversions as f64 / (n.saturating_sub(1)).max(1) as f64);
    crate::logging::info(format!("{inversions} inversions, score={score:.4}"));

    let mut out = PortValues::new();
    out.insert("score".to_string(), Value::Float(score));
    Ok(out)
}

fn distance_matrix(_params: &Params, inputs: &PortValues) -> Result<PortValues> {
    let points = points_array(inputs, "points").context("distance_matrix")?;
    let n = points.len();
    let mut rows = Vec::with_capacity(n);
    for (xi, yi) in &points {
        let mut row = Vec::with_capacity(n);
        for (xj, yj) in &points {
            let dx = xi - xj;
            let dy = yi - yj;
            row.push((dx * dx + dy * dy).sqrt());
        }
        rows.push(Value::FloatArray(row));
    }
    crate::logging::info(format!("{n}x{n} matrix"));

    let mut out = PortValues::new();
    out.insert("dist_matrix".to_string(), Value::Sequence(rows));
    Ok(out)
}

fn greedy(_params: &Params, inputs: &PortValues) -> Result<PortValues> {
    let dist = matrix(inputs, "dist_matrix").context("greedy")?;
    let n = dist.len();
    if n == 0 {
        let mut out = PortValues::new();
        out.insert("tour".to_string(), Value::IntArray(vec![]));
        out.insert("tour_length".to_string(), Value::Float(0.0));
        return Ok(out);
    }

    let mut visited = vec![false; n];
    let mut tour = vec![0i64; n];
    visited[0] = true;

    for step in 1..n {
        let current = tour[step - 1] as usize;
        let nearest = (0..n)
            .filter(|&c| !visited[c])
            .min_by(|&a, &b| dist[current][a].total_cmp(&dist[current][b]))
            .expect("at least one unvisited city remains");
        tour[step] = nearest as i64;
        visited[nearest] = true;
    }

    let mut tour_length = 0.0;
    for i in 0..n {
        let a = tour[i] as usize;
        let b = tour[(i + 1) % n] as usize;
        tour_length += dist[a][b];
    }
    crate::logging::info(format!("tour: {tour_length:.2} ({n} cities)"));

    let mut out = PortValues::new();
    out.insert("tour".to_string(), Value::IntArray(tour));
    out.insert("tour_length".to_string(), Value::Float(tour_length));
    Ok(out)
}

fn evaluate(_params: &Params, inputs: &PortValues) -> Result<PortValues> {
    let dist = matrix(inputs, "dist_matrix").context("evaluate")?;
    let tour = int_array(inputs, "tour").context("evaluate")?;
    let n = tour.len();
    if n == 0 {
        return Err(anyhow!("evaluate requires a non-empty tour"));
    }

    let edges: Vec<f64> = (0..n)
        .map(|i| {
            let a = tour[i] as usize;
            let b = tour[(i + 1) % n] as usize;
            dist[a][b]
        })
        .collect();
    let total: f64 = edges.iter().sum();
    let avg = total / n as f64;
    let longest = edges.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let shortest = edges.iter().cloned().fold(f64::INFINITY, f64::min);
    crate::logging::info(format!(
        "length={total:.2}, avg={avg:.2}, max={longest:.2}, min={shortest:.2}"
    ));

    let mut out = PortValues::new();
    out.insert("tour_length".to_string(), Value::Float(total));
    out.insert("avg_edge".to_string(), Value::Float(avg));
    out.insert("longest_edge".to_string(), Value::Float(longest));
    out.insert("shortest_edge".to_string(), Value::Float(shortest));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    struct CollectingRegistrar<'a>(&'a Registry);
    impl PluginRegistrar for CollectingRegistrar<'_> {
        fn register_node(&self, spec: NodeSpec, executor: Option<Arc<dyn NodeExecutor>>) {
            self.0.register(spec, executor);
        }
    }

    #[test]
    fn register_installs_all_builtin_types() {
        let reg = Registry::new();
        register(&CollectingRegistrar(&reg));
        for ty in [
            "generate_array",
            "bubble_pass",
            "measure_disorder",
            "distance_matrix",
            "greedy",
            "evaluate",
            structural::CONTAINER_LOOP_TYPE,
            structural::LOOP_START_TYPE,
            structural::LOOP_END_TYPE,
            structural::BACKEDGE_LOOP_TYPE,
        ] {
            assert!(reg.contains(ty), "missing builtin type {ty}");
        }
    }

    #[test]
    fn loop_group_has_no_executor() {
        let reg = Registry::new();
        register(&CollectingRegistrar(&reg));
        let snapshot = reg.snapshot();
        assert!(snapshot.has_spec(structural::CONTAINER_LOOP_TYPE));
        assert!(!snapshot.has_executor(structural::CONTAINER_LOOP_TYPE));
    }

    #[test]
    fn loop_start_and_loop_node_have_a_passthrough_executor() {
        let reg = Registry::new();
        register(&CollectingRegistrar(&reg));
        let snapshot = reg.snapshot();
        for ty in [
            structural::LOOP_START_TYPE,
            structural::LOOP_END_TYPE,
            structural::BACKEDGE_LOOP_TYPE,
        ] {
            assert!(snapshot.has_executor(ty), "missing executor for {ty}");
        }
    }

    #[test]
    fn loop_rename_passthrough_clones_inputs_unchanged() {
        let mut inputs = PortValues::new();
        inputs.insert("init_1".to_string(), Value::Int(5));
        let out = loop_rename_passthrough(&Params::new(), &inputs).unwrap();
        assert_eq!(out, inputs);
    }

    #[test]
    fn bubble_pass_fixes_one_inversion() {
        let mut inputs = PortValues::new();
        inputs.insert("array".to_string(), Value::IntArray(vec![3, 1, 2]));
        let out = bubble_pass(&Params::new(), &inputs).unwrap();
        assert_eq!(out.get("array"), Some(&Value::IntArray(vec![1, 3, 2])));
    }

    #[test]
    fn measure_disorder_scores_sorted_array_as_one() {
        let mut inputs = PortValues::new();
        inputs.insert("array".to_string(), Value::IntArray(vec![1, 2, 3, 4]));
        let out = measure_disorder(&Params::new(), &inputs).unwrap();
        assert_eq!(out.get("score"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn greedy_then_evaluate_agree_on_tour_length() {
        let mut points_inputs = PortValues::new();
        points_inputs.insert(
            "points".to_string(),
            Value::Sequence(vec![
                Value::FloatArray(vec![0.0, 0.0]),
                Value::FloatArray(vec![1.0, 0.0]),
                Value::FloatArray(vec![1.0, 1.0]),
            ]),
        );
        let dist_out = distance_matrix(&Params::new(), &points_inputs).unwrap();
        let mut greedy_inputs = PortValues::new();
        greedy_inputs.insert("dist_matrix".to_string(), dist_out.get("dist_matrix").unwrap().clone());
        let greedy_out = greedy(&Params::new(), &greedy_inputs).unwrap();

        let mut eval_inputs = PortValues::new();
        eval_inputs.insert("dist_matrix".to_string(), dist_out.get("dist_matrix").unwrap().clone());
        eval_inputs.insert("tour".to_string(), greedy_out.get("tour").unwrap().clone());
        let eval_out = evaluate(&Params::new(), &eval_inputs).unwrap();

        assert_eq!(eval_out.get("tour_length"), greedy_out.get("tour_length"));
    }
}
