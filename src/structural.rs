// src/structural.rs
//
// Type tags the driver handles structurally instead of through the
// registry's executor map (§4.H, §6 "Engine-handled structural types").
// Single source of truth shared by the validator, the driver and the three
// loop executors so the tag strings never drift out of sync between them.

/// H1: container/parent-child loop. The only structural type exempt from
/// "must be in the registry" (§4.E check 1) — unlike the other three, it
/// needs neither a registered spec nor an executor to pass validation.
pub const CONTAINER_LOOP_TYPE: &str = "loop_group";

/// H2: start half of the start/end-pair loop.
pub const LOOP_START_TYPE: &str = "loop_start";

/// H2: end half of the start/end-pair loop.
pub const LOOP_END_TYPE: &str = "loop_end";

/// H3: back-edge loop node.
pub const BACKEDGE_LOOP_TYPE: &str = "loop_node";

/// Reserved loop-feedback ports per node type, excluded from the "missing
/// required input" validator check and from the fan-in/driver treating them
/// as ordinary connected inputs (Glossary: "Reserved loop-feedback ports").
pub fn reserved_feedback_ports(node_type: &str) -> &'static [&'static str] {
    match node_type {
        LOOP_END_TYPE => &["in_1", "in_2", "in_3"],
        BACKEDGE_LOOP_TYPE => &["feedback_1", "feedback_2", "feedback_3"],
        _ => &[],
    }
}

pub fn is_structural_type(node_type: &str) -> bool {
    matches!(
        node_type,
        CONTAINER_LOOP_TYPE | LOOP_START_TYPE | LOOP_END_TYPE | BACKEDGE_LOOP_TYPE
    )
}
