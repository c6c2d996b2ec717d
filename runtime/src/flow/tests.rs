use alloc::vec::Vec;

use arrayflow_core::{BaseId, Constant, ElementType, Instruction, Opcode, Operand, View};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::alias::{ConservativeOracle, PreciseOracle};

// HELPERS
// ================================================================================================

fn flat(base: u64, start: u64, len: u64) -> View {
    View::new(BaseId::new(base), ElementType::Int32, start, &[len], &[1]).unwrap()
}

fn strided(base: u64, start: u64, len: u64, step: i64) -> View {
    View::new(BaseId::new(base), ElementType::Int32, start, &[len], &[step]).unwrap()
}

/// `out = in + constant`
fn add(out: View, input: View, constant: i32) -> Instruction {
    Instruction::new(
        Opcode::Add,
        [
            Operand::View(out),
            Operand::View(input),
            Operand::Constant(Constant::Int32(constant)),
        ],
    )
    .unwrap()
}

fn copy(out: View, input: View) -> Instruction {
    Instruction::new(Opcode::Identity, [Operand::View(out), Operand::View(input)]).unwrap()
}

fn ids(raw: &[u32]) -> Vec<NodeId> {
    raw.iter().copied().map(NodeId::new).collect()
}

// GRAPH CONSTRUCTION
// ================================================================================================

#[test]
fn empty_stream_builds_empty_graph() {
    let graph = FlowGraph::build(&[], &PreciseOracle).unwrap();
    assert!(graph.nodes().is_empty());
    assert_eq!(graph.num_sub_dags(), 0);
}

#[test]
fn suppressed_instructions_produce_no_nodes() {
    let graph = FlowGraph::build(&[Instruction::nop(), Instruction::nop()], &PreciseOracle)
        .unwrap();
    assert!(graph.nodes().is_empty());
}

#[test]
fn write_after_read_on_identical_view() {
    // Two accumulations into the same view: the second must observe the first.
    let v = flat(0, 0, 4);
    let stream = [add(v.clone(), v.clone(), 1), add(v.clone(), v.clone(), 2)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    // Nodes in insertion order: r0 w1 (instruction 0), r2 w3 (instruction 1).
    assert_eq!(graph.nodes().len(), 4);
    assert_eq!(graph.node(NodeId::new(0)).timestep(), 0);
    assert_eq!(graph.node(NodeId::new(1)).timestep(), 0);
    assert_eq!(graph.node(NodeId::new(2)).timestep(), 1);
    assert_eq!(graph.node(NodeId::new(3)).timestep(), 1);

    // The second read consumes exactly what the first write produced.
    assert_eq!(graph.node(NodeId::new(2)).parents(), ids(&[1]));
    assert_eq!(graph.node(NodeId::new(3)).parents(), ids(&[2]));
    assert_eq!(graph.num_sub_dags(), 1);
}

#[test]
fn disjoint_slices_form_independent_sub_dags() {
    let lo = flat(0, 0, 4);
    let hi = flat(0, 4, 4);
    let stream = [add(lo.clone(), lo, 1), add(hi.clone(), hi, 2)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    assert_eq!(graph.num_sub_dags(), 2);
    for node in graph.nodes() {
        assert_eq!(node.timestep(), 0);
        assert_eq!(node.sub_dag(), node.instruction() as u32);
        // No edges cross between the two instructions.
        for parent in node.parents() {
            assert_eq!(graph.node(*parent).instruction(), node.instruction());
        }
    }
}

#[test]
fn interleaved_strided_views_with_precise_oracle() {
    let evens = strided(0, 0, 4, 2);
    let odds = strided(0, 1, 4, 2);
    let stream = [add(evens.clone(), evens, 1), add(odds.clone(), odds, 2)];

    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();
    assert_eq!(graph.num_sub_dags(), 2);

    // A conservative oracle may not prove the disjointness and must then serialize.
    let graph = FlowGraph::build(&stream, &ConservativeOracle).unwrap();
    assert_eq!(graph.num_sub_dags(), 1);
    assert_eq!(graph.node(NodeId::new(0)).timestep(), 0);
    assert_eq!(graph.node(NodeId::new(3)).timestep(), 1);
}

#[test]
fn broadcast_read_stays_on_its_base() {
    // A stride-0 broadcast of a single element, read into an unrelated output base.
    let broadcast = View::new(BaseId::new(0), ElementType::Int32, 0, &[100], &[0]).unwrap();
    let out = flat(1, 0, 100);
    let graph = FlowGraph::build(&[add(out, broadcast, 0)], &PreciseOracle).unwrap();

    assert_eq!(graph.nodes().len(), 2);
    let read = graph.node(NodeId::new(0));
    assert!(read.kind().is_read());
    assert_eq!(read.view().base(), BaseId::new(0));
    assert_eq!(graph.base_accesses(BaseId::new(1)), &[NodeId::new(1)]);
    // Parent edge joins the instruction's nodes into one sub-DAG.
    assert_eq!(graph.num_sub_dags(), 1);
}

#[test]
fn reads_do_not_conflict_with_reads() {
    // Two instructions reading the same view, writing to unrelated bases: both run at
    // timestep 0, but sharing an overlapping read keeps them in one sub-DAG.
    let shared = flat(0, 0, 8);
    let stream = [add(flat(1, 0, 8), shared.clone(), 1), add(flat(2, 0, 8), shared, 2)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    for node in graph.nodes() {
        assert_eq!(node.timestep(), 0);
    }
    assert_eq!(graph.num_sub_dags(), 1);
}

#[test]
fn identical_read_gains_producer_edge_across_instructions() {
    let a = flat(0, 0, 8);
    let b = flat(1, 0, 8);
    let c = flat(2, 0, 8);
    let stream = [copy(b.clone(), a), add(c, b, 1)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    // Nodes: r0(a) w1(b) | r2(b) w3(c); the read of `b` lists its producing write.
    assert_eq!(graph.node(NodeId::new(2)).parents(), ids(&[1]));
    assert_eq!(graph.node(NodeId::new(2)).timestep(), 1);
}

#[test]
fn overlapping_but_not_identical_write_orders_without_edge() {
    // The second instruction reads a sub-slice of what the first wrote: ordered by timestep,
    // but no exact-producer edge exists.
    let whole = flat(0, 0, 8);
    let half = flat(0, 0, 4);
    let stream = [add(whole.clone(), whole, 1), add(flat(1, 0, 4), half, 0)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    let read = graph.node(NodeId::new(2));
    assert!(read.parents().is_empty());
    assert_eq!(read.timestep(), 1);
    assert_eq!(graph.num_sub_dags(), 1);
}

#[test]
fn sync_serializes_against_pending_writes() {
    let v = flat(0, 0, 4);
    let stream = [
        add(v.clone(), v.clone(), 1),
        Instruction::lifecycle(Opcode::Sync, v.clone()),
        add(v.clone(), v, 2),
    ];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    // Sync contributes a single write node at its own timestep; the following add comes later.
    let timesteps: Vec<u32> = graph.nodes().iter().map(AccessNode::timestep).collect();
    assert_eq!(timesteps, vec![0, 0, 1, 2, 2]);
    assert_eq!(graph.num_sub_dags(), 1);
}

#[test]
fn dynamic_views_serialize_disjoint_slices() {
    let mut lo = flat(0, 0, 4);
    lo.mark_dynamic();
    let hi = flat(0, 4, 4);
    let stream = [add(lo.clone(), lo, 1), add(hi.clone(), hi, 2)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    assert_eq!(graph.num_sub_dags(), 1);
    assert_eq!(graph.node(NodeId::new(3)).timestep(), 1);
}

// SCHEDULING
// ================================================================================================

#[test]
fn schedule_groups_by_sub_dag_in_recording_order() {
    let lo = flat(0, 0, 4);
    let hi = flat(0, 4, 4);
    let stream = [
        add(lo.clone(), lo.clone(), 1),
        add(hi.clone(), hi, 2),
        add(lo.clone(), lo, 3),
    ];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    assert_eq!(graph.schedule(), vec![vec![0, 2], vec![1]]);
}

// DEBUG DUMPS
// ================================================================================================

#[test]
fn text_dump_lists_every_node_once() {
    let v = flat(0, 0, 4);
    let stream = [add(v.clone(), v.clone(), 1), add(v.clone(), v, 2)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    let mut text = alloc::string::String::new();
    graph.write_text(&mut text).unwrap();
    // Header plus one line per access node.
    assert_eq!(text.lines().count(), 1 + graph.nodes().len());
    assert!(text.contains("add"));
}

#[test]
fn dot_dump_clusters_per_base() {
    let stream = [add(flat(0, 0, 4), flat(1, 0, 4), 1)];
    let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();

    let mut dot = alloc::string::String::new();
    graph.write_dot(&mut dot, &PreciseOracle).unwrap();
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("clusterBASE0"));
    assert!(dot.contains("clusterBASE1"));
}

// PROPERTY TESTS
// ================================================================================================

// Strategy over views of a handful of small bases, sized so conflicts are common.
fn arb_view() -> impl Strategy<Value = View> {
    (0u64..3, 0u64..6, 1u64..=4, prop_oneof![Just(1i64), Just(2i64), Just(-1i64)]).prop_map(
        |(base, start, len, step)| {
            let start = if step < 0 { start + len - 1 } else { start };
            View::new(BaseId::new(base), ElementType::Int32, start, &[len], &[step]).unwrap()
        },
    )
}

fn arb_stream() -> impl Strategy<Value = Vec<Instruction>> {
    proptest::collection::vec((arb_view(), arb_view()), 0..12)
        .prop_map(|pairs| pairs.into_iter().map(|(out, input)| add(out, input, 1)).collect())
}

proptest! {
    // The flow invariant holds for arbitrary streams under both oracles.
    #[test]
    fn flow_invariant_holds(stream in arb_stream()) {
        let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();
        graph.assert_invariants(&PreciseOracle);

        let graph = FlowGraph::build(&stream, &ConservativeOracle).unwrap();
        graph.assert_invariants(&ConservativeOracle);
    }

    // Every non-suppressed instruction appears exactly once in the schedule.
    #[test]
    fn schedule_is_a_permutation(stream in arb_stream()) {
        let graph = FlowGraph::build(&stream, &PreciseOracle).unwrap();
        let mut seen: Vec<usize> = graph.schedule().into_iter().flatten().collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..stream.len()).collect();
        prop_assert_eq!(seen, expected);
    }
}
