use alloc::{collections::BTreeMap, vec::Vec};
use core::fmt;

use arrayflow_core::{BaseId, Instruction, Opcode, View};
use itertools::Itertools;
use smallvec::SmallVec;

use crate::{alias::AliasOracle, errors::FlushError};

mod dump;

#[cfg(test)]
mod tests;

// NODE ID
// ================================================================================================

/// Index of an access node within a [`FlowGraph`]'s arena.
///
/// Nodes reference each other by index rather than by pointer; this keeps the arena relocatable
/// and makes the debug dumps trivial to serialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Returns a new node id wrapping the provided raw index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns this id as a usize, for arena indexing.
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ACCESS KIND
// ================================================================================================

/// Polarity of an access node: does the instruction read or write through the view?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// Returns true for read polarity.
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }
}

// ACCESS NODE
// ================================================================================================

/// One operand's participation in one instruction.
///
/// Nodes are created during graph construction and never mutated afterwards. `parents` holds the
/// direct dataflow predecessors as a sorted set of node indices: for a read node, the write node
/// that produced exactly its view (if any); for a write node, the read nodes of its own
/// instruction.
#[derive(Clone, Debug)]
pub struct AccessNode {
    instruction: usize,
    kind: AccessKind,
    view: View,
    timestep: u32,
    parents: SmallVec<[NodeId; 2]>,
    sub_dag: u32,
}

impl AccessNode {
    fn new(instruction: usize, kind: AccessKind, view: View) -> Self {
        Self {
            instruction,
            kind,
            view,
            timestep: 0,
            parents: SmallVec::new(),
            sub_dag: 0,
        }
    }

    /// Returns the index of the source instruction within the flushed batch.
    pub const fn instruction(&self) -> usize {
        self.instruction
    }

    /// Returns the polarity of this access.
    pub const fn kind(&self) -> AccessKind {
        self.kind
    }

    /// Returns the view through which the instruction touches the base.
    pub const fn view(&self) -> &View {
        &self.view
    }

    /// Returns the timestep assigned to this node.
    ///
    /// All nodes of one instruction share a timestep, and conflicting accesses on a base are
    /// ordered by strictly increasing timesteps.
    pub const fn timestep(&self) -> u32 {
        self.timestep
    }

    /// Returns the direct dataflow predecessors of this node, sorted ascending.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Returns the id of the sub-DAG this node was partitioned into.
    pub const fn sub_dag(&self) -> u32 {
        self.sub_dag
    }

    fn add_parent(&mut self, parent: NodeId) {
        if let Err(at) = self.parents.binary_search(&parent) {
            self.parents.insert(at, parent);
        }
    }
}

// FLOW GRAPH
// ================================================================================================

/// Dependency graph over the access nodes of one flushed instruction batch.
///
/// Construction walks the batch in recording order and maintains the flow invariant: conflicting
/// accesses on a base are totally ordered by timestep in recording order, reads carry exact
/// producer edges to the write that defined their view, and the node set is partitioned into
/// sub-DAGs that can be scheduled independently.
#[derive(Clone, Debug)]
pub struct FlowGraph {
    nodes: Vec<AccessNode>,
    bases: BTreeMap<BaseId, Vec<NodeId>>,
    opcodes: Vec<Opcode>,
    num_sub_dags: u32,
}

impl FlowGraph {
    // GRAPH CONSTRUCTION
    // --------------------------------------------------------------------------------------------

    /// Builds the flow graph for the provided instruction batch.
    ///
    /// Instructions without operands (suppressed by lifecycle rewriting) produce no nodes. The
    /// builder never rejects an instruction stream; running out of memory while growing the
    /// internal tables is the only error.
    #[tracing::instrument(skip_all, fields(instructions = instructions.len()))]
    pub fn build(
        instructions: &[Instruction],
        oracle: &dyn AliasOracle,
    ) -> Result<Self, FlushError> {
        let mut graph = Self {
            nodes: Vec::new(),
            bases: BTreeMap::new(),
            opcodes: instructions.iter().map(Instruction::opcode).collect(),
            num_sub_dags: 0,
        };

        for (index, instruction) in instructions.iter().enumerate() {
            let Some(output) = instruction.output() else {
                continue;
            };
            let mut write = AccessNode::new(index, AccessKind::Write, output.clone());
            let mut created = 1;

            // The write conflicts with reads and writes alike. Resolved against the state before
            // this instruction's own read nodes are inserted: accesses of one instruction do not
            // conflict with each other (they share a timestep instead).
            let mut timestep = graph.conflicting_accesses(output, false, oracle).floor;

            graph.nodes.try_reserve(instruction.operands().len()).map_err(oom)?;
            for operand in instruction.reads() {
                let Some(view) = operand.as_view() else {
                    continue;
                };
                let mut read = AccessNode::new(index, AccessKind::Read, view.clone());
                let conflicts = graph.conflicting_accesses(view, true, oracle);
                timestep = timestep.max(conflicts.floor);
                if let Some(latest) = conflicts.latest {
                    // A perfect match means the latest conflicting access wrote exactly the
                    // elements this read consumes: record the producer edge.
                    if oracle.identical(graph.node(latest).view(), view) {
                        read.add_parent(latest);
                    }
                }
                let read_id = graph.insert(read)?;
                write.add_parent(read_id);
                created += 1;
            }
            graph.insert(write)?;

            // All nodes of one instruction share the final timestep.
            let first_created = graph.nodes.len() - created;
            for node in &mut graph.nodes[first_created..] {
                node.timestep = timestep;
            }
        }

        graph.partition(oracle);
        #[cfg(debug_assertions)]
        graph.assert_invariants(oracle);
        Ok(graph)
    }

    /// Appends a node to the arena and registers it in its base's access list.
    fn insert(&mut self, node: AccessNode) -> Result<NodeId, FlushError> {
        let id = NodeId::new(self.nodes.len() as u32);
        let accesses = self.bases.entry(node.view.base()).or_default();
        accesses.try_reserve(1).map_err(oom)?;
        accesses.push(id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Collects the accesses already registered on `view`'s base that conflict with `view`.
    ///
    /// When `readonly` is set the querying access is itself a read, so read nodes are skipped
    /// (read–read pairs never conflict); a new write conflicts with reads and writes alike.
    /// Among conflicting candidates the latest recorded wins the producer-edge decision, but the
    /// timestep floor must clear every conflicting access: timesteps are not monotone in
    /// insertion order across disjoint views of one base, so the scan cannot stop at the first
    /// hit.
    fn conflicting_accesses(
        &self,
        view: &View,
        readonly: bool,
        oracle: &dyn AliasOracle,
    ) -> Conflicts {
        let mut conflicts = Conflicts::default();
        let Some(accesses) = self.bases.get(&view.base()) else {
            return conflicts;
        };
        for id in accesses.iter().rev() {
            let node = &self.nodes[id.as_usize()];
            if readonly && node.kind.is_read() {
                continue;
            }
            if oracle.overlap(&node.view, view) {
                if conflicts.latest.is_none() {
                    conflicts.latest = Some(*id);
                }
                conflicts.floor = conflicts.floor.max(node.timestep + 1);
            }
        }
        conflicts
    }

    // SUB-DAG PARTITIONING
    // --------------------------------------------------------------------------------------------

    /// Partitions the node set into sub-DAGs.
    ///
    /// Two nodes share a sub-DAG when their views overlap on the same base or when one is a
    /// parent of the other, closed transitively. Ids are compact integers assigned in node order,
    /// so the partition is stable for a given input.
    fn partition(&mut self, oracle: &dyn AliasOracle) {
        let mut sets = DisjointSet::new(self.nodes.len());
        for accesses in self.bases.values() {
            for (&u, &v) in accesses.iter().tuple_combinations() {
                if oracle.overlap(&self.nodes[u.as_usize()].view, &self.nodes[v.as_usize()].view)
                {
                    sets.union(u.as_usize(), v.as_usize());
                }
            }
        }
        for index in 0..self.nodes.len() {
            for parent in self.nodes[index].parents.clone() {
                sets.union(index, parent.as_usize());
            }
        }

        let mut compact: BTreeMap<usize, u32> = BTreeMap::new();
        for index in 0..self.nodes.len() {
            let root = sets.find(index);
            let next = compact.len() as u32;
            let id = *compact.entry(root).or_insert(next);
            self.nodes[index].sub_dag = id;
        }
        self.num_sub_dags = compact.len() as u32;
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns all access nodes in insertion (recording) order.
    pub fn nodes(&self) -> &[AccessNode] {
        &self.nodes
    }

    /// Returns the node with the specified id.
    pub fn node(&self, id: NodeId) -> &AccessNode {
        &self.nodes[id.as_usize()]
    }

    /// Returns the ordered access list recorded for the specified base.
    pub fn base_accesses(&self, base: BaseId) -> &[NodeId] {
        self.bases.get(&base).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the number of sub-DAGs in the partition.
    pub fn num_sub_dags(&self) -> usize {
        self.num_sub_dags as usize
    }

    // SCHEDULING
    // --------------------------------------------------------------------------------------------

    /// Groups instruction indices by sub-DAG, preserving recording order within each group.
    ///
    /// Sub-DAG id order is a valid topological order across groups since distinct sub-DAGs share
    /// no dependencies, and recording order within a group respects the flow invariant.
    pub fn schedule(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); self.num_sub_dags()];
        for node in &self.nodes {
            if !node.kind.is_read() {
                groups[node.sub_dag as usize].push(node.instruction);
            }
        }
        groups
    }

    // INVARIANT CHECKS
    // --------------------------------------------------------------------------------------------

    /// Panics if the graph violates the flow invariant.
    ///
    /// A violation indicates a bug in the builder; this is exercised by tests and by debug
    /// builds after construction.
    pub fn assert_invariants(&self, oracle: &dyn AliasOracle) {
        // Conflicting accesses on a base are ordered by strictly increasing timestep.
        for accesses in self.bases.values() {
            for (&u, &v) in accesses.iter().tuple_combinations() {
                let (a, b) = (self.node(u), self.node(v));
                let conflicting = !(a.kind.is_read() && b.kind.is_read());
                if conflicting && oracle.overlap(&a.view, &b.view) {
                    assert!(
                        a.timestep < b.timestep || a.instruction == b.instruction,
                        "conflicting accesses {u} and {v} share timestep {}",
                        a.timestep,
                    );
                    assert_eq!(a.sub_dag, b.sub_dag, "overlapping nodes in distinct sub-DAGs");
                }
            }
        }

        for (index, node) in self.nodes.iter().enumerate() {
            for &parent in node.parents() {
                let p = self.node(parent);
                // Edges never point forward in time; equality only within one instruction.
                assert!(
                    p.timestep < node.timestep
                        || (p.timestep == node.timestep && p.instruction == node.instruction),
                    "edge from node {parent} crosses backwards into node {index}",
                );
                assert_eq!(p.sub_dag, node.sub_dag, "parent edge crosses sub-DAGs");
            }
            // Nodes of one instruction share a timestep.
            for other in &self.nodes {
                if other.instruction == node.instruction {
                    assert_eq!(other.timestep, node.timestep, "instruction spans timesteps");
                }
            }
        }
    }
}

// CONFLICTS
// ================================================================================================

/// Result of a conflict scan over one base's access list.
#[derive(Clone, Copy, Debug, Default)]
struct Conflicts {
    /// The most recently inserted conflicting access, if any.
    latest: Option<NodeId>,
    /// The lowest timestep the new access may be assigned.
    floor: u32,
}

// DISJOINT SET
// ================================================================================================

/// Union-find over node indices, used to close the sub-DAG equivalence.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self { parent: (0..len).collect() }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            // Path halving keeps the trees shallow without a second pass.
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            // Attach the younger root under the older one so roots stay at low indices.
            let (low, high) = if a < b { (a, b) } else { (b, a) };
            self.parent[high] = low;
        }
    }
}

// HELPER FUNCTIONS
// ================================================================================================

fn oom(_: alloc::collections::TryReserveError) -> FlushError {
    FlushError::OutOfMemory
}
