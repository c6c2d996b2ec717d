use core::fmt::{self, Write};

use super::FlowGraph;
use crate::alias::AliasOracle;

// TEXTUAL DUMP
// ================================================================================================

impl FlowGraph {
    /// Writes the graph as a timestep-major table of `id / time / polarity / parents / instr`.
    pub fn write_text(&self, target: &mut dyn Write) -> fmt::Result {
        writeln!(target, "id:\ttime:\tR/W:\tparents:\tinstr:")?;
        let mut timestep = 0;
        loop {
            let mut found = false;
            for (index, node) in self.nodes().iter().enumerate() {
                if node.timestep() != timestep {
                    continue;
                }
                found = true;
                let polarity = if node.kind().is_read() { "R" } else { "W" };
                write!(target, "{index}\t{timestep}\t {polarity} \t[")?;
                for (i, parent) in node.parents().iter().enumerate() {
                    if i > 0 {
                        write!(target, ",")?;
                    }
                    write!(target, "{parent}")?;
                }
                writeln!(
                    target,
                    "]\t{}.{}",
                    node.instruction(),
                    self.opcodes[node.instruction()]
                )?;
            }
            if !found {
                return Ok(());
            }
            timestep += 1;
        }
    }

    /// Writes the graph in DOT format: one cluster per base, conflict edges in red, flow edges
    /// black.
    pub fn write_dot(&self, target: &mut dyn Write, oracle: &dyn AliasOracle) -> fmt::Result {
        writeln!(target, "digraph {{")?;
        writeln!(target, "compound=true;")?;
        for (base, accesses) in &self.bases {
            writeln!(target, "subgraph clusterBASE{base} {{")?;
            writeln!(target, "label=\"{base}\";")?;
            for &id in accesses {
                let node = self.node(id);
                let polarity = if node.kind().is_read() { "R" } else { "W" };
                writeln!(
                    target,
                    "n{id} [label=\"{}{polarity}{}_{}({})\" shape=box style=\"filled,rounded\" \
                     colorscheme=paired12 fillcolor={}]",
                    node.timestep(),
                    node.sub_dag(),
                    self.opcodes[node.instruction()],
                    node.instruction(),
                    node.sub_dag() % 12 + 1,
                )?;
            }
            // Conflict edges between accesses that are not exact matches.
            for (i, &u) in accesses.iter().enumerate() {
                for &v in &accesses[i + 1..] {
                    if !oracle.identical(self.node(u).view(), self.node(v).view()) {
                        writeln!(target, "n{u} -> n{v} [color=red];")?;
                    }
                }
            }
            writeln!(target, "}}")?;
        }
        for (index, node) in self.nodes().iter().enumerate() {
            for parent in node.parents() {
                writeln!(target, "n{parent} -> n{index};")?;
            }
        }
        writeln!(target, "}}")
    }

    /// Dumps the textual form of the graph to the specified path.
    #[cfg(feature = "std")]
    pub fn dump_to_file(&self, path: &std::path::Path) -> std::io::Result<()> {
        use std::io::Write as _;

        let mut text = alloc::string::String::new();
        self.write_text(&mut text).expect("formatting a flow graph cannot fail");
        let mut file = std::fs::File::create(path)?;
        file.write_all(text.as_bytes())
    }
}
