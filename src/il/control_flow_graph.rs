//! A `ControlFlowGraph` is a directed `Graph` of `Block` and `Edge`.

use crate::il::*;
use crate::{graph, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed graph of types `Block` and `Edge`.
///
/// # Entry and Exit
/// A `ControlFlowGraph` has an optional, "Entry," and an optional, "Exit."
/// Analyses over the graph require the entry to be set; the exit is a
/// convenience for querying the state a method ends in.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, Default)]
pub struct ControlFlowGraph {
    // The internal graph used to store our blocks.
    graph: graph::Graph<Block, Edge>,
    // The next index to use when creating a basic block.
    next_index: usize,
    // An optional entry index for the graph.
    entry: Option<usize>,
    // An optional exit index for the graph.
    exit: Option<usize>,
}

impl ControlFlowGraph {
    pub fn new() -> ControlFlowGraph {
        ControlFlowGraph {
            graph: graph::Graph::new(),
            next_index: 0,
            entry: None,
            exit: None,
        }
    }

    /// Returns the underlying graph.
    pub fn graph(&self) -> &graph::Graph<Block, Edge> {
        &self.graph
    }

    /// Sets the entry point for this `ControlFlowGraph` to the given `Block`
    /// index.
    pub fn set_entry(&mut self, entry: usize) -> Result<(), Error> {
        if !self.graph.has_vertex(entry) {
            return Err(Error::GraphVertexNotFound(entry));
        }
        self.entry = Some(entry);
        Ok(())
    }

    /// Sets the exit point for this `ControlFlowGraph` to the given `Block`
    /// index.
    pub fn set_exit(&mut self, exit: usize) -> Result<(), Error> {
        if !self.graph.has_vertex(exit) {
            return Err(Error::GraphVertexNotFound(exit));
        }
        self.exit = Some(exit);
        Ok(())
    }

    /// Get the entry `Block` index for this `ControlFlowGraph`.
    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    /// Get the exit `Block` index for this `ControlFlowGraph`.
    pub fn exit(&self) -> Option<usize> {
        self.exit
    }

    /// Get a `Block` by index.
    pub fn block(&self, index: usize) -> Result<&Block, Error> {
        self.graph.vertex(index)
    }

    /// Get a mutable reference to a `Block` by index.
    pub fn block_mut(&mut self, index: usize) -> Result<&mut Block, Error> {
        self.graph.vertex_mut(index)
    }

    /// Get every `Block` in this `ControlFlowGraph`.
    pub fn blocks(&self) -> Vec<&Block> {
        self.graph.vertices()
    }

    /// Get every `Edge` in this `ControlFlowGraph`.
    pub fn edges(&self) -> Vec<&Edge> {
        self.graph.edges()
    }

    /// Get every incoming edge to a block.
    pub fn edges_in(&self, index: usize) -> Result<&[Edge], Error> {
        self.graph.edges_in(index)
    }

    /// Get every outgoing edge from a block.
    pub fn edges_out(&self, index: usize) -> Result<&[Edge], Error> {
        self.graph.edges_out(index)
    }

    /// Creates a new basic block, adds it to the graph, and returns it.
    pub fn new_block(&mut self) -> Result<&mut Block, Error> {
        let next_index = self.next_index;
        self.next_index += 1;
        let block = Block::new(next_index);
        self.graph.insert_vertex(block)?;
        self.graph.vertex_mut(next_index)
    }

    /// Creates an unconditional edge from one block to another block.
    pub fn goto_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph.insert_edge(Edge::new(head, tail, EdgeKind::Goto))
    }

    /// Creates the taken edge of the conditional branch terminating `head`.
    pub fn taken_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph
            .insert_edge(Edge::new(head, tail, EdgeKind::Taken))
    }

    /// Creates the fallthrough edge of the branch or switch terminating
    /// `head`.
    pub fn fallthrough_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph
            .insert_edge(Edge::new(head, tail, EdgeKind::Fallthrough))
    }

    /// Creates a switch-case edge keyed by `key`.
    pub fn switch_edge(&mut self, head: usize, tail: usize, key: i32) -> Result<(), Error> {
        self.graph
            .insert_edge(Edge::new(head, tail, EdgeKind::Switch(key)))
    }

    /// Creates an edge to an exception handler.
    pub fn catch_edge(&mut self, head: usize, tail: usize) -> Result<(), Error> {
        self.graph
            .insert_edge(Edge::new(head, tail, EdgeKind::Catch))
    }

    /// The taken and fallthrough successor indices of the conditional branch
    /// terminating the given block, or `None` if either edge is absent.
    pub fn branch_targets(&self, index: usize) -> Result<Option<(usize, usize)>, Error> {
        let mut taken = None;
        let mut fallthrough = None;
        for edge in self.graph.edges_out(index)? {
            match edge.kind() {
                EdgeKind::Taken => taken = Some(edge.tail()),
                EdgeKind::Fallthrough => fallthrough = Some(edge.tail()),
                _ => {}
            }
        }
        Ok(taken.zip(fallthrough))
    }

    /// Replaces the conditional branch terminating the given block with an
    /// unconditional transfer to `target`.
    ///
    /// The branch instruction is removed, both conditional out-edges are
    /// dropped, and a goto edge to `target` is installed. Catch edges are
    /// unaffected.
    pub fn replace_branch_with_goto(&mut self, index: usize, target: usize) -> Result<(), Error> {
        {
            let block = self.graph.vertex_mut(index)?;
            match block.instructions().last() {
                Some(instruction) if instruction.operation().is_conditional_branch() => {
                    block.instructions_mut().pop();
                }
                _ => return Err(Error::NotAConditionalBranch(index)),
            }
        }
        self.graph.remove_edges_where(index, |edge| {
            matches!(edge.kind(), EdgeKind::Taken | EdgeKind::Fallthrough)
        })?;
        self.graph
            .insert_edge(Edge::new(index, target, EdgeKind::Goto))
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for block in self.blocks() {
            writeln!(f, "{}", block)?;
        }
        for edge in self.edges() {
            writeln!(f, "edge {}", edge)?;
        }
        Ok(())
    }
}
