//! An `Edge` is a control transfer between `Block`s in a `ControlFlowGraph`.
//!
//! Every `Edge` carries an `EdgeKind` describing how control reaches its
//! tail. Unconditional transfers are edges only; there is no goto
//! instruction in the IL. The two out-edges of a conditional branch are
//! tagged `Taken` and `Fallthrough`, and may share a tail.
//!
//! To create a new edge, call the per-kind constructors on
//! `ControlFlowGraph`, such as `ControlFlowGraph::goto_edge`.

use crate::graph;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of control transfer an `Edge` represents.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum EdgeKind {
    /// An unconditional transfer.
    Goto,
    /// Follows a conditional branch whose predicate holds.
    Taken,
    /// Follows a conditional branch whose predicate does not hold.
    Fallthrough,
    /// Follows a switch when the scrutinee equals the case key.
    Switch(i32),
    /// A transfer to an exception handler.
    Catch,
}

/// Edge between IL blocks.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Edge {
    head: usize,
    tail: usize,
    kind: EdgeKind,
}

impl Edge {
    pub(crate) fn new(head: usize, tail: usize, kind: EdgeKind) -> Edge {
        Edge { head, tail, kind }
    }

    /// Retrieve the index of the head `Block` for this `Edge`.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Retrieve the index of the tail `Block` for this `Edge`.
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Retrieve the kind of this `Edge`.
    pub fn kind(&self) -> EdgeKind {
        self.kind
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EdgeKind::Goto => write!(f, "goto"),
            EdgeKind::Taken => write!(f, "taken"),
            EdgeKind::Fallthrough => write!(f, "fallthrough"),
            EdgeKind::Switch(key) => write!(f, "switch {}", key),
            EdgeKind::Catch => write!(f, "catch"),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(0x{:X}->0x{:X}) {}", self.head, self.tail, self.kind)
    }
}

impl graph::Edge for Edge {
    fn head(&self) -> usize {
        self.head
    }
    fn tail(&self) -> usize {
        self.tail
    }
}
