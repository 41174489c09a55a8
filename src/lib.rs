//! Kestrel: analysis and optimization of register-based bytecode.
//!
//! Kestrel is a small framework for implementing analyses and optimizations
//! over a three-address, register-based bytecode intermediate language. A
//! quick synopsis of kestrel's modules:
//!
//! * **analysis** - Abstract domains, a fixed-point engine, and a constant
//!   propagation analysis over kestrel IL.
//! * **graph** - A simple directed graph library.
//! * **il** - Kestrel's intermediate language.
//! * **transformation** - Passes which rewrite the IL using analysis results.
//!
//! ```
//! use kestrel::analysis::constant_propagation::{Config, ConstantPropagation};
//! use kestrel::analysis::domain::ConstantEnvironment;
//! use kestrel::analysis::fixed_point::FixpointIterator;
//! use kestrel::il::{ControlFlowGraph, Predicate};
//! use kestrel::transformation::constant_propagation::Transform;
//!
//! # fn example() -> Result<(), kestrel::Error> {
//! let mut cfg = ControlFlowGraph::new();
//!
//! let head = {
//!     let block = cfg.new_block()?;
//!     block.const_(0, 0);
//!     block.if_zero(Predicate::Eq, 0);
//!     block.index()
//! };
//! let skipped = {
//!     let block = cfg.new_block()?;
//!     block.const_(0, 1);
//!     block.index()
//! };
//! let exit = {
//!     let block = cfg.new_block()?;
//!     block.ret(None);
//!     block.index()
//! };
//!
//! cfg.taken_edge(head, exit)?;
//! cfg.fallthrough_edge(head, skipped)?;
//! cfg.goto_edge(skipped, exit)?;
//! cfg.set_entry(head)?;
//!
//! let mut fixpoint = FixpointIterator::new(ConstantPropagation::new(Config::default()));
//! fixpoint.run(&cfg, ConstantEnvironment::new())?;
//!
//! let stats = Transform::new(Config::default()).apply(&fixpoint, &mut cfg)?;
//! assert_eq!(stats.branches_simplified, 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use thiserror::Error;

pub mod analysis;
pub mod graph;
pub mod il;
pub mod transformation;

/// Kestrel error types.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("the vertex id {0} does not exist in the graph")]
    GraphVertexNotFound(usize),
    #[error("a vertex with id {0} already exists in the graph")]
    DuplicateVertex(usize),
    #[error("the edge from {0} to {1} already exists in the graph")]
    DuplicateEdge(usize, usize),
    #[error("fixed point analysis requires an entry block")]
    FixedPointRequiresEntry,
    #[error("fixed point analysis exceeded the maximum number of steps")]
    FixedPointMaxSteps,
    #[error("block {0} does not end in a conditional branch")]
    NotAConditionalBranch(usize),
}
