//! A fixed-point engine for forward data-flow analysis.

use crate::analysis::domain::AbstractDomain;
use crate::il::{ControlFlowGraph, Edge, Instruction};
use crate::Error;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};

const MAX_ANALYSIS_STEPS: usize = 250_000;

/// A trait which implements a forward, flow-sensitive analysis to a
/// fixed point.
pub trait FixedPointAnalysis<State: AbstractDomain> {
    /// Apply the abstract semantics of one instruction to the state.
    fn analyze_instruction(&self, instruction: &Instruction, state: &mut State);

    /// Refine the state along an outgoing edge of a block.
    ///
    /// The default performs no refinement.
    fn analyze_edge(&self, cfg: &ControlFlowGraph, edge: &Edge, state: &mut State) {
        let _ = (cfg, edge, state);
    }
}

/// A work-list fixed-point iterator with widening at loop heads.
///
/// The in-state of a block is the join over its incoming edges of the
/// edge-refined out-state of each predecessor; a bottom contribution is the
/// identity of that join and is simply dropped. Blocks are processed in
/// reverse post-order, and in-states of loop heads are widened against
/// their previous value, which bounds every ascending chain.
pub struct FixpointIterator<Analysis, State> {
    analysis: Analysis,
    entry_states: BTreeMap<usize, State>,
    exit_states: BTreeMap<usize, State>,
    completed: bool,
}

impl<Analysis, State> FixpointIterator<Analysis, State>
where
    Analysis: FixedPointAnalysis<State>,
    State: AbstractDomain,
{
    pub fn new(analysis: Analysis) -> FixpointIterator<Analysis, State> {
        FixpointIterator {
            analysis,
            entry_states: BTreeMap::new(),
            exit_states: BTreeMap::new(),
            completed: false,
        }
    }

    /// Runs the analysis over `cfg` to a fixed point, seeding the entry
    /// block with `initial_state`.
    pub fn run(&mut self, cfg: &ControlFlowGraph, initial_state: State) -> Result<(), Error> {
        self.entry_states.clear();
        self.exit_states.clear();
        self.completed = false;

        let entry = cfg.entry().ok_or(Error::FixedPointRequiresEntry)?;
        let order = cfg.graph().reverse_post_order(entry)?;
        let position: BTreeMap<usize, usize> = order
            .iter()
            .enumerate()
            .map(|(position, block)| (*block, position))
            .collect();
        let loop_heads = cfg.graph().loop_heads(entry)?;

        let mut queue: BTreeSet<usize> = BTreeSet::new();
        queue.insert(0);

        let mut steps = 0;
        while let Some(current) = queue.iter().next().copied() {
            queue.remove(&current);
            if steps > MAX_ANALYSIS_STEPS {
                return Err(Error::FixedPointMaxSteps);
            }
            steps += 1;

            let index = order[current];

            let mut state = if index == entry {
                initial_state.clone()
            } else {
                State::bottom()
            };
            for edge in cfg.edges_in(index)? {
                match self.exit_states.get(&edge.head()) {
                    Some(exit_state) if !exit_state.is_bottom() => {
                        let mut contribution = exit_state.clone();
                        self.analysis.analyze_edge(cfg, edge, &mut contribution);
                        state = state.join(&contribution);
                    }
                    Some(_) | None => {}
                }
            }

            if loop_heads.contains(&index) {
                if let Some(previous) = self.entry_states.get(&index) {
                    state = previous.widen(&previous.join(&state));
                }
            }

            if self.entry_states.get(&index) == Some(&state) {
                continue;
            }
            trace!("fixed point: recomputing block 0x{:X}", index);
            self.entry_states.insert(index, state.clone());

            for instruction in cfg.block(index)?.instructions() {
                self.analysis.analyze_instruction(instruction, &mut state);
            }

            let changed = self.exit_states.get(&index) != Some(&state);
            self.exit_states.insert(index, state);
            if changed {
                for edge in cfg.edges_out(index)? {
                    if let Some(successor) = position.get(&edge.tail()) {
                        queue.insert(*successor);
                    }
                }
            }
        }

        self.completed = true;
        Ok(())
    }

    /// The state at entry of the block, or bottom if the block is
    /// unreachable.
    pub fn entry_state_at(&self, block_index: usize) -> State {
        debug_assert!(self.completed, "fixed point queried before run");
        self.entry_states
            .get(&block_index)
            .cloned()
            .unwrap_or_else(State::bottom)
    }

    /// The state at exit of the block, or bottom if the block is
    /// unreachable.
    pub fn exit_state_at(&self, block_index: usize) -> State {
        debug_assert!(self.completed, "fixed point queried before run");
        self.exit_states
            .get(&block_index)
            .cloned()
            .unwrap_or_else(State::bottom)
    }

    /// The state immediately before the given instruction, replayed from
    /// the cached entry state of its block.
    pub fn state_at(
        &self,
        cfg: &ControlFlowGraph,
        block_index: usize,
        instruction_index: usize,
    ) -> Result<State, Error> {
        let mut state = self.entry_state_at(block_index);
        for instruction in cfg.block(block_index)?.instructions() {
            if instruction.index() == instruction_index {
                break;
            }
            self.analysis.analyze_instruction(instruction, &mut state);
        }
        Ok(state)
    }
}
