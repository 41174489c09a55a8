//! Rewrites code using a converged constant-propagation fixpoint.
//!
//! Two rewrites are performed. A conditional branch which the analysis
//! proves one-sided is replaced by an unconditional transfer to its only
//! feasible successor. An add-with-literal whose result is a known constant
//! is replaced by a const load of that constant. Unreachable blocks are
//! left alone; removing them belongs to dead code elimination.

use crate::analysis::constant_propagation::{Config, ConstantPropagation};
use crate::analysis::domain::{AbstractDomain, ConstantEnvironment};
use crate::analysis::fixed_point::{FixedPointAnalysis, FixpointIterator};
use crate::il::{ControlFlowGraph, Operation};
use crate::Error;
use log::debug;
use serde::{Deserialize, Serialize};

/// Counts of the rewrites applied by `Transform::apply`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Stats {
    pub branches_simplified: usize,
    pub instructions_folded: usize,
}

/// The constant-propagation transform.
pub struct Transform {
    config: Config,
}

impl Transform {
    pub fn new(config: Config) -> Transform {
        Transform { config }
    }

    /// Rewrites `cfg` in place using the converged `fixpoint`, which must
    /// have been run over this graph with the same configuration.
    pub fn apply(
        &self,
        fixpoint: &FixpointIterator<ConstantPropagation, ConstantEnvironment>,
        cfg: &mut ControlFlowGraph,
    ) -> Result<Stats, Error> {
        let analysis = ConstantPropagation::new(self.config);
        let mut stats = Stats::default();

        let block_indices: Vec<usize> = cfg.blocks().iter().map(|block| block.index()).collect();
        for index in block_indices {
            let mut state = fixpoint.entry_state_at(index);
            if state.is_bottom() {
                continue;
            }

            // Replay the block, folding add-lit results as they prove
            // constant. The replacement const has the same abstract
            // semantics, so the replay state stays valid.
            let instruction_count = cfg.block(index)?.instructions().len();
            for position in 0..instruction_count {
                let instruction = cfg.block(index)?.instructions()[position].clone();
                analysis.analyze_instruction(&instruction, &mut state);
                if !self.config.fold_arithmetic {
                    continue;
                }
                if let Operation::AddLit { dest, .. } = *instruction.operation() {
                    if let Some(value) = state.get(dest).constant() {
                        // The fold already refused overflowing sums, so the
                        // constant fits the 32-bit const operand.
                        let folded = Operation::Const {
                            dest,
                            value: value as i32,
                        };
                        *cfg.block_mut(index)?.instructions_mut()[position].operation_mut() =
                            folded;
                        stats.instructions_folded += 1;
                    }
                }
            }

            let operation = match cfg.block(index)?.instructions().last() {
                Some(instruction) if instruction.operation().is_conditional_branch() => {
                    *instruction.operation()
                }
                _ => continue,
            };
            let (taken, fallthrough) = match cfg.branch_targets(index)? {
                Some(targets) => targets,
                None => {
                    debug_assert!(false, "conditional branch without both successors");
                    continue;
                }
            };

            let mut taken_state = state.clone();
            analysis.refine_branch(&operation, true, &mut taken_state);
            let mut fallthrough_state = state;
            analysis.refine_branch(&operation, false, &mut fallthrough_state);

            if fallthrough_state.is_bottom() && !taken_state.is_bottom() {
                cfg.replace_branch_with_goto(index, taken)?;
                stats.branches_simplified += 1;
            } else if taken_state.is_bottom() && !fallthrough_state.is_bottom() {
                cfg.replace_branch_with_goto(index, fallthrough)?;
                stats.branches_simplified += 1;
            }
        }

        debug!(
            "constant propagation: simplified {} branches, folded {} instructions",
            stats.branches_simplified, stats.instructions_folded
        );
        Ok(stats)
    }
}

#[cfg(test)]
use crate::analysis::domain::ConstantEnvironment as Environment;
#[cfg(test)]
use crate::il::{EdgeKind, Predicate};

#[cfg(test)]
fn propagate(cfg: &mut ControlFlowGraph, config: Config) -> Stats {
    let mut fixpoint = ConstantPropagation::fixpoint(config);
    fixpoint.run(cfg, Environment::new()).unwrap();
    Transform::new(config).apply(&fixpoint, cfg).unwrap()
}

#[cfg(test)]
fn operations(cfg: &ControlFlowGraph, block: usize) -> Vec<Operation> {
    cfg.block(block)
        .unwrap()
        .instructions()
        .iter()
        .map(|instruction| *instruction.operation())
        .collect()
}

#[cfg(test)]
fn out_edges(cfg: &ControlFlowGraph, block: usize) -> Vec<(usize, EdgeKind)> {
    cfg.edges_out(block)
        .unwrap()
        .iter()
        .map(|edge| (edge.tail(), edge.kind()))
        .collect()
}

#[test]
fn if_to_goto() {
    // const v0 0
    // if-eqz v0 L
    // const v0 1
    // L: const v0 2
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 0);
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let skipped = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 1);
        block.index()
    };
    let target = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 2);
        block.index()
    };
    cfg.taken_edge(head, target).unwrap();
    cfg.fallthrough_edge(head, skipped).unwrap();
    cfg.goto_edge(skipped, target).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 1);
    assert_eq!(stats.instructions_folded, 0);
    assert_eq!(
        operations(&cfg, head),
        vec![Operation::Const { dest: 0, value: 0 }]
    );
    assert_eq!(out_edges(&cfg, head), vec![(target, EdgeKind::Goto)]);
    // The now-unreachable block is not this pass's business.
    assert_eq!(
        operations(&cfg, skipped),
        vec![Operation::Const { dest: 0, value: 1 }]
    );
    assert_eq!(out_edges(&cfg, skipped), vec![(target, EdgeKind::Goto)]);
}

#[test]
fn equals_always_true() {
    // const v0 0
    // const v1 0
    // if-eqz v0 L1
    // const v1 1          ; unreachable
    // L1: if-eqz v1 L2    ; always true
    // const v1 2
    // L2: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 0);
        block.const_(1, 0);
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let dead = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 1);
        block.index()
    };
    let second = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Eq, 1);
        block.index()
    };
    let skipped = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 2);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, second).unwrap();
    cfg.fallthrough_edge(head, dead).unwrap();
    cfg.goto_edge(dead, second).unwrap();
    cfg.taken_edge(second, exit).unwrap();
    cfg.fallthrough_edge(second, skipped).unwrap();
    cfg.goto_edge(skipped, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 2);
    assert_eq!(out_edges(&cfg, head), vec![(second, EdgeKind::Goto)]);
    assert!(operations(&cfg, second).is_empty());
    assert_eq!(out_edges(&cfg, second), vec![(exit, EdgeKind::Goto)]);
}

#[test]
fn equals_always_false() {
    // const v0 1
    // const v1 1
    // if-eqz v0 L1        ; never taken
    // const v1 0
    // L1: if-eqz v1 L2    ; therefore always true
    // const v1 2
    // L2: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 1);
        block.const_(1, 1);
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let reset = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 0);
        block.index()
    };
    let second = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Eq, 1);
        block.index()
    };
    let skipped = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 2);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, second).unwrap();
    cfg.fallthrough_edge(head, reset).unwrap();
    cfg.goto_edge(reset, second).unwrap();
    cfg.taken_edge(second, exit).unwrap();
    cfg.fallthrough_edge(second, skipped).unwrap();
    cfg.goto_edge(skipped, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 2);
    // The never-taken branch falls through to the reset block.
    assert_eq!(out_edges(&cfg, head), vec![(reset, EdgeKind::Goto)]);
    // v1 is zero on the only reachable path, so the second branch is taken.
    assert_eq!(out_edges(&cfg, second), vec![(exit, EdgeKind::Goto)]);
}

#[test]
fn less_than_always_true() {
    // const v0 0
    // const v1 1
    // if-lt v0 v1 L1      ; always taken
    // const v1 0
    // L1: if-eqz v1 L2    ; never taken: v1 == 1 here
    // const v1 2
    // L2: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 0);
        block.const_(1, 1);
        block.if_test(Predicate::Lt, 0, 1);
        block.index()
    };
    let dead = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 0);
        block.index()
    };
    let second = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Eq, 1);
        block.index()
    };
    let tail = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 2);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, second).unwrap();
    cfg.fallthrough_edge(head, dead).unwrap();
    cfg.goto_edge(dead, second).unwrap();
    cfg.taken_edge(second, exit).unwrap();
    cfg.fallthrough_edge(second, tail).unwrap();
    cfg.goto_edge(tail, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 2);
    assert_eq!(out_edges(&cfg, head), vec![(second, EdgeKind::Goto)]);
    // The second branch is deleted and control falls into the tail block.
    assert!(operations(&cfg, second).is_empty());
    assert_eq!(out_edges(&cfg, second), vec![(tail, EdgeKind::Goto)]);
    assert_eq!(
        operations(&cfg, tail),
        vec![Operation::Const { dest: 1, value: 2 }]
    );
}

#[test]
fn less_than_always_false() {
    // const v0 1
    // const v1 0
    // if-lt v0 v1 L1      ; never taken
    // const v0 0
    // L1: if-eqz v0 L2    ; therefore always true
    // const v1 2
    // L2: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 1);
        block.const_(1, 0);
        block.if_test(Predicate::Lt, 0, 1);
        block.index()
    };
    let reset = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 0);
        block.index()
    };
    let second = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let skipped = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 2);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, second).unwrap();
    cfg.fallthrough_edge(head, reset).unwrap();
    cfg.goto_edge(reset, second).unwrap();
    cfg.taken_edge(second, exit).unwrap();
    cfg.fallthrough_edge(second, skipped).unwrap();
    cfg.goto_edge(skipped, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 2);
    assert_eq!(out_edges(&cfg, head), vec![(reset, EdgeKind::Goto)]);
    assert_eq!(out_edges(&cfg, second), vec![(exit, EdgeKind::Goto)]);
}

#[test]
fn infer_zero() {
    // load-param v0
    // if-nez v0 E
    // if-eqz v0 E   ; v0 must be zero here, so this is always true
    // const v0 1
    // E: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.load_param(0);
        block.if_zero(Predicate::Ne, 0);
        block.index()
    };
    let second = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let skipped = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 1);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, exit).unwrap();
    cfg.fallthrough_edge(head, second).unwrap();
    cfg.taken_edge(second, exit).unwrap();
    cfg.fallthrough_edge(second, skipped).unwrap();
    cfg.goto_edge(skipped, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 1);
    // The first branch learns nothing and is kept.
    assert_eq!(
        operations(&cfg, head),
        vec![
            Operation::LoadParam { dest: 0 },
            Operation::IfZero {
                predicate: Predicate::Ne,
                register: 0,
            },
        ]
    );
    assert_eq!(out_edges(&cfg, second), vec![(exit, EdgeKind::Goto)]);
}

#[test]
fn infer_interval() {
    // load-param v0
    // if-lez v0 E
    // if-gtz v0 E   ; v0 must be > 0 here, so this is always true
    // const v0 1
    // E: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.load_param(0);
        block.if_zero(Predicate::Le, 0);
        block.index()
    };
    let second = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Gt, 0);
        block.index()
    };
    let skipped = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 1);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, exit).unwrap();
    cfg.fallthrough_edge(head, second).unwrap();
    cfg.taken_edge(second, exit).unwrap();
    cfg.fallthrough_edge(second, skipped).unwrap();
    cfg.goto_edge(skipped, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 1);
    assert_eq!(out_edges(&cfg, second), vec![(exit, EdgeKind::Goto)]);
}

#[test]
fn jump_to_immediate_next() {
    // load-param v0
    // if-eqz v0 N   ; both successors are the same block
    // N: if-eqz v0 E
    // const v0 1
    // E: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.load_param(0);
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let next = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let tail = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 1);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, next).unwrap();
    cfg.fallthrough_edge(head, next).unwrap();
    cfg.taken_edge(next, exit).unwrap();
    cfg.fallthrough_edge(next, tail).unwrap();
    cfg.goto_edge(tail, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    // No refinement crosses the duplicated edge, so nothing changes.
    assert_eq!(stats, Stats::default());
    assert_eq!(
        out_edges(&cfg, head),
        vec![(next, EdgeKind::Taken), (next, EdgeKind::Fallthrough)]
    );
    assert_eq!(
        operations(&cfg, next),
        vec![Operation::IfZero {
            predicate: Predicate::Eq,
            register: 0,
        }]
    );
}

#[test]
fn fold_arithmetic_add_lit() {
    // const v0 2147483646
    // add-lit v0 v0 1     ; becomes const v0 2147483647
    // const v1 2147483647
    // if-eq v0 v1 E       ; always taken
    // const v0 2147483647
    // add-lit v0 v0 1     ; would overflow: unreachable and left intact
    // E: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, i32::MAX - 1);
        block.add_lit(0, 0, 1);
        block.const_(1, i32::MAX);
        block.if_test(Predicate::Eq, 0, 1);
        block.index()
    };
    let overflow = {
        let block = cfg.new_block().unwrap();
        block.const_(0, i32::MAX);
        block.add_lit(0, 0, 1);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, exit).unwrap();
    cfg.fallthrough_edge(head, overflow).unwrap();
    cfg.goto_edge(overflow, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let config = Config {
        fold_arithmetic: true,
    };
    let stats = propagate(&mut cfg, config);

    assert_eq!(stats.branches_simplified, 1);
    assert_eq!(stats.instructions_folded, 1);
    assert_eq!(
        operations(&cfg, head),
        vec![
            Operation::Const {
                dest: 0,
                value: i32::MAX - 1,
            },
            Operation::Const {
                dest: 0,
                value: i32::MAX,
            },
            Operation::Const {
                dest: 1,
                value: i32::MAX,
            },
        ]
    );
    assert_eq!(out_edges(&cfg, head), vec![(exit, EdgeKind::Goto)]);
    // The overflowing add sits in an unreachable block and is untouched.
    assert_eq!(
        operations(&cfg, overflow),
        vec![
            Operation::Const {
                dest: 0,
                value: i32::MAX,
            },
            Operation::AddLit {
                dest: 0,
                source: 0,
                literal: 1,
            },
        ]
    );
}

#[test]
fn analyze_cmp() {
    // Three arms set (v0, v1) to (0,1) / (1,1) / (1,0), compare the pairs,
    // and test the result against the expected -1 / 0 / 1. Every if-eq
    // becomes a goto.
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.load_param(0);
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let gate = {
        let block = cfg.new_block().unwrap();
        block.if_zero(Predicate::Ge, 0);
        block.index()
    };
    let mut arm = |expected: i32, left: i64, right: i64| {
        let block = cfg.new_block().unwrap();
        block.const_wide(0, left);
        block.const_wide(2, right);
        block.cmp_long(4, 0, 2);
        block.const_(5, expected);
        block.if_test(Predicate::Eq, 4, 5);
        block.index()
    };
    let below = arm(-1, 0, 1);
    let equal = arm(0, 1, 1);
    let above = arm(1, 1, 0);
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(Some(4));
        block.index()
    };
    cfg.taken_edge(head, equal).unwrap();
    cfg.fallthrough_edge(head, gate).unwrap();
    cfg.taken_edge(gate, above).unwrap();
    cfg.fallthrough_edge(gate, below).unwrap();
    cfg.taken_edge(below, exit).unwrap();
    cfg.fallthrough_edge(below, equal).unwrap();
    cfg.taken_edge(equal, exit).unwrap();
    cfg.fallthrough_edge(equal, above).unwrap();
    cfg.taken_edge(above, exit).unwrap();
    cfg.fallthrough_edge(above, exit).unwrap();
    cfg.set_entry(head).unwrap();

    let stats = propagate(&mut cfg, Config::default());

    assert_eq!(stats.branches_simplified, 3);
    for block in [below, equal, above] {
        assert_eq!(out_edges(&cfg, block), vec![(exit, EdgeKind::Goto)]);
        assert!(!operations(&cfg, block)
            .iter()
            .any(Operation::is_conditional_branch));
    }
}

#[test]
fn transform_is_idempotent() {
    let build = || {
        let mut cfg = ControlFlowGraph::new();
        let head = {
            let block = cfg.new_block().unwrap();
            block.const_(0, 0);
            block.add_lit(1, 0, 3);
            block.if_zero(Predicate::Eq, 0);
            block.index()
        };
        let skipped = {
            let block = cfg.new_block().unwrap();
            block.const_(0, 1);
            block.index()
        };
        let exit = {
            let block = cfg.new_block().unwrap();
            block.ret(None);
            block.index()
        };
        cfg.taken_edge(head, exit).unwrap();
        cfg.fallthrough_edge(head, skipped).unwrap();
        cfg.goto_edge(skipped, exit).unwrap();
        cfg.set_entry(head).unwrap();
        cfg
    };

    let config = Config {
        fold_arithmetic: true,
    };

    let mut once = build();
    let first = propagate(&mut once, config);
    assert_eq!(first.branches_simplified, 1);
    assert_eq!(first.instructions_folded, 1);

    let mut twice = once.clone();
    let second = propagate(&mut twice, config);
    assert_eq!(second, Stats::default());
    assert_eq!(once, twice);
}

#[test]
fn switch_and_catch_edges_pass_through() {
    // A switch scrutinee keeps its known value in every case, and facts
    // survive along catch edges unrefined.
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.const_(0, 2);
        block.invoke();
        block.move_result(1);
        block.switch(0);
        block.index()
    };
    let case = {
        let block = cfg.new_block().unwrap();
        block.nop();
        block.index()
    };
    let default = {
        let block = cfg.new_block().unwrap();
        block.load_param_wide(2);
        block.index()
    };
    let handler = {
        let block = cfg.new_block().unwrap();
        block.ret(Some(0));
        block.index()
    };
    cfg.switch_edge(head, case, 2).unwrap();
    cfg.fallthrough_edge(head, default).unwrap();
    cfg.catch_edge(head, handler).unwrap();
    cfg.goto_edge(case, handler).unwrap();
    cfg.goto_edge(default, handler).unwrap();
    cfg.set_entry(head).unwrap();
    cfg.set_exit(handler).unwrap();

    let mut fixpoint = ConstantPropagation::fixpoint(Config::default());
    fixpoint.run(&cfg, Environment::new()).unwrap();

    use crate::analysis::domain::SignedConstantDomain;
    for block in [case, default, handler] {
        assert_eq!(
            fixpoint.entry_state_at(block).get(0),
            SignedConstantDomain::of(2)
        );
    }

    // Nothing here is a conditional branch; the transform is a no-op.
    let stats = Transform::new(Config::default())
        .apply(&fixpoint, &mut cfg)
        .unwrap();
    assert_eq!(stats, Stats::default());
}
