//! Constant propagation over kestrel IL.
//!
//! Tracks, per register, a reduced product of a sign interval and a
//! singleton constant, and refines the tracked facts along the out-edges of
//! conditional branches. The transfer functions are total: an opcode whose
//! concrete semantics the analysis does not model writes top to its
//! destination and never fails the analysis.

use crate::analysis::domain::sign::Interval;
use crate::analysis::domain::{AbstractDomain, ConstantEnvironment, SignedConstantDomain};
use crate::analysis::fixed_point::{FixedPointAnalysis, FixpointIterator};
use crate::il::{
    ControlFlowGraph, Edge, EdgeKind, Instruction, Operation, Predicate, Register,
    RESULT_REGISTER,
};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Configuration for constant propagation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Config {
    /// Fold add-with-literal instructions whose source is a known constant.
    pub fold_arithmetic: bool,
}

/// The transfer functions of constant propagation.
#[derive(Clone, Debug)]
pub struct ConstantPropagation {
    config: Config,
}

/// A fixpoint of constant propagation over a control flow graph.
pub type ConstantPropagationFixpoint = FixpointIterator<ConstantPropagation, ConstantEnvironment>;

impl ConstantPropagation {
    pub fn new(config: Config) -> ConstantPropagation {
        ConstantPropagation { config }
    }

    /// Convenience constructor for a fixpoint iterator over this analysis.
    pub fn fixpoint(config: Config) -> ConstantPropagationFixpoint {
        FixpointIterator::new(ConstantPropagation::new(config))
    }

    /// Refine `state` as if the conditional branch `operation` were taken
    /// (or not taken, for the fallthrough side).
    ///
    /// Refinement may prove the edge impossible, collapsing the state to
    /// bottom. Operations other than conditional branches refine nothing.
    pub fn refine_branch(
        &self,
        operation: &Operation,
        taken: bool,
        state: &mut ConstantEnvironment,
    ) {
        if state.is_bottom() {
            return;
        }
        match *operation {
            Operation::IfZero {
                predicate,
                register,
            } => {
                let predicate = if taken { predicate } else { predicate.negate() };
                let refinement = SignedConstantDomain::of_interval(zero_test(predicate));
                state.update(register, |value| value.meet(&refinement));
            }
            Operation::IfTest {
                predicate,
                left,
                right,
            } => {
                let predicate = if taken { predicate } else { predicate.negate() };
                refine_comparison(predicate, left, right, state);
            }
            _ => {}
        }
    }
}

impl FixedPointAnalysis<ConstantEnvironment> for ConstantPropagation {
    fn analyze_instruction(&self, instruction: &Instruction, state: &mut ConstantEnvironment) {
        match *instruction.operation() {
            Operation::Const { dest, value } => {
                state.set(dest, SignedConstantDomain::of(i64::from(value)));
            }
            Operation::ConstWide { dest, value } => {
                // Only the low register of a pair is tracked; the high half
                // is clobbered by the wide write.
                state.set(dest, SignedConstantDomain::of(value));
                state.set(dest + 1, SignedConstantDomain::top());
            }
            Operation::LoadParam { dest } => {
                state.set(dest, SignedConstantDomain::top());
            }
            Operation::LoadParamWide { dest } => {
                state.set(dest, SignedConstantDomain::top());
                state.set(dest + 1, SignedConstantDomain::top());
            }
            Operation::Move { dest, source } => {
                let value = state.get(source);
                state.set(dest, value);
            }
            Operation::MoveWide { dest, source } => {
                let value = state.get(source);
                state.set(dest, value);
                state.set(dest + 1, SignedConstantDomain::top());
            }
            Operation::MoveResult { dest } => {
                let value = state.get(RESULT_REGISTER);
                state.set(dest, value);
                state.set(RESULT_REGISTER, SignedConstantDomain::top());
            }
            Operation::MoveResultWide { dest } => {
                let value = state.get(RESULT_REGISTER);
                state.set(dest, value);
                state.set(dest + 1, SignedConstantDomain::top());
                state.set(RESULT_REGISTER, SignedConstantDomain::top());
            }
            Operation::Invoke => {
                state.set(RESULT_REGISTER, SignedConstantDomain::top());
            }
            Operation::CmpLong { dest, left, right } => {
                let outcome = compare_long(state.get(left), state.get(right));
                state.set(dest, outcome);
            }
            Operation::AddLit {
                dest,
                source,
                literal,
            } => {
                // A fold that would overflow the 32-bit result width is
                // skipped; the destination is unknown rather than wrapped.
                let folded = if self.config.fold_arithmetic {
                    state
                        .get(source)
                        .constant()
                        .and_then(|value| i32::try_from(value).ok())
                        .and_then(|value| value.checked_add(literal))
                } else {
                    None
                };
                match folded {
                    Some(sum) => state.set(dest, SignedConstantDomain::of(i64::from(sum))),
                    None => state.set(dest, SignedConstantDomain::top()),
                }
            }
            Operation::Binop { dest, .. } => {
                state.set(dest, SignedConstantDomain::top());
            }
            Operation::IfZero { .. }
            | Operation::IfTest { .. }
            | Operation::Switch { .. }
            | Operation::Return { .. }
            | Operation::Nop => {}
        }
    }

    fn analyze_edge(&self, cfg: &ControlFlowGraph, edge: &Edge, state: &mut ConstantEnvironment) {
        let taken = match edge.kind() {
            EdgeKind::Taken => true,
            EdgeKind::Fallthrough => false,
            EdgeKind::Goto | EdgeKind::Switch(_) | EdgeKind::Catch => return,
        };
        let operation = match cfg
            .block(edge.head())
            .ok()
            .and_then(|block| block.instructions().last())
        {
            Some(instruction) => *instruction.operation(),
            None => return,
        };
        if !operation.is_conditional_branch() {
            return;
        }
        match cfg.branch_targets(edge.head()) {
            Ok(Some((taken_target, fallthrough_target))) => {
                // A branch to the immediately following block has the same
                // successor on both edges; the two refinements would meet
                // again at that successor, so neither may be applied.
                if taken_target == fallthrough_target {
                    return;
                }
            }
            Ok(None) | Err(_) => {
                debug_assert!(false, "conditional branch without both successors");
                return;
            }
        }
        self.refine_branch(&operation, taken, state);
    }
}

/// The integers for which `n <predicate> 0` holds.
fn zero_test(predicate: Predicate) -> Interval {
    match predicate {
        Predicate::Eq => Interval::Eqz,
        Predicate::Ne => Interval::Nez,
        Predicate::Lt => Interval::Ltz,
        Predicate::Ge => Interval::Gez,
        Predicate::Gt => Interval::Gtz,
        Predicate::Le => Interval::Lez,
    }
}

/// Refines the operands of a two-register comparison known to hold.
///
/// Equality meets both operands with each other. The ordered predicates
/// refine the left operand from the extrema of the right one, and detect an
/// impossible comparison from the extrema alone; refining the right operand
/// as well would be sound but is deliberately left conservative.
fn refine_comparison(
    predicate: Predicate,
    left: Register,
    right: Register,
    state: &mut ConstantEnvironment,
) {
    let a = state.get(left);
    let b = state.get(right);
    match predicate {
        Predicate::Eq => {
            let met = a.meet(&b);
            state.set(left, met);
            state.set(right, met);
        }
        Predicate::Ne => {
            if let (Some(x), Some(y)) = (a.constant(), b.constant()) {
                if x == y {
                    state.set_to_bottom();
                }
                return;
            }
            // The only representable disequality is against zero.
            let nez = SignedConstantDomain::of_interval(Interval::Nez);
            if a.interval() == Interval::Eqz {
                state.update(right, |value| value.meet(&nez));
            }
            if b.interval() == Interval::Eqz {
                state.update(left, |value| value.meet(&nez));
            }
        }
        Predicate::Lt => {
            if a.min_element() >= b.max_element() {
                state.set_to_bottom();
            } else {
                let bound = Interval::upper_bounded(b.max_element() - 1);
                state.update(left, |value| {
                    value.meet(&SignedConstantDomain::of_interval(bound))
                });
            }
        }
        Predicate::Le => {
            if a.min_element() > b.max_element() {
                state.set_to_bottom();
            } else {
                let bound = Interval::upper_bounded(b.max_element());
                state.update(left, |value| {
                    value.meet(&SignedConstantDomain::of_interval(bound))
                });
            }
        }
        Predicate::Gt => {
            if a.max_element() <= b.min_element() {
                state.set_to_bottom();
            } else {
                let bound = Interval::lower_bounded(b.min_element() + 1);
                state.update(left, |value| {
                    value.meet(&SignedConstantDomain::of_interval(bound))
                });
            }
        }
        Predicate::Ge => {
            if a.max_element() < b.min_element() {
                state.set_to_bottom();
            } else {
                let bound = Interval::lower_bounded(b.min_element());
                state.update(left, |value| {
                    value.meet(&SignedConstantDomain::of_interval(bound))
                });
            }
        }
    }
}

/// The sign of `left - right` over register pairs, as a join of the
/// outcomes the operand extrema admit.
fn compare_long(
    left: SignedConstantDomain,
    right: SignedConstantDomain,
) -> SignedConstantDomain {
    if left.is_bottom() || right.is_bottom() {
        return SignedConstantDomain::bottom();
    }
    let mut outcome = SignedConstantDomain::bottom();
    if left.min_element() < right.max_element() {
        outcome = outcome.join(&SignedConstantDomain::of(-1));
    }
    if left.min_element() <= right.max_element() && right.min_element() <= left.max_element() {
        outcome = outcome.join(&SignedConstantDomain::of(0));
    }
    if left.max_element() > right.min_element() {
        outcome = outcome.join(&SignedConstantDomain::of(1));
    }
    outcome
}

#[cfg(test)]
use crate::Error;

#[cfg(test)]
fn analyze(operations: &[Operation]) -> ConstantEnvironment {
    let analysis = ConstantPropagation::new(Config {
        fold_arithmetic: true,
    });
    let mut state = ConstantEnvironment::new();
    for (index, operation) in operations.iter().enumerate() {
        analysis.analyze_instruction(&Instruction::new(index, *operation), &mut state);
    }
    state
}

#[test]
fn constants_and_moves() {
    let state = analyze(&[
        Operation::Const { dest: 0, value: 7 },
        Operation::Move { dest: 1, source: 0 },
        Operation::Const { dest: 0, value: -3 },
    ]);
    assert_eq!(state.get(0), SignedConstantDomain::of(-3));
    assert_eq!(state.get(1), SignedConstantDomain::of(7));
}

#[test]
fn wide_writes_clobber_the_high_register() {
    let state = analyze(&[
        Operation::Const { dest: 1, value: 9 },
        Operation::ConstWide { dest: 0, value: 5 },
    ]);
    assert_eq!(state.get(0), SignedConstantDomain::of(5));
    // v1 is the high half of the pair and is no longer known.
    assert_eq!(state.get(1), SignedConstantDomain::top());

    let state = analyze(&[
        Operation::ConstWide { dest: 0, value: 5 },
        Operation::MoveWide { dest: 2, source: 0 },
    ]);
    assert_eq!(state.get(2), SignedConstantDomain::of(5));
    assert_eq!(state.get(3), SignedConstantDomain::top());
}

#[test]
fn invoke_result_protocol() {
    let state = analyze(&[Operation::Invoke, Operation::MoveResult { dest: 0 }]);
    assert_eq!(state.get(0), SignedConstantDomain::top());
    assert_eq!(state.get(RESULT_REGISTER), SignedConstantDomain::top());

    // A move-result consumes the pending result.
    let state = analyze(&[
        Operation::Invoke,
        Operation::MoveResultWide { dest: 0 },
        Operation::MoveResult { dest: 2 },
    ]);
    assert_eq!(state.get(2), SignedConstantDomain::top());
}

#[test]
fn unmodeled_arithmetic_is_top() {
    use crate::il::BinaryOp;
    let state = analyze(&[
        Operation::Const { dest: 0, value: 1 },
        Operation::Const { dest: 1, value: 2 },
        Operation::Binop {
            op: BinaryOp::Add,
            dest: 2,
            left: 0,
            right: 1,
        },
    ]);
    assert_eq!(state.get(2), SignedConstantDomain::top());
    assert_eq!(state.get(0), SignedConstantDomain::of(1));
}

#[test]
fn add_lit_folds_and_skips_overflow() {
    let state = analyze(&[
        Operation::Const {
            dest: 0,
            value: i32::MAX - 1,
        },
        Operation::AddLit {
            dest: 0,
            source: 0,
            literal: 1,
        },
    ]);
    assert_eq!(
        state.get(0),
        SignedConstantDomain::of(i64::from(i32::MAX))
    );

    let state = analyze(&[
        Operation::Const {
            dest: 0,
            value: i32::MAX,
        },
        Operation::AddLit {
            dest: 0,
            source: 0,
            literal: 1,
        },
    ]);
    assert_eq!(state.get(0), SignedConstantDomain::top());
}

#[test]
fn add_lit_without_folding_is_top() {
    let analysis = ConstantPropagation::new(Config::default());
    let mut state = ConstantEnvironment::new();
    analysis.analyze_instruction(
        &Instruction::new(0, Operation::Const { dest: 0, value: 3 }),
        &mut state,
    );
    analysis.analyze_instruction(
        &Instruction::new(
            1,
            Operation::AddLit {
                dest: 1,
                source: 0,
                literal: 1,
            },
        ),
        &mut state,
    );
    assert_eq!(state.get(1), SignedConstantDomain::top());
}

#[test]
fn cmp_long_outcomes() {
    let of = SignedConstantDomain::of;
    let of_interval = SignedConstantDomain::of_interval;

    assert_eq!(compare_long(of(0), of(1)), of(-1));
    assert_eq!(compare_long(of(1), of(1)), of(0));
    assert_eq!(compare_long(of(1), of(0)), of(1));
    // A known ordering between intervals still decides the comparison.
    assert_eq!(
        compare_long(of_interval(Interval::Ltz), of_interval(Interval::Gez)),
        of(-1)
    );
    // gez compared against zero admits equal and greater.
    assert_eq!(
        compare_long(of_interval(Interval::Gez), of(0)),
        of_interval(Interval::Gez)
    );
    assert_eq!(
        compare_long(of_interval(Interval::All), of(0)),
        of_interval(Interval::All)
    );
}

#[test]
fn branch_refinement_against_zero() {
    let analysis = ConstantPropagation::new(Config::default());
    let branch = Operation::IfZero {
        predicate: Predicate::Ge,
        register: 0,
    };

    let mut taken = ConstantEnvironment::new();
    analysis.refine_branch(&branch, true, &mut taken);
    assert_eq!(
        taken.get(0),
        SignedConstantDomain::of_interval(Interval::Gez)
    );

    let mut fallthrough = ConstantEnvironment::new();
    analysis.refine_branch(&branch, false, &mut fallthrough);
    assert_eq!(
        fallthrough.get(0),
        SignedConstantDomain::of_interval(Interval::Ltz)
    );

    // Refinement contradicting a known constant proves the edge dead.
    let mut state = ConstantEnvironment::new();
    state.set(0, SignedConstantDomain::of(-1));
    analysis.refine_branch(&branch, true, &mut state);
    assert!(state.is_bottom());
}

#[test]
fn branch_refinement_between_registers() {
    let analysis = ConstantPropagation::new(Config::default());
    let less_than = Operation::IfTest {
        predicate: Predicate::Lt,
        left: 0,
        right: 1,
    };

    // v0 < v1 with v1 == 0 bounds v0 below zero.
    let mut state = ConstantEnvironment::new();
    state.set(1, SignedConstantDomain::of(0));
    analysis.refine_branch(&less_than, true, &mut state);
    assert_eq!(
        state.get(0),
        SignedConstantDomain::of_interval(Interval::Ltz)
    );

    // v0 >= v1 with v0 == 0, v1 == 1 is impossible.
    let mut state = ConstantEnvironment::new();
    state.set(0, SignedConstantDomain::of(0));
    state.set(1, SignedConstantDomain::of(1));
    analysis.refine_branch(&less_than, false, &mut state);
    assert!(state.is_bottom());

    // Equality meets the operands with each other.
    let equal = Operation::IfTest {
        predicate: Predicate::Eq,
        left: 0,
        right: 1,
    };
    let mut state = ConstantEnvironment::new();
    state.set(0, SignedConstantDomain::of(0));
    analysis.refine_branch(&equal, true, &mut state);
    assert_eq!(state.get(1), SignedConstantDomain::of(0));

    // Disequality against zero leaves the nonzero interval.
    let mut state = ConstantEnvironment::new();
    state.set(0, SignedConstantDomain::of(0));
    analysis.refine_branch(&equal, false, &mut state);
    assert_eq!(
        state.get(1),
        SignedConstantDomain::of_interval(Interval::Nez)
    );
}

#[test]
fn white_box_branches() {
    // load-param v0
    // const v1 0
    // const v2 1
    // move v3 v1
    // if-eqz v0 L
    // const v2 0
    // if-gez v0 L      (both targets are L)
    // L: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.load_param(0);
        block.const_(1, 0);
        block.const_(2, 1);
        block.move_reg(3, 1);
        block.if_zero(Predicate::Eq, 0);
        block.index()
    };
    let middle = {
        let block = cfg.new_block().unwrap();
        block.const_(2, 0);
        block.if_zero(Predicate::Ge, 0);
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.taken_edge(head, exit).unwrap();
    cfg.fallthrough_edge(head, middle).unwrap();
    cfg.taken_edge(middle, exit).unwrap();
    cfg.fallthrough_edge(middle, exit).unwrap();
    cfg.set_entry(head).unwrap();
    cfg.set_exit(exit).unwrap();

    let mut fixpoint = ConstantPropagation::fixpoint(Config::default());
    fixpoint.run(&cfg, ConstantEnvironment::new()).unwrap();

    let exit_state = fixpoint.exit_state_at(cfg.exit().unwrap());
    assert_eq!(exit_state.get(0), SignedConstantDomain::top());
    assert_eq!(exit_state.get(1), SignedConstantDomain::of(0));
    // v2 can contain either the value 0 or 1.
    assert_eq!(
        exit_state.get(2),
        SignedConstantDomain::of_interval(Interval::Gez)
    );
    assert_eq!(exit_state.get(3), SignedConstantDomain::of(0));

    // The middle block knows v0 is nonzero from the failed if-eqz.
    let middle_entry = fixpoint.entry_state_at(middle);
    assert_eq!(
        middle_entry.get(0),
        SignedConstantDomain::of_interval(Interval::Nez)
    );
    // Replay inside the block: before its branch, v2 is zero again.
    let branch_index = cfg.block(middle).unwrap().instruction(1).unwrap().index();
    let before_branch = fixpoint.state_at(&cfg, middle, branch_index).unwrap();
    assert_eq!(before_branch.get(2), SignedConstantDomain::of(0));
}

#[test]
fn white_box_loop() {
    // load-param v0
    // loop: const v1 0
    // if-gez v0 L
    // goto loop
    // L: return-void
    let mut cfg = ControlFlowGraph::new();
    let head = {
        let block = cfg.new_block().unwrap();
        block.load_param(0);
        block.index()
    };
    let loop_head = {
        let block = cfg.new_block().unwrap();
        block.const_(1, 0);
        block.if_zero(Predicate::Ge, 0);
        block.index()
    };
    let latch = {
        let block = cfg.new_block().unwrap();
        block.index()
    };
    let exit = {
        let block = cfg.new_block().unwrap();
        block.ret(None);
        block.index()
    };
    cfg.goto_edge(head, loop_head).unwrap();
    cfg.taken_edge(loop_head, exit).unwrap();
    cfg.fallthrough_edge(loop_head, latch).unwrap();
    cfg.goto_edge(latch, loop_head).unwrap();
    cfg.set_entry(head).unwrap();
    cfg.set_exit(exit).unwrap();

    let mut fixpoint = ConstantPropagation::fixpoint(Config::default());
    fixpoint.run(&cfg, ConstantEnvironment::new()).unwrap();

    let exit_state = fixpoint.exit_state_at(cfg.exit().unwrap());
    assert_eq!(
        exit_state.get(0),
        SignedConstantDomain::of_interval(Interval::Gez)
    );
    assert_eq!(exit_state.get(1), SignedConstantDomain::of(0));
}

#[test]
fn run_requires_an_entry() {
    let mut cfg = ControlFlowGraph::new();
    let block = cfg.new_block().unwrap();
    block.ret(None);

    let mut fixpoint = ConstantPropagation::fixpoint(Config::default());
    assert_eq!(
        fixpoint.run(&cfg, ConstantEnvironment::new()),
        Err(Error::FixedPointRequiresEntry)
    );
}
