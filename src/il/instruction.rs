//! An `Operation` is one bytecode opcode with its operands; an
//! `Instruction` is an `Operation` with a block-unique index.

use crate::il::{Register, RESULT_REGISTER};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The comparison performed by a conditional branch.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Predicate {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Predicate {
    /// The predicate holding on the fallthrough side of a branch.
    pub fn negate(self) -> Predicate {
        match self {
            Predicate::Eq => Predicate::Ne,
            Predicate::Ne => Predicate::Eq,
            Predicate::Lt => Predicate::Ge,
            Predicate::Ge => Predicate::Lt,
            Predicate::Gt => Predicate::Le,
            Predicate::Le => Predicate::Gt,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Predicate::Eq => write!(f, "eq"),
            Predicate::Ne => write!(f, "ne"),
            Predicate::Lt => write!(f, "lt"),
            Predicate::Ge => write!(f, "ge"),
            Predicate::Gt => write!(f, "gt"),
            Predicate::Le => write!(f, "le"),
        }
    }
}

/// A 32-bit arithmetic or bitwise operator over two registers.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            BinaryOp::Add => write!(f, "add"),
            BinaryOp::Sub => write!(f, "sub"),
            BinaryOp::Mul => write!(f, "mul"),
            BinaryOp::Div => write!(f, "div"),
            BinaryOp::Rem => write!(f, "rem"),
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Or => write!(f, "or"),
            BinaryOp::Xor => write!(f, "xor"),
            BinaryOp::Shl => write!(f, "shl"),
            BinaryOp::Shr => write!(f, "shr"),
            BinaryOp::Ushr => write!(f, "ushr"),
        }
    }
}

/// An IL Operation.
///
/// A 64-bit value occupies a register pair `(r, r + 1)`; the wide variants
/// name the low register of the pair. Conditional branches and switches name
/// no targets; targets are carried by the block's outgoing edges.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operation {
    /// Load a 32-bit literal into a register.
    Const { dest: Register, value: i32 },
    /// Load a 64-bit literal into a register pair.
    ConstWide { dest: Register, value: i64 },
    /// Bind the next method parameter to a register.
    LoadParam { dest: Register },
    /// Bind the next wide method parameter to a register pair.
    LoadParamWide { dest: Register },
    /// Copy a register.
    Move { dest: Register, source: Register },
    /// Copy a register pair.
    MoveWide { dest: Register, source: Register },
    /// Copy the most recent invoke result into a register.
    MoveResult { dest: Register },
    /// Copy the most recent wide invoke result into a register pair.
    MoveResultWide { dest: Register },
    /// Call a method. The callee is opaque.
    Invoke,
    /// Three-way comparison of two register pairs, producing -1, 0 or 1.
    CmpLong {
        dest: Register,
        left: Register,
        right: Register,
    },
    /// Add a literal to a 32-bit register.
    AddLit {
        dest: Register,
        source: Register,
        literal: i32,
    },
    /// 32-bit arithmetic over two registers.
    Binop {
        op: BinaryOp,
        dest: Register,
        left: Register,
        right: Register,
    },
    /// Branch when the register compares against zero.
    IfZero {
        predicate: Predicate,
        register: Register,
    },
    /// Branch when the two registers compare.
    IfTest {
        predicate: Predicate,
        left: Register,
        right: Register,
    },
    /// Multi-way branch on a register's value.
    Switch { register: Register },
    /// Return from the method.
    Return { register: Option<Register> },
    Nop,
}

impl Operation {
    /// Get the register written by this `Operation`, or `None` if no
    /// register is written directly.
    ///
    /// The high half of a written pair and the result pseudo-register are
    /// not reported.
    pub fn destination(&self) -> Option<Register> {
        match *self {
            Operation::Const { dest, .. }
            | Operation::ConstWide { dest, .. }
            | Operation::LoadParam { dest }
            | Operation::LoadParamWide { dest }
            | Operation::Move { dest, .. }
            | Operation::MoveWide { dest, .. }
            | Operation::MoveResult { dest }
            | Operation::MoveResultWide { dest }
            | Operation::CmpLong { dest, .. }
            | Operation::AddLit { dest, .. }
            | Operation::Binop { dest, .. } => Some(dest),
            Operation::Invoke
            | Operation::IfZero { .. }
            | Operation::IfTest { .. }
            | Operation::Switch { .. }
            | Operation::Return { .. }
            | Operation::Nop => None,
        }
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self,
            Operation::IfZero { .. } | Operation::IfTest { .. }
        )
    }
}

fn register(f: &mut fmt::Formatter, register: Register) -> fmt::Result {
    if register == RESULT_REGISTER {
        write!(f, "vRESULT")
    } else {
        write!(f, "v{}", register)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Operation::Const { dest, value } => {
                write!(f, "const ")?;
                register(f, dest)?;
                write!(f, ", {}", value)
            }
            Operation::ConstWide { dest, value } => {
                write!(f, "const-wide ")?;
                register(f, dest)?;
                write!(f, ", {}", value)
            }
            Operation::LoadParam { dest } => {
                write!(f, "load-param ")?;
                register(f, dest)
            }
            Operation::LoadParamWide { dest } => {
                write!(f, "load-param-wide ")?;
                register(f, dest)
            }
            Operation::Move { dest, source } => {
                write!(f, "move ")?;
                register(f, dest)?;
                write!(f, ", ")?;
                register(f, source)
            }
            Operation::MoveWide { dest, source } => {
                write!(f, "move-wide ")?;
                register(f, dest)?;
                write!(f, ", ")?;
                register(f, source)
            }
            Operation::MoveResult { dest } => {
                write!(f, "move-result ")?;
                register(f, dest)
            }
            Operation::MoveResultWide { dest } => {
                write!(f, "move-result-wide ")?;
                register(f, dest)
            }
            Operation::Invoke => write!(f, "invoke"),
            Operation::CmpLong { dest, left, right } => {
                write!(f, "cmp-long ")?;
                register(f, dest)?;
                write!(f, ", ")?;
                register(f, left)?;
                write!(f, ", ")?;
                register(f, right)
            }
            Operation::AddLit {
                dest,
                source,
                literal,
            } => {
                write!(f, "add-lit ")?;
                register(f, dest)?;
                write!(f, ", ")?;
                register(f, source)?;
                write!(f, ", #{}", literal)
            }
            Operation::Binop {
                op,
                dest,
                left,
                right,
            } => {
                write!(f, "{} ", op)?;
                register(f, dest)?;
                write!(f, ", ")?;
                register(f, left)?;
                write!(f, ", ")?;
                register(f, right)
            }
            Operation::IfZero {
                predicate,
                register: reg,
            } => {
                write!(f, "if-{}z ", predicate)?;
                register(f, reg)
            }
            Operation::IfTest {
                predicate,
                left,
                right,
            } => {
                write!(f, "if-{} ", predicate)?;
                register(f, left)?;
                write!(f, ", ")?;
                register(f, right)
            }
            Operation::Switch { register: reg } => {
                write!(f, "switch ")?;
                register(f, reg)
            }
            Operation::Return { register: Some(reg) } => {
                write!(f, "return ")?;
                register(f, reg)
            }
            Operation::Return { register: None } => write!(f, "return-void"),
            Operation::Nop => write!(f, "nop"),
        }
    }
}

/// An `Operation` with a block-unique index.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Instruction {
    operation: Operation,
    index: usize,
}

impl Instruction {
    pub(crate) fn new(index: usize, operation: Operation) -> Instruction {
        Instruction { operation, index }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X} {}", self.index, self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_negation() {
        assert_eq!(Predicate::Eq.negate(), Predicate::Ne);
        assert_eq!(Predicate::Ne.negate(), Predicate::Eq);
        assert_eq!(Predicate::Lt.negate(), Predicate::Ge);
        assert_eq!(Predicate::Ge.negate(), Predicate::Lt);
        assert_eq!(Predicate::Gt.negate(), Predicate::Le);
        assert_eq!(Predicate::Le.negate(), Predicate::Gt);
    }

    #[test]
    fn destinations() {
        assert_eq!(Operation::Const { dest: 3, value: 0 }.destination(), Some(3));
        assert_eq!(Operation::MoveResult { dest: 1 }.destination(), Some(1));
        assert_eq!(Operation::Invoke.destination(), None);
        assert_eq!(Operation::Return { register: Some(0) }.destination(), None);
        assert_eq!(
            Operation::IfZero {
                predicate: Predicate::Eq,
                register: 0,
            }
            .destination(),
            None
        );
    }

    #[test]
    fn branch_recognition() {
        assert!(Operation::IfZero {
            predicate: Predicate::Lt,
            register: 0,
        }
        .is_conditional_branch());
        assert!(Operation::IfTest {
            predicate: Predicate::Eq,
            left: 0,
            right: 1,
        }
        .is_conditional_branch());
        assert!(!Operation::Switch { register: 0 }.is_conditional_branch());
        assert!(!Operation::Nop.is_conditional_branch());
    }

    #[test]
    fn display() {
        let instruction = Instruction::new(2, Operation::Const { dest: 0, value: -1 });
        assert_eq!(instruction.to_string(), "02 const v0, -1");
        assert_eq!(
            Operation::IfZero {
                predicate: Predicate::Gt,
                register: 4,
            }
            .to_string(),
            "if-gtz v4"
        );
        assert_eq!(
            Operation::MoveResult {
                dest: RESULT_REGISTER,
            }
            .to_string(),
            "move-result vRESULT"
        );
        assert_eq!(Operation::Return { register: None }.to_string(), "return-void");
    }
}
