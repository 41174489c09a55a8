//! A `Block` is a linear sequence of `Instruction`.
//!
//! A `Block` must belong to a `ControlFlowGraph`. Instructions are normally
//! appended by calling the relevant builder method directly on the block,
//! one per opcode.
//!
//! To create a `Block`, call `ControlFlowGraph::new_block`.

use crate::graph;
use crate::il::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A basic block of kestrel IL.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Block {
    /// The index of the block.
    index: usize,
    /// An internal counter for the next block-unique instruction.
    next_instruction_index: usize,
    /// The instructions for this block.
    instructions: Vec<Instruction>,
}

impl Block {
    pub(crate) fn new(index: usize) -> Block {
        Block {
            index,
            next_instruction_index: 0,
            instructions: Vec::new(),
        }
    }

    fn new_instruction_index(&mut self) -> usize {
        let instruction_index = self.next_instruction_index;
        self.next_instruction_index = instruction_index + 1;
        instruction_index
    }

    fn push(&mut self, operation: Operation) {
        let index = self.new_instruction_index();
        self.instructions.push(Instruction::new(index, operation));
    }

    /// Returns the index of this `Block`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the instructions for this `Block`.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns a mutable reference to the instructions for this `Block`.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Returns true if this `Block` has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns an `Instruction` by index, or `None` if the instruction does
    /// not exist.
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions
            .iter()
            .find(|instruction| instruction.index() == index)
    }

    /// Adds a const operation to the end of this block.
    pub fn const_(&mut self, dest: Register, value: i32) {
        self.push(Operation::Const { dest, value });
    }

    /// Adds a const-wide operation to the end of this block.
    pub fn const_wide(&mut self, dest: Register, value: i64) {
        self.push(Operation::ConstWide { dest, value });
    }

    /// Adds a load-param operation to the end of this block.
    pub fn load_param(&mut self, dest: Register) {
        self.push(Operation::LoadParam { dest });
    }

    /// Adds a load-param-wide operation to the end of this block.
    pub fn load_param_wide(&mut self, dest: Register) {
        self.push(Operation::LoadParamWide { dest });
    }

    /// Adds a move operation to the end of this block.
    pub fn move_reg(&mut self, dest: Register, source: Register) {
        self.push(Operation::Move { dest, source });
    }

    /// Adds a move-wide operation to the end of this block.
    pub fn move_wide(&mut self, dest: Register, source: Register) {
        self.push(Operation::MoveWide { dest, source });
    }

    /// Adds a move-result operation to the end of this block.
    pub fn move_result(&mut self, dest: Register) {
        self.push(Operation::MoveResult { dest });
    }

    /// Adds a move-result-wide operation to the end of this block.
    pub fn move_result_wide(&mut self, dest: Register) {
        self.push(Operation::MoveResultWide { dest });
    }

    /// Adds an invoke operation to the end of this block.
    pub fn invoke(&mut self) {
        self.push(Operation::Invoke);
    }

    /// Adds a cmp-long operation to the end of this block.
    pub fn cmp_long(&mut self, dest: Register, left: Register, right: Register) {
        self.push(Operation::CmpLong { dest, left, right });
    }

    /// Adds an add-with-literal operation to the end of this block.
    pub fn add_lit(&mut self, dest: Register, source: Register, literal: i32) {
        self.push(Operation::AddLit {
            dest,
            source,
            literal,
        });
    }

    /// Adds a binary operation to the end of this block.
    pub fn binop(&mut self, op: BinaryOp, dest: Register, left: Register, right: Register) {
        self.push(Operation::Binop {
            op,
            dest,
            left,
            right,
        });
    }

    /// Adds a compare-against-zero branch to the end of this block.
    pub fn if_zero(&mut self, predicate: Predicate, register: Register) {
        self.push(Operation::IfZero {
            predicate,
            register,
        });
    }

    /// Adds a two-register branch to the end of this block.
    pub fn if_test(&mut self, predicate: Predicate, left: Register, right: Register) {
        self.push(Operation::IfTest {
            predicate,
            left,
            right,
        });
    }

    /// Adds a switch to the end of this block.
    pub fn switch(&mut self, register: Register) {
        self.push(Operation::Switch { register });
    }

    /// Adds a return to the end of this block.
    pub fn ret(&mut self, register: Option<Register>) {
        self.push(Operation::Return { register });
    }

    /// Adds a nop to the end of this block.
    pub fn nop(&mut self) {
        self.push(Operation::Nop);
    }
}

impl graph::Vertex for Block {
    fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: 0x{:X} ]", self.index)?;
        for instruction in self.instructions() {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_append_indexed_instructions() {
        let mut block = Block::new(0);
        assert!(block.is_empty());

        block.const_wide(0, 1);
        block.move_wide(2, 0);
        block.binop(BinaryOp::Xor, 4, 2, 0);
        block.move_result_wide(6);
        block.ret(Some(6));

        assert_eq!(block.instructions().len(), 5);
        assert_eq!(
            block.instruction(1).map(Instruction::operation),
            Some(&Operation::MoveWide { dest: 2, source: 0 })
        );
        assert_eq!(
            block.instruction(4).map(Instruction::operation),
            Some(&Operation::Return { register: Some(6) })
        );
        assert_eq!(block.instruction(5), None);
    }
}
