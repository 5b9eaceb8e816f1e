//! Basic blocks.

use crate::arena::Handle;
use crate::function::Function;
use crate::instruction::Instruction;

/// The owner of a block.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BlockParent {
    /// The module's root block.
    Module,
    Function(Handle<Function>),
    /// A sub-block of an `if`, `loop` or `switch`.
    Control(Handle<Instruction>),
    Detached,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub(crate) instructions: Vec<Handle<Instruction>>,
    pub(crate) parent: BlockParent,
}

impl Block {
    pub(crate) fn new(parent: BlockParent) -> Self {
        Self {
            instructions: Vec::new(),
            parent,
        }
    }

    pub fn instructions(&self) -> &[Handle<Instruction>] {
        &self.instructions
    }

    /// Raw access to the instruction list. Instructions pushed here do not
    /// have their block back-reference updated.
    pub fn instructions_mut(&mut self) -> &mut Vec<Handle<Instruction>> {
        &mut self.instructions
    }

    pub fn parent(&self) -> BlockParent {
        self.parent
    }

    pub fn set_parent(&mut self, parent: BlockParent) {
        self.parent = parent;
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The parent control instruction, if this is a control sub-block.
    pub fn parent_control(&self) -> Option<Handle<Instruction>> {
        match self.parent {
            BlockParent::Control(control) => Some(control),
            _ => None,
        }
    }

    pub fn last(&self) -> Option<Handle<Instruction>> {
        self.instructions.last().copied()
    }
}
