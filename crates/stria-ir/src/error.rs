//! Error types for the stria IR.

use crate::arena::Handle;
use crate::instruction::Instruction;

/// Errors raised when a graph query finds a shape it cannot work with.
///
/// Graph construction itself never fails; these surface when code that
/// walks the graph (transforms, mostly) meets an instruction or value that
/// breaks its assumptions.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// The instruction has no result in the requested slot.
    #[error("{kind} instruction {instruction:?} has no result {index}")]
    MissingResult {
        kind: &'static str,
        instruction: Handle<Instruction>,
        index: usize,
    },

    /// The instruction is not inside any block.
    #[error("{kind} instruction {instruction:?} is not in a block")]
    Detached {
        kind: &'static str,
        instruction: Handle<Instruction>,
    },
}
