//! Instructions.
//!
//! An [`Instruction`] is an opcode ([`InstKind`]) plus operand and result
//! slots. Operands are value handles; the module records a [`Usage`] on
//! every referenced value so uses can be rewritten in bulk.
//!
//! [`Usage`]: crate::Usage

use crate::arena::Handle;
use crate::block::Block;
use crate::function::Function;
use crate::io::{BindingPoint, IoAttributes};
use crate::value::Value;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    /// Disassembly mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulo => "mod",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Equal => "eq",
            Self::NotEqual => "neq",
            Self::LessThan => "lt",
            Self::GreaterThan => "gt",
            Self::LessThanEqual => "lte",
            Self::GreaterThanEqual => "gte",
            Self::ShiftLeft => "shl",
            Self::ShiftRight => "shr",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessThanEqual => "<=",
            Self::GreaterThanEqual => ">=",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    Complement,
    Negation,
    Not,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Complement => "complement",
            Self::Negation => "negation",
            Self::Not => "not",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Complement => "~",
            Self::Negation => "-",
            Self::Not => "!",
        }
    }
}

/// Declaration data of a `var`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VarInfo {
    pub binding_point: Option<BindingPoint>,
    pub attributes: IoAttributes,
}

/// One `case` of a switch. A `None` selector is `default`.
#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub selectors: Vec<Option<Handle<Value>>>,
    pub block: Handle<Block>,
}

impl SwitchCase {
    pub fn is_default(&self) -> bool {
        self.selectors.iter().any(Option::is_none)
    }
}

/// Operand layout per opcode:
///
/// | kind | operands |
/// |------|----------|
/// | `Var`, `Override` | optional initializer |
/// | `Let`, `Load`, `Convert`, `Bitcast`, `Swizzle`, `Unary` | value |
/// | `Access` | object, indices... |
/// | `Store` | target, value |
/// | `LoadVectorElement` | source, index |
/// | `StoreVectorElement` | target, index, value |
/// | `Binary` | lhs, rhs |
/// | `Call` | function, arguments... |
/// | `If`, `Switch` | condition |
/// | `Return` | optional value |
/// | exits | arguments... |
#[derive(Clone, Debug)]
pub enum InstKind {
    Var(VarInfo),
    Override {
        id: Option<u16>,
    },
    Let,
    Access,
    Load,
    Store,
    LoadVectorElement,
    StoreVectorElement,
    Construct,
    Convert,
    Bitcast,
    Swizzle {
        indices: Vec<u32>,
    },
    Binary(BinaryOp),
    Unary(UnaryOp),
    Call,
    If {
        true_block: Handle<Block>,
        false_block: Handle<Block>,
    },
    Loop {
        initializer: Handle<Block>,
        body: Handle<Block>,
        continuing: Handle<Block>,
    },
    Switch {
        cases: Vec<SwitchCase>,
    },
    Return {
        function: Option<Handle<Function>>,
    },
    ExitIf {
        target: Option<Handle<Instruction>>,
    },
    ExitLoop {
        target: Option<Handle<Instruction>>,
    },
    ExitSwitch {
        target: Option<Handle<Instruction>>,
    },
    /// Initializer or continuing block to the loop body.
    NextIteration {
        target: Option<Handle<Instruction>>,
    },
    /// Loop body to the continuing block.
    Continue {
        target: Option<Handle<Instruction>>,
    },
    Unreachable,
}

impl InstKind {
    /// The name used to prefix diagnostics.
    pub fn friendly_name(&self) -> &'static str {
        match self {
            Self::Var(_) => "var",
            Self::Override { .. } => "override",
            Self::Let => "let",
            Self::Access => "access",
            Self::Load => "load",
            Self::Store => "store",
            Self::LoadVectorElement => "load_vector_element",
            Self::StoreVectorElement => "store_vector_element",
            Self::Construct => "construct",
            Self::Convert => "convert",
            Self::Bitcast => "bitcast",
            Self::Swizzle { .. } => "swizzle",
            Self::Binary(_) => "binary",
            Self::Unary(_) => "unary",
            Self::Call => "call",
            Self::If { .. } => "if",
            Self::Loop { .. } => "loop",
            Self::Switch { .. } => "switch",
            Self::Return { .. } => "return",
            Self::ExitIf { .. } => "exit_if",
            Self::ExitLoop { .. } => "exit_loop",
            Self::ExitSwitch { .. } => "exit_switch",
            Self::NextIteration { .. } => "next_iteration",
            Self::Continue { .. } => "continue",
            Self::Unreachable => "unreachable",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Return { .. }
                | Self::ExitIf { .. }
                | Self::ExitLoop { .. }
                | Self::ExitSwitch { .. }
                | Self::NextIteration { .. }
                | Self::Continue { .. }
                | Self::Unreachable
        )
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::If { .. } | Self::Loop { .. } | Self::Switch { .. })
    }

    /// The control instruction an exit leaves.
    pub fn exit_target(&self) -> Option<Handle<Instruction>> {
        match *self {
            Self::ExitIf { target } | Self::ExitLoop { target } | Self::ExitSwitch { target } => {
                target
            }
            _ => None,
        }
    }

    /// Sub-blocks owned by a control instruction, in source order.
    pub fn blocks(&self) -> Vec<Handle<Block>> {
        match self {
            Self::If {
                true_block,
                false_block,
            } => vec![*true_block, *false_block],
            Self::Loop {
                initializer,
                body,
                continuing,
            } => vec![*initializer, *body, *continuing],
            Self::Switch { cases } => cases.iter().map(|case| case.block).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub kind: InstKind,
    pub(crate) operands: Vec<Option<Handle<Value>>>,
    pub(crate) results: Vec<Option<Handle<Value>>>,
    pub(crate) block: Option<Handle<Block>>,
    pub(crate) alive: bool,
}

impl Instruction {
    pub fn friendly_name(&self) -> &'static str {
        self.kind.friendly_name()
    }

    pub fn operands(&self) -> &[Option<Handle<Value>>] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<Handle<Value>> {
        self.operands.get(index).copied().flatten()
    }

    pub fn results(&self) -> &[Option<Handle<Value>>] {
        &self.results
    }

    /// The first result, for single-result instructions.
    pub fn result(&self) -> Option<Handle<Value>> {
        self.results.first().copied().flatten()
    }

    /// The block this instruction claims to belong to.
    pub fn block(&self) -> Option<Handle<Block>> {
        self.block
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    pub fn is_control(&self) -> bool {
        self.kind.is_control()
    }
}
