//! SSA values: instruction results, function parameters, constants and
//! function references.

use std::fmt;

use crate::arena::Handle;
use crate::function::Function;
use crate::instruction::Instruction;
use crate::io::{BindingPoint, IoAttributes};
use crate::types::{Scalar, Type};

/// One consumer of a value: `instruction` holds it as operand `operand`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Usage {
    pub instruction: Handle<Instruction>,
    pub operand: usize,
}

/// A scalar constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    /// Stored widened; printed with the `h` suffix.
    F16(f32),
}

impl Literal {
    pub fn scalar(self) -> Scalar {
        match self {
            Self::Bool(_) => Scalar::BOOL,
            Self::I32(_) => Scalar::I32,
            Self::U32(_) => Scalar::U32,
            Self::F32(_) => Scalar::F32,
            Self::F16(_) => Scalar::F16,
        }
    }

    /// The value of an integer literal, widened.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::I32(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}i"),
            Self::U32(v) => write!(f, "{v}u"),
            Self::F32(v) => write!(f, "{v:?}f"),
            Self::F16(v) => write!(f, "{v:?}h"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ValueKind {
    /// A result of `instruction`. `None` once detached.
    InstructionResult {
        instruction: Option<Handle<Instruction>>,
    },
    FunctionParam {
        function: Option<Handle<Function>>,
        attributes: IoAttributes,
        binding_point: Option<BindingPoint>,
    },
    Constant(Literal),
    Function(Handle<Function>),
}

#[derive(Clone, Debug)]
pub struct Value {
    pub(crate) kind: ValueKind,
    pub(crate) ty: Option<Handle<Type>>,
    pub(crate) uses: Vec<Usage>,
    pub(crate) alive: bool,
}

impl Value {
    pub(crate) fn new(kind: ValueKind, ty: Option<Handle<Type>>) -> Self {
        Self {
            kind,
            ty,
            uses: Vec::new(),
            alive: true,
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn ty(&self) -> Option<Handle<Type>> {
        self.ty
    }

    /// Recorded consumers, in the order they were added.
    pub fn uses(&self) -> &[Usage] {
        &self.uses
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// The defining instruction of an instruction result.
    pub fn instruction(&self) -> Option<Handle<Instruction>> {
        match self.kind {
            ValueKind::InstructionResult { instruction } => instruction,
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<Literal> {
        match self.kind {
            ValueKind::Constant(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn function(&self) -> Option<Handle<Function>> {
        match self.kind {
            ValueKind::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, ValueKind::FunctionParam { .. })
    }

    /// IO attributes of a function parameter.
    pub fn param_attributes(&self) -> Option<&IoAttributes> {
        match &self.kind {
            ValueKind::FunctionParam { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn param_attributes_mut(&mut self) -> Option<&mut IoAttributes> {
        match &mut self.kind {
            ValueKind::FunctionParam { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn is_used(&self) -> bool {
        !self.uses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_spelling() {
        assert_eq!(Literal::U32(3).to_string(), "3u");
        assert_eq!(Literal::I32(-1).to_string(), "-1i");
        assert_eq!(Literal::F32(1.0).to_string(), "1.0f");
        assert_eq!(Literal::F16(0.5).to_string(), "0.5h");
        assert_eq!(Literal::Bool(true).to_string(), "true");
    }

    #[test]
    fn integer_literals_widen() {
        assert_eq!(Literal::I32(-1).as_i64(), Some(-1));
        assert_eq!(Literal::U32(u32::MAX).as_i64(), Some(i64::from(u32::MAX)));
        assert_eq!(Literal::F32(2.0).as_i64(), None);
    }
}
