//! Stria intermediate representation.
//!
//! A typed instruction graph for shader programs: a [`Module`] owns blocks,
//! instructions, values and functions in arenas, with explicit def-use
//! edges kept in sync by the module's edit operations. Types are interned in
//! a per-module [`TypeManager`].

pub mod arena;
mod block;
mod builder;
mod disassembly;
mod error;
mod function;
mod instruction;
mod io;
mod module;
mod symbols;
mod types;
mod value;

pub use arena::{Arena, Handle, UniqueArena};
pub use block::{Block, BlockParent};
pub use builder::{Builder, Cursor};
pub use disassembly::{Disassembly, Source, disassemble, dump_module};
pub use error::IrError;
pub use function::{Function, PipelineStage};
pub use instruction::{BinaryOp, InstKind, Instruction, SwitchCase, UnaryOp, VarInfo};
pub use io::{
    BindingPoint, BuiltinValue, Interpolation, InterpolationSampling, InterpolationType,
    IoAttributes,
};
pub use module::Module;
pub use symbols::SymbolTable;
pub use types::{
    Access, AddressSpace, ArraySize, Bytes, MemberDesc, Scalar, ScalarKind, StructFlags,
    StructMember, StructUsage, TextureDimension, Type, TypeInner, TypeManager, VectorSize,
    round_up,
};
pub use value::{Literal, Usage, Value, ValueKind};
