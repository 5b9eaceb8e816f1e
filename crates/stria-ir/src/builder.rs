//! Instruction construction with an explicit insertion cursor.
//!
//! A [`Builder`] borrows a [`Module`] and places every instruction it
//! creates at its current [`Cursor`]. Value-producing methods return the
//! result value; the defining instruction is available through
//! [`Builder::inst_of`].
//!
//! ```
//! use stria_ir::{BinaryOp, Builder, Module};
//!
//! let mut module = Module::new();
//! let mut b = Builder::new(&mut module);
//! let f32 = b.types().f32();
//! let func = b.function("half", f32);
//! let body = b.module().function(func).block();
//! b.append(body, |b| {
//!     let x = b.f32(1.0);
//!     let y = b.f32(2.0);
//!     let q = b.binary(BinaryOp::Divide, f32, x, y);
//!     b.return_value(func, q);
//! });
//! ```

use crate::arena::Handle;
use crate::block::{Block, BlockParent};
use crate::function::{Function, PipelineStage};
use crate::instruction::{BinaryOp, InstKind, Instruction, UnaryOp, VarInfo};
use crate::io::{BindingPoint, IoAttributes};
use crate::module::Module;
use crate::types::{Type, TypeInner, TypeManager};
use crate::value::{Literal, Value, ValueKind};

/// Where the next instruction goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Instructions are created but not placed in any block.
    Detached,
    /// Append to the end of a block.
    Append(Handle<Block>),
    /// Insert before an existing instruction.
    Before(Handle<Instruction>),
}

pub struct Builder<'m> {
    module: &'m mut Module,
    cursor: Cursor,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            cursor: Cursor::Detached,
        }
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    pub fn types(&mut self) -> &mut TypeManager {
        &mut self.module.types
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    /// Moves the cursor to the end of `block`.
    pub fn at(&mut self, block: Handle<Block>) -> &mut Self {
        self.cursor = Cursor::Append(block);
        self
    }

    /// Moves the cursor to just before `inst`.
    pub fn before(&mut self, inst: Handle<Instruction>) -> &mut Self {
        self.cursor = Cursor::Before(inst);
        self
    }

    /// Runs `f` with the cursor at the end of `block`, then restores it.
    pub fn append<R>(&mut self, block: Handle<Block>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.with_cursor(Cursor::Append(block), f)
    }

    /// Runs `f` with the cursor before `inst`, then restores it.
    pub fn insert_before<R>(&mut self, inst: Handle<Instruction>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.with_cursor(Cursor::Before(inst), f)
    }

    pub fn with_cursor<R>(&mut self, cursor: Cursor, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.cursor, cursor);
        let out = f(self);
        self.cursor = saved;
        out
    }

    fn place(&mut self, inst: Handle<Instruction>) {
        match self.cursor {
            Cursor::Detached => {}
            Cursor::Append(block) => self.module.append(block, inst),
            Cursor::Before(anchor) => {
                let placed = self.module.insert_before(anchor, inst);
                debug_assert!(placed.is_ok(), "cursor anchor must be in a block: {placed:?}");
            }
        }
    }

    /// Creates and places an instruction.
    pub fn emit(
        &mut self,
        kind: InstKind,
        operands: Vec<Option<Handle<Value>>>,
        result_types: &[Handle<Type>],
    ) -> Handle<Instruction> {
        let inst = self.module.create_instruction(kind, operands, result_types);
        self.place(inst);
        inst
    }

    fn emit_value(&mut self, kind: InstKind, operands: Vec<Handle<Value>>, ty: Handle<Type>) -> Handle<Value> {
        let inst = self.emit(kind, operands.into_iter().map(Some).collect(), &[ty]);
        self.module.result_or_untyped(inst)
    }

    /// The instruction that defines `value`, if it is an instruction result.
    pub fn inst_of(&self, value: Handle<Value>) -> Option<Handle<Instruction>> {
        self.module.value(value).instruction()
    }

    pub fn set_name(&mut self, value: Handle<Value>, name: &str) {
        self.module.set_name(value, name);
    }

    pub fn constant(&mut self, literal: Literal) -> Handle<Value> {
        self.module.constant(literal)
    }

    pub fn bool(&mut self, value: bool) -> Handle<Value> {
        self.constant(Literal::Bool(value))
    }

    pub fn i32(&mut self, value: i32) -> Handle<Value> {
        self.constant(Literal::I32(value))
    }

    pub fn u32(&mut self, value: u32) -> Handle<Value> {
        self.constant(Literal::U32(value))
    }

    pub fn f32(&mut self, value: f32) -> Handle<Value> {
        self.constant(Literal::F32(value))
    }

    pub fn f16(&mut self, value: f32) -> Handle<Value> {
        self.constant(Literal::F16(value))
    }

    /// Creates a function and adds it to the module.
    pub fn function(&mut self, name: &str, return_type: Handle<Type>) -> Handle<Function> {
        let function = self.module.create_function(Some(name), return_type);
        self.module.functions.push(function);
        function
    }

    /// Creates an entry point and adds it to the module.
    pub fn entry_point(&mut self, name: &str, stage: PipelineStage, return_type: Handle<Type>) -> Handle<Function> {
        let function = self.function(name, return_type);
        self.module.function_mut(function).stage = Some(stage);
        function
    }

    /// Creates a `@compute @workgroup_size(x, y, z)` entry point returning
    /// void.
    pub fn compute_entry_point(&mut self, name: &str, size: [u32; 3]) -> Handle<Function> {
        let void = self.module.types.void();
        let function = self.entry_point(name, PipelineStage::Compute, void);
        let size = size.iter().map(|&dim| self.u32(dim)).collect();
        self.module.function_mut(function).workgroup_size = Some(size);
        function
    }

    /// Creates a parameter and appends it to `function`.
    pub fn param(&mut self, function: Handle<Function>, name: &str, ty: Handle<Type>) -> Handle<Value> {
        let param = self.module.create_param(Some(ty));
        self.module.set_name(param, name);
        self.module.append_param(function, param);
        param
    }

    /// Creates a parameter with IO attributes and appends it to `function`.
    pub fn io_param(
        &mut self,
        function: Handle<Function>,
        name: &str,
        ty: Handle<Type>,
        io: IoAttributes,
    ) -> Handle<Value> {
        let param = self.param(function, name, ty);
        if let Some(attributes) = self.module.value_mut(param).param_attributes_mut() {
            *attributes = io;
        }
        param
    }

    pub fn set_param_binding_point(&mut self, param: Handle<Value>, binding_point: BindingPoint) {
        if let ValueKind::FunctionParam {
            binding_point: slot, ..
        } = &mut self.module.value_mut(param).kind
        {
            *slot = Some(binding_point);
        }
    }

    /// `var` of pointer type `ptr`, without initializer.
    pub fn var(&mut self, name: &str, ptr: Handle<Type>) -> Handle<Value> {
        self.var_with(name, ptr, None, VarInfo::default())
    }

    pub fn var_init(&mut self, name: &str, ptr: Handle<Type>, init: Handle<Value>) -> Handle<Value> {
        self.var_with(name, ptr, Some(init), VarInfo::default())
    }

    /// A resource `var` bound at `@group(group) @binding(binding)`.
    pub fn binding_var(&mut self, name: &str, ptr: Handle<Type>, group: u32, binding: u32) -> Handle<Value> {
        self.var_with(
            name,
            ptr,
            None,
            VarInfo {
                binding_point: Some(BindingPoint::new(group, binding)),
                attributes: IoAttributes::default(),
            },
        )
    }

    pub fn var_with(
        &mut self,
        name: &str,
        ptr: Handle<Type>,
        init: Option<Handle<Value>>,
        info: VarInfo,
    ) -> Handle<Value> {
        if let Some((store, space, _)) = self.module.types.pointer(ptr) {
            if self.module.types.is_struct(store) {
                self.module.types.record_address_space_usage(store, space);
            }
        }
        let inst = self.emit(InstKind::Var(info), vec![init], &[ptr]);
        let result = self.module.result_or_untyped(inst);
        if !name.is_empty() {
            self.module.set_name(result, name);
        }
        result
    }

    /// A module-scope `override` with an optional initializer.
    pub fn override_value(
        &mut self,
        name: &str,
        ty: Handle<Type>,
        id: Option<u16>,
        init: Option<Handle<Value>>,
    ) -> Handle<Value> {
        let inst = self.emit(InstKind::Override { id }, vec![init], &[ty]);
        let result = self.module.result_or_untyped(inst);
        self.module.set_name(result, name);
        result
    }

    pub fn let_(&mut self, name: &str, value: Handle<Value>) -> Handle<Value> {
        let ty = self.type_of(value);
        let result = self.emit_value(InstKind::Let, vec![value], ty);
        if !name.is_empty() {
            self.module.set_name(result, name);
        }
        result
    }

    pub fn access(&mut self, ty: Handle<Type>, object: Handle<Value>, indices: &[Handle<Value>]) -> Handle<Value> {
        let mut operands = vec![object];
        operands.extend_from_slice(indices);
        self.emit_value(InstKind::Access, operands, ty)
    }

    /// Loads through `from`. The result type is the pointer's store type.
    pub fn load(&mut self, from: Handle<Value>) -> Handle<Value> {
        let ty = self.type_of(from);
        let ty = self.module.types.pointer(ty).map_or(ty, |(store, _, _)| store);
        self.emit_value(InstKind::Load, vec![from], ty)
    }

    pub fn store(&mut self, to: Handle<Value>, value: Handle<Value>) -> Handle<Instruction> {
        self.emit(InstKind::Store, vec![Some(to), Some(value)], &[])
    }

    /// Loads one component of the vector behind `from`.
    pub fn load_vector_element(&mut self, from: Handle<Value>, index: Handle<Value>) -> Handle<Value> {
        let ty = self.type_of(from);
        let ty = match self.module.types.pointer(ty) {
            Some((store, _, _)) => match *self.module.types.inner(store) {
                TypeInner::Vector { scalar, .. } => self.module.types.scalar(scalar),
                _ => store,
            },
            None => ty,
        };
        self.emit_value(InstKind::LoadVectorElement, vec![from, index], ty)
    }

    pub fn store_vector_element(
        &mut self,
        to: Handle<Value>,
        index: Handle<Value>,
        value: Handle<Value>,
    ) -> Handle<Instruction> {
        self.emit(
            InstKind::StoreVectorElement,
            vec![Some(to), Some(index), Some(value)],
            &[],
        )
    }

    pub fn construct(&mut self, ty: Handle<Type>, args: &[Handle<Value>]) -> Handle<Value> {
        self.emit_value(InstKind::Construct, args.to_vec(), ty)
    }

    pub fn convert(&mut self, ty: Handle<Type>, value: Handle<Value>) -> Handle<Value> {
        self.emit_value(InstKind::Convert, vec![value], ty)
    }

    pub fn bitcast(&mut self, ty: Handle<Type>, value: Handle<Value>) -> Handle<Value> {
        self.emit_value(InstKind::Bitcast, vec![value], ty)
    }

    pub fn swizzle(&mut self, ty: Handle<Type>, object: Handle<Value>, indices: &[u32]) -> Handle<Value> {
        self.emit_value(
            InstKind::Swizzle {
                indices: indices.to_vec(),
            },
            vec![object],
            ty,
        )
    }

    pub fn binary(&mut self, op: BinaryOp, ty: Handle<Type>, lhs: Handle<Value>, rhs: Handle<Value>) -> Handle<Value> {
        self.emit_value(InstKind::Binary(op), vec![lhs, rhs], ty)
    }

    pub fn unary(&mut self, op: UnaryOp, ty: Handle<Type>, value: Handle<Value>) -> Handle<Value> {
        self.emit_value(InstKind::Unary(op), vec![value], ty)
    }

    /// Calls `function`. The result has the function's return type.
    pub fn call(&mut self, function: Handle<Function>, args: &[Handle<Value>]) -> Handle<Value> {
        let ty = self.module.function(function).return_type;
        let target = self.module.function(function).value();
        self.call_with_type(ty, target, args)
    }

    /// Calls an arbitrary target value with an explicit result type.
    pub fn call_with_type(&mut self, ty: Handle<Type>, target: Handle<Value>, args: &[Handle<Value>]) -> Handle<Value> {
        let mut operands = vec![target];
        operands.extend_from_slice(args);
        self.emit_value(InstKind::Call, operands, ty)
    }

    pub fn if_(&mut self, condition: Handle<Value>) -> Handle<Instruction> {
        self.if_with_results(condition, &[])
    }

    pub fn if_with_results(&mut self, condition: Handle<Value>, result_types: &[Handle<Type>]) -> Handle<Instruction> {
        let true_block = self.module.create_block(BlockParent::Detached);
        let false_block = self.module.create_block(BlockParent::Detached);
        let inst = self.emit(
            InstKind::If {
                true_block,
                false_block,
            },
            vec![Some(condition)],
            result_types,
        );
        self.adopt(inst, &[true_block, false_block]);
        inst
    }

    pub fn loop_(&mut self) -> Handle<Instruction> {
        self.loop_with_results(&[])
    }

    pub fn loop_with_results(&mut self, result_types: &[Handle<Type>]) -> Handle<Instruction> {
        let initializer = self.module.create_block(BlockParent::Detached);
        let body = self.module.create_block(BlockParent::Detached);
        let continuing = self.module.create_block(BlockParent::Detached);
        let inst = self.emit(
            InstKind::Loop {
                initializer,
                body,
                continuing,
            },
            Vec::new(),
            result_types,
        );
        self.adopt(inst, &[initializer, body, continuing]);
        inst
    }

    pub fn switch(&mut self, condition: Handle<Value>) -> Handle<Instruction> {
        self.switch_with_results(condition, &[])
    }

    pub fn switch_with_results(&mut self, condition: Handle<Value>, result_types: &[Handle<Type>]) -> Handle<Instruction> {
        self.emit(
            InstKind::Switch { cases: Vec::new() },
            vec![Some(condition)],
            result_types,
        )
    }

    /// Adds a case to `switch`; `None` selectors mean `default`.
    pub fn case(&mut self, switch: Handle<Instruction>, selectors: &[Option<Handle<Value>>]) -> Handle<Block> {
        match self.module.add_case(switch, selectors.to_vec()) {
            Some(block) => block,
            None => self.module.create_block(BlockParent::Detached),
        }
    }

    pub fn default_case(&mut self, switch: Handle<Instruction>) -> Handle<Block> {
        self.case(switch, &[None])
    }

    fn adopt(&mut self, control: Handle<Instruction>, blocks: &[Handle<Block>]) {
        for &block in blocks {
            self.module.block_mut(block).set_parent(BlockParent::Control(control));
        }
    }

    pub fn return_(&mut self, function: Handle<Function>) -> Handle<Instruction> {
        self.emit(
            InstKind::Return {
                function: Some(function),
            },
            Vec::new(),
            &[],
        )
    }

    pub fn return_value(&mut self, function: Handle<Function>, value: Handle<Value>) -> Handle<Instruction> {
        self.emit(
            InstKind::Return {
                function: Some(function),
            },
            vec![Some(value)],
            &[],
        )
    }

    pub fn exit_if(&mut self, target: Handle<Instruction>, args: &[Handle<Value>]) -> Handle<Instruction> {
        self.exit(InstKind::ExitIf { target: Some(target) }, args)
    }

    pub fn exit_loop(&mut self, target: Handle<Instruction>, args: &[Handle<Value>]) -> Handle<Instruction> {
        self.exit(InstKind::ExitLoop { target: Some(target) }, args)
    }

    pub fn exit_switch(&mut self, target: Handle<Instruction>, args: &[Handle<Value>]) -> Handle<Instruction> {
        self.exit(InstKind::ExitSwitch { target: Some(target) }, args)
    }

    fn exit(&mut self, kind: InstKind, args: &[Handle<Value>]) -> Handle<Instruction> {
        self.emit(kind, args.iter().copied().map(Some).collect(), &[])
    }

    pub fn next_iteration(&mut self, target: Handle<Instruction>) -> Handle<Instruction> {
        self.emit(InstKind::NextIteration { target: Some(target) }, Vec::new(), &[])
    }

    pub fn continue_(&mut self, target: Handle<Instruction>) -> Handle<Instruction> {
        self.emit(InstKind::Continue { target: Some(target) }, Vec::new(), &[])
    }

    pub fn unreachable(&mut self) -> Handle<Instruction> {
        self.emit(InstKind::Unreachable, Vec::new(), &[])
    }

    fn type_of(&mut self, value: Handle<Value>) -> Handle<Type> {
        match self.module.value_type(value) {
            Some(ty) => ty,
            None => self.module.types.void(),
        }
    }
}

impl Module {
    /// First result of `inst`, adding an untyped one if it has none.
    fn result_or_untyped(&mut self, inst: Handle<Instruction>) -> Handle<Value> {
        match self.instruction(inst).result() {
            Some(value) => value,
            None => self.add_result(inst, None),
        }
    }
}
