//! Std140 layout for uniform buffers.
//!
//! The std140 rules start every matrix column on a 16-byte boundary.
//! Matrices with a smaller natural column stride (`mat3x2<f32>`,
//! `mat4x2<f32>`, most `f16` matrices) therefore cannot live in a uniform
//! struct as they are. [`Std140`] splits each such struct member into one
//! vector member per column, swaps every affected uniform variable for one
//! of the rewritten type, and rebuilds the original values wherever the
//! program reads them:
//!
//! - an access that reaches a split matrix loads its columns and constructs
//!   the matrix, and the rest of the access chain works on that value;
//! - a load of a rewritten struct calls a generated `convert_<Struct>`
//!   helper, one per struct type, that returns the original struct;
//! - a load of a rewritten array converts it element by element in a loop.
//!
//! Arrays of matrices and bare matrix variables are left alone.

use std::collections::HashMap;

use stria_ir::{
    Access, AddressSpace, ArraySize, BinaryOp, Builder, Cursor, Function, Handle, InstKind,
    Instruction, IoAttributes, Literal, Module, StructMember, Type, TypeInner, Usage, Value,
};

use crate::validation::{Capabilities, Capability, validate};
use crate::{OptError, Pass};

const PASS: &str = "std140";

/// Relaxations tolerated in the input module.
const CAPABILITIES: Capabilities = Capabilities::EMPTY
    .with(Capability::AllowMultipleEntryPoints)
    .with(Capability::AllowOverrides)
    .with(Capability::AllowPointSizeBuiltin)
    .with(Capability::AllowClipDistancesOnF32);

/// Rewrites uniform buffer types so that no struct member is a matrix whose
/// column stride is not a multiple of 16 bytes.
#[derive(Debug, Default)]
pub struct Std140;

impl Pass for Std140 {
    fn name(&self) -> &str {
        PASS
    }

    fn run(&self, module: &mut Module) -> Result<bool, OptError> {
        run(module)
    }
}

/// Validates `module` and applies [`Std140`] to it.
pub fn std140(module: &mut Module) -> Result<(), OptError> {
    run(module).map(|_| ())
}

fn run(module: &mut Module) -> Result<bool, OptError> {
    validate(module, CAPABILITIES)?;
    State::new(module).process()
}

/// A split matrix: column type, column count and column stride.
#[derive(Clone, Copy)]
struct Columns {
    ty: Handle<Type>,
    count: u32,
    stride: u32,
}

/// Per-run state. Nothing here outlives one invocation of the pass.
struct State<'m> {
    b: Builder<'m>,
    /// Original type to its std140 form. Identical if nothing changed.
    rewritten: HashMap<Handle<Type>, Handle<Type>>,
    /// `(original struct, member index)` to the index of the member, or of
    /// its first column, in the rewritten struct.
    member_index: HashMap<(Handle<Type>, u32), u32>,
    /// Original struct to the helper that rebuilds it from its std140 form.
    helpers: HashMap<Handle<Type>, Handle<Function>>,
}

impl<'m> State<'m> {
    fn new(module: &'m mut Module) -> Self {
        Self {
            b: Builder::new(module),
            rewritten: HashMap::new(),
            member_index: HashMap::new(),
            helpers: HashMap::new(),
        }
    }

    fn module(&self) -> &Module {
        self.b.module()
    }

    fn process(mut self) -> Result<bool, OptError> {
        let root = self.module().root_block();
        let vars = self.module().block(root).instructions().to_vec();
        let mut changed = false;
        for var in vars {
            changed |= self.replace_var(var)?;
        }
        Ok(changed)
    }

    /// Swaps `var` for a variable of the std140 type if its type changes.
    fn replace_var(&mut self, var: Handle<Instruction>) -> Result<bool, OptError> {
        let module = self.module();
        let instruction = module.instruction(var);
        let InstKind::Var(info) = &instruction.kind else {
            return Ok(false);
        };
        let info = info.clone();
        let Some(old) = instruction.result() else {
            return Ok(false);
        };
        let Some((store, AddressSpace::Uniform, access)) = module
            .value_type(old)
            .and_then(|ty| module.types.pointer(ty))
        else {
            return Ok(false);
        };
        let name = module.name_of(old).unwrap_or_default().to_string();

        let new_store = self.rewrite_type(store);
        if new_store == store {
            return Ok(false);
        }
        log::debug!(
            "{PASS}: uniform var '{name}' now stores {}",
            self.module().types.friendly_name(new_store)
        );
        let ptr = self.b.types().ptr(AddressSpace::Uniform, new_store, access);
        let replacement = self.b.insert_before(var, |b| b.var_with(&name, ptr, None, info));
        self.replace_uses(old, replacement)?;
        self.b.module_mut().destroy(var);
        Ok(true)
    }

    fn decomposed(&mut self, ty: Handle<Type>) -> Option<Columns> {
        let TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } = *self.module().types.inner(ty)
        else {
            return None;
        };
        let stride = self.module().types.column_stride(ty);
        if stride % 16 == 0 {
            return None;
        }
        Some(Columns {
            ty: self.b.types().vec(rows, scalar),
            count: columns.count(),
            stride,
        })
    }

    fn rewrite_type(&mut self, ty: Handle<Type>) -> Handle<Type> {
        if let Some(&done) = self.rewritten.get(&ty) {
            return done;
        }
        let rewritten = match *self.module().types.inner(ty) {
            TypeInner::Array { base, size, stride } => {
                let element = self.rewrite_type(base);
                if element == base {
                    ty
                } else {
                    self.b.types().array_with_stride(element, size, stride)
                }
            }
            TypeInner::Struct { .. } => self.rewrite_struct(ty),
            _ => ty,
        };
        self.rewritten.insert(ty, rewritten);
        rewritten
    }

    fn rewrite_struct(&mut self, ty: Handle<Type>) -> Handle<Type> {
        let Type { name, inner } = self.module().types[ty].clone();
        let TypeInner::Struct {
            members,
            align,
            size,
            size_no_padding,
            flags,
        } = inner
        else {
            return ty;
        };

        let mut changed = false;
        let mut new_members: Vec<StructMember> = Vec::with_capacity(members.len());
        for member in members {
            self.member_index
                .insert((ty, member.index), new_members.len() as u32);
            if let Some(columns) = self.decomposed(member.ty) {
                let align = self.module().types.align(columns.ty);
                let size = self.module().types.size(columns.ty);
                for i in 0..columns.count {
                    let index = new_members.len() as u32;
                    new_members.push(StructMember {
                        name: format!("{}_col{i}", member.name),
                        ty: columns.ty,
                        index,
                        offset: member.offset + i * columns.stride,
                        align,
                        size,
                        attributes: IoAttributes::default(),
                    });
                }
                changed = true;
            } else {
                let member_ty = self.rewrite_type(member.ty);
                changed |= member_ty != member.ty;
                let index = new_members.len() as u32;
                new_members.push(StructMember {
                    ty: member_ty,
                    index,
                    ..member
                });
            }
        }
        if !changed {
            return ty;
        }

        let base = name.as_deref().unwrap_or("struct");
        let new_name = self
            .b
            .module_mut()
            .symbols
            .new_symbol(&format!("{base}_std140"));
        self.b
            .types()
            .structure_explicit(&new_name, new_members, align, size, size_no_padding, flags)
    }

    /// Rewrites every user of `old` to work on `replacement`, which holds
    /// the same data in std140 form.
    fn replace_uses(&mut self, old: Handle<Value>, replacement: Handle<Value>) -> Result<(), OptError> {
        // Each rewrite can destroy other users, so the use list is re-read.
        while let Some(&usage) = self.module().value(old).uses().first() {
            self.replace(usage, old, replacement)?;
        }
        Ok(())
    }

    fn replace(&mut self, usage: Usage, old: Handle<Value>, replacement: Handle<Value>) -> Result<(), OptError> {
        let inst = usage.instruction;
        if self.module().value_type(old) == self.module().value_type(replacement) {
            self.b
                .module_mut()
                .set_operand(inst, usage.operand, Some(replacement));
            return Ok(());
        }
        let kind = self.module().instruction(inst).kind.clone();
        match kind {
            InstKind::Access => self.replace_access(inst, old, replacement),
            InstKind::Load => self.replace_load(inst, replacement),
            InstKind::LoadVectorElement => self.replace_load_vector_element(inst, replacement),
            InstKind::Let => self.replace_let(inst, replacement),
            other => Err(OptError::pass(
                PASS,
                format!("unhandled use of a uniform value by '{}'", other.friendly_name()),
            )),
        }
    }

    fn replace_access(
        &mut self,
        inst: Handle<Instruction>,
        old: Handle<Value>,
        replacement: Handle<Value>,
    ) -> Result<(), OptError> {
        let module = self.module();
        let result = module.result(inst)?;
        let indices = module
            .instruction(inst)
            .operands()
            .iter()
            .skip(1)
            .map(|&index| index.ok_or_else(|| OptError::pass(PASS, "access with an undefined index")))
            .collect::<Result<Vec<_>, _>>()?;
        let old_ty = module
            .value_type(old)
            .ok_or_else(|| OptError::pass(PASS, "access of an untyped value"))?;
        // The original type reached so far, without the pointer.
        let mut ty = module.types.pointer(old_ty).map_or(old_ty, |(store, _, _)| store);
        let mut pointer = module
            .value_type(replacement)
            .and_then(|t| module.types.pointer(t))
            .map(|(_, space, access)| (space, access));

        self.b.set_cursor(Cursor::Before(inst));
        let mut current = replacement;
        let mut pending = Vec::new();
        for index in indices {
            if !self.module().types.is_struct(ty) {
                pending.push(index);
                ty = self.b.types().element(ty, 0).ok_or_else(|| {
                    OptError::pass(PASS, format!("cannot index into {}", self.module().types.friendly_name(ty)))
                })?;
                continue;
            }

            let member = self.constant_index(index)?;
            let member_ty = self
                .module()
                .types
                .members(ty)
                .and_then(|members| members.get(member as usize))
                .map(|m| m.ty)
                .ok_or_else(|| OptError::pass(PASS, format!("struct member {member} is out of range")))?;
            let Some((space, access)) = pointer else {
                // Values keep the original layout.
                pending.push(index);
                ty = member_ty;
                continue;
            };
            let new_index = self.member_index.get(&(ty, member)).copied().unwrap_or(member);
            match self.decomposed(member_ty) {
                Some(columns) => {
                    let base = self.flush(current, ty, space, access, &mut pending);
                    current = self.load_matrix(base, space, access, member_ty, new_index, columns);
                    pointer = None;
                }
                None => {
                    let index = self.b.u32(new_index);
                    pending.push(index);
                }
            }
            ty = member_ty;
        }

        let value = match pointer {
            Some((space, access)) => self.flush(current, ty, space, access, &mut pending),
            None if pending.is_empty() => current,
            None => self.b.access(ty, current, &pending),
        };
        self.replace_uses(result, value)?;
        self.b.module_mut().destroy(inst);
        Ok(())
    }

    fn constant_index(&self, index: Handle<Value>) -> Result<u32, OptError> {
        self.module()
            .value(index)
            .literal()
            .and_then(Literal::as_i64)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| OptError::pass(PASS, "struct indexed with a non-constant value"))
    }

    /// Emits the pending pointer indices as one access, returning a pointer
    /// to the std140 form of `ty`.
    fn flush(
        &mut self,
        current: Handle<Value>,
        ty: Handle<Type>,
        space: AddressSpace,
        access: Access,
        pending: &mut Vec<Handle<Value>>,
    ) -> Handle<Value> {
        if pending.is_empty() {
            return current;
        }
        let store = self.rewrite_type(ty);
        let ptr = self.b.types().ptr(space, store, access);
        let indices = std::mem::take(pending);
        self.b.access(ptr, current, &indices)
    }

    /// Loads the columns of a split matrix, starting at member `first` of
    /// the struct behind `base`, and constructs the matrix.
    fn load_matrix(
        &mut self,
        base: Handle<Value>,
        space: AddressSpace,
        access: Access,
        matrix: Handle<Type>,
        first: u32,
        columns: Columns,
    ) -> Handle<Value> {
        let column_ptr = self.b.types().ptr(space, columns.ty, access);
        let mut values = Vec::with_capacity(columns.count as usize);
        for i in 0..columns.count {
            let index = self.b.u32(first + i);
            let ptr = self.b.access(column_ptr, base, &[index]);
            values.push(self.b.load(ptr));
        }
        self.b.construct(matrix, &values)
    }

    fn replace_load(&mut self, inst: Handle<Instruction>, replacement: Handle<Value>) -> Result<(), OptError> {
        let result = self.module().result(inst)?;
        let through_pointer = self
            .module()
            .value_type(replacement)
            .is_some_and(|ty| self.module().types.is_pointer(ty));
        let value = if through_pointer {
            let original = self
                .module()
                .value_type(result)
                .ok_or_else(|| OptError::pass(PASS, "load with an untyped result"))?;
            self.b.set_cursor(Cursor::Before(inst));
            let loaded = self.b.load(replacement);
            self.convert(loaded, original)?
        } else {
            // The matrix was already rebuilt by the access chain.
            replacement
        };
        let module = self.b.module_mut();
        module.replace_all_uses_with(result, value);
        module.destroy(inst);
        Ok(())
    }

    fn replace_load_vector_element(
        &mut self,
        inst: Handle<Instruction>,
        replacement: Handle<Value>,
    ) -> Result<(), OptError> {
        let module = self.module();
        let result = module.result(inst)?;
        let (Some(ty), Some(index)) = (module.value_type(result), module.instruction(inst).operand(1)) else {
            return Err(OptError::pass(PASS, "malformed load_vector_element"));
        };
        self.b.set_cursor(Cursor::Before(inst));
        let element = self.b.access(ty, replacement, &[index]);
        let module = self.b.module_mut();
        module.replace_all_uses_with(result, element);
        module.destroy(inst);
        Ok(())
    }

    fn replace_let(&mut self, inst: Handle<Instruction>, replacement: Handle<Value>) -> Result<(), OptError> {
        let result = self.module().result(inst)?;
        self.replace_uses(result, replacement)?;
        self.b.module_mut().destroy(inst);
        Ok(())
    }

    /// Converts `value`, in std140 form, to the `original` type at the
    /// cursor.
    fn convert(&mut self, value: Handle<Value>, original: Handle<Type>) -> Result<Handle<Value>, OptError> {
        if self.module().value_type(value) == Some(original) {
            return Ok(value);
        }
        let array = match *self.module().types.inner(original) {
            TypeInner::Array {
                base,
                size: ArraySize::Constant(count),
                ..
            } => Some((base, count)),
            _ => None,
        };
        if let Some((base, count)) = array {
            return self.convert_array(value, original, base, count);
        }
        if self.module().types.is_struct(original) {
            let helper = self.convert_helper(original)?;
            return Ok(self.b.call(helper, &[value]));
        }
        Err(OptError::pass(
            PASS,
            format!("cannot convert to {}", self.module().types.friendly_name(original)),
        ))
    }

    /// The function that converts the std140 form of `original` back, built
    /// on first use.
    fn convert_helper(&mut self, original: Handle<Type>) -> Result<Handle<Function>, OptError> {
        if let Some(&helper) = self.helpers.get(&original) {
            return Ok(helper);
        }
        let rewritten = self.rewrite_type(original);
        let type_name = self.module().types.friendly_name(original);
        let module = self.b.module_mut();
        let name = module.symbols.new_symbol(&format!("convert_{type_name}"));
        let helper = module.create_function(Some(&name), original);
        module.functions.push(helper);
        let input = module.create_param(Some(rewritten));
        module.set_name(input, "input");
        module.append_param(helper, input);
        let body = module.function(helper).block();
        self.helpers.insert(original, helper);
        log::trace!("{PASS}: created {name}");

        let members = self
            .module()
            .types
            .members(original)
            .map(<[StructMember]>::to_vec)
            .unwrap_or_default();
        let saved = self.b.cursor();
        self.b.set_cursor(Cursor::Append(body));
        let mut args = Vec::with_capacity(members.len());
        for member in members {
            let index = self
                .member_index
                .get(&(original, member.index))
                .copied()
                .unwrap_or(member.index);
            if let Some(columns) = self.decomposed(member.ty) {
                let mut values = Vec::with_capacity(columns.count as usize);
                for i in 0..columns.count {
                    let column = self.b.u32(index + i);
                    values.push(self.b.access(columns.ty, input, &[column]));
                }
                args.push(self.b.construct(member.ty, &values));
            } else {
                let member_ty = self.rewrite_type(member.ty);
                let position = self.b.u32(index);
                let extracted = self.b.access(member_ty, input, &[position]);
                args.push(self.convert(extracted, member.ty)?);
            }
        }
        let value = self.b.construct(original, &args);
        self.b.return_value(helper, value);
        self.b.set_cursor(saved);
        Ok(helper)
    }

    /// Converts an array element by element into a function variable and
    /// loads the result.
    fn convert_array(
        &mut self,
        value: Handle<Value>,
        original: Handle<Type>,
        element: Handle<Type>,
        count: u32,
    ) -> Result<Handle<Value>, OptError> {
        let u32_ty = self.b.types().u32();
        let bool_ty = self.b.types().bool();
        let array_ptr = self
            .b
            .types()
            .ptr(AddressSpace::Function, original, Access::ReadWrite);
        let element_ptr = self
            .b
            .types()
            .ptr(AddressSpace::Function, element, Access::ReadWrite);
        let index_ptr = self
            .b
            .types()
            .ptr(AddressSpace::Function, u32_ty, Access::ReadWrite);
        let source_element = self.rewrite_type(element);

        let converted = self.b.var("", array_ptr);
        let zero = self.b.u32(0);
        let index = self.b.var_init("idx", index_ptr, zero);
        let lp = self.b.loop_();
        let InstKind::Loop {
            body, continuing, ..
        } = self.module().instruction(lp).kind
        else {
            return Err(OptError::pass(PASS, "loop without blocks"));
        };

        let saved = self.b.cursor();
        self.b.set_cursor(Cursor::Append(body));
        let i = self.b.load(index);
        let end = self.b.u32(count);
        let done = self.b.binary(BinaryOp::GreaterThanEqual, bool_ty, i, end);
        let check = self.b.if_(done);
        let InstKind::If { true_block, .. } = self.module().instruction(check).kind else {
            return Err(OptError::pass(PASS, "if without blocks"));
        };
        self.b.append(true_block, |b| b.exit_loop(lp, &[]));
        let to = self.b.access(element_ptr, converted, &[i]);
        let from = self.b.access(source_element, value, &[i]);
        let from = self.convert(from, element)?;
        self.b.store(to, from);
        self.b.continue_(lp);

        self.b.set_cursor(Cursor::Append(continuing));
        let i = self.b.load(index);
        let one = self.b.u32(1);
        let next = self.b.binary(BinaryOp::Add, u32_ty, i, one);
        self.b.store(index, next);
        self.b.next_iteration(lp);

        self.b.set_cursor(saved);
        Ok(self.b.load(converted))
    }
}
