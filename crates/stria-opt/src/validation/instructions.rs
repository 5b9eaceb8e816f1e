//! Rules for declarations, memory access and value-producing instructions.

use stria_ir::{
    BinaryOp, Handle, InstKind, Instruction, ScalarKind, Type, TypeInner, TypeManager, UnaryOp,
    VectorSize,
};

use super::{Arity, Validator};

impl Validator<'_> {
    /// Checks the operand count, then every present operand of an
    /// instruction whose slots may be empty.
    fn check_optional_operands(&mut self, inst: Handle<Instruction>, arity: Arity) -> bool {
        if !self.check_operand_count(inst, arity) {
            return false;
        }
        let mut ok = true;
        for index in 0..self.module.instruction(inst).operands().len() {
            ok &= self.check_optional_operand(inst, index);
        }
        ok
    }

    pub(super) fn check_var(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Var(info) = &module.instruction(inst).kind else {
            return;
        };
        let results_ok = self.check_results(inst, 1);
        let operands_ok = self.check_optional_operands(inst, Arity::Exactly(1));
        if !results_ok || !operands_ok {
            return;
        }
        let Some(ptr) = self.result_type(inst) else {
            return;
        };
        let Some((store, space, _)) = self.types.pointer(ptr) else {
            self.result_error(inst, 0, "result type must be a pointer or a reference");
            return;
        };

        let in_root = self.block_stack.last() == Some(&module.root_block());
        if in_root && space == stria_ir::AddressSpace::Function {
            self.inst_error(inst, "vars in the 'function' address space must be in a function scope");
        } else if !in_root && space != stria_ir::AddressSpace::Function {
            self.inst_error(inst, "vars in a function scope must be in the 'function' address space");
        }

        if let Some(init) = self.operand_type(inst, 0) {
            if init != store {
                let message = format!(
                    "initializer type {} does not match store type {}",
                    self.quoted(init),
                    self.quoted(store)
                );
                self.operand_error(inst, 0, message);
            }
        }

        match (space.is_resource(), info.binding_point) {
            (true, None) => self.inst_error(inst, "resource variable missing binding points"),
            (false, Some(_)) => {
                self.inst_error(inst, "binding_points are only valid on resource variables")
            }
            _ => {}
        }

        if info.attributes.input_attachment_index.is_some() && !self.types.is_handle(store) {
            self.inst_error(inst, "'@input_attachment_index' is not valid for non-handle var");
        }
        if info.attributes.builtin.is_some() && info.attributes.location.is_some() {
            self.inst_error(inst, "a builtin and location cannot be both declared for a var");
        }
    }

    pub(super) fn check_override(&mut self, inst: Handle<Instruction>) {
        let InstKind::Override { id } = self.module.instruction(inst).kind else {
            return;
        };
        let results_ok = self.check_results(inst, 1);
        let operands_ok = self.check_optional_operands(inst, Arity::Exactly(1));

        if let Some(id) = id {
            if self.override_ids.contains_key(&id) {
                self.inst_error(inst, format!("duplicate override id encountered: {id}"));
            } else {
                self.override_ids.insert(id, inst);
            }
        }
        if !results_ok || !operands_ok {
            return;
        }
        let Some(ty) = self.result_type(inst) else {
            return;
        };
        if !matches!(self.types.inner(ty), TypeInner::Scalar(_)) {
            let message = format!("override type {} is not a scalar", self.quoted(ty));
            self.result_error(inst, 0, message);
            return;
        }
        if let Some(init) = self.operand_type(inst, 0) {
            if init != ty {
                let message = format!(
                    "override type {} does not match initializer type {}",
                    self.quoted(ty),
                    self.quoted(init)
                );
                self.operand_error(inst, 0, message);
            }
        }
    }

    pub(super) fn check_let(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(1)) {
            return;
        }
        let (Some(result), Some(value)) = (self.result_type(inst), self.operand_type(inst, 0)) else {
            return;
        };
        if result != value {
            let message = format!(
                "result type {} does not match value type {}",
                self.quoted(result),
                self.quoted(value)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_access(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::AtLeast(1)) {
            return;
        }
        let module = self.module;
        let (Some(object), Some(result)) = (self.operand_type(inst, 0), self.result_type(inst)) else {
            return;
        };
        let view = self.types.pointer(object);
        let mut ty = view.map_or(object, |(store, _, _)| store);

        let describe = |types: &TypeManager, ty: Handle<Type>| match view {
            Some((_, space, access)) => format!(
                "ptr<{}, {}, {}>",
                space.name(),
                types.friendly_name(ty),
                access.name()
            ),
            None => types.friendly_name(ty),
        };

        let operand_count = module.instruction(inst).operands().len();
        for index in 1..operand_count {
            let Some(value) = module.instruction(inst).operand(index) else {
                return;
            };
            let Some(index_ty) = self.type_of(value) else {
                return;
            };
            if !self.types.is_integer_scalar(index_ty) {
                let message = format!("index must be integer, got {}", self.type_name(index_ty));
                self.operand_error(inst, index, message);
                return;
            }
            if view.is_some() && matches!(self.types.inner(ty), TypeInner::Vector { .. }) {
                self.operand_error(inst, index, "cannot obtain address of vector element");
                return;
            }

            let element = match module.value(value).literal().and_then(|l| l.as_i64()) {
                Some(constant) => {
                    if constant < 0 {
                        let message = format!("constant index must be positive, got {constant}");
                        self.operand_error(inst, index, message);
                        return;
                    }
                    match self.types.element_count(ty) {
                        None => {
                            let message =
                                format!("type '{}' cannot be indexed", describe(&self.types, ty));
                            self.operand_error(inst, index, message);
                            return;
                        }
                        Some(Some(count)) if constant >= i64::from(count) => {
                            let message = format!(
                                "index out of bounds for type '{}'",
                                describe(&self.types, ty)
                            );
                            self.operand_error(inst, index, message);
                            let range = format!("acceptable range: [0..{}]", count.saturating_sub(1));
                            self.operand_note(inst, index, range);
                            return;
                        }
                        _ => {}
                    }
                    let Ok(constant) = u32::try_from(constant) else {
                        return;
                    };
                    self.types.element(ty, constant)
                }
                None => {
                    if self.types.is_struct(ty) {
                        let message = format!(
                            "type '{}' cannot be dynamically indexed",
                            describe(&self.types, ty)
                        );
                        self.operand_error(inst, index, message);
                        return;
                    }
                    if self.types.element_count(ty).is_none() {
                        let message = format!("type '{}' cannot be indexed", describe(&self.types, ty));
                        self.operand_error(inst, index, message);
                        return;
                    }
                    self.types.element(ty, 0)
                }
            };
            let Some(element) = element else {
                let message = format!("type '{}' cannot be indexed", describe(&self.types, ty));
                self.operand_error(inst, index, message);
                return;
            };
            ty = element;
        }

        let expected = match view {
            Some((_, space, access)) => self.types.ptr(space, ty, access),
            None => ty,
        };
        if expected != result {
            let message = format!(
                "result of access chain is type '{}' but instruction type is {}",
                describe(&self.types, ty),
                self.quoted(result)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_load(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(1)) {
            return;
        }
        let (Some(from), Some(result)) = (self.operand_type(inst, 0), self.result_type(inst)) else {
            return;
        };
        let Some((store, _, access)) = self.types.pointer(from) else {
            self.operand_error(inst, 0, "load source operand is not a memory view");
            return;
        };
        if !access.is_readable() {
            let message = format!(
                "load source operand has a non-readable access type, '{}'",
                access.name()
            );
            self.operand_error(inst, 0, message);
            return;
        }
        if result != store {
            let message = format!(
                "result type {} does not match source store type {}",
                self.quoted(result),
                self.quoted(store)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_store(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 0, Arity::Exactly(2)) {
            return;
        }
        let (Some(to), Some(value)) = (self.operand_type(inst, 0), self.operand_type(inst, 1)) else {
            return;
        };
        let Some((store, _, access)) = self.types.pointer(to) else {
            self.operand_error(inst, 0, "store target operand is not a memory view");
            return;
        };
        if !access.is_writable() {
            let message = format!(
                "store target operand has a non-writeable access type, '{}'",
                access.name()
            );
            self.operand_error(inst, 0, message);
            return;
        }
        if value != store {
            let message = format!(
                "value type {} does not match store type {}",
                self.quoted(value),
                self.quoted(store)
            );
            self.operand_error(inst, 1, message);
        }
    }

    /// The element type of a pointer-to-vector operand, reporting an error
    /// if the operand is anything else.
    fn vector_pointer_element(&mut self, inst: Handle<Instruction>) -> Option<Handle<Type>> {
        let ty = self.operand_type(inst, 0)?;
        let vector = self
            .types
            .pointer(ty)
            .map(|(store, _, _)| store)
            .filter(|&store| matches!(self.types.inner(store), TypeInner::Vector { .. }));
        let Some(vector) = vector else {
            let message = format!("operand must be a pointer to vector, got {}", self.quoted(ty));
            self.operand_error(inst, 0, message);
            return None;
        };
        let index = self.operand_type(inst, 1)?;
        if !self.types.is_integer_scalar(index) {
            let message = format!("index must be integer, got {}", self.type_name(index));
            self.operand_error(inst, 1, message);
            return None;
        }
        self.types.element(vector, 0)
    }

    pub(super) fn check_load_vector_element(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(2)) {
            return;
        }
        let Some(element) = self.vector_pointer_element(inst) else {
            return;
        };
        let Some(result) = self.result_type(inst) else {
            return;
        };
        if result != element {
            let message = format!(
                "result type {} does not match vector pointer element type {}",
                self.quoted(result),
                self.quoted(element)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_store_vector_element(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 0, Arity::Exactly(3)) {
            return;
        }
        let Some(element) = self.vector_pointer_element(inst) else {
            return;
        };
        let Some(value) = self.operand_type(inst, 2) else {
            return;
        };
        if value != element {
            let message = format!(
                "value type {} does not match vector pointer element type {}",
                self.quoted(value),
                self.quoted(element)
            );
            self.operand_error(inst, 2, message);
        }
    }

    pub(super) fn check_construct(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::AtLeast(0)) {
            return;
        }
        let Some(result) = self.result_type(inst) else {
            return;
        };
        if !self.types.is_constructible(result) {
            let message = format!("type {} cannot be constructed", self.quoted(result));
            self.inst_error(inst, message);
            return;
        }
        let args: Vec<_> = (0..self.module.instruction(inst).operands().len())
            .filter_map(|i| self.operand_type(inst, i))
            .collect();
        if args.is_empty() {
            // Zero value.
            return;
        }

        match self.types.inner(result).clone() {
            TypeInner::Struct { members, .. } => {
                if members.len() != args.len() {
                    let message = format!(
                        "structure has {} members, but construct provides {} arguments",
                        members.len(),
                        args.len()
                    );
                    self.inst_error(inst, message);
                    return;
                }
                for (i, (member, &arg)) in members.iter().zip(&args).enumerate() {
                    if member.ty != arg {
                        let message = format!(
                            "structure member {i} is of type {}, but argument is of type {}",
                            self.quoted(member.ty),
                            self.quoted(arg)
                        );
                        self.operand_error(inst, i, message);
                    }
                }
            }
            TypeInner::Array {
                base,
                size: stria_ir::ArraySize::Constant(count),
                ..
            } => {
                if count as usize != args.len() {
                    let message = format!(
                        "array has {count} elements, but construct provides {} arguments",
                        args.len()
                    );
                    self.inst_error(inst, message);
                    return;
                }
                for (i, &arg) in args.iter().enumerate() {
                    if arg != base {
                        let message = format!(
                            "array element {i} is of type {}, but argument is of type {}",
                            self.quoted(base),
                            self.quoted(arg)
                        );
                        self.operand_error(inst, i, message);
                    }
                }
            }
            _ => {
                if !self.constructor_matches(result, &args) {
                    let names: Vec<_> = args.iter().map(|&arg| self.type_name(arg)).collect();
                    let message = format!(
                        "no matching constructor for '{}({})'",
                        self.type_name(result),
                        names.join(", ")
                    );
                    self.inst_error(inst, message);
                }
            }
        }
    }

    /// Whether `args` form a valid scalar, vector or matrix constructor for
    /// `ty`.
    fn constructor_matches(&mut self, ty: Handle<Type>, args: &[Handle<Type>]) -> bool {
        match *self.types.inner(ty) {
            TypeInner::Scalar(_) => args == [ty],
            TypeInner::Vector { size, scalar } => {
                let element = self.types.scalar(scalar);
                if args == [element] {
                    return true;
                }
                let mut components = 0;
                for &arg in args {
                    if self.types.scalar_of(arg) != Some(scalar) {
                        return false;
                    }
                    match self.types.width(arg) {
                        Some(width) => components += width,
                        None => return false,
                    }
                }
                components == size.count()
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column = self.types.vec(rows, scalar);
                let element = self.types.scalar(scalar);
                let all_columns =
                    args.len() == columns.count() as usize && args.iter().all(|&a| a == column);
                let all_scalars = args.len() == (columns.count() * rows.count()) as usize
                    && args.iter().all(|&a| a == element);
                all_columns || all_scalars
            }
            _ => false,
        }
    }

    pub(super) fn check_convert(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(1)) {
            return;
        }
        let (Some(from), Some(to)) = (self.operand_type(inst, 0), self.result_type(inst)) else {
            return;
        };
        let defined = match (self.types.inner(from), self.types.inner(to)) {
            (
                TypeInner::Matrix {
                    columns: fc,
                    rows: fr,
                    scalar: fs,
                },
                TypeInner::Matrix {
                    columns: tc,
                    rows: tr,
                    scalar: ts,
                },
            ) => fc == tc && fr == tr && fs.kind == ScalarKind::Float && ts.kind == ScalarKind::Float,
            _ => {
                self.types.is_scalar_or_vector(from)
                    && self.types.is_scalar_or_vector(to)
                    && self.types.width(from) == self.types.width(to)
            }
        };
        if !defined {
            let message = format!(
                "conversion from {} to {} is not defined",
                self.quoted(from),
                self.quoted(to)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_bitcast(&mut self, inst: Handle<Instruction>) {
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(1)) {
            return;
        }
        let (Some(from), Some(to)) = (self.operand_type(inst, 0), self.result_type(inst)) else {
            return;
        };
        if !bitcast_defined(&self.types, from, to) {
            let message = format!(
                "bitcast is not defined for {} -> {}",
                self.quoted(from),
                self.quoted(to)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_swizzle(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Swizzle { indices } = &module.instruction(inst).kind else {
            return;
        };
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(1)) {
            return;
        }
        if indices.is_empty() {
            self.inst_error(inst, "expected at least 1 indices");
            return;
        }
        if indices.len() > 4 {
            self.inst_error(inst, "expected at most 4 indices");
            return;
        }
        let (Some(object), Some(result)) = (self.operand_type(inst, 0), self.result_type(inst)) else {
            return;
        };
        let TypeInner::Vector { size, scalar } = *self.types.inner(object) else {
            let message = format!("object of swizzle, {}, is not a vector", self.quoted(object));
            self.operand_error(inst, 0, message);
            return;
        };
        if indices.iter().any(|&i| i > 3 || i >= size.count()) {
            self.inst_error(inst, "invalid index value");
            return;
        }
        let expected = match VectorSize::from_count(indices.len() as u32) {
            Some(size) => self.types.vec(size, scalar),
            None => self.types.scalar(scalar),
        };
        if result != expected {
            let message = format!(
                "result type {} does not match expected swizzle type {}",
                self.quoted(result),
                self.quoted(expected)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_binary(&mut self, inst: Handle<Instruction>) {
        let InstKind::Binary(op) = self.module.instruction(inst).kind else {
            return;
        };
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(2)) {
            return;
        }
        let (Some(lhs), Some(rhs), Some(result)) = (
            self.operand_type(inst, 0),
            self.operand_type(inst, 1),
            self.result_type(inst),
        ) else {
            return;
        };
        let Some(expected) = binary_result(&mut self.types, op, lhs, rhs) else {
            let message = format!(
                "no matching overload for 'operator {} ({}, {})'",
                op.symbol(),
                self.type_name(lhs),
                self.type_name(rhs)
            );
            self.inst_error(inst, message);
            return;
        };
        if expected != result {
            let message = format!(
                "result value type {} does not match {} result type {}",
                self.quoted(result),
                op.name(),
                self.quoted(expected)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_unary(&mut self, inst: Handle<Instruction>) {
        let InstKind::Unary(op) = self.module.instruction(inst).kind else {
            return;
        };
        if !self.check_results_and_operands(inst, 1, Arity::Exactly(1)) {
            return;
        }
        let (Some(value), Some(result)) = (self.operand_type(inst, 0), self.result_type(inst)) else {
            return;
        };
        let scalar = self
            .types
            .scalar_of(value)
            .filter(|_| self.types.is_scalar_or_vector(value));
        let defined = scalar.is_some_and(|scalar| match op {
            UnaryOp::Complement => scalar.is_integer(),
            UnaryOp::Negation => matches!(scalar.kind, ScalarKind::Sint | ScalarKind::Float),
            UnaryOp::Not => scalar.kind == ScalarKind::Bool,
        });
        if !defined {
            let message = format!(
                "no matching overload for 'operator {} ({})'",
                op.symbol(),
                self.type_name(value)
            );
            self.inst_error(inst, message);
            return;
        }
        if result != value {
            let message = format!(
                "result value type {} does not match {} result type {}",
                self.quoted(result),
                op.name(),
                self.quoted(value)
            );
            self.inst_error(inst, message);
        }
    }

    pub(super) fn check_call(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        if !self.check_results_and_operands(inst, 1, Arity::AtLeast(1)) {
            return;
        }
        let target = module
            .instruction(inst)
            .operand(0)
            .and_then(|value| module.value(value).function());
        let Some(target) = target else {
            self.operand_error(inst, 0, "target not defined or not a function");
            return;
        };
        let function = module.function(target);
        if function.stage.is_some() {
            self.operand_error(inst, 0, "call target must not have a pipeline stage");
            return;
        }

        let args = module.instruction(inst).operands().len() - 1;
        let params = function.params();
        if params.len() != args {
            let message = format!(
                "function has {} parameters, but call provides {args} arguments",
                params.len()
            );
            self.inst_error(inst, message);
            return;
        }
        for (i, &param) in params.iter().enumerate() {
            let (Some(expected), Some(actual)) = (self.type_of(param), self.operand_type(inst, i + 1)) else {
                continue;
            };
            if expected != actual {
                let message = format!(
                    "function parameter {i} is of type {}, but argument is of type {}",
                    self.quoted(expected),
                    self.quoted(actual)
                );
                self.operand_error(inst, i + 1, message);
            }
        }

        if let Some(result) = self.result_type(inst) {
            if result != function.return_type {
                let message = format!(
                    "result type {} does not match function return type {}",
                    self.quoted(result),
                    self.quoted(function.return_type)
                );
                self.inst_error(inst, message);
            }
        }
    }
}

/// Whether a bitcast from `from` to `to` preserves the bit width with a
/// supported component layout.
pub(super) fn bitcast_defined(types: &TypeManager, from: Handle<Type>, to: Handle<Type>) -> bool {
    if from == to {
        return true;
    }
    let (Some(fs), Some(ts)) = (types.scalar_of(from), types.scalar_of(to)) else {
        return false;
    };
    let (Some(fw), Some(tw)) = (types.width(from), types.width(to)) else {
        return false;
    };
    if fs.kind == ScalarKind::Bool || ts.kind == ScalarKind::Bool {
        return false;
    }
    match (fs.width, ts.width) {
        (4, 4) => fw == tw,
        (2, 4) => fw >= 2 && fw * 2 == tw * 4,
        (4, 2) => tw >= 2 && fw * 4 == tw * 2,
        _ => false,
    }
}

/// The result type of `lhs op rhs`, or `None` if no overload applies.
pub(super) fn binary_result(
    types: &mut TypeManager,
    op: BinaryOp,
    lhs: Handle<Type>,
    rhs: Handle<Type>,
) -> Option<Handle<Type>> {
    let numeric = |types: &TypeManager, ty| types.is_numeric_scalar_or_vector(ty);
    match op {
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Modulo => {
            if lhs == rhs && numeric(types, lhs) {
                return Some(lhs);
            }
            if let Some(ty) = vector_scalar_mix(types, lhs, rhs) {
                return Some(ty);
            }
            match (types.inner(lhs).clone(), types.inner(rhs).clone()) {
                (TypeInner::Matrix { scalar, .. }, TypeInner::Matrix { .. })
                    if lhs == rhs
                        && scalar.kind == ScalarKind::Float
                        && matches!(op, BinaryOp::Add | BinaryOp::Subtract) =>
                {
                    Some(lhs)
                }
                _ if op == BinaryOp::Multiply => matrix_product(types, lhs, rhs),
                _ => None,
            }
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            let scalar = types.scalar_of(lhs)?;
            let same = lhs == rhs && types.is_scalar_or_vector(lhs);
            let defined = scalar.is_integer()
                || (scalar.kind == ScalarKind::Bool && op != BinaryOp::Xor);
            (same && defined).then_some(lhs)
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            if lhs != rhs || !types.is_scalar_or_vector(lhs) {
                return None;
            }
            Some(bool_like(types, lhs))
        }
        BinaryOp::LessThan
        | BinaryOp::GreaterThan
        | BinaryOp::LessThanEqual
        | BinaryOp::GreaterThanEqual => {
            if lhs != rhs || !numeric(types, lhs) {
                return None;
            }
            Some(bool_like(types, lhs))
        }
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            let scalar = types.scalar_of(lhs)?;
            if !scalar.is_integer() || !types.is_scalar_or_vector(lhs) {
                return None;
            }
            let shift = match types.width(lhs)? {
                1 => types.u32(),
                n => types.vec(VectorSize::from_count(n)?, stria_ir::Scalar::U32),
            };
            (rhs == shift).then_some(lhs)
        }
    }
}

/// `vecN<T> op T` or `T op vecN<T>`.
fn vector_scalar_mix(types: &TypeManager, lhs: Handle<Type>, rhs: Handle<Type>) -> Option<Handle<Type>> {
    match (types.inner(lhs), types.inner(rhs)) {
        (TypeInner::Vector { scalar, .. }, TypeInner::Scalar(s)) if scalar == s && scalar.is_numeric() => {
            Some(lhs)
        }
        (TypeInner::Scalar(s), TypeInner::Vector { scalar, .. }) if scalar == s && scalar.is_numeric() => {
            Some(rhs)
        }
        _ => None,
    }
}

fn matrix_product(types: &mut TypeManager, lhs: Handle<Type>, rhs: Handle<Type>) -> Option<Handle<Type>> {
    match (types.inner(lhs).clone(), types.inner(rhs).clone()) {
        (
            TypeInner::Matrix { scalar, .. },
            TypeInner::Scalar(s),
        ) if scalar == s && scalar.kind == ScalarKind::Float => Some(lhs),
        (
            TypeInner::Scalar(s),
            TypeInner::Matrix { scalar, .. },
        ) if scalar == s && scalar.kind == ScalarKind::Float => Some(rhs),
        (
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            },
            TypeInner::Vector { size, scalar: s },
        ) if scalar == s && size == columns && scalar.kind == ScalarKind::Float => {
            Some(types.vec(rows, scalar))
        }
        (
            TypeInner::Vector { size, scalar: s },
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            },
        ) if scalar == s && size == rows && scalar.kind == ScalarKind::Float => {
            Some(types.vec(columns, scalar))
        }
        (
            TypeInner::Matrix {
                columns: k,
                rows,
                scalar,
            },
            TypeInner::Matrix {
                columns,
                rows: inner,
                scalar: s,
            },
        ) if scalar == s && k == inner && scalar.kind == ScalarKind::Float => {
            Some(types.mat(columns, rows, scalar))
        }
        _ => None,
    }
}

/// `bool` or `vecN<bool>` matching the shape of `ty`.
fn bool_like(types: &mut TypeManager, ty: Handle<Type>) -> Handle<Type> {
    match *types.inner(ty) {
        TypeInner::Vector { size, .. } => types.vec(size, stria_ir::Scalar::BOOL),
        _ => types.bool(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stria_ir::Scalar;

    #[test]
    fn bitcast_table() {
        let mut types = TypeManager::new();
        let f32 = types.f32();
        let u32 = types.u32();
        let i32 = types.i32();
        let f16 = types.f16();
        let b = types.bool();
        let vec2h = types.vec2(Scalar::F16);
        let vec4h = types.vec4(Scalar::F16);
        let vec2u = types.vec2(Scalar::U32);
        let vec2i = types.vec2(Scalar::I32);
        let vec4u = types.vec4(Scalar::U32);
        let vec4f = types.vec4(Scalar::F32);

        assert!(bitcast_defined(&types, f32, u32));
        assert!(bitcast_defined(&types, i32, f32));
        assert!(bitcast_defined(&types, f16, f16));
        assert!(bitcast_defined(&types, vec4u, vec4f));
        assert!(bitcast_defined(&types, vec2h, u32));
        assert!(bitcast_defined(&types, f32, vec2h));
        assert!(bitcast_defined(&types, vec4h, vec2u));
        assert!(bitcast_defined(&types, vec2i, vec4h));

        assert!(!bitcast_defined(&types, f16, u32));
        assert!(!bitcast_defined(&types, b, u32));
        assert!(!bitcast_defined(&types, vec4u, vec4h));
        assert!(!bitcast_defined(&types, vec2i, vec2h));
        assert!(!bitcast_defined(&types, vec2u, u32));
    }

    #[test]
    fn binary_overloads() {
        let mut types = TypeManager::new();
        let f32 = types.f32();
        let i32 = types.i32();
        let u32 = types.u32();
        let vec3f = types.vec3(Scalar::F32);
        let vec2f = types.vec2(Scalar::F32);
        let vec3b = types.vec3(Scalar::BOOL);
        let m2x3 = types.mat(VectorSize::Bi, VectorSize::Tri, Scalar::F32);
        let m3x2 = types.mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
        let m3x3 = types.mat(VectorSize::Tri, VectorSize::Tri, Scalar::F32);

        assert_eq!(binary_result(&mut types, BinaryOp::Add, f32, f32), Some(f32));
        assert_eq!(binary_result(&mut types, BinaryOp::Multiply, f32, i32), None);
        assert_eq!(binary_result(&mut types, BinaryOp::Multiply, vec3f, f32), Some(vec3f));
        assert_eq!(binary_result(&mut types, BinaryOp::LessThan, vec3f, vec3f), Some(vec3b));
        assert_eq!(binary_result(&mut types, BinaryOp::ShiftLeft, i32, u32), Some(i32));
        assert_eq!(binary_result(&mut types, BinaryOp::ShiftLeft, i32, i32), None);
        assert_eq!(binary_result(&mut types, BinaryOp::Multiply, m2x3, vec2f), Some(vec3f));
        assert_eq!(binary_result(&mut types, BinaryOp::Multiply, vec3f, m2x3), Some(vec2f));
        assert_eq!(binary_result(&mut types, BinaryOp::Multiply, m2x3, m3x2), Some(m3x3));
        assert_eq!(binary_result(&mut types, BinaryOp::Xor, vec3b, vec3b), None);
    }

    #[test]
    fn unary_result_must_match_operand() {
        use crate::validation::{Capabilities, validate};
        use stria_ir::{Builder, Module};

        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f32 = b.types().f32();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let one = b.i32(1);
            b.unary(UnaryOp::Negation, f32, one);
            b.return_(f);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        assert!(
            failure
                .reason()
                .contains("unary: result value type 'f32' does not match negation result type 'i32'"),
            "{failure}"
        );
    }
}
