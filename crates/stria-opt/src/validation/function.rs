//! Function-level rules: parameters, entry points, workgroup sizes and the
//! call graph.

use std::collections::{HashMap, HashSet};

use stria_ir::{
    AddressSpace, Block, BuiltinValue, Function, Handle, InstKind, Instruction, Module,
    PipelineStage, TypeInner, ValueKind,
};

use super::{Capability, Validator};

/// Direct callees and directly referenced IO variables of every function.
#[derive(Debug, Default)]
pub(super) struct CallGraph {
    callees: HashMap<Handle<Function>, Vec<Handle<Function>>>,
    io_vars: HashMap<Handle<Function>, Vec<Handle<Instruction>>>,
}

impl CallGraph {
    pub(super) fn build(module: &Module) -> Self {
        let mut graph = Self::default();
        for &function in &module.functions {
            if graph.callees.contains_key(&function) {
                continue;
            }
            let mut callees = Vec::new();
            let mut io_vars = Vec::new();
            let mut seen = HashSet::new();
            collect(
                module,
                module.function(function).block(),
                &mut seen,
                &mut callees,
                &mut io_vars,
            );
            graph.callees.insert(function, callees);
            graph.io_vars.insert(function, io_vars);
        }
        graph
    }

    pub(super) fn callees(&self, function: Handle<Function>) -> &[Handle<Function>] {
        self.callees.get(&function).map_or(&[][..], Vec::as_slice)
    }

    /// IO variables referenced by `function` or anything it calls, in
    /// first-reference order.
    pub(super) fn referenced_io_vars(&self, function: Handle<Function>) -> Vec<Handle<Instruction>> {
        let mut out = Vec::new();
        let mut seen_vars = HashSet::new();
        let mut seen_functions = HashSet::new();
        let mut stack = vec![function];
        while let Some(current) = stack.pop() {
            if !seen_functions.insert(current) {
                continue;
            }
            for &var in self.io_vars.get(&current).map_or(&[][..], Vec::as_slice) {
                if seen_vars.insert(var) {
                    out.push(var);
                }
            }
            stack.extend(self.callees(current).iter().rev());
        }
        out
    }
}

fn collect(
    module: &Module,
    block: Handle<Block>,
    seen: &mut HashSet<Handle<Block>>,
    callees: &mut Vec<Handle<Function>>,
    io_vars: &mut Vec<Handle<Instruction>>,
) {
    if !seen.insert(block) {
        return;
    }
    let root = module.root_block();
    for &inst in module.block(block).instructions() {
        let instruction = module.instruction(inst);
        for operand in instruction.operands().iter().flatten() {
            let value = module.value(*operand);
            if let Some(function) = value.function() {
                if matches!(instruction.kind, InstKind::Call) && !callees.contains(&function) {
                    callees.push(function);
                }
                continue;
            }
            let Some(def) = value.instruction() else {
                continue;
            };
            let definition = module.instruction(def);
            if definition.block() != Some(root) || !matches!(definition.kind, InstKind::Var(_)) {
                continue;
            }
            let space = value
                .ty()
                .and_then(|ty| module.types.pointer(ty))
                .map(|(_, space, _)| space);
            if matches!(space, Some(AddressSpace::In | AddressSpace::Out)) && !io_vars.contains(&def) {
                io_vars.push(def);
            }
        }
        for child in instruction.kind.blocks() {
            collect(module, child, seen, callees, io_vars);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl Validator<'_> {
    pub(super) fn check_entry_point_set(&mut self, functions: &[Handle<Function>]) {
        let module = self.module;
        let entry_points: Vec<_> = functions
            .iter()
            .copied()
            .filter(|&f| module.function(f).is_entry_point())
            .collect();
        if entry_points.len() > 1 && !self.capabilities.contains(Capability::AllowMultipleEntryPoints) {
            self.function_error(
                entry_points[1],
                "a module with multiple entry points requires the AllowMultipleEntryPoints capability",
            );
        }

        let mut names: HashMap<&str, Handle<Function>> = HashMap::new();
        for &function in functions {
            let Some(name) = module.function_name(function) else {
                continue;
            };
            match names.get(name) {
                Some(&first) => {
                    let either_entry = module.function(first).is_entry_point()
                        || module.function(function).is_entry_point();
                    let message = if either_entry {
                        format!("entry point name '{name}' is not unique")
                    } else {
                        format!("duplicate function name '{name}'")
                    };
                    self.function_error(function, message);
                }
                None => {
                    names.insert(name, function);
                }
            }
        }
    }

    /// Reports every function reachable from itself through calls.
    pub(super) fn check_recursion(&mut self, functions: &[Handle<Function>]) {
        let mut marks = HashMap::new();
        let mut recursive = Vec::new();
        for &function in functions {
            self.visit_calls(function, &mut marks, &mut recursive);
        }
        for function in recursive {
            self.function_error(function, "recursive function calls are not allowed");
        }
    }

    fn visit_calls(
        &self,
        function: Handle<Function>,
        marks: &mut HashMap<Handle<Function>, Mark>,
        recursive: &mut Vec<Handle<Function>>,
    ) {
        match marks.get(&function) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                if !recursive.contains(&function) {
                    recursive.push(function);
                }
                return;
            }
            None => {}
        }
        marks.insert(function, Mark::Visiting);
        for &callee in self.call_graph.callees(function) {
            self.visit_calls(callee, marks, recursive);
        }
        marks.insert(function, Mark::Done);
    }

    pub(super) fn check_function(&mut self, function: Handle<Function>) {
        let module = self.module;
        let func = module.function(function);
        self.current_function = Some(function);
        self.scopes.push(HashSet::new());

        if self.check_params(function) {
            let return_type = func.return_type;
            if !self.types.is_void(return_type) && !self.types.is_constructible(return_type) {
                self.function_error(function, "function return type must be constructible");
            }

            if func.is_entry_point() && func.name.is_none() {
                self.function_error(function, "entry points must have names");
            }
            self.check_workgroup_size(function);

            if func.stage == Some(PipelineStage::Compute) && !self.types.is_void(return_type) {
                let message = format!(
                    "compute entry point must not have a return type, found {}",
                    self.quoted(return_type)
                );
                self.function_error(function, message);
            }

            if let Some(stage) = func.stage {
                self.check_shader_io(function, stage);
                if stage == PipelineStage::Vertex && !self.declares_position(function) {
                    self.function_error(function, "position must be declared for vertex entry point output");
                }
            }

            self.check_block(func.block());
        }

        self.scopes.pop();
        self.current_function = None;
    }

    /// Checks each parameter and brings it into scope. Returns `false` if
    /// the parameter list is too broken to check the body.
    fn check_params(&mut self, function: Handle<Function>) -> bool {
        let module = self.module;
        let func = module.function(function);
        let mut seen = HashSet::new();
        for &param in func.params() {
            let value = module.value(param);
            if !value.is_alive() {
                self.param_error(param, "destroyed parameter found in function parameter list");
                return false;
            }
            let ValueKind::FunctionParam {
                function: owner,
                attributes,
                binding_point,
            } = value.kind()
            else {
                self.param_error(param, "function parameter has nullptr parent function");
                return false;
            };
            match *owner {
                None => {
                    self.param_error(param, "function parameter has nullptr parent function");
                    return false;
                }
                Some(owner) if owner != function => {
                    self.param_error(param, "function parameter has incorrect parent function");
                    self.function_note(owner, "parent function declared here");
                    return false;
                }
                Some(_) => {}
            }
            let Some(ty) = value.ty() else {
                self.param_error(param, "function parameter has nullptr type");
                return false;
            };
            if !seen.insert(param) {
                self.param_error(param, "function parameter is not unique");
                continue;
            }

            let allowed = self.types.is_constructible(ty)
                || self.types.is_pointer(ty)
                || self.types.is_handle(ty);
            if !allowed {
                let message = format!(
                    "function parameter type, {}, must be constructible, a pointer, or a handle",
                    self.quoted(ty)
                );
                self.param_error(param, message);
            }

            if !func.is_entry_point() {
                if attributes.builtin.is_some() {
                    self.param_error(param, "builtins can only be decorated on entry point params");
                }
                if binding_point.is_some() {
                    self.param_error(param, "input param to non-entry point function has a binding point set");
                }
            }

            self.scope_add(param);
        }
        true
    }

    fn check_workgroup_size(&mut self, function: Handle<Function>) {
        let module = self.module;
        let func = module.function(function);
        let is_compute = func.stage == Some(PipelineStage::Compute);
        let Some(values) = &func.workgroup_size else {
            if is_compute {
                self.function_error(function, "compute entry point requires @workgroup_size");
            }
            return;
        };
        if !is_compute {
            self.function_error(function, "@workgroup_size only valid on compute entry point");
            return;
        }
        if !(1..=3).contains(&values.len()) {
            self.function_error(function, "@workgroup_size must have between 1 and 3 params");
            return;
        }

        let mut first_ty = None;
        let mut product: u64 = 1;
        for &value in values {
            let Some(ty) = self.type_of(value) else {
                self.function_error(function, "a @workgroup_size param is undefined or missing a type");
                return;
            };
            let is_int = matches!(
                self.types.inner(ty),
                TypeInner::Scalar(s) if s.is_integer()
            );
            if !is_int {
                let message = format!(
                    "@workgroup_size params must be an 'i32' or 'u32', received {}",
                    self.quoted(ty)
                );
                self.function_error(function, message);
                return;
            }
            match first_ty {
                None => first_ty = Some(ty),
                Some(first) if first != ty => {
                    self.function_error(function, "@workgroup_size params must be all 'i32's or all 'u32's");
                    return;
                }
                Some(_) => {}
            }

            match module.value(value).literal().and_then(|l| l.as_i64()) {
                Some(dim) if dim <= 0 => {
                    self.function_error(function, "@workgroup_size params must be greater than 0");
                    return;
                }
                Some(dim) => product = product.saturating_mul(dim.unsigned_abs()),
                None => {
                    if !self.capabilities.contains(Capability::AllowOverrides) {
                        let message = format!(
                            "@workgroup_size param is not a constant value, and IR capability '{}' is not set",
                            Capability::AllowOverrides
                        );
                        self.function_error(function, message);
                        return;
                    }
                }
            }
        }
        if product > u64::from(u32::MAX) {
            self.function_error(function, "workgroup grid size cannot exceed 0xffffffff");
        }
    }

    /// Whether a vertex entry point writes `@builtin(position)` through its
    /// return value or an output variable.
    fn declares_position(&self, function: Handle<Function>) -> bool {
        let module = self.module;
        let func = module.function(function);
        let is_position = |builtin: Option<BuiltinValue>| builtin == Some(BuiltinValue::Position);
        let struct_has_position = |ty| {
            self.types
                .members(ty)
                .is_some_and(|members| members.iter().any(|m| is_position(m.attributes.builtin)))
        };

        if is_position(func.return_attributes.builtin) || struct_has_position(func.return_type) {
            return true;
        }
        self.call_graph
            .referenced_io_vars(function)
            .into_iter()
            .any(|var| {
                let instruction = module.instruction(var);
                let InstKind::Var(info) = &instruction.kind else {
                    return false;
                };
                let store = instruction
                    .result()
                    .and_then(|v| module.value_type(v))
                    .and_then(|ty| self.types.pointer(ty));
                match store {
                    Some((store, AddressSpace::Out, _)) => {
                        is_position(info.attributes.builtin) || struct_has_position(store)
                    }
                    _ => false,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::validation::{Capabilities, Capability, validate};
    use stria_ir::{Builder, BuiltinValue, IoAttributes, Module, PipelineStage, Scalar};

    fn reason(module: &Module, caps: Capabilities) -> String {
        match validate(module, caps) {
            Ok(()) => String::new(),
            Err(failure) => failure.reason(),
        }
    }

    #[test]
    fn recursion_is_rejected() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let g = b.function("g", void);
        let f_body = b.module().function(f).block();
        let g_body = b.module().function(g).block();
        b.append(f_body, |b| {
            b.call(g, &[]);
            b.return_(f);
        });
        b.append(g_body, |b| {
            b.call(f, &[]);
            b.return_(g);
        });
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("error: recursive function calls are not allowed"), "{text}");
    }

    #[test]
    fn compute_needs_workgroup_size() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.entry_point("main", PipelineStage::Compute, void);
        let body = b.module().function(f).block();
        b.append(body, |b| b.return_(f));
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("compute entry point requires @workgroup_size"), "{text}");
    }

    #[test]
    fn workgroup_size_must_be_positive() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let f = b.compute_entry_point("main", [0, 1, 1]);
        let body = b.module().function(f).block();
        b.append(body, |b| b.return_(f));
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("@workgroup_size params must be greater than 0"), "{text}");
    }

    #[test]
    fn workgroup_size_takes_one_to_three_params() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let f = b.compute_entry_point("main", [1, 1, 1]);
        let body = b.module().function(f).block();
        b.append(body, |b| b.return_(f));

        module.function_mut(f).workgroup_size = Some(vec![]);
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("@workgroup_size must have between 1 and 3 params"), "{text}");

        let mut b = Builder::new(&mut module);
        let one = b.u32(1);
        module.function_mut(f).workgroup_size = Some(vec![one; 4]);
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("@workgroup_size must have between 1 and 3 params"), "{text}");

        module.function_mut(f).workgroup_size = Some(vec![one]);
        assert!(reason(&module, Capabilities::new()).is_empty());
    }

    #[test]
    fn direct_self_call_is_recursion() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            b.call(f, &[]);
            b.return_(f);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        let recursive = failure
            .errors()
            .filter(|d| d.message == "recursive function calls are not allowed")
            .count();
        assert_eq!(recursive, 1, "{failure}");
    }

    #[test]
    fn multiple_entry_points_need_capability() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        for name in ["a", "b"] {
            let f = b.compute_entry_point(name, [1, 1, 1]);
            let body = b.module().function(f).block();
            b.append(body, |b| b.return_(f));
        }
        let text = reason(&module, Capabilities::new());
        assert!(
            text.contains("a module with multiple entry points requires the AllowMultipleEntryPoints capability"),
            "{text}"
        );
        assert!(reason(&module, Capability::AllowMultipleEntryPoints.into()).is_empty());
    }

    #[test]
    fn vertex_needs_position() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let vec4 = b.types().vec4(Scalar::F32);
        let f = b.entry_point("vs", PipelineStage::Vertex, vec4);
        b.module_mut().function_mut(f).return_attributes = IoAttributes::location(0);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let zero = b.f32(0.0);
            let v = b.construct(vec4, &[zero, zero, zero, zero]);
            b.return_value(f, v);
        });
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("position must be declared for vertex entry point output"), "{text}");

        module.function_mut(f).return_attributes = IoAttributes::builtin(BuiltinValue::Position);
        assert!(reason(&module, Capabilities::new()).is_empty());
    }

    #[test]
    fn function_names_are_unique() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        for _ in 0..2 {
            let f = b.function("helper", void);
            let body = b.module().function(f).block();
            b.append(body, |b| b.return_(f));
        }
        let text = reason(&module, Capabilities::new());
        assert!(text.contains("error: duplicate function name 'helper'"), "{text}");
    }
}
