//! IR validation.
//!
//! [`validate`] walks a [`Module`] once and collects every problem it finds
//! as a [`Diagnostic`] pointing into the module's disassembly. Nothing is
//! short-circuited across instructions, so one run reports all errors. The
//! walk is read-only; the validator keeps a private copy of the type table
//! so it can intern the types it needs for comparisons.
//!
//! Rules that some backends need relaxed are gated behind [`Capability`]
//! flags.

mod builtins;
mod capabilities;
mod control_flow;
mod diagnostic;
mod function;
mod instructions;
mod shader_io;

pub use capabilities::{Capabilities, Capability};
pub use diagnostic::{Diagnostic, Failure, Severity};

use std::collections::{HashMap, HashSet};

use stria_ir::{
    Block, Disassembly, Function, Handle, InstKind, Instruction, Module, Source, Type,
    TypeManager, Value, ValueKind, disassemble,
};

use crate::{OptError, Pass};

use function::CallGraph;

/// Validates `module`, allowing the relaxations in `capabilities`.
pub fn validate(module: &Module, capabilities: Capabilities) -> Result<(), Failure> {
    Validator::new(module, capabilities).run()
}

/// A pass that validates the module and never modifies it.
#[derive(Debug, Default)]
pub struct IrValidation {
    pub capabilities: Capabilities,
}

impl IrValidation {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

impl Pass for IrValidation {
    fn name(&self) -> &str {
        "ir-validation"
    }

    fn run(&self, module: &mut Module) -> Result<bool, OptError> {
        validate(module, self.capabilities)?;
        Ok(false)
    }
}

/// Expected operand count of an instruction.
#[derive(Clone, Copy, Debug)]
enum Arity {
    Exactly(usize),
    Between(usize, usize),
    AtLeast(usize),
}

pub(crate) struct Validator<'m> {
    module: &'m Module,
    types: TypeManager,
    capabilities: Capabilities,
    dis: Disassembly,
    diagnostics: Vec<Diagnostic>,
    scopes: Vec<HashSet<Handle<Value>>>,
    block_stack: Vec<Handle<Block>>,
    control_stack: Vec<Handle<Instruction>>,
    /// The first `continue` seen for each loop.
    first_continues: HashMap<Handle<Instruction>, Handle<Instruction>>,
    visited: HashSet<Handle<Instruction>>,
    functions: HashSet<Handle<Function>>,
    override_ids: HashMap<u16, Handle<Instruction>>,
    current_function: Option<Handle<Function>>,
    call_graph: CallGraph,
}

impl<'m> Validator<'m> {
    fn new(module: &'m Module, capabilities: Capabilities) -> Self {
        Self {
            module,
            types: module.types.clone(),
            capabilities,
            dis: disassemble(module),
            diagnostics: Vec::new(),
            scopes: Vec::new(),
            block_stack: Vec::new(),
            control_stack: Vec::new(),
            first_continues: HashMap::new(),
            visited: HashSet::new(),
            functions: HashSet::new(),
            override_ids: HashMap::new(),
            current_function: None,
            call_graph: CallGraph::build(module),
        }
    }

    fn run(mut self) -> Result<(), Failure> {
        let module = self.module;
        self.scopes.push(HashSet::new());
        self.check_root_block();

        let mut unique = Vec::with_capacity(module.functions.len());
        for &function in &module.functions {
            if self.functions.insert(function) {
                unique.push(function);
            } else {
                let name = self.function_label(function);
                self.function_error(function, format!("function {name} added to module multiple times"));
            }
            self.scope_add(module.function(function).value());
        }

        self.check_entry_point_set(&unique);
        self.check_recursion(&unique);
        for function in unique {
            self.check_function(function);
        }
        self.scopes.pop();

        self.check_for_orphans();

        let errors = self
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        log::debug!("validation finished with {errors} error(s)");
        if errors == 0 {
            return Ok(());
        }
        let text = self.dis.text().to_string();
        self.diagnostics
            .push(Diagnostic::note(format!("# Disassembly\n{text}"), None));
        Err(Failure::new(self.diagnostics, text))
    }

    fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn check_for_orphans(&mut self) {
        if self.has_errors() {
            return;
        }
        let orphans: Vec<_> = self
            .module
            .instructions()
            .filter(|(handle, inst)| inst.is_alive() && !self.visited.contains(handle))
            .map(|(handle, _)| handle)
            .collect();
        for inst in orphans {
            let name = self.module.instruction(inst).friendly_name();
            self.inst_error(inst, format!("orphaned instruction: {name}"));
        }
    }

    fn check_root_block(&mut self) {
        let module = self.module;
        let root = module.root_block();
        self.block_stack.push(root);
        for &inst in module.block(root).instructions() {
            let instruction = module.instruction(inst);
            if instruction.block() != Some(root) {
                self.visited.insert(inst);
                self.inst_error(inst, "instruction in root block does not have root block as parent");
                continue;
            }
            let allowed = match instruction.kind {
                InstKind::Var(_) => true,
                InstKind::Override { .. } => self.capabilities.contains(Capability::AllowOverrides),
                InstKind::Let | InstKind::Construct => {
                    self.capabilities.contains(Capability::AllowModuleScopeLets)
                }
                _ => false,
            };
            if allowed {
                self.check_instruction(inst);
            } else {
                self.visited.insert(inst);
                let name = instruction.friendly_name();
                self.inst_error(inst, format!("root block: invalid instruction: {name}"));
            }
        }
        self.block_stack.pop();
    }

    /// Pushes a scope for `block` and checks its instructions. Must be paired
    /// with [`Validator::end_block`].
    fn begin_block(&mut self, block: Handle<Block>) {
        let module = self.module;
        self.scopes.push(HashSet::new());
        self.block_stack.push(block);

        if module.terminator(block).is_none() {
            self.block_error(block, "block does not end in a terminator instruction");
        }

        let instructions = module.block(block).instructions();
        let last = instructions.last().copied();
        for &inst in instructions {
            if module.instruction(inst).block() != Some(block) {
                self.visited.insert(inst);
                self.inst_error(inst, "block instruction does not have same block as parent");
                continue;
            }
            if module.instruction(inst).is_terminator() && Some(inst) != last {
                self.inst_error(inst, "must be the last instruction in the block");
            }
            self.check_instruction(inst);
        }
    }

    fn end_block(&mut self) {
        self.block_stack.pop();
        self.scopes.pop();
    }

    fn check_block(&mut self, block: Handle<Block>) {
        self.begin_block(block);
        self.end_block();
    }

    fn check_instruction(&mut self, inst: Handle<Instruction>) {
        self.visited.insert(inst);
        let instruction = self.module.instruction(inst);
        if !instruction.is_alive() {
            self.inst_error(inst, "destroyed instruction found in instruction list");
            return;
        }

        match &instruction.kind {
            InstKind::Var(_) => self.check_var(inst),
            InstKind::Override { .. } => self.check_override(inst),
            InstKind::Let => self.check_let(inst),
            InstKind::Access => self.check_access(inst),
            InstKind::Load => self.check_load(inst),
            InstKind::Store => self.check_store(inst),
            InstKind::LoadVectorElement => self.check_load_vector_element(inst),
            InstKind::StoreVectorElement => self.check_store_vector_element(inst),
            InstKind::Construct => self.check_construct(inst),
            InstKind::Convert => self.check_convert(inst),
            InstKind::Bitcast => self.check_bitcast(inst),
            InstKind::Swizzle { .. } => self.check_swizzle(inst),
            InstKind::Binary(_) => self.check_binary(inst),
            InstKind::Unary(_) => self.check_unary(inst),
            InstKind::Call => self.check_call(inst),
            InstKind::If { .. } => self.check_if(inst),
            InstKind::Loop { .. } => self.check_loop(inst),
            InstKind::Switch { .. } => self.check_switch(inst),
            InstKind::Return { .. } => self.check_return(inst),
            InstKind::ExitIf { .. } | InstKind::ExitLoop { .. } | InstKind::ExitSwitch { .. } => {
                self.check_exit(inst)
            }
            InstKind::NextIteration { .. } => self.check_next_iteration(inst),
            InstKind::Continue { .. } => self.check_continue(inst),
            InstKind::Unreachable => {
                self.check_results(inst, 0);
                self.check_operands(inst, Arity::Exactly(0));
            }
        }

        for value in instruction.results().iter().flatten() {
            self.scope_add(*value);
        }
    }

    // Operand and result checks

    /// Checks the result count and every result slot.
    fn check_results(&mut self, inst: Handle<Instruction>, count: usize) -> bool {
        let got = self.module.instruction(inst).results().len();
        if got != count {
            self.inst_error(inst, format!("expected exactly {count} results, got {got}"));
            return false;
        }
        self.check_each_result(inst)
    }

    fn check_each_result(&mut self, inst: Handle<Instruction>) -> bool {
        let mut ok = true;
        for index in 0..self.module.instruction(inst).results().len() {
            ok &= self.check_result(inst, index);
        }
        ok
    }

    fn check_result(&mut self, inst: Handle<Instruction>, index: usize) -> bool {
        let Some(value) = self.module.instruction(inst).results()[index] else {
            self.result_error(inst, index, "result is undefined");
            return false;
        };
        let result = self.module.value(value);
        if result.ty().is_none() {
            self.result_error(inst, index, "result type is undefined");
            return false;
        }
        if result.instruction() != Some(inst) {
            self.result_error(inst, index, "result instruction is undefined");
            return false;
        }
        true
    }

    /// Checks the operand count and every operand slot.
    fn check_operands(&mut self, inst: Handle<Instruction>, arity: Arity) -> bool {
        if !self.check_operand_count(inst, arity) {
            return false;
        }
        let mut ok = true;
        for index in 0..self.module.instruction(inst).operands().len() {
            ok &= self.check_operand(inst, index);
        }
        ok
    }

    fn check_operand_count(&mut self, inst: Handle<Instruction>, arity: Arity) -> bool {
        let got = self.module.instruction(inst).operands().len();
        let message = match arity {
            Arity::Exactly(n) if got != n => Some(format!("expected exactly {n} operands, got {got}")),
            Arity::Between(lo, hi) if got < lo || got > hi => {
                Some(format!("expected between {lo} and {hi} operands, got {got}"))
            }
            Arity::AtLeast(n) if got < n => Some(format!("expected at least {n} operands, got {got}")),
            _ => None,
        };
        match message {
            Some(message) => {
                self.inst_error(inst, message);
                false
            }
            None => true,
        }
    }

    /// Checks results and operands together, reporting problems in both.
    fn check_results_and_operands(&mut self, inst: Handle<Instruction>, results: usize, operands: Arity) -> bool {
        let results_ok = self.check_results(inst, results);
        let operands_ok = self.check_operands(inst, operands);
        results_ok && operands_ok
    }

    /// Checks an operand slot that may legitimately be empty.
    fn check_optional_operand(&mut self, inst: Handle<Instruction>, index: usize) -> bool {
        match self.module.instruction(inst).operand(index) {
            Some(_) => self.check_operand(inst, index),
            None => true,
        }
    }

    fn check_operand(&mut self, inst: Handle<Instruction>, index: usize) -> bool {
        let module = self.module;
        let Some(operand) = module.instruction(inst).operand(index) else {
            self.operand_error(inst, index, "operand is undefined");
            return false;
        };
        let value = module.value(operand);
        let function = value.function();
        if value.ty().is_none() && function.is_none() {
            self.operand_error(inst, index, "operand type is undefined");
            return false;
        }
        if !value.is_alive() {
            self.operand_error(inst, index, "operand is not alive");
            return false;
        }
        let holds_use = value
            .uses()
            .iter()
            .any(|usage| usage.instruction == inst && usage.operand == index);
        if !holds_use {
            self.operand_error(inst, index, "operand missing usage");
            return false;
        }
        if let Some(function) = function {
            if !self.functions.contains(&function) && !module.contains_function(function) {
                let name = self.function_label(function);
                self.operand_error(inst, index, format!("{name} is not part of the module"));
                return false;
            }
        }
        if value.literal().is_none() && !self.in_scope(operand) {
            let name = self.value_label(operand);
            self.operand_error(inst, index, format!("{name} is not in scope"));
            self.declaration_note(operand);
            return false;
        }
        true
    }

    // Scope

    fn scope_add(&mut self, value: Handle<Value>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(value);
        }
    }

    fn in_scope(&self, value: Handle<Value>) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&value))
    }

    // Type helpers

    fn type_of(&self, value: Handle<Value>) -> Option<Handle<Type>> {
        self.module.value_type(value)
    }

    fn operand_type(&self, inst: Handle<Instruction>, index: usize) -> Option<Handle<Type>> {
        self.module
            .instruction(inst)
            .operand(index)
            .and_then(|value| self.type_of(value))
    }

    fn result_type(&self, inst: Handle<Instruction>) -> Option<Handle<Type>> {
        self.module
            .instruction(inst)
            .result()
            .and_then(|value| self.type_of(value))
    }

    /// Quoted friendly name of a type.
    fn quoted(&self, ty: Handle<Type>) -> String {
        format!("'{}'", self.types.friendly_name(ty))
    }

    fn type_name(&self, ty: Handle<Type>) -> String {
        self.types.friendly_name(ty)
    }

    // Names

    fn value_label(&self, value: Handle<Value>) -> String {
        if let Some(name) = self.dis.value_name(value) {
            return name.to_string();
        }
        match self.module.value(value).kind() {
            ValueKind::Constant(literal) => literal.to_string(),
            ValueKind::Function(function) => self.function_label(*function),
            _ => "%undef".into(),
        }
    }

    fn function_label(&self, function: Handle<Function>) -> String {
        match self.module.function_name(function) {
            Some(name) => format!("%{name}"),
            None => "%undef".into(),
        }
    }

    // Diagnostics

    fn error(&mut self, source: Option<Source>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(message, source));
    }

    fn note(&mut self, source: Option<Source>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::note(message, source));
    }

    fn in_block_note(&mut self) {
        if let Some(&block) = self.block_stack.last() {
            let source = self.dis.block(block);
            self.note(source, "in block");
        }
    }

    fn inst_error(&mut self, inst: Handle<Instruction>, message: impl AsRef<str>) {
        let source = self.dis.instruction(inst);
        let prefix = self.module.instruction(inst).friendly_name();
        self.error(source, format!("{prefix}: {}", message.as_ref()));
        self.in_block_note();
    }

    fn operand_error(&mut self, inst: Handle<Instruction>, index: usize, message: impl AsRef<str>) {
        let source = self.dis.operand(inst, index).or(self.dis.instruction(inst));
        let prefix = self.module.instruction(inst).friendly_name();
        self.error(source, format!("{prefix}: {}", message.as_ref()));
        self.in_block_note();
    }

    fn result_error(&mut self, inst: Handle<Instruction>, index: usize, message: impl AsRef<str>) {
        let source = self.dis.result(inst, index).or(self.dis.instruction(inst));
        let prefix = self.module.instruction(inst).friendly_name();
        self.error(source, format!("{prefix}: {}", message.as_ref()));
        self.in_block_note();
    }

    fn function_error(&mut self, function: Handle<Function>, message: impl Into<String>) {
        let source = self.dis.function(function);
        self.error(source, message);
    }

    fn param_error(&mut self, param: Handle<Value>, message: impl Into<String>) {
        let source = self.dis.param(param);
        self.error(source, message);
    }

    fn block_error(&mut self, block: Handle<Block>, message: impl Into<String>) {
        let source = self.dis.block(block);
        self.error(source, message);
    }

    fn operand_note(&mut self, inst: Handle<Instruction>, index: usize, message: impl Into<String>) {
        let source = self.dis.operand(inst, index);
        self.note(source, message);
    }

    fn inst_note(&mut self, inst: Handle<Instruction>, message: impl Into<String>) {
        let source = self.dis.instruction(inst);
        self.note(source, message);
    }

    fn function_note(&mut self, function: Handle<Function>, message: impl Into<String>) {
        let source = self.dis.function(function);
        self.note(source, message);
    }

    /// A note pointing at where `value` was declared.
    fn declaration_note(&mut self, value: Handle<Value>) {
        let module = self.module;
        let name = self.value_label(value);
        let source = match module.value(value).kind() {
            ValueKind::InstructionResult {
                instruction: Some(inst),
            } => {
                let index = module
                    .instruction(*inst)
                    .results()
                    .iter()
                    .position(|&r| r == Some(value))
                    .unwrap_or(0);
                self.dis.result(*inst, index)
            }
            ValueKind::FunctionParam { .. } => self.dis.param(value),
            ValueKind::Function(function) => self.dis.function(*function),
            _ => None,
        };
        if source.is_some() {
            self.note(source, format!("{name} declared here"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stria_ir::{Access, AddressSpace, Builder, Literal};

    #[test]
    fn empty_module_is_valid() {
        let module = Module::new();
        assert!(validate(&module, Capabilities::new()).is_ok());
    }

    #[test]
    fn validation_pass_reports_failure() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        b.function("f", void);
        let pass = IrValidation::default();
        assert!(matches!(pass.run(&mut module), Err(OptError::Validation(_))));
    }

    #[test]
    fn missing_terminator_is_reported_on_the_block() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        b.function("my_func", void);
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        let expected = "\
:2:3 error: block does not end in a terminator instruction
  $B1: {
  ^^^
";
        assert!(failure.reason().starts_with(expected), "{failure}");
        assert!(failure.reason().contains("note: # Disassembly\n%my_func = func():void {"));
    }

    #[test]
    fn orphaned_instructions_are_reported() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| b.return_(f));
        let one = b.f32(1.0);
        b.let_("lost", one);
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        assert!(failure.reason().contains("error: let: orphaned instruction: let"), "{failure}");
    }

    #[test]
    fn root_block_only_holds_declarations() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let root = b.module().root_block();
        b.append(root, |b| {
            let one = b.constant(Literal::I32(1));
            b.let_("x", one);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        assert!(failure.reason().contains("let: root block: invalid instruction: let"), "{failure}");
        assert!(validate(&module, Capability::AllowModuleScopeLets.into()).is_ok());
    }

    #[test]
    fn out_of_scope_operand_gets_declaration_note() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let f32 = b.types().f32();
        let void = b.types().void();
        let f = b.function("f", void);
        let g = b.function("g", void);
        let f_body = b.module().function(f).block();
        let g_body = b.module().function(g).block();
        let one = b.f32(1.0);
        let x = b.append(f_body, |b| {
            let x = b.let_("x", one);
            b.return_(f);
            x
        });
        b.append(g_body, |b| {
            let two = b.f32(2.0);
            b.binary(stria_ir::BinaryOp::Add, f32, x, two);
            b.return_(g);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        let reason = failure.reason();
        assert!(reason.contains("error: binary: %x is not in scope"), "{reason}");
        assert!(reason.contains("note: %x declared here"), "{reason}");
    }

    #[test]
    fn resource_vars_need_binding_points() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let f32 = b.types().f32();
        let ptr = b.types().ptr(AddressSpace::Uniform, f32, Access::Read);
        let private = b.types().ptr(AddressSpace::Private, f32, Access::ReadWrite);
        let root = b.module().root_block();
        b.append(root, |b| {
            b.var("u", ptr);
            b.binding_var("p", private, 0, 0);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        let reason = failure.reason();
        assert!(reason.contains("var: resource variable missing binding points"), "{reason}");
        assert!(
            reason.contains("var: binding_points are only valid on resource variables"),
            "{reason}"
        );
    }
}
