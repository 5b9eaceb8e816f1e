//! Rules for structured control flow and terminators.

use stria_ir::{Block, BlockParent, Handle, InstKind, Instruction};

use super::{Arity, Validator};

impl Validator<'_> {
    pub(super) fn check_if(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::If {
            true_block,
            false_block,
        } = module.instruction(inst).kind
        else {
            return;
        };
        self.check_each_result(inst);
        if self.check_operands(inst, Arity::Exactly(1)) {
            let bool_ty = self.types.bool();
            if self.operand_type(inst, 0) != Some(bool_ty) {
                self.operand_error(inst, 0, "condition type must be 'bool'");
            }
        }

        self.control_stack.push(inst);
        self.check_block(true_block);
        if !module.block(false_block).is_empty() {
            self.check_block(false_block);
        }
        self.control_stack.pop();
    }

    pub(super) fn check_loop(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Loop {
            initializer,
            body,
            continuing,
        } = module.instruction(inst).kind
        else {
            return;
        };
        self.check_each_result(inst);
        self.check_operands(inst, Arity::Exactly(0));

        self.control_stack.push(inst);
        // Values from the initializer are visible in the body, and values
        // from the body are visible in the continuing block.
        let has_initializer = !module.block(initializer).is_empty();
        if has_initializer {
            self.begin_block(initializer);
        }
        self.begin_block(body);
        if !module.block(continuing).is_empty() {
            self.check_loop_continuing(inst, body, continuing);
            self.check_block(continuing);
        }
        self.first_continues.remove(&inst);
        self.end_block();
        if has_initializer {
            self.end_block();
        }
        self.control_stack.pop();
    }

    /// The continuing block may not use values the body declares at or
    /// after its first `continue`.
    fn check_loop_continuing(&mut self, inst: Handle<Instruction>, body: Handle<Block>, continuing: Handle<Block>) {
        let module = self.module;
        let Some(&first_continue) = self.first_continues.get(&inst) else {
            return;
        };
        let mut holder = first_continue;
        while let Some(block) = module.instruction(holder).block() {
            if block == body {
                break;
            }
            match module.block(block).parent() {
                BlockParent::Control(control) => holder = control,
                _ => return,
            }
        }
        let instructions = module.block(body).instructions();
        let Some(start) = instructions.iter().position(|&i| i == holder) else {
            return;
        };

        for &late in &instructions[start..] {
            for &result in module.instruction(late).results().iter().flatten() {
                for usage in module.value(result).uses() {
                    if !self.transitively_holds(continuing, usage.instruction) {
                        continue;
                    }
                    let name = self.value_label(result);
                    let message = format!(
                        "{name} cannot be used in continuing block as it is declared after the first continue in the loop's body"
                    );
                    self.operand_error(usage.instruction, usage.operand, message);
                    self.declaration_note(result);
                    self.inst_note(first_continue, "loop body's first continue");
                }
            }
        }
    }

    pub(super) fn check_switch(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Switch { cases } = &module.instruction(inst).kind else {
            return;
        };
        self.check_each_result(inst);
        if self.check_operands(inst, Arity::Exactly(1)) {
            let condition = self.operand_type(inst, 0);
            if !condition.is_some_and(|ty| self.types.is_integer_scalar(ty)) {
                self.operand_error(inst, 0, "condition type must be an integer scalar");
            }
        }
        if !cases.iter().any(|case| case.is_default()) {
            self.inst_error(inst, "missing default case for switch");
        }

        self.control_stack.push(inst);
        for case in cases {
            self.check_block(case.block);
        }
        self.control_stack.pop();
    }

    pub(super) fn check_return(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Return { function } = module.instruction(inst).kind else {
            return;
        };
        if !self.check_results_and_operands(inst, 0, Arity::Between(0, 1)) {
            return;
        }
        let Some(function) = function else {
            self.inst_error(inst, "undefined function");
            return;
        };
        if self.current_function != Some(function) {
            self.inst_error(inst, "function does not match containing function");
            return;
        }

        let return_type = module.function(function).return_type;
        let value = self.operand_type(inst, 0);
        if self.types.is_void(return_type) {
            if module.instruction(inst).operands().len() == 1 {
                self.inst_error(inst, "unexpected return value");
            }
            return;
        }
        match value {
            None => self.inst_error(inst, "expected return value"),
            Some(ty) if ty != return_type => {
                let message = format!(
                    "return value type {} does not match function return type {}",
                    self.quoted(ty),
                    self.quoted(return_type)
                );
                self.operand_error(inst, 0, message);
            }
            Some(_) => {}
        }
    }

    /// `exit_if`, `exit_loop` and `exit_switch`.
    pub(super) fn check_exit(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let kind = &module.instruction(inst).kind;
        if !self.check_results_and_operands(inst, 0, Arity::AtLeast(0)) {
            return;
        }
        let Some(target) = kind.exit_target() else {
            self.inst_error(inst, "has no parent control instruction");
            return;
        };
        if self.control_stack.is_empty() {
            self.inst_error(inst, "found outside all control instructions");
            return;
        }
        self.check_operands_match_target(inst, target);

        match kind {
            InstKind::ExitIf { .. } => {
                let top = self.control_stack.last().copied();
                if let Some(top) = top.filter(|&top| top != target) {
                    self.inst_error(inst, "if target jumps over other control instructions");
                    self.inst_note(top, "first control instruction jumped");
                }
            }
            InstKind::ExitLoop { .. } => {
                if self.check_controls_allowing_if(inst, target, "loop") {
                    self.check_exit_leaves_loop_body(inst, target);
                }
            }
            _ => {
                self.check_controls_allowing_if(inst, target, "switch");
            }
        }
    }

    /// Exit arguments must line up with the target's results.
    fn check_operands_match_target(&mut self, inst: Handle<Instruction>, target: Handle<Instruction>) {
        let module = self.module;
        let args = module.instruction(inst).operands();
        let results = module.instruction(target).results();
        let target_name = module.instruction(target).friendly_name();
        if args.len() != results.len() {
            let plural = |n: usize| if n == 1 { "value" } else { "values" };
            let message = format!(
                "provides {} {} but '{target_name}' expects {} {}",
                args.len(),
                plural(args.len()),
                results.len(),
                plural(results.len())
            );
            self.inst_error(inst, message);
            self.inst_note(target, format!("'{target_name}' declared here"));
            return;
        }
        for (i, &result) in results.iter().enumerate() {
            let (Some(result), Some(arg)) = (result, args[i]) else {
                continue;
            };
            let (Some(expected), Some(actual)) = (self.type_of(result), self.type_of(arg)) else {
                continue;
            };
            if expected != actual {
                let message = format!(
                    "operand with type {} does not match '{target_name}' target type {}",
                    self.quoted(actual),
                    self.quoted(expected)
                );
                self.operand_error(inst, i, message);
                self.declaration_note(result);
            }
        }
    }

    /// Walks the control stack down to `target`, allowing only `if`s in
    /// between.
    fn check_controls_allowing_if(
        &mut self,
        inst: Handle<Instruction>,
        target: Handle<Instruction>,
        what: &str,
    ) -> bool {
        let module = self.module;
        let stack = self.control_stack.clone();
        for &control in stack.iter().rev() {
            if control == target {
                return true;
            }
            if matches!(module.instruction(control).kind, InstKind::If { .. }) {
                continue;
            }
            self.inst_error(inst, format!("{what} target jumps over other control instructions"));
            self.inst_note(control, "first control instruction jumped");
            return false;
        }
        self.inst_error(inst, format!("{what} not found in parent control instructions"));
        false
    }

    /// `exit_loop` may only leave from the loop body.
    fn check_exit_leaves_loop_body(&mut self, inst: Handle<Instruction>, target: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Loop {
            initializer,
            continuing,
            ..
        } = module.instruction(target).kind
        else {
            return;
        };
        let mut block = module.instruction(inst).block();
        let mut direct = true;
        while let Some(current) = block {
            match module.block(current).parent() {
                BlockParent::Control(control) if control == target => {
                    if current == continuing {
                        self.inst_error(inst, "loop exit jumps out of continuing block");
                        if !direct {
                            let source = self.dis.block(continuing);
                            self.note(source, "in continuing block");
                        }
                    } else if current == initializer {
                        self.inst_error(inst, "loop exit not permitted in loop initializer");
                        if !direct {
                            let source = self.dis.block(initializer);
                            self.note(source, "in initializer block");
                        }
                    }
                    return;
                }
                BlockParent::Control(control) => {
                    block = module.instruction(control).block();
                    direct = false;
                }
                _ => return,
            }
        }
    }

    /// Whether `inst` sits in `block` or in any block nested under it.
    fn transitively_holds(&self, block: Handle<Block>, inst: Handle<Instruction>) -> bool {
        let module = self.module;
        let mut current = module.instruction(inst).block();
        while let Some(candidate) = current {
            if candidate == block {
                return true;
            }
            current = match module.block(candidate).parent() {
                BlockParent::Control(control) => module.instruction(control).block(),
                _ => None,
            };
        }
        false
    }

    /// Whether `inst` sits, at any depth, inside `block` of `control`.
    fn nested_in(&self, inst: Handle<Instruction>, control: Handle<Instruction>, wanted: Handle<Block>) -> bool {
        let module = self.module;
        let mut block = module.instruction(inst).block();
        while let Some(current) = block {
            match module.block(current).parent() {
                BlockParent::Control(parent) if parent == control => return current == wanted,
                BlockParent::Control(parent) => block = module.instruction(parent).block(),
                _ => return false,
            }
        }
        false
    }

    pub(super) fn check_continue(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::Continue { target } = module.instruction(inst).kind else {
            return;
        };
        if !self.check_results_and_operands(inst, 0, Arity::Exactly(0)) {
            return;
        }
        let Some(target) = target else {
            self.inst_error(inst, "has no associated loop");
            return;
        };
        let InstKind::Loop { body, .. } = module.instruction(target).kind else {
            self.inst_error(inst, "has no associated loop");
            return;
        };
        self.first_continues.entry(target).or_insert(inst);
        if self.nested_in(inst, target, body) {
            return;
        }
        if self.control_stack.contains(&target) {
            self.inst_error(inst, "must only be called from loop body");
        } else {
            self.inst_error(inst, "called outside of associated loop");
        }
    }

    pub(super) fn check_next_iteration(&mut self, inst: Handle<Instruction>) {
        let module = self.module;
        let InstKind::NextIteration { target } = module.instruction(inst).kind else {
            return;
        };
        if !self.check_results_and_operands(inst, 0, Arity::Exactly(0)) {
            return;
        }
        let Some(target) = target else {
            self.inst_error(inst, "has no associated loop");
            return;
        };
        let InstKind::Loop {
            initializer,
            continuing,
            ..
        } = module.instruction(target).kind
        else {
            self.inst_error(inst, "has no associated loop");
            return;
        };
        let block = module.instruction(inst).block();
        if block == Some(initializer) || block == Some(continuing) {
            return;
        }
        if self.control_stack.contains(&target) {
            self.inst_error(inst, "must only be called from loop initializer or continuing");
        } else {
            self.inst_error(inst, "called outside of associated loop");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::validation::{Capabilities, validate};
    use stria_ir::{BinaryOp, Block, Builder, Handle, InstKind, Instruction, Module};

    #[test]
    fn well_formed_loop_passes() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let lp = b.loop_();
            let LoopBlocks { body, continuing, .. } = loop_blocks(b.module(), lp);
            b.append(body, |b| {
                let cond = b.bool(true);
                let iff = b.if_(cond);
                let t = if_true(b.module(), iff);
                b.append(t, |b| b.exit_loop(lp, &[]));
                b.continue_(lp);
            });
            b.append(continuing, |b| b.next_iteration(lp));
            b.return_(f);
        });
        assert!(validate(&module, Capabilities::new()).is_ok());
    }

    #[test]
    fn continue_outside_body_is_rejected() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let lp = b.loop_();
            let LoopBlocks { body, continuing, .. } = loop_blocks(b.module(), lp);
            b.append(body, |b| b.continue_(lp));
            b.append(continuing, |b| b.continue_(lp));
            b.return_(f);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        assert!(
            failure.reason().contains("continue: must only be called from loop body"),
            "{failure}"
        );
    }

    #[test]
    fn exit_if_arity_mismatch() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let i32 = b.types().i32();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let cond = b.bool(true);
            let iff = b.if_with_results(cond, &[i32, i32]);
            let t = if_true(b.module(), iff);
            b.append(t, |b| {
                let one = b.i32(1);
                b.exit_if(iff, &[one]);
            });
            b.return_(f);
        });
        let failure = validate(&module, Capabilities::new()).unwrap_err();
        assert!(
            failure
                .reason()
                .contains("exit_if: provides 1 value but 'if' expects 2 values"),
            "{failure}"
        );
    }

    #[test]
    fn continuing_cannot_see_values_after_the_first_continue() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let i32 = b.types().i32();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let lp = b.loop_();
            let LoopBlocks { body, continuing, .. } = loop_blocks(b.module(), lp);
            let (early, late) = b.append(body, |b| {
                let zero = b.i32(0);
                let early = b.let_("early", zero);
                let cond = b.bool(true);
                let iff = b.if_(cond);
                let t = if_true(b.module(), iff);
                b.append(t, |b| b.continue_(lp));
                let one = b.i32(1);
                let late = b.let_("late", one);
                b.continue_(lp);
                (early, late)
            });
            b.append(continuing, |b| {
                b.binary(BinaryOp::Add, i32, early, early);
                let two = b.i32(2);
                b.binary(BinaryOp::Add, i32, late, two);
                b.next_iteration(lp);
            });
            b.return_(f);
        });

        let failure = validate(&module, Capabilities::new()).unwrap_err();
        let errors: Vec<_> = failure.errors().map(|d| d.message.as_str()).collect();
        assert_eq!(
            errors,
            [
                "binary: %late cannot be used in continuing block as it is declared after the first continue in the loop's body"
            ]
        );
        let reason = failure.reason();
        assert!(reason.contains("note: %late declared here"), "{reason}");
        assert!(reason.contains("note: loop body's first continue"), "{reason}");
    }

    #[test]
    fn exit_if_cannot_jump_over_controls() {
        enum Inner {
            If,
            Loop,
            Switch,
        }
        for inner in [Inner::If, Inner::Loop, Inner::Switch] {
            let mut module = Module::new();
            let mut b = Builder::new(&mut module);
            let void = b.types().void();
            let f = b.function("f", void);
            let body = b.module().function(f).block();
            b.append(body, |b| {
                let cond = b.bool(true);
                let outer = b.if_(cond);
                let t = if_true(b.module(), outer);
                b.append(t, |b| {
                    match inner {
                        Inner::If => {
                            let nested = b.if_(cond);
                            let nested_true = if_true(b.module(), nested);
                            b.append(nested_true, |b| b.exit_if(outer, &[]));
                        }
                        Inner::Loop => {
                            let lp = b.loop_();
                            let LoopBlocks { body, .. } = loop_blocks(b.module(), lp);
                            b.append(body, |b| b.exit_if(outer, &[]));
                        }
                        Inner::Switch => {
                            let zero = b.i32(0);
                            let sw = b.switch(zero);
                            let default = b.default_case(sw);
                            b.append(default, |b| b.exit_if(outer, &[]));
                        }
                    }
                    b.exit_if(outer, &[]);
                });
                b.return_(f);
            });

            let failure = validate(&module, Capabilities::new()).unwrap_err();
            let reason = failure.reason();
            assert!(
                reason.contains("exit_if: if target jumps over other control instructions"),
                "{reason}"
            );
            assert!(reason.contains("note: first control instruction jumped"), "{reason}");
        }
    }

    #[test]
    fn exit_loop_from_initializer_is_rejected() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let lp = b.loop_();
            let LoopBlocks {
                initializer,
                body,
                continuing,
            } = loop_blocks(b.module(), lp);
            b.append(initializer, |b| b.exit_loop(lp, &[]));
            b.append(body, |b| b.continue_(lp));
            b.append(continuing, |b| b.next_iteration(lp));
            b.return_(f);
        });

        let failure = validate(&module, Capabilities::new()).unwrap_err();
        assert!(
            failure
                .reason()
                .contains("exit_loop: loop exit not permitted in loop initializer"),
            "{failure}"
        );
    }

    struct LoopBlocks {
        initializer: Handle<Block>,
        body: Handle<Block>,
        continuing: Handle<Block>,
    }

    fn loop_blocks(module: &Module, inst: Handle<Instruction>) -> LoopBlocks {
        match module.instruction(inst).kind {
            InstKind::Loop {
                initializer,
                body,
                continuing,
            } => LoopBlocks {
                initializer,
                body,
                continuing,
            },
            _ => panic!("not a loop"),
        }
    }

    fn if_true(module: &Module, inst: Handle<Instruction>) -> Handle<Block> {
        match module.instruction(inst).kind {
            InstKind::If { true_block, .. } => true_block,
            _ => panic!("not an if"),
        }
    }
}
