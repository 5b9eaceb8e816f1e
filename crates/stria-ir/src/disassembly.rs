//! Textual dump of a module.
//!
//! Besides the text, [`disassemble`] records a [`Source`] span for every
//! printed instruction, operand, result, block, function and parameter so
//! diagnostics can point into the dump.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::Module;
use crate::arena::Handle;
use crate::block::Block;
use crate::function::Function;
use crate::instruction::{InstKind, Instruction};
use crate::types::TypeInner;
use crate::value::{Value, ValueKind};

/// A span in the disassembly: 1-based line and column, length in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Source {
    pub line: u32,
    pub column: u32,
    pub length: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Disassembly {
    text: String,
    instructions: HashMap<Handle<Instruction>, Source>,
    operands: HashMap<(Handle<Instruction>, usize), Source>,
    results: HashMap<(Handle<Instruction>, usize), Source>,
    blocks: HashMap<Handle<Block>, Source>,
    functions: HashMap<Handle<Function>, Source>,
    params: HashMap<Handle<Value>, Source>,
    value_names: HashMap<Handle<Value>, String>,
}

impl Disassembly {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The text of a 1-based line.
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.text.lines().nth(index)
    }

    pub fn instruction(&self, inst: Handle<Instruction>) -> Option<Source> {
        self.instructions.get(&inst).copied()
    }

    pub fn operand(&self, inst: Handle<Instruction>, index: usize) -> Option<Source> {
        self.operands.get(&(inst, index)).copied()
    }

    pub fn result(&self, inst: Handle<Instruction>, index: usize) -> Option<Source> {
        self.results.get(&(inst, index)).copied()
    }

    pub fn block(&self, block: Handle<Block>) -> Option<Source> {
        self.blocks.get(&block).copied()
    }

    pub fn function(&self, function: Handle<Function>) -> Option<Source> {
        self.functions.get(&function).copied()
    }

    pub fn param(&self, param: Handle<Value>) -> Option<Source> {
        self.params.get(&param).copied()
    }

    /// The `%name` a value was printed as.
    pub fn value_name(&self, value: Handle<Value>) -> Option<&str> {
        self.value_names.get(&value).map(String::as_str)
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Disassembles `module`, recording source spans.
pub fn disassemble(module: &Module) -> Disassembly {
    let mut printer = Printer::new(module);
    printer.print_module();
    printer.finish()
}

/// Disassembles `module` into text.
pub fn dump_module(module: &Module) -> String {
    disassemble(module).text
}

struct Printer<'a> {
    module: &'a Module,
    out: Disassembly,
    line: String,
    line_no: u32,
    indent: usize,
    next_id: u32,
    used_names: HashSet<String>,
    block_ids: HashMap<Handle<Block>, u32>,
    control_names: HashMap<Handle<Instruction>, String>,
    control_counts: [u32; 3],
}

impl<'a> Printer<'a> {
    fn new(module: &'a Module) -> Self {
        Self {
            module,
            out: Disassembly::default(),
            line: String::new(),
            line_no: 1,
            indent: 0,
            next_id: 0,
            used_names: HashSet::new(),
            block_ids: HashMap::new(),
            control_names: HashMap::new(),
            control_counts: [0; 3],
        }
    }

    fn finish(mut self) -> Disassembly {
        if !self.line.is_empty() {
            self.newline();
        }
        self.out
    }

    fn emit(&mut self, text: &str) -> Source {
        if self.line.is_empty() && self.indent > 0 {
            self.line.push_str(&"  ".repeat(self.indent));
        }
        let source = Source {
            line: self.line_no,
            column: self.line.len() as u32 + 1,
            length: text.len() as u32,
        };
        self.line.push_str(text);
        source
    }

    fn newline(&mut self) {
        self.out.text.push_str(&self.line);
        self.out.text.push('\n');
        self.line.clear();
        self.line_no += 1;
    }

    fn value_label(&mut self, value: Handle<Value>) -> String {
        if let Some(name) = self.out.value_names.get(&value) {
            return name.clone();
        }
        self.next_id += 1;
        let base = match self.module.value(value).kind() {
            ValueKind::Function(function) => self.module.function_name(*function).map(str::to_string),
            _ => self.module.name_of(value).map(str::to_string),
        };
        let label = match base {
            Some(base) => {
                let mut candidate = base.clone();
                let mut suffix = 0;
                while !self.used_names.insert(candidate.clone()) {
                    suffix += 1;
                    candidate = format!("{base}_{suffix}");
                }
                format!("%{candidate}")
            }
            None => format!("%{}", self.next_id),
        };
        self.out.value_names.insert(value, label.clone());
        label
    }

    fn value_text(&mut self, value: Option<Handle<Value>>) -> String {
        let Some(value) = value else {
            return "undef".into();
        };
        match self.module.value(value).literal() {
            Some(literal) => literal.to_string(),
            None => self.value_label(value),
        }
    }

    fn type_text(&self, value: Handle<Value>) -> String {
        match self.module.value_type(value) {
            Some(ty) => self.module.types.friendly_name(ty),
            None => "undef".into(),
        }
    }

    fn block_id(&mut self, block: Handle<Block>) -> String {
        let next = self.block_ids.len() as u32 + 1;
        let id = *self.block_ids.entry(block).or_insert(next);
        format!("$B{id}")
    }

    fn control_name(&mut self, inst: Handle<Instruction>) -> String {
        if let Some(name) = self.control_names.get(&inst) {
            return name.clone();
        }
        let (slot, prefix) = match self.module.instruction(inst).kind {
            InstKind::If { .. } => (0, "if"),
            InstKind::Loop { .. } => (1, "loop"),
            _ => (2, "switch"),
        };
        self.control_counts[slot] += 1;
        let name = format!("{prefix}_{}", self.control_counts[slot]);
        self.control_names.insert(inst, name.clone());
        name
    }

    fn print_module(&mut self) {
        self.print_structs();
        let root = self.module.root_block();
        if !self.module.block(root).is_empty() {
            self.print_block(root, Some("root"));
            self.newline();
        }
        for (i, &function) in self.module.functions.iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.print_function(function);
        }
    }

    fn print_structs(&mut self) {
        let types = &self.module.types;
        for (_, ty) in types.iter() {
            let TypeInner::Struct {
                members,
                align,
                flags,
                ..
            } = &ty.inner
            else {
                continue;
            };
            let name = ty.name.as_deref().unwrap_or("struct");
            let mut header = format!("{name} = struct @align({align})");
            if flags.contains(crate::types::StructFlags::BLOCK) {
                header.push_str(", @block");
            }
            header.push_str(" {");
            self.emit(&header);
            self.newline();
            for member in members {
                let mut line = format!(
                    "  {}:{} @offset({})",
                    member.name,
                    types.friendly_name(member.ty),
                    member.offset
                );
                for attribute in member.attributes.to_list() {
                    line.push_str(", ");
                    line.push_str(&attribute);
                }
                self.emit(&line);
                self.newline();
            }
            self.emit("}");
            self.newline();
            self.newline();
        }
    }

    fn print_function(&mut self, handle: Handle<Function>) {
        let function = self.module.function(handle);
        let label = self.value_label(function.value());
        let source = self.emit(&label);
        self.out.functions.insert(handle, source);
        self.emit(" = ");
        if let Some(stage) = function.stage {
            self.emit(&format!("@{stage} "));
        }
        if let Some(size) = &function.workgroup_size {
            let dims: Vec<_> = size.iter().map(|&v| self.value_text(Some(v))).collect();
            self.emit(&format!("@workgroup_size({}) ", dims.join(", ")));
        }
        self.emit("func(");
        for (i, &param) in function.params().iter().enumerate() {
            if i > 0 {
                self.emit(", ");
            }
            let text = format!("{}:{}", self.value_label(param), self.type_text(param));
            let source = self.emit(&text);
            self.out.params.insert(param, source);
            let mut attributes = Vec::new();
            if let ValueKind::FunctionParam {
                attributes: io,
                binding_point,
                ..
            } = self.module.value(param).kind()
            {
                attributes = io.to_list();
                if let Some(bp) = binding_point {
                    attributes.push(format!("@binding_point({}, {})", bp.group, bp.binding));
                }
            }
            if !attributes.is_empty() {
                self.emit(&format!(" [{}]", attributes.join(", ")));
            }
        }
        let return_type = self.module.types.friendly_name(function.return_type);
        self.emit(&format!("):{return_type}"));
        let attributes = function.return_attributes.to_list();
        if !attributes.is_empty() {
            self.emit(&format!(" [{}]", attributes.join(", ")));
        }
        self.emit(" {");
        self.newline();
        self.indent += 1;
        self.print_block(function.block(), None);
        self.indent -= 1;
        self.emit("}");
        self.newline();
    }

    fn print_block(&mut self, block: Handle<Block>, comment: Option<&str>) {
        let id = self.block_id(block);
        let source = self.emit(&id);
        self.out.blocks.insert(block, source);
        self.emit(": {");
        if let Some(comment) = comment {
            self.emit(&format!("  # {comment}"));
        }
        self.newline();
        self.indent += 1;
        for &inst in self.module.block(block).instructions() {
            self.print_instruction(inst);
        }
        self.indent -= 1;
        self.emit("}");
        self.newline();
    }

    fn print_operands(&mut self, inst: Handle<Instruction>, first: usize) {
        let operands = self.module.instruction(inst).operands();
        for (i, &operand) in operands.iter().enumerate().skip(first) {
            self.emit(if i == first { " " } else { ", " });
            let text = self.value_text(operand);
            let source = self.emit(&text);
            self.out.operands.insert((inst, i), source);
        }
    }

    /// Records the span of `handle` from `start` to the end of the current
    /// line, unless one was already recorded.
    fn close_span(&mut self, handle: Handle<Instruction>, start: Source) {
        let end = self.line.len() as u32 + 1;
        self.out.instructions.entry(handle).or_insert(Source {
            length: end.saturating_sub(start.column),
            ..start
        });
    }

    fn print_instruction(&mut self, handle: Handle<Instruction>) {
        let inst = self.module.instruction(handle);
        let start = self.emit("");
        if !inst.results().is_empty() {
            for (i, &result) in inst.results().iter().enumerate() {
                if i > 0 {
                    self.emit(", ");
                }
                let text = match result {
                    Some(value) => format!("{}:{}", self.value_label(value), self.type_text(value)),
                    None => "undef".into(),
                };
                let source = self.emit(&text);
                self.out.results.insert((handle, i), source);
            }
            self.emit(" = ");
        }
        let opcode = match &inst.kind {
            InstKind::Binary(op) => op.name(),
            InstKind::Unary(op) => op.name(),
            InstKind::Return { .. } => "ret",
            kind => kind.friendly_name(),
        };
        self.emit(opcode);

        match &inst.kind {
            InstKind::Var(info) => {
                if inst.operand(0).is_some() {
                    self.print_operands(handle, 0);
                }
                if let Some(bp) = info.binding_point {
                    self.emit(&format!(" @binding_point({}, {})", bp.group, bp.binding));
                }
                for attribute in info.attributes.to_list() {
                    self.emit(&format!(" {attribute}"));
                }
            }
            InstKind::Override { id } => {
                if inst.operand(0).is_some() {
                    self.print_operands(handle, 0);
                }
                if let Some(id) = id {
                    self.emit(&format!(" @id({id})"));
                }
            }
            InstKind::Swizzle { indices } => {
                self.print_operands(handle, 0);
                let components: String = indices
                    .iter()
                    .map(|&i| ['x', 'y', 'z', 'w'].get(i as usize).copied().unwrap_or('?'))
                    .collect();
                self.emit(&format!(", {components}"));
            }
            InstKind::If {
                true_block,
                false_block,
            } => {
                let (true_block, false_block) = (*true_block, *false_block);
                self.print_operands(handle, 0);
                let has_false = !self.module.block(false_block).is_empty();
                let mut targets = format!("t: {}", self.block_id(true_block));
                if has_false {
                    targets.push_str(&format!(", f: {}", self.block_id(false_block)));
                }
                let name = self.control_name(handle);
                self.emit(&format!(" [{targets}]"));
                self.close_span(handle, start);
                self.emit(&format!(" {{  # {name}"));
                self.newline();
                self.indent += 1;
                self.print_block(true_block, Some("true"));
                if has_false {
                    self.print_block(false_block, Some("false"));
                }
                self.indent -= 1;
                self.emit("}");
            }
            InstKind::Loop {
                initializer,
                body,
                continuing,
            } => {
                let (initializer, body, continuing) = (*initializer, *body, *continuing);
                let has_init = !self.module.block(initializer).is_empty();
                let has_cont = !self.module.block(continuing).is_empty();
                let mut targets = Vec::new();
                if has_init {
                    targets.push(format!("i: {}", self.block_id(initializer)));
                }
                targets.push(format!("b: {}", self.block_id(body)));
                if has_cont {
                    targets.push(format!("c: {}", self.block_id(continuing)));
                }
                let name = self.control_name(handle);
                self.emit(&format!(" [{}]", targets.join(", ")));
                self.close_span(handle, start);
                self.emit(&format!(" {{  # {name}"));
                self.newline();
                self.indent += 1;
                if has_init {
                    self.print_block(initializer, Some("initializer"));
                }
                self.print_block(body, Some("body"));
                if has_cont {
                    self.print_block(continuing, Some("continuing"));
                }
                self.indent -= 1;
                self.emit("}");
            }
            InstKind::Switch { cases } => {
                let cases = cases.clone();
                self.print_operands(handle, 0);
                let mut targets = Vec::new();
                for case in &cases {
                    let selectors: Vec<_> = case
                        .selectors
                        .iter()
                        .map(|selector| match selector {
                            Some(value) => self.value_text(Some(*value)),
                            None => "default".into(),
                        })
                        .collect();
                    targets.push(format!("c: ({}, {})", selectors.join(" "), self.block_id(case.block)));
                }
                let name = self.control_name(handle);
                self.emit(&format!(" [{}]", targets.join(", ")));
                self.close_span(handle, start);
                self.emit(&format!(" {{  # {name}"));
                self.newline();
                self.indent += 1;
                for case in &cases {
                    self.print_block(case.block, Some("case"));
                }
                self.indent -= 1;
                self.emit("}");
            }
            InstKind::ExitIf { target }
            | InstKind::ExitLoop { target }
            | InstKind::ExitSwitch { target } => {
                let target = *target;
                self.print_operands(handle, 0);
                self.close_span(handle, start);
                if let Some(target) = target {
                    let name = self.control_name(target);
                    self.emit(&format!("  # {name}"));
                }
            }
            InstKind::NextIteration { target } | InstKind::Continue { target } => {
                let is_next = matches!(inst.kind, InstKind::NextIteration { .. });
                self.close_span(handle, start);
                if let Some(target) = *target {
                    if let InstKind::Loop {
                        body, continuing, ..
                    } = self.module.instruction(target).kind
                    {
                        let id = self.block_id(if is_next { body } else { continuing });
                        self.emit(&format!("  # -> {id}"));
                    }
                }
            }
            _ => self.print_operands(handle, 0),
        }
        self.close_span(handle, start);
        self.newline();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;
    use crate::types::{Access, AddressSpace, Scalar, StructFlags, VectorSize};
    use crate::types::MemberDesc;

    #[test]
    fn dumps_structs_root_and_functions() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let mat = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
        let s = b.types().structure_with_attributes(
            "MyStruct",
            vec![MemberDesc::new("a", mat)],
            StructFlags::BLOCK,
        );
        let ptr = b.types().ptr(AddressSpace::Uniform, s, Access::Read);
        let root = b.module().root_block();
        let buffer = b.append(root, |b| b.binding_var("buffer", ptr, 0, 0));
        let f = b.function("foo", mat);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let mat_ptr = b.types().ptr(AddressSpace::Uniform, mat, Access::Read);
            let zero = b.u32(0);
            let p = b.access(mat_ptr, buffer, &[zero]);
            let m = b.load(p);
            b.return_value(f, m);
        });

        let expected = "\
MyStruct = struct @align(8), @block {
  a:mat3x2<f32> @offset(0)
}

$B1: {  # root
  %buffer:ptr<uniform, MyStruct, read> = var @binding_point(0, 0)
}

%foo = func():mat3x2<f32> {
  $B2: {
    %3:ptr<uniform, mat3x2<f32>, read> = access %buffer, 0u
    %4:mat3x2<f32> = load %3
    ret %4
  }
}
";
        pretty_assertions::assert_eq!(dump_module(&module), expected);
    }

    #[test]
    fn records_spans() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        let ret = b.append(body, |b| b.return_(f));

        let dis = disassemble(&module);
        assert_eq!(
            dis.function(f),
            Some(Source {
                line: 1,
                column: 1,
                length: 2
            })
        );
        assert_eq!(
            dis.block(body),
            Some(Source {
                line: 2,
                column: 3,
                length: 3
            })
        );
        assert_eq!(
            dis.instruction(ret),
            Some(Source {
                line: 3,
                column: 5,
                length: 3
            })
        );
        assert_eq!(dis.line(3), Some("    ret"));
    }

    #[test]
    fn control_flow_layout() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);
        let void = b.types().void();
        let f = b.function("f", void);
        let body = b.module().function(f).block();
        b.append(body, |b| {
            let lp = b.loop_();
            let (loop_body, continuing) = match b.module().instruction(lp).kind {
                InstKind::Loop {
                    body, continuing, ..
                } => (body, continuing),
                _ => unreachable!(),
            };
            b.append(loop_body, |b| {
                let cond = b.bool(true);
                let if_ = b.if_(cond);
                let true_block = b.module().instruction(if_).kind.blocks()[0];
                b.append(true_block, |b| b.exit_loop(lp, &[]));
                b.continue_(lp);
            });
            b.append(continuing, |b| b.next_iteration(lp));
            b.return_(f);
        });

        let expected = "\
%f = func():void {
  $B1: {
    loop [b: $B2, c: $B3] {  # loop_1
      $B2: {  # body
        if true [t: $B4] {  # if_1
          $B4: {  # true
            exit_loop  # loop_1
          }
        }
        continue  # -> $B3
      }
      $B3: {  # continuing
        next_iteration  # -> $B2
      }
    }
    ret
  }
}
";
        pretty_assertions::assert_eq!(dump_module(&module), expected);
    }
}
