//! The module: owner of every block, instruction, value and function, and
//! the primitive graph edits that keep def-use edges consistent.

use std::collections::HashMap;

use crate::arena::{Arena, Handle};
use crate::block::{Block, BlockParent};
use crate::error::IrError;
use crate::function::Function;
use crate::instruction::{InstKind, Instruction, SwitchCase};
use crate::symbols::SymbolTable;
use crate::types::{Type, TypeManager};
use crate::value::{Literal, Usage, Value, ValueKind};

#[derive(Clone, Debug)]
pub struct Module {
    pub types: TypeManager,
    pub symbols: SymbolTable,
    /// Functions in declaration order.
    pub functions: Vec<Handle<Function>>,
    function_arena: Arena<Function>,
    instructions: Arena<Instruction>,
    values: Arena<Value>,
    blocks: Arena<Block>,
    names: HashMap<Handle<Value>, String>,
    root: Handle<Block>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        let mut blocks = Arena::new();
        let root = blocks.append(Block::new(BlockParent::Module));
        Self {
            types: TypeManager::new(),
            symbols: SymbolTable::new(),
            functions: Vec::new(),
            function_arena: Arena::new(),
            instructions: Arena::new(),
            values: Arena::new(),
            blocks,
            names: HashMap::new(),
            root,
        }
    }

    /// The block of module-scope declarations.
    pub fn root_block(&self) -> Handle<Block> {
        self.root
    }

    pub fn block(&self, block: Handle<Block>) -> &Block {
        &self.blocks[block]
    }

    pub fn block_mut(&mut self, block: Handle<Block>) -> &mut Block {
        &mut self.blocks[block]
    }

    pub fn instruction(&self, inst: Handle<Instruction>) -> &Instruction {
        &self.instructions[inst]
    }

    /// Mutable access to an instruction's opcode data. Operand and result
    /// slots are only editable through the module so that uses stay in sync.
    pub fn instruction_mut(&mut self, inst: Handle<Instruction>) -> &mut Instruction {
        &mut self.instructions[inst]
    }

    /// Every instruction ever created, live or dead.
    pub fn instructions(&self) -> impl Iterator<Item = (Handle<Instruction>, &Instruction)> {
        self.instructions.iter()
    }

    pub fn value(&self, value: Handle<Value>) -> &Value {
        &self.values[value]
    }

    pub fn value_mut(&mut self, value: Handle<Value>) -> &mut Value {
        &mut self.values[value]
    }

    pub fn value_type(&self, value: Handle<Value>) -> Option<Handle<Type>> {
        self.values[value].ty
    }

    /// Overwrites the type of a value.
    pub fn set_value_type(&mut self, value: Handle<Value>, ty: Option<Handle<Type>>) {
        self.values[value].ty = ty;
    }

    pub fn function(&self, function: Handle<Function>) -> &Function {
        &self.function_arena[function]
    }

    pub fn function_mut(&mut self, function: Handle<Function>) -> &mut Function {
        &mut self.function_arena[function]
    }

    pub fn name_of(&self, value: Handle<Value>) -> Option<&str> {
        self.names.get(&value).map(String::as_str)
    }

    pub fn set_name(&mut self, value: Handle<Value>, name: &str) {
        self.names.insert(value, name.to_string());
    }

    pub fn function_name(&self, function: Handle<Function>) -> Option<&str> {
        self.function_arena[function].name.as_deref()
    }

    pub fn create_block(&mut self, parent: BlockParent) -> Handle<Block> {
        self.blocks.append(Block::new(parent))
    }

    /// Creates a new constant value.
    pub fn constant(&mut self, literal: Literal) -> Handle<Value> {
        let ty = self.types.scalar(literal.scalar());
        self.values
            .append(Value::new(ValueKind::Constant(literal), Some(ty)))
    }

    /// Creates a parameter that is not yet attached to a function.
    pub fn create_param(&mut self, ty: Option<Handle<Type>>) -> Handle<Value> {
        self.values.append(Value::new(
            ValueKind::FunctionParam {
                function: None,
                attributes: Default::default(),
                binding_point: None,
            },
            ty,
        ))
    }

    /// Marks a non-instruction value (e.g. a parameter) as destroyed.
    pub fn destroy_value(&mut self, value: Handle<Value>) {
        self.values[value].alive = false;
    }

    /// Creates a function with an empty entry block. The function is not
    /// added to [`Module::functions`].
    pub fn create_function(&mut self, name: Option<&str>, return_type: Handle<Type>) -> Handle<Function> {
        let handle = self.function_arena.next_handle();
        let block = self.create_block(BlockParent::Function(handle));
        let function_type = self.types.function();
        let value = self
            .values
            .append(Value::new(ValueKind::Function(handle), Some(function_type)));
        let name = name.map(|name| self.symbols.register(name));
        self.function_arena.append(Function {
            name,
            return_type,
            return_attributes: Default::default(),
            stage: None,
            workgroup_size: None,
            params: Vec::new(),
            block,
            value,
        })
    }

    /// Replaces the parameter list of `function`, pointing each parameter
    /// back at it.
    pub fn set_params(&mut self, function: Handle<Function>, params: Vec<Handle<Value>>) {
        for &param in &params {
            if let ValueKind::FunctionParam { function: owner, .. } = &mut self.values[param].kind {
                *owner = Some(function);
            }
        }
        self.function_arena[function].params = params;
    }

    pub fn append_param(&mut self, function: Handle<Function>, param: Handle<Value>) {
        let mut params = self.function_arena[function].params.clone();
        params.push(param);
        self.set_params(function, params);
    }

    /// Creates a detached instruction with one result per entry of
    /// `result_types`, registering a use for every operand.
    pub fn create_instruction(
        &mut self,
        kind: InstKind,
        operands: Vec<Option<Handle<Value>>>,
        result_types: &[Handle<Type>],
    ) -> Handle<Instruction> {
        let inst = self.instructions.append(Instruction {
            kind,
            operands: Vec::with_capacity(operands.len()),
            results: Vec::with_capacity(result_types.len()),
            block: None,
            alive: true,
        });
        for operand in operands {
            self.push_operand(inst, operand);
        }
        for &ty in result_types {
            self.add_result(inst, Some(ty));
        }
        inst
    }

    /// Appends a result slot to `inst`.
    pub fn add_result(&mut self, inst: Handle<Instruction>, ty: Option<Handle<Type>>) -> Handle<Value> {
        let value = self.values.append(Value::new(
            ValueKind::InstructionResult {
                instruction: Some(inst),
            },
            ty,
        ));
        self.instructions[inst].results.push(Some(value));
        value
    }

    /// The first result of `inst`.
    pub fn result(&self, inst: Handle<Instruction>) -> Result<Handle<Value>, IrError> {
        self.instructions[inst]
            .result()
            .ok_or_else(|| IrError::MissingResult {
                kind: self.instructions[inst].friendly_name(),
                instruction: inst,
                index: 0,
            })
    }

    /// Replaces the result slots of `inst`. Values dropped from the list
    /// lose their back-reference; values added gain one.
    pub fn set_results(&mut self, inst: Handle<Instruction>, results: Vec<Option<Handle<Value>>>) {
        let old = std::mem::take(&mut self.instructions[inst].results);
        for value in old.into_iter().flatten() {
            if let ValueKind::InstructionResult { instruction } = &mut self.values[value].kind {
                *instruction = None;
            }
        }
        for value in results.iter().flatten() {
            if let ValueKind::InstructionResult { instruction } = &mut self.values[*value].kind {
                *instruction = Some(inst);
            }
        }
        self.instructions[inst].results = results;
    }

    /// Sets operand `index` of `inst`, moving the recorded use from the old
    /// value to the new one.
    pub fn set_operand(&mut self, inst: Handle<Instruction>, index: usize, value: Option<Handle<Value>>) {
        let usage = Usage {
            instruction: inst,
            operand: index,
        };
        let operands = &mut self.instructions[inst].operands;
        if operands.len() <= index {
            operands.resize(index + 1, None);
        }
        if let Some(old) = operands[index] {
            self.values[old].uses.retain(|u| *u != usage);
        }
        self.instructions[inst].operands[index] = value;
        if let Some(new) = value {
            let uses = &mut self.values[new].uses;
            if !uses.contains(&usage) {
                uses.push(usage);
            }
        }
    }

    pub fn push_operand(&mut self, inst: Handle<Instruction>, value: Option<Handle<Value>>) {
        let index = self.instructions[inst].operands.len();
        self.set_operand(inst, index, value);
    }

    /// Removes every operand of `inst`, dropping the recorded uses.
    pub fn clear_operands(&mut self, inst: Handle<Instruction>) {
        let operands = std::mem::take(&mut self.instructions[inst].operands);
        for (index, operand) in operands.into_iter().enumerate() {
            if let Some(value) = operand {
                let usage = Usage {
                    instruction: inst,
                    operand: index,
                };
                self.values[value].uses.retain(|u| *u != usage);
            }
        }
    }

    /// Rewrites every use of `old` to refer to `new`. Afterwards `old` has
    /// no uses.
    pub fn replace_all_uses_with(&mut self, old: Handle<Value>, new: Handle<Value>) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.values[old].uses);
        for usage in uses {
            let still_held = self.instructions[usage.instruction]
                .operands
                .get(usage.operand)
                .copied()
                .flatten()
                == Some(old);
            if still_held {
                self.instructions[usage.instruction].operands[usage.operand] = Some(new);
                let new_uses = &mut self.values[new].uses;
                if !new_uses.contains(&usage) {
                    new_uses.push(usage);
                }
            }
        }
    }

    /// Appends `inst` to the end of `block`, detaching it from any block it
    /// was in.
    pub fn append(&mut self, block: Handle<Block>, inst: Handle<Instruction>) {
        self.remove(inst);
        self.blocks[block].instructions.push(inst);
        self.instructions[inst].block = Some(block);
    }

    pub fn prepend(&mut self, block: Handle<Block>, inst: Handle<Instruction>) {
        self.remove(inst);
        self.blocks[block].instructions.insert(0, inst);
        self.instructions[inst].block = Some(block);
    }

    /// Inserts `inst` immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: Handle<Instruction>, inst: Handle<Instruction>) -> Result<(), IrError> {
        self.insert_near(anchor, inst, 0)
    }

    /// Inserts `inst` immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: Handle<Instruction>, inst: Handle<Instruction>) -> Result<(), IrError> {
        self.insert_near(anchor, inst, 1)
    }

    fn insert_near(&mut self, anchor: Handle<Instruction>, inst: Handle<Instruction>, offset: usize) -> Result<(), IrError> {
        let block = self.instructions[anchor].block.ok_or(IrError::Detached {
            kind: self.instructions[anchor].friendly_name(),
            instruction: anchor,
        })?;
        self.remove(inst);
        let list = &mut self.blocks[block].instructions;
        let position = list
            .iter()
            .position(|&i| i == anchor)
            .ok_or(IrError::Detached {
                kind: self.instructions[anchor].friendly_name(),
                instruction: anchor,
            })?;
        list.insert(position + offset, inst);
        self.instructions[inst].block = Some(block);
        Ok(())
    }

    /// Removes `inst` from its block without destroying it.
    pub fn remove(&mut self, inst: Handle<Instruction>) {
        if let Some(block) = self.instructions[inst].block.take() {
            self.blocks[block].instructions.retain(|&i| i != inst);
        }
    }

    /// Removes `inst` from its block, drops its operand uses and marks it
    /// and its results dead.
    pub fn destroy(&mut self, inst: Handle<Instruction>) {
        self.remove(inst);
        self.clear_operands(inst);
        let results = self.instructions[inst].results.clone();
        for value in results.into_iter().flatten() {
            self.values[value].alive = false;
        }
        self.instructions[inst].alive = false;
    }

    /// Adds a case block to a switch. Returns `None` if `switch` is not a
    /// switch instruction.
    pub fn add_case(&mut self, switch: Handle<Instruction>, selectors: Vec<Option<Handle<Value>>>) -> Option<Handle<Block>> {
        if !matches!(self.instructions[switch].kind, InstKind::Switch { .. }) {
            return None;
        }
        let block = self.create_block(BlockParent::Control(switch));
        if let InstKind::Switch { cases } = &mut self.instructions[switch].kind {
            cases.push(SwitchCase { selectors, block });
        }
        Some(block)
    }

    /// The control instruction owning `block`, if any.
    pub fn parent_control(&self, block: Handle<Block>) -> Option<Handle<Instruction>> {
        self.blocks[block].parent_control()
    }

    /// The function whose body (transitively) contains `block`.
    pub fn block_function(&self, block: Handle<Block>) -> Option<Handle<Function>> {
        let mut current = block;
        // A corrupt graph may contain parent cycles; bound the walk.
        for _ in 0..=self.blocks.len() {
            match self.blocks[current].parent {
                BlockParent::Function(function) => return Some(function),
                BlockParent::Control(control) => current = self.instructions[control].block?,
                BlockParent::Module | BlockParent::Detached => return None,
            }
        }
        None
    }

    /// The terminator of `block`, if its last instruction is one.
    pub fn terminator(&self, block: Handle<Block>) -> Option<Handle<Instruction>> {
        self.blocks[block]
            .last()
            .filter(|&inst| self.instructions[inst].is_terminator())
    }

    /// Whether `function` is in [`Module::functions`].
    pub fn contains_function(&self, function: Handle<Function>) -> bool {
        self.functions.contains(&function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_of(module: &mut Module, from: Handle<Value>) -> Handle<Instruction> {
        let f32 = module.types.f32();
        module.create_instruction(InstKind::Load, vec![Some(from)], &[f32])
    }

    #[test]
    fn operands_record_uses() {
        let mut module = Module::new();
        let one = module.constant(Literal::F32(1.0));
        let load = load_of(&mut module, one);
        assert_eq!(
            module.value(one).uses(),
            &[Usage {
                instruction: load,
                operand: 0
            }]
        );
    }

    #[test]
    fn set_operand_moves_the_use() {
        let mut module = Module::new();
        let a = module.constant(Literal::F32(1.0));
        let b = module.constant(Literal::F32(2.0));
        let load = load_of(&mut module, a);
        module.set_operand(load, 0, Some(b));
        assert!(module.value(a).uses().is_empty());
        assert_eq!(module.value(b).uses().len(), 1);
        assert_eq!(module.instruction(load).operand(0), Some(b));
    }

    #[test]
    fn replace_all_uses_with_clears_old_uses() {
        let mut module = Module::new();
        let a = module.constant(Literal::U32(1));
        let b = module.constant(Literal::U32(2));
        let first = load_of(&mut module, a);
        let second = load_of(&mut module, a);
        module.replace_all_uses_with(a, b);
        assert!(module.value(a).uses().is_empty());
        assert_eq!(module.value(b).uses().len(), 2);
        assert_eq!(module.instruction(first).operand(0), Some(b));
        assert_eq!(module.instruction(second).operand(0), Some(b));
    }

    #[test]
    fn insert_before_keeps_block_membership() {
        let mut module = Module::new();
        let root = module.root_block();
        let a = module.constant(Literal::U32(1));
        let first = load_of(&mut module, a);
        let second = load_of(&mut module, a);
        module.append(root, first);
        module.insert_before(first, second).unwrap();
        assert_eq!(module.block(root).instructions(), &[second, first]);
        assert_eq!(module.instruction(second).block(), Some(root));

        module.remove(second);
        assert_eq!(module.block(root).instructions(), &[first]);
        assert_eq!(module.instruction(second).block(), None);
    }

    #[test]
    fn insert_before_detached_anchor_fails() {
        let mut module = Module::new();
        let a = module.constant(Literal::U32(1));
        let anchor = load_of(&mut module, a);
        let inst = load_of(&mut module, a);
        assert!(matches!(
            module.insert_before(anchor, inst),
            Err(IrError::Detached { .. })
        ));
    }

    #[test]
    fn destroy_detaches_everything() {
        let mut module = Module::new();
        let root = module.root_block();
        let a = module.constant(Literal::U32(1));
        let load = load_of(&mut module, a);
        module.append(root, load);
        let result = module.result(load).unwrap();
        module.destroy(load);
        assert!(!module.instruction(load).is_alive());
        assert!(!module.value(result).is_alive());
        assert!(module.value(a).uses().is_empty());
        assert!(module.block(root).is_empty());
    }

    #[test]
    fn function_params_point_back() {
        let mut module = Module::new();
        let void = module.types.void();
        let f32 = module.types.f32();
        let function = module.create_function(Some("f"), void);
        let param = module.create_param(Some(f32));
        module.append_param(function, param);
        assert!(matches!(
            module.value(param).kind(),
            ValueKind::FunctionParam { function: Some(owner), .. } if *owner == function
        ));
        assert_eq!(module.block_function(module.function(function).block()), Some(function));
    }
}
