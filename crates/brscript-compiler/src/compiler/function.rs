//! Per-function compilation state.
//!
//! Stack layout of a compiled function:
//!
//! ```text
//! [captures...] [arguments...] [locals...] [temporaries...]
//! ```
//!
//! Every local declaration gets its own slot for the whole function.
//! Temporaries are recycled through a free list as soon as the instruction
//! consuming them has been emitted.

use brscript_core::{ClassKey, CompilationError, DataType, Span, Variant};
use brscript_parser::ast::{Expr, FunctionDecl, NodeId, VariableDecl};
use rustc_hash::FxHashMap;

use super::Compiler;
use crate::analysis::{BodyTables, ExprInfo, FunctionAnalysis, FunctionSignature};
use crate::codegen::{Address, BytecodeChunk, Constant, ConstantPool, OpCode};
use crate::compiled::CompiledFunction;

/// A value produced by an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Operand {
    pub address: Address,
    /// Temporaries go back to the free list once consumed.
    temporary: bool,
}

impl Operand {
    pub fn fixed(address: Address) -> Self {
        Self {
            address,
            temporary: false,
        }
    }

    pub fn nil() -> Self {
        Self::fixed(Address::Nil)
    }

    pub fn word(&self) -> u32 {
        self.address.encode()
    }
}

/// Pending jumps of the innermost loop.
#[derive(Debug, Default)]
pub(super) struct LoopLabels {
    pub breaks: Vec<usize>,
    pub continues: Vec<usize>,
}

/// Whether storing a `source` value into a `target` slot needs a checked,
/// converting assignment.
pub(super) fn needs_conversion(target: &DataType, source: &DataType) -> bool {
    target.is_hard() && !target.is_variant() && !(source.is_hard() && source == target)
}

pub(crate) struct FunctionCompiler<'c, 'a> {
    pub(super) compiler: &'c mut Compiler<'a>,
    name: String,
    chunk: BytecodeChunk,
    constants: ConstantPool,
    /// Declaration node to stack slot.
    locals: FxHashMap<NodeId, u32>,
    stack_size: u32,
    free_temps: Vec<u32>,
    pub(super) loops: Vec<LoopLabels>,
    pub(super) line: u32,
    pub(super) is_static: bool,
    /// Values returned are converted to this type.
    pub(super) return_type: DataType,
    /// Members whose accessor this function is; they are accessed directly.
    accessor_of: Vec<String>,
    lambdas: Vec<u32>,
    first_line: u32,
}

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    pub(crate) fn new(compiler: &'c mut Compiler<'a>, name: impl Into<String>, is_static: bool, line: u32) -> Self {
        Self {
            compiler,
            name: name.into(),
            chunk: BytecodeChunk::new(),
            constants: ConstantPool::new(),
            locals: FxHashMap::default(),
            stack_size: 0,
            free_temps: Vec::new(),
            loops: Vec::new(),
            line,
            is_static,
            return_type: DataType::variant(),
            accessor_of: Vec::new(),
            lambdas: Vec::new(),
            first_line: line,
        }
    }

    pub(crate) fn set_accessor_of(&mut self, members: Vec<String>) {
        self.accessor_of = members;
    }

    /// Whether reads and writes of `member` bypass its accessors here.
    pub(super) fn is_accessor_of(&self, member: &str) -> bool {
        self.accessor_of.iter().any(|name| name == member)
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Compile a function, accessor or lambda body.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn compile_decl(
        mut self,
        decl: &FunctionDecl,
        analysis: &FunctionAnalysis,
    ) -> Result<CompiledFunction, CompilationError> {
        for capture in &analysis.captures {
            self.declare_local(capture.decl);
        }
        for param in &decl.params {
            self.declare_local(param.id);
        }

        let signature = &analysis.signature;
        self.return_type = signature.return_type.clone();
        let default_count = decl.default_count();
        let required = decl.params.len() - default_count;
        let mut default_entries = Vec::new();
        if default_count > 0 {
            for (index, param) in decl.params.iter().enumerate().skip(required) {
                default_entries.push(self.chunk.current_offset());
                let Some(default) = &param.default else {
                    continue;
                };
                self.line = param.span.line;
                let value = self.compile_expr(default)?;
                let target = signature
                    .params
                    .get(index)
                    .map(|(_, ty)| ty.clone())
                    .unwrap_or_else(DataType::variant);
                let source = self.expr_type(default);
                let slot = self.local_address(param.id, param.span)?;
                self.store(slot, value, &target, &source);
                self.release(value);
            }
            default_entries.push(self.chunk.current_offset());
        }

        self.compile_suite(&decl.body)?;
        self.line = decl.span.end_line.max(decl.span.line);
        self.emit(OpCode::Return, &[Address::Nil.encode()]);

        let mut function = self.finish(signature);
        function.capture_count = analysis.captures.len();
        function.default_argument_count = default_count;
        function.default_entries = default_entries;
        function.uses_self = analysis.uses_self;
        Ok(function)
    }

    /// Compile the initializers of member or static variables in
    /// declaration order.
    pub(crate) fn compile_initializer(mut self, members: &[&VariableDecl]) -> Result<CompiledFunction, CompilationError> {
        let key = self.compiler.class_key()?;
        for decl in members {
            let Some(initializer) = &decl.initializer else {
                continue;
            };
            self.line = decl.span.line;
            let value = self.compile_expr(initializer)?;
            let source = self.expr_type(initializer);
            if decl.is_static {
                let slot = self.compiler.static_slot(&key, &decl.name.name)?;
                let value = self.convert(value, &slot.data_type, &source);
                let class = self.class_constant(&key);
                self.emit(OpCode::SetStatic, &[class, slot.index, value.word()]);
                self.release(value);
            } else {
                let slot = self.compiler.instance_slot(&key, &decl.name.name)?;
                self.store(Address::Member(slot.index), value, &slot.data_type, &source);
                self.release(value);
            }
        }
        self.emit(OpCode::Return, &[Address::Nil.encode()]);

        let mut signature = FunctionSignature::new(self.name.clone());
        signature.return_type = DataType::nil();
        signature.is_static = self.is_static;
        Ok(self.finish(&signature))
    }

    fn finish(self, signature: &FunctionSignature) -> CompiledFunction {
        CompiledFunction {
            name: self.name,
            chunk: self.chunk,
            constants: self.constants,
            capture_count: 0,
            argument_count: signature.params.len(),
            default_argument_count: 0,
            default_entries: Vec::new(),
            stack_size: self.stack_size,
            argument_names: signature.params.iter().map(|(name, _)| name.clone()).collect(),
            argument_types: signature.params.iter().map(|(_, ty)| ty.clone()).collect(),
            return_type: signature.return_type.clone(),
            is_static: signature.is_static || self.is_static,
            is_coroutine: signature.is_coroutine,
            uses_self: false,
            lambdas: self.lambdas,
            line: self.first_line,
        }
    }

    // ========================================================================
    // Analysis lookups
    // ========================================================================

    pub(super) fn tables(&self) -> &'a BodyTables {
        self.compiler.tables()
    }

    pub(super) fn info(&self, expr: &Expr) -> Result<&'a ExprInfo, CompilationError> {
        self.tables()
            .expr(expr.id)
            .ok_or_else(|| CompilationError::internal("expression was not analyzed", expr.span))
    }

    pub(super) fn expr_type(&self, expr: &Expr) -> DataType {
        self.tables().expr_type(expr.id)
    }

    pub(super) fn current_class(&self) -> Result<ClassKey, CompilationError> {
        self.compiler.class_key()
    }

    // ========================================================================
    // Stack slots
    // ========================================================================

    /// Give a declaration its own slot.
    pub(super) fn declare_local(&mut self, decl: NodeId) -> Address {
        let slot = self.stack_size;
        self.stack_size += 1;
        self.locals.insert(decl, slot);
        Address::Stack(slot)
    }

    pub(super) fn local_address(&self, decl: NodeId, span: Span) -> Result<Address, CompilationError> {
        self.locals
            .get(&decl)
            .map(|&slot| Address::Stack(slot))
            .ok_or_else(|| CompilationError::internal("local used before its declaration", span))
    }

    pub(super) fn alloc_temp(&mut self) -> Operand {
        let slot = self.free_temps.pop().unwrap_or_else(|| {
            self.stack_size += 1;
            self.stack_size - 1
        });
        Operand {
            address: Address::Stack(slot),
            temporary: true,
        }
    }

    pub(super) fn release(&mut self, operand: Operand) {
        if let (true, Address::Stack(slot)) = (operand.temporary, operand.address) {
            if !self.free_temps.contains(&slot) {
                self.free_temps.push(slot);
            }
        }
    }

    pub(super) fn release_all(&mut self, operands: &[Operand]) {
        for operand in operands {
            self.release(*operand);
        }
    }

    // ========================================================================
    // Constants
    // ========================================================================

    pub(super) fn constant(&mut self, value: Variant) -> Operand {
        Operand::fixed(Address::Constant(self.constants.add_value(value)))
    }

    pub(super) fn name_constant(&mut self, name: &str) -> u32 {
        self.constants.add_name(name)
    }

    pub(super) fn type_constant(&mut self, data_type: &DataType) -> u32 {
        self.constants.add_type(data_type.clone())
    }

    pub(super) fn class_constant(&mut self, key: &ClassKey) -> u32 {
        self.constants.add(Constant::Class(key.clone()))
    }

    pub(super) fn native_class_constant(&mut self, class: &str) -> u32 {
        self.constants.add(Constant::NativeClass(class.to_string()))
    }

    // ========================================================================
    // Emission
    // ========================================================================

    pub(super) fn emit(&mut self, op: OpCode, operands: &[u32]) {
        self.chunk.write_instruction(op, operands, self.line);
    }

    /// Emit a counted instruction: `head` words, the item count, then the
    /// items.
    pub(super) fn emit_list(&mut self, op: OpCode, head: &[u32], count: usize, items: &[u32]) {
        let mut operands = Vec::with_capacity(head.len() + 1 + items.len());
        operands.extend_from_slice(head);
        operands.push(count as u32);
        operands.extend_from_slice(items);
        self.emit(op, &operands);
    }

    /// Emit a jump with a placeholder target; returns the patch position.
    pub(super) fn emit_jump(&mut self, op: OpCode, operands: &[u32]) -> usize {
        self.chunk.emit_jump(op, operands, self.line)
    }

    pub(super) fn patch_jump(&mut self, at: usize) {
        self.chunk.patch_jump(at);
    }

    pub(super) fn patch_jump_to(&mut self, at: usize, target: usize) {
        self.chunk.patch_word(at, target as u32);
    }

    pub(super) fn offset(&self) -> usize {
        self.chunk.current_offset()
    }

    /// Store `value` into `dst`, converting when the slot is typed.
    pub(super) fn store(&mut self, dst: Address, value: Operand, target: &DataType, source: &DataType) {
        if dst == value.address {
            return;
        }
        if needs_conversion(target, source) {
            let ty = self.type_constant(target);
            self.emit(OpCode::AssignTyped, &[dst.encode(), value.word(), ty]);
        } else {
            self.emit(OpCode::Assign, &[dst.encode(), value.word()]);
        }
    }

    /// A value of the `target` type, converting into a temporary when
    /// needed. Consumes `value`.
    pub(super) fn convert(&mut self, value: Operand, target: &DataType, source: &DataType) -> Operand {
        if !needs_conversion(target, source) {
            return value;
        }
        let result = self.alloc_temp();
        let ty = self.type_constant(target);
        self.emit(OpCode::AssignTyped, &[result.word(), value.word(), ty]);
        self.release(value);
        result
    }

    /// Keep a value in a temporary of its own, so later code cannot change it
    /// under the caller.
    pub(super) fn materialize(&mut self, value: Operand) -> Operand {
        if value.temporary {
            return value;
        }
        let result = self.alloc_temp();
        self.emit(OpCode::Assign, &[result.word(), value.word()]);
        result
    }

    pub(super) fn record_lambda(&mut self, index: u32) {
        self.lambdas.push(index);
    }

    #[cfg(test)]
    pub(super) fn stack_size(&self) -> u32 {
        self.stack_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brscript_core::VariantType;

    #[test]
    fn conversion_is_needed_only_for_typed_targets() {
        let int = DataType::builtin(VariantType::Int);
        let float = DataType::builtin(VariantType::Float);
        assert!(!needs_conversion(&DataType::variant(), &int));
        assert!(!needs_conversion(&int, &int));
        assert!(needs_conversion(&float, &int));
        assert!(needs_conversion(&int, &DataType::variant()));
        assert!(!needs_conversion(&int.clone().inferred(), &DataType::variant()));
    }

    #[test]
    fn operands_encode_their_address() {
        assert_eq!(Operand::nil().word(), Address::Nil.encode());
        assert!(!Operand::fixed(Address::SelfRef).temporary);
    }
}
