//! Statement lowering and control flow.

use brscript_core::{CompilationError, DataType, Variant, VariantType};
use brscript_parser::ast::{ConstantDecl, Expr, MatchBranch, Stmt, StmtKind, Suite, VariableDecl};

use super::function::LoopLabels;
use super::{FunctionCompiler, Operand};
use crate::codegen::{Address, OpCode};

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    pub(super) fn compile_suite(&mut self, suite: &Suite) -> Result<(), CompilationError> {
        for stmt in &suite.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompilationError> {
        self.line = stmt.span.line;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.compile_expr(expr)?;
                self.release(value);
            }
            StmtKind::Var(decl) => self.compile_local_variable(decl)?,
            StmtKind::Const(decl) => self.compile_local_constant(decl)?,
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.compile_expr(condition)?;
                let to_else = self.emit_jump(OpCode::JumpIfNot, &[condition.word()]);
                self.release(condition);
                self.compile_suite(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.emit_jump(OpCode::Jump, &[]);
                        self.patch_jump(to_else);
                        self.compile_suite(else_branch)?;
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
            }
            StmtKind::While { condition, body } => {
                let start = self.offset();
                let condition = self.compile_expr(condition)?;
                let to_end = self.emit_jump(OpCode::JumpIfNot, &[condition.word()]);
                self.release(condition);

                self.loops.push(LoopLabels::default());
                self.compile_suite(body)?;
                let labels = self.pop_loop();
                self.line = stmt.span.line;
                let back = self.emit_jump(OpCode::Jump, &[]);
                self.patch_jump_to(back, start);

                self.patch_jump(to_end);
                for jump in labels.breaks {
                    self.patch_jump(jump);
                }
                for jump in labels.continues {
                    self.patch_jump_to(jump, start);
                }
            }
            StmtKind::For { iterable, body, .. } => self.compile_for(stmt, iterable, body)?,
            StmtKind::Match { test, branches } => self.compile_match(test, branches)?,
            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => {
                        let operand = self.compile_expr(value)?;
                        let source = self.expr_type(value);
                        let return_type = self.return_type.clone();
                        self.convert(operand, &return_type, &source)
                    }
                    None => Operand::nil(),
                };
                self.emit(OpCode::Return, &[value.word()]);
                self.release(value);
            }
            StmtKind::Break => {
                let jump = self.emit_jump(OpCode::Jump, &[]);
                self.innermost_loop(stmt)?.breaks.push(jump);
            }
            StmtKind::Continue => {
                let jump = self.emit_jump(OpCode::Jump, &[]);
                self.innermost_loop(stmt)?.continues.push(jump);
            }
            StmtKind::Pass => {}
            StmtKind::Assert { condition, message } => {
                let condition = self.compile_expr(condition)?;
                let message = match message {
                    Some(message) => self.compile_expr(message)?,
                    None => Operand::nil(),
                };
                self.emit(OpCode::Assert, &[condition.word(), message.word()]);
                self.release_all(&[condition, message]);
            }
        }
        Ok(())
    }

    fn pop_loop(&mut self) -> LoopLabels {
        self.loops.pop().unwrap_or_default()
    }

    fn innermost_loop(&mut self, stmt: &Stmt) -> Result<&mut LoopLabels, CompilationError> {
        self.loops
            .last_mut()
            .ok_or_else(|| CompilationError::internal("jump outside of a loop", stmt.span))
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn compile_local_variable(&mut self, decl: &VariableDecl) -> Result<(), CompilationError> {
        let declared = self
            .tables()
            .decl(decl.id)
            .map(|info| info.data_type.clone())
            .unwrap_or_else(DataType::variant);

        match &decl.initializer {
            Some(initializer) => {
                let value = self.compile_expr(initializer)?;
                let source = self.expr_type(initializer);
                let slot = self.declare_local(decl.id);
                self.store(slot, value, &declared, &source);
                self.release(value);
            }
            None => {
                let slot = self.declare_local(decl.id);
                self.emit_default(slot, &declared);
            }
        }
        Ok(())
    }

    /// Reset a slot to the default value of its type.
    fn emit_default(&mut self, slot: Address, data_type: &DataType) {
        let typed_container = data_type.is_hard()
            && (data_type.has_element_type(0) || data_type.has_element_type(1));
        match data_type.builtin_type() {
            Some(VariantType::Array) if typed_container => {
                let ty = self.type_constant(data_type);
                self.emit_list(OpCode::ConstructArray, &[slot.encode(), ty], 0, &[]);
            }
            Some(VariantType::Dictionary) if typed_container => {
                let ty = self.type_constant(data_type);
                self.emit_list(OpCode::ConstructDictionary, &[slot.encode(), ty], 0, &[]);
            }
            Some(VariantType::Array | VariantType::Dictionary) if data_type.is_hard() => {
                let ty = self.type_constant(data_type);
                self.emit_list(OpCode::Construct, &[slot.encode(), ty], 0, &[]);
            }
            _ => {
                let value = if data_type.is_hard() {
                    data_type.default_value()
                } else {
                    Variant::Nil
                };
                let value = self.constant(value);
                self.emit(OpCode::Assign, &[slot.encode(), value.word()]);
            }
        }
    }

    fn compile_local_constant(&mut self, decl: &ConstantDecl) -> Result<(), CompilationError> {
        let value = self
            .tables()
            .decl(decl.id)
            .and_then(|info| info.value.clone())
            .ok_or_else(|| CompilationError::internal("local constant has no value", decl.span))?;
        let slot = self.declare_local(decl.id);
        let value = self.constant(value);
        self.emit(OpCode::Assign, &[slot.encode(), value.word()]);
        Ok(())
    }

    // ========================================================================
    // Loops
    // ========================================================================

    /// `for v in container:`. The iteration state and the container live in
    /// temporaries for the whole loop; the variable has its own slot.
    fn compile_for(&mut self, stmt: &Stmt, iterable: &Expr, body: &Suite) -> Result<(), CompilationError> {
        let container = self.compile_expr(iterable)?;
        let container = self.materialize(container);
        let state = self.alloc_temp();
        let variable = self.declare_local(stmt.id);
        let variable_type = self
            .tables()
            .decl(stmt.id)
            .map(|info| info.data_type.clone())
            .unwrap_or_else(DataType::variant);

        let words = [state.word(), container.word(), variable.encode()];
        let begin = self.emit_jump(OpCode::IterBegin, &words);
        let body_start = self.offset();
        if variable_type.is_hard() && !variable_type.is_variant() {
            let ty = self.type_constant(&variable_type);
            self.emit(OpCode::AssignTyped, &[variable.encode(), variable.encode(), ty]);
        }

        self.loops.push(LoopLabels::default());
        self.compile_suite(body)?;
        let labels = self.pop_loop();

        let next = self.offset();
        self.line = stmt.span.line;
        let advance = self.emit_jump(OpCode::IterNext, &words);
        let back = self.emit_jump(OpCode::Jump, &[]);
        self.patch_jump_to(back, body_start);

        self.patch_jump(begin);
        self.patch_jump(advance);
        for jump in labels.breaks {
            self.patch_jump(jump);
        }
        for jump in labels.continues {
            self.patch_jump_to(jump, next);
        }
        self.release_all(&[state, container]);
        Ok(())
    }

    // ========================================================================
    // Match
    // ========================================================================

    /// Branches are tried in order; within a branch each pattern is an
    /// alternative.
    fn compile_match(&mut self, test: &Expr, branches: &[MatchBranch]) -> Result<(), CompilationError> {
        let subject = self.compile_expr(test)?;
        let subject = self.materialize(subject);
        let mut to_end = Vec::new();

        for branch in branches {
            self.line = branch.span.line;
            let mut matched = Vec::new();
            let mut failed = Vec::new();
            for pattern in &branch.patterns {
                for jump in failed.drain(..) {
                    self.patch_jump(jump);
                }
                failed = self.compile_pattern(pattern, subject)?;
                matched.push(self.emit_jump(OpCode::Jump, &[]));
            }

            // Every alternative failed: on to the next branch.
            for jump in failed.drain(..) {
                self.patch_jump(jump);
            }
            let to_next = self.emit_jump(OpCode::Jump, &[]);

            for jump in matched {
                self.patch_jump(jump);
            }
            let mut next_branch = vec![to_next];
            if let Some(guard) = &branch.guard {
                let guard = self.compile_expr(guard)?;
                next_branch.push(self.emit_jump(OpCode::JumpIfNot, &[guard.word()]));
                self.release(guard);
            }
            self.compile_suite(&branch.body)?;
            to_end.push(self.emit_jump(OpCode::Jump, &[]));

            for jump in next_branch {
                self.patch_jump(jump);
            }
        }

        for jump in to_end {
            self.patch_jump(jump);
        }
        self.release(subject);
        Ok(())
    }
}
