//! `match` pattern lowering.
//!
//! A pattern compiles to a sequence of tests against the subject, each
//! followed by a conditional jump that is patched to wherever matching
//! continues on failure.

use brscript_core::{CompilationError, DataType, Operator, Variant, VariantType};
use brscript_parser::ast::{Pattern, PatternKind};

use super::{FunctionCompiler, Operand};
use crate::codegen::OpCode;

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    /// Test `subject` against `pattern`, binding its variables. Returns the
    /// jumps taken when the pattern does not match.
    pub(super) fn compile_pattern(&mut self, pattern: &Pattern, subject: Operand) -> Result<Vec<usize>, CompilationError> {
        let mut fails = Vec::new();
        match &pattern.kind {
            PatternKind::Literal(expr) | PatternKind::Expression(expr) => {
                let value = self.compile_expr(expr)?;
                let result = self.alloc_temp();
                self.emit(OpCode::MatchEqual, &[result.word(), subject.word(), value.word()]);
                fails.push(self.emit_jump(OpCode::JumpIfNot, &[result.word()]));
                self.release_all(&[value, result]);
            }
            PatternKind::Bind(_) => {
                let slot = self.declare_local(pattern.id);
                self.emit(OpCode::Assign, &[slot.encode(), subject.word()]);
            }
            PatternKind::Wildcard | PatternKind::Rest => {}
            PatternKind::Array(elements) => {
                let fixed: Vec<&Pattern> = elements
                    .iter()
                    .filter(|element| !matches!(element.kind, PatternKind::Rest))
                    .collect();
                self.test_container(subject, VariantType::Array, fixed.len(), pattern.is_open_ended(), &mut fails);
                for (index, element) in fixed.into_iter().enumerate() {
                    if matches!(element.kind, PatternKind::Wildcard) {
                        continue;
                    }
                    let key = self.constant(Variant::Int(index as i64));
                    let value = self.alloc_temp();
                    self.emit(OpCode::GetKeyed, &[value.word(), subject.word(), key.word()]);
                    fails.extend(self.compile_pattern(element, value)?);
                    self.release(value);
                }
            }
            PatternKind::Dictionary(entries) => {
                let fixed: Vec<_> = entries
                    .iter()
                    .filter(|(key, _)| !matches!(key.kind, PatternKind::Rest))
                    .collect();
                self.test_container(
                    subject,
                    VariantType::Dictionary,
                    fixed.len(),
                    pattern.is_open_ended(),
                    &mut fails,
                );
                for (key, value) in fixed {
                    let (PatternKind::Literal(key_expr) | PatternKind::Expression(key_expr)) = &key.kind else {
                        return Err(CompilationError::internal("dictionary pattern key is not constant", key.span));
                    };
                    let key = self.compile_expr(key_expr)?;
                    let found = self.alloc_temp();
                    self.emit_operator(found, key, subject, Operator::In);
                    fails.push(self.emit_jump(OpCode::JumpIfNot, &[found.word()]));
                    self.release(found);

                    if let Some(value) = value {
                        let element = self.alloc_temp();
                        self.emit(OpCode::GetKeyed, &[element.word(), subject.word(), key.word()]);
                        fails.extend(self.compile_pattern(value, element)?);
                        self.release(element);
                    }
                    self.release(key);
                }
            }
        }
        Ok(fails)
    }

    /// The subject is a container of the right kind and size.
    fn test_container(
        &mut self,
        subject: Operand,
        container: VariantType,
        size: usize,
        open_ended: bool,
        fails: &mut Vec<usize>,
    ) {
        let result = self.alloc_temp();
        let ty = self.type_constant(&DataType::builtin(container));
        self.emit(OpCode::TypeTest, &[result.word(), subject.word(), ty]);
        fails.push(self.emit_jump(OpCode::JumpIfNot, &[result.word()]));

        let actual = self.alloc_temp();
        let method = self.name_constant("size");
        self.emit_list(OpCode::CallBuiltin, &[actual.word(), subject.word(), method], 0, &[]);
        let expected = self.constant(Variant::Int(size as i64));
        let comparison = if open_ended {
            Operator::GreaterEqual
        } else {
            Operator::Equal
        };
        self.emit_operator(result, actual, expected, comparison);
        fails.push(self.emit_jump(OpCode::JumpIfNot, &[result.word()]));
        self.release_all(&[actual, result]);
    }
}
