//! Expression lowering.

use brscript_core::{ClassKey, CompilationError, DataType, Operator, Variant};
use brscript_parser::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Ident};

use super::{FunctionCompiler, Operand};
use crate::analysis::{CallTarget, ExprInfo, IdentifierSource};
use crate::codegen::{Address, OpCode};

/// Name given to lambdas declared without one.
const ANONYMOUS_LAMBDA: &str = "<anonymous lambda>";

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    /// Compile an expression, returning where its value lives.
    ///
    /// The caller releases the operand once it has been consumed.
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> Result<Operand, CompilationError> {
        let info = self.info(expr)?;
        let folds = !matches!(
            expr.kind,
            ExprKind::Array(_) | ExprKind::Dictionary(_) | ExprKind::Lambda(_) | ExprKind::Assignment { .. }
        );
        if let (true, Some(value)) = (folds, &info.value) {
            return Ok(self.constant(value.clone()));
        }

        match &expr.kind {
            ExprKind::Literal(value) => Ok(self.constant(value.clone())),
            ExprKind::Identifier(ident) => self.compile_identifier(expr, ident, info),
            ExprKind::SelfRef => Ok(Operand::fixed(Address::SelfRef)),
            ExprKind::Array(elements) => {
                let values = self.compile_all(elements)?;
                let dst = self.alloc_temp();
                let ty = self.type_constant(&info.data_type);
                let words: Vec<u32> = values.iter().map(Operand::word).collect();
                self.emit_list(OpCode::ConstructArray, &[dst.word(), ty], values.len(), &words);
                self.release_all(&values);
                Ok(dst)
            }
            ExprKind::Dictionary(entries) => {
                let mut values = Vec::with_capacity(entries.len() * 2);
                for (key, value) in entries {
                    values.push(self.compile_expr(key)?);
                    values.push(self.compile_expr(value)?);
                }
                let dst = self.alloc_temp();
                let ty = self.type_constant(&info.data_type);
                let words: Vec<u32> = values.iter().map(Operand::word).collect();
                self.emit_list(OpCode::ConstructDictionary, &[dst.word(), ty], entries.len(), &words);
                self.release_all(&values);
                Ok(dst)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.compile_expr(operand)?;
                let dst = self.alloc_temp();
                self.emit_operator(dst, value, Operand::nil(), op.to_operator());
                self.release(value);
                Ok(dst)
            }
            ExprKind::Binary { op, left, right } => self.compile_binary(*op, left, right),
            ExprKind::Ternary {
                condition,
                true_expr,
                false_expr,
            } => {
                let dst = self.alloc_temp();
                let condition = self.compile_expr(condition)?;
                let to_false = self.emit_jump(OpCode::JumpIfNot, &[condition.word()]);
                self.release(condition);

                let value = self.compile_expr(true_expr)?;
                self.emit(OpCode::Assign, &[dst.word(), value.word()]);
                self.release(value);
                let to_end = self.emit_jump(OpCode::Jump, &[]);

                self.patch_jump(to_false);
                let value = self.compile_expr(false_expr)?;
                self.emit(OpCode::Assign, &[dst.word(), value.word()]);
                self.release(value);
                self.patch_jump(to_end);
                Ok(dst)
            }
            ExprKind::Assignment { op, target, value } => {
                self.compile_assignment(*op, target, value)?;
                Ok(Operand::nil())
            }
            ExprKind::Attribute { base, name } => self.compile_attribute(base, name, info),
            ExprKind::Subscript { base, index } => {
                let base = self.compile_expr(base)?;
                let key = self.compile_expr(index)?;
                let dst = self.alloc_temp();
                self.emit(OpCode::GetKeyed, &[dst.word(), base.word(), key.word()]);
                self.release_all(&[base, key]);
                Ok(dst)
            }
            ExprKind::Call { callee, args, .. } => self.compile_call(expr, callee, args, info),
            ExprKind::Cast { operand, .. } => {
                let value = self.compile_expr(operand)?;
                if info.data_type.is_variant() {
                    return Ok(value);
                }
                let dst = self.alloc_temp();
                let ty = self.type_constant(&info.data_type);
                self.emit(OpCode::Cast, &[dst.word(), value.word(), ty]);
                self.release(value);
                Ok(dst)
            }
            ExprKind::TypeTest { operand, negated, .. } => {
                let tested = self
                    .tables()
                    .type_tests
                    .get(&expr.id)
                    .ok_or_else(|| CompilationError::internal("type test was not analyzed", expr.span))?;
                let value = self.compile_expr(operand)?;
                let dst = self.alloc_temp();
                let ty = self.type_constant(tested);
                self.emit(OpCode::TypeTest, &[dst.word(), value.word(), ty]);
                if *negated {
                    self.emit_operator(dst, dst, Operand::nil(), Operator::Not);
                }
                self.release(value);
                Ok(dst)
            }
            ExprKind::Lambda(decl) => self.compile_lambda(decl),
            ExprKind::Preload { .. } => match info.data_type.class_key() {
                Some(key) => Ok(self.class_operand(key)),
                None => Err(CompilationError::internal("preload did not resolve to a script", expr.span)),
            },
            ExprKind::Await(inner) => {
                let value = self.compile_expr(inner)?;
                let dst = self.alloc_temp();
                self.emit(OpCode::Await, &[dst.word(), value.word()]);
                self.release(value);
                Ok(dst)
            }
        }
    }

    fn compile_all(&mut self, exprs: &[Expr]) -> Result<Vec<Operand>, CompilationError> {
        exprs.iter().map(|expr| self.compile_expr(expr)).collect()
    }

    pub(super) fn emit_operator(&mut self, dst: Operand, a: Operand, b: Operand, op: Operator) {
        self.emit(OpCode::Operator, &[dst.word(), a.word(), b.word(), op.index()]);
    }

    pub(super) fn class_operand(&mut self, key: &ClassKey) -> Operand {
        Operand::fixed(Address::Constant(self.class_constant(key)))
    }

    fn native_class_operand(&mut self, class: &str) -> Operand {
        Operand::fixed(Address::Constant(self.native_class_constant(class)))
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Operand, CompilationError> {
        if op.is_short_circuit() {
            return self.compile_logical(op, left, right);
        }
        let a = self.compile_expr(left)?;
        let b = self.compile_expr(right)?;
        let dst = self.alloc_temp();
        self.emit_operator(dst, a, b, op.to_operator());
        if op == BinaryOp::NotIn {
            self.emit_operator(dst, dst, Operand::nil(), Operator::Not);
        }
        self.release_all(&[a, b]);
        Ok(dst)
    }

    /// `and` / `or`: the right side only runs when it decides the result.
    fn compile_logical(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Operand, CompilationError> {
        let dst = self.alloc_temp();
        let decides = if op == BinaryOp::And {
            OpCode::JumpIfNot
        } else {
            OpCode::JumpIf
        };
        let short_value = op == BinaryOp::Or;

        let a = self.compile_expr(left)?;
        let first = self.emit_jump(decides, &[a.word()]);
        self.release(a);
        let b = self.compile_expr(right)?;
        let second = self.emit_jump(decides, &[b.word()]);
        self.release(b);

        let full = self.constant(Variant::Bool(!short_value));
        self.emit(OpCode::Assign, &[dst.word(), full.word()]);
        let to_end = self.emit_jump(OpCode::Jump, &[]);

        self.patch_jump(first);
        self.patch_jump(second);
        let short = self.constant(Variant::Bool(short_value));
        self.emit(OpCode::Assign, &[dst.word(), short.word()]);
        self.patch_jump(to_end);
        Ok(dst)
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn compile_identifier(&mut self, expr: &Expr, ident: &Ident, info: &ExprInfo) -> Result<Operand, CompilationError> {
        let source = info.source.as_ref().ok_or_else(|| {
            CompilationError::internal(format!("identifier \"{}\" was not resolved", ident.name), expr.span)
        })?;
        match source {
            IdentifierSource::Local { decl, .. } => Ok(Operand::fixed(self.local_address(*decl, expr.span)?)),
            IdentifierSource::MemberVariable { owner, name } => self.read_member(owner, name),
            IdentifierSource::StaticVariable { owner, name } => self.read_static(owner, name),
            IdentifierSource::MemberConstant { name, .. } => match info.data_type.class_key() {
                Some(key) => Ok(self.class_operand(key)),
                None => Err(CompilationError::internal(
                    format!("constant \"{}\" has no value", name),
                    expr.span,
                )),
            },
            IdentifierSource::MemberFunction {
                owner, is_static: true, ..
            } => {
                let class = self.class_operand(owner);
                self.get_named(class, &ident.name)
            }
            IdentifierSource::MemberFunction { .. }
            | IdentifierSource::MemberSignal { .. }
            | IdentifierSource::NativeProperty { .. }
            | IdentifierSource::NativeMethod { .. }
            | IdentifierSource::NativeSignal { .. }
            | IdentifierSource::NativeConstant { .. } => self.get_named(Operand::fixed(Address::SelfRef), &ident.name),
            IdentifierSource::ScriptClass(key) => Ok(self.class_operand(key)),
            IdentifierSource::NativeClass(class) => Ok(self.native_class_operand(class)),
            IdentifierSource::BuiltinType(ty) => {
                let index = self.type_constant(&DataType::builtin(*ty));
                Ok(Operand::fixed(Address::Constant(index)))
            }
            IdentifierSource::Singleton(_) | IdentifierSource::GlobalConstant | IdentifierSource::UtilityFunction => {
                let dst = self.alloc_temp();
                let name = self.name_constant(&ident.name);
                self.emit(OpCode::GetGlobal, &[dst.word(), name]);
                Ok(dst)
            }
        }
    }

    fn get_named(&mut self, base: Operand, name: &str) -> Result<Operand, CompilationError> {
        let dst = self.alloc_temp();
        let name = self.name_constant(name);
        self.emit(OpCode::GetNamed, &[dst.word(), base.word(), name]);
        self.release(base);
        Ok(dst)
    }

    /// Read an instance variable of `self`, through its getter unless this
    /// function is that getter.
    pub(super) fn read_member(&mut self, owner: &ClassKey, name: &str) -> Result<Operand, CompilationError> {
        let slot = self.compiler.instance_slot(owner, name)?;
        match &slot.getter {
            Some(getter) if !self.is_accessor_of(name) => {
                let dst = self.alloc_temp();
                let getter = self.name_constant(getter);
                self.emit_list(OpCode::CallSelf, &[dst.word(), getter], 0, &[]);
                Ok(dst)
            }
            _ => Ok(Operand::fixed(Address::Member(slot.index))),
        }
    }

    pub(super) fn read_static(&mut self, owner: &ClassKey, name: &str) -> Result<Operand, CompilationError> {
        let slot = self.compiler.static_slot(owner, name)?;
        let class = self.class_constant(owner);
        let dst = self.alloc_temp();
        match &slot.getter {
            Some(getter) if !self.is_accessor_of(name) => {
                let getter = self.name_constant(getter);
                self.emit_list(OpCode::CallStatic, &[dst.word(), class, getter], 0, &[]);
            }
            _ => self.emit(OpCode::GetStatic, &[dst.word(), class, slot.index]),
        }
        Ok(dst)
    }

    fn compile_attribute(&mut self, base: &Expr, name: &Ident, info: &ExprInfo) -> Result<Operand, CompilationError> {
        match &info.source {
            Some(IdentifierSource::StaticVariable { owner, name }) => self.read_static(owner, name),
            Some(IdentifierSource::ScriptClass(key)) => Ok(self.class_operand(key)),
            Some(IdentifierSource::NativeClass(class)) => Ok(self.native_class_operand(class)),
            _ => {
                let base = self.compile_expr(base)?;
                self.get_named(base, &name.name)
            }
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn compile_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        info: &ExprInfo,
    ) -> Result<Operand, CompilationError> {
        let target = info
            .call
            .clone()
            .ok_or_else(|| CompilationError::internal("call was not analyzed", expr.span))?;

        match target {
            CallTarget::SelfFunction { name, is_static } => {
                let args = self.compile_all(args)?;
                let name = self.name_constant(&name);
                if is_static {
                    let key = self.current_class()?;
                    let class = self.class_constant(&key);
                    self.emit_call(OpCode::CallStatic, &[class, name], &args)
                } else {
                    self.emit_call(OpCode::CallSelf, &[name], &args)
                }
            }
            CallTarget::Super { name } => {
                let args = self.compile_all(args)?;
                let name = self.name_constant(&name);
                self.emit_call(OpCode::CallSelfBase, &[name], &args)
            }
            CallTarget::ScriptMethod { name, on_instance, .. } => {
                let ExprKind::Attribute { base, .. } = &callee.kind else {
                    return Err(CompilationError::internal("method call without a receiver", expr.span));
                };
                if on_instance {
                    let base = self.compile_expr(base)?;
                    let args = self.compile_all(args)?;
                    let name = self.name_constant(&name);
                    let result = self.emit_call(OpCode::Call, &[base.word(), name], &args);
                    self.release(base);
                    return result;
                }
                let key = self
                    .info(base)?
                    .data_type
                    .class_key()
                    .cloned()
                    .ok_or_else(|| CompilationError::internal("static call on an unknown class", expr.span))?;
                let args = self.compile_all(args)?;
                let class = self.class_constant(&key);
                let name = self.name_constant(&name);
                self.emit_call(OpCode::CallStatic, &[class, name], &args)
            }
            CallTarget::NativeMethod { class, name, exact } => {
                let base = match &callee.kind {
                    ExprKind::Attribute { base, .. } => Some(base.as_ref()),
                    _ => None,
                };
                let is_static = match base {
                    Some(base) => self.info(base)?.data_type.is_meta,
                    None => self
                        .compiler
                        .env()
                        .registry()
                        .method(&class, &name)
                        .is_some_and(|method| method.is_static()),
                };
                if is_static {
                    let args = self.compile_all(args)?;
                    let class = self.native_class_constant(&class);
                    let name = self.name_constant(&name);
                    return self.emit_call(OpCode::CallNativeStatic, &[class, name], &args);
                }
                let receiver = match base {
                    Some(base) => self.compile_expr(base)?,
                    None => Operand::fixed(Address::SelfRef),
                };
                let args = self.compile_all(args)?;
                let name = self.name_constant(&name);
                let result = if exact {
                    let class = self.native_class_constant(&class);
                    self.emit_call(OpCode::CallMethodBind, &[receiver.word(), class, name], &args)
                } else {
                    self.emit_call(OpCode::Call, &[receiver.word(), name], &args)
                };
                self.release(receiver);
                result
            }
            CallTarget::BuiltinMethod { name, .. } => {
                let ExprKind::Attribute { base, .. } = &callee.kind else {
                    return Err(CompilationError::internal("builtin method call without a receiver", expr.span));
                };
                let base = self.compile_expr(base)?;
                let args = self.compile_all(args)?;
                let name = self.name_constant(&name);
                let result = self.emit_call(OpCode::CallBuiltin, &[base.word(), name], &args);
                self.release(base);
                result
            }
            CallTarget::Utility { name } => {
                let args = self.compile_all(args)?;
                let name = self.name_constant(&name);
                self.emit_call(OpCode::CallUtility, &[name], &args)
            }
            CallTarget::BuiltinConstructor(ty) => {
                let args = self.compile_all(args)?;
                let ty = self.type_constant(&DataType::builtin(ty));
                self.emit_call(OpCode::Construct, &[ty], &args)
            }
            CallTarget::Constructor => {
                let ExprKind::Attribute { base, .. } = &callee.kind else {
                    return Err(CompilationError::internal("constructor call without a class", expr.span));
                };
                let class = self.compile_expr(base)?;
                let args = self.compile_all(args)?;
                let result = self.emit_call(OpCode::New, &[class.word()], &args);
                self.release(class);
                result
            }
            CallTarget::CallableValue => {
                let callable = self.compile_expr(callee)?;
                let args = self.compile_all(args)?;
                let result = self.emit_call(OpCode::CallCallable, &[callable.word()], &args);
                self.release(callable);
                result
            }
            CallTarget::Dynamic { name } => match &callee.kind {
                ExprKind::Attribute { base, .. } => {
                    let base = self.compile_expr(base)?;
                    let args = self.compile_all(args)?;
                    let name = self.name_constant(&name);
                    let result = self.emit_call(OpCode::Call, &[base.word(), name], &args);
                    self.release(base);
                    result
                }
                _ => {
                    let args = self.compile_all(args)?;
                    let name = self.name_constant(&name);
                    self.emit_call(OpCode::CallSelf, &[name], &args)
                }
            },
        }
    }

    /// Emit a call writing into a fresh temporary. `head` holds the operands
    /// between `dst` and the argument count.
    fn emit_call(&mut self, op: OpCode, head: &[u32], args: &[Operand]) -> Result<Operand, CompilationError> {
        let dst = self.alloc_temp();
        let mut operands = Vec::with_capacity(head.len() + 1);
        operands.push(dst.word());
        operands.extend_from_slice(head);
        let words: Vec<u32> = args.iter().map(Operand::word).collect();
        self.emit_list(op, &operands, args.len(), &words);
        self.release_all(args);
        Ok(dst)
    }

    // ========================================================================
    // Lambdas
    // ========================================================================

    fn compile_lambda(&mut self, decl: &FunctionDecl) -> Result<Operand, CompilationError> {
        let analysis = self
            .tables()
            .function(decl.id)
            .ok_or_else(|| CompilationError::internal("lambda was not analyzed", decl.span))?;
        let name = if decl.name.name.is_empty() {
            ANONYMOUS_LAMBDA
        } else {
            decl.name.name.as_str()
        };

        let is_static = self.is_static;
        let function = FunctionCompiler::new(&mut *self.compiler, name, is_static, decl.span.line)
            .compile_decl(decl, analysis)?;
        let index = self.compiler.push_lambda(function);
        self.record_lambda(index);

        let captures = analysis
            .captures
            .iter()
            .map(|capture| self.local_address(capture.decl, decl.span).map(|address| address.encode()))
            .collect::<Result<Vec<_>, _>>()?;
        let op = if analysis.uses_self {
            OpCode::CreateSelfLambda
        } else {
            OpCode::CreateLambda
        };
        let dst = self.alloc_temp();
        self.emit_list(op, &[dst.word(), index], captures.len(), &captures);
        Ok(dst)
    }
}
