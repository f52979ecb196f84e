//! Assignment lowering.
//!
//! Assigning through a chain such as `self.items[2].position.x = 1` reads
//! every intermediate container into a temporary, sets the innermost
//! element and then writes the containers back outward. A write-back stops
//! at the first container shared by reference, since the change is already
//! visible through it; containers whose type is not known statically are
//! checked at runtime with `JumpIfShared`.

use brscript_core::{ClassKey, CompilationError, DataType};
use brscript_parser::ast::{BinaryOp, Expr, ExprKind};

use super::{FunctionCompiler, Operand};
use crate::analysis::IdentifierSource;
use crate::codegen::{Address, OpCode};

/// How one step of a chain addresses its element.
#[derive(Debug, Clone, Copy)]
enum Key {
    Named(u32),
    Keyed(Operand),
}

/// Where the root of a chain has to be written back to.
#[derive(Debug, Clone)]
enum RootWrite {
    /// The root was modified where it lives.
    InPlace,
    Member { owner: ClassKey, name: String },
    Static { owner: ClassKey, name: String },
    SelfProperty(String),
}

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    pub(super) fn compile_assignment(
        &mut self,
        op: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
    ) -> Result<(), CompilationError> {
        let info = self.info(target)?;
        match (&target.kind, &info.source) {
            (_, Some(IdentifierSource::StaticVariable { owner, name })) => {
                let current = match op {
                    Some(_) => self.read_static(owner, name)?,
                    None => Operand::nil(),
                };
                let (new_value, source) = self.assigned_value(op, current, value)?;
                self.write_static(owner, name, new_value, &source)
            }
            (ExprKind::Identifier(ident), Some(source)) => match source {
                IdentifierSource::Local { decl, .. } => {
                    let slot = self.local_address(*decl, target.span)?;
                    let (new_value, source) = self.assigned_value(op, Operand::fixed(slot), value)?;
                    self.store(slot, new_value, &info.data_type, &source);
                    self.release(new_value);
                    Ok(())
                }
                IdentifierSource::MemberVariable { owner, name } => {
                    let current = match op {
                        Some(_) => self.read_member(owner, name)?,
                        None => Operand::nil(),
                    };
                    let (new_value, source) = self.assigned_value(op, current, value)?;
                    self.write_member(owner, name, new_value, &source)
                }
                IdentifierSource::NativeProperty { .. } => {
                    let name = self.name_constant(&ident.name);
                    let current = match op {
                        Some(_) => {
                            let dst = self.alloc_temp();
                            self.emit(OpCode::GetNamed, &[dst.word(), Address::SelfRef.encode(), name]);
                            dst
                        }
                        None => Operand::nil(),
                    };
                    let (new_value, _) = self.assigned_value(op, current, value)?;
                    self.emit(OpCode::SetNamed, &[Address::SelfRef.encode(), name, new_value.word()]);
                    self.release(new_value);
                    Ok(())
                }
                _ => Err(CompilationError::internal(
                    format!("cannot assign to \"{}\"", ident.name),
                    target.span,
                )),
            },
            _ => self.assign_chain(op, target, value),
        }
    }

    /// The value to store: the right side, or `current op right` for
    /// compound assignments. Returns it with its static type.
    fn assigned_value(
        &mut self,
        op: Option<BinaryOp>,
        current: Operand,
        value: &Expr,
    ) -> Result<(Operand, DataType), CompilationError> {
        let rhs = self.compile_expr(value)?;
        let Some(op) = op else {
            return Ok((rhs, self.expr_type(value)));
        };
        let dst = self.alloc_temp();
        self.emit_operator(dst, current, rhs, op.to_operator());
        self.release_all(&[current, rhs]);
        Ok((dst, DataType::variant()))
    }

    /// Store into an instance variable of `self`, through its setter unless
    /// this function is that setter. Consumes `value`.
    fn write_member(
        &mut self,
        owner: &ClassKey,
        name: &str,
        value: Operand,
        source: &DataType,
    ) -> Result<(), CompilationError> {
        let slot = self.compiler.instance_slot(owner, name)?;
        match &slot.setter {
            Some(setter) if !self.is_accessor_of(name) => {
                let value = self.convert(value, &slot.data_type, source);
                let setter = self.name_constant(setter);
                self.emit_list(OpCode::CallSelf, &[Address::Nil.encode(), setter], 1, &[value.word()]);
                self.release(value);
            }
            _ => {
                self.store(Address::Member(slot.index), value, &slot.data_type, source);
                self.release(value);
            }
        }
        Ok(())
    }

    fn write_static(
        &mut self,
        owner: &ClassKey,
        name: &str,
        value: Operand,
        source: &DataType,
    ) -> Result<(), CompilationError> {
        let slot = self.compiler.static_slot(owner, name)?;
        let value = self.convert(value, &slot.data_type, source);
        let class = self.class_constant(owner);
        match &slot.setter {
            Some(setter) if !self.is_accessor_of(name) => {
                let setter = self.name_constant(setter);
                self.emit_list(OpCode::CallStatic, &[Address::Nil.encode(), class, setter], 1, &[value.word()]);
            }
            _ => self.emit(OpCode::SetStatic, &[class, slot.index, value.word()]),
        }
        self.release(value);
        Ok(())
    }

    // ========================================================================
    // Chains
    // ========================================================================

    /// Whether a chain stops descending at `expr`, reading it as a whole.
    fn is_chain_root(&self, expr: &Expr) -> Result<bool, CompilationError> {
        if !matches!(expr.kind, ExprKind::Attribute { .. } | ExprKind::Subscript { .. }) {
            return Ok(true);
        }
        let info = self.info(expr)?;
        Ok(info.value.is_some()
            || matches!(
                info.source,
                Some(
                    IdentifierSource::StaticVariable { .. }
                        | IdentifierSource::ScriptClass(_)
                        | IdentifierSource::NativeClass(_)
                )
            ))
    }

    fn assign_chain(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr) -> Result<(), CompilationError> {
        // Root first, target last.
        let mut chain = vec![target];
        let mut current = target;
        loop {
            let base = match &current.kind {
                ExprKind::Attribute { base, .. } | ExprKind::Subscript { base, .. } => base.as_ref(),
                _ => {
                    return Err(CompilationError::internal("cannot assign to this expression", target.span));
                }
            };
            chain.push(base);
            if self.is_chain_root(base)? {
                break;
            }
            current = base;
        }
        chain.reverse();

        let (root, write) = self.chain_root(chain[0])?;
        let mut containers = vec![root];
        let mut keys = Vec::with_capacity(chain.len() - 1);
        for (depth, expr) in chain.iter().enumerate().skip(1) {
            let key = self.chain_key(expr)?;
            keys.push(key);
            if depth < chain.len() - 1 {
                let container = containers[depth - 1];
                let element = self.get_step(container, key);
                containers.push(element);
            }
        }

        let last = keys.len() - 1;
        let container = containers[last];
        let current = match op {
            Some(_) => self.get_step(container, keys[last]),
            None => Operand::nil(),
        };
        let (new_value, source) = self.assigned_value(op, current, value)?;
        let target_type = self.expr_type(target);
        let new_value = self.convert(new_value, &target_type, &source);
        self.set_step(container, keys[last], new_value);
        self.release(new_value);

        let mut exits = Vec::new();
        let mut stopped = false;
        for depth in (1..containers.len()).rev() {
            match self.expr_type(chain[depth]).is_shared() {
                Some(true) => {
                    stopped = true;
                    break;
                }
                Some(false) => {}
                None => exits.push(self.emit_jump(OpCode::JumpIfShared, &[containers[depth].word()])),
            }
            self.set_step(containers[depth - 1], keys[depth - 1], containers[depth]);
        }
        if !stopped {
            let root_type = self.expr_type(chain[0]);
            self.write_back_root(write, root, &root_type, &mut exits)?;
        }
        for exit in exits {
            self.patch_jump(exit);
        }

        self.release_all(&containers);
        for key in keys {
            if let Key::Keyed(operand) = key {
                self.release(operand);
            }
        }
        Ok(())
    }

    /// Evaluate the root of a chain, deciding how it is written back.
    fn chain_root(&mut self, root: &Expr) -> Result<(Operand, RootWrite), CompilationError> {
        let info = self.info(root)?;
        match (&root.kind, &info.source) {
            (_, Some(IdentifierSource::StaticVariable { owner, name })) => {
                let operand = self.read_static(owner, name)?;
                let write = RootWrite::Static {
                    owner: owner.clone(),
                    name: name.clone(),
                };
                Ok((operand, write))
            }
            (ExprKind::Identifier(_), Some(IdentifierSource::MemberVariable { owner, name })) => {
                let slot = self.compiler.instance_slot(owner, name)?;
                let has_accessor = slot.getter.is_some() || slot.setter.is_some();
                if !has_accessor || self.is_accessor_of(name) {
                    return Ok((Operand::fixed(Address::Member(slot.index)), RootWrite::InPlace));
                }
                let operand = self.read_member(owner, name)?;
                let operand = self.materialize(operand);
                let write = RootWrite::Member {
                    owner: owner.clone(),
                    name: name.clone(),
                };
                Ok((operand, write))
            }
            (ExprKind::Identifier(ident), Some(IdentifierSource::NativeProperty { .. })) => {
                let operand = self.compile_expr(root)?;
                Ok((operand, RootWrite::SelfProperty(ident.name.clone())))
            }
            _ => Ok((self.compile_expr(root)?, RootWrite::InPlace)),
        }
    }

    fn chain_key(&mut self, expr: &Expr) -> Result<Key, CompilationError> {
        match &expr.kind {
            ExprKind::Attribute { name, .. } => Ok(Key::Named(self.name_constant(&name.name))),
            ExprKind::Subscript { index, .. } => {
                let key = self.compile_expr(index)?;
                Ok(Key::Keyed(self.materialize(key)))
            }
            _ => Err(CompilationError::internal("not a member access", expr.span)),
        }
    }

    fn get_step(&mut self, container: Operand, key: Key) -> Operand {
        let dst = self.alloc_temp();
        match key {
            Key::Named(name) => self.emit(OpCode::GetNamed, &[dst.word(), container.word(), name]),
            Key::Keyed(key) => self.emit(OpCode::GetKeyed, &[dst.word(), container.word(), key.word()]),
        }
        dst
    }

    fn set_step(&mut self, container: Operand, key: Key, value: Operand) {
        match key {
            Key::Named(name) => self.emit(OpCode::SetNamed, &[container.word(), name, value.word()]),
            Key::Keyed(key) => self.emit(OpCode::SetKeyed, &[container.word(), key.word(), value.word()]),
        }
    }

    fn write_back_root(
        &mut self,
        write: RootWrite,
        root: Operand,
        root_type: &DataType,
        exits: &mut Vec<usize>,
    ) -> Result<(), CompilationError> {
        if matches!(write, RootWrite::InPlace) {
            return Ok(());
        }
        match root_type.is_shared() {
            Some(true) => return Ok(()),
            Some(false) => {}
            None => exits.push(self.emit_jump(OpCode::JumpIfShared, &[root.word()])),
        }
        match write {
            RootWrite::InPlace => Ok(()),
            RootWrite::Member { owner, name } => {
                let slot = self.compiler.instance_slot(&owner, &name)?;
                match &slot.setter {
                    Some(setter) => {
                        let setter = self.name_constant(setter);
                        self.emit_list(OpCode::CallSelf, &[Address::Nil.encode(), setter], 1, &[root.word()]);
                    }
                    None => self.emit(OpCode::Assign, &[Address::Member(slot.index).encode(), root.word()]),
                }
                Ok(())
            }
            RootWrite::Static { owner, name } => {
                let slot = self.compiler.static_slot(&owner, &name)?;
                let class = self.class_constant(&owner);
                match &slot.setter {
                    Some(setter) if !self.is_accessor_of(&name) => {
                        let setter = self.name_constant(setter);
                        self.emit_list(OpCode::CallStatic, &[Address::Nil.encode(), class, setter], 1, &[root.word()]);
                    }
                    _ => self.emit(OpCode::SetStatic, &[class, slot.index, root.word()]),
                }
                Ok(())
            }
            RootWrite::SelfProperty(name) => {
                let name = self.name_constant(&name);
                self.emit(OpCode::SetNamed, &[Address::SelfRef.encode(), name, root.word()]);
                Ok(())
            }
        }
    }
}
