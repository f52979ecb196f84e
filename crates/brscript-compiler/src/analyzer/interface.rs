//! Stage 2: member interfaces.
//!
//! Every member gets its type, folded value or signature here. Members are
//! resolved on demand as well: a constant referring to a later constant, or
//! another class asking for a member while this class's stage is running,
//! resolves just that member. The unit's member guard turns a definition
//! that reaches itself into a cyclic reference error.

use std::sync::Arc;

use brscript_core::{
    ClassCapabilities, ClassKey, DataType, EnumValues, ResolutionError, Span, TypeError, TypeSource, Variant,
    VariantType, WarningCode,
};
use brscript_parser::ast::{
    Accessors, ClassId, ClassNode, ConstantDecl, EnumDecl, EnumValueDecl, Expr, FunctionDecl,
    Member, ParameterDecl, VariableDecl,
};
use rustc_hash::FxHashSet;
use tracing::trace;

use super::const_fold::adapt_constant;
use super::types::AssignContext;
use super::{Analyzer, BaseState, FunctionContext};
use crate::analysis::{ClassStage, FunctionSignature, InheritanceState, MemberInfo, MemberKind};

/// Name of the synthesized function holding an inline getter body.
pub fn inline_getter_name(member: &str) -> String {
    format!("@{}_getter", member)
}

/// Name of the synthesized function holding an inline setter body.
pub fn inline_setter_name(member: &str) -> String {
    format!("@{}_setter", member)
}

/// Accessor function names of a variable, inline or named.
pub(crate) fn accessor_names(decl: &VariableDecl) -> (Option<String>, Option<String>) {
    match &decl.accessors {
        Accessors::None => (None, None),
        Accessors::Inline { getter, setter } => (
            getter.as_ref().map(|_| inline_getter_name(&decl.name.name)),
            setter.as_ref().map(|_| inline_setter_name(&decl.name.name)),
        ),
        Accessors::Named { getter, setter } => (
            getter.as_ref().map(|ident| ident.name.clone()),
            setter.as_ref().map(|ident| ident.name.clone()),
        ),
    }
}

impl Analyzer<'_> {
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn resolve_class_interface(&mut self, id: ClassId) {
        if self.unit.with_class(id, |class| class.stage) != Some(ClassStage::Inheritance) {
            return;
        }
        let tree = self.tree.clone();
        let Some(node) = tree.class(id) else {
            return;
        };

        self.resolve_class_inheritance(id);
        if self.unit.inheritance_state(id) == InheritanceState::Invalid {
            self.unit
                .update_class(id, |class| class.stage = ClassStage::InterfaceSolved);
            if self.unit.error_count() == 0 {
                self.error(ResolutionError::InvalidClass {
                    class: self.class_name(id),
                    span: node.span,
                });
            }
            return;
        }

        self.unit
            .update_class(id, |class| class.stage = ClassStage::InterfaceResolving);
        trace!(path = %self.unit.path(), class = %node.fqcn, "resolving interface");

        let base = self
            .unit
            .with_class(id, |class| class.base.clone())
            .unwrap_or_default();
        if let Some(base_key) = base.class_key() {
            let span = node.extends.as_ref().map(|clause| clause.span).unwrap_or(node.span);
            if let Err(err) = self.ensure_interface(base_key, span) {
                self.error(err);
            }
        }

        self.check_class_name(node);
        self.check_duplicates(node);

        for index in 0..node.members.len() {
            self.resolve_member(id, index);
        }
        self.check_conflicts(id, node);
        self.check_named_accessors(id, node);

        let mut capabilities = match base.class_key() {
            Some(base_key) => self
                .unit_of(&base_key.path)
                .and_then(|unit| unit.with_class(ClassId(base_key.index), |class| class.capabilities))
                .unwrap_or_default(),
            None => ClassCapabilities::empty(),
        };
        for function in node.functions() {
            capabilities |= ClassCapabilities::for_method(&function.name.name);
        }

        self.unit.update_class(id, |class| {
            class.capabilities = capabilities;
            class.stage = ClassStage::InterfaceSolved;
        });
    }

    /// Resolve one member of a class of this unit. Always records a result,
    /// even after errors, so later lookups do not repeat diagnostics.
    pub(crate) fn resolve_member(&mut self, id: ClassId, index: usize) -> Option<MemberInfo> {
        let tree = self.tree.clone();
        let node = tree.class(id)?;
        let member = node.members.get(index)?;
        let name = member.name()?.to_string();
        if let Some(existing) = self.unit.member(id, &name) {
            return Some(existing);
        }
        if node.member_indices.get(&name) != Some(&index) {
            // A duplicate declaration; only the indexed one is resolved.
            return None;
        }

        self.resolve_class_inheritance(id);
        if !self.unit.begin_member(id, &name) {
            self.error(ResolutionError::CyclicReference {
                class: self.class_name(id),
                span: member.span(),
            });
            return None;
        }
        let info = self.in_class(id, |analyzer| analyzer.build_member(id, member, index));
        self.unit.end_member(id, &name);

        let stored = info.clone();
        self.unit.update_class(id, |class| {
            class.members.entry(name).or_insert(stored);
        });
        Some(info)
    }

    fn build_member(&mut self, id: ClassId, member: &Member, index: usize) -> MemberInfo {
        let span = member.span();
        let name = member.name().unwrap_or_default().to_string();
        let mut info = MemberInfo {
            name: name.clone(),
            kind: MemberKind::Constant,
            data_type: DataType::variant(),
            value: None,
            signature: None,
            member_index: index,
            span,
        };

        match member {
            Member::Variable(decl) => {
                let (getter, setter) = accessor_names(decl);
                info.kind = MemberKind::Variable {
                    is_static: decl.is_static,
                    getter,
                    setter,
                    exported: decl.exported,
                };
                info.data_type = self.variable_type(decl);
            }
            Member::Constant(decl) => {
                let (data_type, value) = self.constant_value(decl);
                info.data_type = data_type;
                info.value = value;
            }
            Member::Signal(decl) => {
                let mut signature = FunctionSignature::new(name.clone());
                signature.params = self.parameter_types(&decl.params);
                info.kind = MemberKind::Signal;
                info.data_type = DataType::builtin(VariantType::Signal);
                info.signature = Some(signature);
            }
            Member::Enum(decl) => {
                let (data_type, value) = self.enum_type(decl);
                info.kind = MemberKind::Enum;
                info.data_type = data_type;
                info.value = Some(value);
            }
            Member::EnumValue(decl) => {
                info.kind = MemberKind::EnumValue;
                info.data_type = DataType::builtin(VariantType::Int);
                info.value = Some(Variant::Int(self.enum_value(id, decl)));
            }
            Member::Function(decl) => {
                info.kind = MemberKind::Function;
                info.data_type = DataType::builtin(VariantType::Callable);
                info.signature = Some(self.function_signature(decl));
            }
            Member::Class { id: nested, .. } => {
                info.kind = MemberKind::Class;
                info.data_type = DataType::class(self.key_of(*nested)).meta();
            }
            Member::Group(_) => {}
        }
        info
    }

    // ========================================================================
    // Member kinds
    // ========================================================================

    /// Run `f` as if inside the implicit initializer of a class member.
    pub(crate) fn in_initializer<R>(
        &mut self,
        is_static: bool,
        span: Span,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let function = self.function.replace(FunctionContext {
            name: if is_static { "@static_initializer" } else { "@implicit_new" }.to_string(),
            is_static,
            return_type: DataType::variant(),
            ..FunctionContext::default()
        });
        let statement = self.statement.replace(span);
        let result = f(self);
        self.function = function;
        self.statement = statement;
        result
    }

    fn variable_type(&mut self, decl: &VariableDecl) -> DataType {
        if let Some(spec) = &decl.ty {
            return self.resolve_type_spec(spec);
        }
        match (&decl.initializer, decl.infer) {
            (Some(initializer), true) => {
                let reduced = self.in_initializer(decl.is_static, decl.span, |analyzer| {
                    analyzer.reduce_expr(initializer)
                });
                self.inferred_type(&decl.name.name, reduced.data_type, initializer.span)
            }
            _ => DataType::variant(),
        }
    }

    /// Type of a `:=` declaration from its value.
    pub(crate) fn inferred_type(&mut self, name: &str, found: DataType, span: Span) -> DataType {
        if !found.is_hard() || found.is_builtin(VariantType::Nil) {
            self.warn(
                WarningCode::InferenceOnVariant,
                format!("the type of \"{}\" is inferred from a Variant value", name),
                span,
            );
            return DataType::variant();
        }
        found.with_source(TypeSource::AnnotatedInferred)
    }

    fn constant_value(&mut self, decl: &ConstantDecl) -> (DataType, Option<Variant>) {
        let declared = decl.ty.as_ref().map(|spec| self.resolve_type_spec(spec));
        let errors_before = self.unit.error_count();
        let reduced = self.in_initializer(true, decl.span, |analyzer| {
            analyzer.reduce_expr(&decl.initializer)
        });
        let mut value = reduced.value.clone();
        if value.is_none() && self.unit.error_count() == errors_before {
            self.error(TypeError::NotConstant {
                context: format!("value of constant \"{}\"", decl.name.name),
                span: decl.initializer.span,
            });
        }

        let data_type = match declared {
            Some(declared) => {
                self.check_assignment(
                    &declared,
                    &reduced.data_type,
                    decl.initializer.span,
                    AssignContext::Assignment,
                );
                value = value.map(|v| adapt_constant(&v, &declared).unwrap_or(v));
                declared
            }
            None if reduced.data_type.is_set() => reduced.data_type.with_source(TypeSource::AnnotatedInferred),
            None => DataType::variant(),
        };
        (data_type, value)
    }

    /// A constant integer, or an error at `expr`.
    fn constant_int(&mut self, expr: &Expr, context: &str) -> Option<i64> {
        let errors_before = self.unit.error_count();
        let reduced = self.in_initializer(true, expr.span, |analyzer| analyzer.reduce_expr(expr));
        match reduced.value.as_ref().and_then(Variant::as_int) {
            Some(value) if !matches!(reduced.value, Some(Variant::Float(_))) => Some(value),
            _ => {
                if self.unit.error_count() == errors_before {
                    self.error(TypeError::NotConstant {
                        context: context.to_string(),
                        span: expr.span,
                    });
                }
                None
            }
        }
    }

    fn enum_type(&mut self, decl: &EnumDecl) -> (DataType, Variant) {
        let name = decl
            .name
            .as_ref()
            .map(|ident| ident.name.clone())
            .unwrap_or_default();
        let mut values = Vec::with_capacity(decl.values.len());
        let mut next = 0i64;
        for entry in &decl.values {
            let value = match &entry.value {
                Some(expr) => {
                    let context = format!("value of enum member \"{}\"", entry.name.name);
                    self.constant_int(expr, &context).unwrap_or(next)
                }
                None => next,
            };
            values.push((entry.name.name.clone(), value));
            next = value.wrapping_add(1);
        }
        let values = Arc::new(EnumValues(values));
        let owner = self.current_key().fqcn.to_string();
        let dictionary = values.to_dictionary();
        (
            DataType::enumeration(name, owner, values).meta(),
            Variant::Dictionary(dictionary),
        )
    }

    fn enum_value(&mut self, id: ClassId, decl: &EnumValueDecl) -> i64 {
        if let Some(expr) = &decl.value {
            let context = format!("value of enum member \"{}\"", decl.name.name);
            if let Some(value) = self.constant_int(expr, &context) {
                return value;
            }
        }
        decl.previous
            .and_then(|previous| self.resolve_member(id, previous))
            .and_then(|member| member.value.as_ref().and_then(Variant::as_int))
            .map(|value| value.wrapping_add(1))
            .unwrap_or(0)
    }

    fn parameter_types(&mut self, params: &[ParameterDecl]) -> Vec<(String, DataType)> {
        params
            .iter()
            .map(|param| {
                let ty = match (&param.ty, &param.default, param.infer) {
                    (Some(spec), _, _) => self.resolve_type_spec(spec),
                    (None, Some(default), true) => {
                        let reduced = self.in_initializer(true, param.span, |analyzer| {
                            analyzer.reduce_expr(default)
                        });
                        self.inferred_type(&param.name.name, reduced.data_type, default.span)
                    }
                    _ => DataType::variant(),
                };
                (param.name.name.clone(), ty)
            })
            .collect()
    }

    pub(crate) fn function_signature(&mut self, decl: &FunctionDecl) -> FunctionSignature {
        let mut signature = FunctionSignature::new(decl.name.name.clone());
        signature.params = self.parameter_types(&decl.params);
        signature.default_count = decl.default_count();
        signature.is_static = decl.is_static;
        signature.return_type = match &decl.return_type {
            Some(spec) => self.resolve_type_spec(spec),
            None => DataType::variant(),
        };

        let mut seen_default = false;
        for param in &decl.params {
            if param.default.is_some() {
                seen_default = true;
            } else if seen_default {
                self.error(TypeError::InvalidContext {
                    message: format!(
                        "parameter \"{}\" without a default value follows a parameter with one",
                        param.name.name
                    ),
                    span: param.span,
                });
                break;
            }
        }
        signature
    }

    // ========================================================================
    // Class checks
    // ========================================================================

    fn check_class_name(&mut self, node: &ClassNode) {
        let Some(ident) = &node.identifier else {
            return;
        };
        let name = ident.name.as_str();
        let kind = if name == "Variant" || VariantType::from_name(name).is_some() {
            Some("builtin type")
        } else if self.registry().class_exists(name) {
            Some("native class")
        } else if self
            .registry()
            .global_class(name)
            .is_some_and(|global| global.path != self.unit.path() || !node.is_head())
        {
            Some("global class")
        } else {
            None
        };
        if let Some(kind) = kind {
            self.error(ResolutionError::HidesGlobal {
                name: name.to_string(),
                kind: kind.to_string(),
                span: ident.span,
            });
        }
    }

    fn check_duplicates(&mut self, node: &ClassNode) {
        let mut seen = FxHashSet::default();
        for member in &node.members {
            let Some(name) = member.name() else {
                continue;
            };
            if !seen.insert(name) {
                self.error(ResolutionError::DuplicateMember {
                    member: name.to_string(),
                    span: member.span(),
                });
            }
        }
    }

    /// Members may not redefine base script members (functions may override
    /// functions) nor native members of the root class.
    fn check_conflicts(&mut self, id: ClassId, node: &ClassNode) {
        let key = self.key_of(id);
        let base = self.base_of(&key);
        let native = self.native_root(&key);

        for member in &node.members {
            let Some(name) = member.name() else {
                continue;
            };
            let is_function = matches!(member, Member::Function(_));

            if let BaseState::Script(base_key) = &base {
                if let Some((owner, inherited)) = self.lookup_member(base_key, name) {
                    if !(is_function && inherited.kind == MemberKind::Function) {
                        self.error(ResolutionError::MemberConflictBase {
                            member: name.to_string(),
                            base: owner.name.to_string(),
                            span: member.span(),
                        });
                        continue;
                    }
                }
            }

            let checks_native = matches!(
                member,
                Member::Variable(_) | Member::Constant(_) | Member::Signal(_) | Member::Enum(_)
            );
            if let (true, Some(native)) = (checks_native, native.as_deref()) {
                let registry = self.registry();
                let clashes = registry.has_property(native, name)
                    || registry.has_method(native, name)
                    || registry.has_signal(native, name)
                    || registry.has_integer_constant(native, name);
                if clashes {
                    self.error(ResolutionError::MemberConflictNative {
                        member: name.to_string(),
                        native: native.to_string(),
                        span: member.span(),
                    });
                }
            }
        }
    }

    /// `get = f, set = g` must name functions of the right shape.
    fn check_named_accessors(&mut self, id: ClassId, node: &ClassNode) {
        let key = self.key_of(id);
        for decl in node.variables() {
            let Accessors::Named { getter, setter } = &decl.accessors else {
                continue;
            };
            let member_type = self
                .unit
                .member(id, &decl.name.name)
                .map(|member| member.data_type)
                .unwrap_or_default();

            if let Some(getter) = getter {
                let message = match self.accessor_signature(&key, &getter.name) {
                    None => Some(format!("getter function \"{}\" not found", getter.name)),
                    Some(signature) if signature.min_arguments() > 0 => {
                        Some(format!("getter \"{}\" must take no arguments", getter.name))
                    }
                    Some(signature) if !self.accessor_type_matches(&member_type, &signature.return_type) => {
                        Some(format!(
                            "getter \"{}\" must return \"{}\"",
                            getter.name, member_type
                        ))
                    }
                    Some(_) => None,
                };
                if let Some(message) = message {
                    self.error(TypeError::InvalidAccessor {
                        member: decl.name.name.clone(),
                        message,
                        span: getter.span,
                    });
                }
            }

            if let Some(setter) = setter {
                let message = match self.accessor_signature(&key, &setter.name) {
                    None => Some(format!("setter function \"{}\" not found", setter.name)),
                    Some(signature) if signature.params.is_empty() || signature.min_arguments() > 1 => {
                        Some(format!("setter \"{}\" must take exactly one argument", setter.name))
                    }
                    Some(signature) if !self.accessor_type_matches(&signature.params[0].1, &member_type) => {
                        Some(format!(
                            "setter \"{}\" must accept \"{}\"",
                            setter.name, member_type
                        ))
                    }
                    Some(_) => None,
                };
                if let Some(message) = message {
                    self.error(TypeError::InvalidAccessor {
                        member: decl.name.name.clone(),
                        message,
                        span: setter.span,
                    });
                }
            }
        }
    }

    fn accessor_signature(&mut self, key: &ClassKey, name: &str) -> Option<FunctionSignature> {
        self.lookup_member(key, name)
            .filter(|(_, member)| member.kind == MemberKind::Function)
            .and_then(|(_, member)| member.signature)
    }

    /// Hard types on both sides must be the same type.
    fn accessor_type_matches(&self, expected: &DataType, found: &DataType) -> bool {
        !expected.is_hard() || !found.is_hard() || expected == found
    }
}
