//! Expression reduction.
//!
//! Every expression is reduced once. The result (type, folded value and
//! what a name refers to) goes to the expression table, where later visits
//! and the compiler find it. Calls live in [`super::call`].

use brscript_core::{
    ClassKey, DataType, ResolutionError, Span, TypeError, TypeKind, Variant, VariantType,
    WarningCode,
};
use brscript_parser::ast::{BinaryOp, ClassId, Expr, ExprKind, Ident, TypeSpec, UnaryOp};

use super::const_fold::{adapt_constant, fold_array, fold_attribute, fold_cast, fold_dictionary, fold_subscript};
use super::types::AssignContext;
use super::{Analyzer, Compatibility, is_type_compatible};
use crate::analysis::{ExprInfo, IdentifierSource, LocalKind, MemberInfo, MemberKind, property_data_type};
use crate::scope::VarLookup;
use crate::unit::UnitStatus;

/// Runtime tag of a statically known operand.
pub(crate) fn operand_tag(data_type: &DataType) -> Option<VariantType> {
    if data_type.is_hard() {
        data_type.variant_type()
    } else {
        None
    }
}

fn variant() -> ExprInfo {
    ExprInfo::typed(DataType::variant())
}

fn bool_type() -> DataType {
    DataType::builtin(VariantType::Bool)
}

/// Name used in diagnostics for the callee of a call expression.
pub(crate) fn callee_name(expr: &Expr) -> String {
    let callee = match &expr.kind {
        ExprKind::Call { callee, .. } => callee,
        _ => return "<expression>".to_string(),
    };
    match &callee.kind {
        ExprKind::Identifier(ident) => ident.name.clone(),
        ExprKind::Attribute { name, .. } => name.name.clone(),
        _ => "<callable>".to_string(),
    }
}

fn target_name(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Identifier(ident) => ident.name.clone(),
        ExprKind::Attribute { name, .. } => name.name.clone(),
        _ => "subscript".to_string(),
    }
}

/// Whether the name behind `info` can never be written to.
fn is_read_only_source(info: &ExprInfo) -> bool {
    use IdentifierSource as S;

    if info.value.is_some() || info.data_type.is_read_only {
        return true;
    }
    matches!(
        info.source,
        Some(
            S::Local {
                kind: LocalKind::Constant,
                ..
            } | S::MemberConstant { .. }
                | S::MemberFunction { .. }
                | S::MemberSignal { .. }
                | S::NativeMethod { .. }
                | S::NativeSignal { .. }
                | S::NativeConstant { .. }
                | S::ScriptClass(_)
                | S::NativeClass(_)
                | S::BuiltinType(_)
                | S::Singleton(_)
                | S::GlobalConstant
                | S::UtilityFunction
        )
    )
}

impl Analyzer<'_> {
    // ========================================================================
    // Entry points
    // ========================================================================

    pub(crate) fn reduce_expr(&mut self, expr: &Expr) -> ExprInfo {
        if let Some(info) = self.reduced(expr.id) {
            return info;
        }
        let info = match &expr.kind {
            ExprKind::Literal(value) => {
                let data_type = match value {
                    Variant::Nil => DataType::nil(),
                    other => DataType::builtin(other.get_type()),
                };
                ExprInfo::constant(data_type, value.clone())
            }
            ExprKind::Identifier(ident) => self.reduce_identifier(ident),
            ExprKind::SelfRef => self.reduce_self(expr.span),
            ExprKind::Array(elements) => self.reduce_array(elements),
            ExprKind::Dictionary(entries) => self.reduce_dictionary(entries),
            ExprKind::Unary { op, operand } => self.reduce_unary(*op, operand, expr.span),
            ExprKind::Binary { op, left, right } => self.reduce_binary(*op, left, right, expr.span),
            ExprKind::Ternary {
                condition,
                true_expr,
                false_expr,
            } => self.reduce_ternary(condition, true_expr, false_expr),
            ExprKind::Assignment { op, target, value } => {
                self.reduce_assignment(*op, target, value, expr.span)
            }
            ExprKind::Attribute { base, name } => self.reduce_attribute(base, name),
            ExprKind::Subscript { base, index } => self.reduce_subscript(base, index, expr.span),
            ExprKind::Call {
                callee,
                args,
                is_super,
            } => self.reduce_call(expr, callee, args, *is_super),
            ExprKind::Cast { operand, ty } => self.reduce_cast(operand, ty, expr.span),
            ExprKind::TypeTest { operand, ty, .. } => {
                self.reduce_value(operand);
                let tested = self.resolve_type_spec(ty);
                self.tables.type_tests.insert(expr.id, tested);
                ExprInfo::typed(bool_type())
            }
            ExprKind::Lambda(decl) => self.resolve_lambda(decl),
            ExprKind::Preload { path } => self.reduce_preload(path, expr.span),
            ExprKind::Await(inner) => self.reduce_await(inner),
        };
        self.record(expr.id, info)
    }

    /// Reduce an expression whose value is consumed.
    pub(crate) fn reduce_value(&mut self, expr: &Expr) -> ExprInfo {
        let info = self.reduce_expr(expr);
        if info.call.is_some() && info.data_type.is_void() {
            self.error(TypeError::VoidValue {
                function: callee_name(expr),
                span: expr.span,
            });
        }
        info
    }

    /// Check a reduced value against the slot it is stored in. Constants that
    /// fit are converted to the slot's representation right away.
    pub(crate) fn check_value_into(
        &mut self,
        target: &DataType,
        expr: &Expr,
        info: &ExprInfo,
        context: AssignContext<'_>,
    ) -> bool {
        let adaptable = target.is_hard()
            && !target.is_variant()
            && !matches!(target.kind, TypeKind::Enum { .. });
        if adaptable {
            if let Some(adapted) = info.value.as_ref().and_then(|value| adapt_constant(value, target)) {
                let mut adapted_info = info.clone();
                adapted_info.value = Some(adapted);
                adapted_info.data_type = target.clone();
                self.record(expr.id, adapted_info);
                return true;
            }
        }
        self.check_assignment(target, &info.data_type, expr.span, context)
    }

    pub(crate) fn in_static_context(&self) -> bool {
        self.function.as_ref().is_some_and(|function| function.is_static)
    }

    fn reduce_self(&mut self, span: Span) -> ExprInfo {
        if self.in_static_context() {
            self.error(TypeError::InvalidContext {
                message: "\"self\" cannot be used in a static function".to_string(),
                span,
            });
            return variant();
        }
        self.mark_uses_self();
        ExprInfo::typed(DataType::class(self.current_key()))
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    fn reduce_identifier(&mut self, ident: &Ident) -> ExprInfo {
        let name = ident.name.as_str();
        if let Some(lookup) = self.scope.get_or_capture(name) {
            return self.local_expr(lookup);
        }
        if let Some(info) = self.member_identifier(name, ident.span) {
            return info;
        }
        if let Some(info) = self.outer_identifier(name, ident.span) {
            return info;
        }
        if let Some(info) = self.global_identifier(name, ident.span) {
            return info;
        }
        self.error(ResolutionError::UnresolvedIdentifier {
            name: name.to_string(),
            span: ident.span,
        });
        variant()
    }

    pub(super) fn local_expr(&mut self, lookup: VarLookup) -> ExprInfo {
        let decl = lookup.decl();
        let mut kind = match &lookup {
            VarLookup::Local(var) => var.kind,
            VarLookup::Captured(_) => LocalKind::Variable,
        };
        let mut value = None;
        if let Some(info) = self.tables.decls.get_mut(&decl) {
            info.usages += 1;
            kind = info.kind;
            value = info.value.clone();
        }
        ExprInfo {
            data_type: lookup.data_type().clone(),
            value,
            source: Some(IdentifierSource::Local { decl, kind }),
            ..Default::default()
        }
    }

    /// Members of the current class and its script bases.
    fn member_identifier(&mut self, name: &str, span: Span) -> Option<ExprInfo> {
        let key = self.current_key();
        for owner in self.script_chain(&key) {
            if !self.declares_member(&owner, name) {
                continue;
            }
            // Declared but unresolvable: the cycle was already reported.
            let Some(member) = self.class_member(&owner, name) else {
                return Some(variant());
            };
            return Some(self.member_expr(owner, &member, span, true));
        }
        None
    }

    /// Static members of enclosing classes.
    fn outer_identifier(&mut self, name: &str, span: Span) -> Option<ExprInfo> {
        let mut outer = self.class_node(self.class).and_then(|class| class.outer);
        while let Some(id) = outer {
            let key = self.key_of(id);
            if self.declares_member(&key, name) {
                if let Some(member) = self.class_member(&key, name) {
                    if member.is_static() {
                        return Some(self.member_expr(key, &member, span, false));
                    }
                }
            }
            outer = self.class_node(id).and_then(|class| class.outer);
        }
        None
    }

    /// Expression info for reading a script member. `implicit_self` is set
    /// for bare names, which read instance members off `self`.
    pub(crate) fn member_expr(
        &mut self,
        owner: ClassKey,
        member: &MemberInfo,
        span: Span,
        implicit_self: bool,
    ) -> ExprInfo {
        let name = member.name.clone();
        let mut value = None;
        let source = match &member.kind {
            MemberKind::Variable { is_static: false, .. } => IdentifierSource::MemberVariable { owner, name },
            MemberKind::Variable { is_static: true, .. } => IdentifierSource::StaticVariable { owner, name },
            MemberKind::Function => IdentifierSource::MemberFunction {
                owner,
                name,
                is_static: member.is_static(),
            },
            MemberKind::Signal => IdentifierSource::MemberSignal { owner, name },
            MemberKind::Class => match member.data_type.class_key() {
                Some(key) => IdentifierSource::ScriptClass(key.clone()),
                None => IdentifierSource::MemberConstant { owner, name },
            },
            MemberKind::Constant | MemberKind::Enum | MemberKind::EnumValue => {
                value = member.value.clone();
                IdentifierSource::MemberConstant { owner, name }
            }
        };
        if implicit_self && source.needs_instance() {
            self.require_instance(&member.name, span);
        }
        ExprInfo {
            data_type: member.data_type.clone(),
            value,
            source: Some(source),
            ..Default::default()
        }
    }

    /// An instance member is read through the implicit `self`.
    pub(crate) fn require_instance(&mut self, member: &str, span: Span) {
        if self.in_static_context() {
            self.error(ResolutionError::InstanceFromStatic {
                member: member.to_string(),
                span,
            });
        } else {
            self.mark_uses_self();
        }
    }

    /// Names outside the script: the native base, types, singletons and
    /// global constants and functions.
    fn global_identifier(&mut self, name: &str, span: Span) -> Option<ExprInfo> {
        let key = self.current_key();
        if let Some(native) = self.native_root(&key) {
            if let Some(info) = self.native_member(&native, name) {
                if info.source.as_ref().is_some_and(IdentifierSource::needs_instance)
                    && !self.is_static_native_method(&native, name)
                {
                    self.require_instance(name, span);
                }
                return Some(info);
            }
        }

        if let Some(ty) = VariantType::from_name(name) {
            return Some(ExprInfo {
                data_type: DataType::builtin(ty).meta(),
                source: Some(IdentifierSource::BuiltinType(ty)),
                ..Default::default()
            });
        }

        if self.tree.head().name() == Some(name) {
            let head = self.key_of(ClassId::HEAD);
            return Some(script_class_expr(head));
        }

        let registry = self.registry();
        if registry.class_exists(name) {
            return Some(ExprInfo {
                data_type: DataType::native(name).meta(),
                source: Some(IdentifierSource::NativeClass(name.to_string())),
                ..Default::default()
            });
        }

        if let Some(global) = registry.global_class(name) {
            return Some(match self.load_unit(&global.path, UnitStatus::InterfaceSolved, span) {
                Ok(unit) => match unit.head_key() {
                    Some(key) => script_class_expr(key),
                    None => variant(),
                },
                Err(err) => {
                    self.error(err);
                    variant()
                }
            });
        }

        if let Some(class) = registry.singleton_class(name) {
            return Some(ExprInfo {
                data_type: DataType::native(class),
                source: Some(IdentifierSource::Singleton(name.to_string())),
                ..Default::default()
            });
        }

        if let Some(value) = registry.global_constant(name) {
            return Some(ExprInfo {
                data_type: DataType::builtin(value.get_type()),
                value: Some(value),
                source: Some(IdentifierSource::GlobalConstant),
                ..Default::default()
            });
        }

        if registry.utility_function(name).is_some() {
            return Some(ExprInfo {
                data_type: DataType::builtin(VariantType::Callable),
                source: Some(IdentifierSource::UtilityFunction),
                ..Default::default()
            });
        }
        None
    }

    fn is_static_native_method(&self, class: &str, name: &str) -> bool {
        self.registry()
            .method(class, name)
            .is_some_and(|method| method.is_static())
    }

    /// A member of a native class: constants, enums, properties, methods and
    /// signals, in that order.
    pub(crate) fn native_member(&mut self, class: &str, name: &str) -> Option<ExprInfo> {
        let registry = self.registry();
        if let Some(value) = registry.integer_constant(class, name) {
            let data_type = registry
                .enum_of_constant(class, name)
                .and_then(|owner_enum| {
                    registry
                        .enum_values(class, &owner_enum)
                        .map(|values| DataType::enumeration(owner_enum, class, values))
                })
                .unwrap_or_else(|| DataType::builtin(VariantType::Int));
            return Some(ExprInfo {
                data_type,
                value: Some(Variant::Int(value)),
                source: Some(IdentifierSource::NativeConstant {
                    class: class.to_string(),
                }),
                ..Default::default()
            });
        }
        if let Some(values) = registry.enum_values(class, name) {
            let dictionary = values.to_dictionary();
            dictionary.make_read_only();
            return Some(ExprInfo {
                data_type: DataType::enumeration(name, class, values).meta(),
                value: Some(Variant::Dictionary(dictionary)),
                source: Some(IdentifierSource::NativeConstant {
                    class: class.to_string(),
                }),
                ..Default::default()
            });
        }
        let class_name = class.to_string();
        if let Some(property) = registry.property(class, name) {
            return Some(ExprInfo {
                data_type: property_data_type(&property),
                source: Some(IdentifierSource::NativeProperty { class: class_name }),
                ..Default::default()
            });
        }
        if registry.has_method(class, name) {
            return Some(ExprInfo {
                data_type: DataType::builtin(VariantType::Callable),
                source: Some(IdentifierSource::NativeMethod { class: class_name }),
                ..Default::default()
            });
        }
        if registry.has_signal(class, name) {
            return Some(ExprInfo {
                data_type: DataType::builtin(VariantType::Signal),
                source: Some(IdentifierSource::NativeSignal { class: class_name }),
                ..Default::default()
            });
        }
        None
    }

    // ========================================================================
    // Containers
    // ========================================================================

    fn reduce_array(&mut self, elements: &[Expr]) -> ExprInfo {
        let infos: Vec<ExprInfo> = elements.iter().map(|element| self.reduce_value(element)).collect();
        let data_type = DataType::builtin(VariantType::Array);
        match infos.into_iter().map(|info| info.value).collect::<Option<Vec<_>>>() {
            Some(values) => ExprInfo::constant(data_type, fold_array(values)),
            None => ExprInfo::typed(data_type),
        }
    }

    fn reduce_dictionary(&mut self, entries: &[(Expr, Expr)]) -> ExprInfo {
        let mut folded = Some(Vec::with_capacity(entries.len()));
        for (key, value) in entries {
            let key = self.reduce_value(key).value;
            let value = self.reduce_value(value).value;
            folded = match (folded, key, value) {
                (Some(mut acc), Some(key), Some(value)) => {
                    acc.push((key, value));
                    Some(acc)
                }
                _ => None,
            };
        }
        let data_type = DataType::builtin(VariantType::Dictionary);
        match folded {
            Some(entries) => ExprInfo::constant(data_type, fold_dictionary(entries)),
            None => ExprInfo::typed(data_type),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn invalid_operator(&mut self, op: &str, left: &DataType, right: Option<&DataType>, span: Span) {
        let operands = match right {
            Some(right) => format!("\"{}\" and \"{}\"", left, right),
            None => format!("\"{}\"", left),
        };
        self.error(TypeError::InvalidOperator {
            op: op.to_string(),
            operands,
            span,
        });
    }

    fn reduce_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> ExprInfo {
        let info = self.reduce_value(operand);
        if matches!(op, UnaryOp::Not) {
            return match &info.value {
                Some(value) => ExprInfo::constant(bool_type(), Variant::Bool(!value.booleanize())),
                None => ExprInfo::typed(bool_type()),
            };
        }

        let operator = op.to_operator();
        if let Some(value) = &info.value {
            if let Some(result) = operator.evaluate(value, &Variant::Nil) {
                return ExprInfo::constant(DataType::builtin(result.get_type()), result);
            }
            self.invalid_operator(op.as_str(), &info.data_type, None, span);
            return variant();
        }
        match operand_tag(&info.data_type) {
            Some(tag) => match operator.result_type(tag, VariantType::Nil) {
                Some(result) => ExprInfo::typed(DataType::builtin(result)),
                None => {
                    self.invalid_operator(op.as_str(), &info.data_type, None, span);
                    variant()
                }
            },
            None => {
                self.mark_unsafe();
                variant()
            }
        }
    }

    fn reduce_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> ExprInfo {
        let left_info = self.reduce_value(left);
        let right_info = self.reduce_value(right);

        if op.is_short_circuit() {
            return match (&left_info.value, &right_info.value) {
                (Some(a), Some(b)) => {
                    let result = match op {
                        BinaryOp::And => a.booleanize() && b.booleanize(),
                        _ => a.booleanize() || b.booleanize(),
                    };
                    ExprInfo::constant(bool_type(), Variant::Bool(result))
                }
                _ => ExprInfo::typed(bool_type()),
            };
        }

        let left_tag = operand_tag(&left_info.data_type);
        let right_tag = operand_tag(&right_info.data_type);
        if matches!(op, BinaryOp::Div)
            && left_tag == Some(VariantType::Int)
            && right_tag == Some(VariantType::Int)
        {
            self.warn(
                WarningCode::IntegerDivision,
                "integer division, the decimal part is discarded",
                span,
            );
        }

        let operator = op.to_operator();
        let negate = matches!(op, BinaryOp::NotIn);
        if let (Some(a), Some(b)) = (&left_info.value, &right_info.value) {
            return match operator.evaluate(a, b) {
                Some(result) => {
                    let result = if negate {
                        Variant::Bool(!result.booleanize())
                    } else {
                        result
                    };
                    ExprInfo::constant(DataType::builtin(result.get_type()), result)
                }
                None => {
                    self.invalid_operator(op.as_str(), &left_info.data_type, Some(&right_info.data_type), span);
                    variant()
                }
            };
        }

        let yields_bool = op.is_comparison() || matches!(op, BinaryOp::In | BinaryOp::NotIn);
        match (left_tag, right_tag) {
            (Some(a), Some(b)) => match operator.result_type(a, b) {
                Some(result) => ExprInfo::typed(DataType::builtin(result)),
                None => {
                    self.invalid_operator(op.as_str(), &left_info.data_type, Some(&right_info.data_type), span);
                    variant()
                }
            },
            _ if yields_bool => ExprInfo::typed(bool_type()),
            _ => {
                self.mark_unsafe();
                variant()
            }
        }
    }

    fn reduce_ternary(&mut self, condition: &Expr, true_expr: &Expr, false_expr: &Expr) -> ExprInfo {
        let condition = self.reduce_value(condition);
        let when_true = self.reduce_value(true_expr);
        let when_false = self.reduce_value(false_expr);

        if let (Some(test), Some(_), Some(_)) = (&condition.value, &when_true.value, &when_false.value) {
            return if test.booleanize() { when_true } else { when_false };
        }
        ExprInfo::typed(self.common_type(&when_true.data_type, &when_false.data_type))
    }

    /// The type both branches fit in, or Variant.
    fn common_type(&mut self, a: &DataType, b: &DataType) -> DataType {
        if !a.is_hard() || !b.is_hard() {
            return DataType::variant();
        }
        if a == b {
            return a.clone();
        }
        if is_type_compatible(a, b, self) == Ok(Compatibility::Compatible) {
            return a.clone();
        }
        if is_type_compatible(b, a, self) == Ok(Compatibility::Compatible) {
            return b.clone();
        }
        DataType::variant()
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn reduce_assignment(
        &mut self,
        op: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> ExprInfo {
        let target_info = self.reduce_expr(target);
        let value_info = self.reduce_value(value);

        if !target.is_assignable() {
            self.error(TypeError::InvalidContext {
                message: "cannot assign to this expression".to_string(),
                span: target.span,
            });
            return variant();
        }

        let constant_base = match &target.kind {
            ExprKind::Attribute { base, .. } | ExprKind::Subscript { base, .. } => {
                self.reduced(base.id).is_some_and(|info| info.is_constant())
            }
            _ => false,
        };
        if constant_base || is_read_only_source(&target_info) {
            self.error(TypeError::ReadOnlyAssignment {
                name: target_name(target),
                span: target.span,
            });
            return ExprInfo::typed(target_info.data_type);
        }

        let target_type = target_info.data_type.clone();
        match op {
            Some(op) => {
                let result = match (operand_tag(&target_type), operand_tag(&value_info.data_type)) {
                    (Some(a), Some(b)) => match op.to_operator().result_type(a, b) {
                        Some(result) => DataType::builtin(result),
                        None => {
                            self.invalid_operator(op.as_str(), &target_type, Some(&value_info.data_type), span);
                            return ExprInfo::typed(target_type);
                        }
                    },
                    _ => DataType::variant(),
                };
                self.check_assignment(&target_type, &result, value.span, AssignContext::Assignment);
            }
            None => {
                self.check_value_into(&target_type, value, &value_info, AssignContext::Assignment);
            }
        }
        ExprInfo::typed(target_type)
    }

    // ========================================================================
    // Member access
    // ========================================================================

    fn reduce_attribute(&mut self, base: &Expr, name: &Ident) -> ExprInfo {
        let base_info = self.reduce_value(base);
        if let Some(value) = &base_info.value {
            if let Some(folded) = fold_attribute(value, &name.name) {
                let data_type = match &base_info.data_type.kind {
                    TypeKind::Enum { .. } if base_info.data_type.is_meta => {
                        base_info.data_type.clone().instance()
                    }
                    _ => DataType::builtin(folded.get_type()),
                };
                return ExprInfo::constant(data_type, folded);
            }
        }
        self.attribute_of(&base_info.data_type, name)
    }

    /// `base.name` where only the type of `base` is known.
    pub(crate) fn attribute_of(&mut self, base: &DataType, name: &Ident) -> ExprInfo {
        let member = name.name.as_str();
        let span = name.span;

        if base.is_meta {
            return match &base.kind {
                TypeKind::Class(key) => self.static_class_attribute(key, member, base, span),
                TypeKind::Native { class } => {
                    let class = class.clone();
                    match self.native_member(&class, member) {
                        Some(info) => {
                            let instance_only = matches!(
                                info.source,
                                Some(
                                    IdentifierSource::NativeProperty { .. }
                                        | IdentifierSource::NativeSignal { .. }
                                )
                            );
                            if instance_only {
                                self.error(ResolutionError::InstanceFromStatic {
                                    member: member.to_string(),
                                    span,
                                });
                            }
                            info
                        }
                        None => self.unknown_member(base, member, span),
                    }
                }
                TypeKind::Enum { values, .. } => match values.get(member) {
                    Some(value) => ExprInfo::constant(base.clone().instance(), Variant::Int(value)),
                    None => self.unknown_member(base, member, span),
                },
                _ => self.unsafe_access(member, span),
            };
        }

        match &base.kind {
            TypeKind::Class(key) => {
                if let Some((owner, info)) = self.lookup_member(key, member) {
                    return self.member_expr(owner, &info, span, false);
                }
                if let Some(native) = self.native_root(key) {
                    if let Some(info) = self.native_member(&native, member) {
                        return info;
                    }
                }
                self.unknown_member(base, member, span)
            }
            TypeKind::Native { class } => {
                let class = class.clone();
                match self.native_member(&class, member) {
                    Some(info) => info,
                    None => self.unknown_member(base, member, span),
                }
            }
            TypeKind::Builtin {
                ty: VariantType::Dictionary,
                ..
            } => self.unsafe_access(member, span),
            TypeKind::Builtin { ty, .. } => {
                let registry = self.registry();
                if let Some(member_type) = registry.builtin_member(*ty, member) {
                    ExprInfo::typed(DataType::builtin(member_type))
                } else if registry.builtin_method(*ty, member).is_some() {
                    ExprInfo::typed(DataType::builtin(VariantType::Callable))
                } else {
                    self.unknown_member(base, member, span)
                }
            }
            TypeKind::Enum { .. } => self.unknown_member(base, member, span),
            TypeKind::Resolving => {
                self.cyclic_reference(span);
                variant()
            }
            TypeKind::Variant | TypeKind::Unresolved => self.unsafe_access(member, span),
        }
    }

    fn static_class_attribute(&mut self, key: &ClassKey, member: &str, base: &DataType, span: Span) -> ExprInfo {
        if let Some((owner, info)) = self.lookup_member(key, member) {
            let expr = self.member_expr(owner, &info, span, false);
            if expr.source.as_ref().is_some_and(IdentifierSource::needs_instance) {
                self.error(ResolutionError::InstanceFromStatic {
                    member: member.to_string(),
                    span,
                });
            }
            return expr;
        }
        if member == "new" {
            return ExprInfo::typed(DataType::builtin(VariantType::Callable));
        }
        if let Some(native) = self.native_root(key) {
            let constant = self.native_member(&native, member).filter(|info| info.is_constant());
            if let Some(info) = constant {
                return info;
            }
        }
        self.unknown_member(base, member, span)
    }

    fn unknown_member(&mut self, base: &DataType, member: &str, span: Span) -> ExprInfo {
        self.error(ResolutionError::UnknownMember {
            base: base.to_string(),
            member: member.to_string(),
            span,
        });
        variant()
    }

    fn unsafe_access(&mut self, member: &str, span: Span) -> ExprInfo {
        self.warn(
            WarningCode::UnsafePropertyAccess,
            format!("property \"{}\" is not known statically", member),
            span,
        );
        self.mark_unsafe();
        variant()
    }

    fn reduce_subscript(&mut self, base: &Expr, index: &Expr, span: Span) -> ExprInfo {
        let base_info = self.reduce_value(base);
        let index_info = self.reduce_value(index);

        if let (Some(container), Some(key)) = (&base_info.value, &index_info.value) {
            if let Some(value) = fold_subscript(container, key) {
                let data_type = base_info
                    .data_type
                    .element_type(if container.as_dictionary().is_some() { 1 } else { 0 })
                    .cloned()
                    .unwrap_or_else(|| DataType::builtin(value.get_type()));
                return ExprInfo::constant(data_type, value);
            }
        }

        let data_type = &base_info.data_type;
        if !data_type.is_hard() || data_type.is_meta {
            self.mark_unsafe();
            return variant();
        }
        let element = match data_type.variant_type() {
            Some(VariantType::Array) => data_type.element_type(0).cloned(),
            Some(VariantType::Dictionary) => data_type.element_type(1).cloned(),
            Some(VariantType::String | VariantType::StringName) => {
                Some(DataType::builtin(VariantType::String))
            }
            Some(VariantType::Vector2 | VariantType::Vector3) => Some(DataType::builtin(VariantType::Float)),
            Some(VariantType::Object) => None,
            _ => {
                self.invalid_operator("[]", data_type, Some(&index_info.data_type), span);
                return variant();
            }
        };
        match element {
            Some(element) => ExprInfo::typed(element),
            None => {
                self.mark_unsafe();
                variant()
            }
        }
    }

    // ========================================================================
    // Casts, preloads, await
    // ========================================================================

    fn reduce_cast(&mut self, operand: &Expr, ty: &TypeSpec, span: Span) -> ExprInfo {
        let info = self.reduce_value(operand);
        let target = self.resolve_type_spec(ty);
        if target.is_variant() {
            return ExprInfo::typed(target);
        }
        if let Some(value) = &info.value {
            if let Some(folded) = fold_cast(value, &target) {
                return ExprInfo::constant(target, folded);
            }
        }

        let source = info.data_type;
        if !source.is_hard() {
            self.warn(
                WarningCode::UnsafeCast,
                format!("casting a Variant to \"{}\" is checked at runtime", target),
                span,
            );
            self.mark_unsafe();
            return ExprInfo::typed(target);
        }

        let valid = if source.is_object_type() && target.is_object_type() {
            let down = is_type_compatible(&target, &source, self);
            let up = is_type_compatible(&source, &target, self);
            matches!(down, Ok(verdict) if verdict.is_compatible())
                || matches!(up, Ok(verdict) if verdict.is_compatible())
        } else if source.is_meta || target.is_meta || source.is_object_type() || target.is_object_type() {
            false
        } else {
            match (source.variant_type(), target.variant_type()) {
                (Some(from), Some(to)) => from == to || from.can_cast_to(to),
                _ => false,
            }
        };
        if !valid {
            self.error(TypeError::InvalidCast {
                from: source.to_string(),
                to: target.to_string(),
                span,
            });
        }
        ExprInfo::typed(target)
    }

    fn reduce_preload(&mut self, path: &str, span: Span) -> ExprInfo {
        let resolved = self.resolve_path(path);
        match self.load_unit(&resolved, UnitStatus::InterfaceSolved, span) {
            Ok(unit) => match unit.head_key() {
                Some(key) => script_class_expr(key),
                None => variant(),
            },
            Err(err) => {
                self.error(err);
                variant()
            }
        }
    }

    fn reduce_await(&mut self, inner: &Expr) -> ExprInfo {
        let info = self.reduce_expr(inner);
        if let Some(function) = self.function.as_mut() {
            function.has_await = true;
        }
        if info.data_type.is_builtin(VariantType::Signal) || info.data_type.is_void() {
            variant()
        } else {
            ExprInfo::typed(info.data_type)
        }
    }
}

fn script_class_expr(key: ClassKey) -> ExprInfo {
    ExprInfo {
        data_type: DataType::class(key.clone()).meta(),
        source: Some(IdentifierSource::ScriptClass(key)),
        ..Default::default()
    }
}
