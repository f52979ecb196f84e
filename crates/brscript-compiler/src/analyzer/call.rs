//! Call resolution.
//!
//! A call is classified by what the callee names: a local callable, a
//! function of the script chain, a method on a typed receiver, a builtin
//! constructor or a utility function. The classification is stored as the
//! call's [`CallTarget`] and decides which instruction the compiler emits.

use brscript_core::{DataType, MethodInfo, ResolutionError, Span, TypeError, TypeKind, VariantType, WarningCode};
use brscript_parser::ast::{Expr, ExprKind, Ident};

use super::Analyzer;
use super::types::AssignContext;
use crate::analysis::{CallTarget, ExprInfo, FunctionSignature, MemberKind};

/// A classified call, before arguments are checked.
struct ResolvedCall {
    target: CallTarget,
    signature: Option<FunctionSignature>,
    return_type: DataType,
}

impl ResolvedCall {
    fn unchecked(target: CallTarget) -> Self {
        Self {
            target,
            signature: None,
            return_type: DataType::variant(),
        }
    }

    fn checked(target: CallTarget, signature: FunctionSignature) -> Self {
        Self {
            target,
            return_type: signature.return_type.clone(),
            signature: Some(signature),
        }
    }

    fn returning(mut self, return_type: DataType) -> Self {
        self.return_type = return_type;
        self
    }
}

/// Whether a host method call can bind the method directly.
fn is_exact(method: &MethodInfo, arg_count: usize) -> bool {
    !method.is_vararg() && method.accepts_argument_count(arg_count)
}

impl Analyzer<'_> {
    pub(super) fn reduce_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr], is_super: bool) -> ExprInfo {
        let resolved = match &callee.kind {
            ExprKind::Identifier(ident) if is_super => self.super_call(ident),
            ExprKind::Identifier(ident) => self.identifier_call(callee, ident, args.len()),
            ExprKind::Attribute { base, name } => self.method_call(base, name, args.len()),
            _ => {
                self.reduce_value(callee);
                ResolvedCall::unchecked(CallTarget::CallableValue)
            }
        };
        if self.reduced(callee.id).is_none() {
            self.record(callee.id, ExprInfo::typed(DataType::builtin(VariantType::Callable)));
        }

        let arg_infos: Vec<ExprInfo> = args.iter().map(|arg| self.reduce_value(arg)).collect();
        if let Some(signature) = &resolved.signature {
            let function = super::reduce::callee_name(expr);
            self.check_call_arguments(&function, signature, args, &arg_infos, expr.span);
        }

        let mut info = ExprInfo {
            data_type: resolved.return_type,
            ..Default::default()
        };
        if let CallTarget::BuiltinConstructor(ty) = &resolved.target {
            if let [single] = arg_infos.as_slice() {
                info.value = single.value.as_ref().and_then(|value| value.convert(*ty));
            }
        }
        info.call = Some(resolved.target);
        info
    }

    fn check_call_arguments(
        &mut self,
        function: &str,
        signature: &FunctionSignature,
        args: &[Expr],
        infos: &[ExprInfo],
        span: Span,
    ) {
        let found = args.len();
        let min = signature.min_arguments();
        let max = signature.params.len();
        if found < min || (!signature.is_vararg && found > max) {
            self.error(TypeError::ArgumentCount {
                function: function.to_string(),
                min,
                max,
                found,
                span,
            });
        }
        for (index, (arg, info)) in args.iter().zip(infos).enumerate() {
            let Some((_, param)) = signature.params.get(index) else {
                break;
            };
            self.check_value_into(param, arg, info, AssignContext::Argument { function, index });
        }
    }

    // ========================================================================
    // Callees
    // ========================================================================

    /// `super.name(...)`: the implementation in the base of the class that
    /// contains the call.
    fn super_call(&mut self, ident: &Ident) -> ResolvedCall {
        let name = ident.name.clone();
        if self.in_static_context() {
            self.error(TypeError::InvalidContext {
                message: "\"super\" cannot be used in a static function".to_string(),
                span: ident.span,
            });
        } else {
            self.mark_uses_self();
        }

        let key = self.current_key();
        let mut native = None;
        match self.base_of(&key) {
            super::BaseState::Script(base) => {
                if let Some((_, member)) = self.lookup_member(&base, &name) {
                    if let Some(signature) = member.signature.filter(|_| member.kind == MemberKind::Function) {
                        return ResolvedCall::checked(CallTarget::Super { name }, signature);
                    }
                }
                native = self.native_root(&base);
            }
            super::BaseState::Native(class) => native = Some(class),
            _ => {}
        }
        if let Some(method) = native.and_then(|class| self.registry().method(&class, &name)) {
            return ResolvedCall::checked(CallTarget::Super { name }, FunctionSignature::from_method_info(&method));
        }
        self.error(ResolutionError::UnknownMember {
            base: "super".to_string(),
            member: name.clone(),
            span: ident.span,
        });
        ResolvedCall::unchecked(CallTarget::Super { name })
    }

    /// `name(...)`.
    fn identifier_call(&mut self, callee: &Expr, ident: &Ident, arg_count: usize) -> ResolvedCall {
        let name = ident.name.as_str();
        let span = ident.span;

        if let Some(lookup) = self.scope.get_or_capture(name) {
            let info = self.local_expr(lookup);
            self.record(callee.id, info);
            return ResolvedCall::unchecked(CallTarget::CallableValue);
        }

        let key = self.current_key();
        for owner in self.script_chain(&key) {
            if !self.declares_member(&owner, name) {
                continue;
            }
            let Some(member) = self.class_member(&owner, name) else {
                return ResolvedCall::unchecked(CallTarget::Dynamic { name: name.to_string() });
            };
            let member_info = self.member_expr(owner, &member, span, false);
            self.record(callee.id, member_info);
            return match (&member.kind, member.signature) {
                (MemberKind::Function, Some(signature)) => {
                    if !signature.is_static {
                        self.require_instance(name, span);
                    }
                    let target = CallTarget::SelfFunction {
                        name: name.to_string(),
                        is_static: signature.is_static,
                    };
                    ResolvedCall::checked(target, signature)
                }
                (MemberKind::Variable { .. }, _) if !member.data_type.is_hard()
                    || member.data_type.is_builtin(VariantType::Callable) =>
                {
                    if matches!(member.kind, MemberKind::Variable { is_static: false, .. }) {
                        self.require_instance(name, span);
                    }
                    ResolvedCall::unchecked(CallTarget::CallableValue)
                }
                _ => {
                    self.error(TypeError::NotCallable {
                        name: name.to_string(),
                        span,
                    });
                    ResolvedCall::unchecked(CallTarget::Dynamic { name: name.to_string() })
                }
            };
        }

        let registry = self.registry();
        if let Some(native) = self.native_root(&key) {
            if let Some(method) = registry.method(&native, name) {
                if !method.is_static() {
                    self.require_instance(name, span);
                }
                let target = CallTarget::NativeMethod {
                    class: native,
                    name: name.to_string(),
                    exact: is_exact(&method, arg_count),
                };
                return ResolvedCall::checked(target, FunctionSignature::from_method_info(&method));
            }
        }

        if let Some(ty) = VariantType::from_name(name) {
            return ResolvedCall::unchecked(CallTarget::BuiltinConstructor(ty)).returning(DataType::builtin(ty));
        }

        if let Some(method) = registry.utility_function(name) {
            let target = CallTarget::Utility { name: name.to_string() };
            return ResolvedCall::checked(target, FunctionSignature::from_method_info(&method));
        }

        if registry.class_exists(name) || registry.global_class(name).is_some() {
            self.error(TypeError::NotCallable {
                name: name.to_string(),
                span,
            });
        } else {
            self.error(ResolutionError::UnresolvedIdentifier {
                name: name.to_string(),
                span,
            });
        }
        ResolvedCall::unchecked(CallTarget::Dynamic { name: name.to_string() })
    }


    /// `base.name(...)`, dispatched on the static type of `base`.
    fn method_call(&mut self, base: &Expr, ident: &Ident, arg_count: usize) -> ResolvedCall {
        let base_info = self.reduce_value(base);
        let receiver = base_info.data_type;
        let name = ident.name.clone();
        let span = ident.span;
        let registry = self.registry();

        if receiver.is_meta {
            return match &receiver.kind {
                TypeKind::Class(key) => {
                    let instance = DataType::class(key.clone());
                    if name == "new" {
                        let mut signature = self
                            .lookup_member(key, "_init")
                            .and_then(|(_, member)| member.signature)
                            .unwrap_or_else(|| FunctionSignature::new("_init"));
                        signature.return_type = instance;
                        return ResolvedCall::checked(CallTarget::Constructor, signature);
                    }
                    if let Some((_, member)) = self.lookup_member(key, &name) {
                        if let (MemberKind::Function, Some(signature)) = (&member.kind, member.signature) {
                            if !signature.is_static {
                                self.error(ResolutionError::InstanceFromStatic { member: name.clone(), span });
                            }
                            let target = CallTarget::ScriptMethod {
                                name,
                                is_static: true,
                                on_instance: false,
                            };
                            return ResolvedCall::checked(target, signature);
                        }
                        self.error(TypeError::NotCallable { name, span });
                        return ResolvedCall::unchecked(CallTarget::CallableValue);
                    }
                    if let Some(native) = self.native_root(key) {
                        if let Some(method) = registry.method(&native, &name).filter(MethodInfo::is_static) {
                            let target = CallTarget::NativeMethod {
                                class: native,
                                name,
                                exact: false,
                            };
                            return ResolvedCall::checked(target, FunctionSignature::from_method_info(&method));
                        }
                    }
                    self.unknown_method(&receiver, name, span)
                }
                TypeKind::Native { class } => {
                    if name == "new" {
                        if !registry.can_instantiate(class) {
                            self.error(TypeError::InvalidContext {
                                message: format!("native class \"{}\" cannot be instantiated", class),
                                span,
                            });
                        }
                        return ResolvedCall::unchecked(CallTarget::Constructor).returning(DataType::native(class.clone()));
                    }
                    match registry.method(class, &name) {
                        Some(method) => {
                            if !method.is_static() {
                                self.error(ResolutionError::InstanceFromStatic { member: name.clone(), span });
                            }
                            let target = CallTarget::NativeMethod {
                                class: class.clone(),
                                name,
                                exact: is_exact(&method, arg_count),
                            };
                            ResolvedCall::checked(target, FunctionSignature::from_method_info(&method))
                        }
                        None => self.unknown_method(&receiver, name, span),
                    }
                }
                TypeKind::Builtin { ty, .. } => self.builtin_call(*ty, &receiver, name, span),
                TypeKind::Enum { .. } => self.builtin_call(VariantType::Dictionary, &receiver, name, span),
                _ => self.dynamic_call(name, span),
            };
        }

        match &receiver.kind {
            TypeKind::Class(key) => {
                if let Some((_, member)) = self.lookup_member(key, &name) {
                    return match (&member.kind, member.signature) {
                        (MemberKind::Function, Some(signature)) => {
                            if signature.is_static {
                                self.warn(
                                    WarningCode::StaticCalledOnInstance,
                                    format!("static function \"{}\" called on an instance", name),
                                    span,
                                );
                            }
                            let target = CallTarget::ScriptMethod {
                                name,
                                is_static: signature.is_static,
                                on_instance: true,
                            };
                            ResolvedCall::checked(target, signature)
                        }
                        _ if !member.data_type.is_hard() || member.data_type.is_builtin(VariantType::Callable) => {
                            ResolvedCall::unchecked(CallTarget::Dynamic { name })
                        }
                        _ => {
                            self.error(TypeError::NotCallable { name: name.clone(), span });
                            ResolvedCall::unchecked(CallTarget::Dynamic { name })
                        }
                    };
                }
                if let Some(native) = self.native_root(key) {
                    if let Some(method) = registry.method(&native, &name) {
                        let target = CallTarget::NativeMethod {
                            class: native,
                            name,
                            exact: false,
                        };
                        return ResolvedCall::checked(target, FunctionSignature::from_method_info(&method));
                    }
                }
                self.unknown_method(&receiver, name, span)
            }
            TypeKind::Native { class } => match registry.method(class, &name) {
                Some(method) => {
                    let target = CallTarget::NativeMethod {
                        class: class.clone(),
                        name,
                        exact: is_exact(&method, arg_count),
                    };
                    ResolvedCall::checked(target, FunctionSignature::from_method_info(&method))
                }
                None => self.unknown_method(&receiver, name, span),
            },
            TypeKind::Builtin { ty, .. } => self.builtin_call(*ty, &receiver, name, span),
            TypeKind::Enum { .. } => self.unknown_method(&receiver, name, span),
            TypeKind::Resolving => {
                self.cyclic_reference(span);
                ResolvedCall::unchecked(CallTarget::Dynamic { name })
            }
            TypeKind::Variant | TypeKind::Unresolved => self.dynamic_call(name, span),
        }
    }

    fn builtin_call(&mut self, ty: VariantType, receiver: &DataType, name: String, span: Span) -> ResolvedCall {
        match self.registry().builtin_method(ty, &name) {
            Some(method) => {
                let signature = FunctionSignature::from_method_info(&method);
                ResolvedCall::checked(CallTarget::BuiltinMethod { ty, name }, signature)
            }
            None => self.unknown_method(receiver, name, span),
        }
    }

    fn dynamic_call(&mut self, name: String, span: Span) -> ResolvedCall {
        self.warn(
            WarningCode::UnsafeMethodAccess,
            format!("method \"{}\" is not known statically", name),
            span,
        );
        self.mark_unsafe();
        ResolvedCall::unchecked(CallTarget::Dynamic { name })
    }

    fn unknown_method(&mut self, receiver: &DataType, name: String, span: Span) -> ResolvedCall {
        self.error(ResolutionError::UnknownMember {
            base: receiver.to_string(),
            member: name.clone(),
            span,
        });
        ResolvedCall::unchecked(CallTarget::Dynamic { name })
    }
}
