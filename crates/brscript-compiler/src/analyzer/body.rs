//! Stage 3: function bodies.
//!
//! Resolves every statement of every function, the initializers of member
//! variables and inline accessors. Lambdas are resolved where they appear,
//! in a scope nested in the enclosing function so that captured locals are
//! found and recorded.

use brscript_core::{DataType, Span, TypeError, TypeKind, Variant, VariantType, WarningCode};
use brscript_parser::ast::{
    Accessors, ClassId, ConstantDecl, Expr, ExprKind, FunctionDecl, Member, NodeId, PatternKind,
    Stmt, StmtKind, Suite, TypeSpec, VariableDecl,
};
use tracing::trace;

use super::const_fold::adapt_constant;
use super::types::AssignContext;
use super::{Analyzer, FunctionContext};
use crate::analysis::{
    Capture, ClassStage, DeclInfo, ExprInfo, FunctionAnalysis, FunctionSignature, InheritanceState,
    LocalKind,
};
use crate::scope::LocalScope;

/// Role of a function synthesized from an inline accessor.
enum AccessorRole {
    Getter(DataType),
    Setter(DataType),
}

/// Span of the first line of a statement, for compound statements whose
/// nested blocks are marked separately.
fn header_span(span: Span) -> Span {
    Span {
        end_line: span.line,
        ..span
    }
}

impl Analyzer<'_> {
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn resolve_class_body(&mut self, id: ClassId) {
        self.resolve_class_interface(id);
        match self.unit.with_class(id, |class| class.stage) {
            Some(ClassStage::InterfaceSolved) => {}
            _ => return,
        }
        if self.unit.inheritance_state(id) == InheritanceState::Invalid {
            self.unit
                .update_class(id, |class| class.stage = ClassStage::BodySolved);
            return;
        }
        self.unit
            .update_class(id, |class| class.stage = ClassStage::BodyResolving);

        let tree = self.tree.clone();
        let Some(node) = tree.class(id) else {
            return;
        };
        trace!(path = %self.unit.path(), class = %node.fqcn, "resolving bodies");

        for member in &node.members {
            match member {
                Member::Variable(decl) => self.resolve_variable_member(id, decl),
                Member::Function(decl) => {
                    self.in_class(id, |analyzer| analyzer.resolve_function(decl, None));
                }
                _ => {}
            }
        }

        self.unit
            .update_class(id, |class| class.stage = ClassStage::BodySolved);
    }

    fn resolve_variable_member(&mut self, id: ClassId, decl: &VariableDecl) {
        let key = self.key_of(id);
        let data_type = self
            .class_member(&key, &decl.name.name)
            .map(|member| member.data_type)
            .unwrap_or_else(DataType::variant);

        if let Some(initializer) = &decl.initializer {
            self.in_class(id, |analyzer| {
                analyzer.in_initializer(decl.is_static, decl.span, |analyzer| {
                    let info = analyzer.reduce_value(initializer);
                    analyzer.check_value_into(&data_type, initializer, &info, AssignContext::Assignment);
                });
            });
        }

        if let Accessors::Inline { getter, setter } = &decl.accessors {
            if let Some(getter) = getter {
                let role = AccessorRole::Getter(data_type.clone());
                self.in_class(id, |analyzer| analyzer.resolve_function(getter, Some(role)));
            }
            if let Some(setter) = setter {
                if setter.params.len() != 1 {
                    self.error(TypeError::InvalidAccessor {
                        member: decl.name.name.clone(),
                        message: "a setter takes exactly one parameter".to_string(),
                        span: setter.span,
                    });
                }
                let role = AccessorRole::Setter(data_type.clone());
                self.in_class(id, |analyzer| analyzer.resolve_function(setter, Some(role)));
            }
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn resolve_function(&mut self, decl: &FunctionDecl, role: Option<AccessorRole>) {
        let key = self.current_key();
        let name = decl.name.name.clone();
        let mut signature = match &role {
            None => self
                .class_member(&key, &name)
                .and_then(|member| member.signature)
                .unwrap_or_else(|| self.function_signature(decl)),
            Some(_) => self.function_signature(decl),
        };
        match role {
            Some(AccessorRole::Getter(data_type)) => signature.return_type = data_type,
            Some(AccessorRole::Setter(data_type)) => {
                if let (Some(param), Some(spec)) = (signature.params.first_mut(), decl.params.first()) {
                    if spec.ty.is_none() {
                        param.1 = data_type;
                    }
                }
                signature.return_type = DataType::nil();
            }
            None => {}
        }

        self.function = Some(FunctionContext {
            name: name.clone(),
            is_static: decl.is_static,
            return_type: signature.return_type.clone(),
            ..FunctionContext::default()
        });
        self.scope = LocalScope::new();

        self.declare_parameters(decl, &signature);
        let returns = self.resolve_suite(&decl.body);
        self.check_missing_return(decl, &signature, returns);
        self.report_unused_parameters();

        let context = self.function.take().unwrap_or_default();
        if context.has_await {
            signature.is_coroutine = true;
            let id = self.class;
            self.unit.update_class(id, |class| {
                if let Some(member_signature) = class
                    .members
                    .get_mut(&name)
                    .and_then(|member| member.signature.as_mut())
                {
                    member_signature.is_coroutine = true;
                }
            });
        }
        self.tables.functions.insert(
            decl.id,
            FunctionAnalysis {
                signature,
                captures: Vec::new(),
                uses_self: context.uses_self,
                is_lambda: false,
            },
        );
    }

    /// `func(args): body` inside a function or initializer.
    pub(super) fn resolve_lambda(&mut self, decl: &FunctionDecl) -> ExprInfo {
        let mut signature = self.function_signature(decl);
        let is_static = self.in_static_context();
        let name = if decl.name.name.is_empty() {
            "<anonymous lambda>".to_string()
        } else {
            decl.name.name.clone()
        };

        let outer_scope = std::mem::take(&mut self.scope);
        self.scope = LocalScope::nested(outer_scope);
        let outer_function = self.function.replace(FunctionContext {
            name,
            is_static,
            return_type: signature.return_type.clone(),
            ..FunctionContext::default()
        });
        let outer_statement = self.statement;
        self.lambdas.push(decl.id);

        self.declare_parameters(decl, &signature);
        let returns = self.resolve_suite(&decl.body);
        self.check_missing_return(decl, &signature, returns);
        self.report_unused_parameters();

        self.lambdas.pop();
        let context = self.function.take().unwrap_or_default();
        self.function = outer_function;
        self.statement = outer_statement;

        let captures = self
            .scope
            .captures()
            .iter()
            .map(|capture| Capture {
                name: capture.name.clone(),
                decl: capture.decl,
                data_type: capture.data_type.clone(),
            })
            .collect();
        self.scope = self.scope.take_parent().unwrap_or_default();

        let uses_self = context.uses_self || self.lambda_uses_self.contains(&decl.id);
        if uses_self {
            if let Some(function) = self.function.as_mut() {
                function.uses_self = true;
            }
        }
        signature.is_coroutine = context.has_await;
        self.tables.functions.insert(
            decl.id,
            FunctionAnalysis {
                signature,
                captures,
                uses_self,
                is_lambda: true,
            },
        );
        ExprInfo::typed(DataType::builtin(VariantType::Callable))
    }

    fn declare_parameters(&mut self, decl: &FunctionDecl, signature: &FunctionSignature) {
        for (index, param) in decl.params.iter().enumerate() {
            let data_type = signature
                .params
                .get(index)
                .map(|(_, ty)| ty.clone())
                .unwrap_or_else(DataType::variant);
            if let Some(default) = &param.default {
                self.statement = Some(param.span);
                let info = self.reduce_value(default);
                self.check_value_into(&data_type, default, &info, AssignContext::Assignment);
            }
            self.declare_local(
                &param.name.name,
                param.id,
                data_type,
                LocalKind::Parameter(index),
                param.name.span,
                None,
            );
        }
    }

    fn check_missing_return(&mut self, decl: &FunctionDecl, signature: &FunctionSignature, returns: bool) {
        let declared = decl.return_type.as_ref().is_some_and(|spec| !spec.is_void());
        if declared && !returns && !signature.return_type.is_void() {
            let function = self
                .function
                .as_ref()
                .map(|function| function.name.clone())
                .unwrap_or_default();
            self.error(TypeError::MissingReturn {
                function,
                span: decl.span,
            });
        }
    }

    fn report_unused_parameters(&mut self) {
        for var in self.scope.drain() {
            let unused = self
                .tables
                .decls
                .get(&var.decl)
                .is_some_and(|decl| decl.usages == 0);
            if unused && matches!(var.kind, LocalKind::Parameter(_)) && !var.name.starts_with('_') {
                self.warn(
                    WarningCode::UnusedParameter,
                    format!("parameter \"{}\" is never used", var.name),
                    var.span,
                );
            }
        }
    }

    // ========================================================================
    // Locals
    // ========================================================================

    /// Declare a local in the innermost block and record it.
    pub(super) fn declare_local(
        &mut self,
        name: &str,
        decl: NodeId,
        data_type: DataType,
        kind: LocalKind,
        span: Span,
        value: Option<Variant>,
    ) {
        self.check_shadowing(name, span);

        if let Err(redeclaration) = self.scope.declare(name, decl, data_type.clone(), kind, span) {
            self.error(TypeError::InvalidContext {
                message: format!(
                    "\"{}\" is already declared in this block (line {})",
                    redeclaration.name, redeclaration.original.line
                ),
                span,
            });
        }
        self.tables.decls.insert(
            decl,
            DeclInfo {
                name: name.to_string(),
                data_type,
                kind,
                value,
                usages: 0,
                span,
            },
        );
    }

    fn check_shadowing(&mut self, name: &str, span: Span) {
        let confusable = self
            .function
            .as_ref()
            .and_then(|function| function.closed_names.last())
            .is_some_and(|names| names.contains(name));
        if confusable {
            self.warn(
                WarningCode::ConfusableLocalDeclaration,
                format!("\"{}\" was declared in a nested block above this declaration", name),
                span,
            );
        }

        if self.scope.get(name).is_some_and(|var| var.depth < self.scope.depth()) {
            self.warn(
                WarningCode::ShadowedVariable,
                format!("local \"{}\" shadows a local of an enclosing block", name),
                span,
            );
            return;
        }

        let key = self.current_key();
        let chain = self.script_chain(&key);
        if let Some(position) = chain.iter().position(|class| self.declares_member(class, name)) {
            let (code, place) = if position == 0 {
                (WarningCode::ShadowedVariable, "the class")
            } else {
                (WarningCode::ShadowedVariableBaseClass, "a base class")
            };
            self.warn(
                code,
                format!("local \"{}\" shadows a member of {}", name, place),
                span,
            );
            return;
        }
        if let Some(native) = self.native_root(&key) {
            let registry = self.registry();
            if registry.has_property(&native, name) || registry.has_method(&native, name) {
                self.warn(
                    WarningCode::ShadowedVariableBaseClass,
                    format!("local \"{}\" shadows a member of native class \"{}\"", name, native),
                    span,
                );
            }
        }
    }

    fn enter_block(&mut self) {
        self.scope.push_scope();
        if let Some(function) = self.function.as_mut() {
            function.closed_names.push(Default::default());
        }
    }

    fn exit_block(&mut self) {
        let removed = self.scope.pop_scope();
        for var in &removed {
            let unused = self
                .tables
                .decls
                .get(&var.decl)
                .is_some_and(|decl| decl.usages == 0);
            if !unused || var.name.starts_with('_') {
                continue;
            }
            match var.kind {
                LocalKind::Variable => self.warn(
                    WarningCode::UnusedVariable,
                    format!("local variable \"{}\" is never used", var.name),
                    var.span,
                ),
                LocalKind::Constant => self.warn(
                    WarningCode::UnusedLocalConstant,
                    format!("local constant \"{}\" is never used", var.name),
                    var.span,
                ),
                _ => {}
            }
        }
        if let Some(function) = self.function.as_mut() {
            function.closed_names.pop();
            if let Some(parent) = function.closed_names.last_mut() {
                parent.extend(removed.into_iter().map(|var| var.name));
            }
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Resolve a block. Returns whether every path through it returns.
    fn resolve_suite(&mut self, suite: &Suite) -> bool {
        self.enter_block();
        let mut returns = false;
        let mut terminated = false;
        let mut reported = false;
        for stmt in &suite.statements {
            if terminated && !reported {
                self.warn(
                    WarningCode::UnreachableCode,
                    "unreachable code after a return, break or continue",
                    stmt.span,
                );
                reported = true;
            }
            let always_returns = self.resolve_statement(stmt);
            returns |= always_returns;
            terminated |= always_returns || stmt.is_terminator();
        }
        self.exit_block();
        returns
    }

    fn resolve_statement(&mut self, stmt: &Stmt) -> bool {
        self.statement = Some(stmt.span);
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.resolve_expression_statement(expr);
                false
            }
            StmtKind::Var(decl) => {
                self.resolve_local_variable(decl);
                false
            }
            StmtKind::Const(decl) => {
                self.resolve_local_constant(decl);
                false
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.statement = Some(header_span(stmt.span));
                self.reduce_value(condition);
                let then_returns = self.resolve_suite(then_branch);
                let else_returns = else_branch
                    .as_ref()
                    .is_some_and(|suite| self.resolve_suite(suite));
                then_returns && else_returns
            }
            StmtKind::While { condition, body } => {
                self.statement = Some(header_span(stmt.span));
                self.reduce_value(condition);
                self.in_loop(|analyzer| analyzer.resolve_suite(body));
                false
            }
            StmtKind::For {
                variable,
                ty,
                iterable,
                body,
            } => {
                self.statement = Some(header_span(stmt.span));
                let iterable_info = self.reduce_value(iterable);
                let element_type = self.for_variable_type(ty.as_ref(), &iterable_info.data_type, iterable.span);
                self.enter_block();
                self.declare_local(
                    &variable.name,
                    stmt.id,
                    element_type,
                    LocalKind::ForVariable,
                    variable.span,
                    None,
                );
                self.in_loop(|analyzer| analyzer.resolve_suite(body));
                self.exit_block();
                false
            }
            StmtKind::Match { test, branches } => {
                self.statement = Some(header_span(stmt.span));
                let test_type = self.reduce_value(test).data_type;
                let mut all_return = !branches.is_empty();
                let mut catch_all = false;
                for branch in branches {
                    self.statement = Some(header_span(branch.span));
                    self.enter_block();
                    self.resolve_branch_patterns(branch, &test_type);
                    let returns = self.resolve_suite(&branch.body);
                    self.exit_block();
                    all_return &= returns;
                    catch_all |= branch.guard.is_none()
                        && branch
                            .patterns
                            .iter()
                            .any(|pattern| matches!(pattern.kind, PatternKind::Wildcard | PatternKind::Bind(_)));
                }
                all_return && catch_all
            }
            StmtKind::Return(value) => {
                self.resolve_return(value.as_ref(), stmt.span);
                true
            }
            StmtKind::Break | StmtKind::Continue => {
                let in_loop = self.function.as_ref().is_some_and(|function| function.loop_depth > 0);
                if !in_loop {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                    self.error(TypeError::InvalidContext {
                        message: format!("\"{}\" can only be used inside a loop", keyword),
                        span: stmt.span,
                    });
                }
                false
            }
            StmtKind::Pass => false,
            StmtKind::Assert { condition, message } => {
                self.reduce_value(condition);
                if let Some(message) = message {
                    self.reduce_value(message);
                }
                false
            }
        }
    }

    fn in_loop<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if let Some(function) = self.function.as_mut() {
            function.loop_depth += 1;
        }
        let result = f(self);
        if let Some(function) = self.function.as_mut() {
            function.loop_depth = function.loop_depth.saturating_sub(1);
        }
        result
    }

    fn resolve_expression_statement(&mut self, expr: &Expr) {
        let info = self.reduce_expr(expr);
        match &expr.kind {
            ExprKind::Call { .. } => {
                if info.data_type.is_hard() && !info.data_type.is_void() && !info.data_type.is_variant() {
                    self.warn(
                        WarningCode::ReturnValueDiscarded,
                        format!(
                            "the value returned by \"{}\" is discarded",
                            super::reduce::callee_name(expr)
                        ),
                        expr.span,
                    );
                }
            }
            ExprKind::Assignment { .. } | ExprKind::Await(_) => {}
            _ => self.warn(
                WarningCode::StandaloneExpression,
                "standalone expression has no effect",
                expr.span,
            ),
        }
    }

    fn resolve_local_variable(&mut self, decl: &VariableDecl) {
        let declared = decl.ty.as_ref().map(|spec| self.resolve_type_spec(spec));
        let initializer = decl
            .initializer
            .as_ref()
            .map(|expr| (expr, self.reduce_value(expr)));

        let data_type = match (declared, &initializer) {
            (Some(declared), _) => declared,
            (None, Some((expr, info))) if decl.infer => {
                self.inferred_type(&decl.name.name, info.data_type.clone(), expr.span)
            }
            (None, Some((_, info))) if info.data_type.is_set() && !info.data_type.is_variant() => {
                info.data_type.clone().inferred()
            }
            _ => DataType::variant(),
        };
        if let Some((expr, info)) = &initializer {
            self.check_value_into(&data_type, expr, info, AssignContext::Assignment);
        }
        self.declare_local(
            &decl.name.name,
            decl.id,
            data_type,
            LocalKind::Variable,
            decl.name.span,
            None,
        );
    }

    fn resolve_local_constant(&mut self, decl: &ConstantDecl) {
        let declared = decl.ty.as_ref().map(|spec| self.resolve_type_spec(spec));
        let errors_before = self.unit.error_count();
        let info = self.reduce_value(&decl.initializer);
        let mut value = info.value.clone();
        if value.is_none() && self.unit.error_count() == errors_before {
            self.error(TypeError::NotConstant {
                context: format!("value of constant \"{}\"", decl.name.name),
                span: decl.initializer.span,
            });
        }
        let data_type = match declared {
            Some(declared) => {
                self.check_assignment(&declared, &info.data_type, decl.initializer.span, AssignContext::Assignment);
                value = value.map(|v| adapt_constant(&v, &declared).unwrap_or(v));
                declared
            }
            None => info.data_type,
        };
        self.declare_local(
            &decl.name.name,
            decl.id,
            data_type,
            LocalKind::Constant,
            decl.name.span,
            value,
        );
    }

    /// Type of a `for` variable: the annotation, or the element type of a
    /// statically typed iterable.
    fn for_variable_type(&mut self, spec: Option<&TypeSpec>, iterable: &DataType, span: Span) -> DataType {
        let element = if !iterable.is_hard() || iterable.is_meta {
            None
        } else {
            match &iterable.kind {
                TypeKind::Builtin {
                    ty: VariantType::Array,
                    ..
                } => iterable.element_type(0).cloned(),
                TypeKind::Builtin {
                    ty: VariantType::Int | VariantType::Float,
                    ..
                } => Some(DataType::builtin(VariantType::Int)),
                TypeKind::Builtin {
                    ty: VariantType::String | VariantType::StringName,
                    ..
                } => Some(DataType::builtin(VariantType::String)),
                TypeKind::Builtin {
                    ty: VariantType::Dictionary,
                    ..
                } => iterable.element_type(0).cloned(),
                TypeKind::Builtin { .. } | TypeKind::Enum { .. } => {
                    self.error(TypeError::InvalidContext {
                        message: format!("cannot iterate over a value of type \"{}\"", iterable),
                        span,
                    });
                    None
                }
                _ => None,
            }
        };

        match spec {
            Some(spec) => {
                let declared = self.resolve_type_spec(spec);
                match &element {
                    Some(element) => {
                        self.check_assignment(&declared, element, span, AssignContext::Assignment);
                    }
                    None => self.mark_unsafe(),
                }
                declared
            }
            None => element
                .map(DataType::inferred)
                .unwrap_or_else(DataType::variant),
        }
    }

    fn resolve_return(&mut self, value: Option<&Expr>, span: Span) {
        let return_type = self
            .function
            .as_ref()
            .map(|function| function.return_type.clone())
            .unwrap_or_else(DataType::variant);
        match value {
            Some(expr) => {
                let info = self.reduce_value(expr);
                if return_type.is_void() {
                    let function = self
                        .function
                        .as_ref()
                        .map(|function| function.name.clone())
                        .unwrap_or_default();
                    self.error(TypeError::InvalidContext {
                        message: format!("void function \"{}\" cannot return a value", function),
                        span: expr.span,
                    });
                } else {
                    self.check_value_into(&return_type, expr, &info, AssignContext::Return);
                }
            }
            None => {
                if return_type.is_hard() && !return_type.is_void() && !return_type.is_variant() {
                    self.error(TypeError::IncompatibleReturn {
                        expected: return_type.to_string(),
                        found: "void".to_string(),
                        span,
                    });
                }
            }
        }
    }
}
