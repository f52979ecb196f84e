//! Programmatic construction of [`ScriptTree`]s.
//!
//! The builder hands out sequential [`NodeId`]s and advances a line counter
//! for every statement and member so diagnostics and line tables have
//! distinct, predictable positions. All factories take `&self`, which lets
//! nested calls such as `b.binary(BinaryOp::Add, b.ident("a"), b.int(1))`
//! compose without borrow juggling.

use std::cell::{Cell, RefCell};

use brscript_core::{Span, Variant};
use rustc_hash::FxHashMap;

use crate::ast::*;

/// Builds a [`ScriptTree`] for one file.
pub struct TreeBuilder {
    path: String,
    classes: RefCell<Vec<ClassNode>>,
    next_id: Cell<u32>,
    line: Cell<u32>,
}

impl TreeBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let head = ClassNode {
            id: ClassId::HEAD,
            identifier: None,
            fqcn: path.clone(),
            extends: None,
            members: Vec::new(),
            member_indices: FxHashMap::default(),
            outer: None,
            icon_path: None,
            span: Span::lines(1, 1),
        };
        Self {
            path,
            classes: RefCell::new(vec![head]),
            next_id: Cell::new(0),
            line: Cell::new(1),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn head(&self) -> ClassId {
        ClassId::HEAD
    }

    /// Finish building and return the tree.
    pub fn finish(self) -> ScriptTree {
        let node_count = self.next_id.get();
        ScriptTree {
            path: self.path,
            classes: self.classes.into_inner(),
            node_count,
        }
    }

    // ========================================================================
    // Positions
    // ========================================================================

    fn id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    /// Span on the current line.
    fn span(&self) -> Span {
        Span::new(self.line.get(), 1, 1)
    }

    /// Move to the next line and return a span on it.
    fn next_line(&self) -> Span {
        let line = self.line.get() + 1;
        self.line.set(line);
        Span::new(line, 1, 1)
    }

    /// Force the line of the next declaration or statement.
    pub fn at_line(&self, line: u32) -> &Self {
        self.line.set(line.saturating_sub(1));
        self
    }

    pub fn current_line(&self) -> u32 {
        self.line.get()
    }

    // ========================================================================
    // Classes
    // ========================================================================

    fn with_class<R>(&self, class: ClassId, f: impl FnOnce(&mut ClassNode) -> R) -> R {
        let mut classes = self.classes.borrow_mut();
        f(&mut classes[class.index()])
    }

    /// `class_name Name`
    pub fn set_class_name(&self, name: &str) {
        let ident = self.ident_at(name);
        self.with_class(ClassId::HEAD, |class| class.identifier = Some(ident));
    }

    /// `@icon("path")`
    pub fn set_icon(&self, path: &str) {
        self.with_class(ClassId::HEAD, |class| class.icon_path = Some(path.to_string()));
    }

    /// `extends Name` or `extends Outer.Inner`
    pub fn extends_name(&self, class: ClassId, chain: &[&str]) {
        let clause = ExtendsClause {
            path: None,
            chain: chain.iter().map(|name| self.ident_at(name)).collect(),
            span: self.span(),
        };
        self.with_class(class, |node| node.extends = Some(clause));
    }

    /// `extends "path"` optionally followed by `.Inner`
    pub fn extends_path(&self, class: ClassId, path: &str, chain: &[&str]) {
        let clause = ExtendsClause {
            path: Some(path.to_string()),
            chain: chain.iter().map(|name| self.ident_at(name)).collect(),
            span: self.span(),
        };
        self.with_class(class, |node| node.extends = Some(clause));
    }

    /// Declare `class name:` inside `outer` and return its id.
    pub fn inner_class(&self, outer: ClassId, name: &str) -> ClassId {
        let span = self.next_line();
        let ident = Ident::new(name, span);
        let mut classes = self.classes.borrow_mut();
        let id = ClassId(classes.len() as u32);
        let fqcn = format!("{}::{}", classes[outer.index()].fqcn, name);
        classes.push(ClassNode {
            id,
            identifier: Some(ident.clone()),
            fqcn,
            extends: None,
            members: Vec::new(),
            member_indices: FxHashMap::default(),
            outer: Some(outer),
            icon_path: None,
            span,
        });
        let outer_node = &mut classes[outer.index()];
        outer_node
            .member_indices
            .insert(name.to_string(), outer_node.members.len());
        outer_node.members.push(Member::Class { id, name: ident });
        id
    }

    fn add_member(&self, class: ClassId, member: Member) -> usize {
        self.with_class(class, |node| {
            let index = node.members.len();
            if let Some(name) = member.name() {
                // A duplicate keeps the first index; the analyzer reports it.
                node.member_indices.entry(name.to_string()).or_insert(index);
            }
            node.members.push(member);
            index
        })
    }

    pub fn add_variable(&self, class: ClassId, decl: VariableDecl) -> usize {
        self.add_member(class, Member::Variable(decl))
    }

    pub fn add_constant(&self, class: ClassId, decl: ConstantDecl) -> usize {
        self.add_member(class, Member::Constant(decl))
    }

    pub fn add_signal(&self, class: ClassId, decl: SignalDecl) -> usize {
        self.add_member(class, Member::Signal(decl))
    }

    pub fn add_function(&self, class: ClassId, decl: FunctionDecl) -> usize {
        self.add_member(class, Member::Function(decl))
    }

    pub fn add_group(&self, class: ClassId, name: &str) -> usize {
        let ident = Ident::new(name, self.next_line());
        self.add_member(class, Member::Group(ident))
    }

    /// Add an enum. Named enums become one member; the values of an unnamed
    /// enum become individual members chained through `previous`.
    pub fn add_enum(&self, class: ClassId, decl: EnumDecl) {
        if decl.name.is_some() {
            self.add_member(class, Member::Enum(decl));
            return;
        }
        let mut previous = None;
        for mut value in decl.values {
            value.previous = previous;
            previous = Some(self.add_member(class, Member::EnumValue(value)));
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    pub fn ty(&self, name: &str) -> TypeSpec {
        self.ty_chain(&[name])
    }

    pub fn ty_chain(&self, chain: &[&str]) -> TypeSpec {
        TypeSpec {
            chain: chain.iter().map(|name| self.ident_at(name)).collect(),
            elements: Vec::new(),
            span: self.span(),
        }
    }

    /// `Array[element]`
    pub fn array_of(&self, element: TypeSpec) -> TypeSpec {
        let mut spec = self.ty("Array");
        spec.elements.push(element);
        spec
    }

    /// `Dictionary[key, value]`
    pub fn dictionary_of(&self, key: TypeSpec, value: TypeSpec) -> TypeSpec {
        let mut spec = self.ty("Dictionary");
        spec.elements.push(key);
        spec.elements.push(value);
        spec
    }

    pub fn var(&self, name: &str) -> VariableDecl {
        let span = self.next_line();
        VariableDecl {
            id: self.id(),
            name: Ident::new(name, span),
            ty: None,
            infer: false,
            initializer: None,
            is_static: false,
            accessors: Accessors::None,
            exported: false,
            span,
        }
    }

    pub fn constant(&self, name: &str, value: Expr) -> ConstantDecl {
        let span = self.next_line();
        ConstantDecl {
            id: self.id(),
            name: Ident::new(name, span),
            ty: None,
            initializer: value,
            span,
        }
    }

    pub fn signal(&self, name: &str, params: Vec<ParameterDecl>) -> SignalDecl {
        let span = self.next_line();
        SignalDecl {
            id: self.id(),
            name: Ident::new(name, span),
            params,
            span,
        }
    }

    /// `enum name { values }`; pass `None` for an unnamed enum.
    pub fn enumeration(&self, name: Option<&str>, values: Vec<(&str, Option<Expr>)>) -> EnumDecl {
        let span = self.next_line();
        let id = self.id();
        let values = values
            .into_iter()
            .map(|(value_name, value)| EnumValueDecl {
                id: self.id(),
                name: Ident::new(value_name, span),
                value,
                previous: None,
                span,
            })
            .collect();
        EnumDecl {
            id,
            name: name.map(|name| Ident::new(name, span)),
            values,
            span,
        }
    }

    pub fn param(&self, name: &str) -> ParameterDecl {
        let span = self.span();
        ParameterDecl {
            id: self.id(),
            name: Ident::new(name, span),
            ty: None,
            infer: false,
            default: None,
            span,
        }
    }

    /// `func name(params): body`. Build the body statements after calling
    /// [`TreeBuilder::func_header`] to keep lines in source order, or pass
    /// them directly when exact lines do not matter.
    pub fn func(&self, name: &str, params: Vec<ParameterDecl>, body: Vec<Stmt>) -> FunctionDecl {
        let span = match body.first() {
            Some(first) => Span::lines(first.span.line.saturating_sub(1), self.line.get()),
            None => self.next_line(),
        };
        FunctionDecl {
            id: self.id(),
            name: Ident::new(name, span),
            params,
            return_type: None,
            body: self.suite(body),
            is_static: false,
            span,
        }
    }

    /// Reserve the line of a function header so its body statements follow it.
    pub fn func_header(&self) -> &Self {
        self.next_line();
        self
    }

    /// `get: body`, stored as a parameterless function.
    pub fn getter(&self, member: &str, body: Vec<Stmt>) -> FunctionDecl {
        self.func(&format!("@{}_getter", member), Vec::new(), body)
    }

    /// `set(param): body`
    pub fn setter(&self, member: &str, param: &str, body: Vec<Stmt>) -> FunctionDecl {
        let param = self.param(param);
        self.func(&format!("@{}_setter", member), vec![param], body)
    }

    pub fn suite(&self, statements: Vec<Stmt>) -> Suite {
        let span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => Span::lines(first.span.line, last.span.end_line),
            _ => self.span(),
        };
        Suite { statements, span }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expr(&self, kind: ExprKind) -> Expr {
        Expr {
            id: self.id(),
            span: self.span(),
            kind,
        }
    }

    pub fn literal(&self, value: Variant) -> Expr {
        self.expr(ExprKind::Literal(value))
    }

    pub fn int(&self, value: i64) -> Expr {
        self.literal(Variant::Int(value))
    }

    pub fn float(&self, value: f64) -> Expr {
        self.literal(Variant::Float(value))
    }

    pub fn string(&self, value: &str) -> Expr {
        self.literal(Variant::String(value.to_string()))
    }

    pub fn boolean(&self, value: bool) -> Expr {
        self.literal(Variant::Bool(value))
    }

    pub fn null(&self) -> Expr {
        self.literal(Variant::Nil)
    }

    pub fn ident(&self, name: &str) -> Expr {
        let ident = self.ident_at(name);
        self.expr(ExprKind::Identifier(ident))
    }

    fn ident_at(&self, name: &str) -> Ident {
        Ident::new(name, self.span())
    }

    pub fn self_ref(&self) -> Expr {
        self.expr(ExprKind::SelfRef)
    }

    pub fn array(&self, elements: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Array(elements))
    }

    pub fn dictionary(&self, entries: Vec<(Expr, Expr)>) -> Expr {
        self.expr(ExprKind::Dictionary(entries))
    }

    pub fn unary(&self, op: UnaryOp, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn ternary(&self, condition: Expr, true_expr: Expr, false_expr: Expr) -> Expr {
        self.expr(ExprKind::Ternary {
            condition: Box::new(condition),
            true_expr: Box::new(true_expr),
            false_expr: Box::new(false_expr),
        })
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::Assignment {
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// `target op= value`
    pub fn assign_op(&self, op: BinaryOp, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::Assignment {
            op: Some(op),
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn attr(&self, base: Expr, name: &str) -> Expr {
        let name = self.ident_at(name);
        self.expr(ExprKind::Attribute {
            base: Box::new(base),
            name,
        })
    }

    pub fn subscript(&self, base: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::Subscript {
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    /// `name(args)`
    pub fn call(&self, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.ident(name);
        self.call_expr(callee, args)
    }

    /// `callee(args)` for an arbitrary callee expression.
    pub fn call_expr(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
            is_super: false,
        })
    }

    /// `base.name(args)`
    pub fn method(&self, base: Expr, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.attr(base, name);
        self.call_expr(callee, args)
    }

    /// `super.name(args)`
    pub fn super_call(&self, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.ident(name);
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
            is_super: true,
        })
    }

    pub fn cast(&self, operand: Expr, ty: TypeSpec) -> Expr {
        self.expr(ExprKind::Cast {
            operand: Box::new(operand),
            ty,
        })
    }

    pub fn type_test(&self, operand: Expr, ty: TypeSpec, negated: bool) -> Expr {
        self.expr(ExprKind::TypeTest {
            operand: Box::new(operand),
            ty,
            negated,
        })
    }

    pub fn lambda(&self, function: FunctionDecl) -> Expr {
        self.expr(ExprKind::Lambda(Box::new(function)))
    }

    pub fn preload(&self, path: &str) -> Expr {
        self.expr(ExprKind::Preload {
            path: path.to_string(),
        })
    }

    pub fn await_expr(&self, inner: Expr) -> Expr {
        self.expr(ExprKind::Await(Box::new(inner)))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn stmt(&self, kind: StmtKind) -> Stmt {
        let span = self.next_line();
        Stmt {
            id: self.id(),
            span: Span::lines(span.line, span.line),
            kind,
        }
    }

    /// A statement spanning from the line before its nested body to the body's end.
    fn block_stmt(&self, start: u32, kind: StmtKind) -> Stmt {
        let end = self.line.get().max(start);
        Stmt {
            id: self.id(),
            span: Span::lines(start, end),
            kind,
        }
    }

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn var_stmt(&self, decl: VariableDecl) -> Stmt {
        let line = decl.span.line;
        let mut stmt = self.stmt(StmtKind::Var(decl));
        stmt.span = Span::lines(line, line);
        stmt
    }

    pub fn const_stmt(&self, decl: ConstantDecl) -> Stmt {
        let line = decl.span.line;
        let mut stmt = self.stmt(StmtKind::Const(decl));
        stmt.span = Span::lines(line, line);
        stmt
    }

    pub fn if_stmt(&self, condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
        let start = condition.span.line;
        let then_branch = self.suite(then_branch);
        let else_branch = else_branch.map(|statements| self.suite(statements));
        self.block_stmt(
            start,
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        )
    }

    pub fn while_stmt(&self, condition: Expr, body: Vec<Stmt>) -> Stmt {
        let start = condition.span.line;
        let body = self.suite(body);
        self.block_stmt(start, StmtKind::While { condition, body })
    }

    pub fn for_stmt(&self, variable: &str, ty: Option<TypeSpec>, iterable: Expr, body: Vec<Stmt>) -> Stmt {
        let start = iterable.span.line;
        let variable = Ident::new(variable, iterable.span);
        let body = self.suite(body);
        self.block_stmt(
            start,
            StmtKind::For {
                variable,
                ty,
                iterable,
                body,
            },
        )
    }

    pub fn match_stmt(&self, test: Expr, branches: Vec<MatchBranch>) -> Stmt {
        let start = test.span.line;
        self.block_stmt(start, StmtKind::Match { test, branches })
    }

    pub fn branch(&self, patterns: Vec<Pattern>, guard: Option<Expr>, body: Vec<Stmt>) -> MatchBranch {
        let span = patterns.first().map(|p| p.span).unwrap_or_else(|| self.span());
        MatchBranch {
            id: self.id(),
            patterns,
            guard,
            body: self.suite(body),
            span,
        }
    }

    pub fn return_stmt(&self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn break_stmt(&self) -> Stmt {
        self.stmt(StmtKind::Break)
    }

    pub fn continue_stmt(&self) -> Stmt {
        self.stmt(StmtKind::Continue)
    }

    pub fn pass_stmt(&self) -> Stmt {
        self.stmt(StmtKind::Pass)
    }

    pub fn assert_stmt(&self, condition: Expr, message: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Assert { condition, message })
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    fn pattern(&self, kind: PatternKind) -> Pattern {
        Pattern {
            id: self.id(),
            span: self.next_line(),
            kind,
        }
    }

    pub fn pat_literal(&self, value: Expr) -> Pattern {
        self.pattern(PatternKind::Literal(value))
    }

    pub fn pat_expr(&self, value: Expr) -> Pattern {
        self.pattern(PatternKind::Expression(value))
    }

    pub fn pat_bind(&self, name: &str) -> Pattern {
        let ident = self.ident_at(name);
        self.pattern(PatternKind::Bind(ident))
    }

    pub fn pat_wildcard(&self) -> Pattern {
        self.pattern(PatternKind::Wildcard)
    }

    pub fn pat_rest(&self) -> Pattern {
        self.pattern(PatternKind::Rest)
    }

    pub fn pat_array(&self, elements: Vec<Pattern>) -> Pattern {
        self.pattern(PatternKind::Array(elements))
    }

    pub fn pat_dictionary(&self, entries: Vec<(Pattern, Option<Pattern>)>) -> Pattern {
        self.pattern(PatternKind::Dictionary(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_unique() {
        let b = TreeBuilder::new("res://a.br");
        let first = b.int(1);
        let second = b.int(2);
        let sum = b.binary(BinaryOp::Add, first, second);
        let tree = {
            b.add_variable(b.head(), b.var("x").with_initializer(sum));
            b.finish()
        };
        let Member::Variable(decl) = tree.head().member("x").unwrap() else {
            panic!("expected variable");
        };
        let init = decl.initializer.as_ref().unwrap();
        assert_eq!(init.id, NodeId(2));
        assert_eq!(tree.node_count, 4);
    }

    #[test]
    fn inner_classes_get_qualified_names() {
        let b = TreeBuilder::new("res://a.br");
        let inner = b.inner_class(b.head(), "Inner");
        let deeper = b.inner_class(inner, "Deeper");
        let tree = b.finish();
        assert_eq!(tree.class(deeper).unwrap().fqcn, "res://a.br::Inner::Deeper");
        assert_eq!(tree.find_nested(ClassId::HEAD, &["Inner", "Deeper"]), Some(deeper));
        assert_eq!(tree.class(inner).unwrap().outer, Some(ClassId::HEAD));
    }

    #[test]
    fn unnamed_enum_values_become_members() {
        let b = TreeBuilder::new("res://a.br");
        b.add_enum(b.head(), b.enumeration(None, vec![("A", None), ("B", Some(b.int(5))), ("C", None)]));
        let tree = b.finish();
        let head = tree.head();
        let Some(Member::EnumValue(c)) = head.member("C") else {
            panic!("expected enum value");
        };
        assert_eq!(c.previous, head.member_indices.get("B").copied());
    }

    #[test]
    fn names_and_identifier_expressions() {
        let b = TreeBuilder::new("res://a.br");
        b.set_class_name("Player");
        b.extends_path(b.head(), "res://base.br", &["Inner"]);
        let expr = b.ident("speed");
        let tree = b.finish();

        assert_eq!(tree.head().identifier.as_ref().map(|ident| ident.name.as_str()), Some("Player"));
        let extends = tree.head().extends.as_ref().unwrap();
        assert_eq!(extends.path.as_deref(), Some("res://base.br"));
        assert_eq!(extends.chain[0].name, "Inner");
        assert!(matches!(expr.kind, ExprKind::Identifier(ref ident) if ident.name == "speed"));
    }

    #[test]
    fn statements_advance_lines() {
        let b = TreeBuilder::new("res://a.br");
        let first = b.pass_stmt();
        let second = b.pass_stmt();
        assert!(second.span.line > first.span.line);
    }
}
