//! The semantic analyzer.
//!
//! Resolution runs in three stages per unit, driven by
//! [`ScriptUnit::raise_status`](crate::unit::ScriptUnit::raise_status):
//!
//! 1. [`inheritance`]: base type of every class, with cycle detection
//! 2. [`interface`]: member types, constants and signatures
//! 3. [`body`]: function bodies, initializers and accessors
//!
//! Every class-level step is memoized on the unit, so a request that
//! arrives from another file while a stage is still running resolves just
//! the class or member it needs and leaves the rest to the owning stage.
//!
//! Diagnostics go straight to the unit that owns the offending node; the
//! status ladder compares error counts before and after a stage to decide
//! whether it failed.

mod body;
mod call;
pub mod compat;
mod const_fold;
mod inheritance;
mod interface;
mod pattern;
mod reduce;
mod types;

use std::ops::Deref;
use std::sync::Arc;

use brscript_core::{
    ClassKey, DataType, Diagnostic, ResolutionError, ScriptSettings, Span, TypeKind, WarningCode,
    WarningLevel,
};
use brscript_parser::ast::{ClassId, ClassNode, NodeId, ScriptTree};
use brscript_registry::ClassRegistry;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::analysis::{BodyTables, ExprInfo, InheritanceState, MemberInfo};
use crate::scope::LocalScope;
use crate::unit::{ScriptUnit, UnitProvider, UnitStatus};

pub use interface::{inline_getter_name, inline_setter_name};
pub use compat::{
    Compatibility, RegistryHierarchy, ResolvingBase, ScriptParent, TypeHierarchy, is_type_compatible,
};

// ============================================================================
// Unit handles
// ============================================================================

/// The unit being analyzed or another unit reached through the provider.
pub(crate) enum UnitHandle<'a> {
    Current(&'a ScriptUnit),
    Other(Arc<ScriptUnit>),
}

impl Deref for UnitHandle<'_> {
    type Target = ScriptUnit;

    fn deref(&self) -> &ScriptUnit {
        match self {
            UnitHandle::Current(unit) => unit,
            UnitHandle::Other(unit) => unit,
        }
    }
}

/// What is known about the base of a class.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BaseState {
    Native(String),
    Script(ClassKey),
    /// The base is still being resolved further up the stack.
    Resolving,
    Invalid,
    Unknown,
}

// ============================================================================
// Contexts
// ============================================================================

/// The function (or lambda) whose body is being resolved.
#[derive(Debug, Default)]
pub(crate) struct FunctionContext {
    pub name: String,
    pub is_static: bool,
    pub return_type: DataType,
    pub has_await: bool,
    pub uses_self: bool,
    pub loop_depth: u32,
    /// Names declared in blocks that already closed, per open block depth.
    pub closed_names: Vec<FxHashSet<String>>,
}

/// Saved analyzer position while resolving something out of order.
struct SavedContext {
    class: ClassId,
    function: Option<FunctionContext>,
    scope: LocalScope,
    lambdas: Vec<NodeId>,
    statement: Option<Span>,
}

// ============================================================================
// Analyzer
// ============================================================================

pub(crate) struct Analyzer<'a> {
    pub(crate) unit: &'a ScriptUnit,
    pub(crate) tree: Arc<ScriptTree>,
    pub(crate) env: &'a dyn UnitProvider,
    /// Results recorded by this run, merged into the unit by `finish`.
    pub(crate) tables: BodyTables,
    pub(crate) class: ClassId,
    pub(crate) function: Option<FunctionContext>,
    pub(crate) scope: LocalScope,
    /// Lambdas being resolved, innermost last.
    pub(crate) lambdas: Vec<NodeId>,
    /// Lambdas that touched the instance.
    pub(crate) lambda_uses_self: FxHashSet<NodeId>,
    /// Span of the statement or member being resolved.
    pub(crate) statement: Option<Span>,
}

impl<'a> Analyzer<'a> {
    fn new(unit: &'a ScriptUnit, tree: Arc<ScriptTree>, env: &'a dyn UnitProvider) -> Self {
        Self {
            unit,
            tree,
            env,
            tables: BodyTables::default(),
            class: ClassId::HEAD,
            function: None,
            scope: LocalScope::new(),
            lambdas: Vec::new(),
            lambda_uses_self: FxHashSet::default(),
            statement: None,
        }
    }

    /// Run one stage over every class of the unit.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn run_stage(unit: &ScriptUnit, env: &dyn UnitProvider, stage: UnitStatus) {
        let Some(tree) = unit.tree() else {
            return;
        };
        let class_count = tree.classes.len() as u32;
        let mut analyzer = Analyzer::new(unit, tree, env);
        for index in 0..class_count {
            let id = ClassId(index);
            match stage {
                UnitStatus::InheritanceSolved => analyzer.resolve_class_inheritance(id),
                UnitStatus::InterfaceSolved => analyzer.resolve_class_interface(id),
                UnitStatus::FullySolved => analyzer.resolve_class_body(id),
                UnitStatus::Empty | UnitStatus::Parsed => {}
            }
        }
        analyzer.finish();
    }

    /// Run `f` with a fresh analyzer over another unit, e.g. to resolve a
    /// base class whose own stage is still pending further up the stack.
    pub(crate) fn nested<R>(
        unit: &ScriptUnit,
        env: &dyn UnitProvider,
        f: impl FnOnce(&mut Analyzer<'_>) -> R,
    ) -> Option<R> {
        let tree = unit.tree()?;
        trace!(path = %unit.path(), "resolving on demand");
        let mut analyzer = Analyzer::new(unit, tree, env);
        let result = f(&mut analyzer);
        analyzer.finish();
        Some(result)
    }

    fn finish(self) {
        self.unit.merge_tables(self.tables);
    }

    // ========================================================================
    // Environment
    // ========================================================================

    pub(crate) fn registry(&self) -> &'a dyn ClassRegistry {
        self.env.registry()
    }

    pub(crate) fn settings(&self) -> &'a ScriptSettings {
        self.env.settings()
    }

    pub(crate) fn class_node(&self, id: ClassId) -> Option<&ClassNode> {
        self.tree.class(id)
    }

    pub(crate) fn current_key(&self) -> ClassKey {
        self.key_of(self.class)
    }

    pub(crate) fn key_of(&self, id: ClassId) -> ClassKey {
        self.unit.class_key(id).unwrap_or_else(|| {
            let path = self.unit.path();
            ClassKey::new(path, path, path, id.0)
        })
    }

    /// Display name of a class of this unit.
    pub(crate) fn class_name(&self, id: ClassId) -> String {
        self.key_of(id).name.to_string()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub(crate) fn error(&mut self, error: impl Into<Diagnostic>) {
        self.unit.push_diagnostic(error.into());
    }

    pub(crate) fn warn(&mut self, code: WarningCode, message: impl Into<String>, span: Span) {
        let level = self.settings().warning_level(code);
        if level == WarningLevel::Ignore {
            return;
        }
        self.unit
            .push_diagnostic(Diagnostic::warning(code, level, message, span));
    }

    /// A type used before its resolution finished.
    pub(crate) fn cyclic_reference(&mut self, span: Span) {
        let class = self.class_name(self.class);
        self.error(ResolutionError::CyclicReference { class, span });
    }

    /// Record that the current statement defers a type check to runtime.
    pub(crate) fn mark_unsafe(&mut self) {
        if let Some(span) = self.statement {
            self.tables.unsafe_lines.extend(span.line_range());
        }
    }

    // ========================================================================
    // Units
    // ========================================================================

    /// Normalize a script path relative to this unit's directory.
    pub(crate) fn resolve_path(&self, path: &str) -> String {
        resolve_relative(self.unit.path(), path)
    }

    /// A unit without raising its status.
    pub(crate) fn unit_of(&self, path: &str) -> Option<UnitHandle<'a>> {
        if path == self.unit.path() {
            return Some(UnitHandle::Current(self.unit));
        }
        if let Some(unit) = self.unit.depended_unit(path) {
            return Some(UnitHandle::Other(unit));
        }
        self.env
            .get_unit(path, UnitStatus::Parsed)
            .ok()
            .map(UnitHandle::Other)
    }

    /// A unit raised to `status`, recorded as a dependency.
    pub(crate) fn load_unit(
        &self,
        path: &str,
        status: UnitStatus,
        span: Span,
    ) -> Result<UnitHandle<'a>, ResolutionError> {
        if path == self.unit.path() {
            return Ok(UnitHandle::Current(self.unit));
        }
        match self.env.get_unit(path, status) {
            Ok(unit) => {
                self.unit.add_dependency(unit.clone());
                Ok(UnitHandle::Other(unit))
            }
            Err(err) => {
                trace!(path, error = %err, "dependency failed");
                Err(ResolutionError::DependencyFailed {
                    path: path.to_string(),
                    span,
                })
            }
        }
    }

    // ========================================================================
    // Context switching
    // ========================================================================

    fn save_context(&mut self, class: ClassId) -> SavedContext {
        let saved = SavedContext {
            class: self.class,
            function: self.function.take(),
            scope: std::mem::take(&mut self.scope),
            lambdas: std::mem::take(&mut self.lambdas),
            statement: self.statement.take(),
        };
        self.class = class;
        saved
    }

    fn restore_context(&mut self, saved: SavedContext) {
        self.class = saved.class;
        self.function = saved.function;
        self.scope = saved.scope;
        self.lambdas = saved.lambdas;
        self.statement = saved.statement;
    }

    /// Run `f` at class level of `class`, outside any function.
    pub(crate) fn in_class<R>(&mut self, class: ClassId, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.save_context(class);
        let result = f(self);
        self.restore_context(saved);
        result
    }

    // ========================================================================
    // Class queries across units
    // ========================================================================

    /// Make sure the inheritance of `key` was attempted.
    pub(crate) fn ensure_inheritance(&mut self, key: &ClassKey) {
        let id = ClassId(key.index);
        if *key.path == *self.unit.path() {
            self.resolve_class_inheritance(id);
            return;
        }
        let Some(unit) = self.unit_of(&key.path) else {
            return;
        };
        if unit.inheritance_state(id) == InheritanceState::Unresolved {
            Analyzer::nested(&unit, self.env, |analyzer| analyzer.resolve_class_inheritance(id));
        }
    }

    /// Make sure the interface of `key` is resolved, or being resolved.
    pub(crate) fn ensure_interface(&mut self, key: &ClassKey, span: Span) -> Result<(), ResolutionError> {
        let id = ClassId(key.index);
        if *key.path == *self.unit.path() {
            self.resolve_class_interface(id);
            return Ok(());
        }
        let unit = self.load_unit(&key.path, UnitStatus::InterfaceSolved, span)?;
        if unit.with_class(id, |class| class.stage) == Some(crate::analysis::ClassStage::Inheritance) {
            Analyzer::nested(&unit, self.env, |analyzer| analyzer.resolve_class_interface(id));
        }
        Ok(())
    }

    pub(crate) fn base_of(&mut self, key: &ClassKey) -> BaseState {
        self.ensure_inheritance(key);
        let Some(unit) = self.unit_of(&key.path) else {
            return BaseState::Unknown;
        };
        unit.with_class(ClassId(key.index), |class| match class.inheritance {
            InheritanceState::Invalid => BaseState::Invalid,
            InheritanceState::Resolving | InheritanceState::Unresolved => BaseState::Resolving,
            InheritanceState::Resolved => match &class.base.kind {
                TypeKind::Native { class } => BaseState::Native(class.clone()),
                TypeKind::Class(base) => BaseState::Script(base.clone()),
                _ => BaseState::Unknown,
            },
        })
        .unwrap_or(BaseState::Unknown)
    }

    /// Native root of a script class chain.
    pub(crate) fn native_root(&mut self, key: &ClassKey) -> Option<String> {
        let cached = self
            .unit_of(&key.path)
            .and_then(|unit| unit.with_class(ClassId(key.index), |class| class.native_base.clone()))
            .flatten();
        if cached.is_some() {
            return cached;
        }
        let mut visited = FxHashSet::default();
        let mut current = key.clone();
        loop {
            if !visited.insert(current.clone()) {
                return None;
            }
            match self.base_of(&current) {
                BaseState::Native(native) => return Some(native),
                BaseState::Script(base) => current = base,
                _ => return None,
            }
        }
    }

    /// The native class backing values of a type.
    pub(crate) fn native_class_of(&mut self, data_type: &DataType) -> Option<String> {
        match &data_type.kind {
            TypeKind::Native { class } => Some(class.clone()),
            TypeKind::Class(key) => self.native_root(key),
            _ => None,
        }
    }

    /// Tree of the unit owning `key`.
    pub(crate) fn tree_of(&self, key: &ClassKey) -> Option<Arc<ScriptTree>> {
        if *key.path == *self.unit.path() {
            return Some(self.tree.clone());
        }
        self.unit_of(&key.path).and_then(|unit| unit.tree())
    }

    /// A member declared directly in `key`, resolving it on demand.
    pub(crate) fn class_member(&mut self, key: &ClassKey, name: &str) -> Option<MemberInfo> {
        let id = ClassId(key.index);
        let unit = self.unit_of(&key.path)?;
        if let Some(member) = unit.member(id, name) {
            return Some(member);
        }
        let tree = unit.tree()?;
        let index = *tree.class(id)?.member_indices.get(name)?;
        match unit {
            UnitHandle::Current(_) => self.resolve_member(id, index),
            UnitHandle::Other(other) => {
                Analyzer::nested(&other, self.env, |analyzer| analyzer.resolve_member(id, index))
                    .flatten()
            }
        }
    }

    /// Whether `key` declares a member named `name`, without resolving it.
    pub(crate) fn declares_member(&self, key: &ClassKey, name: &str) -> bool {
        self.tree_of(key)
            .and_then(|tree| tree.class(ClassId(key.index)).map(|class| class.has_member(name)))
            .unwrap_or(false)
    }

    /// A member of `key` or its script base chain, with the class declaring it.
    pub(crate) fn lookup_member(&mut self, key: &ClassKey, name: &str) -> Option<(ClassKey, MemberInfo)> {
        let mut visited = FxHashSet::default();
        let mut current = key.clone();
        loop {
            if !visited.insert(current.clone()) {
                return None;
            }
            if let Some(member) = self.class_member(&current, name) {
                return Some((current, member));
            }
            match self.base_of(&current) {
                BaseState::Script(base) => current = base,
                _ => return None,
            }
        }
    }

    /// Script classes of the chain starting at `key`, most derived first.
    pub(crate) fn script_chain(&mut self, key: &ClassKey) -> Vec<ClassKey> {
        let mut chain = vec![key.clone()];
        let mut current = key.clone();
        while let BaseState::Script(base) = self.base_of(&current) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base.clone());
            current = base;
        }
        chain
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// The recorded result for an expression, from this run or a previous one.
    pub(crate) fn reduced(&self, id: NodeId) -> Option<ExprInfo> {
        if let Some(info) = self.tables.exprs.get(&id) {
            return Some(info.clone());
        }
        self.unit.with_tables(|tables| tables.exprs.get(&id).cloned())
    }

    pub(crate) fn record(&mut self, id: NodeId, info: ExprInfo) -> ExprInfo {
        self.tables.exprs.insert(id, info.clone());
        info
    }

    /// Note that the instance is touched by the current function and every
    /// enclosing lambda.
    pub(crate) fn mark_uses_self(&mut self) {
        if let Some(function) = self.function.as_mut() {
            function.uses_self = true;
        }
        for lambda in &self.lambdas {
            self.lambda_uses_self.insert(*lambda);
        }
    }
}

/// Join `path` onto the directory of `from` unless it is absolute, and fold
/// `.` and `..` segments.
pub fn resolve_relative(from: &str, path: &str) -> String {
    let (scheme, rest) = match path.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest.to_string()),
        None if path.starts_with('/') => (None, path.to_string()),
        None => {
            let (base_scheme, base_rest) = match from.split_once("://") {
                Some((scheme, rest)) => (Some(scheme), rest),
                None => (None, from),
            };
            let dir = base_rest.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            let joined = if dir.is_empty() {
                path.to_string()
            } else {
                format!("{}/{}", dir, path)
            };
            return normalize(base_scheme, &joined);
        }
    };
    normalize(scheme, &rest)
}

fn normalize(scheme: Option<&str>, path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let body = parts.join("/");
    match scheme {
        Some(scheme) => format!("{}://{}", scheme, body),
        None if absolute => format!("/{}", body),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths() {
        assert_eq!(resolve_relative("res://a/b.br", "c.br"), "res://a/c.br");
        assert_eq!(resolve_relative("res://a/b.br", "../c.br"), "res://c.br");
        assert_eq!(resolve_relative("res://a/b.br", "./d/e.br"), "res://a/d/e.br");
        assert_eq!(resolve_relative("res://a/b.br", "res://x.br"), "res://x.br");
        assert_eq!(resolve_relative("res://b.br", "c.br"), "res://c.br");
        assert_eq!(resolve_relative("/tmp/a.br", "b.br"), "/tmp/b.br");
    }
}
