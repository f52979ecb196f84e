//! The bytecode compiler.
//!
//! Lowers a fully analyzed [`ScriptUnit`] into a [`CompiledScript`]. The
//! compiler trusts the analyzer: every expression it visits must have been
//! reduced, and a missing entry is an internal error rather than a user
//! diagnostic.
//!
//! ## Modules
//!
//! - [`function`]: per-function state, stack slots and emission helpers
//! - [`expr`]: expressions, calls and lambdas
//! - [`assign`]: assignments, including write-back of value-type chains
//! - [`stmt`]: statements and control flow
//! - [`pattern`]: `match` patterns

mod assign;
mod expr;
mod function;
mod pattern;
mod stmt;

use std::sync::Arc;

use brscript_core::{ClassKey, CompilationError, Span, Variant};
use brscript_parser::ast::{Accessors, ClassId, ClassNode, FunctionDecl, Member, VariableDecl};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::analysis::{BodyTables, ClassAnalysis, FunctionAnalysis, FunctionSignature, MemberKind};
use crate::analyzer::{inline_getter_name, inline_setter_name};
use crate::compiled::{CompiledBase, CompiledClass, CompiledFunction, CompiledScript, MemberSlot};
use crate::unit::{ScriptUnit, UnitProvider, UnitStatus};

pub(crate) use function::{FunctionCompiler, Operand};

/// Name of the function running member initializers.
pub const IMPLICIT_INITIALIZER: &str = "@implicit_new";
/// Name of the function running static variable initializers.
pub const STATIC_INITIALIZER: &str = "@static_initializer";

/// Storage layout of one script class.
#[derive(Debug, Clone, Default)]
pub(crate) struct ClassLayout {
    /// Instance slots used by the base scripts.
    pub base_count: u32,
    /// Own instance variables; indices continue after `base_count`.
    pub instance: FxHashMap<String, MemberSlot>,
    pub statics: FxHashMap<String, MemberSlot>,
}

impl ClassLayout {
    pub fn total(&self) -> u32 {
        self.base_count + self.instance.len() as u32
    }
}

/// Compiles one script unit.
pub struct Compiler<'a> {
    unit: &'a ScriptUnit,
    env: &'a dyn UnitProvider,
    tables: &'a BodyTables,
    layouts: FxHashMap<ClassKey, Arc<ClassLayout>>,
    /// State of the class being compiled.
    class_key: Option<ClassKey>,
    lambdas: Vec<Arc<CompiledFunction>>,
}

impl<'a> Compiler<'a> {
    /// Compile a unit that reached `FullySolved` without errors.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile(unit: &ScriptUnit, env: &dyn UnitProvider) -> Result<CompiledScript, CompilationError> {
        let invalid = || CompilationError::InvalidAnalysis {
            path: unit.path().to_string(),
        };
        if unit.status() != UnitStatus::FullySolved || unit.is_failed() {
            return Err(invalid());
        }
        let tree = unit.tree().ok_or_else(invalid)?;

        let classes = unit.with_tables(|tables| {
            let mut compiler = Compiler {
                unit,
                env,
                tables,
                layouts: FxHashMap::default(),
                class_key: None,
                lambdas: Vec::new(),
            };
            tree.classes
                .iter()
                .map(|node| compiler.compile_class(node))
                .collect::<Result<Vec<_>, _>>()
        })?;

        debug!(path = %unit.path(), classes = classes.len(), "script compiled");
        Ok(CompiledScript {
            path: unit.path().to_string(),
            source_hash: unit.source_hash(),
            classes,
            dependencies: unit.dependencies(),
        })
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub(crate) fn tables(&self) -> &'a BodyTables {
        self.tables
    }

    pub(crate) fn env(&self) -> &'a dyn UnitProvider {
        self.env
    }

    /// Key of the class being compiled.
    pub(crate) fn class_key(&self) -> Result<ClassKey, CompilationError> {
        self.class_key
            .clone()
            .ok_or_else(|| CompilationError::internal("no class is being compiled", Span::default()))
    }

    pub(crate) fn push_lambda(&mut self, function: CompiledFunction) -> u32 {
        self.lambdas.push(Arc::new(function));
        (self.lambdas.len() - 1) as u32
    }

    fn analysis_of(&self, key: &ClassKey) -> Result<ClassAnalysis, CompilationError> {
        let missing = || {
            CompilationError::internal(format!("class \"{}\" was not analyzed", key.fqcn), Span::default())
        };
        let id = ClassId(key.index);
        if &*key.path == self.unit.path() {
            return self.unit.class_analysis(id).ok_or_else(missing);
        }
        let unit = match self.unit.depended_unit(&key.path) {
            Some(unit) => unit,
            None => self
                .env
                .get_unit(&key.path, UnitStatus::InterfaceSolved)
                .map_err(|_| missing())?,
        };
        unit.class_analysis(id).ok_or_else(missing)
    }

    /// Storage layout of a script class, computed base first.
    pub(crate) fn layout(&mut self, key: &ClassKey) -> Result<Arc<ClassLayout>, CompilationError> {
        if let Some(layout) = self.layouts.get(key) {
            return Ok(layout.clone());
        }
        let analysis = self.analysis_of(key)?;
        let base_count = match analysis.base.class_key() {
            Some(base) => self.layout(base)?.total(),
            None => 0,
        };

        let mut members: Vec<_> = analysis
            .members
            .values()
            .filter(|member| matches!(member.kind, MemberKind::Variable { .. }))
            .collect();
        members.sort_by_key(|member| member.member_index);

        let mut layout = ClassLayout {
            base_count,
            ..Default::default()
        };
        for member in members {
            let MemberKind::Variable {
                is_static,
                getter,
                setter,
                exported,
            } = &member.kind
            else {
                continue;
            };
            let index = if *is_static {
                layout.statics.len() as u32
            } else {
                layout.total()
            };
            let slot = MemberSlot {
                name: member.name.clone(),
                index,
                data_type: member.data_type.clone(),
                getter: getter.clone(),
                setter: setter.clone(),
                exported: *exported,
                line: member.span.line,
            };
            if *is_static {
                layout.statics.insert(member.name.clone(), slot);
            } else {
                layout.instance.insert(member.name.clone(), slot);
            }
        }

        trace!(class = %key.fqcn, base_count, members = layout.instance.len(), "class layout");
        let layout = Arc::new(layout);
        self.layouts.insert(key.clone(), layout.clone());
        Ok(layout)
    }

    /// Slot of an instance variable declared by `owner` or its bases.
    pub(crate) fn instance_slot(&mut self, owner: &ClassKey, name: &str) -> Result<MemberSlot, CompilationError> {
        let layout = self.layout(owner)?;
        layout.instance.get(name).cloned().ok_or_else(|| {
            CompilationError::internal(
                format!("member \"{}\" has no slot in \"{}\"", name, owner.fqcn),
                Span::default(),
            )
        })
    }

    pub(crate) fn static_slot(&mut self, owner: &ClassKey, name: &str) -> Result<MemberSlot, CompilationError> {
        let layout = self.layout(owner)?;
        layout.statics.get(name).cloned().ok_or_else(|| {
            CompilationError::internal(
                format!("static variable \"{}\" has no slot in \"{}\"", name, owner.fqcn),
                Span::default(),
            )
        })
    }

    // ========================================================================
    // Classes
    // ========================================================================

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn compile_class(&mut self, node: &ClassNode) -> Result<CompiledClass, CompilationError> {
        let analysis = self.unit.class_analysis(node.id).ok_or_else(|| {
            CompilationError::internal(format!("class \"{}\" was not analyzed", node.fqcn), node.span)
        })?;
        let key = analysis.key.clone();
        self.class_key = Some(key.clone());
        self.lambdas = Vec::new();
        trace!(class = %node.fqcn, "compiling class");

        let layout = self.layout(&key)?;
        let native_base = analysis
            .native_base
            .clone()
            .unwrap_or_else(|| self.env.settings().default_base_class.clone());
        let base = match (analysis.base.class_key(), analysis.base.native_class()) {
            (Some(base), _) => CompiledBase::Script(base.clone()),
            (None, Some(native)) => CompiledBase::Native(native.to_string()),
            (None, None) => CompiledBase::Native(native_base.clone()),
        };

        let mut class = CompiledClass {
            key: key.clone(),
            global_name: if node.is_head() {
                node.name().map(str::to_string)
            } else {
                None
            },
            base,
            native_base,
            members: layout.instance.clone(),
            base_member_count: layout.base_count,
            static_variables: layout.statics.clone(),
            constants: FxHashMap::default(),
            inner_classes: FxHashMap::default(),
            signals: FxHashMap::default(),
            functions: FxHashMap::default(),
            lambdas: Vec::new(),
            implicit_initializer: None,
            static_initializer: None,
            capabilities: analysis.capabilities,
            member_lines: FxHashMap::default(),
            outer: node.outer.map(|id| id.0),
            icon_path: node.icon_path.clone(),
        };

        let accessors = accessor_owners(node);
        for member in &node.members {
            let Some(name) = member.name() else {
                continue;
            };
            class.member_lines.insert(name.to_string(), member.span().line);
            let info = analysis.members.get(name);
            match member {
                Member::Variable(decl) => {
                    if let Accessors::Inline { getter, setter } = &decl.accessors {
                        let owner = vec![decl.name.name.clone()];
                        if let Some(getter) = getter {
                            let function_name = inline_getter_name(name);
                            let compiled = self.compile_member_function(getter, &function_name, owner.clone())?;
                            class.functions.insert(function_name, Arc::new(compiled));
                        }
                        if let Some(setter) = setter {
                            let function_name = inline_setter_name(name);
                            let compiled = self.compile_member_function(setter, &function_name, owner)?;
                            class.functions.insert(function_name, Arc::new(compiled));
                        }
                    }
                }
                Member::Constant(_) | Member::Enum(_) | Member::EnumValue(_) => {
                    let value = info.and_then(|info| info.value.clone()).unwrap_or(Variant::Nil);
                    class.constants.insert(name.to_string(), value);
                }
                Member::Signal(_) => {
                    let signature = info
                        .and_then(|info| info.signature.clone())
                        .unwrap_or_else(|| FunctionSignature::new(name));
                    class.signals.insert(name.to_string(), signature.to_method_info());
                }
                Member::Function(decl) => {
                    let owner = accessors.get(name).cloned().unwrap_or_default();
                    let compiled = self.compile_member_function(decl, name, owner)?;
                    class.functions.insert(name.to_string(), Arc::new(compiled));
                }
                Member::Class { id, .. } => {
                    class.inner_classes.insert(name.to_string(), id.0);
                }
                Member::Group(_) => {}
            }
        }

        let (statics, instance): (Vec<&VariableDecl>, Vec<&VariableDecl>) =
            node.variables().partition(|decl| decl.is_static);
        class.implicit_initializer = self.compile_initializer(&instance, false, node.span.line)?.map(Arc::new);
        class.static_initializer = self.compile_initializer(&statics, true, node.span.line)?.map(Arc::new);
        class.lambdas = std::mem::take(&mut self.lambdas);
        Ok(class)
    }

    fn compile_member_function(
        &mut self,
        decl: &FunctionDecl,
        name: &str,
        accessor_of: Vec<String>,
    ) -> Result<CompiledFunction, CompilationError> {
        let tables = self.tables;
        let analysis: &FunctionAnalysis = tables.function(decl.id).ok_or_else(|| {
            CompilationError::internal(format!("function \"{}\" was not analyzed", name), decl.span)
        })?;
        let mut compiler = FunctionCompiler::new(self, name, decl.is_static, decl.span.line);
        compiler.set_accessor_of(accessor_of);
        compiler.compile_decl(decl, analysis)
    }

    fn compile_initializer(
        &mut self,
        members: &[&VariableDecl],
        is_static: bool,
        line: u32,
    ) -> Result<Option<CompiledFunction>, CompilationError> {
        if !members.iter().any(|decl| decl.initializer.is_some()) {
            return Ok(None);
        }
        let name = if is_static {
            STATIC_INITIALIZER
        } else {
            IMPLICIT_INITIALIZER
        };
        let compiler = FunctionCompiler::new(self, name, is_static, line);
        compiler.compile_initializer(members).map(Some)
    }
}

/// Members whose named accessor is each function, so that the accessor body
/// reaches the storage instead of calling itself.
fn accessor_owners(node: &ClassNode) -> FxHashMap<String, Vec<String>> {
    let mut owners: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for decl in node.variables() {
        if let Accessors::Named { getter, setter } = &decl.accessors {
            for function in [getter, setter].into_iter().flatten() {
                owners
                    .entry(function.name.clone())
                    .or_default()
                    .push(decl.name.name.clone());
            }
        }
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_total_counts_base_slots() {
        let mut layout = ClassLayout {
            base_count: 2,
            ..Default::default()
        };
        layout.instance.insert(
            "hp".to_string(),
            MemberSlot {
                name: "hp".to_string(),
                index: 2,
                data_type: brscript_core::DataType::variant(),
                getter: None,
                setter: None,
                exported: false,
                line: 1,
            },
        );
        assert_eq!(layout.total(), 3);
    }
}
