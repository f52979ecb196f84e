//! The parse/analysis unit of one script file and its status ladder.
//!
//! A [`ScriptUnit`] owns the parsed [`ScriptTree`] of a file and everything
//! the analyzer learned about it. Its status only moves up:
//!
//! ```text
//! Empty -> Parsed -> InheritanceSolved -> InterfaceSolved -> FullySolved
//! ```
//!
//! [`ScriptUnit::raise_status`] bumps the status *before* running a stage,
//! so a re-entrant request for the same unit (a base script resolving its own
//! references back into this file) returns immediately instead of recursing.
//! Cycles are then broken at the class level by the inheritance sentinel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brscript_core::{
    CacheError, ClassKey, Diagnostic, ScriptSettings, WarningCode,
};
use brscript_parser::ast::{ClassId, ScriptTree};
use brscript_parser::{ParseOutput, ScriptParser};
use brscript_registry::ClassRegistry;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};
use xxhash_rust::xxh64::xxh64;

use crate::analysis::{BodyTables, ClassAnalysis, InheritanceState, MemberInfo};
use crate::analyzer::Analyzer;

// ============================================================================
// Status
// ============================================================================

/// How far a unit has progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitStatus {
    Empty,
    Parsed,
    InheritanceSolved,
    InterfaceSolved,
    FullySolved,
}

impl UnitStatus {
    pub fn next(self) -> Option<UnitStatus> {
        match self {
            UnitStatus::Empty => Some(UnitStatus::Parsed),
            UnitStatus::Parsed => Some(UnitStatus::InheritanceSolved),
            UnitStatus::InheritanceSolved => Some(UnitStatus::InterfaceSolved),
            UnitStatus::InterfaceSolved => Some(UnitStatus::FullySolved),
            UnitStatus::FullySolved => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Empty => "EMPTY",
            UnitStatus::Parsed => "PARSED",
            UnitStatus::InheritanceSolved => "INHERITANCE_SOLVED",
            UnitStatus::InterfaceSolved => "INTERFACE_SOLVED",
            UnitStatus::FullySolved => "FULLY_SOLVED",
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Provider
// ============================================================================

/// What the analyzer needs from its surroundings: other units by path, the
/// host registry and the settings.
///
/// The script cache implements this; tests can substitute their own.
pub trait UnitProvider: Send + Sync {
    /// Get the unit for `path`, raised to at least `status`.
    fn get_unit(&self, path: &str, status: UnitStatus) -> Result<Arc<ScriptUnit>, CacheError>;

    fn registry(&self) -> &dyn ClassRegistry;

    fn settings(&self) -> &ScriptSettings;
}

// ============================================================================
// Unit
// ============================================================================

#[derive(Debug, Default)]
struct UnitState {
    status: Option<UnitStatus>,
    tree: Option<Arc<ScriptTree>>,
    source_hash: u64,
    dependencies: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    /// Stage whose run recorded errors.
    failed_at: Option<UnitStatus>,
}

/// Parse and analysis state of one script file.
pub struct ScriptUnit {
    path: String,
    state: RwLock<UnitState>,
    classes: RwLock<Vec<ClassAnalysis>>,
    tables: RwLock<BodyTables>,
    /// Units this one referenced, kept alive until compilation finishes.
    depended: Mutex<FxHashMap<String, Arc<ScriptUnit>>>,
    /// Members whose interface is being resolved, for constant cycles.
    resolving: Mutex<FxHashSet<(ClassId, String)>>,
    abandoned: AtomicBool,
}

impl std::fmt::Debug for ScriptUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("path", &self.path)
            .field("status", &self.status())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

impl ScriptUnit {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(UnitState::default()),
            classes: RwLock::new(Vec::new()),
            tables: RwLock::new(BodyTables::default()),
            depended: Mutex::new(FxHashMap::default()),
            resolving: Mutex::new(FxHashSet::default()),
            abandoned: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status(&self) -> UnitStatus {
        self.state.read().status.unwrap_or(UnitStatus::Empty)
    }

    pub fn tree(&self) -> Option<Arc<ScriptTree>> {
        self.state.read().tree.clone()
    }

    /// xxh64 of the bytes the unit was parsed from.
    pub fn source_hash(&self) -> u64 {
        self.state.read().source_hash
    }

    pub fn hash_source(bytes: &[u8]) -> u64 {
        xxh64(bytes, 0)
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    /// Parse source text and move to `Parsed`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn parse_source(&self, parser: &dyn ScriptParser, source: &str) -> Result<(), CacheError> {
        let output = parser.parse(&self.path, source);
        self.install_parse(output, Self::hash_source(source.as_bytes()))
    }

    /// Parse a pre-tokenized buffer and move to `Parsed`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn parse_binary(&self, parser: &dyn ScriptParser, bytes: &[u8]) -> Result<(), CacheError> {
        let output = parser.parse_binary(&self.path, bytes);
        self.install_parse(output, Self::hash_source(bytes))
    }

    fn install_parse(&self, output: ParseOutput, hash: u64) -> Result<(), CacheError> {
        let failed = output.has_errors();
        let mut state = self.state.write();
        state.source_hash = hash;
        state.diagnostics = output.diagnostics;
        state.dependencies = output.dependencies;
        if failed {
            state.failed_at = Some(UnitStatus::Parsed);
            state.status = Some(UnitStatus::Parsed);
            return Err(CacheError::ParseFailed {
                path: self.path.clone(),
                diagnostics: state.diagnostics.clone(),
            });
        }
        let Some(tree) = output.tree else {
            return Err(CacheError::InvalidScript {
                path: self.path.clone(),
            });
        };

        let mut classes = Vec::with_capacity(tree.classes.len());
        for class in &tree.classes {
            let name = if class.is_head() {
                class.name().unwrap_or(&self.path).to_string()
            } else {
                class.name().unwrap_or_default().to_string()
            };
            classes.push(ClassAnalysis::new(ClassKey::new(
                &self.path,
                &class.fqcn,
                &name,
                class.id.0,
            )));
        }
        *self.classes.write() = classes;
        *self.tables.write() = BodyTables::default();
        state.tree = Some(Arc::new(tree));
        state.failed_at = None;
        state.status = Some(UnitStatus::Parsed);
        debug!(path = %self.path, from = "EMPTY", to = "PARSED", "unit status changed");
        Ok(())
    }

    // ========================================================================
    // Status ladder
    // ========================================================================

    /// Advance to at least `target`, running each missing stage once.
    ///
    /// Re-entrant calls for a stage that is already running return at once.
    /// A stage that recorded errors fails this call and every later call
    /// asking for that stage or above.
    #[tracing::instrument(level = "trace", skip(self, env), fields(path = %self.path))]
    pub fn raise_status(&self, target: UnitStatus, env: &dyn UnitProvider) -> Result<(), CacheError> {
        loop {
            let (current, failed_at) = {
                let state = self.state.read();
                (state.status.unwrap_or(UnitStatus::Empty), state.failed_at)
            };
            if let Some(failed) = failed_at {
                if target >= failed {
                    return Err(self.failure(failed));
                }
            }
            if current >= target {
                trace!(path = %self.path, status = %current, "unit already at requested status");
                return Ok(());
            }
            if current == UnitStatus::Empty {
                return Err(CacheError::InvalidScript {
                    path: self.path.clone(),
                });
            }
            let Some(next) = current.next() else {
                return Ok(());
            };

            self.state.write().status = Some(next);
            debug!(path = %self.path, from = %current, to = %next, "unit status changed");

            let errors_before = self.error_count();
            Analyzer::run_stage(self, env, next);
            if self.error_count() > errors_before {
                self.state.write().failed_at = Some(next);
                return Err(self.failure(next));
            }
        }
    }

    /// `raise_status(InheritanceSolved)`
    pub fn resolve_inheritance(&self, env: &dyn UnitProvider) -> Result<(), CacheError> {
        self.raise_status(UnitStatus::InheritanceSolved, env)
    }

    /// `raise_status(InterfaceSolved)`
    pub fn resolve_interface(&self, env: &dyn UnitProvider) -> Result<(), CacheError> {
        self.raise_status(UnitStatus::InterfaceSolved, env)
    }

    /// `raise_status(FullySolved)`
    pub fn resolve_body(&self, env: &dyn UnitProvider) -> Result<(), CacheError> {
        self.raise_status(UnitStatus::FullySolved, env)
    }

    fn failure(&self, stage: UnitStatus) -> CacheError {
        let diagnostics = self.errors();
        if stage == UnitStatus::Parsed {
            CacheError::ParseFailed {
                path: self.path.clone(),
                diagnostics,
            }
        } else {
            CacheError::AnalysisFailed {
                path: self.path.clone(),
                diagnostics,
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state.read().failed_at.is_some()
    }

    /// Poison a class from outside this unit's own stage run, e.g. when a
    /// cycle is detected by a class in another file. The unit fails at its
    /// current status.
    pub(crate) fn poison_class(&self, id: ClassId, diagnostic: Diagnostic) {
        self.update_class(id, |class| class.inheritance = InheritanceState::Invalid);
        let mut state = self.state.write();
        state.diagnostics.push(diagnostic);
        if state.failed_at.is_none() {
            state.failed_at = Some(state.status.unwrap_or(UnitStatus::Parsed).max(UnitStatus::InheritanceSolved));
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn push_diagnostic(&self, diagnostic: Diagnostic) {
        self.state.write().diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.state.read().diagnostics.clone()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.state
            .read()
            .diagnostics
            .iter()
            .filter(|d| d.is_error())
            .cloned()
            .collect()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.state
            .read()
            .diagnostics
            .iter()
            .filter(|d| !d.is_error())
            .cloned()
            .collect()
    }

    /// Warnings with the given code.
    pub fn warnings_with(&self, code: WarningCode) -> Vec<Diagnostic> {
        self.warnings()
            .into_iter()
            .filter(|d| d.warning_code() == Some(code))
            .collect()
    }

    pub(crate) fn error_count(&self) -> usize {
        self.state
            .read()
            .diagnostics
            .iter()
            .filter(|d| d.is_error())
            .count()
    }

    /// Sorted, de-duplicated lines containing unsafe operations.
    pub fn unsafe_lines(&self) -> Vec<u32> {
        self.tables.read().unsafe_lines.iter().copied().collect()
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Paths this unit depends on: preloads from the parser and scripts
    /// referenced during analysis.
    pub fn dependencies(&self) -> Vec<String> {
        self.state.read().dependencies.clone()
    }

    /// Keep `unit` alive while this unit is being compiled.
    pub fn add_dependency(&self, unit: Arc<ScriptUnit>) {
        let path = unit.path().to_string();
        if path == self.path {
            return;
        }
        {
            let mut state = self.state.write();
            if !state.dependencies.contains(&path) {
                state.dependencies.push(path.clone());
            }
        }
        self.depended.lock().insert(path, unit);
    }

    /// Drop the strong references to dependency units.
    pub fn release_dependencies(&self) {
        self.depended.lock().clear();
    }

    pub fn depended_unit(&self, path: &str) -> Option<Arc<ScriptUnit>> {
        self.depended.lock().get(path).cloned()
    }

    // ========================================================================
    // Abandonment
    // ========================================================================

    /// Mark the unit as no longer reachable from the cache. Holders may keep
    /// using it; it is dropped with the last reference.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    // ========================================================================
    // Class analysis access
    // ========================================================================

    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }

    /// Run `f` on a class's analysis under a read lock.
    ///
    /// `f` must not call back into the pipeline.
    pub fn with_class<R>(&self, id: ClassId, f: impl FnOnce(&ClassAnalysis) -> R) -> Option<R> {
        self.classes.read().get(id.index()).map(f)
    }

    pub fn update_class(&self, id: ClassId, f: impl FnOnce(&mut ClassAnalysis)) {
        if let Some(class) = self.classes.write().get_mut(id.index()) {
            f(class);
        }
    }

    pub fn class_analysis(&self, id: ClassId) -> Option<ClassAnalysis> {
        self.with_class(id, Clone::clone)
    }

    pub fn class_key(&self, id: ClassId) -> Option<ClassKey> {
        self.with_class(id, |class| class.key.clone())
    }

    pub fn head_key(&self) -> Option<ClassKey> {
        self.class_key(ClassId::HEAD)
    }

    pub fn inheritance_state(&self, id: ClassId) -> InheritanceState {
        self.with_class(id, |class| class.inheritance.clone())
            .unwrap_or(InheritanceState::Invalid)
    }

    /// Mark a member as being resolved. Returns false when it already is,
    /// which means its definition refers back to itself.
    pub(crate) fn begin_member(&self, id: ClassId, name: &str) -> bool {
        self.resolving.lock().insert((id, name.to_string()))
    }

    pub(crate) fn end_member(&self, id: ClassId, name: &str) {
        self.resolving.lock().remove(&(id, name.to_string()));
    }

    pub fn member(&self, id: ClassId, name: &str) -> Option<MemberInfo> {
        self.with_class(id, |class| class.members.get(name).cloned())
            .flatten()
    }

    // ========================================================================
    // Body tables
    // ========================================================================

    pub fn with_tables<R>(&self, f: impl FnOnce(&BodyTables) -> R) -> R {
        f(&self.tables.read())
    }

    pub(crate) fn merge_tables(&self, tables: BodyTables) {
        let mut stored = self.tables.write();
        stored.exprs.extend(tables.exprs);
        stored.decls.extend(tables.decls);
        stored.functions.extend(tables.functions);
        stored.type_tests.extend(tables.type_tests);
        stored.unsafe_lines.extend(tables.unsafe_lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ladder_is_ordered() {
        assert!(UnitStatus::Empty < UnitStatus::Parsed);
        assert!(UnitStatus::InterfaceSolved < UnitStatus::FullySolved);
        assert_eq!(UnitStatus::Parsed.next(), Some(UnitStatus::InheritanceSolved));
        assert_eq!(UnitStatus::FullySolved.next(), None);
        assert_eq!(UnitStatus::InheritanceSolved.to_string(), "INHERITANCE_SOLVED");
    }

    #[test]
    fn source_hash_is_stable() {
        assert_eq!(
            ScriptUnit::hash_source(b"extends Node"),
            ScriptUnit::hash_source(b"extends Node")
        );
        assert_ne!(
            ScriptUnit::hash_source(b"extends Node"),
            ScriptUnit::hash_source(b"extends Object")
        );
    }

    #[test]
    fn new_unit_is_empty() {
        let unit = ScriptUnit::new("res://a.br");
        assert_eq!(unit.status(), UnitStatus::Empty);
        assert!(unit.tree().is_none());
        unit.abandon();
        assert!(unit.is_abandoned());
    }
}
