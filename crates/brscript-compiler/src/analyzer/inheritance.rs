//! Stage 1: base type resolution.
//!
//! A class is marked `Resolving` before its `extends` clause is looked at.
//! Walking the base chain stops at a class in that state, so only the class
//! that entered a cycle first finds itself at the end of its own chain; it
//! reports the single cyclic-inheritance diagnostic and poisons every class
//! on the cycle.

use brscript_core::{ClassKey, DataType, Diagnostic, ResolutionError, Span};
use brscript_parser::ast::{ClassId, ExtendsClause, Member};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use super::{Analyzer, BaseState, UnitHandle};
use crate::analysis::InheritanceState;
use crate::unit::UnitStatus;

enum ChainCheck {
    Clear,
    /// The chain returned to the class being resolved.
    Cycle(Vec<ClassKey>),
    /// A class on the chain was poisoned earlier.
    Invalid(ClassKey),
}

impl Analyzer<'_> {
    pub(crate) fn resolve_class_inheritance(&mut self, id: ClassId) {
        if self.unit.inheritance_state(id) != InheritanceState::Unresolved {
            return;
        }
        let tree = self.tree.clone();
        let Some(node) = tree.class(id) else {
            return;
        };

        self.unit.update_class(id, |class| {
            class.inheritance = InheritanceState::Resolving;
            class.base = DataType::resolving();
        });
        trace!(path = %self.unit.path(), class = %node.fqcn, "resolving inheritance");

        let span = node.extends.as_ref().map(|clause| clause.span).unwrap_or(node.span);
        let base = match &node.extends {
            None => Ok(DataType::native(self.settings().default_base_class.clone())),
            Some(clause) => self.in_class(id, |analyzer| analyzer.resolve_extends(id, clause)),
        };
        let base = match base {
            Ok(base) => base,
            Err(err) => {
                let poisons = err.poisons_class();
                self.error(err);
                if poisons {
                    self.poison(id);
                } else {
                    self.unit.update_class(id, |class| {
                        class.inheritance = InheritanceState::Resolved;
                        class.base = DataType::variant();
                    });
                }
                return;
            }
        };

        if let Some(base_key) = base.class_key().cloned() {
            match self.check_chain(id, &base_key) {
                ChainCheck::Cycle(keys) => {
                    self.report_cycle(id, keys, span);
                    return;
                }
                ChainCheck::Invalid(invalid) => {
                    self.error(ResolutionError::InvalidClass {
                        class: invalid.name.to_string(),
                        span,
                    });
                }
                ChainCheck::Clear => {}
            }
        }

        let native_base = self.native_class_of(&base);
        self.unit.update_class(id, |class| {
            class.inheritance = InheritanceState::Resolved;
            class.base = base;
            class.native_base = native_base;
        });
    }

    fn poison(&mut self, id: ClassId) {
        self.unit.update_class(id, |class| {
            class.inheritance = InheritanceState::Invalid;
            class.base = DataType::variant();
        });
    }

    fn check_chain(&mut self, id: ClassId, base: &ClassKey) -> ChainCheck {
        let own = self.key_of(id);
        let mut keys = vec![own.clone()];
        let mut visited = FxHashSet::default();
        let mut current = base.clone();
        loop {
            keys.push(current.clone());
            if current == own {
                return ChainCheck::Cycle(keys);
            }
            if !visited.insert(current.clone()) {
                return ChainCheck::Clear;
            }
            match self.base_of(&current) {
                BaseState::Script(next) => current = next,
                BaseState::Invalid => return ChainCheck::Invalid(current),
                BaseState::Resolving | BaseState::Native(_) | BaseState::Unknown => {
                    return ChainCheck::Clear;
                }
            }
        }
    }

    fn report_cycle(&mut self, id: ClassId, keys: Vec<ClassKey>, span: Span) {
        let class = self.class_name(id);
        let chain: Vec<String> = keys.iter().map(|key| key.name.to_string()).collect();
        debug!(path = %self.unit.path(), class = %class, chain = ?chain, "cyclic inheritance");
        self.error(ResolutionError::CyclicInheritance {
            class: class.clone(),
            chain,
            span,
        });

        for key in &keys[..keys.len().saturating_sub(1)] {
            let member_id = ClassId(key.index);
            if *key.path == *self.unit.path() {
                self.poison(member_id);
                continue;
            }
            let Some(unit) = self.unit_of(&key.path) else {
                continue;
            };
            if unit.inheritance_state(member_id) == InheritanceState::Invalid {
                continue;
            }
            let span = unit
                .tree()
                .and_then(|tree| {
                    tree.class(member_id)
                        .and_then(|node| node.extends.as_ref().map(|clause| clause.span))
                })
                .unwrap_or_default();
            unit.poison_class(
                member_id,
                Diagnostic::from(ResolutionError::InvalidClass {
                    class: key.name.to_string(),
                    span,
                }),
            );
        }
    }

    // ========================================================================
    // Extends clauses
    // ========================================================================

    fn resolve_extends(&mut self, id: ClassId, clause: &ExtendsClause) -> Result<DataType, ResolutionError> {
        let class = self.class_name(id);
        let missing = || ResolutionError::MissingBase {
            class: class.clone(),
            base: clause.describe(),
            span: clause.span,
        };

        let (mut current, rest) = if let Some(path) = &clause.path {
            let resolved = self.resolve_path(path);
            let unit = self
                .load_unit(&resolved, UnitStatus::InheritanceSolved, clause.span)
                .map_err(|_| missing())?;
            (unit.head_key().ok_or_else(missing)?, &clause.chain[..])
        } else {
            let first = clause.chain.first().ok_or_else(missing)?;
            if self.registry().class_exists(&first.name) {
                if clause.chain.len() > 1 {
                    return Err(missing());
                }
                return Ok(DataType::native(first.name.clone()));
            }
            let key = match self.find_in_enclosing(id, &first.name) {
                Some(key) => key,
                None => {
                    let global = self.registry().global_class(&first.name).ok_or_else(missing)?;
                    let unit = self
                        .load_unit(&global.path, UnitStatus::InheritanceSolved, clause.span)
                        .map_err(|_| missing())?;
                    unit.head_key().ok_or_else(missing)?
                }
            };
            (key, &clause.chain[1..])
        };

        for ident in rest {
            current = self
                .nested_class_of(&current, &ident.name, ident.span)?
                .ok_or_else(missing)?;
        }
        Ok(DataType::class(current))
    }

    /// A class named `name` visible from `id`: nested classes of `id` and of
    /// its enclosing classes, or the head class by its global name.
    pub(crate) fn find_in_enclosing(&self, id: ClassId, name: &str) -> Option<ClassKey> {
        let mut current = Some(id);
        while let Some(class_id) = current {
            let node = self.tree.class(class_id)?;
            if let Some(Member::Class { id: nested, .. }) = node.member(name) {
                return Some(self.key_of(*nested));
            }
            current = node.outer;
        }
        let head = self.tree.head();
        (head.name() == Some(name)).then(|| self.key_of(ClassId::HEAD))
    }

    /// A nested class of `key` or of its script bases.
    pub(crate) fn nested_class_of(
        &mut self,
        key: &ClassKey,
        name: &str,
        span: Span,
    ) -> Result<Option<ClassKey>, ResolutionError> {
        if let Some(tree) = self.tree_of(key) {
            if let Some(nested) = tree.find_nested(ClassId(key.index), &[name]) {
                let unit: Option<UnitHandle<'_>> = self.unit_of(&key.path);
                return Ok(unit.and_then(|unit| unit.class_key(nested)));
            }
        }
        match self.base_of(key) {
            BaseState::Script(base) => self.nested_class_of(&base, name, span),
            BaseState::Resolving => Err(ResolutionError::CyclicReference {
                class: key.name.to_string(),
                span,
            }),
            _ => Ok(None),
        }
    }
}
