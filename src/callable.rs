//! Callables created by scripts.
//!
//! Lambdas never hold their compiled function directly. Each script class
//! owns a [`LambdaTable`]; a [`LambdaCallable`] holds the table and an id.
//! When a reload replaces the class, the old table is retargeted at the new
//! functions, so closures created before the reload keep working when the
//! lambda they point at still has the same shape, and fail cleanly when it
//! does not.

use std::sync::{Arc, Weak};

use brscript_compiler::CompiledFunction;
use brscript_core::{CallError, CustomCallable, Variant};
use parking_lot::RwLock;

use crate::{Script, ScriptInstance};

// ============================================================================
// Lambda table
// ============================================================================

/// Indirection from lambda ids to the current compiled function.
#[derive(Debug, Default)]
pub struct LambdaTable {
    functions: RwLock<Vec<Option<Arc<CompiledFunction>>>>,
}

impl LambdaTable {
    pub fn new(functions: &[Arc<CompiledFunction>]) -> Self {
        Self {
            functions: RwLock::new(functions.iter().cloned().map(Some).collect()),
        }
    }

    /// The current function of `id`; `None` once a reload dropped it.
    pub fn get(&self, id: u32) -> Option<Arc<CompiledFunction>> {
        self.functions.read().get(id as usize).cloned().flatten()
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    /// Point every id at the lambda with the same id in `replacement`, or at
    /// nothing when the capture count or arity changed. Returns how many
    /// ids survived.
    pub fn retarget(&self, replacement: &[Arc<CompiledFunction>]) -> usize {
        let mut functions = self.functions.write();
        let mut kept = 0;
        for (id, slot) in functions.iter_mut().enumerate() {
            let next = match (slot.as_ref(), replacement.get(id)) {
                (Some(old), Some(new)) if same_shape(old, new) => Some(new.clone()),
                _ => None,
            };
            kept += next.is_some() as usize;
            *slot = next;
        }
        kept
    }
}

fn same_shape(old: &CompiledFunction, new: &CompiledFunction) -> bool {
    old.capture_count == new.capture_count
        && old.argument_count == new.argument_count
        && old.uses_self == new.uses_self
}

// ============================================================================
// Lambda callables
// ============================================================================

/// A closure: a lambda id plus the values it captured.
pub struct LambdaCallable {
    table: Arc<LambdaTable>,
    id: u32,
    name: String,
    script: Weak<Script>,
    captures: Vec<Variant>,
    /// Bound instance of lambdas that use `self`.
    instance: Option<Weak<ScriptInstance>>,
}

impl LambdaCallable {
    pub(crate) fn new(
        table: Arc<LambdaTable>,
        id: u32,
        script: &Arc<Script>,
        captures: Vec<Variant>,
        instance: Option<&Arc<ScriptInstance>>,
    ) -> Self {
        let name = table
            .get(id)
            .map(|function| function.name.clone())
            .unwrap_or_default();
        Self {
            table,
            id,
            name,
            script: Arc::downgrade(script),
            captures,
            instance: instance.map(Arc::downgrade),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl CustomCallable for LambdaCallable {
    fn call(&self, args: &[Variant]) -> Result<Variant, CallError> {
        let function = self.table.get(self.id).ok_or_else(|| CallError::Execution {
            method: self.name.clone(),
            message: "the lambda was removed by a reload".to_string(),
        })?;
        let script = self.script.upgrade().ok_or(CallError::InstanceIsNull)?;
        let instance = match &self.instance {
            Some(instance) => Some(instance.upgrade().ok_or(CallError::InstanceIsNull)?),
            None => None,
        };

        let mut arguments = Vec::with_capacity(self.captures.len() + args.len());
        arguments.extend_from_slice(&self.captures);
        arguments.extend_from_slice(args);
        script.execute(&function, instance.as_ref(), &arguments)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_valid(&self) -> bool {
        let bound = self
            .instance
            .as_ref()
            .is_none_or(|instance| instance.strong_count() > 0);
        bound && self.script.strong_count() > 0 && self.table.get(self.id).is_some()
    }
}

// ============================================================================
// Bound methods
// ============================================================================

/// A script method bound to an instance.
pub struct MethodCallable {
    instance: Weak<ScriptInstance>,
    method: String,
}

impl MethodCallable {
    pub fn new(instance: &Arc<ScriptInstance>, method: impl Into<String>) -> Self {
        Self {
            instance: Arc::downgrade(instance),
            method: method.into(),
        }
    }
}

impl CustomCallable for MethodCallable {
    fn call(&self, args: &[Variant]) -> Result<Variant, CallError> {
        let instance = self.instance.upgrade().ok_or(CallError::InstanceIsNull)?;
        instance.call(&self.method, args)
    }

    fn name(&self) -> String {
        self.method.clone()
    }

    fn is_valid(&self) -> bool {
        self.instance
            .upgrade()
            .is_some_and(|instance| instance.has_method(&self.method))
    }
}

/// A static function of a script class.
pub struct StaticCallable {
    script: Weak<Script>,
    method: String,
}

impl StaticCallable {
    pub fn new(script: &Arc<Script>, method: impl Into<String>) -> Self {
        Self {
            script: Arc::downgrade(script),
            method: method.into(),
        }
    }
}

impl CustomCallable for StaticCallable {
    fn call(&self, args: &[Variant]) -> Result<Variant, CallError> {
        let script = self.script.upgrade().ok_or(CallError::InstanceIsNull)?;
        script.call_static(&self.method, args)
    }

    fn name(&self) -> String {
        self.method.clone()
    }

    fn is_valid(&self) -> bool {
        self.script
            .upgrade()
            .is_some_and(|script| script.has_method(&self.method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lambda(captures: usize, arguments: usize) -> Arc<CompiledFunction> {
        Arc::new(CompiledFunction {
            name: "<anonymous lambda>".to_string(),
            capture_count: captures,
            argument_count: arguments,
            ..Default::default()
        })
    }

    #[test]
    fn retarget_keeps_matching_shapes() {
        let table = LambdaTable::new(&[lambda(1, 0), lambda(0, 2), lambda(0, 0)]);
        let kept = table.retarget(&[lambda(1, 0), lambda(0, 1)]);
        assert_eq!(kept, 1);
        assert!(table.get(0).is_some());
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_none());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn dropped_ids_stay_dropped() {
        let table = LambdaTable::new(&[lambda(0, 0)]);
        table.retarget(&[]);
        assert_eq!(table.retarget(&[lambda(0, 0)]), 0);
        assert!(table.get(0).is_none());
    }
}
