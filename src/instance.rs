//! Script instances attached to host objects.
//!
//! A [`ScriptInstance`] is the per-object state of a script: one storage
//! slot per instance variable of the whole chain. The host object holds
//! the instance; the instance only holds the host object weakly.
//!
//! Name lookups walk the chain in a fixed order:
//!
//! 1. instance variables (through a getter or setter when declared),
//! 2. static variables,
//! 3. constants and nested classes,
//! 4. methods (bound callables) and signals,
//! 5. the `_get`/`_set` overrides,
//! 6. the native object.

use std::sync::{Arc, Weak};

use brscript_core::{
    AttachedInstance, CallError, Callable, ClassCapabilities, DataType, HostObject, MethodInfo, ObjectId, ObjectRef,
    PropertyInfo, SignalRef, Variant, VariantType,
};
use brscript_registry::ClassRegistry;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::callable::MethodCallable;
use crate::value::{conform, slot_default};
use crate::Script;

/// Construction state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Created,
    /// Implicit initializers ran for every class of the chain.
    ImplicitConstructed,
    /// `_init` returned.
    UserConstructed,
    Live,
    /// Detached from its owner; every lookup fails.
    Cleared,
}

pub struct ScriptInstance {
    this: Weak<ScriptInstance>,
    script: Arc<Script>,
    owner: Weak<dyn HostObject>,
    owner_id: ObjectId,
    members: RwLock<Vec<Variant>>,
    state: Mutex<InstanceState>,
}

impl std::fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("script", &self.script.fqcn())
            .field("owner", &self.owner_id)
            .field("state", &self.state())
            .finish()
    }
}

impl ScriptInstance {
    /// Attach a new instance of `script` to `owner` and construct it.
    ///
    /// Implicit initializers run base first, then the most derived `_init`
    /// receives `args`. Any failure detaches the instance again.
    #[tracing::instrument(level = "debug", skip_all, fields(script = %script.fqcn()))]
    pub fn create(script: &Arc<Script>, owner: &ObjectRef, args: &[Variant]) -> Result<Arc<Self>, CallError> {
        let class = script
            .class()
            .filter(|_| script.is_valid())
            .ok_or_else(|| CallError::Execution {
                method: "instance_create".to_string(),
                message: format!("script \"{}\" is not valid", script.fqcn()),
            })?;
        let registry = script.context().registry();
        if !registry.is_parent_class(owner.class_name(), &class.native_base) {
            return Err(CallError::InvalidArgument {
                method: "instance_create".to_string(),
                index: 0,
                expected: class.native_base.clone(),
            });
        }

        let instance = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            script: script.clone(),
            owner: Arc::downgrade(owner.object()),
            owner_id: owner.id(),
            members: RwLock::new(Self::default_members(script)),
            state: Mutex::new(InstanceState::Created),
        });
        owner.set_script_instance(Some(instance.clone() as AttachedInstance));
        script.register_instance(owner.id(), &instance);

        if let Err(err) = instance.construct(args) {
            debug!(owner = %owner.id(), error = %err, "construction failed, detaching");
            instance.clear();
            owner.set_script_instance(None);
            script.unregister_instance(owner.id());
            return Err(err);
        }
        Ok(instance)
    }

    fn default_members(script: &Script) -> Vec<Variant> {
        let count = script.class().map_or(0, |class| class.member_count()) as usize;
        let mut members = vec![Variant::Nil; count];
        for level in script.chain() {
            let Some(class) = level.class() else {
                continue;
            };
            for slot in class.members.values() {
                if let Some(member) = members.get_mut(slot.index as usize) {
                    *member = slot_default(&slot.data_type);
                }
            }
        }
        members
    }

    fn construct(self: &Arc<Self>, args: &[Variant]) -> Result<(), CallError> {
        self.run_implicit_initializers()?;
        self.set_state(InstanceState::ImplicitConstructed);

        match self.script.find_function("_init") {
            Some((level, init)) => {
                level.invoke(&init, Some(self), args)?;
                self.set_state(InstanceState::UserConstructed);
            }
            None if !args.is_empty() => {
                return Err(CallError::TooManyArguments {
                    method: "_init".to_string(),
                    expected: 0,
                    found: args.len(),
                });
            }
            None => {}
        }
        self.set_state(InstanceState::Live);
        Ok(())
    }

    fn run_implicit_initializers(self: &Arc<Self>) -> Result<(), CallError> {
        for level in self.script.chain().into_iter().rev() {
            let Some(initializer) = level.class().and_then(|class| class.implicit_initializer.clone()) else {
                continue;
            };
            level.execute(&initializer, Some(self), &[])?;
        }
        Ok(())
    }

    /// The instance attached to `object`, if it is a script instance.
    pub fn of(object: &dyn HostObject) -> Option<Arc<ScriptInstance>> {
        object.script_instance()?.downcast::<ScriptInstance>().ok()
    }

    pub fn state(&self) -> InstanceState {
        *self.state.lock()
    }

    fn set_state(&self, state: InstanceState) {
        *self.state.lock() = state;
    }

    fn handle(&self) -> Result<Arc<ScriptInstance>, CallError> {
        if self.state() == InstanceState::Cleared {
            return Err(CallError::InstanceIsNull);
        }
        self.this.upgrade().ok_or(CallError::InstanceIsNull)
    }

    pub fn get_script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn get_owner(&self) -> Option<ObjectRef> {
        self.owner.upgrade().map(ObjectRef::new)
    }

    pub fn owner_id(&self) -> ObjectId {
        self.owner_id
    }

    /// Drop member values and stop answering lookups.
    pub fn clear(&self) {
        self.members.write().clear();
        self.set_state(InstanceState::Cleared);
    }

    // ========================================================================
    // Raw slots, used by the executor
    // ========================================================================

    pub fn member(&self, index: u32) -> Option<Variant> {
        self.members.read().get(index as usize).cloned()
    }

    /// Store into slot `index` without running a setter.
    pub fn set_member(&self, index: u32, value: Variant) -> bool {
        match self.members.write().get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Get / set / call
    // ========================================================================

    pub fn get(&self, name: &str) -> Option<Variant> {
        let instance = self.handle().ok()?;
        let chain = self.script.chain();

        for level in &chain {
            let Some(class) = level.class() else {
                continue;
            };
            if let Some(slot) = class.members.get(name) {
                return match &slot.getter {
                    Some(getter) => instance.call(getter, &[]).ok(),
                    None => self.member(slot.index),
                };
            }
        }

        if let Some(value) = self.script.lookup_static(name) {
            return Some(value);
        }

        for level in &chain {
            let Some(class) = level.class() else {
                continue;
            };
            if class.functions.contains_key(name) {
                let callable = MethodCallable::new(&instance, name);
                return Some(Variant::Callable(Callable::Custom(Arc::new(callable))));
            }
            if class.signals.contains_key(name) {
                let owner = self.get_owner()?;
                return Some(Variant::Signal(SignalRef {
                    object: owner,
                    name: name.to_string(),
                }));
            }
        }

        if self.has_capability(ClassCapabilities::HAS_GET) {
            if let Ok(value) = instance.call("_get", &[Variant::StringName(name.to_string())]) {
                if !value.is_nil() {
                    return Some(value);
                }
            }
        }

        self.owner.upgrade()?.get(name)
    }

    pub fn set(&self, name: &str, value: Variant) -> bool {
        let Ok(instance) = self.handle() else {
            return false;
        };

        for level in self.script.chain() {
            let Some(class) = level.class() else {
                continue;
            };
            if let Some(slot) = class.members.get(name) {
                if let Some(setter) = &slot.setter {
                    return instance.call(setter, &[value]).is_ok();
                }
                return match conform(value, &slot.data_type, self.script.context().registry()) {
                    Some(value) => self.set_member(slot.index, value),
                    None => {
                        trace!(member = name, expected = %slot.data_type, "value does not fit member");
                        false
                    }
                };
            }
        }

        if let Some(stored) = self.script.set_static(name, value.clone()) {
            return stored;
        }
        if self.script.has_constant(name) {
            return false;
        }

        if self.has_capability(ClassCapabilities::HAS_SET) {
            let args = [Variant::StringName(name.to_string()), value.clone()];
            if let Ok(Variant::Bool(true)) = instance.call("_set", &args) {
                return true;
            }
        }

        self.owner.upgrade().is_some_and(|owner| owner.set(name, value))
    }

    /// Call a method of the chain, or of the native object when the chain
    /// has none.
    pub fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let instance = self.handle()?;
        if let Some((level, function)) = self.script.find_function(method) {
            return level.invoke(&function, Some(&instance), args);
        }
        let owner = self.owner.upgrade().ok_or(CallError::InstanceIsNull)?;
        owner.call(method, args)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.script.has_method(method) || self.owner.upgrade().is_some_and(|owner| owner.has_method(method))
    }

    fn has_capability(&self, capability: ClassCapabilities) -> bool {
        self.script
            .class()
            .is_some_and(|class| class.capabilities.contains(capability))
    }

    // ========================================================================
    // Reflection
    // ========================================================================

    /// Script variables base first, then entries of `_get_property_list`,
    /// then the native properties.
    pub fn get_property_list(&self) -> Vec<PropertyInfo> {
        let mut list = self.script.get_script_property_list();
        if self.has_capability(ClassCapabilities::HAS_GET_PROPERTY_LIST) {
            if let Ok(Variant::Array(entries)) = self.call("_get_property_list", &[]) {
                list.extend(entries.to_vec().iter().filter_map(property_from_dictionary));
            }
        }
        if let Some(owner) = self.owner.upgrade() {
            list.extend(self.script.context().registry().property_list(owner.class_name()));
        }
        list
    }

    pub fn get_method_list(&self) -> Vec<MethodInfo> {
        self.script.get_script_method_list()
    }

    /// Declared type of an instance variable of the chain.
    pub fn get_property_type(&self, name: &str) -> Option<DataType> {
        self.script.chain().iter().find_map(|level| {
            let class = level.class()?;
            class.members.get(name).map(|slot| slot.data_type.clone())
        })
    }

    // ========================================================================
    // Notifications and display
    // ========================================================================

    /// Send `code` to the `_notification` of every class of the chain that
    /// declares one, base first unless `reversed`.
    pub fn notification(&self, code: i64, reversed: bool) {
        let Ok(instance) = self.handle() else {
            return;
        };
        if !self.has_capability(ClassCapabilities::HAS_NOTIFICATION) {
            return;
        }
        let mut chain = self.script.chain();
        if !reversed {
            chain.reverse();
        }
        for level in chain {
            let Some(function) = level.class().and_then(|class| class.function("_notification").cloned()) else {
                continue;
            };
            if let Err(err) = level.invoke(&function, Some(&instance), &[Variant::Int(code)]) {
                debug!(script = %level.fqcn(), code, error = %err, "notification failed");
            }
        }
    }

    /// The result of `_to_string`, when the chain declares it.
    pub fn to_string(&self) -> Option<String> {
        if !self.has_capability(ClassCapabilities::HAS_TO_STRING) {
            return None;
        }
        match self.call("_to_string", &[]) {
            Ok(Variant::String(text)) | Ok(Variant::StringName(text)) => Some(text),
            _ => None,
        }
    }

    // ========================================================================
    // Reload
    // ========================================================================

    /// Values of every instance variable of the chain, by name, read
    /// through `get` so getters run.
    pub fn snapshot(&self) -> Vec<(String, Variant)> {
        let names: Vec<String> = self
            .script
            .chain()
            .iter()
            .rev()
            .filter_map(|level| level.class())
            .flat_map(|class| {
                class
                    .members_in_order()
                    .into_iter()
                    .map(|slot| slot.name.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        names
            .into_iter()
            .filter_map(|name| {
                let value = self.get(&name)?;
                Some((name, value))
            })
            .collect()
    }

    /// Rebuild storage for the script's current layout and replay `values`
    /// through `set`. Values of removed members are dropped; new members
    /// keep their initialized values.
    pub fn reload_members(&self, values: Vec<(String, Variant)>) {
        let Ok(instance) = self.handle() else {
            return;
        };
        *self.members.write() = Self::default_members(&self.script);
        if let Err(err) = instance.run_implicit_initializers() {
            debug!(script = %self.script.fqcn(), error = %err, "implicit initializer failed on reload");
        }
        for (name, value) in values {
            if self.get_property_type(&name).is_some() && !self.set(&name, value) {
                trace!(member = %name, "saved value dropped on reload");
            }
        }
    }
}

/// A `{name, type}` entry returned by `_get_property_list`.
fn property_from_dictionary(entry: &Variant) -> Option<PropertyInfo> {
    let entry = entry.as_dictionary()?;
    let name = entry.get(&Variant::String("name".to_string()))?;
    let ty = entry
        .get(&Variant::String("type".to_string()))
        .and_then(|ty| ty.as_int())
        .and_then(|index| VariantType::ALL.get(usize::try_from(index).ok()?).copied())
        .unwrap_or(VariantType::Nil);
    Some(PropertyInfo::new(name.as_str()?.to_string(), ty))
}
