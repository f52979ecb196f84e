//! The host reflection database.
//!
//! [`ClassDb`] is an explicitly constructed, read-mostly table of native
//! classes, builtin-type methods, utility functions, global constants,
//! singletons and global script classes. It is handed to the analyzer,
//! compiler and runtime by reference; nothing in the pipeline reads it from
//! ambient state, so tests build their own.
//!
//! The pipeline consumes it through the [`ClassRegistry`] trait.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use brscript_core::{
    CallError, EnumValues, HostObject, MethodFlags, MethodInfo, ObjectRef, PropertyInfo, Variant,
    VariantType,
};

use crate::class_graph::{ClassGraph, NativeClass, NativeMethod};
use crate::{NativeObject, RegistrationError};

/// Implementation of a native method.
pub type NativeMethodFn =
    Arc<dyn Fn(&dyn HostObject, &[Variant]) -> Result<Variant, CallError> + Send + Sync>;

/// A script class registered under a global name (`class_name`).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalClass {
    pub name: String,
    pub path: String,
    /// Base type name as written (native class or another global class).
    pub base: String,
    pub icon_path: Option<String>,
}

/// Queries the analyzer, compiler and runtime make against the host.
pub trait ClassRegistry: Send + Sync {
    fn class_exists(&self, class: &str) -> bool;

    fn parent_class(&self, class: &str) -> Option<String>;

    /// Whether `class` is `ancestor` or inherits from it.
    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool;

    /// Method lookup through the class ancestry.
    fn method(&self, class: &str, method: &str) -> Option<MethodInfo>;

    fn has_method(&self, class: &str, method: &str) -> bool {
        self.method(class, method).is_some()
    }

    fn signal(&self, class: &str, signal: &str) -> Option<MethodInfo>;

    fn has_signal(&self, class: &str, signal: &str) -> bool {
        self.signal(class, signal).is_some()
    }

    fn property(&self, class: &str, property: &str) -> Option<PropertyInfo>;

    fn has_property(&self, class: &str, property: &str) -> bool {
        self.property(class, property).is_some()
    }

    /// Values of an enum declared on the class or an ancestor.
    fn enum_values(&self, class: &str, name: &str) -> Option<Arc<EnumValues>>;

    fn has_enum(&self, class: &str, name: &str) -> bool {
        self.enum_values(class, name).is_some()
    }

    /// Integer constant (including enum values) on the class or an ancestor.
    fn integer_constant(&self, class: &str, name: &str) -> Option<i64>;

    fn has_integer_constant(&self, class: &str, name: &str) -> bool {
        self.integer_constant(class, name).is_some()
    }

    /// Enum that owns an integer constant, if any.
    fn enum_of_constant(&self, class: &str, name: &str) -> Option<String>;

    fn can_instantiate(&self, class: &str) -> bool;

    fn instantiate(&self, class: &str) -> Option<ObjectRef>;

    fn method_list(&self, class: &str) -> Vec<MethodInfo>;

    fn property_list(&self, class: &str) -> Vec<PropertyInfo>;

    /// Class name of a global singleton.
    fn singleton_class(&self, name: &str) -> Option<String>;

    fn global_constant(&self, name: &str) -> Option<Variant>;

    fn utility_function(&self, name: &str) -> Option<MethodInfo>;

    fn builtin_method(&self, ty: VariantType, method: &str) -> Option<MethodInfo>;

    /// Type of a named member of a builtin value (`Vector2.x`).
    fn builtin_member(&self, ty: VariantType, member: &str) -> Option<VariantType>;

    fn global_class(&self, name: &str) -> Option<GlobalClass>;

    /// Global class registered for a script path.
    fn global_class_for_path(&self, path: &str) -> Option<GlobalClass>;
}

/// The default [`ClassRegistry`] implementation.
pub struct ClassDb {
    classes: ClassGraph,
    builtin_methods: FxHashMap<VariantType, FxHashMap<String, MethodInfo>>,
    builtin_members: FxHashMap<VariantType, FxHashMap<String, VariantType>>,
    utilities: FxHashMap<String, MethodInfo>,
    global_constants: FxHashMap<String, Variant>,
    singletons: FxHashMap<String, String>,
    global_classes: RwLock<FxHashMap<String, GlobalClass>>,
}

impl Default for ClassDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassDb {
    /// An empty database.
    pub fn new() -> Self {
        Self {
            classes: ClassGraph::new(),
            builtin_methods: FxHashMap::default(),
            builtin_members: FxHashMap::default(),
            utilities: FxHashMap::default(),
            global_constants: FxHashMap::default(),
            singletons: FxHashMap::default(),
            global_classes: RwLock::new(FxHashMap::default()),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Start registering a class under `parent`.
    pub fn register_class(&mut self, name: &str, parent: Option<&str>) -> ClassBuilder<'_> {
        ClassBuilder {
            db: self,
            class: NativeClass::new(name),
            parent: parent.map(str::to_string),
        }
    }

    pub fn register_builtin_method(&mut self, ty: VariantType, info: MethodInfo) {
        self.builtin_methods
            .entry(ty)
            .or_default()
            .insert(info.name.clone(), info);
    }

    pub fn register_builtin_member(&mut self, ty: VariantType, name: &str, member_ty: VariantType) {
        self.builtin_members
            .entry(ty)
            .or_default()
            .insert(name.to_string(), member_ty);
    }

    pub fn register_utility(&mut self, info: MethodInfo) {
        self.utilities.insert(info.name.clone(), info);
    }

    pub fn register_global_constant(&mut self, name: &str, value: Variant) {
        self.global_constants.insert(name.to_string(), value);
    }

    pub fn register_singleton(&mut self, name: &str, class: &str) {
        self.singletons.insert(name.to_string(), class.to_string());
    }

    /// Register or replace a global script class. Takes `&self`: scripts
    /// gain and lose global names while the database is shared.
    pub fn add_global_class(&self, class: GlobalClass) {
        self.global_classes.write().insert(class.name.clone(), class);
    }

    pub fn remove_global_class(&self, name: &str) -> Option<GlobalClass> {
        self.global_classes.write().remove(name)
    }

    pub fn classes(&self) -> &ClassGraph {
        &self.classes
    }

    /// Implementation of a native method, looked up through the ancestry.
    pub fn method_implementation(&self, class: &str, method: &str) -> Option<NativeMethodFn> {
        self.classes.find_in_ancestry(class, |c| {
            c.methods
                .get(method)
                .and_then(|m| m.implementation.clone())
        })
    }

    // ========================================================================
    // Core set
    // ========================================================================

    /// A database with the core classes, builtin methods and utilities
    /// every host exposes.
    pub fn with_core_classes() -> Self {
        let mut db = Self::new();
        db.install_core_classes();
        db
    }

    fn install_core_classes(&mut self) {
        use VariantType as T;

        let arg = PropertyInfo::new;

        let _ = self
            .register_class("Object", None)
            .method(
                MethodInfo::new("get_class").with_return(arg("", T::String)),
                None,
            )
            .method(
                MethodInfo::new("is_class")
                    .with_argument(arg("class", T::String))
                    .with_return(arg("", T::Bool)),
                None,
            )
            .method(
                MethodInfo::new("get")
                    .with_argument(arg("property", T::StringName))
                    .with_return(arg("", T::Nil)),
                None,
            )
            .method(
                MethodInfo::new("set")
                    .with_argument(arg("property", T::StringName))
                    .with_argument(arg("value", T::Nil)),
                None,
            )
            .method(
                MethodInfo::new("emit_signal")
                    .with_argument(arg("signal", T::StringName))
                    .with_flags(MethodFlags::VARARG),
                None,
            )
            .method(
                MethodInfo::new("free"),
                None,
            )
            .signal(MethodInfo::new("script_changed"))
            .constant("NOTIFICATION_POSTINITIALIZE", 0)
            .constant("NOTIFICATION_PREDELETE", 1)
            .finish();

        let _ = self
            .register_class("RefCounted", Some("Object"))
            .method(
                MethodInfo::new("get_reference_count").with_return(arg("", T::Int)),
                None,
            )
            .finish();

        let _ = self
            .register_class("Resource", Some("RefCounted"))
            .property(arg("resource_path", T::String))
            .property(arg("resource_name", T::String))
            .signal(MethodInfo::new("changed"))
            .finish();

        let _ = self
            .register_class("Node", Some("Object"))
            .property(arg("name", T::StringName))
            .method(
                MethodInfo::new("add_child").with_argument(arg("node", T::Object).with_class("Node")),
                None,
            )
            .method(
                MethodInfo::new("get_child_count").with_return(arg("", T::Int)),
                None,
            )
            .method(
                MethodInfo::new("queue_free"),
                None,
            )
            .signal(MethodInfo::new("ready"))
            .signal(
                MethodInfo::new("renamed"),
            )
            .enumeration(
                "ProcessMode",
                &[
                    ("PROCESS_MODE_INHERIT", 0),
                    ("PROCESS_MODE_PAUSABLE", 1),
                    ("PROCESS_MODE_ALWAYS", 3),
                ],
            )
            .constant("NOTIFICATION_READY", 13)
            .finish();

        for (ty, name, ret) in [
            (T::Array, "size", T::Int),
            (T::Array, "is_empty", T::Bool),
            (T::Array, "clear", T::Nil),
            (T::Array, "pop_back", T::Nil),
            (T::Dictionary, "size", T::Int),
            (T::Dictionary, "is_empty", T::Bool),
            (T::Dictionary, "keys", T::Array),
            (T::Dictionary, "values", T::Array),
            (T::String, "length", T::Int),
            (T::String, "to_upper", T::String),
            (T::String, "to_lower", T::String),
            (T::Vector2, "length", T::Float),
            (T::Vector2, "normalized", T::Vector2),
            (T::Vector3, "length", T::Float),
        ] {
            self.register_builtin_method(
                ty,
                MethodInfo::new(name).with_return(arg("", ret)).with_flags(MethodFlags::CONST),
            );
        }
        for (ty, name, param) in [
            (T::Array, "append", T::Nil),
            (T::Array, "push_back", T::Nil),
            (T::Array, "has", T::Nil),
            (T::Dictionary, "has", T::Nil),
            (T::Dictionary, "erase", T::Nil),
            (T::String, "begins_with", T::String),
        ] {
            let ret = if name == "has" || name == "begins_with" || name == "erase" {
                T::Bool
            } else {
                T::Nil
            };
            self.register_builtin_method(
                ty,
                MethodInfo::new(name)
                    .with_argument(arg("value", param))
                    .with_return(arg("", ret)),
            );
        }
        self.register_builtin_method(
            T::Vector2,
            MethodInfo::new("dot")
                .with_argument(arg("with", T::Vector2))
                .with_return(arg("", T::Float)),
        );
        for member in ["x", "y"] {
            self.register_builtin_member(T::Vector2, member, T::Float);
        }
        for member in ["x", "y", "z"] {
            self.register_builtin_member(T::Vector3, member, T::Float);
        }

        self.register_utility(
            MethodInfo::new("print")
                .with_flags(MethodFlags::VARARG),
        );
        self.register_utility(
            MethodInfo::new("len")
                .with_argument(arg("value", T::Nil))
                .with_return(arg("", T::Int)),
        );
        self.register_utility(
            MethodInfo::new("str")
                .with_flags(MethodFlags::VARARG)
                .with_return(arg("", T::String)),
        );
        self.register_utility(
            MethodInfo::new("range")
                .with_argument(arg("from", T::Int))
                .with_argument(arg("to", T::Int))
                .with_argument(arg("step", T::Int))
                .with_defaults(2)
                .with_return(arg("", T::Array)),
        );
        self.register_utility(
            MethodInfo::new("typeof")
                .with_argument(arg("value", T::Nil))
                .with_return(arg("", T::Int)),
        );
        self.register_utility(
            MethodInfo::new("abs")
                .with_argument(arg("value", T::Nil))
                .with_return(arg("", T::Nil)),
        );

        self.register_global_constant("PI", Variant::Float(std::f64::consts::PI));
        self.register_global_constant("TAU", Variant::Float(std::f64::consts::TAU));
        self.register_global_constant("INF", Variant::Float(f64::INFINITY));
    }
}

/// Builder returned by [`ClassDb::register_class`].
pub struct ClassBuilder<'a> {
    db: &'a mut ClassDb,
    class: NativeClass,
    parent: Option<String>,
}

impl ClassBuilder<'_> {
    pub fn method(mut self, info: MethodInfo, implementation: Option<NativeMethodFn>) -> Self {
        self.class.methods.insert(
            info.name.clone(),
            NativeMethod {
                info,
                implementation,
            },
        );
        self
    }

    pub fn property(mut self, info: PropertyInfo) -> Self {
        self.class.properties.insert(info.name.clone(), info);
        self
    }

    pub fn signal(mut self, info: MethodInfo) -> Self {
        self.class.signals.insert(info.name.clone(), info);
        self
    }

    pub fn constant(mut self, name: &str, value: i64) -> Self {
        self.class.constants.insert(name.to_string(), value);
        self
    }

    /// An enum; its values are also registered as integer constants.
    pub fn enumeration(mut self, name: &str, values: &[(&str, i64)]) -> Self {
        for (value_name, value) in values {
            self.class.constants.insert(value_name.to_string(), *value);
        }
        self.class.enums.insert(
            name.to_string(),
            values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        );
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.class.instantiable = false;
        self
    }

    pub fn finish(self) -> Result<(), RegistrationError> {
        self.db
            .classes
            .add_class(self.class, self.parent.as_deref())
            .map(|_| ())
    }
}

// ============================================================================
// ClassRegistry
// ============================================================================

/// Shared handle used when creating native objects.
pub type SharedClassDb = Arc<ClassDb>;

impl ClassRegistry for Arc<ClassDb> {
    fn class_exists(&self, class: &str) -> bool {
        self.as_ref().class_exists(class)
    }
    fn parent_class(&self, class: &str) -> Option<String> {
        self.as_ref().parent_class(class)
    }
    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool {
        self.as_ref().is_parent_class(class, ancestor)
    }
    fn method(&self, class: &str, method: &str) -> Option<MethodInfo> {
        self.as_ref().method(class, method)
    }
    fn signal(&self, class: &str, signal: &str) -> Option<MethodInfo> {
        self.as_ref().signal(class, signal)
    }
    fn property(&self, class: &str, property: &str) -> Option<PropertyInfo> {
        self.as_ref().property(class, property)
    }
    fn enum_values(&self, class: &str, name: &str) -> Option<Arc<EnumValues>> {
        self.as_ref().enum_values(class, name)
    }
    fn integer_constant(&self, class: &str, name: &str) -> Option<i64> {
        self.as_ref().integer_constant(class, name)
    }
    fn enum_of_constant(&self, class: &str, name: &str) -> Option<String> {
        self.as_ref().enum_of_constant(class, name)
    }
    fn can_instantiate(&self, class: &str) -> bool {
        self.as_ref().can_instantiate(class)
    }
    fn instantiate(&self, class: &str) -> Option<ObjectRef> {
        if !self.as_ref().can_instantiate(class) {
            return None;
        }
        Some(ObjectRef::new(Arc::new(NativeObject::new(class, self.clone()))))
    }
    fn method_list(&self, class: &str) -> Vec<MethodInfo> {
        self.as_ref().method_list(class)
    }
    fn property_list(&self, class: &str) -> Vec<PropertyInfo> {
        self.as_ref().property_list(class)
    }
    fn singleton_class(&self, name: &str) -> Option<String> {
        self.as_ref().singleton_class(name)
    }
    fn global_constant(&self, name: &str) -> Option<Variant> {
        self.as_ref().global_constant(name)
    }
    fn utility_function(&self, name: &str) -> Option<MethodInfo> {
        self.as_ref().utility_function(name)
    }
    fn builtin_method(&self, ty: VariantType, method: &str) -> Option<MethodInfo> {
        self.as_ref().builtin_method(ty, method)
    }
    fn builtin_member(&self, ty: VariantType, member: &str) -> Option<VariantType> {
        self.as_ref().builtin_member(ty, member)
    }
    fn global_class(&self, name: &str) -> Option<GlobalClass> {
        self.as_ref().global_class(name)
    }
    fn global_class_for_path(&self, path: &str) -> Option<GlobalClass> {
        self.as_ref().global_class_for_path(path)
    }
}

impl ClassRegistry for ClassDb {
    fn class_exists(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    fn parent_class(&self, class: &str) -> Option<String> {
        self.classes.parent(class).map(str::to_string)
    }

    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool {
        self.classes.is_parent_class(class, ancestor)
    }

    fn method(&self, class: &str, method: &str) -> Option<MethodInfo> {
        self.classes
            .find_in_ancestry(class, |c| c.methods.get(method).map(|m| m.info.clone()))
    }

    fn signal(&self, class: &str, signal: &str) -> Option<MethodInfo> {
        self.classes
            .find_in_ancestry(class, |c| c.signals.get(signal).cloned())
    }

    fn property(&self, class: &str, property: &str) -> Option<PropertyInfo> {
        self.classes
            .find_in_ancestry(class, |c| c.properties.get(property).cloned())
    }

    fn enum_values(&self, class: &str, name: &str) -> Option<Arc<EnumValues>> {
        self.classes.find_in_ancestry(class, |c| {
            c.enums
                .get(name)
                .map(|values| Arc::new(EnumValues(values.clone())))
        })
    }

    fn integer_constant(&self, class: &str, name: &str) -> Option<i64> {
        self.classes
            .find_in_ancestry(class, |c| c.constants.get(name).copied())
    }

    fn enum_of_constant(&self, class: &str, name: &str) -> Option<String> {
        self.classes.find_in_ancestry(class, |c| {
            c.enums
                .iter()
                .find(|(_, values)| values.iter().any(|(n, _)| n == name))
                .map(|(enum_name, _)| enum_name.clone())
        })
    }

    fn can_instantiate(&self, class: &str) -> bool {
        self.classes.get(class).is_some_and(|c| c.instantiable)
    }

    /// A bare database cannot hand out shared handles to itself; use
    /// `Arc<ClassDb>` to instantiate objects.
    fn instantiate(&self, _class: &str) -> Option<ObjectRef> {
        None
    }

    fn method_list(&self, class: &str) -> Vec<MethodInfo> {
        let mut list: Vec<MethodInfo> = self
            .classes
            .ancestry(class)
            .iter()
            .flat_map(|c| c.methods.values().map(|m| m.info.clone()))
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    fn property_list(&self, class: &str) -> Vec<PropertyInfo> {
        let mut list: Vec<PropertyInfo> = self
            .classes
            .ancestry(class)
            .iter()
            .flat_map(|c| c.properties.values().cloned())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    fn singleton_class(&self, name: &str) -> Option<String> {
        self.singletons.get(name).cloned()
    }

    fn global_constant(&self, name: &str) -> Option<Variant> {
        self.global_constants.get(name).cloned()
    }

    fn utility_function(&self, name: &str) -> Option<MethodInfo> {
        self.utilities.get(name).cloned()
    }

    fn builtin_method(&self, ty: VariantType, method: &str) -> Option<MethodInfo> {
        self.builtin_methods.get(&ty)?.get(method).cloned()
    }

    fn builtin_member(&self, ty: VariantType, member: &str) -> Option<VariantType> {
        self.builtin_members.get(&ty)?.get(member).copied()
    }

    fn global_class(&self, name: &str) -> Option<GlobalClass> {
        self.global_classes.read().get(name).cloned()
    }

    fn global_class_for_path(&self, path: &str) -> Option<GlobalClass> {
        self.global_classes
            .read()
            .values()
            .find(|class| class.path == path)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_classes_are_registered() {
        let db = ClassDb::with_core_classes();
        assert!(db.class_exists("RefCounted"));
        assert!(db.is_parent_class("Resource", "Object"));
        assert!(db.has_method("Resource", "get_class"));
        assert!(db.has_signal("Node", "ready"));
        assert_eq!(db.integer_constant("Node", "PROCESS_MODE_ALWAYS"), Some(3));
        assert_eq!(
            db.enum_of_constant("Node", "PROCESS_MODE_ALWAYS").as_deref(),
            Some("ProcessMode")
        );
    }

    #[test]
    fn builtin_and_utility_lookup() {
        let db = ClassDb::with_core_classes();
        assert!(db.builtin_method(VariantType::Array, "size").is_some());
        assert_eq!(
            db.builtin_member(VariantType::Vector2, "x"),
            Some(VariantType::Float)
        );
        assert!(db.utility_function("print").is_some_and(|m| m.is_vararg()));
        assert!(db.global_constant("PI").is_some());
    }

    #[test]
    fn global_classes_update_through_shared_reference() {
        let db = Arc::new(ClassDb::with_core_classes());
        db.add_global_class(GlobalClass {
            name: "Player".into(),
            path: "res://player.br".into(),
            base: "Node".into(),
            icon_path: None,
        });
        assert_eq!(
            db.global_class_for_path("res://player.br").map(|c| c.name),
            Some("Player".to_string())
        );
        assert!(db.remove_global_class("Player").is_some());
        assert!(db.global_class("Player").is_none());
    }

    #[test]
    fn shared_db_instantiates() {
        let db = Arc::new(ClassDb::with_core_classes());
        let object = ClassRegistry::instantiate(&db, "Node").expect("node");
        assert_eq!(object.class_name(), "Node");
    }
}
