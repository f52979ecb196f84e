//! A reflective host object backed by the [`ClassDb`].

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use brscript_core::{AttachedInstance, CallError, HostObject, ObjectId, Variant};

use crate::{ClassDb, ClassRegistry};

/// Host object whose properties are stored in a map and whose methods are
/// the implementations registered on its class.
pub struct NativeObject {
    id: ObjectId,
    class: String,
    db: Arc<ClassDb>,
    properties: RwLock<FxHashMap<String, Variant>>,
    instance: RwLock<Option<AttachedInstance>>,
}

impl NativeObject {
    pub fn new(class: &str, db: Arc<ClassDb>) -> Self {
        Self {
            id: ObjectId::next(),
            class: class.to_string(),
            db,
            properties: RwLock::new(FxHashMap::default()),
            instance: RwLock::new(None),
        }
    }
}

impl HostObject for NativeObject {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn get(&self, name: &str) -> Option<Variant> {
        let info = self.db.property(&self.class, name)?;
        Some(
            self.properties
                .read()
                .get(name)
                .cloned()
                .unwrap_or_else(|| Variant::default_of(info.ty)),
        )
    }

    fn set(&self, name: &str, value: Variant) -> bool {
        let Some(info) = self.db.property(&self.class, name) else {
            return false;
        };
        let value = match value.convert(info.ty) {
            Some(converted) if info.ty != brscript_core::VariantType::Nil => converted,
            _ => value,
        };
        self.properties.write().insert(name.to_string(), value);
        true
    }

    fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        match method {
            "get_class" => return Ok(Variant::String(self.class.clone())),
            "is_class" => {
                let class = args.first().and_then(Variant::as_str).unwrap_or_default();
                return Ok(Variant::Bool(self.db.is_parent_class(&self.class, class)));
            }
            _ => {}
        }

        let info = self
            .db
            .method(&self.class, method)
            .ok_or_else(|| CallError::InvalidMethod {
                method: method.to_string(),
            })?;
        if args.len() < info.min_arguments() {
            return Err(CallError::TooFewArguments {
                method: method.to_string(),
                expected: info.min_arguments(),
                found: args.len(),
            });
        }
        if !info.is_vararg() && args.len() > info.arguments.len() {
            return Err(CallError::TooManyArguments {
                method: method.to_string(),
                expected: info.arguments.len(),
                found: args.len(),
            });
        }

        match self.db.method_implementation(&self.class, method) {
            Some(implementation) => implementation(self, args),
            None => Ok(Variant::Nil),
        }
    }

    fn has_method(&self, method: &str) -> bool {
        self.db.has_method(&self.class, method)
    }

    fn script_instance(&self) -> Option<AttachedInstance> {
        self.instance.read().clone()
    }

    fn set_script_instance(&self, instance: Option<AttachedInstance>) {
        *self.instance.write() = instance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brscript_core::{MethodInfo, PropertyInfo, VariantType};

    fn twice(_: &dyn HostObject, args: &[Variant]) -> Result<Variant, CallError> {
        Ok(Variant::Int(args[0].as_int().unwrap_or(0) * 2))
    }

    fn db() -> Arc<ClassDb> {
        let mut db = ClassDb::with_core_classes();
        db.register_class("Counter", Some("RefCounted"))
            .property(PropertyInfo::new("count", VariantType::Int))
            .method(
                MethodInfo::new("twice")
                    .with_argument(PropertyInfo::new("value", VariantType::Int))
                    .with_return(PropertyInfo::new("", VariantType::Int)),
                Some(Arc::new(twice)),
            )
            .finish()
            .unwrap();
        Arc::new(db)
    }

    #[test]
    fn properties_default_and_store() {
        let object = NativeObject::new("Counter", db());
        assert_eq!(object.get("count"), Some(Variant::Int(0)));
        assert!(object.set("count", Variant::Float(3.0)));
        assert_eq!(object.get("count"), Some(Variant::Int(3)));
        assert!(!object.set("missing", Variant::Nil));
        assert_eq!(object.get("missing"), None);
    }

    #[test]
    fn calls_dispatch_to_implementation() {
        let object = NativeObject::new("Counter", db());
        assert_eq!(object.call("twice", &[Variant::Int(4)]), Ok(Variant::Int(8)));
        assert!(matches!(
            object.call("twice", &[]),
            Err(CallError::TooFewArguments { .. })
        ));
        assert!(matches!(
            object.call("nope", &[]),
            Err(CallError::InvalidMethod { .. })
        ));
        assert_eq!(
            object.call("is_class", &["RefCounted".into()]),
            Ok(Variant::Bool(true))
        );
    }
}
