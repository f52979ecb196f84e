//! Fitting values into typed storage.
//!
//! Typed member slots, static variables and arguments go through
//! [`conform`] before they are stored, so a value that does not fit the
//! declared type never lands in a typed slot.

use brscript_core::{Array, DataType, Dictionary, TypeKind, Variant, VariantType};
use brscript_registry::ClassRegistry;

use crate::ScriptInstance;

/// Convert `value` to `data_type`, or `None` when it does not fit.
///
/// Untyped and inferred targets accept everything. Implicit numeric and
/// string conversions apply; untyped containers are copied into typed ones
/// when every element fits.
pub fn conform(value: Variant, data_type: &DataType, registry: &dyn ClassRegistry) -> Option<Variant> {
    if !data_type.is_hard() || data_type.is_variant() {
        return Some(value);
    }
    if data_type.is_meta {
        return matches!(value, Variant::Object(_) | Variant::Nil).then_some(value);
    }
    match &data_type.kind {
        TypeKind::Builtin { ty, elements } => conform_builtin(value, *ty, elements, registry),
        TypeKind::Enum { .. } => match value {
            Variant::Int(_) => Some(value),
            Variant::Float(f) => Some(Variant::Int(f as i64)),
            _ => None,
        },
        TypeKind::Native { class } => match &value {
            Variant::Nil => Some(value),
            Variant::Object(object) if registry.is_parent_class(object.class_name(), class) => Some(value),
            _ => None,
        },
        TypeKind::Class(key) => match &value {
            Variant::Nil => Some(value),
            Variant::Object(object) => {
                let instance = ScriptInstance::of(object.object().as_ref())?;
                instance.get_script().inherits_class(key).then_some(value)
            }
            _ => None,
        },
        TypeKind::Variant | TypeKind::Unresolved | TypeKind::Resolving => Some(value),
    }
}

fn conform_builtin(
    value: Variant,
    ty: VariantType,
    elements: &[DataType],
    registry: &dyn ClassRegistry,
) -> Option<Variant> {
    let value_ty = value.get_type();
    if value_ty != ty {
        if value_ty.converts_implicitly_to(ty) {
            return value.convert(ty);
        }
        return None;
    }
    match (value, elements) {
        (Variant::Array(array), [element, ..]) => conform_array(array, element, registry).map(Variant::Array),
        (Variant::Dictionary(dictionary), [key, value_type]) => {
            conform_dictionary(dictionary, key, value_type, registry).map(Variant::Dictionary)
        }
        (value, _) => Some(value),
    }
}

fn conform_array(array: Array, element: &DataType, registry: &dyn ClassRegistry) -> Option<Array> {
    match array.element_type() {
        Some(existing) if existing == *element => Some(array),
        Some(_) => None,
        None => {
            let elements = array
                .to_vec()
                .into_iter()
                .map(|value| conform(value, element, registry))
                .collect::<Option<Vec<_>>>()?;
            Some(Array::typed(element.clone(), elements))
        }
    }
}

fn conform_dictionary(
    dictionary: Dictionary,
    key: &DataType,
    value: &DataType,
    registry: &dyn ClassRegistry,
) -> Option<Dictionary> {
    if dictionary.key_type().is_some() || dictionary.value_type().is_some() {
        let same = dictionary.key_type().as_ref() == Some(key) && dictionary.value_type().as_ref() == Some(value);
        return same.then_some(dictionary);
    }
    let typed = Dictionary::typed(Some(key.clone()), Some(value.clone()));
    for (k, v) in dictionary.entries() {
        typed.insert(conform(k, key, registry)?, conform(v, value, registry)?);
    }
    Some(typed)
}

/// Default value of a typed slot; untyped slots start as `null`.
pub fn slot_default(data_type: &DataType) -> Variant {
    if data_type.is_hard() {
        data_type.default_value()
    } else {
        Variant::Nil
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brscript_registry::ClassDb;

    fn int() -> DataType {
        DataType::builtin(VariantType::Int).hard()
    }

    #[test]
    fn untyped_targets_accept_anything() {
        let db = ClassDb::with_core_classes();
        assert_eq!(conform("x".into(), &DataType::variant(), &db), Some("x".into()));
        let inferred = DataType::builtin(VariantType::Int).inferred();
        assert_eq!(conform("x".into(), &inferred, &db), Some("x".into()));
    }

    #[test]
    fn builtins_convert_implicitly() {
        let db = ClassDb::with_core_classes();
        let float = DataType::builtin(VariantType::Float).hard();
        assert_eq!(conform(Variant::Int(2), &float, &db), Some(Variant::Float(2.0)));
        assert_eq!(conform(Variant::Int(2), &int(), &db), Some(Variant::Int(2)));
        assert_eq!(conform("2".into(), &int(), &db), None);
    }

    #[test]
    fn untyped_arrays_become_typed_when_elements_fit() {
        let db = ClassDb::with_core_classes();
        let target = DataType::typed_array(int()).hard();
        let fitting = Variant::Array(Array::from_vec(vec![Variant::Int(1), Variant::Int(2)]));
        let converted = conform(fitting, &target, &db).unwrap();
        assert_eq!(converted.as_array().unwrap().element_type(), Some(int()));

        let mixed = Variant::Array(Array::from_vec(vec![Variant::Int(1), "a".into()]));
        assert_eq!(conform(mixed, &target, &db), None);
    }

    #[test]
    fn native_types_check_ancestry() {
        let db = std::sync::Arc::new(ClassDb::with_core_classes());
        let object = db.instantiate("RefCounted").unwrap();
        let value = Variant::Object(object);
        assert!(conform(value.clone(), &DataType::native("Object").hard(), &db).is_some());
        assert_eq!(conform(Variant::Int(1), &DataType::native("Object").hard(), &db), None);
        assert_eq!(conform(Variant::Nil, &DataType::native("Object").hard(), &db), Some(Variant::Nil));
    }

    #[test]
    fn slot_defaults_follow_hardness() {
        assert_eq!(slot_default(&int()), Variant::Int(0));
        assert_eq!(slot_default(&DataType::builtin(VariantType::Int).inferred()), Variant::Nil);
    }
}
