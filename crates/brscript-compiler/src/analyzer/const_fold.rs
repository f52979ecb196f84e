//! Compile-time constant values.
//!
//! Folding happens while expressions are reduced: literals are constant,
//! containers are constant when every element is, and subscripts or
//! attributes of constants fold to the element. Folded containers are
//! read-only so a constant can never be mutated through an alias.

use brscript_core::{Array, DataType, Dictionary, TypeKind, Variant, VariantType};

/// A constant array literal.
pub(crate) fn fold_array(elements: Vec<Variant>) -> Variant {
    let array = Array::from_vec(elements);
    array.make_read_only();
    Variant::Array(array)
}

/// A constant dictionary literal. Later keys replace earlier ones.
pub(crate) fn fold_dictionary(entries: Vec<(Variant, Variant)>) -> Variant {
    let dictionary = Dictionary::from_entries(entries);
    dictionary.make_read_only();
    Variant::Dictionary(dictionary)
}

/// `base[index]` on constant operands.
pub(crate) fn fold_subscript(base: &Variant, index: &Variant) -> Option<Variant> {
    match base {
        Variant::Array(array) => {
            let index = index.as_int()?;
            let len = array.len() as i64;
            let index = if index < 0 { index + len } else { index };
            if index < 0 {
                return None;
            }
            array.get(index as usize)
        }
        Variant::Dictionary(dictionary) => dictionary.get(index),
        Variant::String(text) => {
            let index = index.as_int()?;
            let len = text.chars().count() as i64;
            let index = if index < 0 { index + len } else { index };
            if index < 0 {
                return None;
            }
            text.chars()
                .nth(index as usize)
                .map(|c| Variant::String(c.to_string()))
        }
        Variant::Vector2(x, y) => match index.as_int()? {
            0 => Some(Variant::Float(*x)),
            1 => Some(Variant::Float(*y)),
            _ => None,
        },
        Variant::Vector3(x, y, z) => match index.as_int()? {
            0 => Some(Variant::Float(*x)),
            1 => Some(Variant::Float(*y)),
            2 => Some(Variant::Float(*z)),
            _ => None,
        },
        _ => None,
    }
}

/// `base.name` on a constant: enum dictionaries and vector components.
pub(crate) fn fold_attribute(base: &Variant, name: &str) -> Option<Variant> {
    match (base, name) {
        (Variant::Dictionary(dictionary), _) => dictionary
            .get(&Variant::String(name.to_string()))
            .or_else(|| dictionary.get(&Variant::StringName(name.to_string()))),
        (Variant::Vector2(x, _), "x") | (Variant::Vector3(x, _, _), "x") => Some(Variant::Float(*x)),
        (Variant::Vector2(_, y), "y") | (Variant::Vector3(_, y, _), "y") => Some(Variant::Float(*y)),
        (Variant::Vector3(_, _, z), "z") => Some(Variant::Float(*z)),
        _ => None,
    }
}

/// A constant converted to the representation a typed target stores:
/// numeric widening, string names, and typed read-only containers.
///
/// Returns `None` when some element does not fit the target.
pub(crate) fn adapt_constant(value: &Variant, target: &DataType) -> Option<Variant> {
    if target.is_meta {
        return Some(value.clone());
    }
    match &target.kind {
        TypeKind::Variant | TypeKind::Unresolved | TypeKind::Resolving => Some(value.clone()),
        TypeKind::Builtin {
            ty: VariantType::Array,
            elements,
        } => {
            let array = value.as_array()?;
            let Some(element_type) = elements.first() else {
                return Some(value.clone());
            };
            if array.element_type().as_ref() == Some(element_type) {
                return Some(value.clone());
            }
            let adapted = array
                .to_vec()
                .iter()
                .map(|element| adapt_constant(element, element_type))
                .collect::<Option<Vec<_>>>()?;
            let typed = Array::typed(element_type.clone(), adapted);
            typed.make_read_only();
            Some(Variant::Array(typed))
        }
        TypeKind::Builtin {
            ty: VariantType::Dictionary,
            elements,
        } if !elements.is_empty() => {
            let dictionary = value.as_dictionary()?;
            let key_type = elements.first();
            let value_type = elements.get(1);
            let typed = Dictionary::typed(key_type.cloned(), value_type.cloned());
            for (key, entry) in dictionary.entries() {
                let key = match key_type {
                    Some(ty) => adapt_constant(&key, ty)?,
                    None => key,
                };
                let entry = match value_type {
                    Some(ty) => adapt_constant(&entry, ty)?,
                    None => entry,
                };
                typed.insert(key, entry);
            }
            typed.make_read_only();
            Some(Variant::Dictionary(typed))
        }
        TypeKind::Builtin { ty, .. } => {
            let value_ty = value.get_type();
            if value_ty == *ty {
                Some(value.clone())
            } else if value_ty.converts_implicitly_to(*ty) {
                value.convert(*ty)
            } else {
                None
            }
        }
        TypeKind::Enum { .. } => value.as_int().map(Variant::Int),
        TypeKind::Native { .. } | TypeKind::Class(_) => value.is_nil().then_some(Variant::Nil),
    }
}

/// `value as Type` on a constant builtin.
pub(crate) fn fold_cast(value: &Variant, target: &DataType) -> Option<Variant> {
    match &target.kind {
        TypeKind::Builtin { ty, elements } if elements.is_empty() => value.convert(*ty),
        TypeKind::Builtin { .. } => adapt_constant(value, target),
        TypeKind::Enum { .. } => value.as_int().map(Variant::Int),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Variant {
        fold_array(values.iter().map(|v| Variant::Int(*v)).collect())
    }

    #[test]
    fn folded_arrays_are_read_only() {
        let value = ints(&[1, 2, 3]);
        let array = value.as_array().unwrap();
        assert!(array.is_read_only());
        assert!(!array.push(Variant::Int(4)));
        assert_eq!(array.len(), 3);
    }

    #[test]
    fn subscripts_fold_with_negative_indices() {
        let value = ints(&[10, 20, 30]);
        assert_eq!(fold_subscript(&value, &Variant::Int(0)), Some(Variant::Int(10)));
        assert_eq!(fold_subscript(&value, &Variant::Int(-1)), Some(Variant::Int(30)));
        assert_eq!(fold_subscript(&value, &Variant::Int(3)), None);
        assert_eq!(fold_subscript(&value, &Variant::Int(-4)), None);
    }

    #[test]
    fn typed_array_target_adapts_elements() {
        let target = DataType::typed_array(DataType::builtin(VariantType::Float));
        let adapted = adapt_constant(&ints(&[1, 2]), &target).unwrap();
        let array = adapted.as_array().unwrap();
        assert_eq!(array.element_type(), Some(DataType::builtin(VariantType::Float)));
        assert!(array.is_read_only());
        assert!(matches!(array.get(0), Some(Variant::Float(f)) if f == 1.0));
    }

    #[test]
    fn mismatched_elements_do_not_adapt() {
        let target = DataType::typed_array(DataType::builtin(VariantType::Int));
        let mixed = fold_array(vec![Variant::Int(1), Variant::String("a".into())]);
        assert!(adapt_constant(&mixed, &target).is_none());
        assert!(adapt_constant(&Variant::Float(1.5), &DataType::builtin(VariantType::Int)).is_none());
    }

    #[test]
    fn enum_dictionaries_fold_attributes() {
        let dictionary = fold_dictionary(vec![
            (Variant::String("A".into()), Variant::Int(0)),
            (Variant::String("B".into()), Variant::Int(5)),
        ]);
        assert_eq!(fold_attribute(&dictionary, "B"), Some(Variant::Int(5)));
        assert_eq!(fold_attribute(&dictionary, "C"), None);
        assert_eq!(
            fold_attribute(&Variant::Vector2(1.0, 2.0), "y"),
            Some(Variant::Float(2.0))
        );
    }

    #[test]
    fn casts_follow_the_conversion_table() {
        let int = DataType::builtin(VariantType::Int);
        assert_eq!(fold_cast(&Variant::Float(2.9), &int), Some(Variant::Int(2)));
        assert_eq!(
            fold_cast(&Variant::Int(3), &DataType::builtin(VariantType::String)),
            Some(Variant::String("3".into()))
        );
        assert_eq!(fold_cast(&Variant::Nil, &int), None);
    }
}
