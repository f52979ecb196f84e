//! Type compatibility.
//!
//! [`is_type_compatible`] answers whether a value of the `source` type may be
//! stored where `target` is expected. It is evaluated target-first and is
//! not symmetric: `float` accepts `int`, `int` does not accept `float`.
//! Callers run the reverse check themselves to tell an unchecked narrowing
//! apart from an illegal assignment.
//!
//! Class types need the inheritance graph, which is supplied through
//! [`TypeHierarchy`] so the rules can be exercised without a full pipeline.

use brscript_core::{ClassKey, DataType, TypeKind, VariantType};
use brscript_registry::ClassRegistry;

/// Outcome of a compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    /// Accepted, with the check deferred to runtime (an untyped container
    /// stored into a typed one).
    Unsafe,
    Incompatible,
}

impl Compatibility {
    pub fn is_compatible(&self) -> bool {
        !matches!(self, Compatibility::Incompatible)
    }
}

/// A check ran into the currently-resolving sentinel: the class whose
/// base is still being resolved, or `None` when a compared type is the
/// sentinel itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvingBase(pub Option<ClassKey>);

/// The parent relation of a script class.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptParent {
    Script(ClassKey),
    Native(String),
    Resolving,
    Unknown,
}

/// Class relations consulted by [`is_type_compatible`].
pub trait TypeHierarchy {
    /// `class` is `ancestor` or inherits from it.
    fn is_native_parent(&mut self, class: &str, ancestor: &str) -> bool;

    fn script_parent(&mut self, key: &ClassKey) -> ScriptParent;
}

/// Hierarchy backed by the host registry alone; script classes only know
/// themselves.
pub struct RegistryHierarchy<'a>(pub &'a dyn ClassRegistry);

impl TypeHierarchy for RegistryHierarchy<'_> {
    fn is_native_parent(&mut self, class: &str, ancestor: &str) -> bool {
        class == ancestor || self.0.is_parent_class(class, ancestor)
    }

    fn script_parent(&mut self, _key: &ClassKey) -> ScriptParent {
        ScriptParent::Unknown
    }
}

/// Whether a `source` value may be stored where `target` is expected.
pub fn is_type_compatible(
    target: &DataType,
    source: &DataType,
    hierarchy: &mut dyn TypeHierarchy,
) -> Result<Compatibility, ResolvingBase> {
    use Compatibility::*;

    if target.is_resolving() || source.is_resolving() {
        return Err(ResolvingBase(None));
    }
    if target.is_variant() || !target.is_set() {
        return Ok(Compatible);
    }
    if source.is_variant() || !source.is_set() {
        return Ok(Unsafe);
    }
    if target.is_meta != source.is_meta {
        return Ok(Incompatible);
    }

    let verdict = |ok: bool| if ok { Compatible } else { Incompatible };

    match &target.kind {
        TypeKind::Variant => Ok(Compatible),
        TypeKind::Builtin { ty, elements } => match &source.kind {
            TypeKind::Builtin {
                ty: source_ty,
                elements: source_elements,
            } => {
                if ty == source_ty {
                    if elements.is_empty() || *elements == *source_elements {
                        Ok(Compatible)
                    } else if source_elements.is_empty() {
                        Ok(Unsafe)
                    } else {
                        Ok(Incompatible)
                    }
                } else {
                    Ok(verdict(source_ty.converts_implicitly_to(*ty)))
                }
            }
            TypeKind::Enum { .. } => Ok(verdict(*ty == VariantType::Int)),
            _ => Ok(Incompatible),
        },
        TypeKind::Enum { .. } => match &source.kind {
            TypeKind::Builtin {
                ty: VariantType::Int,
                ..
            } => Ok(Compatible),
            TypeKind::Enum { .. } => Ok(verdict(target == source)),
            _ => Ok(Incompatible),
        },
        TypeKind::Native { class } => match &source.kind {
            TypeKind::Builtin {
                ty: VariantType::Nil,
                ..
            } => Ok(Compatible),
            TypeKind::Native { class: source_class } => {
                Ok(verdict(hierarchy.is_native_parent(source_class, class)))
            }
            TypeKind::Class(key) => {
                let mut current = key.clone();
                let mut steps = 0;
                loop {
                    steps += 1;
                    if steps > 256 {
                        return Ok(Incompatible);
                    }
                    match hierarchy.script_parent(&current) {
                        ScriptParent::Script(next) => current = next,
                        ScriptParent::Native(native) => {
                            return Ok(verdict(hierarchy.is_native_parent(&native, class)));
                        }
                        ScriptParent::Resolving => return Err(ResolvingBase(Some(current))),
                        ScriptParent::Unknown => return Ok(Incompatible),
                    }
                }
            }
            _ => Ok(Incompatible),
        },
        TypeKind::Class(target_key) => match &source.kind {
            TypeKind::Builtin {
                ty: VariantType::Nil,
                ..
            } => Ok(Compatible),
            TypeKind::Class(key) => {
                let mut current = key.clone();
                let mut steps = 0;
                loop {
                    if current == *target_key {
                        return Ok(Compatible);
                    }
                    steps += 1;
                    if steps > 256 {
                        return Ok(Incompatible);
                    }
                    match hierarchy.script_parent(&current) {
                        ScriptParent::Script(next) => current = next,
                        ScriptParent::Resolving => return Err(ResolvingBase(Some(current))),
                        ScriptParent::Native(_) | ScriptParent::Unknown => {
                            return Ok(Incompatible);
                        }
                    }
                }
            }
            _ => Ok(Incompatible),
        },
        TypeKind::Unresolved => Ok(Compatible),
        TypeKind::Resolving => Err(ResolvingBase(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brscript_core::EnumValues;
    use rustc_hash::FxHashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeHierarchy {
        natives: FxHashMap<&'static str, &'static str>,
        scripts: FxHashMap<ClassKey, ScriptParent>,
    }

    impl TypeHierarchy for FakeHierarchy {
        fn is_native_parent(&mut self, class: &str, ancestor: &str) -> bool {
            let mut current = class;
            loop {
                if current == ancestor {
                    return true;
                }
                match self.natives.get(current) {
                    Some(parent) => current = parent,
                    None => return false,
                }
            }
        }

        fn script_parent(&mut self, key: &ClassKey) -> ScriptParent {
            self.scripts.get(key).cloned().unwrap_or(ScriptParent::Unknown)
        }
    }

    fn key(name: &str) -> ClassKey {
        let path = format!("res://{}.br", name.to_lowercase());
        ClassKey::new(&path, &path, name, 0)
    }

    fn hierarchy() -> FakeHierarchy {
        let mut h = FakeHierarchy::default();
        h.natives.insert("RefCounted", "Object");
        h.natives.insert("Node", "Object");
        h.scripts.insert(key("A"), ScriptParent::Native("Node".into()));
        h.scripts.insert(key("B"), ScriptParent::Script(key("A")));
        h
    }

    fn check(target: &DataType, source: &DataType) -> Compatibility {
        is_type_compatible(target, source, &mut hierarchy()).unwrap()
    }

    #[test]
    fn reflexive() {
        let types = [
            DataType::builtin(VariantType::Int),
            DataType::builtin(VariantType::String),
            DataType::typed_array(DataType::builtin(VariantType::Int)),
            DataType::native("Node"),
            DataType::class(key("B")),
            DataType::class(key("A")).meta(),
            DataType::enumeration("E", "res://a.br", Arc::new(EnumValues::default())),
        ];
        for ty in &types {
            assert_eq!(check(ty, ty), Compatibility::Compatible, "{}", ty);
        }
    }

    #[test]
    fn numeric_widening_is_one_way() {
        let int = DataType::builtin(VariantType::Int);
        let float = DataType::builtin(VariantType::Float);
        assert_eq!(check(&float, &int), Compatibility::Compatible);
        assert_eq!(check(&int, &float), Compatibility::Incompatible);
    }

    #[test]
    fn enums_accept_int() {
        let e = DataType::enumeration("E", "res://a.br", Arc::new(EnumValues::default()));
        let other = DataType::enumeration("F", "res://a.br", Arc::new(EnumValues::default()));
        assert_eq!(check(&e, &DataType::builtin(VariantType::Int)), Compatibility::Compatible);
        assert_eq!(check(&e, &other), Compatibility::Incompatible);
        assert_eq!(check(&DataType::builtin(VariantType::Int), &e), Compatibility::Compatible);
    }

    #[test]
    fn script_classes_follow_their_chain() {
        let a = DataType::class(key("A"));
        let b = DataType::class(key("B"));
        assert_eq!(check(&a, &b), Compatibility::Compatible);
        assert_eq!(check(&b, &a), Compatibility::Incompatible);
        assert_eq!(check(&DataType::native("Node"), &b), Compatibility::Compatible);
        assert_eq!(check(&DataType::native("Object"), &b), Compatibility::Compatible);
        assert_eq!(check(&DataType::native("RefCounted"), &b), Compatibility::Incompatible);
        assert_eq!(check(&b, &DataType::nil()), Compatibility::Compatible);
    }

    #[test]
    fn meta_only_matches_meta() {
        let a = DataType::class(key("A"));
        assert_eq!(check(&a, &a.clone().meta()), Compatibility::Incompatible);
        assert_eq!(
            check(&a.clone().meta(), &DataType::class(key("B")).meta()),
            Compatibility::Compatible
        );
    }

    #[test]
    fn untyped_arrays_are_unsafe_for_typed_targets() {
        let typed = DataType::typed_array(DataType::builtin(VariantType::Int));
        let untyped = DataType::builtin(VariantType::Array);
        let strings = DataType::typed_array(DataType::builtin(VariantType::String));
        assert_eq!(check(&typed, &untyped), Compatibility::Unsafe);
        assert_eq!(check(&untyped, &typed), Compatibility::Compatible);
        assert_eq!(check(&typed, &strings), Compatibility::Incompatible);
    }

    #[test]
    fn resolving_base_is_reported() {
        let mut h = hierarchy();
        h.scripts.insert(key("C"), ScriptParent::Resolving);
        let result = is_type_compatible(
            &DataType::class(key("A")),
            &DataType::class(key("C")),
            &mut h,
        );
        assert_eq!(result, Err(ResolvingBase(Some(key("C")))));
    }

    #[test]
    fn resolving_sentinel_is_never_compatible() {
        let mut h = hierarchy();
        let int = DataType::builtin(VariantType::Int);
        assert_eq!(
            is_type_compatible(&DataType::resolving(), &int, &mut h),
            Err(ResolvingBase(None))
        );
        assert_eq!(
            is_type_compatible(&int, &DataType::resolving(), &mut h),
            Err(ResolvingBase(None))
        );
        assert_eq!(
            is_type_compatible(&DataType::variant(), &DataType::resolving(), &mut h),
            Err(ResolvingBase(None))
        );
    }

    #[test]
    fn variant_source_is_unsafe() {
        assert_eq!(
            check(&DataType::builtin(VariantType::Int), &DataType::variant()),
            Compatibility::Unsafe
        );
        assert_eq!(
            check(&DataType::variant(), &DataType::builtin(VariantType::Int)),
            Compatibility::Compatible
        );
    }
}
