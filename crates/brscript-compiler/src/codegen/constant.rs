//! Constant pool of a compiled function.
//!
//! The pool stores values that instructions reference through
//! [`Address::Constant`](super::Address::Constant) or by index: folded
//! values, member and method names, type descriptors and class references.

use brscript_core::{ClassKey, DataType, Variant};
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

/// Values stored in the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// A folded or literal value.
    Value(Variant),
    /// Member, method or global name used for dispatch by name.
    Name(String),
    /// Target type of typed assignments, casts and type tests.
    Type(DataType),
    /// A script class; the runtime resolves it to the loaded script.
    Class(ClassKey),
    /// A native class of the host.
    NativeClass(String),
}

impl Constant {
    pub fn as_value(&self) -> Option<&Variant> {
        match self {
            Constant::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Constant::Name(name) | Constant::NativeClass(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&DataType> {
        match self {
            Constant::Type(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Key for constant deduplication (hashable version of Constant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    StringName(String),
    Vector2(OrderedFloat<f64>, OrderedFloat<f64>),
    Vector3(OrderedFloat<f64>, OrderedFloat<f64>, OrderedFloat<f64>),
    Name(String),
    Type(String),
    Class(ClassKey),
    NativeClass(String),
}

/// Per-function constant pool with deduplication.
///
/// Containers, objects and callables are never deduplicated: each occurrence
/// gets its own entry.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: FxHashMap<ConstantKey, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or get existing constant, returns index.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = Self::to_key(&constant);
        if let Some(key) = &key {
            if let Some(&idx) = self.index.get(key) {
                return idx;
            }
        }

        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        if let Some(key) = key {
            self.index.insert(key, idx);
        }
        idx
    }

    pub fn add_value(&mut self, value: Variant) -> u32 {
        self.add(Constant::Value(value))
    }

    pub fn add_name(&mut self, name: impl Into<String>) -> u32 {
        self.add(Constant::Name(name.into()))
    }

    pub fn add_type(&mut self, data_type: DataType) -> u32 {
        self.add(Constant::Type(data_type))
    }

    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    fn to_key(constant: &Constant) -> Option<ConstantKey> {
        let key = match constant {
            Constant::Value(value) => match value {
                Variant::Nil => ConstantKey::Nil,
                Variant::Bool(b) => ConstantKey::Bool(*b),
                Variant::Int(i) => ConstantKey::Int(*i),
                Variant::Float(f) => ConstantKey::Float(OrderedFloat(*f)),
                Variant::String(s) => ConstantKey::String(s.clone()),
                Variant::StringName(s) => ConstantKey::StringName(s.clone()),
                Variant::Vector2(x, y) => ConstantKey::Vector2(OrderedFloat(*x), OrderedFloat(*y)),
                Variant::Vector3(x, y, z) => {
                    ConstantKey::Vector3(OrderedFloat(*x), OrderedFloat(*y), OrderedFloat(*z))
                }
                _ => return None,
            },
            Constant::Name(name) => ConstantKey::Name(name.clone()),
            Constant::Type(ty) => ConstantKey::Type(format!("{:?}", ty)),
            Constant::Class(key) => ConstantKey::Class(key.clone()),
            Constant::NativeClass(name) => ConstantKey::NativeClass(name.clone()),
        };
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brscript_core::{Array, VariantType};

    #[test]
    fn new_pool_is_empty() {
        let pool = ConstantPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.get(0), None);
    }

    #[test]
    fn deduplication() {
        let mut pool = ConstantPool::new();
        let a = pool.add_value(Variant::Int(100));
        let b = pool.add_value(Variant::Int(200));
        let c = pool.add_value(Variant::Int(100));
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn floats_deduplicate_by_value() {
        let mut pool = ConstantPool::new();
        let a = pool.add_value(Variant::Float(1.5));
        let b = pool.add_value(Variant::Float(1.5));
        let c = pool.add_value(Variant::Float(f64::NAN));
        let d = pool.add_value(Variant::Float(f64::NAN));
        assert_eq!(a, b);
        assert_eq!(c, d);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn names_and_values_do_not_collide() {
        let mut pool = ConstantPool::new();
        let value = pool.add_value(Variant::String("hp".into()));
        let name = pool.add_name("hp");
        assert_ne!(value, name);
        assert_eq!(pool.get(name).and_then(Constant::as_name), Some("hp"));
    }

    #[test]
    fn containers_are_not_shared() {
        let mut pool = ConstantPool::new();
        let a = pool.add_value(Variant::Array(Array::new()));
        let b = pool.add_value(Variant::Array(Array::new()));
        assert_ne!(a, b);
    }

    #[test]
    fn types_deduplicate() {
        let mut pool = ConstantPool::new();
        let a = pool.add_type(DataType::builtin(VariantType::Int).hard());
        let b = pool.add_type(DataType::builtin(VariantType::Int).hard());
        let c = pool.add_type(DataType::typed_array(DataType::builtin(VariantType::Int)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(pool.get(c).and_then(Constant::as_type).is_some());
    }
}
