//! Reflective descriptors shared by the host registry and the script layer.

use bitflags::bitflags;

use crate::{DataType, TypeKind, VariantType};

bitflags! {
    /// Method qualifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const NORMAL = 1 << 0;
        const STATIC = 1 << 1;
        const VIRTUAL = 1 << 2;
        const CONST = 1 << 3;
        const VARARG = 1 << 4;
        const COROUTINE = 1 << 5;
    }
}

bitflags! {
    /// How a property is exposed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyUsage: u32 {
        const STORAGE = 1 << 1;
        const EDITOR = 1 << 2;
        const SCRIPT_VARIABLE = 1 << 12;
        const CATEGORY = 1 << 7;
        const GROUP = 1 << 6;
        const DEFAULT = Self::STORAGE.bits() | Self::EDITOR.bits();
    }
}

bitflags! {
    /// Which dispatch overrides a script class defines.
    ///
    /// Computed once during interface resolution so the runtime never looks
    /// up these names by string on the hot path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassCapabilities: u32 {
        const HAS_INIT = 1 << 0;
        const HAS_STATIC_INIT = 1 << 1;
        const HAS_GET = 1 << 2;
        const HAS_SET = 1 << 3;
        const HAS_GET_PROPERTY_LIST = 1 << 4;
        const HAS_NOTIFICATION = 1 << 5;
        const HAS_TO_STRING = 1 << 6;
    }
}

impl ClassCapabilities {
    /// Capability implied by a method name, if any.
    pub fn for_method(name: &str) -> ClassCapabilities {
        match name {
            "_init" => ClassCapabilities::HAS_INIT,
            "_static_init" => ClassCapabilities::HAS_STATIC_INIT,
            "_get" => ClassCapabilities::HAS_GET,
            "_set" => ClassCapabilities::HAS_SET,
            "_get_property_list" => ClassCapabilities::HAS_GET_PROPERTY_LIST,
            "_notification" => ClassCapabilities::HAS_NOTIFICATION,
            "_to_string" => ClassCapabilities::HAS_TO_STRING,
            _ => ClassCapabilities::empty(),
        }
    }
}

/// Reflective description of a property, argument or return value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: VariantType,
    /// Class or enum name for object and enum typed entries.
    pub class_name: String,
    pub usage: PropertyUsage,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, ty: VariantType) -> Self {
        Self {
            name: name.into(),
            ty,
            class_name: String::new(),
            usage: PropertyUsage::DEFAULT,
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_usage(mut self, usage: PropertyUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Describe a value of `data_type` named `name`.
    pub fn from_data_type(name: impl Into<String>, data_type: &DataType) -> Self {
        let ty = data_type.variant_type().unwrap_or(VariantType::Nil);
        let class_name = match &data_type.kind {
            TypeKind::Native { class } => class.clone(),
            TypeKind::Class(key) => key.name.to_string(),
            TypeKind::Enum { name, .. } => name.clone(),
            _ => String::new(),
        };
        Self {
            name: name.into(),
            ty,
            class_name,
            usage: PropertyUsage::DEFAULT,
        }
    }
}

/// Reflective description of a method or signal.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub arguments: Vec<PropertyInfo>,
    /// Number of trailing arguments with defaults.
    pub default_argument_count: usize,
    pub return_value: PropertyInfo,
    pub flags: MethodFlags,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            default_argument_count: 0,
            return_value: PropertyInfo::new("", VariantType::Nil),
            flags: MethodFlags::NORMAL,
        }
    }

    pub fn with_argument(mut self, argument: PropertyInfo) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_return(mut self, return_value: PropertyInfo) -> Self {
        self.return_value = return_value;
        self
    }

    pub fn with_defaults(mut self, count: usize) -> Self {
        self.default_argument_count = count;
        self
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    pub fn is_vararg(&self) -> bool {
        self.flags.contains(MethodFlags::VARARG)
    }

    /// Minimum number of arguments a call needs.
    pub fn min_arguments(&self) -> usize {
        self.arguments.len().saturating_sub(self.default_argument_count)
    }

    /// Whether `count` arguments are acceptable.
    pub fn accepts_argument_count(&self, count: usize) -> bool {
        count >= self.min_arguments() && (self.is_vararg() || count <= self.arguments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_count_with_defaults() {
        let info = MethodInfo::new("f")
            .with_argument(PropertyInfo::new("a", VariantType::Int))
            .with_argument(PropertyInfo::new("b", VariantType::Int))
            .with_defaults(1);
        assert!(!info.accepts_argument_count(0));
        assert!(info.accepts_argument_count(1));
        assert!(info.accepts_argument_count(2));
        assert!(!info.accepts_argument_count(3));
    }

    #[test]
    fn capabilities_by_name() {
        assert_eq!(ClassCapabilities::for_method("_get"), ClassCapabilities::HAS_GET);
        assert!(ClassCapabilities::for_method("update").is_empty());
    }

    #[test]
    fn property_info_from_class_type() {
        let info = PropertyInfo::from_data_type("target", &DataType::native("Node"));
        assert_eq!(info.ty, VariantType::Object);
        assert_eq!(info.class_name, "Node");
    }
}
