//! Configuration consumed by the cache, analyzer and runtime.

use rustc_hash::FxHashMap;

use crate::{WarningCode, WarningLevel};

/// Numeric/boolean settings with documented defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptProperty {
    /// Whether warnings are reported at all.
    WarningsEnabled,
    /// Keep instance state when reloading all scripts from the language.
    KeepStateOnReload,
    /// Call depth hint forwarded to the executor.
    MaxCallDepth,
    /// Treat every reported warning as an error.
    WarningsAsErrors,
}

impl ScriptProperty {
    pub fn default_value(&self) -> usize {
        match self {
            ScriptProperty::WarningsEnabled => 1,
            ScriptProperty::KeepStateOnReload => 1,
            ScriptProperty::MaxCallDepth => 1024,
            ScriptProperty::WarningsAsErrors => 0,
        }
    }
}

/// Settings passed explicitly to every pipeline stage.
#[derive(Debug, Clone)]
pub struct ScriptSettings {
    properties: FxHashMap<ScriptProperty, usize>,
    warning_levels: FxHashMap<WarningCode, WarningLevel>,
    /// Native class used when a script has no `extends`.
    pub default_base_class: String,
    /// Extension of source files, without the dot.
    pub source_extension: String,
    /// Extension of pre-tokenized files, without the dot.
    pub binary_extension: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            properties: FxHashMap::default(),
            warning_levels: FxHashMap::default(),
            default_base_class: "RefCounted".to_string(),
            source_extension: "br".to_string(),
            binary_extension: "brc".to_string(),
        }
    }
}

impl ScriptSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(&self, property: ScriptProperty) -> usize {
        self.properties
            .get(&property)
            .copied()
            .unwrap_or_else(|| property.default_value())
    }

    pub fn set_property(&mut self, property: ScriptProperty, value: usize) -> &mut Self {
        self.properties.insert(property, value);
        self
    }

    pub fn warnings_enabled(&self) -> bool {
        self.property(ScriptProperty::WarningsEnabled) != 0
    }

    pub fn max_call_depth(&self) -> usize {
        self.property(ScriptProperty::MaxCallDepth)
    }

    pub fn keep_state_on_reload(&self) -> bool {
        self.property(ScriptProperty::KeepStateOnReload) != 0
    }

    /// Override the level of one warning code.
    pub fn set_warning_level(&mut self, code: WarningCode, level: WarningLevel) -> &mut Self {
        self.warning_levels.insert(code, level);
        self
    }

    /// Effective level of a warning code after overrides.
    pub fn warning_level(&self, code: WarningCode) -> WarningLevel {
        if !self.warnings_enabled() {
            return WarningLevel::Ignore;
        }
        let level = self
            .warning_levels
            .get(&code)
            .copied()
            .unwrap_or_else(|| code.default_level());
        if level == WarningLevel::Warn && self.property(ScriptProperty::WarningsAsErrors) != 0 {
            WarningLevel::Error
        } else {
            level
        }
    }

    /// Whether `path` names a pre-tokenized binary script.
    pub fn is_binary_path(&self, path: &str) -> bool {
        path.rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(&self.binary_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = ScriptSettings::default();
        assert!(settings.warnings_enabled());
        assert_eq!(settings.max_call_depth(), 1024);
        assert_eq!(settings.default_base_class, "RefCounted");
        assert_eq!(
            settings.warning_level(WarningCode::UnsafeMethodAccess),
            WarningLevel::Ignore
        );
        assert_eq!(
            settings.warning_level(WarningCode::StaticCalledOnInstance),
            WarningLevel::Warn
        );
    }

    #[test]
    fn overrides_and_disable() {
        let mut settings = ScriptSettings::default();
        settings.set_warning_level(WarningCode::UnsafeMethodAccess, WarningLevel::Warn);
        assert_eq!(
            settings.warning_level(WarningCode::UnsafeMethodAccess),
            WarningLevel::Warn
        );

        settings.set_property(ScriptProperty::WarningsAsErrors, 1);
        assert_eq!(
            settings.warning_level(WarningCode::UnsafeMethodAccess),
            WarningLevel::Error
        );

        settings.set_property(ScriptProperty::WarningsEnabled, 0);
        assert_eq!(
            settings.warning_level(WarningCode::UnusedVariable),
            WarningLevel::Ignore
        );
    }

    #[test]
    fn binary_extension_detection() {
        let settings = ScriptSettings::default();
        assert!(settings.is_binary_path("res://player.brc"));
        assert!(!settings.is_binary_path("res://player.br"));
        assert!(!settings.is_binary_path("res://README"));
    }
}
