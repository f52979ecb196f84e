//! Accumulated diagnostics reported by the analyzer.
//!
//! Resolution and type errors do not stop analysis of the surrounding
//! expression; they are collected here and make the pass fail at the end.
//! Warnings use the same channel with [`Severity::Warning`].

use std::fmt;

use crate::{ResolutionError, Span, TypeError};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Reporting level configured for a warning code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningLevel {
    /// The warning is not reported.
    Ignore,
    /// Reported as a warning.
    Warn,
    /// Reported as an error and fails the pass.
    Error,
}

/// Stable codes for analyzer warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WarningCode {
    UnusedVariable,
    UnusedLocalConstant,
    UnusedParameter,
    ShadowedVariable,
    ShadowedVariableBaseClass,
    UnreachableCode,
    StandaloneExpression,
    NarrowingConversion,
    IntegerDivision,
    UnsafePropertyAccess,
    UnsafeMethodAccess,
    UnsafeCast,
    UnsafeCallArgument,
    StaticCalledOnInstance,
    ReturnValueDiscarded,
    IntAsEnumWithoutCast,
    InferenceOnVariant,
    ConfusableLocalDeclaration,
}

impl WarningCode {
    /// All codes, in declaration order.
    pub const ALL: &'static [WarningCode] = &[
        WarningCode::UnusedVariable,
        WarningCode::UnusedLocalConstant,
        WarningCode::UnusedParameter,
        WarningCode::ShadowedVariable,
        WarningCode::ShadowedVariableBaseClass,
        WarningCode::UnreachableCode,
        WarningCode::StandaloneExpression,
        WarningCode::NarrowingConversion,
        WarningCode::IntegerDivision,
        WarningCode::UnsafePropertyAccess,
        WarningCode::UnsafeMethodAccess,
        WarningCode::UnsafeCast,
        WarningCode::UnsafeCallArgument,
        WarningCode::StaticCalledOnInstance,
        WarningCode::ReturnValueDiscarded,
        WarningCode::IntAsEnumWithoutCast,
        WarningCode::InferenceOnVariant,
        WarningCode::ConfusableLocalDeclaration,
    ];

    /// Upper-case name used in settings and messages.
    pub fn name(&self) -> &'static str {
        match self {
            WarningCode::UnusedVariable => "UNUSED_VARIABLE",
            WarningCode::UnusedLocalConstant => "UNUSED_LOCAL_CONSTANT",
            WarningCode::UnusedParameter => "UNUSED_PARAMETER",
            WarningCode::ShadowedVariable => "SHADOWED_VARIABLE",
            WarningCode::ShadowedVariableBaseClass => "SHADOWED_VARIABLE_BASE_CLASS",
            WarningCode::UnreachableCode => "UNREACHABLE_CODE",
            WarningCode::StandaloneExpression => "STANDALONE_EXPRESSION",
            WarningCode::NarrowingConversion => "NARROWING_CONVERSION",
            WarningCode::IntegerDivision => "INTEGER_DIVISION",
            WarningCode::UnsafePropertyAccess => "UNSAFE_PROPERTY_ACCESS",
            WarningCode::UnsafeMethodAccess => "UNSAFE_METHOD_ACCESS",
            WarningCode::UnsafeCast => "UNSAFE_CAST",
            WarningCode::UnsafeCallArgument => "UNSAFE_CALL_ARGUMENT",
            WarningCode::StaticCalledOnInstance => "STATIC_CALLED_ON_INSTANCE",
            WarningCode::ReturnValueDiscarded => "RETURN_VALUE_DISCARDED",
            WarningCode::IntAsEnumWithoutCast => "INT_AS_ENUM_WITHOUT_CAST",
            WarningCode::InferenceOnVariant => "INFERENCE_ON_VARIANT",
            WarningCode::ConfusableLocalDeclaration => "CONFUSABLE_LOCAL_DECLARATION",
        }
    }

    /// Look a code up by its upper-case name.
    pub fn from_name(name: &str) -> Option<WarningCode> {
        Self::ALL.iter().copied().find(|code| code.name() == name)
    }

    /// Level used when settings do not override it.
    ///
    /// The unsafe-access family is opt-in since it fires on every untyped
    /// access.
    pub fn default_level(&self) -> WarningLevel {
        match self {
            WarningCode::UnsafePropertyAccess
            | WarningCode::UnsafeMethodAccess
            | WarningCode::UnsafeCast
            | WarningCode::UnsafeCallArgument
            | WarningCode::ReturnValueDiscarded => WarningLevel::Ignore,
            _ => WarningLevel::Warn,
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a diagnostic reports.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// Reported by the external parser.
    Syntax { message: String },
    /// Name, inheritance or member resolution failure.
    Resolution(ResolutionError),
    /// Type checking failure.
    Type(TypeError),
    /// Advisory diagnostic with a stable code.
    Warning { code: WarningCode, message: String },
}

/// One diagnostic with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub span: Span,
}

impl Diagnostic {
    /// A syntax error forwarded from the parser.
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            kind: DiagnosticKind::Syntax {
                message: message.into(),
            },
            span,
        }
    }

    /// A warning at the given level. `Error` level promotes it to an error.
    pub fn warning(code: WarningCode, level: WarningLevel, message: impl Into<String>, span: Span) -> Self {
        let severity = match level {
            WarningLevel::Error => Severity::Error,
            _ => Severity::Warning,
        };
        Self {
            severity,
            kind: DiagnosticKind::Warning {
                code,
                message: message.into(),
            },
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// The warning code, if this is a warning.
    pub fn warning_code(&self) -> Option<WarningCode> {
        match &self.kind {
            DiagnosticKind::Warning { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The resolution error, if this is one.
    pub fn as_resolution(&self) -> Option<&ResolutionError> {
        match &self.kind {
            DiagnosticKind::Resolution(err) => Some(err),
            _ => None,
        }
    }

    /// The type error, if this is one.
    pub fn as_type_error(&self) -> Option<&TypeError> {
        match &self.kind {
            DiagnosticKind::Type(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResolutionError> for Diagnostic {
    fn from(err: ResolutionError) -> Self {
        Self {
            severity: Severity::Error,
            span: err.span(),
            kind: DiagnosticKind::Resolution(err),
        }
    }
}

impl From<TypeError> for Diagnostic {
    fn from(err: TypeError) -> Self {
        Self {
            severity: Severity::Error,
            span: err.span(),
            kind: DiagnosticKind::Type(err),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Syntax { message } => {
                write!(f, "{} at {}: {}", self.severity, self.span, message)
            }
            DiagnosticKind::Resolution(err) => write!(f, "{} {}", self.severity, err),
            DiagnosticKind::Type(err) => write!(f, "{} {}", self.severity, err),
            DiagnosticKind::Warning { code, message } => {
                write!(f, "{} at {}: {} ({})", self.severity, self.span, message, code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_names_round_trip() {
        for code in WarningCode::ALL {
            assert_eq!(WarningCode::from_name(code.name()), Some(*code));
        }
    }

    #[test]
    fn error_level_promotes_warning() {
        let diag = Diagnostic::warning(
            WarningCode::UnusedVariable,
            WarningLevel::Error,
            "unused",
            Span::new(2, 1, 3),
        );
        assert!(diag.is_error());
        assert_eq!(diag.warning_code(), Some(WarningCode::UnusedVariable));
    }

    #[test]
    fn display_includes_code() {
        let diag = Diagnostic::warning(
            WarningCode::StaticCalledOnInstance,
            WarningLevel::Warn,
            "static function called on an instance",
            Span::new(7, 5, 4),
        );
        assert_eq!(
            diag.to_string(),
            "warning at 7:5: static function called on an instance (STATIC_CALLED_ON_INSTANCE)"
        );
    }
}
