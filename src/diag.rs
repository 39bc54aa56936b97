//! Structured diagnostic collection (§4.2, taxonomy in §7).

use crate::source::{Coordinates, LineIndex};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One argument substituted into a diagnostic's message template.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagArg {
    Str(String),
    Int(i64),
}

impl fmt::Display for DiagArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagArg::Str(s) => write!(f, "{s}"),
            DiagArg::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for DiagArg {
    fn from(s: &str) -> Self {
        DiagArg::Str(s.to_string())
    }
}
impl From<String> for DiagArg {
    fn from(s: String) -> Self {
        DiagArg::Str(s)
    }
}
impl From<i64> for DiagArg {
    fn from(v: i64) -> Self {
        DiagArg::Int(v)
    }
}

/// The fixed diagnostic taxonomy (§7), grouped by the category header used
/// there. Each variant names the condition, not a generic "error N".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    // Lexical
    UnterminatedString,
    UnterminatedComment,
    InvalidCharacter,
    // Syntactic
    UnexpectedToken,
    ExpectedToken,
    ExpectedIdentifier,
    ExpectedSemicolon,
    DeclaresNothing,
    IdAlreadySpecified,
    // Declaration
    DuplicateDeclSpecifier,
    ConflictingDeclSpecifier,
    InvalidStorageClass,
    MissingTypeSpecifier,
    RestrictOnNonPointer,
    TypedefWithoutName,
    ExternVariableInitialization,
    // Type
    UnknownTypeName,
    IllTypedSignCombination,
    InvalidTypeComposition,
    SizeOfIncompleteType,
    NonIntegerArraySize,
    BitfieldWidthInvalid,
    BitfieldTypeInvalid,
    FieldNonConstantSize,
    VlaAtFileScope,
    VlaWithStaticDuration,
    // Reference
    UndeclaredIdentifier,
    UseWithDifferentTag,
    Redefinition,
    LabelRedefinition,
    UndeclaredLabel,
    // Control flow
    SwitchLabelOutsideSwitch,
    BreakOutsideLoopOrSwitch,
    ContinueOutsideLoop,
    NonIntegerSwitchArgument,
    DuplicateCase,
    MultipleDefault,
    // Evaluation
    ExpectedConstantExpression,
    ExpectedIntegerConstantExpression,
    ArrayDesignatorNegative,
    FieldDesignatorOnNonStruct,
    // Conversion
    IncompatibleAssignment,
    IncompatibleCast,
    RefOfBitfield,
    RefOfRegister,
    // Function
    FirstVaArgNotVaList,
    VoidParameterWithOthers,
    UnboundVlaInDefinition,
    ParameterBeforeEllipsis,
    // Meta
    TypedefRedefinition,
    ConflictingTypes,
}

impl DiagKind {
    /// Default severity; most kinds are errors, a handful are warnings
    /// (pointer/integer mismatches the original treats as `NOT_EXACTLY_EQUAL`).
    #[must_use]
    pub fn default_severity(self) -> Severity {
        match self {
            DiagKind::RefOfRegister => Severity::Warning,
            _ => Severity::Error,
        }
    }

    #[must_use]
    pub fn message_template(self) -> &'static str {
        use DiagKind::*;
        match self {
            UnterminatedString => "unterminated string literal",
            UnterminatedComment => "unterminated comment",
            InvalidCharacter => "invalid character {0}",
            UnexpectedToken => "unexpected token {0}",
            ExpectedToken => "expected {0}, got {1}",
            ExpectedIdentifier => "expected identifier, got {0}",
            ExpectedSemicolon => "expected ';', got {0}",
            DeclaresNothing => "declaration declares nothing",
            IdAlreadySpecified => "'{0}' specified more than once",
            DuplicateDeclSpecifier => "duplicate '{0}'",
            ConflictingDeclSpecifier => "conflicting declaration specifiers: '{0}' and '{1}'",
            InvalidStorageClass => "storage class '{0}' is not valid here",
            MissingTypeSpecifier => "type specifier missing, defaults to 'int'",
            RestrictOnNonPointer => "'restrict' applied to non-pointer type",
            TypedefWithoutName => "typedef requires a name",
            ExternVariableInitialization => "'extern' variable cannot have an initializer",
            UnknownTypeName => "unknown type name '{0}'",
            IllTypedSignCombination => "invalid combination of type specifiers",
            InvalidTypeComposition => "cannot form type: {0}",
            SizeOfIncompleteType => "sizeof applied to incomplete type '{0}'",
            NonIntegerArraySize => "array size must have integer type",
            BitfieldWidthInvalid => "bit-field width {0} is invalid",
            BitfieldTypeInvalid => "bit-field type '{0}' is invalid",
            FieldNonConstantSize => "field size must be a constant expression",
            VlaAtFileScope => "variable-length array declared at file scope",
            VlaWithStaticDuration => "variable-length array declared with static storage duration",
            UndeclaredIdentifier => "use of undeclared identifier '{0}'",
            UseWithDifferentTag => "'{0}' used with a tag different from its declaration",
            Redefinition => "redefinition of '{0}'",
            LabelRedefinition => "redefinition of label '{0}'",
            UndeclaredLabel => "use of undeclared label '{0}'",
            SwitchLabelOutsideSwitch => "case/default label not within a switch",
            BreakOutsideLoopOrSwitch => "'break' not within a loop or switch",
            ContinueOutsideLoop => "'continue' not within a loop",
            NonIntegerSwitchArgument => "switch condition must have integer type",
            DuplicateCase => "duplicate case value {0}",
            MultipleDefault => "multiple default labels in one switch",
            ExpectedConstantExpression => "expected a constant expression",
            ExpectedIntegerConstantExpression => "expected an integer constant expression",
            ArrayDesignatorNegative => "array designator index is negative",
            FieldDesignatorOnNonStruct => "field designator used on non-struct/union type",
            IncompatibleAssignment => "incompatible types assigning '{0}' to '{1}'",
            IncompatibleCast => "cannot cast '{0}' to '{1}'",
            RefOfBitfield => "cannot take the address of a bit-field",
            RefOfRegister => "cannot take the address of a 'register' variable",
            FirstVaArgNotVaList => "first argument to va_arg-style access must be va_list",
            VoidParameterWithOthers => "'void' must be the only parameter",
            UnboundVlaInDefinition => "variable-length array parameter requires a bound in a definition",
            ParameterBeforeEllipsis => "named parameter must precede '...'",
            TypedefRedefinition => "typedef redefinition of '{0}' with a different type",
            ConflictingTypes => "conflicting types for '{0}'",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub coords: Coordinates,
    pub args: Vec<DiagArg>,
}

impl Diagnostic {
    /// Render the message template with `args` substituted positionally
    /// (`{0}`, `{1}`, ...).
    #[must_use]
    pub fn rendered_message(&self) -> String {
        let mut out = String::new();
        let template = self.kind.message_template();
        let mut chars = template.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '{' {
                if let Some(end) = template[i..].find('}') {
                    let idx_str = &template[i + 1..i + end];
                    if let Ok(idx) = idx_str.parse::<usize>() {
                        if let Some(arg) = self.args.get(idx) {
                            out.push_str(&arg.to_string());
                        }
                        for _ in 0..end {
                            chars.next();
                        }
                        continue;
                    }
                }
            }
            out.push(c);
        }
        out
    }
}

/// Appends diagnostics in encounter order; never removes or reorders them.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, kind: DiagKind, coords: Coordinates, args: Vec<DiagArg>) {
        let severity = kind.default_severity();
        log::debug!("diag[{severity:?}] {kind:?} at {coords:?}");
        self.diagnostics.push(Diagnostic { severity, kind, coords, args });
    }

    pub fn report_severity(
        &mut self,
        severity: Severity,
        kind: DiagKind,
        coords: Coordinates,
        args: Vec<DiagArg>,
    ) {
        self.diagnostics.push(Diagnostic { severity, kind, coords, args });
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error).count()
    }

    /// Render every diagnostic to `out`, one per line, optionally with
    /// source-line context (`verbose` configuration option, §6).
    pub fn render(
        &self,
        out: &mut dyn fmt::Write,
        line_index: &LineIndex,
        source: &str,
        verbose: bool,
    ) -> fmt::Result {
        for d in &self.diagnostics {
            let lc = line_index.resolve(d.coords.left_token);
            writeln!(
                out,
                "{}:{}: {}: {}",
                lc.line,
                lc.column,
                if d.severity == Severity::Error { "error" } else { "warning" },
                d.rendered_message()
            )?;
            if verbose {
                if let Some(line) = line_index.line_span(lc.line, source) {
                    writeln!(out, "    {line}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_encounter_order() {
        let mut diags = DiagnosticEngine::new();
        diags.report(DiagKind::UndeclaredIdentifier, Coordinates::single(3), vec!["x".into()]);
        diags.report(DiagKind::BreakOutsideLoopOrSwitch, Coordinates::single(7), vec![]);
        assert_eq!(diags.diagnostics().len(), 2);
        assert_eq!(diags.diagnostics()[0].kind, DiagKind::UndeclaredIdentifier);
        assert_eq!(diags.diagnostics()[1].kind, DiagKind::BreakOutsideLoopOrSwitch);
    }

    #[test]
    fn has_error_reflects_severity() {
        let mut diags = DiagnosticEngine::new();
        assert!(!diags.has_error());
        diags.report(DiagKind::RefOfRegister, Coordinates::single(0), vec![]);
        assert!(!diags.has_error());
        diags.report(DiagKind::Redefinition, Coordinates::single(0), vec!["x".into()]);
        assert!(diags.has_error());
    }

    #[test]
    fn renders_positional_args() {
        let mut diags = DiagnosticEngine::new();
        diags.report(DiagKind::UndeclaredIdentifier, Coordinates::single(0), vec!["foo".into()]);
        assert_eq!(diags.diagnostics()[0].rendered_message(), "use of undeclared identifier 'foo'");
    }
}
