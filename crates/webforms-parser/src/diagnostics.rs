//! Structured parse diagnostics.
//!
//! Problems found while building the tree never stop the pass; they are
//! collected as [`Diagnostic`] values next to a best-effort tree.

use serde::Serialize;
use std::fmt;
use webforms_lexer::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticCode {
    /// An unexpected failure while parsing one file.
    SourceGeneratorException,
    PropertyNotFound,
    DuplicateControlRegister,
    ControlNotFound,
    InheritNotFound,
    TypeNotFoundInNamespace,
    UnexpectedClosingTag,
    IncludeNotFound,
    RecursiveInclude,
    DuplicateControlId,
}

impl DiagnosticCode {
    /// Stable identifier, e.g. `WF0002`.
    pub fn id(self) -> &'static str {
        match self {
            Self::SourceGeneratorException => "WF0001",
            Self::PropertyNotFound => "WF0002",
            Self::DuplicateControlRegister => "WF0003",
            Self::ControlNotFound => "WF0004",
            Self::InheritNotFound => "WF0005",
            Self::TypeNotFoundInNamespace => "WF0006",
            Self::UnexpectedClosingTag => "WF0007",
            Self::IncludeNotFound => "WF0008",
            Self::RecursiveInclude => "WF0009",
            Self::DuplicateControlId => "WF0010",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::UnexpectedClosingTag => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Message with `{0}`, `{1}`, ... placeholders for the arguments.
    pub fn template(self) -> &'static str {
        match self {
            Self::SourceGeneratorException => "Failed to parse file: {0}",
            Self::PropertyNotFound => "Type '{0}' has no writable property '{1}'",
            Self::DuplicateControlRegister => {
                "Tag '{0}' is already registered as '{1}' and cannot be registered as '{2}'"
            }
            Self::ControlNotFound => "No control registered for tag '{0}'",
            Self::InheritNotFound => "Inherited type '{0}' could not be found",
            Self::TypeNotFoundInNamespace => "Type '{0}' not found in namespace '{1}'",
            Self::UnexpectedClosingTag => "Unexpected closing tag '{0}', expected '{1}'",
            Self::IncludeNotFound => "Included file '{0}' not found",
            Self::RecursiveInclude => "File '{0}' includes itself",
            Self::DuplicateControlId => "A control with ID '{0}' is already declared",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A non-fatal problem with a source range and message arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub range: Range,
    pub args: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, range: Range, args: Vec<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            range,
            args,
        }
    }

    /// The template with its placeholders filled in.
    pub fn message(&self) -> String {
        self.args
            .iter()
            .enumerate()
            .fold(self.code.template().to_string(), |message, (i, arg)| {
                message.replace(&format!("{{{i}}}"), arg)
            })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {}: {}",
            self.range,
            self.severity,
            self.code,
            self.message()
        )
    }
}

/// Ordered diagnostics for one top-level parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, code: DiagnosticCode, range: &Range, args: &[&str]) {
        let diagnostic = Diagnostic::new(
            code,
            range.clone(),
            args.iter().map(|a| a.to_string()).collect(),
        );
        log::debug!("{diagnostic}");
        self.0.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use webforms_lexer::Position;

    fn range() -> Range {
        Range::new(Arc::from("Default.aspx"), Position::new(12, 2, 3), Position::new(15, 2, 6))
    }

    #[test]
    fn test_message_fills_placeholders() {
        let diagnostic = Diagnostic::new(
            DiagnosticCode::PropertyNotFound,
            range(),
            vec!["Site.Home".into(), "Colour".into()],
        );
        assert_eq!(
            diagnostic.message(),
            "Type 'Site.Home' has no writable property 'Colour'"
        );
    }

    #[test]
    fn test_display() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(DiagnosticCode::UnexpectedClosingTag, &range(), &["Baz", "Foo"]);
        let rendered = diagnostics.iter().next().unwrap().to_string();
        assert_eq!(
            rendered,
            "Default.aspx:2:3: warning WF0007: Unexpected closing tag 'Baz', expected 'Foo'"
        );
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_ids_are_unique() {
        let codes = [
            DiagnosticCode::SourceGeneratorException,
            DiagnosticCode::PropertyNotFound,
            DiagnosticCode::DuplicateControlRegister,
            DiagnosticCode::ControlNotFound,
            DiagnosticCode::InheritNotFound,
            DiagnosticCode::TypeNotFoundInNamespace,
            DiagnosticCode::UnexpectedClosingTag,
            DiagnosticCode::IncludeNotFound,
            DiagnosticCode::RecursiveInclude,
            DiagnosticCode::DuplicateControlId,
        ];
        let mut ids: Vec<&str> = codes.iter().map(|c| c.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), codes.len());
    }
}
