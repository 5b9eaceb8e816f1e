//! Validation diagnostics and their textual rendering.

use std::fmt;

use stria_ir::Source;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single message, optionally pointing into the module disassembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub source: Option<Source>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, source: Option<Source>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            source,
        }
    }

    pub fn note(message: impl Into<String>, source: Option<Source>) -> Self {
        Self {
            severity: Severity::Note,
            message: message.into(),
            source,
        }
    }
}

/// A failed validation: every diagnostic produced, in order, plus the text
/// their sources point into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Failure {
    diagnostics: Vec<Diagnostic>,
    text: String,
}

impl Failure {
    pub fn new(diagnostics: Vec<Diagnostic>, text: impl Into<String>) -> Self {
        Self {
            diagnostics,
            text: text.into(),
        }
    }

    /// A failure with a single unsourced error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(vec![Diagnostic::error(message, None)], String::new())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// The rendered report: each diagnostic with its source line and a
    /// caret underline, separated by blank lines.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    fn render(&self, diagnostic: &Diagnostic, out: &mut String) {
        let Some(source) = diagnostic.source else {
            out.push_str(&format!("{}: {}", diagnostic.severity, diagnostic.message));
            if !out.ends_with('\n') {
                out.push('\n');
            }
            return;
        };
        out.push_str(&format!(
            ":{}:{} {}: {}\n",
            source.line, source.column, diagnostic.severity, diagnostic.message
        ));
        let index = source.line.saturating_sub(1) as usize;
        if let Some(line) = self.text.lines().nth(index) {
            out.push_str(line);
            out.push('\n');
            let indent = source.column.saturating_sub(1) as usize;
            out.push_str(&" ".repeat(indent));
            out.push_str(&"^".repeat(source.length.max(1) as usize));
            out.push('\n');
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.render(diagnostic, &mut out);
        }
        f.write_str(&out)
    }
}

impl std::error::Error for Failure {}
