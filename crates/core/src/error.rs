use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lexical,
    Syntax,
    Semantic,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Lexical => write!(f, "lexical"),
            Phase::Syntax => write!(f, "syntax"),
            Phase::Semantic => write!(f, "semantic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler diagnostic.
///
/// Diagnostics are data, not `Err` values: every phase collects them and the
/// orchestrator decides whether the pipeline may advance. Lexical and syntax
/// diagnostics carry a column; semantic ones point at the declaration line
/// and repeat it inside the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
}

/// Unrecognized character, unterminated literal or comment.
pub type LexError = Diagnostic;
/// Grammar violation.
pub type SyntaxError = Diagnostic;
/// Duplicate declaration, undefined reference, circular inheritance.
pub type SemanticError = Diagnostic;
/// Advisory finding of the analyzer; never blocks compilation.
pub type SemanticWarning = Diagnostic;

impl Diagnostic {
    pub fn new(
        phase: Phase,
        severity: Severity,
        line: u32,
        column: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            phase,
            severity,
            line,
            column,
            message: message.into(),
        }
    }

    pub fn lex(line: u32, column: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(Phase::Lexical, Severity::Error, line, Some(column), message)
    }

    pub fn syntax(line: u32, column: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(Phase::Syntax, Severity::Error, line, Some(column), message)
    }

    pub fn semantic(line: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(Phase::Semantic, Severity::Error, line, None, message)
    }

    pub fn warning(line: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(Phase::Semantic, Severity::Warning, line, None, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Flat string used in `CompilationResult::errors` / `warnings`.
    ///
    /// Lexical and syntax diagnostics use the `Line L:C - message` layout;
    /// semantic messages already name their line and are reported verbatim.
    pub fn report_line(&self) -> String {
        match (self.phase, self.column) {
            (Phase::Semantic, _) => self.message.clone(),
            (_, Some(col)) => format!("Line {}:{} - {}", self.line, col, self.message),
            (_, None) => format!("Line {} - {}", self.line, self.message),
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "column":   self.column,
            "line":     self.line,
            "message":  self.message,
            "phase":    self.phase,
            "severity": self.severity,
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.column {
            Some(col) => write!(
                f,
                "line {}:{}: {} {}: {}",
                self.line, col, self.phase, kind, self.message
            ),
            None => write!(f, "line {}: {} {}: {}", self.line, self.phase, kind, self.message),
        }
    }
}
