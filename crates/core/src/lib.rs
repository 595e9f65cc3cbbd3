//! rpl-core: compiler for the Role/Policy Language.
//!
//! Source text flows through a staged pipeline:
//!
//! - [`lexer::tokenize`] -- tokens plus lexical errors
//! - [`parser::parse`] -- syntax tree plus syntax errors (multi-error recovery)
//! - [`analyze()`] -- pass 1 collects declarations into a [`SymbolTable`],
//!   pass 2 validates inheritance, references, cycles and validity periods
//! - [`pass3_emit::emit`] -- canonical JSON artifact of the compiled policy
//!
//! [`compile()`] sequences the stages and stops at the first one that fails.
//! Diagnostics are values ([`Diagnostic`]), never panics.

pub mod analyze;
pub mod ast;
pub mod compile;
pub mod error;
pub mod findings;
pub mod lexer;
pub mod parser;
pub mod pass1_collect;
pub mod pass2_validate;
pub mod pass3_emit;
pub mod pattern;
pub mod symbols;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{Condition, Expr, Program, RuleType, Value};
pub use error::{Diagnostic, LexError, Phase, SemanticError, SemanticWarning, Severity, SyntaxError};
pub use findings::Finding;
pub use lexer::{Token, TokenKind};
pub use pattern::{wildcard_match, WildcardPattern};
pub use symbols::{
    DuplicateNameError, Group, PermissionBlock, PolicyRule, Resource, Role, RuleOrigin,
    SymbolTable, User,
};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use analyze::{analyze, analyze_with_external, AnalysisResult};
pub use compile::{compile, policy_id, CompilationResult, CompileMode, CompileOptions};
pub use lexer::tokenize;
pub use parser::{parse, parse_recovering};
pub use pass2_validate::validity::{is_expired, parse_date};
