//! Staged compiler pipeline: lex, parse, analyze, emit.
//!
//! Each stage runs only if the previous one produced no errors. The
//! advisory security analysis is asynchronous and lives outside this crate;
//! callers attach its findings with [`CompilationResult::attach_findings`].

use crate::analyze::analyze_with_external;
use crate::ast::render_tree;
use crate::error::Diagnostic;
use crate::findings::{aggregate_risk, Finding};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::parser::{parse_recovering, DEFAULT_MAX_ERRORS};
use crate::pass3_emit;
use crate::symbols::{Role, SymbolTable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    /// Everything, including artifact generation and advisory analysis.
    #[default]
    Full,
    /// Stop after semantic analysis.
    Validate,
    /// Semantic analysis plus advisory analysis; no artifact.
    Analyze,
    /// Stop after syntax analysis.
    Parse,
}

impl CompileMode {
    pub fn runs_analysis(self) -> bool {
        self != CompileMode::Parse
    }

    pub fn runs_advisory(self) -> bool {
        matches!(self, CompileMode::Full | CompileMode::Analyze)
    }
}

impl fmt::Display for CompileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileMode::Full => write!(f, "full"),
            CompileMode::Validate => write!(f, "validate"),
            CompileMode::Analyze => write!(f, "analyze"),
            CompileMode::Parse => write!(f, "parse"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub mode: CompileMode,
    /// Emit the artifact; honored only in [`CompileMode::Full`].
    pub generate_code: bool,
    pub max_errors: usize,
    pub external_roles: HashMap<String, Role>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            mode: CompileMode::Full,
            generate_code: true,
            max_errors: DEFAULT_MAX_ERRORS,
            external_roles: HashMap::new(),
        }
    }
}

impl CompileOptions {
    pub fn with_mode(mode: CompileMode) -> Self {
        CompileOptions {
            mode,
            ..CompileOptions::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompilationResult {
    pub success: bool,
    /// Hex SHA-256 of the source text.
    pub policy_id: String,
    /// Token stream without the trailing end-of-input token.
    pub tokens: Vec<Token>,
    pub syntax_tree_repr: Option<String>,
    pub symbol_table: Option<SymbolTable>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub generated_artifact: Option<String>,
    pub security_findings: Vec<Finding>,
    pub risk_score: Option<f64>,
}

impl CompilationResult {
    fn new(policy_id: String) -> Self {
        CompilationResult {
            success: false,
            policy_id,
            tokens: Vec::new(),
            syntax_tree_repr: None,
            symbol_table: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            diagnostics: Vec::new(),
            generated_artifact: None,
            security_findings: Vec::new(),
            risk_score: None,
        }
    }

    /// A failed result for a compilation that could not run to completion.
    pub fn aborted(source: &str, message: impl Into<String>) -> Self {
        let mut result = CompilationResult::new(policy_id(source));
        result.errors.push(message.into());
        result
    }

    fn record(&mut self, diags: Vec<Diagnostic>) {
        for d in diags {
            if d.is_error() {
                self.errors.push(d.report_line());
            } else {
                self.warnings.push(d.report_line());
            }
            self.diagnostics.push(d);
        }
    }

    /// Attach advisory findings: high-risk ones become warnings and the
    /// aggregate score is recomputed. Findings never affect `success`.
    pub fn attach_findings(&mut self, findings: Vec<Finding>) {
        for f in findings.iter().filter(|f| f.is_high_risk()) {
            self.warnings.push(f.warning_line());
        }
        self.risk_score = aggregate_risk(&findings);
        self.security_findings = findings;
    }
}

pub fn policy_id(source: &str) -> String {
    Sha256::digest(source.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Compile `source` through every stage `options.mode` asks for.
pub fn compile(source: &str, options: &CompileOptions) -> CompilationResult {
    let mut result = CompilationResult::new(policy_id(source));
    info!(
        event = "Compile",
        phase = "Started",
        mode = %options.mode,
        policy_id = %result.policy_id,
        source_len = source.len(),
    );

    // Lexical analysis
    let (mut tokens, lex_errors) = tokenize(source);
    if tokens.last().map(|t| t.kind) == Some(TokenKind::Eof) {
        tokens.pop();
    }
    debug!(event = "Compile", phase = "Lexical", tokens = tokens.len(), errors = lex_errors.len());
    result.tokens = tokens;
    let lex_failed = !lex_errors.is_empty();
    result.record(lex_errors);
    if lex_failed {
        return failed(result);
    }

    // Syntax analysis
    let (program, syntax_errors) = parse_recovering(&result.tokens, options.max_errors);
    debug!(
        event = "Compile",
        phase = "Syntax",
        statements = program.statements.len(),
        errors = syntax_errors.len(),
    );
    let syntax_failed = !syntax_errors.is_empty();
    result.record(syntax_errors);
    if syntax_failed {
        return failed(result);
    }
    result.syntax_tree_repr = Some(render_tree(&program));
    if !options.mode.runs_analysis() {
        return succeeded(result);
    }

    // Semantic analysis
    let analysis = analyze_with_external(&program, options.external_roles.clone());
    let semantic_failed = !analysis.success();
    result.record(analysis.errors);
    result.record(analysis.warnings);
    result.symbol_table = Some(analysis.symbol_table);
    if semantic_failed {
        return failed(result);
    }

    // Artifact generation
    if options.generate_code && options.mode == CompileMode::Full {
        if let Some(table) = &result.symbol_table {
            let artifact = pass3_emit::emit_string(table);
            debug!(event = "Compile", phase = "Emit", bytes = artifact.len());
            result.generated_artifact = Some(artifact);
        }
    }
    succeeded(result)
}

fn failed(mut result: CompilationResult) -> CompilationResult {
    result.success = false;
    info!(
        event = "Compile",
        phase = "Failed",
        policy_id = %result.policy_id,
        errors = result.errors.len(),
    );
    result
}

fn succeeded(mut result: CompilationResult) -> CompilationResult {
    result.success = true;
    info!(
        event = "Compile",
        phase = "Succeeded",
        policy_id = %result.policy_id,
        warnings = result.warnings.len(),
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = "ROLE Admin {can: [read, write] resources: [DB]}\n\
                              USER Alice {role: [Admin]}\n\
                              RESOURCE DB {path: \"/data\", type: database}\n";

    #[test]
    fn full_mode_generates_artifact() {
        let result = compile(SCENARIO_A, &CompileOptions::default());
        assert!(result.success, "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.generated_artifact.is_some());
        assert_eq!(result.policy_id.len(), 64);
        assert!(result.tokens.iter().all(|t| t.kind != TokenKind::Eof));
    }

    #[test]
    fn parse_mode_stops_before_analysis() {
        let result = compile(SCENARIO_A, &CompileOptions::with_mode(CompileMode::Parse));
        assert!(result.success);
        assert!(result.syntax_tree_repr.is_some());
        assert!(result.symbol_table.is_none());
        assert!(result.generated_artifact.is_none());
    }

    #[test]
    fn validate_and_analyze_modes_skip_artifact() {
        for mode in [CompileMode::Validate, CompileMode::Analyze] {
            let result = compile(SCENARIO_A, &CompileOptions::with_mode(mode));
            assert!(result.success);
            assert!(result.symbol_table.is_some());
            assert!(result.generated_artifact.is_none());
        }
    }

    #[test]
    fn codegen_can_be_disabled() {
        let options = CompileOptions {
            generate_code: false,
            ..CompileOptions::default()
        };
        assert!(compile(SCENARIO_A, &options).generated_artifact.is_none());
    }

    #[test]
    fn lexical_errors_stop_the_pipeline() {
        let result = compile("ROLE A { can: [read] resources: [DB] } @", &CompileOptions::default());
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Line 1:"));
        assert!(result.syntax_tree_repr.is_none());
    }

    #[test]
    fn lexical_failure_still_reports_tokens() {
        let result = compile("ROLE A { can: [read] resources: [DB] } @", &CompileOptions::default());
        assert!(!result.success);
        assert_eq!(result.tokens.first().map(|t| t.kind), Some(TokenKind::Role));
        assert_eq!(result.tokens.last().map(|t| t.kind), Some(TokenKind::RBrace));
        assert!(result.tokens.iter().all(|t| t.kind != TokenKind::Eof));
        assert!(result.tokens.iter().any(|t| t.text == "DB"));
    }

    #[test]
    fn syntax_errors_stop_the_pipeline() {
        let result = compile("ROLE A { can [read] }", &CompileOptions::default());
        assert!(!result.success);
        assert!(!result.errors.is_empty());
        assert!(result.symbol_table.is_none());
    }

    #[test]
    fn semantic_errors_keep_the_table_but_skip_codegen() {
        let result = compile("ROLE A extends B {}", &CompileOptions::default());
        assert!(!result.success);
        assert!(result.symbol_table.is_some());
        assert!(result.generated_artifact.is_none());
    }

    #[test]
    fn findings_become_warnings_and_score() {
        let mut result = compile(SCENARIO_A, &CompileOptions::default());
        result.attach_findings(vec![
            Finding {
                line: 1,
                risk_score: 8,
                category: "Excessive Privilege".into(),
                description: "Admin can write DB".into(),
                recommendation: "split the role".into(),
                raw_output: None,
            },
            Finding {
                line: 2,
                risk_score: 3,
                category: "Naming".into(),
                description: "minor".into(),
                recommendation: "none".into(),
                raw_output: None,
            },
        ]);
        assert_eq!(result.warnings, vec!["Line 1: Admin can write DB"]);
        assert_eq!(result.risk_score, Some(5.5));
        assert!(result.success);
    }

    #[test]
    fn policy_id_is_stable() {
        assert_eq!(policy_id("x"), policy_id("x"));
        assert_ne!(policy_id("x"), policy_id("y"));
    }
}
