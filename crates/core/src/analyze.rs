//! Semantic analysis: pass 1 (collection) then pass 2 (validation).

use crate::ast::Program;
use crate::error::{Diagnostic, SemanticError, SemanticWarning};
use crate::pass1_collect;
use crate::pass2_validate;
use crate::symbols::{Role, SymbolTable};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub symbol_table: SymbolTable,
    pub errors: Vec<SemanticError>,
    pub warnings: Vec<SemanticWarning>,
}

impl AnalysisResult {
    /// Warnings do not affect success.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn analyze(program: &Program) -> AnalysisResult {
    analyze_with_external(program, HashMap::new())
}

/// Analyze against roles that already exist outside this compilation unit.
///
/// External roles satisfy `extends`, user and group references. Declaring a
/// role with the same name as an external one is a duplicate-declaration
/// error; in-file roles never shadow external ones.
pub fn analyze_with_external(
    program: &Program,
    external_roles: HashMap<String, Role>,
) -> AnalysisResult {
    let mut table = SymbolTable::with_external_roles(external_roles);
    let mut diags: Vec<Diagnostic> = Vec::new();

    let had_duplicates = pass1_collect::collect(program, &mut table, &mut diags);
    if !had_duplicates {
        pass2_validate::validate(&mut table, &mut diags);
    }

    let (errors, warnings): (Vec<_>, Vec<_>) = diags.into_iter().partition(|d| d.is_error());
    let report = table.to_report();
    debug!(
        event = "Analyze",
        roles = report.counts.roles,
        users = report.counts.users,
        resources = report.counts.resources,
        groups = report.counts.groups,
        rules = report.counts.rules,
        errors = errors.len(),
        warnings = warnings.len(),
        validated = !had_duplicates,
    );
    AnalysisResult {
        symbol_table: table,
        errors,
        warnings,
    }
}
