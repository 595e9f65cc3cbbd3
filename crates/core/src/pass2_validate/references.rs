use crate::error::Diagnostic;
use crate::symbols::SymbolTable;
use std::collections::HashSet;

pub(super) fn check_user_roles(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    for user in table.users() {
        for role in &user.roles {
            if table.role(role).is_none() {
                diags.push(Diagnostic::semantic(
                    user.line_number,
                    format!(
                        "User '{}' (line {}) references undefined role '{}'",
                        user.name, user.line_number, role
                    ),
                ));
            }
        }
    }
}

/// Undefined roles are errors; undefined members are warnings, since
/// members may be identities managed elsewhere.
pub(super) fn check_groups(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    for group in table.groups() {
        for member in &group.members {
            if table.user(member).is_none() {
                diags.push(Diagnostic::warning(
                    group.line_number,
                    format!(
                        "Group '{}' (line {}) references undefined user '{}'",
                        group.name, group.line_number, member
                    ),
                ));
            }
        }
        for role in &group.roles {
            if table.role(role).is_none() {
                diags.push(Diagnostic::semantic(
                    group.line_number,
                    format!(
                        "Group '{}' (line {}) references undefined role '{}'",
                        group.name, group.line_number, role
                    ),
                ));
            }
        }
    }
}

/// A policy resource without a wildcard should name a declared resource
/// or its path. Unresolved references are only warnings.
pub(super) fn check_resource_refs(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    let mut reported = HashSet::new();
    for rule in table.rules() {
        let pattern = rule.resource_pattern.as_str();
        if pattern.contains('*') || table.resolve_resource(pattern).is_some() {
            continue;
        }
        if reported.insert((rule.line_number, pattern)) {
            diags.push(Diagnostic::warning(
                rule.line_number,
                format!(
                    "Policy at line {} references undeclared resource '{}'",
                    rule.line_number, pattern
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::pass1_collect::collect;

    fn table_for(src: &str) -> SymbolTable {
        let (tokens, _) = tokenize(src);
        let (program, errors) = parse(&tokens);
        assert!(errors.is_empty(), "{:?}", errors);
        let mut table = SymbolTable::new();
        let mut diags = Vec::new();
        collect(&program.unwrap_or_default(), &mut table, &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
        table
    }

    fn resource_warnings(src: &str) -> Vec<String> {
        let mut diags = Vec::new();
        check_resource_refs(&table_for(src), &mut diags);
        assert!(diags.iter().all(|d| !d.is_error()));
        diags.into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn undeclared_resource_is_a_warning() {
        let warnings = resource_warnings(
            "RESOURCE Reports { path: \"/reports\", type: FOLDER }\n\
             ALLOW action: read ON resource: Reportz",
        );
        assert_eq!(
            warnings,
            vec!["Policy at line 2 references undeclared resource 'Reportz'".to_string()]
        );
    }

    #[test]
    fn declared_names_paths_and_wildcards_resolve() {
        let warnings = resource_warnings(
            "RESOURCE Reports { path: \"/reports\", type: FOLDER }\n\
             ALLOW action: read ON resource: Reports\n\
             ALLOW action: read ON resource: \"/reports\"\n\
             DENY action: delete ON resource: db.*",
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn one_warning_per_rule_and_reference() {
        let warnings =
            resource_warnings("DENY action: [read, write] ON resource: [Ghost, Phantom]");
        assert_eq!(warnings.len(), 2, "{:?}", warnings);
        assert!(warnings[0].contains("'Ghost'"));
        assert!(warnings[1].contains("'Phantom'"));
    }

    #[test]
    fn group_members_warn_but_roles_error() {
        let table = table_for("ROLE R {}\nGROUP G { members: [nobody], role: [R, Missing] }");
        let mut diags = Vec::new();
        check_groups(&table, &mut diags);
        assert_eq!(diags.len(), 2, "{:?}", diags);
        assert!(!diags[0].is_error());
        assert!(diags[0].message.contains("undefined user 'nobody'"));
        assert!(diags[1].is_error());
        assert_eq!(
            diags[1].message,
            "Group 'G' (line 2) references undefined role 'Missing'"
        );
    }
}
