use crate::error::Diagnostic;
use crate::symbols::SymbolTable;
use std::collections::{HashMap, HashSet};

/// Every `extends` target must be a declared (or external) role.
pub(super) fn check_inheritance(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    for role in table.roles() {
        if let Some(parent) = &role.parent_role {
            if table.role(parent).is_none() {
                diags.push(Diagnostic::semantic(
                    role.line_number,
                    format!(
                        "Role '{}' (line {}) extends undefined role '{}'",
                        role.name, role.line_number, parent
                    ),
                ));
            }
        }
    }
}

/// Report each distinct inheritance cycle once, walking roles in
/// declaration order. Chains are followed iteratively so arbitrarily long
/// `extends` chains cannot exhaust the stack.
pub(super) fn check_cycles(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    let mut visited: HashSet<&str> = HashSet::new();
    for role in table.roles() {
        detect_inheritance_cycle(&role.name, table, &mut visited, diags);
    }
}

fn detect_inheritance_cycle<'t>(
    start: &'t str,
    table: &'t SymbolTable,
    visited: &mut HashSet<&'t str>,
    diags: &mut Vec<Diagnostic>,
) {
    let mut path: Vec<&'t str> = Vec::new();
    let mut on_path: HashMap<&'t str, usize> = HashMap::new();
    let mut current = Some(start);

    while let Some(name) = current {
        if visited.contains(name) {
            break;
        }
        if let Some(&pos) = on_path.get(name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name);
            let line = table.role(name).map(|r| r.line_number).unwrap_or(0);
            diags.push(Diagnostic::semantic(
                line,
                format!("Circular inheritance detected: {}", cycle.join(" -> ")),
            ));
            break;
        }
        let Some(role) = table.role(name) else {
            break;
        };
        on_path.insert(name, path.len());
        path.push(name);
        current = role.parent_role.as_deref();
    }

    visited.extend(path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::pass1_collect::collect;

    fn cycle_errors(src: &str) -> Vec<String> {
        let (tokens, _) = tokenize(src);
        let (program, errors) = parse(&tokens);
        assert!(errors.is_empty(), "{:?}", errors);
        let mut table = SymbolTable::new();
        let mut diags = Vec::new();
        collect(&program.unwrap_or_default(), &mut table, &mut diags);
        check_cycles(&table, &mut diags);
        diags.into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn three_role_cycle_is_reported_from_first_member_reached() {
        let errors = cycle_errors(
            "ROLE A extends B {}\nROLE B extends C {}\nROLE C extends D {}\nROLE D extends B {}",
        );
        assert_eq!(
            errors,
            vec!["Circular inheritance detected: B -> C -> D -> B".to_string()]
        );
    }

    #[test]
    fn self_extension_is_a_cycle() {
        let errors = cycle_errors("ROLE Loop extends Loop {}");
        assert_eq!(
            errors,
            vec!["Circular inheritance detected: Loop -> Loop".to_string()]
        );
    }

    #[test]
    fn disjoint_cycles_are_each_reported_once() {
        let errors = cycle_errors(
            "ROLE A extends B {}\nROLE B extends A {}\nROLE X extends Y {}\nROLE Y extends X {}",
        );
        assert_eq!(errors.len(), 2, "{:?}", errors);
        assert_eq!(errors[0], "Circular inheritance detected: A -> B -> A");
        assert_eq!(errors[1], "Circular inheritance detected: X -> Y -> X");
    }

    #[test]
    fn very_long_chain_is_walked_without_recursion() {
        let src: String = (0..20_000)
            .map(|i| format!("ROLE R{} extends R{} {{}}\n", i, i + 1))
            .collect();
        assert!(cycle_errors(&src).is_empty());

        let closed = format!("{}ROLE R20000 extends R0 {{}}\n", src);
        let errors = cycle_errors(&closed);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Circular inheritance detected: R0 -> R1 -> "));
        assert!(errors[0].ends_with("R19999 -> R20000 -> R0"));
    }
}
