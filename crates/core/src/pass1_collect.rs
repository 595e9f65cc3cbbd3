//! Pass 1: declaration collection.
//!
//! Visits every statement once, in source order, and fills the symbol table.
//! Both permission syntaxes are normalized into [`PermissionBlock`]s, and
//! every block (and every standalone rule) is flattened into one
//! [`PolicyRule`] per resource reference.

use crate::ast::{
    GroupDecl, PermissionBlockNode, Program, ResourceDecl, ResourceProperty, ResourceType,
    RoleDecl, RolePermissions, RuleDecl, RuleType, Statement, UserDecl,
};
use crate::error::Diagnostic;
use crate::symbols::{
    Attributes, Group, PermissionBlock, PolicyRule, Resource, Role, RuleOrigin, SymbolTable, User,
};

/// Lower-case action words; `*` stays as written.
fn normalize_actions(actions: &[String]) -> Vec<String> {
    actions
        .iter()
        .map(|a| if a == "*" { a.clone() } else { a.to_lowercase() })
        .collect()
}

/// Collect declarations into `table`. Returns `true` if any duplicate
/// declaration was rejected, which suppresses the validation pass.
pub fn collect(program: &Program, table: &mut SymbolTable, diags: &mut Vec<Diagnostic>) -> bool {
    let mut duplicates = false;
    for stmt in &program.statements {
        let result = match stmt {
            Statement::Role(decl) => collect_role(decl, table),
            Statement::User(decl) => table.declare_user(user_from(decl)),
            Statement::Resource(decl) => match resource_from(decl, diags) {
                Some(resource) => table.declare_resource(resource),
                None => Ok(()),
            },
            Statement::Group(decl) => table.declare_group(group_from(decl)),
            Statement::Rule(decl) => {
                collect_rule(decl, table);
                Ok(())
            }
        };
        if let Err(dup) = result {
            duplicates = true;
            diags.push(Diagnostic::semantic(stmt.line(), dup.to_string()));
        }
    }
    duplicates
}

fn block_from(node: &PermissionBlockNode) -> PermissionBlock {
    PermissionBlock {
        actions: normalize_actions(&node.actions),
        resources: node.resources.iter().map(|r| r.pattern()).collect(),
        conditions: node.condition.clone(),
    }
}

fn collect_role(
    decl: &RoleDecl,
    table: &mut SymbolTable,
) -> Result<(), crate::symbols::DuplicateNameError> {
    // (block, line of the clause that produced it)
    let mut blocks: Vec<(PermissionBlock, u32)> = Vec::new();
    for clause in &decl.body {
        match clause {
            RolePermissions::Blocks { blocks: nodes, .. } => {
                blocks.extend(nodes.iter().map(|n| (block_from(n), n.line)));
            }
            RolePermissions::Legacy {
                actions,
                resources,
                line,
            } => blocks.push((
                PermissionBlock {
                    actions: normalize_actions(actions),
                    resources: resources.iter().map(|r| r.pattern()).collect(),
                    conditions: None,
                },
                *line,
            )),
        }
    }

    let role = Role {
        name: decl.name.clone(),
        permissions: blocks.iter().map(|(b, _)| b.clone()).collect(),
        parent_role: decl.parent.clone(),
        attributes: Attributes::new(),
        line_number: decl.line,
    };
    table.declare_role(role)?;

    // Rules only for the declaration that was kept.
    for (block, line) in blocks {
        for pattern in &block.resources {
            table.add_rule(PolicyRule {
                rule_type: RuleType::Allow,
                actions: block.actions.clone(),
                resource_pattern: pattern.clone(),
                condition: block.conditions.clone(),
                line_number: line,
                origin: RuleOrigin::Role(decl.name.clone()),
            });
        }
    }
    Ok(())
}

fn collect_rule(decl: &RuleDecl, table: &mut SymbolTable) {
    let actions = normalize_actions(&decl.actions);
    for resource in &decl.resources {
        table.add_rule(PolicyRule {
            rule_type: decl.rule_type,
            actions: actions.clone(),
            resource_pattern: resource.pattern(),
            condition: decl.condition.clone(),
            line_number: decl.line,
            origin: RuleOrigin::Standalone,
        });
    }
}

fn user_from(decl: &UserDecl) -> User {
    User {
        name: decl.name.clone(),
        roles: decl.roles.clone(),
        attributes: Attributes::new(),
        valid_from: decl.valid.as_ref().map(|v| v.from.clone()),
        valid_until: decl.valid.as_ref().map(|v| v.until.clone()),
        line_number: decl.line,
    }
}

fn group_from(decl: &GroupDecl) -> Group {
    Group {
        name: decl.name.clone(),
        members: decl.members.clone(),
        roles: decl.roles.clone(),
        line_number: decl.line,
    }
}

/// Build the canonical resource. `path` and `type` are mandatory; a
/// resource missing either is reported and not declared.
fn resource_from(decl: &ResourceDecl, diags: &mut Vec<Diagnostic>) -> Option<Resource> {
    let mut path: Option<String> = None;
    let mut resource_type: Option<ResourceType> = None;
    let mut metadata = Attributes::new();

    for prop in &decl.properties {
        let (field, repeated) = match prop {
            ResourceProperty::Path { value, .. } => ("path", path.replace(value.clone()).is_some()),
            ResourceProperty::Type { value, .. } => {
                ("type", resource_type.replace(*value).is_some())
            }
            ResourceProperty::Metadata { entries, .. } => {
                let repeated = !metadata.is_empty();
                for entry in entries {
                    metadata.insert(entry.key.clone(), entry.value.to_json());
                }
                ("metadata", repeated)
            }
        };
        if repeated {
            diags.push(Diagnostic::warning(
                decl.line,
                format!(
                    "Resource '{}' (line {}) sets '{}' more than once; the last value is used",
                    decl.name, decl.line, field
                ),
            ));
        }
    }

    let mut missing = Vec::new();
    if path.is_none() {
        missing.push("path");
    }
    if resource_type.is_none() {
        missing.push("type");
    }
    for field in &missing {
        diags.push(Diagnostic::semantic(
            decl.line,
            format!(
                "Resource '{}' (line {}) is missing required property '{}'",
                decl.name, decl.line, field
            ),
        ));
    }

    Some(Resource {
        name: decl.name.clone(),
        path: path?,
        resource_type: resource_type?,
        metadata,
        parent: None,
        children: Vec::new(),
        line_number: decl.line,
    })
}
