//! Pass 3: compiled policy artifact, canonical JSON with entities sorted by
//! name and policies in declaration order.

use crate::symbols::{Group, PermissionBlock, PolicyRule, Resource, Role, RuleOrigin, SymbolTable, User};
use serde_json::{json, Map, Value};

pub const ARTIFACT_FORMAT: &str = "rpl-policy";
pub const ARTIFACT_VERSION: &str = "1.0";

pub fn emit(table: &SymbolTable) -> Value {
    let mut roles = table.roles();
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    let mut users = table.users();
    users.sort_by(|a, b| a.name.cmp(&b.name));
    let mut resources = table.resources();
    resources.sort_by(|a, b| a.name.cmp(&b.name));
    let mut groups = table.groups();
    groups.sort_by(|a, b| a.name.cmp(&b.name));

    let mut artifact = Map::new();
    artifact.insert("format".to_owned(), Value::String(ARTIFACT_FORMAT.to_owned()));
    artifact.insert("version".to_owned(), Value::String(ARTIFACT_VERSION.to_owned()));
    artifact.insert(
        "roles".to_owned(),
        Value::Array(roles.into_iter().map(emit_role).collect()),
    );
    artifact.insert(
        "users".to_owned(),
        Value::Array(users.into_iter().map(|u| emit_user(u, table)).collect()),
    );
    artifact.insert(
        "resources".to_owned(),
        Value::Array(resources.into_iter().map(emit_resource).collect()),
    );
    artifact.insert(
        "groups".to_owned(),
        Value::Array(groups.into_iter().map(emit_group).collect()),
    );
    artifact.insert(
        "policies".to_owned(),
        Value::Array(table.rules().iter().map(emit_policy).collect()),
    );
    Value::Object(artifact)
}

/// Pretty-printed artifact text.
pub fn emit_string(table: &SymbolTable) -> String {
    // Serializing a `Value` cannot fail.
    serde_json::to_string_pretty(&emit(table)).unwrap_or_default()
}

fn emit_block(block: &PermissionBlock) -> Value {
    json!({
        "actions": block.actions,
        "resources": block.resources,
        "condition": block.conditions.as_ref().map(|c| c.to_string()),
    })
}

fn emit_role(role: &Role) -> Value {
    json!({
        "name": role.name,
        "extends": role.parent_role,
        "permissions": role.permissions.iter().map(emit_block).collect::<Vec<_>>(),
        "line": role.line_number,
    })
}

fn emit_user(user: &User, table: &SymbolTable) -> Value {
    json!({
        "name": user.name,
        "roles": user.roles,
        "effective_roles": table.effective_roles(&user.name),
        "valid_from": user.valid_from,
        "valid_until": user.valid_until,
        "line": user.line_number,
    })
}

fn emit_resource(resource: &Resource) -> Value {
    json!({
        "name": resource.name,
        "path": resource.path,
        "type": resource.resource_type.to_string(),
        "metadata": resource.metadata,
        "parent": resource.parent,
        "children": resource.children,
        "line": resource.line_number,
    })
}

fn emit_group(group: &Group) -> Value {
    json!({
        "name": group.name,
        "members": group.members,
        "roles": group.roles,
        "line": group.line_number,
    })
}

fn emit_policy(rule: &PolicyRule) -> Value {
    let origin = match &rule.origin {
        RuleOrigin::Role(name) => Value::String(name.clone()),
        RuleOrigin::Standalone => Value::Null,
    };
    json!({
        "type": rule.rule_type.to_string(),
        "actions": rule.actions,
        "resource": rule.resource_pattern,
        "condition": rule.condition.as_ref().map(|c| c.to_string()),
        "role": origin,
        "line": rule.line_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn table(src: &str) -> SymbolTable {
        let (tokens, lex_errors) = tokenize(src);
        assert!(lex_errors.is_empty(), "{:?}", lex_errors);
        let (program, errors) = parse(&tokens);
        let program = program.unwrap_or_else(|| panic!("parse failed: {:?}", errors));
        let result = analyze(&program);
        assert!(result.success(), "{:?}", result.errors);
        result.symbol_table
    }

    #[test]
    fn entities_are_sorted_and_policies_keep_order() {
        let t = table(
            "ROLE Zed { can: [read] resources: [DB] }\n\
             ROLE Alpha { can: [write] resources: [Files] }\n\
             USER bob { role: [Alpha] }\n\
             USER amy { role: [Zed] }",
        );
        let v = emit(&t);
        assert_eq!(v["format"], "rpl-policy");
        assert_eq!(v["roles"][0]["name"], "Alpha");
        assert_eq!(v["roles"][1]["name"], "Zed");
        assert_eq!(v["users"][0]["name"], "amy");
        assert_eq!(v["policies"][0]["role"], "Zed");
        assert_eq!(v["policies"][1]["resource"], "Files");
    }

    #[test]
    fn conditions_are_rendered_as_text() {
        let t = table(
            "ROLE Analyst { permissions: [ { actions: [read], resources: [Reports], \
             conditions: user.level >= 3 } ] }",
        );
        let v = emit(&t);
        assert_eq!(v["policies"][0]["condition"], "user.level >= 3");
        assert_eq!(v["roles"][0]["permissions"][0]["condition"], "user.level >= 3");
    }

    #[test]
    fn users_carry_effective_roles() {
        let t = table(
            "ROLE Base { can: [read] resources: [DB] }\n\
             ROLE Admin extends Base { can: [write] resources: [DB] }\n\
             USER alice { role: [Admin] }",
        );
        let v = emit(&t);
        assert_eq!(v["users"][0]["effective_roles"], json!(["Admin", "Base"]));
        assert_eq!(v["roles"][0]["extends"], Value::Null);
    }
}
