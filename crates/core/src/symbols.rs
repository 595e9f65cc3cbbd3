//! Symbol table: the resolved registry of roles, users, resources and groups.
//!
//! Entities reference each other by name. The table is filled once by the
//! analyzer's collection pass and is read-only afterwards.

use crate::ast::{Condition, ResourceType, RuleType};
use crate::pattern::wildcard_match;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

pub type Attributes = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionBlock {
    /// Lower-cased action words, or `*`.
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<PermissionBlock>,
    pub parent_role: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    pub line_number: u32,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Role {
            name: name.into(),
            permissions: Vec::new(),
            parent_role: None,
            attributes: Attributes::new(),
            line_number: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: Attributes,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub line_number: u32,
}

/// A declared resource. `parent` and `children` are derived from path
/// prefixes after all resources are collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub path: String,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub metadata: Attributes,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    pub line_number: u32,
}

impl Resource {
    /// Whether `pattern` (a resource reference from a policy) designates
    /// this resource, by name or by path.
    pub fn matches(&self, pattern: &str) -> bool {
        wildcard_match(pattern, &self.name) || wildcard_match(pattern, &self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<String>,
    pub roles: Vec<String>,
    pub line_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RuleOrigin {
    /// Derived from a permission block of this role.
    Role(String),
    /// A top-level `ALLOW`/`DENY` statement.
    Standalone,
}

/// Flattened enforcement unit: one rule per (permission block, resource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub rule_type: RuleType,
    pub actions: Vec<String>,
    pub resource_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub line_number: u32,
    pub origin: RuleOrigin,
}

impl PolicyRule {
    pub fn covers_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action || a == "*")
    }
}

// ──────────────────────────────────────────────
// Duplicate declarations
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Role,
    User,
    Resource,
    Group,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Role => write!(f, "Role"),
            SymbolKind::User => write!(f, "User"),
            SymbolKind::Resource => write!(f, "Resource"),
            SymbolKind::Group => write!(f, "Group"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredAt {
    Line(u32),
    External,
}

impl fmt::Display for DeclaredAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredAt::Line(n) => write!(f, "at line {}", n),
            DeclaredAt::External => write!(f, "externally"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} '{name}' already declared {previous}")]
pub struct DuplicateNameError {
    pub kind: SymbolKind,
    pub name: String,
    pub previous: DeclaredAt,
}

// ──────────────────────────────────────────────
// Table
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    roles: HashMap<String, Role>,
    users: HashMap<String, User>,
    resources: HashMap<String, Resource>,
    groups: HashMap<String, Group>,
    rules: Vec<PolicyRule>,
    /// Pre-existing roles supplied by the caller; never written to.
    external_roles: HashMap<String, Role>,
}

/// Summary used for diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReport {
    pub counts: SymbolCounts,
    pub roles: Vec<String>,
    pub users: Vec<String>,
    pub resources: Vec<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolCounts {
    pub roles: usize,
    pub users: usize,
    pub resources: usize,
    pub groups: usize,
    pub rules: usize,
}

fn in_declaration_order<'a, T, F>(map: &'a HashMap<String, T>, line: F) -> Vec<&'a T>
where
    F: Fn(&T) -> (u32, &str),
{
    let mut items: Vec<&T> = map.values().collect();
    items.sort_by(|a, b| line(a).cmp(&line(b)));
    items
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn with_external_roles(external_roles: HashMap<String, Role>) -> Self {
        SymbolTable {
            external_roles,
            ..SymbolTable::default()
        }
    }

    // -- Insertion ---------------------------------------------------

    /// Register a role. The first declaration of a name wins; an in-file
    /// role may not reuse the name of an external role.
    pub fn declare_role(&mut self, role: Role) -> Result<(), DuplicateNameError> {
        let previous = if self.external_roles.contains_key(&role.name) {
            Some(DeclaredAt::External)
        } else {
            self.roles
                .get(&role.name)
                .map(|r| DeclaredAt::Line(r.line_number))
        };
        if let Some(previous) = previous {
            return Err(DuplicateNameError {
                kind: SymbolKind::Role,
                name: role.name,
                previous,
            });
        }
        self.roles.insert(role.name.clone(), role);
        Ok(())
    }

    pub fn declare_user(&mut self, user: User) -> Result<(), DuplicateNameError> {
        if let Some(existing) = self.users.get(&user.name) {
            return Err(DuplicateNameError {
                kind: SymbolKind::User,
                name: user.name,
                previous: DeclaredAt::Line(existing.line_number),
            });
        }
        self.users.insert(user.name.clone(), user);
        Ok(())
    }

    pub fn declare_resource(&mut self, resource: Resource) -> Result<(), DuplicateNameError> {
        if let Some(existing) = self.resources.get(&resource.name) {
            return Err(DuplicateNameError {
                kind: SymbolKind::Resource,
                name: resource.name,
                previous: DeclaredAt::Line(existing.line_number),
            });
        }
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }

    pub fn declare_group(&mut self, group: Group) -> Result<(), DuplicateNameError> {
        if let Some(existing) = self.groups.get(&group.name) {
            return Err(DuplicateNameError {
                kind: SymbolKind::Group,
                name: group.name,
                previous: DeclaredAt::Line(existing.line_number),
            });
        }
        self.groups.insert(group.name.clone(), group);
        Ok(())
    }

    pub fn add_rule(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    // -- Lookup ------------------------------------------------------

    /// In-file role, or external role of that name.
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles
            .get(name)
            .or_else(|| self.external_roles.get(name))
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn is_external_role(&self, name: &str) -> bool {
        self.external_roles.contains_key(name)
    }

    /// In-file roles, in declaration order.
    pub fn roles(&self) -> Vec<&Role> {
        in_declaration_order(&self.roles, |r| (r.line_number, r.name.as_str()))
    }

    pub fn users(&self) -> Vec<&User> {
        in_declaration_order(&self.users, |u| (u.line_number, u.name.as_str()))
    }

    pub fn resources(&self) -> Vec<&Resource> {
        in_declaration_order(&self.resources, |r| (r.line_number, r.name.as_str()))
    }

    pub fn groups(&self) -> Vec<&Group> {
        in_declaration_order(&self.groups, |g| (g.line_number, g.name.as_str()))
    }

    /// Flattened rules in declaration order.
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Resource declared under `reference` as a name, or whose path equals it.
    pub fn resolve_resource(&self, reference: &str) -> Option<&Resource> {
        self.resources
            .get(reference)
            .or_else(|| self.resources.values().find(|r| r.path == reference))
    }

    // -- Derived structure ---------------------------------------------

    /// Link each resource to the declared resource whose path is its
    /// longest proper `/`-segment prefix.
    pub(crate) fn link_resource_hierarchy(&mut self) {
        let paths: Vec<(String, String)> = self
            .resources
            .values()
            .map(|r| (r.name.clone(), r.path.clone()))
            .collect();

        let mut parents: HashMap<String, String> = HashMap::new();
        for (name, path) in &paths {
            let parent = paths
                .iter()
                .filter(|(other, other_path)| {
                    other != name && is_path_prefix(other_path, path)
                })
                .max_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| b.0.cmp(&a.0)));
            if let Some((parent_name, _)) = parent {
                parents.insert(name.clone(), parent_name.clone());
            }
        }

        for resource in self.resources.values_mut() {
            resource.parent = parents.get(&resource.name).cloned();
            resource.children.clear();
        }
        let mut links: Vec<(&String, &String)> = parents.iter().collect();
        links.sort();
        for (child, parent) in links {
            if let Some(p) = self.resources.get_mut(parent) {
                p.children.push(child.clone());
            }
        }
    }

    /// Parent chain starting at `role`: `[role, parent, grandparent, ...]`.
    /// Stops at an undefined parent or at the first repeated name.
    pub fn role_hierarchy(&self, role: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(role.to_owned());
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                break;
            }
            let next = self.role(&name).and_then(|r| r.parent_role.clone());
            chain.push(name);
            current = next;
        }
        chain
    }

    /// Roles directly held by `subject`.
    ///
    /// A user holds its own roles plus those of every group listing it as a
    /// member; a group holds its roles; a role holds itself.
    pub fn direct_roles(&self, subject: &str) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        if let Some(user) = self.user(subject) {
            roles.extend(user.roles.iter().cloned());
            for group in self.groups() {
                if group.members.iter().any(|m| m == subject) {
                    roles.extend(group.roles.iter().cloned());
                }
            }
        } else if let Some(group) = self.group(subject) {
            roles.extend(group.roles.iter().cloned());
        } else if self.role(subject).is_some() {
            roles.push(subject.to_owned());
        }
        roles
    }

    /// Direct roles of `subject` closed over inheritance, sorted.
    pub fn effective_roles(&self, subject: &str) -> Vec<String> {
        let mut all = BTreeSet::new();
        for role in self.direct_roles(subject) {
            all.extend(self.role_hierarchy(&role));
        }
        all.into_iter().filter(|r| self.role(r).is_some()).collect()
    }

    /// De-duplicated permission blocks of every effective role of `subject`.
    pub fn effective_permissions(&self, subject: &str) -> Vec<PermissionBlock> {
        let mut out: Vec<PermissionBlock> = Vec::new();
        for role in self.effective_roles(subject) {
            if let Some(r) = self.role(&role) {
                for block in &r.permissions {
                    if !out.contains(block) {
                        out.push(block.clone());
                    }
                }
            }
        }
        out
    }

    pub fn to_report(&self) -> SymbolReport {
        let names = |mut v: Vec<String>| {
            v.sort();
            v
        };
        SymbolReport {
            counts: SymbolCounts {
                roles: self.roles.len(),
                users: self.users.len(),
                resources: self.resources.len(),
                groups: self.groups.len(),
                rules: self.rules.len(),
            },
            roles: names(self.roles.keys().cloned().collect()),
            users: names(self.users.keys().cloned().collect()),
            resources: names(self.resources.keys().cloned().collect()),
            groups: names(self.groups.keys().cloned().collect()),
        }
    }
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/') && path.len() > 1;
    }
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path[prefix.len()..].starts_with('/')
}

/// Maps serialize with sorted keys so equal tables produce equal JSON.
impl Serialize for SymbolTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            roles: BTreeMap<&'a str, &'a Role>,
            users: BTreeMap<&'a str, &'a User>,
            resources: BTreeMap<&'a str, &'a Resource>,
            groups: BTreeMap<&'a str, &'a Group>,
            policies: &'a [PolicyRule],
        }
        fn sorted<T>(map: &HashMap<String, T>) -> BTreeMap<&str, &T> {
            map.iter().map(|(k, v)| (k.as_str(), v)).collect()
        }
        View {
            roles: sorted(&self.roles),
            users: sorted(&self.users),
            resources: sorted(&self.resources),
            groups: sorted(&self.groups),
            policies: &self.rules,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, parent: Option<&str>, line: u32) -> Role {
        Role {
            parent_role: parent.map(str::to_owned),
            line_number: line,
            ..Role::new(name)
        }
    }

    fn resource(name: &str, path: &str, line: u32) -> Resource {
        Resource {
            name: name.into(),
            path: path.into(),
            resource_type: ResourceType::Folder,
            metadata: Attributes::new(),
            parent: None,
            children: Vec::new(),
            line_number: line,
        }
    }

    #[test]
    fn first_declaration_wins() {
        let mut table = SymbolTable::new();
        let mut first = role("Admin", None, 1);
        first.permissions.push(PermissionBlock {
            actions: vec!["read".into()],
            resources: vec!["DB".into()],
            conditions: None,
        });
        assert!(table.declare_role(first).is_ok());
        let err = table
            .declare_role(role("Admin", None, 7))
            .expect_err("duplicate must be rejected");
        assert_eq!(err.to_string(), "Role 'Admin' already declared at line 1");
        assert_eq!(table.role("Admin").map(|r| r.permissions.len()), Some(1));
    }

    #[test]
    fn external_roles_cannot_be_redeclared() {
        let mut external = HashMap::new();
        external.insert("Base".to_string(), role("Base", None, 0));
        let mut table = SymbolTable::with_external_roles(external);
        let err = table
            .declare_role(role("Base", None, 3))
            .expect_err("collision with external role");
        assert_eq!(err.to_string(), "Role 'Base' already declared externally");
        assert!(table.role("Base").is_some());
        assert!(table.roles().is_empty());
    }

    #[test]
    fn hierarchy_stops_on_cycles() {
        let mut table = SymbolTable::new();
        let _ = table.declare_role(role("A", Some("B"), 1));
        let _ = table.declare_role(role("B", Some("A"), 2));
        assert_eq!(table.role_hierarchy("A"), vec!["A", "B"]);
    }

    #[test]
    fn effective_roles_include_groups_and_parents() {
        let mut table = SymbolTable::new();
        let _ = table.declare_role(role("Viewer", None, 1));
        let _ = table.declare_role(role("Editor", Some("Viewer"), 2));
        let _ = table.declare_role(role("Oncall", None, 3));
        let _ = table.declare_user(User {
            name: "alice".into(),
            roles: vec!["Editor".into()],
            attributes: Attributes::new(),
            valid_from: None,
            valid_until: None,
            line_number: 4,
        });
        let _ = table.declare_group(Group {
            name: "Ops".into(),
            members: vec!["alice".into()],
            roles: vec!["Oncall".into()],
            line_number: 5,
        });
        assert_eq!(
            table.effective_roles("alice"),
            vec!["Editor", "Oncall", "Viewer"]
        );
        assert_eq!(table.effective_roles("Ops"), vec!["Oncall"]);
        assert_eq!(table.effective_roles("nobody"), Vec::<String>::new());
    }

    #[test]
    fn resource_hierarchy_from_paths() {
        let mut table = SymbolTable::new();
        let _ = table.declare_resource(resource("Data", "/data", 1));
        let _ = table.declare_resource(resource("Reports", "/data/reports", 2));
        let _ = table.declare_resource(resource("Q1", "/data/reports/q1", 3));
        let _ = table.declare_resource(resource("DataLake", "/datalake", 4));
        table.link_resource_hierarchy();
        assert_eq!(table.resource("Q1").and_then(|r| r.parent.clone()).as_deref(), Some("Reports"));
        assert_eq!(table.resource("DataLake").and_then(|r| r.parent.clone()), None);
        assert_eq!(
            table.resource("Data").map(|r| r.children.clone()),
            Some(vec!["Reports".to_string()])
        );
    }

    #[test]
    fn resources_match_by_name_or_path() {
        let r = resource("Reports", "/data/reports", 1);
        assert!(r.matches("Reports"));
        assert!(r.matches("/data/*"));
        assert!(!r.matches("Data"));
    }

    #[test]
    fn report_lists_names_sorted() {
        let mut table = SymbolTable::new();
        let _ = table.declare_role(role("Zed", None, 1));
        let _ = table.declare_role(role("Alpha", None, 2));
        let report = table.to_report();
        assert_eq!(report.counts.roles, 2);
        assert_eq!(report.roles, vec!["Alpha", "Zed"]);
    }
}
