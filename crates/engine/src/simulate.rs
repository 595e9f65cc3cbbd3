//! Permission simulation: what a user can do, and whether the user's
//! validity period covers a given day.

use rpl_core::{is_expired, parse_date, SymbolTable};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use time::Date;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPermissions {
    pub user: String,
    /// Effective roles, inheritance and group membership included.
    pub roles: Vec<String>,
    /// Resource pattern to granted actions.
    pub permissions: BTreeMap<String, BTreeSet<String>>,
    /// Patterns whose grant depends on a runtime condition.
    pub conditional: BTreeSet<String>,
    pub valid_from: Option<Date>,
    pub valid_until: Option<Date>,
    pub expired: bool,
    pub not_yet_valid: bool,
}

impl UserPermissions {
    /// Whether the validity period covers the evaluation day.
    pub fn active(&self) -> bool {
        !self.expired && !self.not_yet_valid
    }
}

/// Simulate the grants `user` holds on `today`. `None` if no such user.
///
/// Only role permission blocks are reported; standalone ALLOW/DENY rules
/// apply to every subject and are not attributed to the user.
pub fn user_permissions(table: &SymbolTable, user: &str, today: Date) -> Option<UserPermissions> {
    let declared = table.user(user)?;
    let valid_from = declared.valid_from.as_deref().and_then(parse_date);
    let valid_until = declared.valid_until.as_deref().and_then(parse_date);

    let mut permissions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut conditional = BTreeSet::new();
    for block in table.effective_permissions(user) {
        for resource in &block.resources {
            permissions
                .entry(resource.clone())
                .or_default()
                .extend(block.actions.iter().cloned());
            if block.conditions.is_some() {
                conditional.insert(resource.clone());
            }
        }
    }

    Some(UserPermissions {
        user: declared.name.clone(),
        roles: table.effective_roles(user),
        permissions,
        conditional,
        valid_from,
        valid_until,
        expired: is_expired(valid_until, today),
        not_yet_valid: valid_from.is_some_and(|from| from > today),
    })
}
