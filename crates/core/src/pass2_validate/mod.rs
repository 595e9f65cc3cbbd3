//! Pass 2: validation -- inheritance, cycles, cross-references, policy
//! consistency and user validity periods.
//!
//! Runs only when pass 1 rejected no duplicate declarations. Every check
//! appends to the same diagnostic list; nothing stops early.

mod consistency;
mod references;
mod roles;
pub mod validity;

use crate::error::Diagnostic;
use crate::symbols::SymbolTable;

pub fn validate(table: &mut SymbolTable, diags: &mut Vec<Diagnostic>) {
    table.link_resource_hierarchy();

    roles::check_inheritance(table, diags);
    roles::check_cycles(table, diags);
    references::check_user_roles(table, diags);
    references::check_groups(table, diags);
    references::check_resource_refs(table, diags);
    consistency::check_conflicts(table, diags);
    validity::check_user_validity(table, diags);
}
