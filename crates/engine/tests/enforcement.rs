//! Enforcement over compiled fixtures.

use rpl_core::{compile, CompileOptions};
use rpl_engine::{AccessRequest, Context, PolicyEngine};
use serde_json::json;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture_engine(name: &str) -> PolicyEngine {
    let source = std::fs::read_to_string(workspace_root().join("fixtures").join(name)).unwrap();
    let result = compile(&source, &CompileOptions::default());
    assert!(result.success, "{:?}", result.errors);
    PolicyEngine::new(result.symbol_table.unwrap())
}

fn ctx(v: serde_json::Value) -> Context {
    v.as_object().cloned().unwrap_or_default()
}

#[test]
fn scenario_e_cache_is_context_blind() {
    let source = "ROLE Analyst { permissions: [ { actions: [execute], resources: [db.*], \
                  conditions: time.hour >= 8 AND time.hour < 18 } ] }";
    let result = compile(source, &CompileOptions::default());
    let engine = PolicyEngine::new(result.symbol_table.unwrap());
    let working_hours = ctx(json!({"time": {"hour": 10}}));
    let night = ctx(json!({"time": {"hour": 23}}));

    let first = engine.check_access("bob", "execute", "db.orders", &working_hours);
    let second = engine.check_access("bob", "execute", "db.orders", &night);
    assert!(first.allowed);
    assert_eq!(first, second);

    engine.clear_cache();
    let fresh = engine.check_access("bob", "execute", "db.orders", &night);
    assert!(!fresh.allowed);
}

#[test]
fn explicit_deny_beats_admin_wildcard() {
    let engine = fixture_engine("enterprise.rpl");
    let outsider = ctx(json!({"user": {"role": "dev"}}));
    let d = engine.check_access("alice", "delete", "db.orders", &outsider);
    assert!(!d.allowed);
    assert_eq!(d.reason, "Access denied by explicit DENY rule");

    let sre = ctx(json!({"user": {"role": "sre"}}));
    let d = engine.check_access("alice", "delete", "db.users", &sre);
    assert!(d.allowed);
}

#[test]
fn deny_without_context_still_denies() {
    let engine = fixture_engine("enterprise.rpl");
    let d = engine.check_access("alice", "delete", "db.orders", &Context::new());
    assert!(!d.allowed);
    assert_eq!(d.reason, "Access denied by explicit DENY rule");
}

#[test]
fn default_deny_on_basic_policy() {
    let engine = fixture_engine("basic.rpl");
    let d = engine.check_access("Alice", "delete", "DB", &Context::new());
    assert!(!d.allowed);
    assert_eq!(d.reason, "No matching rules, default deny");
    assert!(engine.check_access("Alice", "write", "DB", &Context::new()).allowed);
}

#[test]
fn quoted_path_rules_match_literally() {
    let engine = fixture_engine("enterprise.rpl");
    let internal = ctx(json!({"request": {"ip": "10.0.3.7"}}));
    let d = engine.check_access("guest", "read", "/api/users", &internal);
    assert!(d.allowed);
    assert!(d
        .matched_rules
        .iter()
        .any(|r| r.resource_pattern == "/api/users"));
}

#[test]
fn batch_matches_single_checks() {
    let engine = fixture_engine("enterprise.rpl");
    let requests = vec![
        AccessRequest::new("alice", "read", "Reports"),
        AccessRequest::new("carol", "deploy", "nowhere"),
        AccessRequest::new("bob", "write", "Reports").with_context(ctx(json!({"user": {"level": 4}}))),
    ];
    let batch = engine.batch_check_access(&requests);
    engine.clear_cache();
    let single: Vec<_> = requests.iter().map(|r| engine.check(r)).collect();
    assert_eq!(batch, single);
    assert_eq!(
        batch.iter().map(|d| d.allowed).collect::<Vec<_>>(),
        vec![true, true, true]
    );
}
