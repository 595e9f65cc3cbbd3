//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `rpl` binary and verify exit codes,
//! stdout content, and stderr content.
//!
//! All tests set `current_dir` to the workspace root so that relative
//! paths to fixtures resolve correctly.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `rpl` binary, rooted at workspace.
fn rpl() -> Command {
    let mut cmd = cargo_bin_cmd!("rpl");
    cmd.current_dir(workspace_root());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).expect("stdout is JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    rpl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("RPL role/policy language toolchain"));
}

#[test]
fn version_exits_0() {
    rpl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rpl"));
}

// ──────────────────────────────────────────────
// 2. Tokenize and parse
// ──────────────────────────────────────────────

#[test]
fn tokenize_prints_token_stream() {
    rpl()
        .args(["tokenize", "fixtures/basic.rpl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1:1\tROLE\tROLE"))
        .stdout(predicate::str::contains("IDENTIFIER\tAdmin"))
        .stdout(predicate::str::contains("EOF").not());
}

#[test]
fn tokenize_json_has_no_errors() {
    let json = stdout_json(rpl().args(["--output", "json", "tokenize", "fixtures/basic.rpl"]));
    assert!(json["errors"].as_array().unwrap().is_empty());
    assert_eq!(json["tokens"][0]["type"], "ROLE");
    assert_eq!(json["tokens"][0]["line"], 1);
}

#[test]
fn tokenize_reports_lex_errors() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.rpl");
    fs::write(&file, "ROLE A { can: [read] resources: [DB] } @").unwrap();
    rpl()
        .args(["tokenize", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lexical error"));
}

#[test]
fn parse_prints_syntax_tree() {
    rpl()
        .args(["parse", "fixtures/basic.rpl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Admin"));
}

#[test]
fn parse_reports_every_syntax_error() {
    rpl()
        .args(["parse", "fixtures/syntax_errors.rpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 1:"))
        .stderr(predicate::str::contains("line 3:"));
}

#[test]
fn missing_file_exits_1() {
    rpl()
        .args(["parse", "fixtures/does_not_exist.rpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading file"));
}

// ──────────────────────────────────────────────
// 3. Validate
// ──────────────────────────────────────────────

#[test]
fn validate_valid_policy() {
    rpl()
        .args(["validate", "fixtures/basic.rpl"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("valid"));
}

#[test]
fn validate_reports_undefined_parent() {
    rpl()
        .args(["validate", "fixtures/undefined_parent.rpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("extends undefined role 'B'"));
}

#[test]
fn validate_json_invalid_goes_to_stderr() {
    let out = rpl()
        .args(["--output", "json", "validate", "fixtures/cycle.rpl"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["valid"], false);
    assert!(json["errors"][0]
        .as_str()
        .unwrap()
        .contains("Circular inheritance detected"));
}

#[test]
fn validate_quiet_prints_nothing() {
    rpl()
        .args(["--quiet", "validate", "fixtures/basic.rpl"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 4. Compile
// ──────────────────────────────────────────────

#[test]
fn compile_json_result() {
    let json = stdout_json(rpl().args(["--output", "json", "compile", "fixtures/basic.rpl"]));
    assert_eq!(json["success"], true);
    assert_eq!(json["policy_id"].as_str().unwrap().len(), 64);
    let artifact: serde_json::Value =
        serde_json::from_str(json["generated_artifact"].as_str().unwrap()).unwrap();
    assert_eq!(artifact["format"], "rpl-policy");
}

#[test]
fn compile_writes_artifact() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("policy.json");
    rpl()
        .args(["compile", "fixtures/enterprise.rpl", "--out", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));
    let artifact: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(artifact["version"], "1.0");
    assert!(artifact["roles"].as_array().unwrap().len() >= 3);
}

#[test]
fn compile_out_without_codegen_fails() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("policy.json");
    rpl()
        .args([
            "compile",
            "fixtures/basic.rpl",
            "--no-codegen",
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no artifact generated"));
    assert!(!out.exists());
}

#[test]
fn compile_parse_mode_skips_analysis() {
    let json = stdout_json(rpl().args([
        "--output",
        "json",
        "compile",
        "fixtures/undefined_parent.rpl",
        "--mode",
        "parse",
    ]));
    assert_eq!(json["success"], true);
    assert!(json["symbol_table"].is_null());
    assert!(json["generated_artifact"].is_null());
}

#[test]
fn compile_duplicate_role_fails() {
    rpl()
        .args(["compile", "fixtures/duplicate_role.rpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("compilation failed"));
}

// ──────────────────────────────────────────────
// 5. Check
// ──────────────────────────────────────────────

#[test]
fn check_allows_granted_action() {
    rpl()
        .args([
            "check",
            "fixtures/basic.rpl",
            "--subject",
            "Alice",
            "--action",
            "read",
            "--resource",
            "DB",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOW: Alice read DB"));
}

#[test]
fn check_default_deny() {
    let json = stdout_json(rpl().args([
        "--output",
        "json",
        "check",
        "fixtures/basic.rpl",
        "--subject",
        "Alice",
        "--action",
        "delete",
        "--resource",
        "DB",
    ]));
    assert_eq!(json["allowed"], false);
    assert_eq!(json["reason"], "No matching rules, default deny");
}

#[test]
fn check_condition_uses_context() {
    let args = [
        "check",
        "fixtures/enterprise.rpl",
        "--subject",
        "bob",
        "--action",
        "delete",
        "--resource",
        "db.orders",
    ];
    // Without context the DENY condition cannot be evaluated, so it still denies.
    rpl()
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains("DENY: bob delete db.orders"));
    rpl()
        .args(args)
        .args(["--context", r#"{"user": {"role": "dev"}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("DENY"))
        .stdout(predicate::str::contains("Access denied by explicit DENY rule"));
    rpl()
        .args(args)
        .args(["--context", r#"{"user": {"role": "sre"}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOW"));
}

#[test]
fn check_explain_lists_steps() {
    rpl()
        .args([
            "check",
            "fixtures/basic.rpl",
            "--subject",
            "Alice",
            "--action",
            "write",
            "--resource",
            "DB",
            "--explain",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("evaluated 1 rule(s)"))
        .stdout(predicate::str::contains("=> matched"));
}

#[test]
fn check_rejects_non_object_context() {
    rpl()
        .args([
            "check",
            "fixtures/basic.rpl",
            "--subject",
            "Alice",
            "--action",
            "read",
            "--resource",
            "DB",
            "--context",
            "[1, 2]",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a JSON object"));
}

// ──────────────────────────────────────────────
// 6. Permissions
// ──────────────────────────────────────────────

#[test]
fn permissions_for_active_user() {
    rpl()
        .args([
            "permissions",
            "fixtures/enterprise.rpl",
            "--user",
            "bob",
            "--as-of",
            "2024-06-01",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Roles: Analyst, Viewer"))
        .stdout(predicate::str::contains("Validity: 2024-01-01 .. 2030-12-31\n"));
}

#[test]
fn permissions_flags_expired_user() {
    let json = stdout_json(rpl().args([
        "--output",
        "json",
        "permissions",
        "fixtures/enterprise.rpl",
        "--user",
        "bob",
        "--as-of",
        "2031-01-01",
    ]));
    assert_eq!(json["active"], false);
    assert_eq!(json["report"]["expired"], true);
}

#[test]
fn permissions_unknown_user_fails() {
    rpl()
        .args(["permissions", "fixtures/basic.rpl", "--user", "mallory"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("user 'mallory' is not declared"));
}

// ──────────────────────────────────────────────
// 7. Configuration
// ──────────────────────────────────────────────

#[test]
fn config_file_sets_compile_mode() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("rpl.toml");
    fs::write(&config, "[compile]\nmode = \"validate\"\n").unwrap();
    let json = stdout_json(rpl().args([
        "--output",
        "json",
        "--config",
        config.to_str().unwrap(),
        "compile",
        "fixtures/basic.rpl",
    ]));
    assert_eq!(json["success"], true);
    assert!(json["generated_artifact"].is_null());
    assert!(json["symbol_table"].is_object());
}

#[test]
fn invalid_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("rpl.toml");
    fs::write(&config, "[engine]\ncache_key = \"sometimes\"\n").unwrap();
    rpl()
        .args(["--config", config.to_str().unwrap(), "validate", "fixtures/basic.rpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}
