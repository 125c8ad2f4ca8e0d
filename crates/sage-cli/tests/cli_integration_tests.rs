//! CLI integration tests for sage
//!
//! Runs the sage binary end-to-end against a throwaway database and config
//! directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    #[allow(deprecated)]
    fn sage(&self) -> Command {
        let mut cmd = Command::cargo_bin("sage").unwrap();
        cmd.env("SAGE_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env_remove("RUST_LOG");
        cmd.arg("--database").arg(self.dir.path().join("sage.db"));
        cmd
    }

    /// Run a quiet command and return its trimmed stdout
    fn quiet(&self, args: &[&str]) -> String {
        let output = self.sage().arg("-q").args(args).assert().success();
        String::from_utf8(output.get_output().stdout.clone())
            .unwrap()
            .trim()
            .to_string()
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self
            .sage()
            .args(["--format", "json"])
            .args(args)
            .assert()
            .success();
        serde_json::from_slice(&output.get_output().stdout).unwrap()
    }
}

#[test]
fn test_concept_list_empty() {
    let ws = Workspace::new();
    ws.sage()
        .args(["concept", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No concepts found"));
}

#[test]
fn test_concept_add_and_show() {
    let ws = Workspace::new();
    let id = ws.quiet(&[
        "concept",
        "add",
        "Ownership",
        "--description",
        "Who frees what",
        "--alias",
        "borrowck",
    ]);

    ws.sage()
        .args(["concept", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Concept: Ownership"))
        .stdout(predicate::str::contains("Aliases: borrowck"));

    let shown = ws.json(&["concept", "show", &id]);
    assert_eq!(shown["concept"]["name"], "Ownership");
    assert_eq!(shown["concept"]["description"], "Who frees what");
}

#[test]
fn test_blank_concept_name_fails() {
    let ws = Workspace::new();
    ws.sage()
        .args(["concept", "add", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not be empty"));
}

#[test]
fn test_path_and_merge_workflow() {
    let ws = Workspace::new();
    let a = ws.quiet(&["concept", "add", "A"]);
    let b = ws.quiet(&["concept", "add", "B"]);
    let c = ws.quiet(&["concept", "add", "C"]);

    ws.quiet(&["concept", "link", &a, &b, "-t", "builds_on", "-s", "0.8"]);
    ws.quiet(&["concept", "link", &b, &c, "-t", "builds_on", "-s", "0.6"]);

    ws.sage()
        .args(["concept", "path", &a, &c])
        .assert()
        .success()
        .stdout(predicate::str::contains("A -> B -> C"))
        .stdout(predicate::str::contains("Length: 2"));

    ws.sage()
        .args(["concept", "merge", &b, &a])
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged"));

    let edges = ws.json(&["concept", "edges", &a]);
    let edges = edges.as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["target_id"], c.as_str());
    assert_eq!(edges[0]["strength"], 0.6);

    let path = ws.json(&["concept", "path", &a, &c]);
    assert_eq!(path["length"], 1);

    ws.sage().args(["concept", "show", &b]).assert().failure();
}

#[test]
fn test_path_not_found_prints_message() {
    let ws = Workspace::new();
    let a = ws.quiet(&["concept", "add", "A"]);
    let b = ws.quiet(&["concept", "add", "B"]);

    ws.sage()
        .args(["concept", "path", &a, &b])
        .assert()
        .success()
        .stdout(predicate::str::contains("No path found"));
}

#[test]
fn test_delete_requires_force() {
    let ws = Workspace::new();
    let id = ws.quiet(&["concept", "add", "Temp"]);

    ws.sage()
        .args(["concept", "delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Use --force"));
    ws.sage().args(["concept", "show", &id]).assert().success();

    ws.sage()
        .args(["concept", "delete", &id, "--force"])
        .assert()
        .success();
    ws.sage().args(["concept", "show", &id]).assert().failure();
}

#[test]
fn test_find_and_top() {
    let ws = Workspace::new();
    let rust = ws.quiet(&["concept", "add", "Rust"]);
    let traits = ws.quiet(&["concept", "add", "Traits"]);
    ws.quiet(&["concept", "add", "Trust"]);
    ws.quiet(&["concept", "link", &traits, &rust, "-t", "part_of"]);

    let found = ws.json(&["concept", "find", "rust"]);
    let names: Vec<_> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Rust", "Trust"]);

    ws.sage().args(["concept", "find", "  "]).assert().failure();

    let top = ws.json(&["concept", "top", "--limit", "1"]);
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["connection_count"], 1);
}

#[test]
fn test_review_session_workflow() {
    let ws = Workspace::new();
    let e1 = ws.quiet(&["entry", "add", "Borrowing rules"]);
    let e2 = ws.quiet(&["entry", "add", "Lifetime elision"]);

    let session = ws.quiet(&["session", "start", &e1, &e2]);

    ws.sage()
        .args(["session", "start", &e1])
        .assert()
        .failure()
        .stderr(predicate::str::contains("active session"));

    ws.quiet(&["session", "answer", &session, &e1, "good", "--time-ms", "1500"]);

    ws.sage()
        .args(["session", "answer", &session, &e1, "easy"])
        .assert()
        .failure();
    ws.sage()
        .args(["session", "complete", &session])
        .assert()
        .failure();

    ws.quiet(&["session", "answer", &session, &e2, "forgot", "--time-ms", "2500"]);

    let done = ws.json(&["session", "complete", &session]);
    assert_eq!(done["stats"]["completed_items"], 2);
    assert_eq!(done["stats"]["correct_count"], 1);
    assert_eq!(done["stats"]["average_response_time_ms"], 2000.0);

    ws.sage()
        .args(["session", "active"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No active session"));

    let entry = ws.json(&["entry", "list"]);
    assert_eq!(entry[0]["review_count"], 1);
}

#[test]
fn test_enroll_makes_entry_due() {
    let ws = Workspace::new();
    let id = ws.quiet(&["entry", "add", "Pattern matching"]);

    assert_eq!(ws.json(&["entry", "due"]).as_array().unwrap().len(), 0);
    ws.quiet(&["entry", "enroll", &id]);
    let due = ws.json(&["entry", "due"]);
    assert_eq!(due.as_array().unwrap().len(), 1);
    assert_eq!(due[0]["id"], id.as_str());

    ws.quiet(&["entry", "review", &id, "easy"]);
    assert_eq!(ws.json(&["entry", "due"]).as_array().unwrap().len(), 0);
}

#[test]
fn test_config_roundtrip() {
    let ws = Workspace::new();
    ws.sage()
        .args(["config", "set", "review.due_limit", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set review.due_limit = 7"));
    ws.sage()
        .args(["config", "get", "review.due_limit"])
        .assert()
        .success()
        .stdout(predicate::str::diff("7\n"));
    ws.sage()
        .args(["config", "get", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_doctor_reports_healthy() {
    let ws = Workspace::new();
    ws.sage()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Database"))
        .stdout(predicate::str::contains("All checks passed"));
}
