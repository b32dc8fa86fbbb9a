//! Integration tests for the `jobstore` binary.
//!
//! Each test runs the real binary against a temporary repository with an
//! empty global config, so nothing from the host environment leaks in.

use std::process::Stdio;

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

// =============================================================================
// Test Helpers
// =============================================================================

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        temp.child("config.toml").write_str("").unwrap();
        temp.child("repo").create_dir_all().unwrap();
        Self { temp }
    }

    fn root(&self) -> assert_fs::fixture::ChildPath {
        self.temp.child("repo")
    }

    /// A `jobstore` command bound to this workspace.
    fn jobstore(&self) -> Command {
        let mut cmd = Command::cargo_bin("jobstore").unwrap();
        cmd.arg("--config")
            .arg(self.temp.child("config.toml").path())
            .arg("--root")
            .arg(self.root().path())
            .env_remove("RUST_LOG");
        cmd
    }

    fn write_definition(&self, file: &str, contents: &str) -> std::path::PathBuf {
        let child = self.temp.child(file);
        child.write_str(contents).unwrap();
        child.path().to_path_buf()
    }

    fn append(&self, file: &str, contents: &str, author: &str, notes: &str) {
        let path = self.write_definition(file, contents);
        self.jobstore()
            .arg("append")
            .arg(&path)
            .args(["--author", author, "--notes", notes])
            .assert()
            .success();
    }
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn help_mentions_definitions() {
    Command::cargo_bin("jobstore")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("job definitions"));
}

#[test]
fn list_empty_repository() {
    let ws = Workspace::new();
    ws.jobstore()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No definitions."));
}

#[test]
fn append_then_show_head() {
    let ws = Workspace::new();
    ws.append("pricing.json", r#"{"name": "pricing", "amount": 10}"#, "alice", "init");

    ws.root()
        .child("pricing")
        .child("pricing.001.json")
        .assert(predicate::path::is_file());
    ws.root().child("pricing").child("HEAD").assert(predicate::path::is_file());

    ws.jobstore()
        .args(["show", "pricing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"amount\": 10").and(predicate::str::contains("\"revision\": 1")));
}

#[test]
fn append_reports_revision() {
    let ws = Workspace::new();
    let path = ws.write_definition("pricing.json", r#"{"name": "pricing"}"#);
    ws.jobstore()
        .arg("append")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("pricing revision 1"));
    ws.jobstore()
        .arg("append")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("pricing revision 2"));
}

#[test]
fn quiet_append_prints_nothing() {
    let ws = Workspace::new();
    let path = ws.write_definition("pricing.json", r#"{"name": "pricing"}"#);
    ws.jobstore()
        .arg("-q")
        .arg("append")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn show_specific_revision() {
    let ws = Workspace::new();
    ws.append("v1.json", r#"{"name": "pricing", "amount": 10}"#, "alice", "init");
    ws.append("v2.json", r#"{"name": "pricing", "amount": 20}"#, "bob", "raise");

    ws.jobstore()
        .args(["show", "pricing", "--revision", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"amount\": 10"));
    ws.jobstore()
        .args(["show", "pricing", "-r", "head"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"amount\": 20"));
}

#[test]
fn show_missing_definition_fails() {
    let ws = Workspace::new();
    ws.jobstore()
        .args(["show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn show_missing_revision_fails() {
    let ws = Workspace::new();
    ws.append("v1.json", r#"{"name": "pricing"}"#, "alice", "init");
    ws.jobstore()
        .args(["show", "pricing", "-r", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("revision 5"));
}

#[test]
fn history_lists_newest_first() {
    let ws = Workspace::new();
    ws.append("v1.json", r#"{"name": "pricing", "amount": 10}"#, "alice", "init");
    ws.append("v2.json", r#"{"name": "pricing", "amount": 20}"#, "bob", "raise");

    let output = ws
        .jobstore()
        .args(["history", "pricing"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].trim_start().starts_with('2'));
    assert!(lines[0].contains("bob") && lines[0].contains("raise"));
    assert!(lines[1].contains("alice") && lines[1].contains("init"));
}

#[test]
fn list_shows_heads() {
    let ws = Workspace::new();
    ws.append("a.json", r#"{"name": "pricing"}"#, "a", "");
    ws.append("b.json", r#"{"name": "pricing"}"#, "a", "");
    ws.append("c.json", r#"{"name": "etl"}"#, "a", "");

    ws.jobstore()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::diff("etl      1\npricing  2\n"));
}

#[test]
fn append_with_name_override_and_toml_input() {
    let ws = Workspace::new();
    let path = ws.write_definition("draft.toml", "schedule = \"hourly\"\nretries = 3\n");
    ws.jobstore()
        .arg("append")
        .arg(&path)
        .args(["--name", "etl", "--author", "ci"])
        .assert()
        .success();

    ws.jobstore()
        .args(["show", "etl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"etl\"").and(predicate::str::contains("\"retries\": 3")));
}

#[test]
fn append_without_name_field_fails() {
    let ws = Workspace::new();
    let path = ws.write_definition("anon.json", r#"{"amount": 1}"#);
    ws.jobstore()
        .arg("append")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("name"));
}

#[test]
fn repo_config_selects_name_field() {
    let ws = Workspace::new();
    ws.root()
        .child(".jobstore.toml")
        .write_str("name_field = \"job_id\"\n")
        .unwrap();
    ws.append("j.json", r#"{"job_id": "nightly"}"#, "a", "");

    ws.root().child("nightly").assert(predicate::path::is_dir());
}

#[test]
fn missing_root_is_reported() {
    let temp = TempDir::new().unwrap();
    temp.child("config.toml").write_str("").unwrap();
    Command::cargo_bin("jobstore")
        .unwrap()
        .arg("--config")
        .arg(temp.child("config.toml").path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no repository root configured"));
}

#[test]
fn watch_with_duration_exits() {
    let ws = Workspace::new();
    ws.append("a.json", r#"{"name": "pricing"}"#, "a", "");
    ws.jobstore()
        .args(["watch", "--duration", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 definitions"));
}

// =============================================================================
// Cross-process concurrency
// =============================================================================

#[test]
fn concurrent_processes_get_distinct_revisions() {
    const PROCESSES: usize = 6;

    let ws = Workspace::new();
    let path = ws.write_definition("pricing.json", r#"{"name": "pricing", "amount": 10}"#);
    let binary = assert_cmd::cargo::cargo_bin("jobstore");

    let children: Vec<_> = (0..PROCESSES)
        .map(|i| {
            std::process::Command::new(&binary)
                .arg("--config")
                .arg(ws.temp.child("config.toml").path())
                .arg("--root")
                .arg(ws.root().path())
                .arg("append")
                .arg(&path)
                .args(["--author", &format!("proc-{i}")])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .unwrap()
        })
        .collect();

    let mut revisions: Vec<u32> = children
        .into_iter()
        .map(|child| {
            let output = child.wait_with_output().unwrap();
            assert!(
                output.status.success(),
                "append failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            let stdout = String::from_utf8(output.stdout).unwrap();
            stdout
                .trim()
                .rsplit(' ')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        })
        .collect();
    revisions.sort_unstable();
    assert_eq!(revisions, (1..=PROCESSES as u32).collect::<Vec<_>>());

    let dir = ws.root().child("pricing");
    for n in 1..=PROCESSES {
        dir.child(format!("pricing.{n:03}.json"))
            .assert(predicate::path::is_file());
    }

    let history = ws
        .jobstore()
        .args(["history", "pricing"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let history = String::from_utf8(history).unwrap();
    assert_eq!(history.lines().count(), PROCESSES);
    for i in 0..PROCESSES {
        assert!(history.contains(&format!("proc-{i}")), "missing audit for proc-{i}");
    }
}
