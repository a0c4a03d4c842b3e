//! End-to-end runs of the `egate` binary against temporary workspaces.

use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;

mod util;
use util::{change_log, make_fixture};

/// `util::egate` wrapped so `write_stdin` and `assert` are available.
fn egate(root: &std::path::Path) -> assert_cmd::Command {
    assert_cmd::Command::from_std(util::egate(root))
}

#[test]
fn test_edit_replaces_every_expected_occurrence() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["edit", "notes.txt", "--old", "foo", "--new", "bar", "--expected", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 replacement(s) via exact match"));

    tmp.child("notes.txt").assert("bar bar\n");

    let log = change_log(tmp.path());
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["path"], "notes.txt");
    assert_eq!(log[0]["changeType"], "modified");
    assert_eq!(log[0]["tool"], "edit_file");
    assert_eq!(log[0]["mode"], "edit");
}

#[test]
fn test_edit_count_mismatch_leaves_file_alone() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["edit", "notes.txt", "--old", "foo", "--new", "bar"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected 1 occurrence(s) but found 2"));

    tmp.child("notes.txt").assert("foo foo\n");
    assert!(change_log(tmp.path()).is_empty());
}

#[test]
fn test_edit_keeps_crlf_line_endings() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["edit", "dos.txt", "--old", "one\ntwo", "--new", "uno\ndos"])
        .assert()
        .success();

    tmp.child("dos.txt").assert("uno\r\ndos\r\n");
}

#[test]
fn test_edit_with_empty_old_refuses_existing_file() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["edit", "notes.txt", "--new", "clobber"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));

    egate(tmp.path())
        .args(["edit", "docs/new.md", "--new", "# New\n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created docs/new.md"));
    tmp.child("docs/new.md").assert("# New\n");
}

#[test]
fn test_write_overwrite_then_append_from_stdin() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["write", "out/log.txt", "--contents", "first\n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created out/log.txt"));

    egate(tmp.path())
        .args(["write", "out/log.txt", "--append"])
        .write_stdin("second\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Appended out/log.txt"));

    tmp.child("out/log.txt").assert("first\nsecond\n");

    let modes: Vec<String> = change_log(tmp.path())
        .iter()
        .map(|r| r["mode"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(modes, vec!["overwrite", "append"]);
}

#[test]
fn test_write_outside_root_is_rejected() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["write", "../escape.txt", "--contents", "x"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("escapes the workspace root"));

    assert!(!tmp.path().parent().unwrap().join("escape.txt").exists());
}

#[test]
fn test_delete_directory_records_removal() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["delete", "src"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted src"));

    assert!(!tmp.path().join("src").exists());
    let log = change_log(tmp.path());
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["changeType"], "deleted");
    assert_eq!(log[0]["mode"], "delete");
}

#[test]
fn test_delete_missing_path_fails() {
    let tmp = make_fixture();

    egate(tmp.path())
        .args(["delete", "ghost.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_patch_from_stdin_applies_under_src() {
    let tmp = make_fixture();
    let patch = "\
--- a/lib.rs
+++ b/lib.rs
@@ -1,3 +1,3 @@
 pub fn alpha() -> u32 {
-    1
+    2
 }
";

    egate(tmp.path())
        .args(["patch", "--dir", "src"])
        .write_stdin(patch)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied patch in src/"));

    tmp.child("src/lib.rs").assert("pub fn alpha() -> u32 {\n    2\n}\n");
}

#[test]
fn test_friendly_patch_adds_and_updates() {
    let tmp = make_fixture();
    let patch = "\
*** Begin Patch
*** Add File: src/extra.rs
+pub fn gamma() {}
*** Update File: src/util.rs
@@
-pub fn beta() {}
+pub fn beta() -> bool { true }
*** End Patch
";

    egate(tmp.path())
        .arg("patch")
        .write_stdin(patch)
        .assert()
        .success();

    tmp.child("src/extra.rs").assert("pub fn gamma() {}\n");
    tmp.child("src/util.rs").assert("pub fn beta() -> bool { true }\n");
    assert_eq!(change_log(tmp.path()).len(), 2);
}

#[test]
fn test_failing_patch_changes_nothing() {
    let tmp = make_fixture();
    let patch = "\
--- a/src/util.rs
+++ b/src/util.rs
@@ -1 +1 @@
-pub fn missing() {}
+pub fn replaced() {}
";

    egate(tmp.path())
        .arg("patch")
        .write_stdin(patch)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Patch application failed"));

    tmp.child("src/util.rs").assert("pub fn beta() {}\n");
    assert!(change_log(tmp.path()).is_empty());
}

#[test]
fn test_call_returns_json_result() {
    let tmp = make_fixture();
    let call = json!({
        "tool": "write_file",
        "arguments": { "path": "b64.txt", "contents_base64": "aGVsbG8K" }
    });

    let out = egate(tmp.path())
        .arg("call")
        .write_stdin(call.to_string())
        .output()
        .expect("run");
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["result"]["status"], "ok");
    assert_eq!(v["result"]["tool"], "write_file");
    assert_eq!(v["result"]["confirmed"], false);
    assert_eq!(fs::read_to_string(tmp.path().join("b64.txt")).unwrap(), "hello\n");
}

#[test]
fn test_call_failure_is_structured() {
    let tmp = make_fixture();
    let call = json!({
        "tool": "edit_file",
        "arguments": { "path": "notes.txt", "old_string": "nope", "new_string": "x" }
    });

    let out = egate(tmp.path())
        .arg("call")
        .write_stdin(call.to_string())
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(1));

    let v: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["status"], "error");
    assert_eq!(v["error"], "no_match_found");
}

#[test]
fn test_init_writes_config_once() {
    let tmp = assert_fs::TempDir::new().unwrap();

    egate(tmp.path()).arg("init").assert().success();
    tmp.child("editgate.toml")
        .assert(predicate::str::contains("server_name = \"code_writer\""));

    egate(tmp.path())
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_file_sets_server_name() {
    let tmp = make_fixture();
    tmp.child("editgate.toml")
        .write_str("server_name = \"writer\"\nrun_id = \"run-42\"\n")
        .unwrap();

    egate(tmp.path())
        .args(["write", "a.txt", "--contents", "a"])
        .assert()
        .success();

    let log = change_log(tmp.path());
    assert_eq!(log[0]["server"], "writer");
    assert_eq!(log[0]["runId"], "run-42");
}
