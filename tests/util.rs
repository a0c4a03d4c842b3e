//! Shared test utilities for integration tests
//!
//! Provides fixture creation and a preconfigured `egate` command
//! used across multiple test files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use serde_json::Value;

/// Build a small workspace with a nested source tree.
pub fn make_fixture() -> assert_fs::TempDir
{
    // Initialize the temporary project root
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("src/lib.rs")
        .write_str("pub fn alpha() -> u32 {\n    1\n}\n")
        .expect("write lib.rs");
    tmp.child("src/util.rs")
        .write_str("pub fn beta() {}\n")
        .expect("write util.rs");
    tmp.child("notes.txt")
        .write_str("foo foo\n")
        .expect("write notes");
    tmp.child("dos.txt")
        .write_str("one\r\ntwo\r\n")
        .expect("write dos");

    // Return the prepared directory to the caller
    tmp
}

/// Directory holding the prompt and change logs for a fixture.
pub fn state_dir(root: &Path) -> PathBuf
{
    root.join(".state")
}

/// `egate` pointed at `root`, with logs kept inside the fixture and
/// no ambient EDITGATE_* settings leaking in.
pub fn egate(root: &Path) -> Command
{
    let mut cmd = Command::cargo_bin("egate").expect("bin");
    for (key, _) in std::env::vars()
    {
        if key.starts_with("EDITGATE_")
        {
            cmd.env_remove(key);
        }
    }
    cmd.current_dir(root)
        .env("EDITGATE_STATE_DIR", state_dir(root))
        .env("EDITGATE_POLL_INTERVAL_MS", "50")
        .env("NO_COLOR", "1")
        .arg("--no-color");
    cmd
}

/// Parse every line of a JSONL log.
pub fn read_log(path: &Path) -> Vec<Value>
{
    match std::fs::read_to_string(path)
    {
        Ok(text) => text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).expect("valid json line"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub fn change_log(root: &Path) -> Vec<Value>
{
    read_log(&state_dir(root).join("file-changes.jsonl"))
}

pub fn prompt_log(root: &Path) -> Vec<Value>
{
    read_log(&state_dir(root).join("ui-prompts.jsonl"))
}
