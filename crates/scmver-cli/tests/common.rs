#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Whether a real `git` binary is available; tests skip themselves
/// otherwise.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.invalid",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A repository with one commit tagged `v1.2.3`.
pub fn tagged_repo() -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    git(temp.path(), &["init", "-q"]);
    fs::write(temp.path().join("file.txt"), "one\n").expect("write file");
    git(temp.path(), &["add", "file.txt"]);
    git(temp.path(), &["commit", "-q", "-m", "first"]);
    git(temp.path(), &["tag", "v1.2.3"]);
    temp
}
