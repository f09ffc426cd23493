//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A command isolated from the caller's config files and credentials.
fn examforge(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("examforge").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("GEMINI_API_KEY")
        .env_remove("GEMINI_API_KEYS")
        .env_remove("GEMINI_MODEL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_lifecycle_commands() {
    let dir = TempDir::new().unwrap();
    examforge(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("submit"))
        .stdout(predicate::str::contains("evaluate"));
}

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();

    examforge(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examforge.toml"));

    let content = std::fs::read_to_string(dir.path().join("examforge.toml")).unwrap();
    assert!(content.contains("${GEMINI_API_KEY}"));
    assert!(content.contains("[evaluation]"));
}

#[test]
fn init_skips_existing_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("examforge.toml"), "backend = \"mock\"\n").unwrap();

    examforge(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(dir.path().join("examforge.toml")).unwrap();
    assert_eq!(content, "backend = \"mock\"\n");
}

#[test]
fn patterns_cover_every_board_and_band() {
    let dir = TempDir::new().unwrap();
    let output = examforge(&dir)
        .args(["patterns", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let patterns: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let patterns = patterns.as_array().unwrap();
    assert_eq!(patterns.len(), 9);
    for pattern in patterns {
        let sum: u64 = pattern["sections"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["question_count"].as_u64().unwrap() * s["marks_each"].as_u64().unwrap())
            .sum();
        assert_eq!(sum, pattern["total_marks"].as_u64().unwrap(), "{pattern}");
    }
}

#[test]
fn patterns_filter_by_board() {
    let dir = TempDir::new().unwrap();
    examforge(&dir)
        .args(["patterns", "--board", "icse"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ICSE"))
        .stdout(predicate::str::contains("CBSE").not());
}

#[test]
fn create_without_api_key_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    examforge(&dir)
        .args([
            "create",
            "--name",
            "Asha",
            "--email",
            "asha@example.com",
            "--board",
            "CBSE",
            "--class",
            "10",
            "--subject",
            "Science",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("no Gemini API key configured"));
}

#[test]
fn unknown_board_is_rejected_by_the_parser() {
    let dir = TempDir::new().unwrap();
    examforge(&dir)
        .args([
            "create", "--name", "Asha", "--email", "a@b.in", "--board", "IB", "--class", "10",
            "--subject", "Science",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported board"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    examforge(&dir)
        .args(["--config", "nowhere.toml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn answer_needs_something_to_save() {
    let dir = TempDir::new().unwrap();
    examforge(&dir)
        .args([
            "answer",
            "6f1c1b0e-8d4f-4a36-9d1e-2b8f0b9f6c11",
            "--question",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to save"));
}
