//! End-to-end CLI tests using `assert_cmd`.
//!
//! These tests invoke the actual compiled binary and verify exit codes
//! and output. The AI parser is switched off and the config directory points
//! at a temporary directory, so nothing touches the network or the real home.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const COURSE: &str = "=== TRAIL ===\ntitle: Vibe Coding\n=== MODULE ===\ntitle: Intro\ntype: theory\n---\nHello\n=== QUESTIONS ===\nQ: What is X?\n- A*\n- B\n";

fn cmd() -> Command {
    Command::cargo_bin("trailport").unwrap()
}

/// Binary with an isolated config location and no AI settings.
fn isolated(home: &Path) -> Command {
    let mut c = cmd();
    c.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("AI_PARSER_ENABLED")
        .env_remove("AI_API_KEY");
    c
}

// ─── Help / version ─────────────────────────────────────────────────────

#[test]
fn test_help_shows_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("sample"))
        .stdout(predicate::str::contains("doctor"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_version_shows_semver() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("trailport"));
}

// ─── Import ─────────────────────────────────────────────────────────────

#[test]
fn test_import_requires_path() {
    cmd()
        .arg("import")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PATHS"));
}

#[test]
fn test_import_json_prints_trails() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("course.txt");
    fs::write(&file, COURSE).unwrap();

    isolated(dir.path())
        .args(["import", "--no-ai", "--json"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("Vibe Coding"))
        .stdout(predicate::str::contains("\"title\": \"Intro\""));
}

#[test]
fn test_import_writes_output_file() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("course.md");
    fs::write(&file, "# Git\n\n## Commits\n\nSnapshots.\n\n## Branches\n\nPointers.\n").unwrap();
    let out = dir.path().join("result.json");

    isolated(dir.path())
        .args(["import", "--no-ai", "-o"])
        .arg(&out)
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Branches"));

    let written = fs::read_to_string(&out).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(value["trails"][0]["modules"].as_array().unwrap().len(), 2);
}

#[test]
fn test_import_directory_merges_files() {
    let dir = tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("a.txt"), COURSE).unwrap();
    fs::write(docs.join("b.txt"), COURSE).unwrap();
    fs::write(docs.join("ignored.bin"), [0u8, 1, 2]).unwrap();

    let output = isolated(dir.path())
        .args(["import", "--no-ai", "--json"])
        .arg(&docs)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let slugs: Vec<&str> = value["trails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs.len(), 2);
    assert_ne!(slugs[0], slugs[1]);
}

#[test]
fn test_import_missing_path_fails() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["import", "--no-ai", "/definitely/not/here.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_import_empty_document_fails() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("empty.txt");
    fs::write(&file, "   \n").unwrap();

    isolated(dir.path())
        .args(["import", "--no-ai", "--json"])
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"success\": false"));
}

// ─── Detect / analyze ───────────────────────────────────────────────────

#[test]
fn test_detect_markdown() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("notes.md");
    fs::write(&file, "# Title\n\nSome text").unwrap();

    cmd()
        .arg("detect")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("md"));
}

#[test]
fn test_detect_sniffs_content_without_extension() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("upload");
    fs::write(&file, "{\"trails\": []}").unwrap();

    cmd()
        .arg("detect")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("json"));
}

#[test]
fn test_analyze_shows_confidence() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("course.txt");
    fs::write(&file, COURSE).unwrap();

    cmd()
        .arg("analyze")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Confidence"));
}

#[test]
fn test_analyze_json() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("course.txt");
    fs::write(&file, COURSE).unwrap();

    let output = cmd().args(["analyze", "--json"]).arg(&file).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["detectedTrails"], 1);
    assert!(value["confidenceDetails"]["criteria"].is_array());
}

// ─── Sample ─────────────────────────────────────────────────────────────

#[test]
fn test_sample_txt() {
    cmd()
        .args(["sample", "txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== TRAIL ==="));
}

#[test]
fn test_sample_json_is_valid_json() {
    let output = cmd().args(["sample", "json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value["trails"].is_array());
}

#[test]
fn test_sample_binary_format_prints_hint() {
    cmd()
        .args(["sample", "docx"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Heading 1"));
}

#[test]
fn test_sample_rejects_invalid_format() {
    cmd()
        .args(["sample", "exe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ─── Init / doctor ──────────────────────────────────────────────────────

#[test]
fn test_init_creates_config() {
    let dir = tempdir().unwrap();

    isolated(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration"));

    let config = dir.path().join(".config").join("trailport").join("config.toml");
    let content = fs::read_to_string(&config).unwrap();
    assert!(content.contains("[thresholds]"));

    isolated(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    isolated(dir.path())
        .args(["init", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration"));
}

#[test]
fn test_doctor_without_ai() {
    let dir = tempdir().unwrap();

    isolated(dir.path())
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("AI parsing is disabled"));
}
