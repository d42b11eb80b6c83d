use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The binary with default settings, independent of the user's config.
fn macroplay() -> Command {
    let mut cmd = Command::cargo_bin("macroplay").unwrap();
    cmd.env("MACROPLAY_CONFIG", fixture_path("missing_config.json"))
        .env_remove("RUST_LOG");
    cmd
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("macroplay_cli_{}_{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_help_exits_zero() {
    macroplay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("macroplay"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("fmt"));
}

#[test]
fn test_run_prints_messages() {
    let fixture = fixture_path("hello.macro");
    macroplay()
        .args(["run", fixture.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello World"))
        .stdout(predicate::str::contains("total: 6"));
}

#[test]
fn test_run_follows_calls() {
    let fixture = fixture_path("calls.macro");
    let assert = macroplay()
        .args(["run", fixture.to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["greetings from caller", "back in main"]);
}

#[test]
fn test_run_parse_error_exits_two() {
    let fixture = fixture_path("unclosed_loop.macro");
    macroplay()
        .args(["run", fixture.to_str().unwrap()])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("before").not())
        .stderr(predicate::str::contains("unclosed_loop.macro:2"))
        .stderr(predicate::str::contains("never closed"));
}

#[test]
fn test_run_call_depth_exits_three() {
    let fixture = fixture_path("recursive.macro");
    macroplay()
        .args(["run", fixture.to_str().unwrap()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("CALL depth limit of 16 exceeded"));
}

#[test]
fn test_run_missing_file_exits_four() {
    macroplay()
        .args(["run", "/nonexistent/script.macro"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_run_simulated_window_flag() {
    let fixture = fixture_path("window.macro");
    macroplay()
        .args(["run", fixture.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("no Editor window"))
        .stderr(predicate::str::contains("[WARNING]"));

    macroplay()
        .args(["run", fixture.to_str().unwrap(), "--window", "Editor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("focused Editor"))
        .stdout(predicate::str::contains("no Editor window").not());
}

#[test]
fn test_run_speed_flag_shortens_waits() {
    let fixture = fixture_path("long_wait.macro");
    let start = std::time::Instant::now();
    macroplay()
        .args(["run", fixture.to_str().unwrap(), "--speed", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("finished"));
    assert!(start.elapsed() < std::time::Duration::from_millis(1500));
}

#[test]
fn test_run_strict_vars_reports_undefined() {
    let fixture = fixture_path("strict.macro");
    macroplay()
        .args(["run", fixture.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("value: "));

    macroplay()
        .args(["run", fixture.to_str().unwrap(), "--strict-vars"])
        .assert()
        .success()
        .stdout(predicate::str::contains("after"))
        .stdout(predicate::str::contains("value:").not())
        .stderr(predicate::str::contains("undefined variable $missing"));
}

#[test]
fn test_run_writes_json_lines_log() {
    let dir = temp_dir("runlog");
    let fixture = fixture_path("hello.macro");
    macroplay()
        .args([
            "run",
            fixture.to_str().unwrap(),
            "--run-log-dir",
            dir.to_str().unwrap(),
        ])
        .assert()
        .success();

    let log = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|e| e == "jsonl"))
        .expect("a run log");
    let contents = std::fs::read_to_string(&log).unwrap();
    let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert!(first.get("event").is_some());
    assert!(contents.contains("Hello World"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_check_reports_command_count() {
    let fixture = fixture_path("hello.macro");
    macroplay()
        .args(["check", fixture.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok (5 commands)"));
}

#[test]
fn test_check_parse_error() {
    let good = fixture_path("hello.macro");
    let bad = fixture_path("unclosed_loop.macro");
    macroplay()
        .args(["check", good.to_str().unwrap(), bad.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Parse error"));
}

#[test]
fn test_fmt_prints_canonical_form() {
    let fixture = fixture_path("messy.macro");
    let assert = macroplay()
        .args(["fmt", fixture.to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("LOOP $n\n    PRINT \"hi there\"\nENDLOOP\n"));
    assert!(!stdout.contains('#'));
}

#[test]
fn test_fmt_check_flags_unformatted_files() {
    let formatted = fixture_path("formatted.macro");
    macroplay()
        .args(["fmt", "--check", formatted.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let messy = fixture_path("messy.macro");
    macroplay()
        .args(["fmt", "--check", messy.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("would reformat"));
}

#[test]
fn test_fmt_write_rewrites_in_place() {
    let dir = temp_dir("fmt");
    let path = dir.join("script.macro");
    std::fs::copy(fixture_path("messy.macro"), &path).unwrap();

    macroplay()
        .args(["fmt", "--write", path.to_str().unwrap()])
        .assert()
        .success();
    macroplay()
        .args(["fmt", "--check", path.to_str().unwrap()])
        .assert()
        .success();
    let _ = std::fs::remove_dir_all(&dir);
}
