// Tests for the snp-pixi binary
use assert_cmd::Command;
use predicates::prelude::*;
use snp_pixi::exit_codes;
use std::path::Path;
use tempfile::TempDir;

const HOOKS_YAML: &str = r#"
- id: echo-files
  name: echo files
  entry: echo ran
  language: pixi
  language_version: system
- id: fail
  entry: sh -c 'exit 3' --
  language: pixi
  language_version: system
  pass_filenames: false
- id: not-pixi
  entry: echo
  language: python
"#;

#[cfg(unix)]
fn fake_system_pixi(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let script = r#"#!/bin/sh
cmd="$1"
shift
case "$cmd" in
  init) printf '[dependencies]\n' > pixi.toml ;;
  add) manifest="$2"; shift 2; printf '%s\n' "$@" >> "$manifest" ;;
  install) ;;
  run) shift 3; exec "$@" ;;
  *) exit 2 ;;
esac
"#;
    let pixi = dir.join("pixi");
    std::fs::write(&pixi, script).unwrap();
    let mut perms = std::fs::metadata(&pixi).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&pixi, perms).unwrap();
}

fn path_with(dir: &Path) -> String {
    format!(
        "{}:{}",
        dir.display(),
        std::env::var("PATH").unwrap_or_default()
    )
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("snp-pixi"));
}

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_conflicting_verbosity_flags() {
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.args(["--verbose", "--quiet", "default-version"])
        .assert()
        .code(exit_codes::CLI_ERROR)
        .stderr(predicate::str::contains("Conflicting arguments"));
}

#[test]
fn test_default_version_without_pixi_on_path() {
    let empty = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.env("PATH", empty.path())
        .arg("default-version")
        .assert()
        .code(exit_codes::SUCCESS)
        .stdout("default\n");
}

#[cfg(unix)]
#[test]
fn test_default_version_with_pixi_on_path() {
    let tools = TempDir::new().unwrap();
    fake_system_pixi(tools.path());

    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.env("PATH", path_with(tools.path()))
        .arg("default-version")
        .assert()
        .success()
        .stdout("system\n");
}

#[test]
fn test_health_check_reports_missing_environment() {
    let repo = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.args(["health-check", "--language-version", "v0.37.0", "--prefix"])
        .arg(repo.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unhealthy"))
        .stdout(predicate::str::contains("pixi_env-v0.37.0"));
}

#[test]
fn test_run_without_hook_manifest() {
    let repo = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.args(["run", "anything", "--repo"])
        .arg(repo.path())
        .assert()
        .code(exit_codes::CONFIG_ERROR)
        .stderr(predicate::str::contains(".pre-commit-hooks.yaml"));
}

#[test]
fn test_run_unknown_hook_lists_available() {
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join(".pre-commit-hooks.yaml"), HOOKS_YAML).unwrap();

    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.args(["run", "missing", "--repo"])
        .arg(repo.path())
        .assert()
        .code(exit_codes::HOOK_FAILURE)
        .stderr(predicate::str::contains("echo-files, fail, not-pixi"));
}

#[test]
fn test_run_rejects_other_languages() {
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join(".pre-commit-hooks.yaml"), HOOKS_YAML).unwrap();

    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.args(["run", "not-pixi", "--repo"])
        .arg(repo.path())
        .assert()
        .code(exit_codes::CONFIG_ERROR)
        .stderr(predicate::str::contains("not a pixi hook"));
}

#[cfg(unix)]
#[test]
fn test_run_installs_then_runs_system_hook() {
    let tools = TempDir::new().unwrap();
    fake_system_pixi(tools.path());
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join(".pre-commit-hooks.yaml"), HOOKS_YAML).unwrap();

    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.env("PATH", path_with(tools.path()))
        .args(["run", "echo-files", "a.py", "b.py", "--repo"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout("ran a.py b.py\n");

    assert!(repo.path().join("pixi.toml").is_file());
    assert!(repo.path().join("pixi_env-system").is_dir());

    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.env("PATH", path_with(tools.path()))
        .args(["health-check", "--language-version", "system", "--prefix"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout("healthy\n");
}

#[cfg(unix)]
#[test]
fn test_run_propagates_hook_exit_code() {
    let tools = TempDir::new().unwrap();
    fake_system_pixi(tools.path());
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join(".pre-commit-hooks.yaml"), HOOKS_YAML).unwrap();

    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.env("PATH", path_with(tools.path()))
        .args(["run", "fail", "a.py", "--repo"])
        .arg(repo.path())
        .assert()
        .code(3);
}

#[cfg(unix)]
#[test]
fn test_run_reinstalls_when_dependencies_change() {
    let tools = TempDir::new().unwrap();
    fake_system_pixi(tools.path());
    let repo = TempDir::new().unwrap();
    let hooks = repo.path().join(".pre-commit-hooks.yaml");
    let hook_with = |dep: &str| {
        format!(
            "- id: lint\n  entry: echo ok\n  language: pixi\n  language_version: system\n  pass_filenames: false\n  additional_dependencies: [{dep}]\n"
        )
    };

    for dep in ["ruff", "black"] {
        std::fs::write(&hooks, hook_with(dep)).unwrap();
        let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
        cmd.env("PATH", path_with(tools.path()))
            .args(["run", "lint", "--repo"])
            .arg(repo.path())
            .assert()
            .success()
            .stdout("ok\n");
    }

    let manifest = std::fs::read_to_string(repo.path().join("pixi.toml")).unwrap();
    assert!(manifest.contains("ruff"));
    assert!(manifest.contains("black"));
}

#[test]
fn test_generate_completion() {
    let mut cmd = Command::cargo_bin("snp-pixi").unwrap();
    cmd.args(["generate-completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("snp-pixi"));
}
