#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
environments:
  dev:
    product: fc
    zone: example.org
    dns_name: test.example.org
    downstream:
      database:
        security_group_id: sg-13fd9e77
        port: 5432
      log_pipeline:
        security_group_id: sg-f1ce248e
        port: 5043
      cache:
        security_group_id: sg-8163f8e6
        port: 11211
"#;

fn bluegreen(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bluegreen").unwrap();
    cmd.current_dir(dir.path())
        .env("BLUEGREEN_CONFIG", dir.path().join("bluegreen.yaml"));
    cmd
}

fn write_config(dir: &TempDir) {
    std::fs::write(dir.path().join("bluegreen.yaml"), CONFIG).unwrap();
}

// ---------------------------------------------------------------------------
// Argument handling
// ---------------------------------------------------------------------------

#[test]
fn help_lists_all_commands() {
    let dir = TempDir::new().unwrap();
    bluegreen(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("deploy")
                .and(predicate::str::contains("delete-stack"))
                .and(predicate::str::contains("delete-old-stacks"))
                .and(predicate::str::contains("switch-dns"))
                .and(predicate::str::contains("list-stacks"))
                .and(predicate::str::contains("list-machines")),
        );
}

#[test]
fn deploy_requires_an_ami() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    bluegreen(&dir)
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--ami"));
}

// ---------------------------------------------------------------------------
// Config and environment resolution
// ---------------------------------------------------------------------------

#[test]
fn missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    bluegreen(&dir)
        .args(["switch-dns", "--env", "dev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn unknown_environment_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    bluegreen(&dir)
        .args(["switch-dns", "--env", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown environment"));
}

// ---------------------------------------------------------------------------
// Name and token validation
// ---------------------------------------------------------------------------

#[test]
fn prune_rejects_a_malformed_version_token() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    bluegreen(&dir)
        .args(["delete-old-stacks", "--env", "dev", "--version", "notatoken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version token"));
}

#[test]
fn delete_stack_rejects_foreign_names() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    bluegreen(&dir)
        .args(["delete-stack", "not-a-stack-name", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("naming convention"));
}
