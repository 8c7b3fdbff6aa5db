use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

/// Writes a small but complete project: one account on the file-backed
/// provider, one network environment with a service, one DNS zone whose
/// record points at the service endpoint.
fn write_project(root: &Path) {
    fs::write(
        root.join("skystack.yaml"),
        r#"
name: demo
accounts:
  - name: prod
    provider: local
    default_region: us-west-2
"#,
    )
    .unwrap();

    fs::create_dir_all(root.join("netenvs")).unwrap();
    fs::write(
        root.join("netenvs/prod.yaml"),
        r#"
name: prod
account: prod
network:
  cidr: 10.0.0.0/16
  segments:
    - name: public
      cidr: 10.0.1.0/24
      public: true
applications:
  - name: site
    resources:
      - name: web
        kind: service
        segment: public
"#,
    )
    .unwrap();

    fs::create_dir_all(root.join("dns")).unwrap();
    fs::write(
        root.join("dns/public.yaml"),
        r#"
name: public
account: prod
zones:
  - name: example
    domain: example.com
    records:
      - name: www
        kind: cname
        value: "ref:netenv.prod.applications.site.resources.web.endpoint"
"#,
    )
    .unwrap();
}

fn sky(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.current_dir(root)
        .env("SKYSTACK_PROJECT_ROOT", root)
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("outputs"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sky"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.arg("conjure").assert().failure();
}

#[test]
fn test_validate_without_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("SKYSTACK_PROJECT_ROOT")
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No project found"));
}

#[test]
fn test_validate_accepts_sound_project() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("network environments: 1"));
}

#[test]
fn test_validate_rejects_dangling_reference() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    fs::write(
        dir.path().join("dns/public.yaml"),
        r#"
name: public
account: prod
zones:
  - name: example
    domain: example.com
    records:
      - name: www
        kind: cname
        value: "ref:netenv.prod.applications.site.resources.ghost.endpoint"
"#,
    )
    .unwrap();

    sky(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_plan_lists_creates_without_mutating() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("+ netenv.prod.network.vpc"))
        .stdout(predicate::str::contains("+ dns.public.zones.example"))
        .stdout(predicate::str::contains("3 to create"))
        .stdout(predicate::str::contains("sky provision"));

    // Planning records nothing.
    assert!(!dir.path().join(".skystack/outputs.json").exists());
}

#[test]
fn test_plan_scope_narrows_output() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("plan")
        .arg("netenv.prod.network")
        .assert()
        .success()
        .stdout(predicate::str::contains("netenv.prod.network.vpc"))
        .stdout(predicate::str::contains("zones.example").not());
}

#[test]
fn test_plan_rejects_malformed_scope() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("plan")
        .arg("netenv..prod")
        .assert()
        .failure();
}

#[test]
fn test_plan_outside_scope_reports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("plan")
        .arg("netenv.staging")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing in scope"));
}

#[test]
fn test_provision_records_outputs() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("provision")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ netenv.prod.network.vpc"))
        .stdout(predicate::str::contains("4 completed, 0 failed"));

    assert!(dir.path().join(".skystack/outputs.json").exists());

    sky(dir.path())
        .arg("outputs")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("netenv.prod.network.vpc.id"))
        .stdout(predicate::str::contains("local-vpc_id"));
}

#[test]
fn test_second_provision_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path()).arg("provision").assert().success();

    // Recorded digests short-circuit the second run; nothing is recreated.
    sky(dir.path())
        .arg("provision")
        .assert()
        .success()
        .stdout(predicate::str::contains("4 completed, 0 failed"));

    sky(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));
}

#[test]
fn test_delete_asks_before_acting() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    sky(dir.path()).arg("provision").assert().success();

    sky(dir.path())
        .arg("delete")
        .assert()
        .success()
        .stdout(predicate::str::contains("- netenv.prod.network.vpc"))
        .stdout(predicate::str::contains("--yes"));

    // Still there.
    sky(dir.path())
        .arg("outputs")
        .assert()
        .success()
        .stdout(predicate::str::contains("netenv.prod.network.vpc"));
}

#[test]
fn test_delete_with_yes_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    sky(dir.path()).arg("provision").assert().success();

    sky(dir.path())
        .arg("delete")
        .arg("--yes")
        .assert()
        .success()
        .stdout(predicate::str::contains("4 completed, 0 failed"));

    sky(dir.path())
        .arg("outputs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No recorded outputs"));
}

#[test]
fn test_outputs_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    sky(dir.path())
        .arg("outputs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No recorded outputs"));
}
