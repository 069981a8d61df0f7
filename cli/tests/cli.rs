use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

#[allow(deprecated)]
fn netaudit_cmd() -> Command {
    Command::cargo_bin("netaudit").unwrap()
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../core/tests/fixtures")
        .join(name)
}

fn run_cmd(group: &str) -> Command {
    let mut cmd = netaudit_cmd();
    cmd.arg("run")
        .arg("--tests")
        .arg(fixture("rules.yaml"))
        .arg("--config")
        .arg(fixture("catalyst3750.txt"))
        .arg("--group")
        .arg(group);
    cmd
}

#[test]
fn help_works() {
    netaudit_cmd().arg("--help").assert().success();
}

#[test]
fn passing_group_exits_zero() {
    run_cmd("Advanced")
        .assert()
        .success()
        .stdout(predicate::str::contains("unused-port-shutdown: OK"))
        .stdout(predicate::str::contains("3 passed, 0 failed"));
}

#[test]
fn failing_rules_exit_two() {
    run_cmd("Basic")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("hostname: OK"))
        .stdout(predicate::str::contains("password-encryption: FAIL"))
        .stdout(predicate::str::contains("2 passed, 2 failed"));
}

#[test]
fn diagnostics_are_indented_under_the_rule() {
    run_cmd("Advanced")
        .args([
            "--version-label",
            "Cisco",
            "--version-label",
            "Catalyst3750",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains(
            "unused-port-shutdown: FAIL\n    Match failed for configuration, line 96.",
        ));
}

#[test]
fn json_report() {
    let output = run_cmd("Basic").args(["--format", "json"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["group"], "Basic");
    assert_eq!(report["passed"], 2);
    assert_eq!(report["failed"], 2);
    assert_eq!(report["results"][0]["name"], "hostname");
    assert_eq!(report["results"][0]["outcome"], true);
    assert_eq!(report["results"][2]["outcome"], false);
}

#[test]
fn unknown_group_is_an_error() {
    run_cmd("Nope")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Nope"));
}

#[test]
fn unknown_version_label_is_an_error() {
    run_cmd("Basic")
        .args(["--version-label", "Nexus9000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Nexus9000"));
}

#[test]
fn groups_lists_rules() {
    netaudit_cmd()
        .arg("groups")
        .arg("--tests")
        .arg(fixture("rules.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Advanced:\n  - unused-port-shutdown",
        ))
        .stdout(predicate::str::contains("Platform:\n  - system-mtu"));
}

#[test]
fn show_reports_the_resolved_bucket() {
    netaudit_cmd()
        .arg("show")
        .arg("--tests")
        .arg(fixture("rules.yaml"))
        .args([
            "--rule",
            "unused-port-shutdown",
            "--version-label",
            "Catalyst3750",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("version:  Catalyst3750"))
        .stdout(predicate::str::contains(
            "match[0]: ^interface GigabitEthernet1/0/27$",
        ));
}

const BASE_RULES: &str = r#"
TestItems:
  Default:
    hostname:
      match: "^hostname (\\S+)"
      expected: SampleSwitch
TestGroups:
  Basic: [hostname]
"#;

#[test]
fn directory_of_rules_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("base.yaml"), BASE_RULES).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a rule file").unwrap();

    netaudit_cmd()
        .arg("run")
        .arg("--tests")
        .arg(dir.path())
        .arg("--config")
        .arg(fixture("catalyst3750.txt"))
        .args(["--group", "Basic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hostname: OK"));
}

#[test]
fn missing_config_file_is_an_error() {
    netaudit_cmd()
        .arg("run")
        .arg("--tests")
        .arg(fixture("rules.yaml"))
        .args([
            "--config",
            "/nonexistent/netaudit.cfg",
            "--group",
            "Basic",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read configuration"));
}
