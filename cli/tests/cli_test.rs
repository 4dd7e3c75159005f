//! CLI integration tests against a fixture project directory.

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sprocket.toml"),
        "project = \"fixture\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("schema.json"),
        r#"{
  "Tables": [
    {
      "Schema": "dbo",
      "Name": "Users",
      "Columns": [
        { "Name": "Id", "SqlType": "int" },
        { "Name": "Email", "SqlType": "nvarchar(256)", "Nullable": true, "MaxLength": 256 }
      ]
    }
  ]
}"#,
    )
    .unwrap();
    std::fs::create_dir(dir.path().join("procs")).unwrap();
    std::fs::write(
        dir.path().join("procs").join("dbo.GetUsers.sql"),
        "CREATE PROCEDURE dbo.GetUsers AS\nSELECT u.Id, u.Email FROM dbo.Users u FOR JSON PATH;\n",
    )
    .unwrap();
    dir
}

fn sprocket() -> Command {
    Command::cargo_bin("sprocket").unwrap()
}

#[test]
fn snapshot_writes_and_second_run_is_noop() {
    let project = fixture_project();

    sprocket()
        .args(["snapshot", "--project"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot written"));

    assert!(
        project
            .path()
            .join("snapshot/procedures/dbo.GetUsers.json")
            .exists()
    );
    assert!(project.path().join("snapshot/index.json").exists());

    sprocket()
        .args(["snapshot", "--project"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("zero writes"));
}

#[test]
fn status_reports_fingerprint() {
    let project = fixture_project();
    sprocket()
        .args(["snapshot", "--project"])
        .arg(project.path())
        .assert()
        .success();

    sprocket()
        .args(["status", "--project"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Fingerprint"))
        .stdout(predicate::str::contains("Procedures: 1"));
}

#[test]
fn status_without_snapshot_fails() {
    let project = fixture_project();
    sprocket()
        .args(["status", "--project"])
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no snapshot"));
}

#[test]
fn check_detects_stale_snapshot() {
    let project = fixture_project();
    sprocket()
        .args(["snapshot", "--project"])
        .arg(project.path())
        .assert()
        .success();

    sprocket()
        .args(["check", "--project"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    std::fs::write(
        project.path().join("procs").join("dbo.Extra.sql"),
        "CREATE PROC dbo.Extra AS SELECT 1 AS One;",
    )
    .unwrap();

    sprocket()
        .args(["check", "--project"])
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("stale"));
}

#[test]
fn verbose_snapshot_lists_objects() {
    let project = fixture_project();
    sprocket()
        .args(["snapshot", "--verbose", "--project"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("dbo.GetUsers"));
}
