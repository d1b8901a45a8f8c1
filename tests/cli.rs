//! Integration tests for the crmlink binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn crmlink() -> Command {
    Command::cargo_bin("crmlink").unwrap()
}

#[test]
fn plan_reports_push_and_materialize() {
    let dir = TempDir::new().unwrap();
    let local = write(
        &dir,
        "items.json",
        r#"[
            {"id": "item-1", "kind": "contact", "modified_at": "2026-01-15T10:00:00Z"}
        ]"#,
    );
    let remote = write(
        &dir,
        "entries.json",
        r#"[
            {"id": "abc", "module": "Contacts", "modified_at": "2026-01-15T11:00:00Z"}
        ]"#,
    );

    crmlink()
        .arg("plan")
        .arg("--local")
        .arg(&local)
        .arg("--remote")
        .arg(&remote)
        .assert()
        .success()
        .stdout(predicate::str::contains("transmit new contact item item-1"))
        .stdout(predicate::str::contains("materialize Contacts/abc"))
        .stdout(predicate::str::contains("nothing was sent"));
}

#[test]
fn plan_json_output_is_machine_readable() {
    let dir = TempDir::new().unwrap();
    let local = write(
        &dir,
        "items.json",
        r#"[
            {"id": "item-1", "kind": "task", "modified_at": "2026-01-15T10:00:00Z"}
        ]"#,
    );
    let remote = write(&dir, "entries.json", "[]");

    let output = crmlink()
        .arg("plan")
        .arg("--local")
        .arg(&local)
        .arg("--remote")
        .arg(&remote)
        .arg("--module")
        .arg("Tasks")
        .arg("--output")
        .arg("json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["module"], "Tasks");
    assert_eq!(parsed["actions"].as_array().unwrap().len(), 1);
    assert_eq!(parsed["actions"][0]["kind"], "transmit_new");
}

#[test]
fn plan_consistent_sides_produce_no_actions() {
    let dir = TempDir::new().unwrap();
    let local = write(
        &dir,
        "items.json",
        r#"[
            {"id": "item-1", "kind": "contact", "modified_at": "2026-01-15T10:00:00Z",
             "link": {"crm_id": "abc", "module": "Contacts", "modified_at": "2026-01-15T10:00:00Z"}}
        ]"#,
    );
    let remote = write(
        &dir,
        "entries.json",
        r#"[
            {"id": "abc", "module": "Contacts", "modified_at": "2026-01-15T10:00:00Z"}
        ]"#,
    );

    crmlink()
        .arg("plan")
        .arg("--local")
        .arg(&local)
        .arg("--remote")
        .arg(&remote)
        .assert()
        .success()
        .stdout(predicate::str::contains("already consistent"));
}

#[test]
fn archive_plan_links_matching_contact_only() {
    let dir = TempDir::new().unwrap();
    let email = write(
        &dir,
        "email.json",
        r#"{
            "subject": "quarterly numbers",
            "sent_at": "2026-01-15T10:00:00Z",
            "from": ["a@x.com"],
            "to": ["b@y.com"]
        }"#,
    );
    let remote = write(
        &dir,
        "entries.json",
        r#"[
            {"id": "c-1", "module": "Contacts", "modified_at": "2026-01-15T09:00:00Z",
             "fields": {"email1": "b@y.com"}},
            {"id": "c-2", "module": "Contacts", "modified_at": "2026-01-15T09:00:00Z",
             "fields": {"email1": "a@x.com"}}
        ]"#,
    );

    crmlink()
        .arg("archive-plan")
        .arg("--email")
        .arg(&email)
        .arg("--remote")
        .arg(&remote)
        .arg("--exclude")
        .arg("a@x.com")
        .assert()
        .success()
        .stdout(predicate::str::contains("Contacts/c-1"))
        .stdout(predicate::str::contains("Contacts/c-2").not());
}

#[test]
fn archive_plan_reports_unrelated_email() {
    let dir = TempDir::new().unwrap();
    let email = write(
        &dir,
        "email.json",
        r#"{
            "subject": "lunch?",
            "sent_at": "2026-01-15T10:00:00Z",
            "to": ["nobody@nowhere.example"]
        }"#,
    );
    let remote = write(&dir, "entries.json", "[]");

    crmlink()
        .arg("archive-plan")
        .arg("--email")
        .arg(&email)
        .arg("--remote")
        .arg(&remote)
        .assert()
        .success()
        .stdout(predicate::str::contains("would not be archived"));
}

#[test]
fn config_init_and_show_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    crmlink()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default configuration"));

    crmlink()
        .arg("config")
        .arg("show")
        .arg("--path")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("max_attempts"))
        .stdout(predicate::str::contains("search_modules"));
}
