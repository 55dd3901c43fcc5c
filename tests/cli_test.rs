use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn replay_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("paydesk"));
    cmd.arg("tests/fixtures/session.jsonl");

    cmd.assert()
        .success()
        // Welcome with the configured text.
        .stdout(predicate::str::contains("Hey ada"))
        .stdout(predicate::str::contains("Welcome to the demo shop."))
        // A QR photo carrying the fixed amount.
        .stdout(predicate::str::contains("\"event\":\"photo\""))
        .stdout(predicate::str::contains("am=500.00"))
        // Admin panel and the balance check.
        .stdout(predicate::str::contains("Admin panel"))
        .stdout(predicate::str::contains("Your balance: 0"));

    Ok(())
}

#[test]
fn unknown_setting_key_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{{\"kind\": \"setting\", \"key\": \"color\", \"value\": \"red\"}}").unwrap();

    let mut cmd = Command::new(cargo_bin!("paydesk"));
    cmd.arg(file.path());

    cmd.assert().failure();
}

#[test]
fn malformed_script_line_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{{\"kind\": \"message\"").unwrap();

    let mut cmd = Command::new(cargo_bin!("paydesk"));
    cmd.arg(file.path());

    cmd.assert().failure();
}

#[test]
fn missing_script_fails() {
    let mut cmd = Command::new(cargo_bin!("paydesk"));
    cmd.arg("tests/fixtures/does-not-exist.jsonl");

    cmd.assert().failure();
}
