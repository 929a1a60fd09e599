use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command as AssertCommand;
use serde_json::{json, Value};
use tempfile::tempdir;

fn tether(home: &Path) -> AssertCommand {
    let mut cmd = AssertCommand::cargo_bin("tether").unwrap();
    cmd.env("TETHER_HOME", home);
    cmd
}

fn stdout_of(home: &Path, args: &[&str]) -> String {
    let output = tether(home).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "command {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn write_invitation(dir: &Path, file: &str, body: Value) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, body.to_string()).unwrap();
    path
}

fn register_endpoint(home: &Path, link: &str, endpoint: &str) {
    let network = home.join("network");
    fs::create_dir_all(&network).unwrap();
    fs::write(
        network.join("directory.json"),
        json!({"endpoints": {link: endpoint}}).to_string(),
    )
    .unwrap();
}

fn faber_invitation(dir: &Path) -> PathBuf {
    write_invitation(
        dir,
        "faber.json",
        json!({"invitation": {"name": "Faber College"}}),
    )
}

#[test]
fn load_is_rejected_on_second_attempt() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = faber_invitation(home);

    let first = stdout_of(home, &["load", invitation.to_str().unwrap()]);
    assert!(first.contains("Link invitation for \"Faber College\" loaded"));
    assert!(first.contains("link show \"Faber College\""));

    let second = stdout_of(home, &["load", invitation.to_str().unwrap()]);
    assert!(second.contains("Link already exists"));
}

#[test]
fn load_reports_missing_and_malformed_files() {
    let temp = tempdir().unwrap();
    let home = temp.path();

    let missing = stdout_of(home, &["load", "no-such-file.json"]);
    assert!(missing.contains("Given file does not exist"));

    let garbled = home.join("garbled.json");
    fs::write(&garbled, b"{not json").unwrap();
    let malformed = stdout_of(home, &["load", garbled.to_str().unwrap()]);
    assert!(malformed.contains("Input is not a valid json"));

    let empty = write_invitation(home, "empty.json", json!({"note": "nothing here"}));
    let no_invitation = stdout_of(home, &["load", empty.to_str().unwrap()]);
    assert!(no_invitation.contains("No link invitation found in the given file"));
}

#[test]
fn show_file_prints_without_loading() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = faber_invitation(home);

    let shown = stdout_of(home, &["show-file", invitation.to_str().unwrap()]);
    assert!(shown.contains("Faber College"));

    // Nothing was stored, so link show still finds nothing.
    let lookup = stdout_of(home, &["link", "show", "Faber College"]);
    assert!(lookup.contains("No matching link invitation(s) found in current keyring"));
}

#[test]
fn connect_status_disconnect_roundtrip() {
    let temp = tempdir().unwrap();
    let home = temp.path();

    assert!(stdout_of(home, &["status"]).contains("Not connected to any environment."));
    assert!(stdout_of(home, &["connect", "sandbox"]).contains("Connected to sandbox"));
    assert!(stdout_of(home, &["connect", "sandbox"]).contains("Already connected to sandbox"));
    assert!(stdout_of(home, &["connect", "staging"]).contains("Unknown environment staging"));
    assert!(stdout_of(home, &["status"]).contains("Connected to sandbox"));
    assert!(stdout_of(home, &["disconnect"]).contains("Disconnected from sandbox"));
    assert!(stdout_of(home, &["status"]).contains("Not connected to any environment."));
}

#[test]
fn sync_refuses_while_disconnected() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = faber_invitation(home);
    stdout_of(home, &["load", invitation.to_str().unwrap()]);

    let output = stdout_of(home, &["link", "sync", "Faber College"]);
    assert!(output.contains("Cannot sync because not connected. Please connect first."));

    let shown = stdout_of(home, &["link", "show", "Faber College"]);
    assert!(shown.contains("Target endpoint: not yet synchronized"));
}

#[test]
fn sync_then_accept_expands_and_is_idempotent() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = faber_invitation(home);
    register_endpoint(home, "Faber College", "10.0.0.2:5555");

    stdout_of(home, &["load", invitation.to_str().unwrap()]);
    stdout_of(home, &["connect", "sandbox"]);

    let synced = stdout_of(home, &["link", "sync", "faber"]);
    assert!(synced.contains("Expanding faber to \"Faber College\""));
    assert!(synced.contains("Link Faber College synchronized"));

    let shown = stdout_of(home, &["link", "show", "Faber College"]);
    assert!(shown.contains("Target endpoint: 10.0.0.2:5555"));
    assert!(shown.contains("Status: synchronized, invitation not accepted"));

    let accepted = stdout_of(home, &["link", "accept", "Faber College"]);
    assert!(accepted.contains("Invitation from Faber College accepted"));

    let again = stdout_of(home, &["link", "accept", "Faber College"]);
    assert!(again.contains("Link Faber College is already accepted"));
}

#[test]
fn offline_accept_uses_endpoint_from_invitation() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = write_invitation(
        home,
        "acme.json",
        json!({"invitation": {"name": "Acme Corp", "endpoint": "10.0.0.3:6666"}}),
    );

    stdout_of(home, &["load", invitation.to_str().unwrap()]);
    let accepted = stdout_of(home, &["link", "accept", "Acme Corp"]);
    assert!(accepted.contains("Invitation from Acme Corp accepted"));

    let shown = stdout_of(home, &["link", "show", "Acme Corp"]);
    assert!(shown.contains("Status: accepted"));
}

#[test]
fn ambiguous_query_lists_candidates_and_changes_nothing() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    for (file, name) in [("acme.json", "Acme"), ("acme-corp.json", "Acme Corp")] {
        let invitation = write_invitation(home, file, json!({"invitation": {"name": name}}));
        stdout_of(home, &["load", invitation.to_str().unwrap()]);
    }
    stdout_of(home, &["connect", "sandbox"]);

    let output = stdout_of(home, &["link", "sync", "Acme"]);
    assert!(output.contains("More than one link matches \"Acme\""));
    assert!(output.contains("Acme (default)"));
    assert!(output.contains("Acme Corp (default)"));
    assert!(output.contains("Re-enter the command with a more specific link invitation name"));
}

#[test]
fn json_output_carries_link_state() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = faber_invitation(home);
    stdout_of(home, &["load", invitation.to_str().unwrap()]);

    let raw = stdout_of(home, &["-o", "json", "link", "show", "Faber College"]);
    let payload: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(payload["command"], "link.show");
    assert_eq!(payload["link"]["name"], "Faber College");
    assert_eq!(payload["link"]["accepted"], false);
}

#[test]
fn new_key_is_reported_and_reused_by_sync() {
    let temp = tempdir().unwrap();
    let home = temp.path();
    let invitation = faber_invitation(home);
    register_endpoint(home, "Faber College", "10.0.0.2:5555");

    let created = stdout_of(home, &["new-key"]);
    assert!(created.contains("Created identifying key"));

    stdout_of(home, &["load", invitation.to_str().unwrap()]);
    stdout_of(home, &["connect", "sandbox"]);
    let synced = stdout_of(home, &["link", "sync", "Faber College"]);
    // A key already exists, so sync must not announce creating another.
    assert!(!synced.contains("so adding one"));
}
