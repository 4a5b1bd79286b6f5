use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.gbbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    let selected = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["result"]["seeded"], true);
    let login = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );
    assert_eq!(login["result"]["user"]["role"], "ADMIN");

    let calls = [
        ("4", "users.list", json!({})),
        ("5", "students.list", json!({ "section": "ALL" })),
        ("6", "subjects.list", json!({})),
        ("7", "marks.list", json!({ "term": "first" })),
        ("8", "marks.saveTerm", json!({ "term": "first", "marks": [], "termData": [] })),
        ("9", "reports.studentReports", json!({ "term": "first" })),
        ("10", "reports.sectionLedgerModel", json!({ "term": "first", "section": "A" })),
        ("11", "reports.dashboard", json!({ "term": "first" })),
        ("12", "expenses.list", json!({})),
        ("13", "setup.gradeScale.get", json!({})),
        (
            "14",
            "backup.exportWorkspaceBundle",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
    ];
    for (id, method, params) in calls {
        let resp = request(&mut stdin, &mut reader, id, method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
    }
    assert!(bundle_out.is_file());

    let unknown = {
        writeln!(
            stdin,
            "{}",
            json!({ "id": "15", "method": "classes.list", "params": {} })
        )
        .expect("write");
        stdin.flush().expect("flush");
        read_response(&mut reader)
    };
    assert_eq!(unknown["ok"], false);
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let bad = read_response(&mut reader);
    assert_eq!(error_code(&bad), Some("bad_json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn session_gating_and_roles() {
    let workspace = temp_dir("gradebook-router-gating");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let before = request(&mut stdin, &mut reader, "1", "students.list", json!({}));
    assert_eq!(error_code(&before), Some("no_workspace"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let anon = request(&mut stdin, &mut reader, "3", "students.list", json!({}));
    assert_eq!(error_code(&anon), Some("unauthorized"));

    let wrong = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "username": "admin", "password": "nope" }),
    );
    assert_eq!(error_code(&wrong), Some("invalid_credentials"));

    let teacher = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        json!({ "username": "teacher1", "password": "password123" }),
    );
    assert_eq!(teacher["result"]["user"]["role"], "TEACHER");

    let listed = request(&mut stdin, &mut reader, "6", "students.list", json!({}));
    assert_eq!(listed["ok"], true);
    let names: Vec<&str> = listed["result"]["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    // Roll 1 sorts ahead of roll 8.
    assert_eq!(names, vec!["Aarav Sharma", "Subina Tamang"]);

    let denied = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "name": "New Kid", "rollNo": "3", "section": "B" }),
    );
    assert_eq!(error_code(&denied), Some("forbidden"));
    let denied_scale = request(
        &mut stdin,
        &mut reader,
        "8",
        "setup.gradeScale.update",
        json!({ "scale": { "version": "x", "bands": [] } }),
    );
    assert_eq!(error_code(&denied_scale), Some("forbidden"));

    let out = request(&mut stdin, &mut reader, "9", "auth.logout", json!({}));
    assert_eq!(out["result"]["loggedOut"], true);
    let after = request(&mut stdin, &mut reader, "10", "subjects.list", json!({}));
    assert_eq!(error_code(&after), Some("unauthorized"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
