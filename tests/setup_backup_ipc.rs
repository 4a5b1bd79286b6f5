use serde_json::{json, Value};
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

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn start() -> Self {
        Self::start_with_env(&[])
    }

    fn start_with_env(env: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_gradebookd");
        let mut cmd = Command::new(exe);
        cmd.env_remove("GRADEBOOKD_WORKSPACE");
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn gradebookd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn call(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        writeln!(
            self.stdin,
            "{}",
            json!({ "id": id, "method": method, "params": params })
        )
        .expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response");
        let value: Value = serde_json::from_str(line.trim()).expect("response json");
        assert_eq!(value["id"], id.as_str());
        value
    }

    fn ok(&mut self, method: &str, params: Value) -> Value {
        let resp = self.call(method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    fn login_admin(&mut self) {
        self.ok(
            "auth.login",
            json!({ "username": "admin", "password": "admin123" }),
        );
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn first_student_and_subject(sc: &mut Sidecar) -> (String, Vec<String>) {
    let students = sc.ok("students.list", json!({ "section": "A" }));
    let student = students["students"][0]["id"]
        .as_str()
        .expect("student id")
        .to_string();
    let subjects: Vec<String> = sc.ok("subjects.list", json!({}))["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .filter_map(|s| s["id"].as_str().map(|v| v.to_string()))
        .collect();
    (student, subjects)
}

#[test]
fn grade_scale_update_changes_reports_on_next_read() {
    let workspace = temp_dir("gradebook-scale");
    let mut sc = Sidecar::start();
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.login_admin();

    let scale = sc.ok("setup.gradeScale.get", json!({}));
    assert_eq!(scale["scale"]["version"], "neb-2079");
    assert_eq!(scale["scale"]["bands"].as_array().map(|b| b.len()), Some(7));

    let (student, subjects) = first_student_and_subject(&mut sc);
    let marks: Vec<Value> = subjects
        .iter()
        .map(|sid| json!({ "studentId": student, "subjectId": sid, "theoryObtained": 30, "practicalObtained": 30 }))
        .collect();
    sc.ok("marks.saveTerm", json!({ "term": "first", "marks": marks }));

    // 60% is a B (2.8) under the default table.
    let before = sc.ok(
        "reports.gradeSheetModel",
        json!({ "term": "first", "studentId": student }),
    );
    assert_eq!(before["gpaText"], "2.80");

    sc.ok(
        "setup.gradeScale.update",
        json!({ "scale": {
            "version": "pass-merit",
            "bands": [
                { "minPercent": 75, "grade": "M", "gradePoint": 4.0 },
                { "minPercent": 50, "grade": "P", "gradePoint": 3.0 },
                { "minPercent": 0, "grade": "L", "gradePoint": 1.0 },
            ],
        }}),
    );
    let after = sc.ok(
        "reports.gradeSheetModel",
        json!({ "term": "first", "studentId": student }),
    );
    assert_eq!(after["gpaText"], "3.00");
    assert_eq!(after["results"][0]["finalGrade"], "P");

    let rejected = sc.call(
        "setup.gradeScale.update",
        json!({ "scale": {
            "version": "broken",
            "bands": [
                { "minPercent": 40, "grade": "X", "gradePoint": 2.0 },
                { "minPercent": 60, "grade": "Y", "gradePoint": 3.0 },
            ],
        }}),
    );
    assert_eq!(rejected["error"]["code"], "bad_params");
    let still = sc.ok("setup.gradeScale.get", json!({}));
    assert_eq!(still["scale"]["version"], "pass-merit");

    let reset = sc.ok("setup.gradeScale.reset", json!({}));
    assert_eq!(reset["scale"]["version"], "neb-2079");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bundle_import_restores_records_and_ends_session() {
    let workspace = temp_dir("gradebook-bundle-src");
    let bundle = workspace.join("exports").join("term1.zip");
    let mut sc = Sidecar::start();
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.login_admin();

    let (student, subjects) = first_student_and_subject(&mut sc);
    sc.ok(
        "marks.saveTerm",
        json!({ "term": "final", "marks": [
            { "studentId": student, "subjectId": subjects[0], "theoryObtained": 50, "practicalObtained": 50 }
        ]}),
    );
    let exported = sc.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], "gradebook-workspace-v1");
    assert_eq!(exported["dbSha256"].as_str().map(|s| s.len()), Some(64));

    // Changes after the export are rolled back by the import.
    sc.ok("students.delete", json!({ "studentId": student }));
    let imported = sc.ok(
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], "gradebook-workspace-v1");

    let gated = sc.call("students.list", json!({}));
    assert_eq!(gated["error"]["code"], "unauthorized");

    sc.login_admin();
    let listed = sc.ok("marks.list", json!({ "term": "final" }));
    assert_eq!(listed["marks"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(listed["marks"][0]["studentId"], student.as_str());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rejected_import_keeps_session_and_records() {
    let workspace = temp_dir("gradebook-bundle-reject");
    let junk = workspace.join("notes.txt");
    std::fs::write(&junk, b"not a backup").expect("write junk");
    let mut sc = Sidecar::start();
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.login_admin();

    let (student, subjects) = first_student_and_subject(&mut sc);
    sc.ok(
        "marks.saveTerm",
        json!({ "term": "first", "marks": [
            { "studentId": student, "subjectId": subjects[0], "theoryObtained": 30, "practicalObtained": 30 }
        ]}),
    );

    let rejected = sc.call(
        "backup.importWorkspaceBundle",
        json!({ "inPath": junk.to_string_lossy() }),
    );
    assert_eq!(rejected["error"]["code"], "backup_failed");

    // Still logged in as admin, against the same data.
    let listed = sc.ok("marks.list", json!({ "term": "first" }));
    assert_eq!(listed["marks"].as_array().map(|a| a.len()), Some(1));
    let users = sc.ok("users.list", json!({}));
    assert!(users["users"].as_array().map(|a| !a.is_empty()).unwrap_or(false));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn configured_workspace_opens_at_startup() {
    let workspace = temp_dir("gradebook-env-workspace");
    let path = workspace.to_string_lossy().to_string();
    let mut sc = Sidecar::start_with_env(&[("GRADEBOOKD_WORKSPACE", &path), ("GRADEBOOKD_LOG", "off")]);

    let health = sc.ok("health", json!({}));
    assert_eq!(health["workspacePath"], path.as_str());
    assert!(health["user"].is_null());
    sc.login_admin();
    let students = sc.ok("students.list", json!({}));
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(2));

    let _ = std::fs::remove_dir_all(workspace);
}
